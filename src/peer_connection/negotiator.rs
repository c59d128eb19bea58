use portable_atomic::{AtomicU8, Ordering};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::peer_connection::sdp::sdp_type::RTCSdpType;
use crate::peer_connection::sdp::session_description::RTCSessionDescription;
use crate::peer_connection::signaling_state::{
    check_next_signaling_state, RTCSignalingState, StateChangeOp,
};

#[derive(Default)]
struct Descriptions {
    local: Option<RTCSessionDescription>,
    remote: Option<RTCSessionDescription>,
}

/// Negotiator owns the signaling state and the local and remote
/// descriptions. A transition is validated before anything is stored, so a
/// rejected call leaves state and descriptions untouched.
pub(crate) struct Negotiator {
    signaling_state: AtomicU8, //RTCSignalingState
    descriptions: Mutex<Descriptions>,
}

impl Negotiator {
    pub(crate) fn new() -> Self {
        Negotiator {
            signaling_state: AtomicU8::new(RTCSignalingState::New as u8),
            descriptions: Mutex::new(Descriptions::default()),
        }
    }

    pub(crate) fn signaling_state(&self) -> RTCSignalingState {
        self.signaling_state.load(Ordering::SeqCst).into()
    }

    /// check_local reports the state a local description of `sdp_type`
    /// would move to, without applying it.
    pub(crate) fn check_local(&self, sdp_type: RTCSdpType) -> Result<RTCSignalingState> {
        check_next_signaling_state(self.signaling_state(), StateChangeOp::SetLocal, sdp_type)
    }

    pub(crate) fn check_remote(&self, sdp_type: RTCSdpType) -> Result<RTCSignalingState> {
        check_next_signaling_state(self.signaling_state(), StateChangeOp::SetRemote, sdp_type)
    }

    pub(crate) async fn set_local_description(
        &self,
        desc: RTCSessionDescription,
    ) -> Result<RTCSignalingState> {
        let mut descriptions = self.descriptions.lock().await;
        let next = check_next_signaling_state(
            self.signaling_state(),
            StateChangeOp::SetLocal,
            desc.sdp_type,
        )?;

        descriptions.local = Some(desc);
        self.signaling_state.store(next as u8, Ordering::SeqCst);
        log::debug!("signaling state changed to {next}");

        Ok(next)
    }

    pub(crate) async fn set_remote_description(
        &self,
        desc: RTCSessionDescription,
    ) -> Result<RTCSignalingState> {
        let mut descriptions = self.descriptions.lock().await;
        let next = check_next_signaling_state(
            self.signaling_state(),
            StateChangeOp::SetRemote,
            desc.sdp_type,
        )?;

        descriptions.remote = Some(desc);
        self.signaling_state.store(next as u8, Ordering::SeqCst);
        log::debug!("signaling state changed to {next}");

        Ok(next)
    }

    /// update_local_description replaces the local description with a newer
    /// rendition of the same type, as gathering discovers candidates.
    /// Reports whether it was replaced.
    pub(crate) async fn update_local_description(&self, desc: RTCSessionDescription) -> bool {
        let mut descriptions = self.descriptions.lock().await;
        if self.signaling_state() == RTCSignalingState::Closed {
            return false;
        }

        match &descriptions.local {
            Some(local) if local.sdp_type == desc.sdp_type => {
                descriptions.local = Some(desc);
                true
            }
            _ => false,
        }
    }

    pub(crate) async fn local_description(&self) -> Option<RTCSessionDescription> {
        let descriptions = self.descriptions.lock().await;
        descriptions.local.clone()
    }

    pub(crate) async fn remote_description(&self) -> Option<RTCSessionDescription> {
        let descriptions = self.descriptions.lock().await;
        descriptions.remote.clone()
    }

    /// close moves to closed for good. Reports whether this call did it.
    pub(crate) async fn close(&self) -> bool {
        let _descriptions = self.descriptions.lock().await;
        self.signaling_state
            .swap(RTCSignalingState::Closed as u8, Ordering::SeqCst)
            != RTCSignalingState::Closed as u8
    }
}
