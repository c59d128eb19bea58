use std::fmt;

use crate::error::{Error, Result};
use crate::peer_connection::sdp::sdp_type::RTCSdpType;

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum StateChangeOp {
    #[default]
    SetLocal,
    SetRemote,
}

impl fmt::Display for StateChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            StateChangeOp::SetLocal => write!(f, "SetLocal"),
            StateChangeOp::SetRemote => write!(f, "SetRemote"),
        }
    }
}

/// RTCSignalingState indicates the state of the offer/answer exchange.
///
/// The offering side moves `new -> have-local-offer -> stable`, the
/// answering side `new -> have-remote-offer -> stable`. Once stable the
/// exchange is over: renegotiation is not supported.
///
/// ## Specifications
///
/// * [MDN]
/// * [W3C]
///
/// [MDN]: https://developer.mozilla.org/en-US/docs/Web/API/RTCPeerConnection/signalingState
/// [W3C]: https://w3c.github.io/webrtc-pc/#dom-peerconnection-signaling-state
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCSignalingState {
    #[default]
    Unspecified = 0,

    /// No description has been applied yet.
    New,

    /// A local description of type "offer" has been applied.
    HaveLocalOffer,

    /// A remote description of type "offer" has been applied.
    HaveRemoteOffer,

    /// The offer/answer exchange has completed.
    Stable,

    /// The peer connection has been closed.
    Closed,
}

const SIGNALING_STATE_NEW_STR: &str = "new";
const SIGNALING_STATE_HAVE_LOCAL_OFFER_STR: &str = "have-local-offer";
const SIGNALING_STATE_HAVE_REMOTE_OFFER_STR: &str = "have-remote-offer";
const SIGNALING_STATE_STABLE_STR: &str = "stable";
const SIGNALING_STATE_CLOSED_STR: &str = "closed";

impl From<&str> for RTCSignalingState {
    fn from(raw: &str) -> Self {
        match raw {
            SIGNALING_STATE_NEW_STR => RTCSignalingState::New,
            SIGNALING_STATE_HAVE_LOCAL_OFFER_STR => RTCSignalingState::HaveLocalOffer,
            SIGNALING_STATE_HAVE_REMOTE_OFFER_STR => RTCSignalingState::HaveRemoteOffer,
            SIGNALING_STATE_STABLE_STR => RTCSignalingState::Stable,
            SIGNALING_STATE_CLOSED_STR => RTCSignalingState::Closed,
            _ => RTCSignalingState::Unspecified,
        }
    }
}

impl fmt::Display for RTCSignalingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCSignalingState::New => write!(f, "{SIGNALING_STATE_NEW_STR}"),
            RTCSignalingState::HaveLocalOffer => {
                write!(f, "{SIGNALING_STATE_HAVE_LOCAL_OFFER_STR}")
            }
            RTCSignalingState::HaveRemoteOffer => {
                write!(f, "{SIGNALING_STATE_HAVE_REMOTE_OFFER_STR}")
            }
            RTCSignalingState::Stable => write!(f, "{SIGNALING_STATE_STABLE_STR}"),
            RTCSignalingState::Closed => write!(f, "{SIGNALING_STATE_CLOSED_STR}"),
            _ => write!(f, "{}", crate::UNSPECIFIED_STR),
        }
    }
}

impl From<u8> for RTCSignalingState {
    fn from(v: u8) -> Self {
        match v {
            1 => RTCSignalingState::New,
            2 => RTCSignalingState::HaveLocalOffer,
            3 => RTCSignalingState::HaveRemoteOffer,
            4 => RTCSignalingState::Stable,
            5 => RTCSignalingState::Closed,
            _ => RTCSignalingState::Unspecified,
        }
    }
}

/// check_next_signaling_state validates applying a description of
/// `sdp_type` from `cur`, returning the state to move to.
pub(crate) fn check_next_signaling_state(
    cur: RTCSignalingState,
    op: StateChangeOp,
    sdp_type: RTCSdpType,
) -> Result<RTCSignalingState> {
    let next = match (cur, op, sdp_type) {
        // new->SetLocal(offer)->have-local-offer
        (RTCSignalingState::New, StateChangeOp::SetLocal, RTCSdpType::Offer) => {
            RTCSignalingState::HaveLocalOffer
        }
        // new->SetRemote(offer)->have-remote-offer
        (RTCSignalingState::New, StateChangeOp::SetRemote, RTCSdpType::Offer) => {
            RTCSignalingState::HaveRemoteOffer
        }
        // have-local-offer->SetRemote(answer)->stable
        (RTCSignalingState::HaveLocalOffer, StateChangeOp::SetRemote, RTCSdpType::Answer) => {
            RTCSignalingState::Stable
        }
        // have-remote-offer->SetLocal(answer)->stable
        (RTCSignalingState::HaveRemoteOffer, StateChangeOp::SetLocal, RTCSdpType::Answer) => {
            RTCSignalingState::Stable
        }
        (RTCSignalingState::Closed, _, _) => return Err(Error::ErrConnectionClosed),
        _ => {
            return Err(Error::ErrSignalingStateProposedTransitionInvalid {
                from: cur,
                applying: sdp_type,
                is_local: op == StateChangeOp::SetLocal,
            })
        }
    };

    Ok(next)
}
