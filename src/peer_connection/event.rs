use std::fmt;
use std::sync::Arc;

use crate::data_channel::RTCDataChannel;
use crate::ice_transport::ice_candidate::RTCIceCandidate;
use crate::ice_transport::ice_gathering_state::RTCIceGatheringState;
use crate::peer_connection::peer_connection_state::RTCPeerConnectionState;
use crate::peer_connection::sdp::session_description::RTCSessionDescription;
use crate::peer_connection::signaling_state::RTCSignalingState;
use crate::track::RTCMediaTrack;

/// RTCPeerConnectionEvent is published to every subscriber of a peer
/// connection, in the order the events happen. It mirrors the `on_*`
/// handlers, which keep a single handler per event.
#[derive(Clone)]
pub enum RTCPeerConnectionEvent {
    LocalDescription(RTCSessionDescription),
    /// `None` once gathering is complete.
    IceCandidate(Option<RTCIceCandidate>),
    IceGatheringStateChange(RTCIceGatheringState),
    SignalingStateChange(RTCSignalingState),
    PeerConnectionStateChange(RTCPeerConnectionState),
    /// A data channel announced by the remote peer.
    DataChannel(Arc<RTCDataChannel>),
    /// A track announced by the remote peer.
    Track(Arc<RTCMediaTrack>),
}

impl fmt::Debug for RTCPeerConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RTCPeerConnectionEvent::LocalDescription(desc) => {
                write!(f, "LocalDescription({})", desc.sdp_type)
            }
            RTCPeerConnectionEvent::IceCandidate(Some(c)) => write!(f, "IceCandidate({c})"),
            RTCPeerConnectionEvent::IceCandidate(None) => write!(f, "IceCandidate(None)"),
            RTCPeerConnectionEvent::IceGatheringStateChange(s) => {
                write!(f, "IceGatheringStateChange({s})")
            }
            RTCPeerConnectionEvent::SignalingStateChange(s) => {
                write!(f, "SignalingStateChange({s})")
            }
            RTCPeerConnectionEvent::PeerConnectionStateChange(s) => {
                write!(f, "PeerConnectionStateChange({s})")
            }
            RTCPeerConnectionEvent::DataChannel(dc) => {
                write!(f, "DataChannel({} {})", dc.id(), dc.label())
            }
            RTCPeerConnectionEvent::Track(t) => write!(f, "Track({})", t.mid()),
        }
    }
}
