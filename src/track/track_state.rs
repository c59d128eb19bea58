use std::fmt;

/// RTCTrackState indicates the lifecycle state of a media track.
///
/// A track is `idle` until recording starts, `open` while frames may be
/// sent and `closed` after it was torn down. Closed is terminal.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCTrackState {
    #[default]
    Unspecified,
    Idle,
    Open,
    Closed,
}

const TRACK_STATE_IDLE_STR: &str = "idle";
const TRACK_STATE_OPEN_STR: &str = "open";
const TRACK_STATE_CLOSED_STR: &str = "closed";

impl From<u8> for RTCTrackState {
    fn from(v: u8) -> Self {
        match v {
            1 => RTCTrackState::Idle,
            2 => RTCTrackState::Open,
            3 => RTCTrackState::Closed,
            _ => RTCTrackState::Unspecified,
        }
    }
}

impl fmt::Display for RTCTrackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCTrackState::Idle => TRACK_STATE_IDLE_STR,
            RTCTrackState::Open => TRACK_STATE_OPEN_STR,
            RTCTrackState::Closed => TRACK_STATE_CLOSED_STR,
            RTCTrackState::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}
