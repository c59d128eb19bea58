use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::track::codec::RTCCodec;
use crate::track::nal_unit_separator::NalUnitSeparator;

/// RTCTrackDirection tells which way media flows on a track, seen from the
/// local peer.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RTCTrackDirection {
    #[serde(rename = "Unspecified")]
    Unspecified,
    #[default]
    #[serde(rename = "sendonly")]
    SendOnly,
    #[serde(rename = "recvonly")]
    RecvOnly,
    #[serde(rename = "sendrecv")]
    SendRecv,
}

const DIRECTION_SEND_ONLY_STR: &str = "sendonly";
const DIRECTION_RECV_ONLY_STR: &str = "recvonly";
const DIRECTION_SEND_RECV_STR: &str = "sendrecv";

impl From<&str> for RTCTrackDirection {
    fn from(raw: &str) -> Self {
        match raw {
            DIRECTION_SEND_ONLY_STR => RTCTrackDirection::SendOnly,
            DIRECTION_RECV_ONLY_STR => RTCTrackDirection::RecvOnly,
            DIRECTION_SEND_RECV_STR => RTCTrackDirection::SendRecv,
            _ => RTCTrackDirection::Unspecified,
        }
    }
}

impl fmt::Display for RTCTrackDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCTrackDirection::SendOnly => DIRECTION_SEND_ONLY_STR,
            RTCTrackDirection::RecvOnly => DIRECTION_RECV_ONLY_STR,
            RTCTrackDirection::SendRecv => DIRECTION_SEND_RECV_STR,
            RTCTrackDirection::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

impl RTCTrackDirection {
    /// reverse is the direction the remote peer sees.
    pub fn reverse(&self) -> RTCTrackDirection {
        match *self {
            RTCTrackDirection::SendOnly => RTCTrackDirection::RecvOnly,
            RTCTrackDirection::RecvOnly => RTCTrackDirection::SendOnly,
            other => other,
        }
    }

    pub fn has_send(&self) -> bool {
        matches!(
            self,
            RTCTrackDirection::SendOnly | RTCTrackDirection::SendRecv
        )
    }

    pub fn has_recv(&self) -> bool {
        matches!(
            self,
            RTCTrackDirection::RecvOnly | RTCTrackDirection::SendRecv
        )
    }
}

/// TrackInit configures a media track at creation time.
///
/// Its JSON form uses the option names of the scripting API:
///
/// ```json
/// {"cname": "video1", "codec": "H264", "direction": "sendonly",
///  "msid": "stream1", "ssrc": 1234, "payloadType": 102,
///  "nalUnitSeparator": "length"}
/// ```
///
/// `direction` defaults to `sendonly`, `nalUnitSeparator` to `length` and
/// `msid` to no stream. Unknown fields are rejected.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TrackInit {
    /// cname correlates the track across RTP and RTCP. It also names the
    /// media section (mid) of the track.
    pub cname: String,
    pub codec: RTCCodec,
    #[serde(default)]
    pub direction: RTCTrackDirection,
    #[serde(default)]
    pub msid: String,
    pub ssrc: u32,
    pub payload_type: u8,
    #[serde(default)]
    pub nal_unit_separator: NalUnitSeparator,
}

impl TrackInit {
    /// from_json parses and validates a track configuration.
    pub fn from_json(raw: &str) -> Result<TrackInit> {
        let init: TrackInit = serde_json::from_str(raw)?;
        init.validate()?;
        Ok(init)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.cname.is_empty() || self.cname.chars().any(char::is_whitespace) {
            return Err(Error::new(format!("invalid track cname {:?}", self.cname)));
        }
        if self.msid.chars().any(char::is_whitespace) {
            return Err(Error::new(format!("invalid track msid {:?}", self.msid)));
        }
        if self.codec == RTCCodec::Unspecified {
            return Err(Error::new("track codec is required".to_owned()));
        }
        if self.direction == RTCTrackDirection::Unspecified {
            return Err(Error::new("track direction is required".to_owned()));
        }
        // dynamic payload types only, RFC 3551 section 6
        if !(96..=127).contains(&self.payload_type) {
            return Err(Error::new(format!(
                "track payload type {} is not dynamic",
                self.payload_type
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_track_direction() {
        let tests = vec![
            ("sendonly", RTCTrackDirection::SendOnly, RTCTrackDirection::RecvOnly),
            ("recvonly", RTCTrackDirection::RecvOnly, RTCTrackDirection::SendOnly),
            ("sendrecv", RTCTrackDirection::SendRecv, RTCTrackDirection::SendRecv),
        ];

        for (direction_string, expected_direction, expected_reverse) in tests {
            let direction = RTCTrackDirection::from(direction_string);
            assert_eq!(direction, expected_direction);
            assert_eq!(direction.to_string(), direction_string);
            assert_eq!(direction.reverse(), expected_reverse);
        }
    }

    #[test]
    fn test_track_init_from_json() -> Result<()> {
        let init = TrackInit::from_json(
            r#"{
                "cname": "video1",
                "codec": "H264",
                "direction": "sendonly",
                "msid": "stream1",
                "ssrc": 1234,
                "payloadType": 102,
                "nalUnitSeparator": "length"
            }"#,
        )?;

        assert_eq!(
            init,
            TrackInit {
                cname: "video1".to_owned(),
                codec: RTCCodec::H264,
                direction: RTCTrackDirection::SendOnly,
                msid: "stream1".to_owned(),
                ssrc: 1234,
                payload_type: 102,
                nal_unit_separator: NalUnitSeparator::Length,
            }
        );

        Ok(())
    }

    #[test]
    fn test_track_init_defaults() -> Result<()> {
        let init =
            TrackInit::from_json(r#"{"cname":"audio","codec":"opus","ssrc":5,"payloadType":111}"#)?;

        assert_eq!(init.direction, RTCTrackDirection::SendOnly);
        assert_eq!(init.nal_unit_separator, NalUnitSeparator::Length);
        assert!(init.msid.is_empty());

        Ok(())
    }

    #[test]
    fn test_track_init_rejects() {
        let tests = vec![
            (
                "unknown field",
                r#"{"cname":"v","codec":"H264","ssrc":1,"payloadType":102,"bitrate":1}"#,
            ),
            ("missing ssrc", r#"{"cname":"v","codec":"H264","payloadType":102}"#),
            (
                "unknown codec",
                r#"{"cname":"v","codec":"G711","ssrc":1,"payloadType":102}"#,
            ),
            (
                "unknown direction",
                r#"{"cname":"v","codec":"H264","direction":"inactive","ssrc":1,"payloadType":102}"#,
            ),
            (
                "empty cname",
                r#"{"cname":"","codec":"H264","ssrc":1,"payloadType":102}"#,
            ),
            (
                "static payload type",
                r#"{"cname":"v","codec":"H264","ssrc":1,"payloadType":0}"#,
            ),
        ];

        for (name, raw) in tests {
            assert!(TrackInit::from_json(raw).is_err(), "{name} should be rejected");
        }
    }
}
