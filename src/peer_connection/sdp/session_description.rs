use std::io::Cursor;

use sdp::SessionDescription;
use serde::{Deserialize, Serialize};

use super::sdp_type::RTCSdpType;
use crate::error::{Error, Result};

/// RTCSessionDescription is the descriptor handed to the remote peer over an
/// out-of-band channel. Its text form is JSON: `{"type":"offer","sdp":"v=0..."}`.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct RTCSessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: RTCSdpType,

    pub sdp: String,

    /// This will never be initialized by callers, internal use only
    #[serde(skip)]
    pub(crate) parsed: Option<SessionDescription>,
}

impl PartialEq for RTCSessionDescription {
    fn eq(&self, other: &Self) -> bool {
        self.sdp_type == other.sdp_type && self.sdp == other.sdp
    }
}

impl RTCSessionDescription {
    /// Given SDP representing an answer, wrap it in an RTCSessionDescription
    /// that can be given to a remote peer.
    pub fn answer(sdp: String) -> Result<RTCSessionDescription> {
        let mut desc = RTCSessionDescription {
            sdp,
            sdp_type: RTCSdpType::Answer,
            parsed: None,
        };

        let parsed = desc.unmarshal()?;
        desc.parsed = Some(parsed);

        Ok(desc)
    }

    /// Given SDP representing an offer, wrap it in an RTCSessionDescription
    /// that can be given to a remote peer.
    pub fn offer(sdp: String) -> Result<RTCSessionDescription> {
        let mut desc = RTCSessionDescription {
            sdp,
            sdp_type: RTCSdpType::Offer,
            parsed: None,
        };

        let parsed = desc.unmarshal()?;
        desc.parsed = Some(parsed);

        Ok(desc)
    }

    /// unmarshal is a helper to deserialize the sdp
    pub fn unmarshal(&self) -> Result<SessionDescription> {
        let mut reader = Cursor::new(self.sdp.as_bytes());
        let parsed = SessionDescription::unmarshal(&mut reader)?;
        Ok(parsed)
    }

    /// to_json renders the text form exchanged with the remote peer.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// from_json parses the text form received from the remote peer. The
    /// type must be offer or answer and the sdp must parse.
    pub fn from_json(raw: &str) -> Result<RTCSessionDescription> {
        let mut desc: RTCSessionDescription = serde_json::from_str(raw)?;
        if desc.sdp_type == RTCSdpType::Unspecified {
            return Err(Error::ErrSessionDescriptionUnsupportedType(desc.sdp_type));
        }
        desc.parsed = Some(desc.unmarshal()?);
        Ok(desc)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const MINIMAL_SDP: &str = "v=0\r\n\
o=- 4215775240449105457 2 IN IP4 0.0.0.0\r\n\
s=-\r\n\
t=0 0\r\n";

    #[test]
    fn test_session_description_json() {
        let tests = vec![
            (
                RTCSessionDescription {
                    sdp_type: RTCSdpType::Offer,
                    sdp: "sdp".to_owned(),
                    parsed: None,
                },
                r#"{"type":"offer","sdp":"sdp"}"#,
            ),
            (
                RTCSessionDescription {
                    sdp_type: RTCSdpType::Answer,
                    sdp: "sdp".to_owned(),
                    parsed: None,
                },
                r#"{"type":"answer","sdp":"sdp"}"#,
            ),
            (
                RTCSessionDescription {
                    sdp_type: RTCSdpType::Unspecified,
                    sdp: "sdp".to_owned(),
                    parsed: None,
                },
                r#"{"type":"Unspecified","sdp":"sdp"}"#,
            ),
        ];

        for (desc, expected_string) in tests {
            let desc_data = serde_json::to_string(&desc).expect("marshal");
            assert_eq!(desc_data, expected_string, "string is not expected");

            let sd = serde_json::from_str::<RTCSessionDescription>(&desc_data).expect("unmarshal");
            assert_eq!(sd, desc);
        }
    }

    #[test]
    fn test_session_description_from_json() {
        let offer = RTCSessionDescription::offer(MINIMAL_SDP.to_owned()).expect("offer");
        let text = offer.to_json().expect("to_json");

        let parsed = RTCSessionDescription::from_json(&text).expect("from_json");
        assert_eq!(parsed, offer);
        assert!(parsed.parsed.is_some());
    }

    #[test]
    fn test_session_description_from_json_rejects() {
        let tests = vec![
            ("not json", r#"{"type":"offer""#),
            ("unknown type", r#"{"type":"rollback","sdp":""}"#),
            ("unspecified type", r#"{"type":"Unspecified","sdp":"v=0\r\n"}"#),
            ("garbage sdp", r#"{"type":"answer","sdp":"hello"}"#),
        ];

        for (name, raw) in tests {
            let err = RTCSessionDescription::from_json(raw).expect_err(name);
            assert!(err.is_descriptor_parse_error(), "{name}: {err}");
        }
    }
}
