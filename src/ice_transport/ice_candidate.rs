use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ice_transport::ice_candidate_type::RTCIceCandidateType;

const CANDIDATE_PREFIX: &str = "candidate:";

/// ICECandidate represents a ice candidate
///
/// ## Specifications
///
/// * [MDN]
/// * [W3C]
///
/// [MDN]: https://developer.mozilla.org/en-US/docs/Web/API/RTCIceCandidate
/// [W3C]: https://w3c.github.io/webrtc-pc/#rtcicecandidate-interface
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCIceCandidate {
    pub foundation: String,
    pub component: u16,
    pub protocol: String,
    pub priority: u32,
    pub address: String,
    pub port: u16,
    pub typ: RTCIceCandidateType,
    pub related_address: String,
    pub related_port: u16,
}

impl RTCIceCandidate {
    /// marshal renders the candidate-attribute value (RFC 8839 section 5.1)
    /// without the `candidate:` prefix.
    pub fn marshal(&self) -> String {
        let mut val = format!(
            "{} {} {} {} {} {} typ {}",
            self.foundation,
            self.component,
            self.protocol,
            self.priority,
            self.address,
            self.port,
            self.typ
        );

        if !self.related_address.is_empty() {
            val += format!(" raddr {} rport {}", self.related_address, self.related_port).as_str();
        }

        val
    }

    /// unmarshal parses a candidate-attribute value, with or without the
    /// `candidate:` prefix.
    pub fn unmarshal(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let raw = raw.strip_prefix(CANDIDATE_PREFIX).unwrap_or(raw);
        let split: Vec<&str> = raw.split_whitespace().collect();
        if split.len() < 8 || split[6] != "typ" {
            return Err(Error::ErrInvalidCandidate(raw.to_owned()));
        }

        let typ = RTCIceCandidateType::from(split[7]);
        if typ == RTCIceCandidateType::Unspecified {
            return Err(Error::ErrInvalidCandidate(raw.to_owned()));
        }

        let mut candidate = RTCIceCandidate {
            foundation: split[0].to_owned(),
            component: split[1].parse()?,
            protocol: split[2].to_lowercase(),
            priority: split[3].parse()?,
            address: split[4].to_owned(),
            port: split[5].parse()?,
            typ,
            ..Default::default()
        };

        let mut rest = split[8..].iter();
        while let (Some(key), Some(value)) = (rest.next(), rest.next()) {
            match *key {
                "raddr" => candidate.related_address = (*value).to_owned(),
                "rport" => candidate.related_port = value.parse()?,
                _ => {}
            }
        }

        Ok(candidate)
    }

    /// to_json returns an ICECandidateInit
    /// as defined by the W3C <https://w3c.github.io/webrtc-pc/#dom-rtcicecandidate-tojson>
    pub fn to_json(&self, sdp_mid: &str) -> RTCIceCandidateInit {
        RTCIceCandidateInit {
            candidate: format!("{CANDIDATE_PREFIX}{}", self.marshal()),
            sdp_mid: Some(sdp_mid.to_owned()),
            sdp_mline_index: Some(0u16),
            username_fragment: None,
        }
    }
}

impl fmt::Display for RTCIceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}:{}{}",
            self.protocol, self.typ, self.address, self.port, self.related_address,
        )
    }
}

/// ICECandidateInit is used to serialize ice candidates
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RTCIceCandidateInit {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    pub username_fragment: Option<String>,
}
