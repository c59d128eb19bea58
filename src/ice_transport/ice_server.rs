use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

const SCHEME_STUN: &str = "stun";
const SCHEME_STUNS: &str = "stuns";
const SCHEME_TURN: &str = "turn";
const SCHEME_TURNS: &str = "turns";

/// ICEServer describes a single STUN and TURN server that can be used by
/// the ICEAgent to establish a connection with a peer.
///
/// The urls are handed to the transport layer unmodified; they are only
/// validated here.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCIceServer {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub credential: String,
}

impl RTCIceServer {
    pub(crate) fn validate(&self) -> Result<()> {
        self.urls()?;
        Ok(())
    }

    pub(crate) fn urls(&self) -> Result<Vec<Url>> {
        let mut urls = vec![];

        for url_str in &self.urls {
            let url = Url::parse(url_str)?;
            match url.scheme() {
                SCHEME_STUN | SCHEME_STUNS => {}
                SCHEME_TURN | SCHEME_TURNS => {
                    // https://www.w3.org/TR/webrtc/#set-the-configuration (step #11.3.2)
                    if self.username.is_empty() || self.credential.is_empty() {
                        return Err(Error::ErrNoTurnCredentials);
                    }
                }
                scheme => return Err(Error::ErrUnknownIceServerScheme(scheme.to_owned())),
            }

            urls.push(url);
        }

        Ok(urls)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ice_server_validate_success() {
        let tests = vec![
            RTCIceServer {
                urls: vec!["stun:stun.l.google.com:19302".to_owned()],
                ..Default::default()
            },
            RTCIceServer {
                urls: vec!["turn:192.158.29.39?transport=udp".to_owned()],
                username: "unittest".to_owned(),
                credential: "placeholder".to_owned(),
            },
            RTCIceServer {
                urls: vec![
                    "stuns:stun.example.org:5349".to_owned(),
                    "turns:[2001:db8:1234:5678::1]?transport=tcp".to_owned(),
                ],
                username: "unittest".to_owned(),
                credential: "placeholder".to_owned(),
            },
        ];

        for ice_server in tests {
            let result = ice_server.urls();
            assert!(result.is_ok(), "{ice_server:?} should be valid: {result:?}");
        }
    }

    #[test]
    fn test_ice_server_validate_failure() {
        let tests = vec![
            (
                RTCIceServer {
                    urls: vec!["turn:192.158.29.39?transport=udp".to_owned()],
                    ..Default::default()
                },
                Error::ErrNoTurnCredentials,
            ),
            (
                RTCIceServer {
                    urls: vec!["http://example.org".to_owned()],
                    ..Default::default()
                },
                Error::ErrUnknownIceServerScheme("http".to_owned()),
            ),
        ];

        for (ice_server, expected_err) in tests {
            match ice_server.validate() {
                Err(err) => assert_eq!(err.to_string(), expected_err.to_string()),
                Ok(_) => panic!("expected error {expected_err}"),
            }
        }

        let malformed = RTCIceServer {
            urls: vec!["stun.l.google.com".to_owned()],
            ..Default::default()
        };
        assert!(matches!(malformed.validate(), Err(Error::ParseUrl(_))));
    }

    #[test]
    fn test_ice_server_json() {
        let server: RTCIceServer =
            serde_json::from_str(r#"{"urls":["stun:stun.l.google.com:19302"]}"#).unwrap();
        assert_eq!(server.urls, vec!["stun:stun.l.google.com:19302".to_owned()]);
        assert!(server.username.is_empty());
        assert!(server.validate().is_ok());
    }
}
