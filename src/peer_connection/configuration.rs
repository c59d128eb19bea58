use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ice_transport::ice_server::RTCIceServer;

/// A Configuration defines how peer-to-peer communication via PeerConnection
/// is established or re-established.
/// Configurations may be set up once and reused across multiple connections.
///
/// ## Specifications
///
/// * [W3C]
///
/// [W3C]: https://w3c.github.io/webrtc-pc/#dom-rtcconfiguration
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RTCConfiguration {
    /// ice_servers defines a slice describing servers available to be used by
    /// ICE, such as STUN and TURN servers. The list is handed to the
    /// transport in order and unmodified.
    #[serde(default)]
    pub ice_servers: Vec<RTCIceServer>,
}

impl RTCConfiguration {
    /// validate checks every ICE server URL.
    pub(crate) fn validate(&self) -> Result<()> {
        for server in &self.ice_servers {
            server.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_configuration_keeps_urls() {
        // a query on a stun url is tolerated and passed along as is
        let server_str = "stun:global.stun.twilio.com:3478?transport=udp";
        let cfg = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: vec![server_str.to_owned()],
                ..Default::default()
            }],
        };

        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.ice_servers[0].urls[0], server_str);
    }

    #[test]
    fn test_configuration_validate() {
        let cfg = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: vec!["turn:turn.example.org:3478".to_owned()],
                ..Default::default()
            }],
        };
        assert!(matches!(cfg.validate(), Err(Error::ErrNoTurnCredentials)));

        let cfg = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: vec!["http://example.org".to_owned()],
                ..Default::default()
            }],
        };
        assert!(matches!(
            cfg.validate(),
            Err(Error::ErrUnknownIceServerScheme(_))
        ));
    }

    #[test]
    fn test_configuration_json() -> Result<()> {
        let cfg: RTCConfiguration = serde_json::from_str(
            r#"{"iceServers":[{"urls":["stun:stun.l.google.com:19302"]}]}"#,
        )?;
        assert_eq!(cfg.ice_servers.len(), 1);
        assert_eq!(cfg.ice_servers[0].urls[0], "stun:stun.l.google.com:19302");

        let empty: RTCConfiguration = serde_json::from_str("{}")?;
        assert!(empty.ice_servers.is_empty());

        Ok(())
    }
}
