
pub mod setting_engine;

use std::sync::Arc;

use setting_engine::*;

use crate::error::Result;
use crate::peer_connection::configuration::RTCConfiguration;
use crate::peer_connection::RTCPeerConnection;
use crate::transport::{LoopbackNetwork, TransportFactory};

/// API bundles the settings and the transport shared by the peer
/// connections it creates.
pub struct API {
    pub(crate) setting_engine: Arc<SettingEngine>,
    pub(crate) transport_factory: Arc<dyn TransportFactory>,
}

impl API {
    /// new_peer_connection creates a new PeerConnection with the provided configuration against the received API object
    pub async fn new_peer_connection(
        &self,
        configuration: RTCConfiguration,
    ) -> Result<RTCPeerConnection> {
        RTCPeerConnection::new(self, configuration).await
    }

    pub fn setting_engine(&self) -> &SettingEngine {
        &self.setting_engine
    }
}

#[derive(Default)]
pub struct APIBuilder {
    setting_engine: Option<Arc<SettingEngine>>,
    transport_factory: Option<Arc<dyn TransportFactory>>,
}

impl APIBuilder {
    pub fn new() -> Self {
        APIBuilder::default()
    }

    /// build creates the API. Without a transport factory the connections
    /// share an in-process loopback network.
    pub fn build(mut self) -> API {
        API {
            setting_engine: if let Some(setting_engine) = self.setting_engine.take() {
                setting_engine
            } else {
                Arc::new(SettingEngine::default())
            },
            transport_factory: if let Some(transport_factory) = self.transport_factory.take() {
                transport_factory
            } else {
                Arc::new(LoopbackNetwork::new())
            },
        }
    }

    /// with_setting_engine allows providing a SettingEngine to the API.
    /// Settings should not be changed after passing the engine to an API.
    pub fn with_setting_engine(mut self, setting_engine: SettingEngine) -> Self {
        self.setting_engine = Some(Arc::new(setting_engine));
        self
    }

    /// with_transport_factory plugs in the connectivity stack.
    pub fn with_transport_factory(mut self, transport_factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factory = Some(transport_factory);
        self
    }
}
