use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use portable_atomic::{AtomicBool, Ordering};
use rand::{thread_rng, Rng};
use tokio::sync::{mpsc, Mutex};

use super::{RtcpMessage, Transport, TransportEvent, TransportFactory};
use crate::api::setting_engine::SettingEngine;
use crate::data_channel::data_channel_message::DataChannelMessage;
use crate::error::{Error, Result};
use crate::ice_transport::ice_candidate::RTCIceCandidate;
use crate::ice_transport::ice_candidate_type::RTCIceCandidateType;
use crate::ice_transport::ice_parameters::RTCIceParameters;
use crate::ice_transport::ice_server::RTCIceServer;

const RUNES_ALPHA: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

const LEN_UFRAG: usize = 16;
const LEN_PWD: usize = 32;

const LOOPBACK_ADDRESS: &str = "127.0.0.1";
const REFLEXIVE_ADDRESS: &str = "192.0.2.1";

/// math_rand_alpha generates a random alphabet sequence of the requested length.
pub(crate) fn math_rand_alpha(n: usize) -> String {
    let mut rng = thread_rng();

    (0..n)
        .map(|_| {
            let idx = rng.gen_range(0..RUNES_ALPHA.len());
            RUNES_ALPHA[idx] as char
        })
        .collect()
}

type EndpointMap = HashMap<String, mpsc::UnboundedSender<TransportEvent>>;

/// LoopbackNetwork connects transports living in the same process. Each
/// transport is reachable under its username fragment.
#[derive(Default, Clone)]
pub struct LoopbackNetwork {
    endpoints: Arc<Mutex<EndpointMap>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        LoopbackNetwork::default()
    }

    /// contains reports whether a transport is registered under `ufrag`.
    pub async fn contains(&self, ufrag: &str) -> bool {
        let endpoints = self.endpoints.lock().await;
        endpoints.contains_key(ufrag)
    }

    async fn register(
        &self,
        ufrag: &str,
        tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<()> {
        let mut endpoints = self.endpoints.lock().await;
        if endpoints.contains_key(ufrag) {
            return Err(Error::new(format!(
                "loopback endpoint {ufrag} already registered"
            )));
        }
        endpoints.insert(ufrag.to_owned(), tx);
        Ok(())
    }

    async fn lookup(&self, ufrag: &str) -> Option<mpsc::UnboundedSender<TransportEvent>> {
        let endpoints = self.endpoints.lock().await;
        endpoints.get(ufrag).cloned()
    }

    async fn unregister(&self, ufrag: &str) {
        let mut endpoints = self.endpoints.lock().await;
        endpoints.remove(ufrag);
    }
}

#[async_trait]
impl TransportFactory for LoopbackNetwork {
    async fn new_transport(&self, setting_engine: &SettingEngine) -> Result<Arc<dyn Transport>> {
        let transport = LoopbackTransport::new(self.clone(), setting_engine).await?;
        Ok(Arc::new(transport))
    }
}

/// LoopbackTransport delivers everything it is given to the peer it
/// connected to, in order and without loss.
pub struct LoopbackTransport {
    network: LoopbackNetwork,
    parameters: RTCIceParameters,
    port: u16,

    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    peer: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    remote_candidates: Mutex<Vec<RTCIceCandidate>>,
    closed: AtomicBool,
}

impl LoopbackTransport {
    pub async fn new(network: LoopbackNetwork, setting_engine: &SettingEngine) -> Result<Self> {
        let username_fragment = if setting_engine.candidates.username_fragment.is_empty() {
            math_rand_alpha(LEN_UFRAG)
        } else {
            setting_engine.candidates.username_fragment.clone()
        };
        let password = if setting_engine.candidates.password.is_empty() {
            math_rand_alpha(LEN_PWD)
        } else {
            setting_engine.candidates.password.clone()
        };

        let (tx, rx) = mpsc::unbounded_channel();
        network.register(&username_fragment, tx).await?;

        Ok(LoopbackTransport {
            network,
            parameters: RTCIceParameters {
                username_fragment,
                password,
                ice_lite: false,
            },
            port: thread_rng().gen_range(49152..=65535),
            inbound_rx: Mutex::new(Some(rx)),
            peer: Mutex::new(None),
            remote_candidates: Mutex::new(vec![]),
            closed: AtomicBool::new(false),
        })
    }

    /// remote_candidates returns the candidates learned for the peer so far.
    pub async fn remote_candidates(&self) -> Vec<RTCIceCandidate> {
        let remote_candidates = self.remote_candidates.lock().await;
        remote_candidates.clone()
    }

    fn host_candidate(&self) -> RTCIceCandidate {
        RTCIceCandidate {
            foundation: "1".to_owned(),
            component: 1,
            protocol: "udp".to_owned(),
            priority: 2130706431,
            address: LOOPBACK_ADDRESS.to_owned(),
            port: self.port,
            typ: RTCIceCandidateType::Host,
            ..Default::default()
        }
    }

    fn server_candidates(&self, ice_servers: &[RTCIceServer]) -> Result<Vec<RTCIceCandidate>> {
        let mut candidates = vec![];
        for server in ice_servers {
            for url in server.urls()? {
                let (typ, priority) = match url.scheme() {
                    "stun" | "stuns" => (RTCIceCandidateType::Srflx, 1694498815),
                    _ => (RTCIceCandidateType::Relay, 16777215),
                };
                candidates.push(RTCIceCandidate {
                    foundation: (candidates.len() + 2).to_string(),
                    component: 1,
                    protocol: "udp".to_owned(),
                    priority,
                    address: REFLEXIVE_ADDRESS.to_owned(),
                    port: self.port,
                    typ,
                    related_address: LOOPBACK_ADDRESS.to_owned(),
                    related_port: self.port,
                });
            }
        }
        Ok(candidates)
    }

    async fn deliver(&self, event: TransportEvent) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ErrTransportClosed);
        }

        let peer = self.peer.lock().await;
        match &*peer {
            Some(tx) => tx.send(event).map_err(|_| Error::ErrTransportClosed),
            None => Err(Error::ErrTransportNotConnected),
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn local_parameters(&self) -> RTCIceParameters {
        self.parameters.clone()
    }

    async fn gather(&self, ice_servers: &[RTCIceServer]) -> Result<mpsc::Receiver<RTCIceCandidate>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ErrTransportClosed);
        }

        let mut candidates = vec![self.host_candidate()];
        candidates.extend(self.server_candidates(ice_servers)?);

        let (tx, rx) = mpsc::channel(candidates.len());
        tokio::spawn(async move {
            for candidate in candidates {
                if tx.send(candidate).await.is_err() {
                    break;
                }
                tokio::task::yield_now().await;
            }
        });

        Ok(rx)
    }

    async fn add_remote_candidate(&self, candidate: RTCIceCandidate) -> Result<()> {
        log::trace!("loopback {}: remote candidate {candidate}", self.parameters.username_fragment);
        let mut remote_candidates = self.remote_candidates.lock().await;
        remote_candidates.push(candidate);
        Ok(())
    }

    async fn connect(
        &self,
        remote: &RTCIceParameters,
    ) -> Result<mpsc::UnboundedReceiver<TransportEvent>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ErrTransportClosed);
        }

        let Some(tx) = self.network.lookup(&remote.username_fragment).await else {
            return Err(Error::ErrTransportUnreachable(
                remote.username_fragment.clone(),
            ));
        };

        let rx = {
            let mut inbound_rx = self.inbound_rx.lock().await;
            inbound_rx.take().ok_or(Error::ErrTransportClosed)?
        };

        {
            let mut peer = self.peer.lock().await;
            *peer = Some(tx);
        }

        log::debug!(
            "loopback {} connected to {}",
            self.parameters.username_fragment,
            remote.username_fragment
        );

        Ok(rx)
    }

    async fn send_data(&self, stream_id: u16, message: &DataChannelMessage) -> Result<()> {
        self.deliver(TransportEvent::DataChannelMessage {
            stream_id,
            message: message.clone(),
        })
        .await
    }

    async fn close_data_channel(&self, stream_id: u16) -> Result<()> {
        self.deliver(TransportEvent::DataChannelClose { stream_id })
            .await
    }

    async fn write_rtp(&self, packet: &rtp::packet::Packet) -> Result<()> {
        let packet = rtp::packet::Packet {
            header: packet.header.clone(),
            payload: packet.payload.clone(),
        };
        self.deliver(TransportEvent::Rtp(packet)).await
    }

    async fn write_rtcp(&self, packet: &RtcpMessage) -> Result<()> {
        self.deliver(TransportEvent::Rtcp(packet.clone())).await
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.network
            .unregister(&self.parameters.username_fragment)
            .await;
        {
            let mut peer = self.peer.lock().await;
            peer.take();
        }
        {
            let mut inbound_rx = self.inbound_rx.lock().await;
            inbound_rx.take();
        }

        Ok(())
    }
}
