//! The seam to the connectivity stack.
//!
//! Candidate gathering mechanics, encryption and congestion control live
//! behind [`Transport`]. The peer connection only drives it: gather, learn the
//! remote parameters, connect, then move data channel messages and RTP/RTCP
//! packets. [`loopback`] provides an in-process implementation.


pub mod loopback;

use std::sync::Arc;

use async_trait::async_trait;
use rtcp::sender_report::SenderReport;
use rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;
use tokio::sync::mpsc;

use crate::api::setting_engine::SettingEngine;
use crate::data_channel::data_channel_message::DataChannelMessage;
use crate::error::Result;
use crate::ice_transport::ice_candidate::RTCIceCandidate;
use crate::ice_transport::ice_parameters::RTCIceParameters;
use crate::ice_transport::ice_server::RTCIceServer;

pub use loopback::{LoopbackNetwork, LoopbackTransport};

/// RtcpMessage is a control packet exchanged alongside a media track.
#[derive(Debug, Clone, PartialEq)]
pub enum RtcpMessage {
    SenderReport(SenderReport),
    TransportLayerNack(TransportLayerNack),
}

/// TransportEvent is what arrives from the remote peer once connected, in
/// the order the peer sent it.
#[derive(Debug)]
pub enum TransportEvent {
    DataChannelMessage {
        stream_id: u16,
        message: DataChannelMessage,
    },
    DataChannelClose {
        stream_id: u16,
    },
    Rtp(rtp::packet::Packet),
    Rtcp(RtcpMessage),
}

/// Transport carries one peer connection to its remote peer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// local_parameters returns the credentials advertised in the local
    /// description.
    fn local_parameters(&self) -> RTCIceParameters;

    /// gather starts collecting local candidates. Candidates are delivered on
    /// the returned channel; the channel closing means gathering is complete.
    async fn gather(&self, ice_servers: &[RTCIceServer]) -> Result<mpsc::Receiver<RTCIceCandidate>>;

    /// add_remote_candidate adds a way to reach the remote peer.
    async fn add_remote_candidate(&self, candidate: RTCIceCandidate) -> Result<()>;

    /// connect establishes the connection to the peer identified by `remote`
    /// and returns the stream of inbound events.
    async fn connect(
        &self,
        remote: &RTCIceParameters,
    ) -> Result<mpsc::UnboundedReceiver<TransportEvent>>;

    async fn send_data(&self, stream_id: u16, message: &DataChannelMessage) -> Result<()>;

    /// close_data_channel tells the peer the channel on `stream_id` is gone.
    async fn close_data_channel(&self, stream_id: u16) -> Result<()>;

    async fn write_rtp(&self, packet: &rtp::packet::Packet) -> Result<()>;

    async fn write_rtcp(&self, packet: &RtcpMessage) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// TransportFactory creates the transport of each new peer connection.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn new_transport(&self, setting_engine: &SettingEngine) -> Result<Arc<dyn Transport>>;
}
