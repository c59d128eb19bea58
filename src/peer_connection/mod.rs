#[cfg(test)]
mod peer_connection_test;

pub mod configuration;
pub mod event;
pub(crate) mod negotiator;
pub mod peer_connection_state;
pub mod sdp;
pub mod signaling_state;

mod peer_connection_internal;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use portable_atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use rand::random;
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::api::setting_engine::SettingEngine;
use crate::api::API;
use crate::data_channel::{RTCDataChannel, DATA_CHANNEL_LABEL_LIMIT};
use crate::error::{flatten_errs, Error, Result};
use crate::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use crate::ice_transport::ice_gatherer::{
    OnIceGatheringStateChangeHdlrFn, OnLocalCandidateHdlrFn, RTCIceGatherer,
};
use crate::ice_transport::ice_gathering_state::RTCIceGatheringState;
use crate::ice_transport::ice_parameters::RTCIceParameters;
use crate::peer_connection::sdp::sdp_type::RTCSdpType;
use crate::peer_connection::sdp::session_description::RTCSessionDescription;
use crate::peer_connection::sdp::{extract_remote_details, DATA_CHANNEL_MID};
use crate::track::track_init::TrackInit;
use crate::track::RTCMediaTrack;
use crate::transport::Transport;
use configuration::RTCConfiguration;
use event::RTCPeerConnectionEvent;
use negotiator::Negotiator;
use peer_connection_internal::PeerConnectionInternal;
use peer_connection_state::RTCPeerConnectionState;
use signaling_state::RTCSignalingState;

/// Events buffered per subscriber before a slow one starts lagging.
const EVENT_CHANNEL_CAPACITY: usize = 128;

pub type OnLocalDescriptionHdlrFn = Box<
    dyn (FnMut(RTCSessionDescription) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnSignalingStateChangeHdlrFn = Box<
    dyn (FnMut(RTCSignalingState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnPeerConnectionStateChangeHdlrFn = Box<
    dyn (FnMut(RTCPeerConnectionState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnDataChannelHdlrFn = Box<
    dyn (FnMut(Arc<RTCDataChannel>) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnTrackHdlrFn = Box<
    dyn (FnMut(Arc<RTCMediaTrack>) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

/// PeerConnection represents a WebRTC connection that establishes a
/// peer-to-peer communications with another PeerConnection instance in a
/// browser, or to another endpoint implementing the required protocols.
///
/// One side calls `create_offer`, the other `set_remote_description` with
/// that offer and then `create_answer`; the answer goes back through
/// `set_remote_description`. Once both sides are stable the transport
/// connects and every data channel and track opens.
pub struct RTCPeerConnection {
    pub(crate) internal: Arc<PeerConnectionInternal>,
}

impl std::fmt::Debug for RTCPeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTCPeerConnection")
            .field("signaling_state", &self.signaling_state())
            .field("ice_gathering_state", &self.ice_gathering_state())
            .field("connection_state", &self.connection_state())
            .finish()
    }
}

impl RTCPeerConnection {
    /// creates a PeerConnection on the transport of the API. The ICE servers
    /// of the configuration are validated, then handed to the transport as
    /// they are.
    pub(crate) async fn new(api: &API, configuration: RTCConfiguration) -> Result<Self> {
        configuration.validate()?;

        let transport = api
            .transport_factory
            .new_transport(&api.setting_engine)
            .await?;
        let internal = PeerConnectionInternal::new(
            Arc::clone(&api.setting_engine),
            configuration,
            transport,
        );

        Ok(RTCPeerConnection { internal })
    }

    /// on_local_description sets an event handler which is invoked every
    /// time the local description changes: when it is created and whenever
    /// gathering adds candidates to it.
    pub fn on_local_description(&self, f: OnLocalDescriptionHdlrFn) {
        self.internal
            .on_local_description_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_ice_candidate sets an event handler which is invoked when a new ICE
    /// candidate is found.
    /// Take note that the handler is gonna be called with a None when
    /// gathering is finished.
    pub fn on_ice_candidate(&self, f: OnLocalCandidateHdlrFn) {
        self.internal
            .on_ice_candidate_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_ice_gathering_state_change sets an event handler which is invoked when the
    /// ICE candidate gathering state has changed.
    pub fn on_ice_gathering_state_change(&self, f: OnIceGatheringStateChangeHdlrFn) {
        self.internal
            .on_ice_gathering_state_change_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_signaling_state_change sets an event handler which is invoked when the
    /// peer connection's signaling state changes
    pub fn on_signaling_state_change(&self, f: OnSignalingStateChangeHdlrFn) {
        self.internal
            .on_signaling_state_change_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_peer_connection_state_change sets an event handler which is called
    /// when the PeerConnectionState has changed
    pub fn on_peer_connection_state_change(&self, f: OnPeerConnectionStateChangeHdlrFn) {
        self.internal
            .on_peer_connection_state_change_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_data_channel sets an event handler which is invoked when the remote
    /// peer announces a data channel. The handler runs before the channel
    /// can receive anything, so handlers registered on the channel from it
    /// see every message.
    pub fn on_data_channel(&self, f: OnDataChannelHdlrFn) {
        self.internal
            .on_data_channel_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_track sets an event handler which is called when remote track
    /// arrives from a remote peer.
    pub fn on_track(&self, f: OnTrackHdlrFn) {
        self.internal
            .on_track_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// subscribe returns a receiver of every event of this peer connection.
    /// Any number of subscribers may exist next to the `on_*` handlers.
    pub fn subscribe(&self) -> broadcast::Receiver<RTCPeerConnectionEvent> {
        self.internal.events_tx.subscribe()
    }

    /// create_offer starts the session as the offering side. The returned
    /// description carries the data channels and tracks created so far;
    /// candidates are added to the local description as gathering finds
    /// them.
    pub async fn create_offer(&self) -> Result<RTCSessionDescription> {
        self.create_local_description(RTCSdpType::Offer).await
    }

    /// create_answer answers the remote offer. Once applied, the transport
    /// connects to the offering side.
    pub async fn create_answer(&self) -> Result<RTCSessionDescription> {
        let desc = self.create_local_description(RTCSdpType::Answer).await?;
        self.internal.start_transport().await;
        Ok(desc)
    }

    async fn create_local_description(&self, sdp_type: RTCSdpType) -> Result<RTCSessionDescription> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }
        self.internal.negotiator.check_local(sdp_type)?;

        let desc = self.internal.generate_local_description(sdp_type).await?;
        let state = self
            .internal
            .negotiator
            .set_local_description(desc.clone())
            .await?;
        self.internal.do_signaling_state_change(state).await;
        self.internal.do_local_description(desc.clone()).await;

        if let Err(err) = self.internal.ice_gatherer.gather().await {
            // the description stays usable with the credentials alone
            log::warn!("failed to gather candidates for the {sdp_type}: {err}");
        }

        Ok(desc)
    }

    /// set_remote_description applies the description of the remote peer.
    /// The description is validated completely before anything changes, so
    /// a rejected description leaves the connection as it was.
    pub async fn set_remote_description(&self, mut desc: RTCSessionDescription) -> Result<()> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }
        if desc.sdp_type == RTCSdpType::Unspecified {
            return Err(Error::ErrSessionDescriptionUnsupportedType(desc.sdp_type));
        }
        self.internal.negotiator.check_remote(desc.sdp_type)?;

        let parsed = match desc.parsed.take() {
            Some(parsed) => parsed,
            None => desc.unmarshal()?,
        };
        let details = extract_remote_details(&parsed)?;
        desc.parsed = Some(parsed);

        let sdp_type = desc.sdp_type;
        let state = self.internal.negotiator.set_remote_description(desc).await?;
        {
            let mut remote_ice_parameters = self.internal.remote_ice_parameters.lock().await;
            *remote_ice_parameters = Some(details.ice_params.clone());
        }
        self.internal.do_signaling_state_change(state).await;

        for candidate in details.candidates {
            if let Err(err) = self.internal.transport.add_remote_candidate(candidate).await {
                log::warn!("failed to add remote candidate: {err}");
            }
        }

        if sdp_type == RTCSdpType::Offer {
            self.internal
                .renumber_data_channels(&details.data_channels)
                .await;
        }
        self.internal
            .add_remote_data_channels(details.data_channels)
            .await;
        self.internal.add_remote_tracks(details.tracks).await;

        if state == RTCSignalingState::Stable {
            self.internal.start_transport().await;
        }

        Ok(())
    }

    /// add_ice_candidate accepts an ICE candidate string and adds it
    /// to the existing set of candidates. An empty candidate marks the end
    /// of the remote candidates.
    pub async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<()> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }
        if self.remote_description().await.is_none() {
            return Err(Error::ErrNoRemoteDescription);
        }

        let candidate_value = candidate.candidate.trim();
        if candidate_value.is_empty() {
            log::debug!("end of remote candidates");
            return Ok(());
        }

        let c = RTCIceCandidate::unmarshal(candidate_value)?;
        self.internal.transport.add_remote_candidate(c).await
    }

    /// create_data_channel creates a new DataChannel object with the given
    /// label. Channels must exist before the description announcing them is
    /// created: before `create_offer` on the offering side, before
    /// `create_answer` on the answering side.
    pub async fn create_data_channel(&self, label: &str) -> Result<Arc<RTCDataChannel>> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }
        if label.len() > DATA_CHANNEL_LABEL_LIMIT {
            return Err(Error::ErrStringSizeLimit);
        }
        // the label is written into the description verbatim
        if label.contains(['"', '\r', '\n']) {
            return Err(Error::new(format!("invalid data channel label {label:?}")));
        }

        let parity = self.internal.local_parity()?;
        let mut data_channels = self.internal.data_channels.lock().await;
        let used: Vec<u16> = data_channels.iter().map(|dc| dc.id()).collect();
        let id = PeerConnectionInternal::next_data_channel_id(parity, &used)?;

        let d = Arc::new(RTCDataChannel::new(label.to_owned(), id));
        data_channels.push(Arc::clone(&d));
        log::debug!("created data channel {label} ({id})");

        Ok(d)
    }

    /// add_track creates a local track. Like data channels, tracks must be
    /// added before the description announcing them is created.
    pub async fn add_track(&self, init: TrackInit) -> Result<Arc<RTCMediaTrack>> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }
        init.validate()?;
        self.internal.local_parity()?;

        if init.cname == DATA_CHANNEL_MID {
            return Err(Error::ErrExistingTrack);
        }

        let mut tracks = self.internal.tracks.lock().await;
        if tracks.iter().any(|t| {
            t.cname() == init.cname || (init.direction.has_send() && t.ssrc() == init.ssrc)
        }) {
            return Err(Error::ErrExistingTrack);
        }

        let track = Arc::new(RTCMediaTrack::new(
            init,
            false,
            Arc::clone(&self.internal.setting_engine),
        ));
        tracks.push(Arc::clone(&track));
        log::debug!("added track {}", track.mid());

        Ok(track)
    }

    /// data_channels returns every data channel, local and remote.
    pub async fn data_channels(&self) -> Vec<Arc<RTCDataChannel>> {
        let data_channels = self.internal.data_channels.lock().await;
        data_channels.clone()
    }

    /// tracks returns every track, local and remote.
    pub async fn tracks(&self) -> Vec<Arc<RTCMediaTrack>> {
        let tracks = self.internal.tracks.lock().await;
        tracks.clone()
    }

    /// local_description returns the latest rendition of the local
    /// description, including the candidates gathered so far.
    pub async fn local_description(&self) -> Option<RTCSessionDescription> {
        self.internal.negotiator.local_description().await
    }

    pub async fn remote_description(&self) -> Option<RTCSessionDescription> {
        self.internal.negotiator.remote_description().await
    }

    /// signaling_state attribute returns the signaling state of the
    /// PeerConnection instance.
    pub fn signaling_state(&self) -> RTCSignalingState {
        self.internal.negotiator.signaling_state()
    }

    /// ice_gathering_state attribute returns the ICE gathering state of the
    /// PeerConnection instance.
    pub fn ice_gathering_state(&self) -> RTCIceGatheringState {
        self.internal.ice_gatherer.state()
    }

    /// connection_state attribute returns the connection state of the
    /// PeerConnection instance.
    pub fn connection_state(&self) -> RTCPeerConnectionState {
        self.internal
            .peer_connection_state
            .load(Ordering::SeqCst)
            .into()
    }

    /// gathering_complete waits until candidate gathering has completed. The
    /// local description is final from then on and can be handed to the
    /// remote peer.
    pub async fn gathering_complete(&self) {
        self.internal.ice_gatherer.gathering_complete().await;
    }

    /// get_configuration returns the configuration the connection was
    /// created with.
    pub fn get_configuration(&self) -> &RTCConfiguration {
        &self.internal.configuration
    }

    /// close ends the PeerConnection: every data channel and track closes,
    /// gathering stops and the transport is released. Closing twice does
    /// nothing.
    pub async fn close(&self) -> Result<()> {
        if self.internal.is_closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        log::debug!("closing peer connection");

        let mut close_errs: Vec<Error> = vec![];

        if self.internal.negotiator.close().await {
            self.internal
                .do_signaling_state_change(RTCSignalingState::Closed)
                .await;
        }

        self.internal.ice_gatherer.close();

        {
            let mut dispatcher_close_tx = self.internal.dispatcher_close_tx.lock().await;
            dispatcher_close_tx.take();
        }

        for dc in self.data_channels().await {
            if let Err(err) = dc.close().await {
                close_errs.push(err);
            }
        }

        for track in self.tracks().await {
            if let Err(err) = track.close().await {
                close_errs.push(err);
            }
        }

        if let Err(err) = self.internal.transport.close().await {
            close_errs.push(err);
        }

        self.internal
            .do_peer_connection_state_change(RTCPeerConnectionState::Closed)
            .await;

        flatten_errs(close_errs)
    }
}
