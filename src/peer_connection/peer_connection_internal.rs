use std::collections::HashSet;
use std::sync::Weak;

use super::*;
use crate::peer_connection::sdp::{
    generate_local_description, DataChannelEntry, LocalDescriptionParams,
};
use crate::transport::{RtcpMessage, TransportEvent};

pub(crate) struct PeerConnectionInternal {
    pub(super) setting_engine: Arc<SettingEngine>,
    pub(super) configuration: RTCConfiguration,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) ice_gatherer: Arc<RTCIceGatherer>,
    pub(super) negotiator: Negotiator,

    pub(super) is_closed: AtomicBool,
    pub(super) peer_connection_state: AtomicU8, //RTCPeerConnectionState
    pub(super) remote_ice_parameters: Mutex<Option<RTCIceParameters>>,
    session_id: u64,
    session_version: AtomicU64,

    /// Channels and tracks live as long as the connection holds them.
    pub(super) data_channels: Mutex<Vec<Arc<RTCDataChannel>>>,
    pub(super) tracks: Mutex<Vec<Arc<RTCMediaTrack>>>,

    pub(super) events_tx: broadcast::Sender<RTCPeerConnectionEvent>,
    /// Dropping the sender stops the inbound dispatcher.
    pub(super) dispatcher_close_tx: Mutex<Option<mpsc::Sender<()>>>,

    pub(super) on_local_description_handler: ArcSwapOption<Mutex<OnLocalDescriptionHdlrFn>>,
    pub(super) on_ice_candidate_handler: ArcSwapOption<Mutex<OnLocalCandidateHdlrFn>>,
    pub(super) on_ice_gathering_state_change_handler:
        ArcSwapOption<Mutex<OnIceGatheringStateChangeHdlrFn>>,
    pub(super) on_signaling_state_change_handler:
        ArcSwapOption<Mutex<OnSignalingStateChangeHdlrFn>>,
    pub(super) on_peer_connection_state_change_handler:
        ArcSwapOption<Mutex<OnPeerConnectionStateChangeHdlrFn>>,
    pub(super) on_data_channel_handler: ArcSwapOption<Mutex<OnDataChannelHdlrFn>>,
    pub(super) on_track_handler: ArcSwapOption<Mutex<OnTrackHdlrFn>>,
}

impl PeerConnectionInternal {
    pub(super) fn new(
        setting_engine: Arc<SettingEngine>,
        configuration: RTCConfiguration,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let ice_gatherer = Arc::new(RTCIceGatherer::new(
            Arc::clone(&transport),
            configuration.ice_servers.clone(),
        ));
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let pc = Arc::new(PeerConnectionInternal {
            setting_engine,
            configuration,
            transport,
            ice_gatherer,
            negotiator: Negotiator::new(),
            is_closed: AtomicBool::new(false),
            peer_connection_state: AtomicU8::new(RTCPeerConnectionState::New as u8),
            remote_ice_parameters: Mutex::new(None),
            session_id: random::<u64>() >> 1,
            session_version: AtomicU64::new(0),
            data_channels: Mutex::new(vec![]),
            tracks: Mutex::new(vec![]),
            events_tx,
            dispatcher_close_tx: Mutex::new(None),
            on_local_description_handler: ArcSwapOption::empty(),
            on_ice_candidate_handler: ArcSwapOption::empty(),
            on_ice_gathering_state_change_handler: ArcSwapOption::empty(),
            on_signaling_state_change_handler: ArcSwapOption::empty(),
            on_peer_connection_state_change_handler: ArcSwapOption::empty(),
            on_data_channel_handler: ArcSwapOption::empty(),
            on_track_handler: ArcSwapOption::empty(),
        });

        PeerConnectionInternal::bind_ice_gatherer(&pc);

        pc
    }

    /// bind_ice_gatherer routes the gatherer events through the connection.
    /// The gatherer only holds weak references back to it.
    fn bind_ice_gatherer(pc: &Arc<Self>) {
        let weak_pc = Arc::downgrade(pc);
        pc.ice_gatherer
            .on_local_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
                let weak_pc = Weak::clone(&weak_pc);
                Box::pin(async move {
                    if let Some(pc) = weak_pc.upgrade() {
                        if c.is_some() {
                            pc.refresh_local_description().await;
                        }
                        pc.do_ice_candidate(c).await;
                    }
                })
            }));

        let weak_pc = Arc::downgrade(pc);
        pc.ice_gatherer
            .on_state_change(Box::new(move |state: RTCIceGatheringState| {
                let weak_pc = Weak::clone(&weak_pc);
                Box::pin(async move {
                    if let Some(pc) = weak_pc.upgrade() {
                        pc.do_ice_gathering_state_change(state).await;
                    }
                })
            }));

        let weak_pc = Arc::downgrade(pc);
        pc.ice_gatherer.on_gathering_complete(Box::new(move || {
            let weak_pc = Weak::clone(&weak_pc);
            Box::pin(async move {
                if let Some(pc) = weak_pc.upgrade() {
                    pc.refresh_local_description().await;
                }
            })
        }));
    }

    fn emit(&self, event: RTCPeerConnectionEvent) {
        // no subscriber is not an error
        let _ = self.events_tx.send(event);
    }

    pub(super) async fn do_local_description(&self, desc: RTCSessionDescription) {
        log::trace!("local {} updated", desc.sdp_type);
        if let Some(handler) = &*self.on_local_description_handler.load() {
            let mut f = handler.lock().await;
            f(desc.clone()).await;
        }
        self.emit(RTCPeerConnectionEvent::LocalDescription(desc));
    }

    async fn do_ice_candidate(&self, c: Option<RTCIceCandidate>) {
        if let Some(handler) = &*self.on_ice_candidate_handler.load() {
            let mut f = handler.lock().await;
            f(c.clone()).await;
        }
        self.emit(RTCPeerConnectionEvent::IceCandidate(c));
    }

    async fn do_ice_gathering_state_change(&self, state: RTCIceGatheringState) {
        log::info!("ICE gathering state changed: {state}");
        if let Some(handler) = &*self.on_ice_gathering_state_change_handler.load() {
            let mut f = handler.lock().await;
            f(state).await;
        }
        self.emit(RTCPeerConnectionEvent::IceGatheringStateChange(state));
    }

    pub(super) async fn do_signaling_state_change(&self, state: RTCSignalingState) {
        log::info!("signaling state changed to {state}");
        if let Some(handler) = &*self.on_signaling_state_change_handler.load() {
            let mut f = handler.lock().await;
            f(state).await;
        }
        self.emit(RTCPeerConnectionEvent::SignalingStateChange(state));
    }

    /// do_peer_connection_state_change stores the state and reports it when
    /// it changed. Closed is final.
    pub(super) async fn do_peer_connection_state_change(&self, state: RTCPeerConnectionState) {
        let prev: RTCPeerConnectionState = self.peer_connection_state.load(Ordering::SeqCst).into();
        if prev == state || prev == RTCPeerConnectionState::Closed {
            return;
        }
        self.peer_connection_state
            .store(state as u8, Ordering::SeqCst);

        log::info!("peer connection state changed: {state}");
        if let Some(handler) = &*self.on_peer_connection_state_change_handler.load() {
            let mut f = handler.lock().await;
            f(state).await;
        }
        self.emit(RTCPeerConnectionEvent::PeerConnectionStateChange(state));
    }

    async fn do_data_channel(&self, d: Arc<RTCDataChannel>) {
        log::debug!("remote peer announced data channel {} ({})", d.label(), d.id());
        if let Some(handler) = &*self.on_data_channel_handler.load() {
            let mut f = handler.lock().await;
            f(Arc::clone(&d)).await;
        } else {
            log::warn!("on_data_channel unset, data channel {} unattended", d.label());
        }
        self.emit(RTCPeerConnectionEvent::DataChannel(d));
    }

    async fn do_track(&self, t: Arc<RTCMediaTrack>) {
        log::debug!("got new track: {}", t.mid());
        if let Some(handler) = &*self.on_track_handler.load() {
            let mut f = handler.lock().await;
            f(Arc::clone(&t)).await;
        } else {
            log::warn!("on_track unset, unable to handle incoming media streams");
        }
        self.emit(RTCPeerConnectionEvent::Track(t));
    }

    /// local_parity is the parity of the stream IDs this side allocates:
    /// even for the offering side, odd for the answering side. Channels and
    /// tracks can only be created while the next local description is
    /// still to come.
    pub(super) fn local_parity(&self) -> Result<u16> {
        match self.negotiator.signaling_state() {
            RTCSignalingState::New => Ok(0),
            RTCSignalingState::HaveRemoteOffer => Ok(1),
            RTCSignalingState::Closed => Err(Error::ErrConnectionClosed),
            state => Err(Error::ErrIncorrectSignalingState(state)),
        }
    }

    /// next_data_channel_id returns the lowest free stream ID of the given
    /// parity.
    pub(super) fn next_data_channel_id(parity: u16, used: &[u16]) -> Result<u16> {
        // 65535 is reserved
        (parity..u16::MAX)
            .step_by(2)
            .find(|id| !used.contains(id))
            .ok_or(Error::ErrMaxDataChannelID)
    }

    /// generate_local_description renders the local description from the
    /// current channels, tracks and candidates.
    pub(super) async fn generate_local_description(
        &self,
        sdp_type: RTCSdpType,
    ) -> Result<RTCSessionDescription> {
        let data_channels: Vec<DataChannelEntry> = {
            let data_channels = self.data_channels.lock().await;
            data_channels
                .iter()
                .map(|dc| DataChannelEntry {
                    id: dc.id(),
                    label: dc.label().to_owned(),
                })
                .collect()
        };
        let tracks: Vec<TrackInit> = {
            let tracks = self.tracks.lock().await;
            tracks.iter().map(|t| t.init().clone()).collect()
        };
        let ice_params = self.ice_gatherer.get_local_parameters();
        let candidates = self.ice_gatherer.get_local_candidates().await;

        let d = generate_local_description(&LocalDescriptionParams {
            session_id: self.session_id,
            session_version: self.session_version.fetch_add(1, Ordering::SeqCst),
            ice_params: &ice_params,
            candidates: &candidates,
            gathering_complete: self.ice_gatherer.state() == RTCIceGatheringState::Complete,
            data_channels: &data_channels,
            tracks: &tracks,
        });

        Ok(RTCSessionDescription {
            sdp_type,
            sdp: d.marshal(),
            parsed: Some(d),
        })
    }

    /// refresh_local_description re-renders the local description after
    /// gathering progressed and reports it when it was replaced.
    async fn refresh_local_description(&self) {
        let Some(local) = self.negotiator.local_description().await else {
            return;
        };

        let desc = match self.generate_local_description(local.sdp_type).await {
            Ok(desc) => desc,
            Err(err) => {
                log::warn!("failed to refresh local {}: {err}", local.sdp_type);
                return;
            }
        };

        if desc.sdp != local.sdp
            && self
                .negotiator
                .update_local_description(desc.clone())
                .await
        {
            self.do_local_description(desc).await;
        }
    }

    /// renumber_data_channels moves the channels created before an offer
    /// arrived to the answering side's odd stream IDs.
    pub(super) async fn renumber_data_channels(&self, remote: &[DataChannelEntry]) {
        let data_channels = self.data_channels.lock().await;
        let mut used: Vec<u16> = remote.iter().map(|entry| entry.id).collect();

        for dc in data_channels.iter() {
            let id = match PeerConnectionInternal::next_data_channel_id(1, &used) {
                Ok(id) => id,
                Err(err) => {
                    log::warn!("data channel {} keeps stream id {}: {err}", dc.label(), dc.id());
                    continue;
                }
            };
            log::debug!("data channel {} moves from {} to {id}", dc.label(), dc.id());
            dc.set_id(id);
            used.push(id);
        }
    }

    /// add_remote_data_channels creates the channels the remote peer
    /// announced and this side does not know yet.
    pub(super) async fn add_remote_data_channels(&self, entries: Vec<DataChannelEntry>) {
        let mut announced = vec![];
        {
            let mut data_channels = self.data_channels.lock().await;
            for entry in entries {
                if data_channels.iter().any(|dc| dc.id() == entry.id) {
                    continue;
                }
                let d = Arc::new(RTCDataChannel::new(entry.label, entry.id));
                data_channels.push(Arc::clone(&d));
                announced.push(d);
            }
        }

        for d in announced {
            self.do_data_channel(d).await;
        }
    }

    /// add_remote_tracks creates a receiving track for every track the
    /// remote peer sends and this side does not know yet.
    pub(super) async fn add_remote_tracks(&self, remote_tracks: Vec<TrackInit>) {
        let mut announced = vec![];
        {
            let mut tracks = self.tracks.lock().await;
            for mut init in remote_tracks {
                if tracks.iter().any(|t| t.mid() == init.cname) {
                    continue;
                }
                if !init.direction.has_send() {
                    log::debug!("remote track {} does not send, ignored", init.cname);
                    continue;
                }

                init.direction = init.direction.reverse();
                let t = Arc::new(RTCMediaTrack::new(
                    init,
                    true,
                    Arc::clone(&self.setting_engine),
                ));
                tracks.push(Arc::clone(&t));
                announced.push(t);
            }
        }

        for t in announced {
            self.do_track(t).await;
        }
    }

    /// start_transport connects to the remote peer once negotiation is
    /// stable, then opens every channel and track.
    pub(super) async fn start_transport(self: &Arc<Self>) {
        let remote = {
            let remote_ice_parameters = self.remote_ice_parameters.lock().await;
            remote_ice_parameters.clone()
        };
        let Some(remote) = remote else {
            log::warn!("no remote ICE parameters, unable to connect");
            return;
        };

        self.do_peer_connection_state_change(RTCPeerConnectionState::Connecting)
            .await;

        let events_rx = match self.transport.connect(&remote).await {
            Ok(events_rx) => events_rx,
            Err(err) => {
                log::warn!("failed to connect to {}: {err}", remote.username_fragment);
                self.do_peer_connection_state_change(RTCPeerConnectionState::Failed)
                    .await;
                return;
            }
        };

        if self.is_closed.load(Ordering::SeqCst) {
            return;
        }
        self.do_peer_connection_state_change(RTCPeerConnectionState::Connected)
            .await;

        let data_channels = {
            let data_channels = self.data_channels.lock().await;
            data_channels.clone()
        };
        for d in data_channels {
            d.handle_open(Arc::clone(&self.transport)).await;
        }

        let tracks = {
            let tracks = self.tracks.lock().await;
            tracks.clone()
        };
        for t in tracks {
            t.handle_open(Arc::clone(&self.transport)).await;
        }

        let (close_tx, close_rx) = mpsc::channel(1);
        {
            let mut dispatcher_close_tx = self.dispatcher_close_tx.lock().await;
            *dispatcher_close_tx = Some(close_tx);
        }

        let weak_pc = Arc::downgrade(self);
        tokio::spawn(async move {
            PeerConnectionInternal::dispatch_inbound(weak_pc, events_rx, close_rx).await;
        });
    }

    /// dispatch_inbound hands every inbound event to the channel or track it
    /// belongs to, one at a time and in arrival order.
    async fn dispatch_inbound(
        weak_pc: Weak<Self>,
        mut events_rx: mpsc::UnboundedReceiver<TransportEvent>,
        mut close_rx: mpsc::Receiver<()>,
    ) {
        let mut unknown_streams: HashSet<u16> = HashSet::new();

        loop {
            let event = tokio::select! {
                _ = close_rx.recv() => {
                    log::trace!("inbound dispatcher stopped");
                    return;
                }
                event = events_rx.recv() => match event {
                    Some(event) => event,
                    None => {
                        log::debug!("transport closed, inbound dispatcher done");
                        return;
                    }
                },
            };

            let Some(pc) = weak_pc.upgrade() else {
                return;
            };

            match event {
                TransportEvent::DataChannelMessage { stream_id, message } => {
                    match pc.data_channel_by_id(stream_id).await {
                        Some(d) => d.handle_message(message).await,
                        None => {
                            if unknown_streams.insert(stream_id) {
                                log::warn!("dropping messages for unknown stream {stream_id}");
                            }
                        }
                    }
                }
                TransportEvent::DataChannelClose { stream_id } => {
                    if let Some(d) = pc.data_channel_by_id(stream_id).await {
                        d.handle_remote_close().await;
                    }
                }
                TransportEvent::Rtp(packet) => {
                    let ssrc = packet.header.ssrc;
                    match pc.receiving_track(ssrc).await {
                        Some(t) => t.handle_rtp(packet).await,
                        None => log::trace!("dropping RTP for unknown ssrc {ssrc}"),
                    }
                }
                TransportEvent::Rtcp(RtcpMessage::SenderReport(report)) => {
                    if let Some(t) = pc.receiving_track(report.ssrc).await {
                        t.handle_sender_report(report).await;
                    }
                }
                TransportEvent::Rtcp(RtcpMessage::TransportLayerNack(nack)) => {
                    if let Some(t) = pc.sending_track(nack.media_ssrc).await {
                        if let Err(err) = t.handle_nack(&nack).await {
                            log::warn!("track {} failed to retransmit: {err}", t.mid());
                        }
                    }
                }
            }
        }
    }

    async fn data_channel_by_id(&self, id: u16) -> Option<Arc<RTCDataChannel>> {
        let data_channels = self.data_channels.lock().await;
        data_channels.iter().find(|dc| dc.id() == id).cloned()
    }

    async fn receiving_track(&self, ssrc: u32) -> Option<Arc<RTCMediaTrack>> {
        let tracks = self.tracks.lock().await;
        tracks
            .iter()
            .find(|t| t.direction().has_recv() && t.ssrc() == ssrc)
            .cloned()
    }

    async fn sending_track(&self, ssrc: u32) -> Option<Arc<RTCMediaTrack>> {
        let tracks = self.tracks.lock().await;
        tracks
            .iter()
            .find(|t| t.direction().has_send() && t.ssrc() == ssrc)
            .cloned()
    }
}
