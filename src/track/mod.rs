
pub mod codec;
pub mod frame_source;
pub(crate) mod h265_payloader;
pub mod nal_unit_separator;
pub mod pacer;
pub(crate) mod packet_cache;
pub mod track_init;
pub mod track_state;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as SyncMutex};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use bytes::{BufMut, Bytes, BytesMut};
use portable_atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use rand::random;
use rtcp::sender_report::SenderReport;
use rtcp::transport_feedbacks::transport_layer_nack::{
    nack_pairs_from_sequence_numbers, TransportLayerNack,
};
use rtp::codecs::h264::ANNEXB_NALUSTART_CODE;
use rtp::packetizer::Packetizer;
use tokio::sync::{Mutex, Notify};

use crate::api::setting_engine::SettingEngine;
use crate::error::{flatten_errs, Error, Result};
use crate::transport::{RtcpMessage, Transport};
use codec::RTCCodec;
use nal_unit_separator::NalUnitSeparator;
use packet_cache::PacketCache;
use track_init::{RTCTrackDirection, TrackInit};
use track_state::RTCTrackState;

/// Seconds between the NTP epoch (1900) and the UNIX epoch (1970).
const NTP_EPOCH_OFFSET: u64 = 2_208_988_800;
const RTP_HEADER_SIZE: usize = 12;

pub type OnTrackOpenHdlrFn =
    Box<dyn (FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

pub type OnPacketHdlrFn = Box<
    dyn (FnMut(rtp::packet::Packet) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnSenderReportHdlrFn = Box<
    dyn (FnMut(SenderReport) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnTrackCloseHdlrFn =
    Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

/// unix_to_ntp converts a time since the UNIX epoch to the 64-bit NTP
/// format carried by sender reports.
pub(crate) fn unix_to_ntp(t: Duration) -> u64 {
    let secs = t.as_secs() + NTP_EPOCH_OFFSET;
    let frac = ((t.subsec_nanos() as u64) << 32) / 1_000_000_000;
    (secs << 32) | frac
}

/// RTCMediaTrack is a media stream negotiated with the remote peer.
///
/// A sending track is driven by the caller: `set_start_time` fixes the
/// wall-clock reference, `start_recording` opens it and `send` packetizes
/// frames into RTP. The timestamp fields follow the frame schedule; a
/// sender report goes out with the first send after `set_needs_to_report`.
///
/// A track announced by the remote peer is receive-only from the local side.
/// It opens once the connection is up and hands inbound packets and sender
/// reports to its handlers.
pub struct RTCMediaTrack {
    init: TrackInit,
    is_remote: bool,
    setting_engine: Arc<SettingEngine>,

    state: AtomicU8, //RTCTrackState
    start_time_nanos: AtomicU64,
    start_timestamp: AtomicU32,
    current_timestamp: AtomicU32,
    previous_reported_timestamp: AtomicU32,
    needs_to_report: AtomicBool,
    packet_count: AtomicU32,
    octet_count: AtomicU32,

    packetizer: Mutex<Option<Box<dyn Packetizer + Send + Sync>>>,
    packet_cache: Mutex<PacketCache>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    connected: AtomicBool,
    closed_notify: Notify,

    on_open_handler: SyncMutex<Option<OnTrackOpenHdlrFn>>,
    on_packet_handler: ArcSwapOption<Mutex<OnPacketHdlrFn>>,
    on_sender_report_handler: ArcSwapOption<Mutex<OnSenderReportHdlrFn>>,
    on_close_handler: ArcSwapOption<Mutex<OnTrackCloseHdlrFn>>,
}

impl std::fmt::Debug for RTCMediaTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTCMediaTrack")
            .field("init", &self.init)
            .field("is_remote", &self.is_remote)
            .field("state", &self.state())
            .finish()
    }
}

impl RTCMediaTrack {
    pub(crate) fn new(init: TrackInit, is_remote: bool, setting_engine: Arc<SettingEngine>) -> Self {
        let start_timestamp: u32 = random();
        let cache_size = setting_engine.get_retransmission_buffer_size();

        // only the sending side needs one; the timestamp is set per frame
        let packetizer = if init.direction.has_send() {
            init.codec.payloader().map(|payloader| {
                let sequencer: Box<dyn rtp::sequence::Sequencer + Send + Sync> =
                    Box::new(rtp::sequence::new_random_sequencer());
                Box::new(rtp::packetizer::new_packetizer(
                    setting_engine
                        .get_rtp_payload_size()
                        .saturating_add(RTP_HEADER_SIZE),
                    init.payload_type,
                    init.ssrc,
                    payloader,
                    sequencer,
                    init.codec.clock_rate(),
                )) as Box<dyn Packetizer + Send + Sync>
            })
        } else {
            None
        };

        RTCMediaTrack {
            init,
            is_remote,
            setting_engine,
            state: AtomicU8::new(RTCTrackState::Idle as u8),
            start_time_nanos: AtomicU64::new(0),
            start_timestamp: AtomicU32::new(start_timestamp),
            current_timestamp: AtomicU32::new(start_timestamp),
            previous_reported_timestamp: AtomicU32::new(start_timestamp),
            needs_to_report: AtomicBool::new(false),
            packet_count: AtomicU32::new(0),
            octet_count: AtomicU32::new(0),
            packetizer: Mutex::new(packetizer),
            packet_cache: Mutex::new(PacketCache::new(cache_size)),
            transport: Mutex::new(None),
            connected: AtomicBool::new(false),
            closed_notify: Notify::new(),
            on_open_handler: SyncMutex::new(None),
            on_packet_handler: ArcSwapOption::empty(),
            on_sender_report_handler: ArcSwapOption::empty(),
            on_close_handler: ArcSwapOption::empty(),
        }
    }

    /// mid identifies the media section of the track; it is the cname.
    pub fn mid(&self) -> &str {
        &self.init.cname
    }

    pub fn cname(&self) -> &str {
        &self.init.cname
    }

    pub fn msid(&self) -> &str {
        &self.init.msid
    }

    pub fn codec(&self) -> RTCCodec {
        self.init.codec
    }

    pub fn direction(&self) -> RTCTrackDirection {
        self.init.direction
    }

    pub fn ssrc(&self) -> u32 {
        self.init.ssrc
    }

    pub fn payload_type(&self) -> u8 {
        self.init.payload_type
    }

    pub fn nal_unit_separator(&self) -> NalUnitSeparator {
        self.init.nal_unit_separator
    }

    pub fn clock_rate(&self) -> u32 {
        self.init.codec.clock_rate()
    }

    /// is_remote reports whether the track was announced by the remote peer.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    pub(crate) fn init(&self) -> &TrackInit {
        &self.init
    }

    pub(crate) fn setting_engine(&self) -> &SettingEngine {
        &self.setting_engine
    }

    pub fn state(&self) -> RTCTrackState {
        self.state.load(Ordering::SeqCst).into()
    }

    /// is_connected reports whether the track is bound to a connected transport.
    pub async fn is_connected(&self) -> bool {
        let transport = self.transport.lock().await;
        transport.is_some()
    }

    /// set_start_time records the wall-clock reference point, in seconds
    /// since the UNIX epoch, and draws a fresh random start timestamp. It must
    /// be called before recording begins.
    pub fn set_start_time(&self, epoch_seconds: f64) -> Result<()> {
        match self.state() {
            RTCTrackState::Idle => {}
            RTCTrackState::Open => return Err(Error::ErrTrackAlreadyStarted),
            state => return Err(Error::ErrInvalidTrackState(state)),
        }

        let start_time_nanos = Duration::try_from_secs_f64(epoch_seconds)
            .ok()
            .and_then(|start_time| u64::try_from(start_time.as_nanos()).ok())
            .ok_or(Error::ErrInvalidStartTime(epoch_seconds))?;
        self.start_time_nanos.store(start_time_nanos, Ordering::SeqCst);

        let start_timestamp: u32 = random();
        self.start_timestamp.store(start_timestamp, Ordering::SeqCst);
        self.current_timestamp
            .store(start_timestamp, Ordering::SeqCst);
        self.previous_reported_timestamp
            .store(start_timestamp, Ordering::SeqCst);

        Ok(())
    }

    /// start_time returns the wall-clock reference point, as time since the
    /// UNIX epoch. Zero until set.
    pub fn start_time(&self) -> Duration {
        Duration::from_nanos(self.start_time_nanos.load(Ordering::SeqCst))
    }

    /// start_recording moves the track from idle to open. Without an explicit
    /// start time the current time of the configured clock is used.
    pub fn start_recording(&self) -> Result<()> {
        if !self.direction().has_send() {
            return Err(Error::ErrTrackNotSending);
        }

        if let Err(state) = self.state.compare_exchange(
            RTCTrackState::Idle as u8,
            RTCTrackState::Open as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            return match RTCTrackState::from(state) {
                RTCTrackState::Open => Err(Error::ErrTrackAlreadyStarted),
                state => Err(Error::ErrInvalidTrackState(state)),
            };
        }

        if self.start_time_nanos.load(Ordering::SeqCst) == 0 {
            let now = self.setting_engine.clock().now();
            let now_nanos = u64::try_from(now.as_nanos()).unwrap_or(u64::MAX);
            self.start_time_nanos.store(now_nanos, Ordering::SeqCst);
        }
        self.previous_reported_timestamp
            .store(self.current_timestamp(), Ordering::SeqCst);

        log::debug!(
            "track {} recording from {:?}, start timestamp {}",
            self.mid(),
            self.start_time(),
            self.start_timestamp()
        );

        Ok(())
    }

    /// seconds_to_timestamp converts a duration in seconds to timestamp
    /// ticks, rounding to the nearest tick. Timestamps wrap at 2^32.
    pub fn seconds_to_timestamp(&self, seconds: f64) -> u32 {
        (seconds * self.clock_rate() as f64).round() as i64 as u32
    }

    /// timestamp_to_seconds converts timestamp ticks to seconds.
    pub fn timestamp_to_seconds(&self, timestamp: u32) -> f64 {
        timestamp as f64 / self.clock_rate() as f64
    }

    pub fn start_timestamp(&self) -> u32 {
        self.start_timestamp.load(Ordering::SeqCst)
    }

    pub fn current_timestamp(&self) -> u32 {
        self.current_timestamp.load(Ordering::SeqCst)
    }

    /// set_current_timestamp sets the timestamp of the next frame sent.
    pub fn set_current_timestamp(&self, timestamp: u32) {
        self.current_timestamp.store(timestamp, Ordering::SeqCst);
    }

    /// previous_reported_timestamp is the timestamp carried by the last
    /// sender report, or the one recording started at.
    pub fn previous_reported_timestamp(&self) -> u32 {
        self.previous_reported_timestamp.load(Ordering::SeqCst)
    }

    /// set_needs_to_report makes the next send carry a sender report first.
    pub fn set_needs_to_report(&self) {
        self.needs_to_report.store(true, Ordering::SeqCst);
    }

    pub fn needs_to_report(&self) -> bool {
        self.needs_to_report.load(Ordering::SeqCst)
    }

    /// send packetizes one frame, or one chunk of it, at the current
    /// timestamp with the codec's payloader. The last packet carries the
    /// marker bit.
    pub async fn send(&self, data: &Bytes) -> Result<()> {
        let state = self.state();
        if state != RTCTrackState::Open || !self.direction().has_send() {
            return Err(Error::ErrTrackNotOpen(state));
        }

        let transport = {
            let t = self.transport.lock().await;
            t.clone()
        };
        let Some(transport) = transport else {
            return Err(Error::ErrTransportNotConnected);
        };

        if self.needs_to_report.swap(false, Ordering::SeqCst) {
            let report = self.sender_report();
            let rtp_time = report.rtp_time;
            transport
                .write_rtcp(&RtcpMessage::SenderReport(report))
                .await?;
            self.previous_reported_timestamp
                .store(rtp_time, Ordering::SeqCst);
            log::trace!("track {} reported timestamp {rtp_time}", self.mid());
        }

        for packet in self.packetize(data).await? {
            {
                let mut cache = self.packet_cache.lock().await;
                cache.put(packet.header.clone(), packet.payload.clone());
            }

            let len = packet.payload.len() as u32;
            transport.write_rtp(&packet).await?;

            self.packet_count.fetch_add(1, Ordering::SeqCst);
            self.octet_count.fetch_add(len, Ordering::SeqCst);
        }

        Ok(())
    }

    async fn packetize(&self, data: &Bytes) -> Result<Vec<rtp::packet::Packet>> {
        // the H264 and H265 payloaders take Annex-B
        let payload = match self.codec() {
            RTCCodec::H264 | RTCCodec::H265 => {
                let units = self.nal_unit_separator().split(data);
                let mut annex_b = BytesMut::with_capacity(
                    data.len() + units.len() * ANNEXB_NALUSTART_CODE.len(),
                );
                for unit in units {
                    annex_b.put_slice(&ANNEXB_NALUSTART_CODE);
                    annex_b.put_slice(&unit);
                }
                annex_b.freeze()
            }
            _ => data.clone(),
        };

        let mut packetizer = self.packetizer.lock().await;
        let Some(packetizer) = packetizer.as_mut() else {
            return Err(Error::ErrNoPayloaderForCodec);
        };
        let mut packets = packetizer.packetize(&payload, 0)?;

        let timestamp = self.current_timestamp();
        for packet in &mut packets {
            packet.header.timestamp = timestamp;
        }
        Ok(packets)
    }

    fn sender_report(&self) -> SenderReport {
        let current = self.current_timestamp();
        let elapsed_ticks = current.wrapping_sub(self.start_timestamp()) as u64;
        let elapsed =
            Duration::from_nanos(elapsed_ticks * 1_000_000_000 / self.clock_rate() as u64);
        let wallclock = self.start_time() + elapsed;

        SenderReport {
            ssrc: self.ssrc(),
            ntp_time: unix_to_ntp(wallclock),
            rtp_time: current,
            packet_count: self.packet_count.load(Ordering::SeqCst),
            octet_count: self.octet_count.load(Ordering::SeqCst),
            ..Default::default()
        }
    }

    /// handle_nack retransmits the cached packets named by the peer.
    /// Packets no longer cached are skipped.
    pub(crate) async fn handle_nack(&self, nack: &TransportLayerNack) -> Result<()> {
        let transport = {
            let t = self.transport.lock().await;
            t.clone()
        };
        let Some(transport) = transport else {
            return Ok(());
        };

        let mut packets = vec![];
        {
            let cache = self.packet_cache.lock().await;
            for pair in &nack.nacks {
                for seq in pair.packet_list() {
                    match cache.get(seq) {
                        Some(cached) => packets.push(rtp::packet::Packet {
                            header: cached.header.clone(),
                            payload: cached.payload.clone().into(),
                        }),
                        None => log::debug!("track {} can not resend {seq}", self.mid()),
                    }
                }
            }
        }

        let mut errs = vec![];
        for packet in packets {
            if let Err(err) = transport.write_rtp(&packet).await {
                errs.push(err);
            }
        }
        flatten_errs(errs)
    }

    /// send_nack asks the remote sender to retransmit the given packets.
    pub async fn send_nack(&self, sequence_numbers: &[u16]) -> Result<()> {
        if !self.direction().has_recv() {
            return Err(Error::ErrTrackNotReceiving);
        }
        let state = self.state();
        if state == RTCTrackState::Closed {
            return Err(Error::ErrTrackNotOpen(state));
        }

        let transport = {
            let t = self.transport.lock().await;
            t.clone()
        };
        let Some(transport) = transport else {
            return Err(Error::ErrTransportNotConnected);
        };

        let nack = TransportLayerNack {
            sender_ssrc: 0,
            media_ssrc: self.ssrc(),
            nacks: nack_pairs_from_sequence_numbers(sequence_numbers),
        };
        transport
            .write_rtcp(&RtcpMessage::TransportLayerNack(nack))
            .await
    }

    pub(crate) async fn handle_rtp(&self, packet: rtp::packet::Packet) {
        if self.state() == RTCTrackState::Closed {
            return;
        }
        if let Some(handler) = &*self.on_packet_handler.load() {
            let mut f = handler.lock().await;
            f(packet).await;
        }
    }

    pub(crate) async fn handle_sender_report(&self, report: SenderReport) {
        if self.state() == RTCTrackState::Closed {
            return;
        }
        if let Some(handler) = &*self.on_sender_report_handler.load() {
            let mut f = handler.lock().await;
            f(report).await;
        }
    }

    /// handle_open binds the track to the connected transport. A remote track
    /// opens here; a local one opens when recording starts.
    pub(crate) async fn handle_open(&self, transport: Arc<dyn Transport>) {
        {
            let mut t = self.transport.lock().await;
            if t.is_some() || self.state() == RTCTrackState::Closed {
                return;
            }
            *t = Some(transport);
            self.connected.store(true, Ordering::SeqCst);
        }

        if self.is_remote {
            let _ = self.state.compare_exchange(
                RTCTrackState::Idle as u8,
                RTCTrackState::Open as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }

        log::debug!("track {} connected", self.mid());
        self.do_open();
    }

    /// on_open sets an event handler which is invoked once the track can
    /// carry media. Registering it after that invokes it right away.
    pub fn on_open(&self, f: OnTrackOpenHdlrFn) {
        if let Ok(mut handler) = self.on_open_handler.lock() {
            handler.replace(f);
        }

        if self.connected.load(Ordering::SeqCst) {
            self.do_open();
        }
    }

    fn do_open(&self) {
        let on_open_handler = match self.on_open_handler.lock() {
            Ok(mut handler) => handler.take(),
            Err(_) => None,
        };

        if let Some(f) = on_open_handler {
            tokio::spawn(async move {
                f().await;
            });
        }
    }

    /// on_packet sets an event handler which is invoked for every RTP packet
    /// received on this track, in arrival order.
    pub fn on_packet(&self, f: OnPacketHdlrFn) {
        self.on_packet_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_sender_report sets an event handler which is invoked for every
    /// sender report of the remote sender.
    pub fn on_sender_report(&self, f: OnSenderReportHdlrFn) {
        self.on_sender_report_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_close sets an event handler which is invoked when the track closes.
    pub fn on_close(&self, f: OnTrackCloseHdlrFn) {
        self.on_close_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    /// close stops the track. In-flight pacing is interrupted and every later
    /// send fails. Closing twice does nothing.
    pub async fn close(&self) -> Result<()> {
        if self
            .state
            .swap(RTCTrackState::Closed as u8, Ordering::SeqCst)
            == RTCTrackState::Closed as u8
        {
            return Ok(());
        }

        log::debug!("track {} closed", self.mid());
        self.closed_notify.notify_waiters();
        {
            let mut t = self.transport.lock().await;
            t.take();
            self.connected.store(false, Ordering::SeqCst);
        }

        if let Some(handler) = &*self.on_close_handler.load() {
            let mut f = handler.lock().await;
            f().await;
        }

        Ok(())
    }

    /// closed resolves once the track is closed.
    pub async fn closed(&self) {
        loop {
            let notified = self.closed_notify.notified();
            if self.state() == RTCTrackState::Closed {
                return;
            }
            notified.await;
        }
    }
}
