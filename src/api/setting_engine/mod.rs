
use std::fmt;
use std::sync::Arc;

use tokio::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};

/// Elapsed presentation time after which a track schedules a sender report.
pub(crate) const DEFAULT_REPORT_THRESHOLD: Duration = Duration::from_secs(1);
/// Bytes read from a frame source per track send.
pub(crate) const DEFAULT_FRAME_CHUNK_SIZE: usize = 1024 * 1024;
/// Number of sent packets kept for retransmission.
pub(crate) const DEFAULT_RETRANSMISSION_BUFFER_SIZE: usize = 128;
/// Largest RTP payload produced by the packetizer.
pub(crate) const DEFAULT_RTP_PAYLOAD_SIZE: usize = 1200;

#[derive(Default, Clone, Debug)]
pub struct Candidates {
    pub username_fragment: String,
    pub password: String,
}

#[derive(Default, Clone, Debug)]
pub struct Media {
    pub report_threshold: Option<Duration>,
    pub frame_chunk_size: usize,
    pub retransmission_buffer_size: usize,
    pub rtp_payload_size: usize,
}

/// SettingEngine allows influencing behavior in ways that are not
/// supported by the WebRTC API. This allows us to support additional
/// use-cases without deviating from the WebRTC API elsewhere.
#[derive(Clone)]
pub struct SettingEngine {
    pub(crate) candidates: Candidates,
    pub(crate) media: Media,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Default for SettingEngine {
    fn default() -> Self {
        SettingEngine {
            candidates: Candidates::default(),
            media: Media::default(),
            clock: Arc::new(SystemClock::new()),
        }
    }
}

impl fmt::Debug for SettingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingEngine")
            .field("candidates", &self.candidates)
            .field("media", &self.media)
            .field("clock", &self.clock)
            .finish()
    }
}

impl SettingEngine {
    /// get_report_threshold returns the configured threshold, or one second.
    pub(crate) fn get_report_threshold(&self) -> Duration {
        self.media.report_threshold.unwrap_or(DEFAULT_REPORT_THRESHOLD)
    }

    pub(crate) fn get_frame_chunk_size(&self) -> usize {
        if self.media.frame_chunk_size != 0 {
            self.media.frame_chunk_size
        } else {
            DEFAULT_FRAME_CHUNK_SIZE
        }
    }

    pub(crate) fn get_retransmission_buffer_size(&self) -> usize {
        if self.media.retransmission_buffer_size != 0 {
            self.media.retransmission_buffer_size
        } else {
            DEFAULT_RETRANSMISSION_BUFFER_SIZE
        }
    }

    pub(crate) fn get_rtp_payload_size(&self) -> usize {
        if self.media.rtp_payload_size != 0 {
            self.media.rtp_payload_size
        } else {
            DEFAULT_RTP_PAYLOAD_SIZE
        }
    }

    pub(crate) fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// set_report_threshold sets how much presentation time has to elapse
    /// since the last sender report before the pacer schedules another one.
    pub fn set_report_threshold(&mut self, threshold: Duration) -> Result<()> {
        if threshold.is_zero() {
            return Err(Error::new("report threshold must be positive".to_owned()));
        }
        self.media.report_threshold = Some(threshold);
        Ok(())
    }

    /// set_frame_chunk_size sets how many bytes of a frame are read and sent
    /// at once. Zero restores the default of 1 MiB.
    pub fn set_frame_chunk_size(&mut self, size: usize) {
        self.media.frame_chunk_size = size;
    }

    /// set_retransmission_buffer_size sets how many sent packets each track
    /// keeps to answer NACKs. Zero restores the default of 128.
    pub fn set_retransmission_buffer_size(&mut self, size: usize) {
        self.media.retransmission_buffer_size = size;
    }

    /// set_rtp_payload_size caps the payload of each outgoing RTP packet.
    pub fn set_rtp_payload_size(&mut self, size: usize) {
        self.media.rtp_payload_size = size;
    }

    /// set_clock replaces the time source used for pacing and reports.
    /// Tests inject a VirtualClock here.
    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    /// set_ice_credentials sets a static uFrag/uPwd to be used by the transport.
    /// This is useful if you want to do signalless WebRTC session, or having
    /// a reproducible environment with static credentials.
    pub fn set_ice_credentials(&mut self, username_fragment: String, password: String) {
        self.candidates.username_fragment = username_fragment;
        self.candidates.password = password;
    }
}
