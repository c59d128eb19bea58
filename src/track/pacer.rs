use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;

use super::frame_source::{FrameReader, FrameSource};
use super::track_state::RTCTrackState;
use super::RTCMediaTrack;
use crate::clock::Clock;
use crate::error::{Error, Result};

pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Frames in a row that may fail to open before the source counts as
/// exhausted.
const MAX_CONSECUTIVE_OPEN_FAILURES: usize = 2;

/// PacingOptions controls a pacing run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingOptions {
    /// Target frame rate.
    pub fps: f64,
    /// Stop after this many frames even if the source has more.
    pub max_frames: Option<usize>,
}

impl Default for PacingOptions {
    fn default() -> Self {
        PacingOptions {
            fps: DEFAULT_FRAME_RATE,
            max_frames: None,
        }
    }
}

/// PacingReport summarizes a finished pacing run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PacingReport {
    pub frames: usize,
    pub chunks: usize,
    pub bytes: usize,
    /// Largest delay of a frame behind its schedule.
    pub max_lag: Duration,
    /// Number of times the run asked the track for a sender report.
    pub reports_requested: usize,
    /// Set when the track closed before the run finished.
    pub interrupted: bool,
}

/// Pacer emits the frames of a [`FrameSource`] on a track at a fixed frame
/// rate. Frame `i` is due `i / fps` seconds after the track's start time.
/// Frames are never emitted early. A frame that is already late is sent at
/// once, so lag is never compensated by skipping frames.
pub struct Pacer {
    track: Arc<RTCMediaTrack>,
    options: PacingOptions,

    clock: Arc<dyn Clock>,
    interval: Duration,
    chunk_size: usize,
    report_threshold: Duration,
}

impl Pacer {
    pub fn new(track: Arc<RTCMediaTrack>, options: PacingOptions) -> Result<Self> {
        if !options.fps.is_finite() || options.fps <= 0.0 {
            return Err(Error::ErrInvalidFrameRate(options.fps));
        }
        let interval = Duration::try_from_secs_f64(1.0 / options.fps)
            .map_err(|_| Error::ErrInvalidFrameRate(options.fps))?;
        if let Some(max) = options.max_frames {
            Duration::try_from_secs_f64(max as f64 / options.fps)
                .map_err(|_| Error::ErrInvalidFrameRate(options.fps))?;
        }

        let setting_engine = track.setting_engine();
        let clock = setting_engine.clock();
        let chunk_size = setting_engine.get_frame_chunk_size();
        let report_threshold = setting_engine.get_report_threshold();

        Ok(Pacer {
            track,
            options,
            clock,
            interval,
            chunk_size,
            report_threshold,
        })
    }

    pub fn frame_interval(&self) -> Duration {
        self.interval
    }

    /// expected_offset is the schedule of frame `index`, relative to the
    /// track's start time. Fails once the schedule leaves the range of
    /// `Duration`.
    pub fn expected_offset(&self, index: usize) -> Result<Duration> {
        Duration::try_from_secs_f64(index as f64 / self.options.fps)
            .map_err(|_| Error::ErrInvalidFrameRate(self.options.fps))
    }

    /// spawn runs the pacer on its own task.
    pub fn spawn(self, source: Box<dyn FrameSource>) -> JoinHandle<Result<PacingReport>> {
        tokio::spawn(async move { self.run(source.as_ref()).await })
    }

    /// run starts recording on the idle track and paces `source` onto it
    /// until the source is exhausted, the frame limit is reached or the track
    /// closes. A track runs at most one pacer: once recording started, later
    /// runs fail with `ErrTrackAlreadyStarted`. Two frames in a row failing
    /// to open count as exhaustion.
    pub async fn run(&self, source: &dyn FrameSource) -> Result<PacingReport> {
        match self.track.state() {
            RTCTrackState::Idle => self.track.start_recording()?,
            RTCTrackState::Open => return Err(Error::ErrTrackAlreadyStarted),
            state => return Err(Error::ErrTrackNotOpen(state)),
        }

        let origin = self.track.start_time();
        let interval = self.frame_interval();
        let mut report = PacingReport::default();
        let mut lagging = false;
        let mut failed_opens = 0;
        let mut index = 0;

        loop {
            if self.track.state() == RTCTrackState::Closed {
                report.interrupted = true;
                break;
            }

            let expected = self.expected_offset(index)?;
            let deadline = origin
                .checked_add(expected)
                .ok_or(Error::ErrInvalidFrameRate(self.options.fps))?;
            let now = self.clock.now();
            if now > deadline {
                let lag = now - deadline;
                report.max_lag = report.max_lag.max(lag);
                if lag > interval {
                    if !lagging {
                        log::warn!(
                            "track {} frame {index} is {lag:?} behind schedule",
                            self.track.mid()
                        );
                    }
                    lagging = true;
                } else {
                    lagging = false;
                }
            } else {
                lagging = false;
                tokio::select! {
                    _ = self.clock.sleep_until(deadline) => {}
                    _ = self.track.closed() => {
                        report.interrupted = true;
                        break;
                    }
                }
            }

            // the run lasts until the end of the last frame's interval
            if matches!(self.options.max_frames, Some(max) if index >= max) {
                break;
            }

            let reader = match source.open_frame(index).await {
                Ok(Some(reader)) => reader,
                Ok(None) => break,
                Err(err) => {
                    log::warn!("track {} can not open frame {index}: {err}", self.track.mid());
                    failed_opens += 1;
                    if failed_opens >= MAX_CONSECUTIVE_OPEN_FAILURES {
                        break;
                    }
                    index += 1;
                    continue;
                }
            };
            failed_opens = 0;

            if self.sync_playback_time(expected) {
                report.reports_requested += 1;
            }

            match self.send_frame(reader, &mut report).await {
                Ok(()) => {}
                Err(_) if self.track.state() == RTCTrackState::Closed => {
                    report.interrupted = true;
                    break;
                }
                Err(err) => return Err(err),
            }

            report.frames += 1;
            index += 1;
        }

        log::debug!(
            "track {} paced {} frames, max lag {:?}",
            self.track.mid(),
            report.frames,
            report.max_lag
        );

        Ok(report)
    }

    /// sync_playback_time moves the track's current timestamp to the frame
    /// schedule and requests a sender report once the last one is older than
    /// the threshold. Reports whether a request was made.
    fn sync_playback_time(&self, expected: Duration) -> bool {
        let track = &self.track;
        let current = track
            .start_timestamp()
            .wrapping_add(track.seconds_to_timestamp(expected.as_secs_f64()));
        track.set_current_timestamp(current);

        let since_report = current.wrapping_sub(track.previous_reported_timestamp());
        if track.timestamp_to_seconds(since_report) > self.report_threshold.as_secs_f64()
            && !track.needs_to_report()
        {
            track.set_needs_to_report();
            true
        } else {
            false
        }
    }

    /// send_frame reads the frame in chunks of at most `chunk_size` bytes and
    /// sends each one. A read error ends the frame, not the run.
    async fn send_frame(&self, mut reader: FrameReader, report: &mut PacingReport) -> Result<()> {
        let mut buf = vec![0u8; self.chunk_size];

        loop {
            let mut filled = 0;
            let mut done = false;
            while filled < buf.len() {
                match reader.read(&mut buf[filled..]).await {
                    Ok(0) => {
                        done = true;
                        break;
                    }
                    Ok(n) => filled += n,
                    Err(err) => {
                        log::warn!("track {} frame read failed: {err}", self.track.mid());
                        done = true;
                        break;
                    }
                }
            }

            if filled > 0 {
                self.track
                    .send(&Bytes::copy_from_slice(&buf[..filled]))
                    .await?;
                report.chunks += 1;
                report.bytes += filled;
            }

            if done {
                return Ok(());
            }
        }
    }
}
