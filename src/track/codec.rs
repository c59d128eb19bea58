use std::fmt;

use rtp::packetizer::Payloader;
use serde::{Deserialize, Serialize};

use super::h265_payloader::H265Payloader;

/// Clock rate shared by every video payload format.
pub(crate) const VIDEO_CLOCK_RATE: u32 = 90_000;
/// Clock rate of Opus (RFC 7587).
pub(crate) const OPUS_CLOCK_RATE: u32 = 48_000;

/// RTCCodec identifies the payload format of a media track.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RTCCodec {
    #[default]
    #[serde(rename = "Unspecified")]
    Unspecified,
    #[serde(rename = "H264")]
    H264,
    #[serde(rename = "H265")]
    H265,
    #[serde(rename = "VP8")]
    VP8,
    #[serde(rename = "VP9")]
    VP9,
    #[serde(rename = "AV1")]
    AV1,
    #[serde(rename = "opus")]
    Opus,
}

impl RTCCodec {
    /// clock_rate is the rate of the track-local timestamp unit, in Hz.
    pub fn clock_rate(&self) -> u32 {
        match self {
            RTCCodec::Opus => OPUS_CLOCK_RATE,
            _ => VIDEO_CLOCK_RATE,
        }
    }

    /// kind is the media section kind carrying this codec.
    pub fn kind(&self) -> &'static str {
        match self {
            RTCCodec::Opus => "audio",
            _ => "video",
        }
    }

    /// channels is the channel count announced in the rtpmap, if any.
    pub(crate) fn channels(&self) -> u16 {
        match self {
            RTCCodec::Opus => 2,
            _ => 0,
        }
    }

    /// payloader turns the codec into a `packetizer::Payloader`. H264 and
    /// H265 payloaders take Annex-B input.
    pub(crate) fn payloader(&self) -> Option<Box<dyn Payloader + Send + Sync>> {
        match self {
            RTCCodec::H264 => Some(Box::<rtp::codecs::h264::H264Payloader>::default()),
            RTCCodec::H265 => Some(Box::<H265Payloader>::default()),
            RTCCodec::VP8 => {
                let mut vp8_payloader = rtp::codecs::vp8::Vp8Payloader::default();
                vp8_payloader.enable_picture_id = true;
                Some(Box::new(vp8_payloader))
            }
            RTCCodec::VP9 => Some(Box::<rtp::codecs::vp9::Vp9Payloader>::default()),
            RTCCodec::AV1 => Some(Box::<rtp::codecs::av1::Av1Payloader>::default()),
            RTCCodec::Opus => Some(Box::<rtp::codecs::opus::OpusPayloader>::default()),
            RTCCodec::Unspecified => None,
        }
    }
}

impl From<&str> for RTCCodec {
    fn from(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "H264" => RTCCodec::H264,
            "H265" => RTCCodec::H265,
            "VP8" => RTCCodec::VP8,
            "VP9" => RTCCodec::VP9,
            "AV1" => RTCCodec::AV1,
            "OPUS" => RTCCodec::Opus,
            _ => RTCCodec::Unspecified,
        }
    }
}

/// Display renders the encoding name used in the rtpmap attribute.
impl fmt::Display for RTCCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCCodec::H264 => "H264",
            RTCCodec::H265 => "H265",
            RTCCodec::VP8 => "VP8",
            RTCCodec::VP9 => "VP9",
            RTCCodec::AV1 => "AV1",
            RTCCodec::Opus => "opus",
            RTCCodec::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}
