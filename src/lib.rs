#![warn(rust_2018_idioms)]
#![allow(dead_code)]

// re-export the protocol crates that appear in the public API
pub use rtcp;
pub use rtp;
pub use sdp;

pub mod api;
pub mod clock;
pub mod data_channel;
pub mod error;
pub mod ice_transport;
pub mod peer_connection;
pub mod track;
pub mod transport;

pub use error::Error;

pub(crate) const UNSPECIFIED_STR: &str = "Unspecified";

/// Media section kind used for the SCTP association carrying data channels.
pub(crate) const MEDIA_SECTION_APPLICATION: &str = "application";

/// Attribute announcing a data channel in the application section
/// (draft-ietf-mmusic-data-channel-sdpneg).
pub(crate) const SDP_ATTRIBUTE_DCMAP: &str = "dcmap";
