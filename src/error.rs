use std::num::ParseIntError;

use thiserror::Error;

use crate::data_channel::data_channel_state::RTCDataChannelState;
use crate::peer_connection::sdp::sdp_type::RTCSdpType;
use crate::peer_connection::signaling_state::RTCSignalingState;
use crate::track::track_state::RTCTrackState;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// ErrConnectionClosed indicates an operation executed after connection
    /// has already been closed.
    #[error("connection closed")]
    ErrConnectionClosed,

    /// ErrDataChannelNotOpen indicates an operation executed when the data
    /// channel is not (yet) open or has already been closed.
    #[error("data channel not open (state {0})")]
    ErrDataChannelNotOpen(RTCDataChannelState),

    /// ErrTrackNotOpen indicates a frame was written to a track that is not
    /// recording, or that has been closed.
    #[error("track not open (state {0})")]
    ErrTrackNotOpen(RTCTrackState),

    /// ErrTrackAlreadyStarted indicates the start time of a track was set
    /// after recording began.
    #[error("track recording already started")]
    ErrTrackAlreadyStarted,

    /// ErrInvalidTrackState indicates a track operation that the current
    /// lifecycle state forbids.
    #[error("operation can not be run in track state {0}")]
    ErrInvalidTrackState(RTCTrackState),

    /// ErrTrackNotSending indicates a send was attempted on a track that
    /// only receives.
    #[error("track direction does not allow sending")]
    ErrTrackNotSending,

    /// ErrTrackNotReceiving indicates receiver feedback was requested on a
    /// track that only sends.
    #[error("track direction does not allow receiving")]
    ErrTrackNotReceiving,

    /// ErrExistingTrack indicates that a track with the same ssrc already exists.
    #[error("track already exists")]
    ErrExistingTrack,

    /// ErrNoTurnCredentials indicates that a TURN server URL was provided
    /// without required credentials.
    #[error("turn server credentials required")]
    ErrNoTurnCredentials,

    /// ErrUnknownIceServerScheme indicates an ICE server URL whose scheme is
    /// not one of stun, stuns, turn or turns.
    #[error("unknown ice server scheme: {0}")]
    ErrUnknownIceServerScheme(String),

    /// ErrStringSizeLimit indicates that the character size limit of string is
    /// exceeded. The limit is hardcoded to 65535 according to specifications.
    #[error("data channel label exceeds size limit")]
    ErrStringSizeLimit,

    /// ErrMaxDataChannelID indicates that the maximum number ID that could be
    /// specified for a data channel has been exceeded.
    #[error("maximum number ID for datachannel specified")]
    ErrMaxDataChannelID,

    /// ErrNoRemoteDescription indicates that an operation was rejected because
    /// the remote description is not set
    #[error("remote description is not set")]
    ErrNoRemoteDescription,

    /// ErrIncorrectSignalingState indicates that the signaling state of PeerConnection is not correct
    #[error("operation can not be run in current signaling state {0}")]
    ErrIncorrectSignalingState(RTCSignalingState),

    #[error(
        "invalid proposed signaling state transition from {} applying {} {}",
        from,
        if *is_local { "local" } else { "remote" },
        applying
    )]
    ErrSignalingStateProposedTransitionInvalid {
        from: RTCSignalingState,
        applying: RTCSdpType,
        is_local: bool,
    },

    /// ErrSessionDescriptionUnsupportedType indicates a descriptor whose type
    /// is neither offer nor answer.
    #[error("unsupported session description type {0}")]
    ErrSessionDescriptionUnsupportedType(RTCSdpType),

    /// ErrSessionDescriptionMissingIceUfrag indicates SetRemoteDescription was called with a SessionDescription that has no
    /// ice-ufrag
    #[error("SetRemoteDescription called with no ice-ufrag")]
    ErrSessionDescriptionMissingIceUfrag,

    /// ErrSessionDescriptionMissingIcePwd indicates SetRemoteDescription was called with a SessionDescription that has no
    /// ice-pwd
    #[error("SetRemoteDescription called with no ice-pwd")]
    ErrSessionDescriptionMissingIcePwd,

    /// ErrSessionDescriptionConflictingIceUfrag indicates SetRemoteDescription was called with a SessionDescription that
    /// contains multiple conflicting ice-ufrag values
    #[error("SetRemoteDescription called with multiple conflicting ice-ufrag values")]
    ErrSessionDescriptionConflictingIceUfrag,

    /// ErrSessionDescriptionInvalidDataChannelMap indicates a malformed
    /// dcmap attribute in the application section.
    #[error("invalid dcmap attribute: {0}")]
    ErrSessionDescriptionInvalidDataChannelMap(String),

    /// ErrSessionDescriptionInvalidMediaSource indicates a media section
    /// without a usable ssrc, payload type or codec.
    #[error("invalid media section: {0}")]
    ErrSessionDescriptionInvalidMediaSource(String),

    /// ErrInvalidCandidate indicates a candidate line that could not be parsed.
    #[error("invalid ice candidate: {0}")]
    ErrInvalidCandidate(String),

    #[error("invalid frame rate {0}")]
    ErrInvalidFrameRate(f64),

    /// ErrInvalidStartTime indicates a start time that is negative, not
    /// finite or out of range for the clock.
    #[error("invalid start time {0}")]
    ErrInvalidStartTime(f64),

    /// ErrNoPayloaderForCodec indicates a track whose codec can not be
    /// packetized.
    #[error("the requested codec does not have a payloader")]
    ErrNoPayloaderForCodec,

    #[error("transport is not connected")]
    ErrTransportNotConnected,
    #[error("transport is closed")]
    ErrTransportClosed,
    #[error("remote peer {0} is unreachable")]
    ErrTransportUnreachable(String),

    #[error("{0}")]
    Sdp(#[from] sdp::Error),
    #[error("{0}")]
    Rtp(#[from] rtp::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse int: {0}")]
    ParseInt(#[from] ParseIntError),
    #[error("parse url: {0}")]
    ParseUrl(#[from] url::ParseError),

    #[allow(non_camel_case_types)]
    #[error("{0}")]
    new(String),
}

impl Error {
    /// Reports whether the operation was invoked from a state that forbids it,
    /// on the negotiation, a channel or a track.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            Error::ErrIncorrectSignalingState(_)
                | Error::ErrSignalingStateProposedTransitionInvalid { .. }
                | Error::ErrConnectionClosed
                | Error::ErrInvalidTrackState(_)
        )
    }

    /// Reports whether a remote descriptor was rejected because it could not
    /// be parsed or lacks required information.
    pub fn is_descriptor_parse_error(&self) -> bool {
        matches!(
            self,
            Error::Sdp(_)
                | Error::Json(_)
                | Error::ErrSessionDescriptionUnsupportedType(_)
                | Error::ErrSessionDescriptionMissingIceUfrag
                | Error::ErrSessionDescriptionMissingIcePwd
                | Error::ErrSessionDescriptionConflictingIceUfrag
                | Error::ErrSessionDescriptionInvalidDataChannelMap(_)
                | Error::ErrSessionDescriptionInvalidMediaSource(_)
                | Error::ErrInvalidCandidate(_)
        )
    }
}

/// flatten_errs flattens multiple errors into one
pub fn flatten_errs(errs: Vec<impl Into<Error>>) -> Result<()> {
    if errs.is_empty() {
        Ok(())
    } else {
        let errs_strs: Vec<String> = errs.into_iter().map(|e| e.into().to_string()).collect();
        Err(Error::new(errs_strs.join("\n")))
    }
}
