
pub mod sdp_type;
pub mod session_description;

use sdp::description::common::Attribute;
use sdp::description::media::{MediaDescription, MediaName, RangedPort};
use sdp::description::session::*;

use crate::error::{Error, Result};
use crate::ice_transport::ice_candidate::RTCIceCandidate;
use crate::ice_transport::ice_parameters::RTCIceParameters;
use crate::track::codec::RTCCodec;
use crate::track::track_init::{RTCTrackDirection, TrackInit};
use crate::{MEDIA_SECTION_APPLICATION, SDP_ATTRIBUTE_DCMAP};

/// Mid of the application section carrying the data channels.
pub(crate) const DATA_CHANNEL_MID: &str = "data";

const SCTP_PORT: u16 = 5000;

/// DataChannelEntry announces one data channel: its stream ID and label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DataChannelEntry {
    pub(crate) id: u16,
    pub(crate) label: String,
}

/// LocalDescriptionParams is everything a local description is built from.
pub(crate) struct LocalDescriptionParams<'a> {
    pub(crate) session_id: u64,
    pub(crate) session_version: u64,
    pub(crate) ice_params: &'a RTCIceParameters,
    pub(crate) candidates: &'a [RTCIceCandidate],
    pub(crate) gathering_complete: bool,
    pub(crate) data_channels: &'a [DataChannelEntry],
    pub(crate) tracks: &'a [TrackInit],
}

/// RemoteDescriptionDetails is what a remote description announces.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct RemoteDescriptionDetails {
    pub(crate) ice_params: RTCIceParameters,
    pub(crate) candidates: Vec<RTCIceCandidate>,
    pub(crate) data_channels: Vec<DataChannelEntry>,
    /// Tracks with their direction as seen by the remote peer.
    pub(crate) tracks: Vec<TrackInit>,
}

pub(crate) fn add_candidates_to_media_description(
    candidates: &[RTCIceCandidate],
    mut m: MediaDescription,
    gathering_complete: bool,
) -> MediaDescription {
    for c in candidates {
        let marshaled = c.marshal();
        let exists = m
            .attributes
            .iter()
            .any(|a| a.key == ATTR_KEY_CANDIDATE && a.value.as_deref() == Some(marshaled.as_str()));
        if !exists {
            m = m.with_value_attribute(ATTR_KEY_CANDIDATE.to_owned(), marshaled);
        }
    }

    if gathering_complete && m.attribute(ATTR_KEY_END_OF_CANDIDATES).is_none() {
        m = m.with_property_attribute(ATTR_KEY_END_OF_CANDIDATES.to_owned());
    }

    m
}

fn add_data_media_section(
    d: SessionDescription,
    params: &LocalDescriptionParams<'_>,
) -> SessionDescription {
    let mut media = MediaDescription::new_jsep_media_description(
        MEDIA_SECTION_APPLICATION.to_owned(),
        vec![],
    );
    media.media_name = MediaName {
        media: MEDIA_SECTION_APPLICATION.to_owned(),
        port: RangedPort {
            value: 9,
            range: None,
        },
        protos: vec!["UDP".to_owned(), "DTLS".to_owned(), "SCTP".to_owned()],
        formats: vec!["webrtc-datachannel".to_owned()],
    };

    let mut media = media
        .with_value_attribute(ATTR_KEY_MID.to_owned(), DATA_CHANNEL_MID.to_owned())
        .with_property_attribute(RTCTrackDirection::SendRecv.to_string())
        .with_value_attribute("sctp-port".to_owned(), SCTP_PORT.to_string())
        .with_ice_credentials(
            params.ice_params.username_fragment.clone(),
            params.ice_params.password.clone(),
        );

    for dc in params.data_channels {
        media = media.with_value_attribute(
            SDP_ATTRIBUTE_DCMAP.to_owned(),
            format!("{} label=\"{}\"", dc.id, dc.label),
        );
    }

    // candidates ride on the first section, every section is bundled on it
    media = add_candidates_to_media_description(
        params.candidates,
        media,
        params.gathering_complete,
    );

    d.with_media(media)
}

fn add_track_media_section(
    d: SessionDescription,
    ice_params: &RTCIceParameters,
    init: &TrackInit,
) -> SessionDescription {
    let mut media =
        MediaDescription::new_jsep_media_description(init.codec.kind().to_owned(), vec![])
            .with_value_attribute(ATTR_KEY_MID.to_owned(), init.cname.clone())
            .with_ice_credentials(
                ice_params.username_fragment.clone(),
                ice_params.password.clone(),
            )
            .with_property_attribute(ATTR_KEY_RTCPMUX.to_owned())
            .with_property_attribute(init.direction.to_string())
            .with_codec(
                init.payload_type,
                init.codec.to_string(),
                init.codec.clock_rate(),
                init.codec.channels(),
                String::new(),
            );

    if !init.msid.is_empty() {
        media = media.with_value_attribute(
            ATTR_KEY_MSID.to_owned(),
            format!("{} {}", init.msid, init.cname),
        );
    }

    if init.direction.has_send() {
        media = media.with_media_source(
            init.ssrc,
            init.cname.clone(),
            init.msid.clone(),
            init.cname.clone(),
        );
    }

    d.with_media(media)
}

/// generate_local_description builds the local description: the application
/// section with one `dcmap` attribute per data channel, followed by one
/// media section per track, all bundled together.
pub(crate) fn generate_local_description(params: &LocalDescriptionParams<'_>) -> SessionDescription {
    let mut d = SessionDescription::new_jsep_session_description(false);
    d.origin.session_id = params.session_id;
    d.origin.session_version = params.session_version;

    let mut bundle_value = format!("BUNDLE {DATA_CHANNEL_MID}");
    d = add_data_media_section(d, params);

    for init in params.tracks {
        bundle_value += " ";
        bundle_value += &init.cname;
        d = add_track_media_section(d, params.ice_params, init);
    }

    d.with_value_attribute(ATTR_KEY_GROUP.to_owned(), bundle_value)
        .with_value_attribute(ATTR_KEY_MSID_SEMANTIC.to_owned(), "WMS *".to_owned())
}

pub(crate) fn get_mid_value(media: &MediaDescription) -> Option<&str> {
    media.attribute(ATTR_KEY_MID).flatten()
}

/// get_peer_direction returns the direction announced by a media section.
/// `None` means the section is inactive. A section without any direction
/// attribute is sendrecv.
pub(crate) fn get_peer_direction(media: &MediaDescription) -> Option<RTCTrackDirection> {
    for a in &media.attributes {
        if a.key == ATTR_KEY_INACTIVE {
            return None;
        }
        let direction = RTCTrackDirection::from(a.key.as_str());
        if direction != RTCTrackDirection::Unspecified {
            return Some(direction);
        }
    }
    Some(RTCTrackDirection::SendRecv)
}

pub(crate) fn extract_ice_details(
    desc: &SessionDescription,
) -> Result<(RTCIceParameters, Vec<RTCIceCandidate>)> {
    let mut candidates = vec![];

    let mut remote_ufrag = desc.attribute("ice-ufrag").map(|s| s.as_str());
    let mut remote_pwd = desc.attribute("ice-pwd").map(|s| s.as_str());

    for m in &desc.media_descriptions {
        let ufrag = m.attribute("ice-ufrag").flatten();
        let pwd = m.attribute("ice-pwd").flatten();

        if remote_ufrag.is_none() {
            remote_ufrag = ufrag;
        }
        if remote_pwd.is_none() {
            remote_pwd = pwd;
        }

        if ufrag.is_some() && ufrag != remote_ufrag {
            return Err(Error::ErrSessionDescriptionConflictingIceUfrag);
        }

        for a in &m.attributes {
            if a.is_ice_candidate() {
                if let Some(value) = &a.value {
                    candidates.push(RTCIceCandidate::unmarshal(value)?);
                }
            }
        }
    }

    let username_fragment = remote_ufrag
        .filter(|s| !s.is_empty())
        .ok_or(Error::ErrSessionDescriptionMissingIceUfrag)?;
    let password = remote_pwd
        .filter(|s| !s.is_empty())
        .ok_or(Error::ErrSessionDescriptionMissingIcePwd)?;

    Ok((
        RTCIceParameters {
            username_fragment: username_fragment.to_owned(),
            password: password.to_owned(),
            ice_lite: desc.attribute(ATTR_KEY_ICELITE).is_some(),
        },
        candidates,
    ))
}

/// parse_data_channel_map parses a `dcmap` value: `<id> label="<label>"`.
pub(crate) fn parse_data_channel_map(value: &str) -> Result<DataChannelEntry> {
    let invalid = || Error::ErrSessionDescriptionInvalidDataChannelMap(value.to_owned());

    let (id, rest) = value.trim().split_once(' ').ok_or_else(invalid)?;
    let id = id.parse::<u16>().map_err(|_| invalid())?;
    let label = rest
        .trim()
        .strip_prefix("label=\"")
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(invalid)?;

    Ok(DataChannelEntry {
        id,
        label: label.to_owned(),
    })
}

pub(crate) fn extract_data_channels(desc: &SessionDescription) -> Result<Vec<DataChannelEntry>> {
    let mut data_channels: Vec<DataChannelEntry> = vec![];
    for m in &desc.media_descriptions {
        if m.media_name.media != MEDIA_SECTION_APPLICATION {
            continue;
        }
        for a in &m.attributes {
            if a.key != SDP_ATTRIBUTE_DCMAP {
                continue;
            }
            let entry = parse_data_channel_map(a.value.as_deref().unwrap_or_default())?;
            if data_channels.iter().any(|dc| dc.id == entry.id) {
                return Err(Error::ErrSessionDescriptionInvalidDataChannelMap(format!(
                    "duplicate stream id {}",
                    entry.id
                )));
            }
            data_channels.push(entry);
        }
    }
    Ok(data_channels)
}

fn parse_rtpmap(mid: &str, value: &str) -> Result<(u8, RTCCodec)> {
    let invalid = || Error::ErrSessionDescriptionInvalidMediaSource(format!("{mid}: rtpmap {value}"));

    let (payload_type, encoding) = value.trim().split_once(' ').ok_or_else(invalid)?;
    let payload_type = payload_type.parse::<u8>().map_err(|_| invalid())?;
    let name = encoding.split('/').next().unwrap_or_default();
    let codec = RTCCodec::from(name);
    if codec == RTCCodec::Unspecified {
        return Err(invalid());
    }
    Ok((payload_type, codec))
}

fn parse_ssrc(attributes: &[Attribute]) -> Option<u32> {
    attributes
        .iter()
        .filter(|a| a.key == ATTR_KEY_SSRC)
        .filter_map(|a| a.value.as_deref())
        .find_map(|v| v.split_whitespace().next()?.parse::<u32>().ok())
}

fn parse_msid(media: &MediaDescription) -> String {
    if let Some(msid) = media.attribute(ATTR_KEY_MSID).flatten() {
        return msid.split_whitespace().next().unwrap_or_default().to_owned();
    }

    // `a=ssrc:<ssrc> msid:<stream> <track>`
    media
        .attributes
        .iter()
        .filter(|a| a.key == ATTR_KEY_SSRC)
        .filter_map(|a| a.value.as_deref())
        .find_map(|v| {
            let (_, rest) = v.split_once(' ')?;
            let stream = rest.strip_prefix("msid:")?;
            stream.split_whitespace().next().map(str::to_owned)
        })
        .unwrap_or_default()
}

/// track_details_from_sdp lists the tracks of the media sections. Inactive
/// sections are skipped. A sending section must name its ssrc.
pub(crate) fn track_details_from_sdp(desc: &SessionDescription) -> Result<Vec<TrackInit>> {
    let mut tracks: Vec<TrackInit> = vec![];

    for media in &desc.media_descriptions {
        if media.media_name.media == MEDIA_SECTION_APPLICATION {
            continue;
        }

        let mid = get_mid_value(media)
            .filter(|mid| !mid.is_empty())
            .ok_or_else(|| {
                Error::ErrSessionDescriptionInvalidMediaSource(format!(
                    "{} section without mid",
                    media.media_name.media
                ))
            })?;

        let Some(direction) = get_peer_direction(media) else {
            continue;
        };

        let rtpmap = media.attribute("rtpmap").flatten().ok_or_else(|| {
            Error::ErrSessionDescriptionInvalidMediaSource(format!("{mid}: missing rtpmap"))
        })?;
        let (payload_type, codec) = parse_rtpmap(mid, rtpmap)?;

        let ssrc = match parse_ssrc(&media.attributes) {
            Some(ssrc) => ssrc,
            None if direction.has_send() => {
                return Err(Error::ErrSessionDescriptionInvalidMediaSource(format!(
                    "{mid}: sending section without ssrc"
                )));
            }
            None => 0,
        };

        if tracks.iter().any(|t| t.cname == mid) {
            return Err(Error::ErrSessionDescriptionInvalidMediaSource(format!(
                "{mid}: duplicate mid"
            )));
        }

        tracks.push(TrackInit {
            cname: mid.to_owned(),
            codec,
            direction,
            msid: parse_msid(media),
            ssrc,
            payload_type,
            ..Default::default()
        });
    }

    Ok(tracks)
}

/// extract_remote_details validates a remote description completely and
/// returns what it announces.
pub(crate) fn extract_remote_details(desc: &SessionDescription) -> Result<RemoteDescriptionDetails> {
    let (ice_params, candidates) = extract_ice_details(desc)?;
    let data_channels = extract_data_channels(desc)?;
    let tracks = track_details_from_sdp(desc)?;

    Ok(RemoteDescriptionDetails {
        ice_params,
        candidates,
        data_channels,
        tracks,
    })
}
