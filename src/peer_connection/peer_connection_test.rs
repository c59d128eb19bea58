use std::time::Duration;

use tokio::time::timeout;

use super::*;
use crate::api::APIBuilder;
use crate::data_channel::data_channel_state::RTCDataChannelState;
use crate::ice_transport::ice_server::RTCIceServer;
use crate::track::codec::RTCCodec;
use crate::track::track_init::RTCTrackDirection;

const TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) async fn new_pair() -> Result<(RTCPeerConnection, RTCPeerConnection)> {
    let api = APIBuilder::new().build();

    let pc_offer = api.new_peer_connection(RTCConfiguration::default()).await?;
    let pc_answer = api.new_peer_connection(RTCConfiguration::default()).await?;

    Ok((pc_offer, pc_answer))
}

/// final_local_description waits for gathering and returns the description
/// as the peer would receive it, through its text form.
async fn final_local_description(pc: &RTCPeerConnection) -> Result<RTCSessionDescription> {
    pc.gathering_complete().await;
    let desc = pc
        .local_description()
        .await
        .ok_or_else(|| Error::new("no local description".to_owned()))?;
    RTCSessionDescription::from_json(&desc.to_json()?)
}

pub(crate) async fn signal_pair(
    pc_offer: &RTCPeerConnection,
    pc_answer: &RTCPeerConnection,
) -> Result<()> {
    pc_offer.create_offer().await?;
    let offer = final_local_description(pc_offer).await?;
    pc_answer.set_remote_description(offer).await?;

    pc_answer.create_answer().await?;
    let answer = final_local_description(pc_answer).await?;
    pc_offer.set_remote_description(answer).await?;

    Ok(())
}

fn video_init(cname: &str, ssrc: u32) -> TrackInit {
    TrackInit {
        cname: cname.to_owned(),
        codec: RTCCodec::H264,
        direction: RTCTrackDirection::SendOnly,
        msid: "stream".to_owned(),
        ssrc,
        payload_type: 96,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_new_peer_connection() -> Result<()> {
    let (pc, _) = new_pair().await?;

    assert_eq!(pc.signaling_state(), RTCSignalingState::New);
    assert_eq!(pc.ice_gathering_state(), RTCIceGatheringState::New);
    assert_eq!(pc.connection_state(), RTCPeerConnectionState::New);
    assert!(pc.local_description().await.is_none());
    assert!(pc.remote_description().await.is_none());

    Ok(())
}

#[tokio::test]
async fn test_new_peer_connection_validates_ice_servers() -> Result<()> {
    let api = APIBuilder::new().build();

    let tests = vec![
        ("stun:stun.l.google.com:19302", true),
        ("turn:turn.example.org:3478", false),
        ("http://example.org", false),
    ];

    for (url, ok) in tests {
        let configuration = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: vec![url.to_owned()],
                ..Default::default()
            }],
        };
        let result = api.new_peer_connection(configuration.clone()).await;
        assert_eq!(result.is_ok(), ok, "{url}");
        if let Ok(pc) = result {
            // handed through unmodified
            assert_eq!(pc.get_configuration(), &configuration);
        }
    }

    Ok(())
}

#[tokio::test]
async fn test_negotiation_order_is_enforced() -> Result<()> {
    let (pc_offer, pc_answer) = new_pair().await?;

    // nothing to answer yet
    let err = pc_answer.create_answer().await.unwrap_err();
    assert!(err.is_invalid_state(), "{err}");
    assert_eq!(pc_answer.signaling_state(), RTCSignalingState::New);
    assert!(pc_answer.local_description().await.is_none());

    pc_offer.create_offer().await?;
    assert_eq!(pc_offer.signaling_state(), RTCSignalingState::HaveLocalOffer);

    // a second offer is renegotiation
    let err = pc_offer.create_offer().await.unwrap_err();
    assert!(err.is_invalid_state(), "{err}");

    // an answer can not be applied to the side that has not offered
    let mut offer = final_local_description(&pc_offer).await?;
    offer.sdp_type = RTCSdpType::Answer;
    let err = pc_answer.set_remote_description(offer).await.unwrap_err();
    assert!(err.is_invalid_state(), "{err}");
    assert_eq!(pc_answer.signaling_state(), RTCSignalingState::New);

    Ok(())
}

#[tokio::test]
async fn test_set_remote_description_rejects_malformed() -> Result<()> {
    let (_, pc) = new_pair().await?;

    let tests = vec![
        ("garbage", "not a session description".to_owned()),
        (
            "missing ice credentials",
            "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\n\
m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\nc=IN IP4 0.0.0.0\r\n\
a=mid:data\r\n"
                .to_owned(),
        ),
    ];

    for (name, sdp) in tests {
        let desc = RTCSessionDescription {
            sdp_type: RTCSdpType::Offer,
            sdp,
            parsed: None,
        };
        let err = pc.set_remote_description(desc).await.unwrap_err();
        assert!(err.is_descriptor_parse_error(), "{name}: {err}");
        assert_eq!(pc.signaling_state(), RTCSignalingState::New, "{name}");
        assert!(pc.remote_description().await.is_none(), "{name}");
    }

    let desc = RTCSessionDescription::default();
    let err = pc.set_remote_description(desc).await.unwrap_err();
    assert!(
        matches!(err, Error::ErrSessionDescriptionUnsupportedType(_)),
        "{err}"
    );

    Ok(())
}

#[tokio::test]
async fn test_signal_pair_reaches_stable() -> Result<()> {
    let (pc_offer, pc_answer) = new_pair().await?;
    let dc = pc_offer.create_data_channel("chat").await?;

    let (state_tx, mut state_rx) = mpsc::unbounded_channel();
    pc_answer.on_signaling_state_change(Box::new(move |s: RTCSignalingState| {
        let _ = state_tx.send(s);
        Box::pin(async {})
    }));

    signal_pair(&pc_offer, &pc_answer).await?;

    assert_eq!(pc_offer.signaling_state(), RTCSignalingState::Stable);
    assert_eq!(pc_answer.signaling_state(), RTCSignalingState::Stable);
    assert_eq!(pc_offer.connection_state(), RTCPeerConnectionState::Connected);
    assert_eq!(pc_answer.connection_state(), RTCPeerConnectionState::Connected);
    assert_eq!(dc.ready_state(), RTCDataChannelState::Open);

    // the answering side went through have-remote-offer, never have-local-offer
    assert_eq!(state_rx.recv().await, Some(RTCSignalingState::HaveRemoteOffer));
    assert_eq!(state_rx.recv().await, Some(RTCSignalingState::Stable));
    assert!(state_rx.try_recv().is_err());

    let remote_channels = pc_answer.data_channels().await;
    assert_eq!(remote_channels.len(), 1);
    assert_eq!(remote_channels[0].label(), "chat");
    assert_eq!(remote_channels[0].id(), dc.id());
    assert!(remote_channels[0].is_open());

    pc_offer.close().await?;
    pc_answer.close().await?;

    Ok(())
}

#[tokio::test]
async fn test_set_remote_description_twice_from_stable() -> Result<()> {
    let (pc_offer, pc_answer) = new_pair().await?;
    signal_pair(&pc_offer, &pc_answer).await?;

    let local = pc_offer.local_description().await;
    let remote = pc_offer.remote_description().await;
    let answer = final_local_description(&pc_answer).await?;

    for _ in 0..2 {
        let err = pc_offer
            .set_remote_description(answer.clone())
            .await
            .unwrap_err();
        assert!(err.is_invalid_state(), "{err}");
    }

    assert_eq!(pc_offer.signaling_state(), RTCSignalingState::Stable);
    assert_eq!(pc_offer.local_description().await, local);
    assert_eq!(pc_offer.remote_description().await, remote);

    Ok(())
}

#[tokio::test]
async fn test_local_description_collects_candidates() -> Result<()> {
    let (pc, _) = new_pair().await?;

    let (desc_tx, mut desc_rx) = mpsc::unbounded_channel();
    pc.on_local_description(Box::new(move |desc: RTCSessionDescription| {
        let _ = desc_tx.send(desc);
        Box::pin(async {})
    }));

    let offer = pc.create_offer().await?;
    assert_eq!(offer.sdp_type, RTCSdpType::Offer);
    assert!(!offer.sdp.contains("a=end-of-candidates"));

    pc.gathering_complete().await;
    assert_eq!(pc.ice_gathering_state(), RTCIceGatheringState::Complete);

    let local = pc
        .local_description()
        .await
        .ok_or_else(|| Error::new("no local description".to_owned()))?;
    assert_eq!(local.sdp_type, RTCSdpType::Offer);
    assert!(local.sdp.contains("a=candidate:"), "{}", local.sdp);
    assert!(local.sdp.contains("a=end-of-candidates"), "{}", local.sdp);

    // the first report is the description without candidates, the last
    // one the final description
    let mut reported = vec![];
    while let Ok(desc) = desc_rx.try_recv() {
        reported.push(desc);
    }
    assert!(reported.len() >= 2, "{reported:?}");
    assert_eq!(reported.last(), Some(&local));

    Ok(())
}

#[tokio::test]
async fn test_subscribe_events() -> Result<()> {
    let (pc, _) = new_pair().await?;
    let mut events = pc.subscribe();

    pc.create_offer().await?;

    let mut seen = vec![];
    loop {
        let event = timeout(TIMEOUT, events.recv())
            .await
            .map_err(|_| Error::new("no more events".to_owned()))?
            .map_err(|err| Error::new(err.to_string()))?;
        let done = matches!(event, RTCPeerConnectionEvent::IceCandidate(None));
        seen.push(event);
        if done {
            break;
        }
    }

    assert!(matches!(
        seen[0],
        RTCPeerConnectionEvent::SignalingStateChange(RTCSignalingState::HaveLocalOffer)
    ));
    assert!(matches!(seen[1], RTCPeerConnectionEvent::LocalDescription(_)));
    assert!(matches!(
        seen[2],
        RTCPeerConnectionEvent::IceGatheringStateChange(RTCIceGatheringState::Gathering)
    ));

    let candidates = seen
        .iter()
        .filter(|e| matches!(e, RTCPeerConnectionEvent::IceCandidate(Some(_))))
        .count();
    assert_eq!(candidates, 1, "{seen:?}");

    let completions = seen
        .iter()
        .filter(|e| {
            matches!(
                e,
                RTCPeerConnectionEvent::IceGatheringStateChange(RTCIceGatheringState::Complete)
            )
        })
        .count();
    assert_eq!(completions, 1, "{seen:?}");

    Ok(())
}

#[tokio::test]
async fn test_add_ice_candidate() -> Result<()> {
    let (pc_offer, pc_answer) = new_pair().await?;

    let candidate = RTCIceCandidateInit {
        candidate: "candidate:1 1 udp 2130706431 127.0.0.1 50000 typ host".to_owned(),
        ..Default::default()
    };

    let err = pc_answer
        .add_ice_candidate(candidate.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ErrNoRemoteDescription), "{err}");

    pc_offer.create_offer().await?;
    let offer = final_local_description(&pc_offer).await?;
    pc_answer.set_remote_description(offer).await?;

    pc_answer.add_ice_candidate(candidate).await?;
    pc_answer
        .add_ice_candidate(RTCIceCandidateInit::default())
        .await?;

    let err = pc_answer
        .add_ice_candidate(RTCIceCandidateInit {
            candidate: "candidate:1 1 udp".to_owned(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ErrInvalidCandidate(_)), "{err}");

    Ok(())
}

#[tokio::test]
async fn test_create_data_channel() -> Result<()> {
    let (pc_offer, pc_answer) = new_pair().await?;

    let err = pc_offer
        .create_data_channel(&"x".repeat(DATA_CHANNEL_LABEL_LIMIT + 1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ErrStringSizeLimit), "{err}");
    assert!(pc_offer.create_data_channel("line\nbreak").await.is_err());

    // the offering side allocates even stream ids
    let a = pc_offer.create_data_channel("a").await?;
    let b = pc_offer.create_data_channel("b").await?;
    assert_eq!((a.id(), b.id()), (0, 2));

    // created before the offer arrived, renumbered once it did
    let early = pc_answer.create_data_channel("early").await?;
    assert_eq!(early.id(), 0);

    pc_offer.create_offer().await?;
    let err = pc_offer.create_data_channel("late").await.unwrap_err();
    assert!(
        matches!(
            err,
            Error::ErrIncorrectSignalingState(RTCSignalingState::HaveLocalOffer)
        ),
        "{err}"
    );

    let offer = final_local_description(&pc_offer).await?;
    pc_answer.set_remote_description(offer).await?;
    assert_eq!(early.id(), 1);

    let answering = pc_answer.create_data_channel("answering").await?;
    assert_eq!(answering.id(), 3);

    let mut ids: Vec<u16> = pc_answer
        .data_channels()
        .await
        .iter()
        .map(|dc| dc.id())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2, 3]);

    Ok(())
}

#[tokio::test]
async fn test_add_track() -> Result<()> {
    let (pc, _) = new_pair().await?;

    let track = pc.add_track(video_init("video", 1)).await?;
    assert_eq!(track.mid(), "video");
    assert!(!track.is_remote());

    let tests = vec![
        ("same cname", video_init("video", 2)),
        ("same ssrc", video_init("other", 1)),
        ("data section", video_init(DATA_CHANNEL_MID, 3)),
    ];
    for (name, init) in tests {
        let err = pc.add_track(init).await.unwrap_err();
        assert!(matches!(err, Error::ErrExistingTrack), "{name}: {err}");
    }

    let mut invalid = video_init("audio", 4);
    invalid.payload_type = 8;
    assert!(pc.add_track(invalid).await.is_err());

    assert_eq!(pc.tracks().await.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_remote_announcements() -> Result<()> {
    let (pc_offer, pc_answer) = new_pair().await?;
    pc_offer.create_data_channel("chat").await?;
    pc_offer.add_track(video_init("video", 1234)).await?;

    let (dc_tx, mut dc_rx) = mpsc::unbounded_channel();
    pc_answer.on_data_channel(Box::new(move |d: Arc<RTCDataChannel>| {
        let _ = dc_tx.send(d);
        Box::pin(async {})
    }));
    let (track_tx, mut track_rx) = mpsc::unbounded_channel();
    pc_answer.on_track(Box::new(move |t: Arc<RTCMediaTrack>| {
        let _ = track_tx.send(t);
        Box::pin(async {})
    }));

    signal_pair(&pc_offer, &pc_answer).await?;

    let d = timeout(TIMEOUT, dc_rx.recv())
        .await
        .map_err(|_| Error::new("no data channel".to_owned()))?;
    assert_eq!(d.map(|d| d.label().to_owned()), Some("chat".to_owned()));
    assert!(dc_rx.try_recv().is_err());

    let t = timeout(TIMEOUT, track_rx.recv())
        .await
        .map_err(|_| Error::new("no track".to_owned()))?
        .ok_or_else(|| Error::new("no track".to_owned()))?;
    assert!(t.is_remote());
    assert_eq!(t.mid(), "video");
    assert_eq!(t.ssrc(), 1234);
    assert_eq!(t.codec(), RTCCodec::H264);
    assert_eq!(t.direction(), RTCTrackDirection::RecvOnly);
    assert_eq!(t.msid(), "stream");
    assert!(t.is_connected().await);

    // the receiving side does not announce anything back to the sender
    assert_eq!(pc_offer.tracks().await.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_close() -> Result<()> {
    let (pc_offer, pc_answer) = new_pair().await?;
    let dc = pc_offer.create_data_channel("chat").await?;
    let track = pc_offer.add_track(video_init("video", 1)).await?;
    signal_pair(&pc_offer, &pc_answer).await?;

    let (state_tx, mut state_rx) = mpsc::unbounded_channel();
    pc_offer.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
        let _ = state_tx.send(s);
        Box::pin(async {})
    }));

    pc_offer.close().await?;
    pc_offer.close().await?;

    assert_eq!(pc_offer.signaling_state(), RTCSignalingState::Closed);
    assert_eq!(pc_offer.connection_state(), RTCPeerConnectionState::Closed);
    assert_eq!(dc.ready_state(), RTCDataChannelState::Closed);
    assert_eq!(
        track.state(),
        crate::track::track_state::RTCTrackState::Closed
    );

    assert_eq!(state_rx.recv().await, Some(RTCPeerConnectionState::Closed));
    assert!(state_rx.try_recv().is_err());

    let err = pc_offer.create_offer().await.unwrap_err();
    assert!(matches!(err, Error::ErrConnectionClosed), "{err}");
    let err = pc_offer.create_data_channel("again").await.unwrap_err();
    assert!(matches!(err, Error::ErrConnectionClosed), "{err}");

    // the peer learns about the closed channel
    let remote = pc_answer.data_channels().await;
    timeout(TIMEOUT, async {
        while remote[0].is_open() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .map_err(|_| Error::new("remote channel still open".to_owned()))?;

    pc_answer.close().await?;

    Ok(())
}
