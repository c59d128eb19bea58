mod common;

use std::sync::Arc;

use bytes::Bytes;
use rtc_client::api::APIBuilder;
use rtc_client::data_channel::data_channel_message::DataChannelMessage;
use rtc_client::data_channel::data_channel_state::RTCDataChannelState;
use rtc_client::data_channel::RTCDataChannel;
use rtc_client::error::{Error, Result};
use tokio::sync::mpsc;
use tokio::time::timeout;

use common::*;

const ECHO_COUNT: usize = 50;

#[tokio::test]
async fn test_data_channel_echo() -> Result<()> {
    init_log();

    let api = APIBuilder::new().build();
    let (pc_a, pc_b) = new_pair(&api).await?;

    // the answering side echoes everything it receives
    pc_b.on_data_channel(Box::new(move |d: Arc<RTCDataChannel>| {
        let d2 = Arc::clone(&d);
        d.on_message(Box::new(move |msg: DataChannelMessage| {
            let d3 = Arc::clone(&d2);
            Box::pin(async move {
                let result = if msg.is_string {
                    d3.send_text(String::from_utf8_lossy(&msg.data).into_owned())
                        .await
                } else {
                    d3.send(&msg.data).await
                };
                if let Err(err) = result {
                    log::warn!("echo failed: {err}");
                }
            })
        }));
        Box::pin(async {})
    }));

    let dc = pc_a.create_data_channel("echo").await?;
    let (echo_tx, mut echo_rx) = mpsc::unbounded_channel();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let _ = echo_tx.send(msg);
        Box::pin(async {})
    }));

    let (open_tx, mut open_rx) = mpsc::channel::<()>(1);
    let dc2 = Arc::clone(&dc);
    dc.on_open(Box::new(move || {
        Box::pin(async move {
            for i in 0..ECHO_COUNT {
                let result = if i % 2 == 0 {
                    dc2.send_text(format!("message {i}")).await
                } else {
                    dc2.send(&Bytes::from(vec![i as u8; i])).await
                };
                if let Err(err) = result {
                    log::warn!("send failed: {err}");
                }
            }
            let _ = open_tx.send(()).await;
        })
    }));

    signal_pair(&pc_a, &pc_b).await?;

    timeout(TIMEOUT, open_rx.recv())
        .await
        .map_err(|_| Error::new("data channel never opened".to_owned()))?;

    for i in 0..ECHO_COUNT {
        let msg = timeout(TIMEOUT, echo_rx.recv())
            .await
            .map_err(|_| Error::new(format!("echo {i} missing")))?
            .ok_or_else(|| Error::new(format!("echo {i} missing")))?;
        if i % 2 == 0 {
            assert_eq!(msg, DataChannelMessage::text(format!("message {i}")));
        } else {
            assert_eq!(msg, DataChannelMessage::binary(vec![i as u8; i]));
        }
    }

    pc_a.close().await?;
    pc_b.close().await?;

    Ok(())
}

#[tokio::test]
async fn test_data_channel_from_answering_side() -> Result<()> {
    init_log();

    let api = APIBuilder::new().build();
    let (pc_a, pc_b) = new_pair(&api).await?;

    let (received_tx, mut received_rx) = mpsc::unbounded_channel();
    pc_a.on_data_channel(Box::new(move |d: Arc<RTCDataChannel>| {
        let received_tx2 = received_tx.clone();
        let label = d.label().to_owned();
        d.on_message(Box::new(move |msg: DataChannelMessage| {
            let _ = received_tx2.send((label.clone(), msg));
            Box::pin(async {})
        }));
        Box::pin(async {})
    }));

    pc_a.create_data_channel("offered").await?;

    pc_a.create_offer().await?;
    pc_a.gathering_complete().await;
    let offer = pc_a
        .local_description()
        .await
        .ok_or_else(|| Error::new("no offer".to_owned()))?;
    pc_b.set_remote_description(over_the_wire(&offer)?).await?;

    let dc_b = pc_b.create_data_channel("answered").await?;
    assert_eq!(dc_b.id() % 2, 1);
    let dc_b2 = Arc::clone(&dc_b);
    dc_b.on_open(Box::new(move || {
        Box::pin(async move {
            if let Err(err) = dc_b2.send_text("hello from the answer").await {
                log::warn!("send failed: {err}");
            }
        })
    }));

    pc_b.create_answer().await?;
    pc_b.gathering_complete().await;
    let answer = pc_b
        .local_description()
        .await
        .ok_or_else(|| Error::new("no answer".to_owned()))?;
    pc_a.set_remote_description(over_the_wire(&answer)?).await?;

    let (label, msg) = timeout(TIMEOUT, received_rx.recv())
        .await
        .map_err(|_| Error::new("nothing received".to_owned()))?
        .ok_or_else(|| Error::new("nothing received".to_owned()))?;
    assert_eq!(label, "answered");
    assert_eq!(msg, DataChannelMessage::text("hello from the answer"));

    let labels: Vec<String> = pc_a
        .data_channels()
        .await
        .iter()
        .map(|d| d.label().to_owned())
        .collect();
    assert_eq!(labels, vec!["offered".to_owned(), "answered".to_owned()]);

    Ok(())
}

#[tokio::test]
async fn test_data_channel_close_propagates() -> Result<()> {
    init_log();

    let api = APIBuilder::new().build();
    let (pc_a, pc_b) = new_pair(&api).await?;

    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel::<String>();
    pc_b.on_data_channel(Box::new(move |d: Arc<RTCDataChannel>| {
        let closed_tx2 = closed_tx.clone();
        let label = d.label().to_owned();
        d.on_close(Box::new(move || {
            let _ = closed_tx2.send(label.clone());
            Box::pin(async {})
        }));
        Box::pin(async {})
    }));

    let dc = pc_a.create_data_channel("short-lived").await?;
    signal_pair(&pc_a, &pc_b).await?;
    assert_eq!(dc.ready_state(), RTCDataChannelState::Open);

    dc.close().await?;
    let label = timeout(TIMEOUT, closed_rx.recv())
        .await
        .map_err(|_| Error::new("remote close missing".to_owned()))?;
    assert_eq!(label.as_deref(), Some("short-lived"));

    let err = dc.send_text("after close").await.unwrap_err();
    assert!(
        matches!(err, Error::ErrDataChannelNotOpen(RTCDataChannelState::Closed)),
        "{err}"
    );

    let remote = pc_b.data_channels().await;
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].ready_state(), RTCDataChannelState::Closed);

    Ok(())
}
