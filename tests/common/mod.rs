#![allow(dead_code)]

use std::time::Duration;

use rtc_client::api::API;
use rtc_client::error::{Error, Result};
use rtc_client::peer_connection::configuration::RTCConfiguration;
use rtc_client::peer_connection::sdp::session_description::RTCSessionDescription;
use rtc_client::peer_connection::RTCPeerConnection;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub async fn new_pair(api: &API) -> Result<(RTCPeerConnection, RTCPeerConnection)> {
    let pc_offer = api.new_peer_connection(RTCConfiguration::default()).await?;
    let pc_answer = api.new_peer_connection(RTCConfiguration::default()).await?;
    Ok((pc_offer, pc_answer))
}

/// over_the_wire hands a description to the peer the way an out-of-band
/// channel would: as its JSON text form.
pub fn over_the_wire(desc: &RTCSessionDescription) -> Result<RTCSessionDescription> {
    RTCSessionDescription::from_json(&desc.to_json()?)
}

/// signal_pair runs the offer/answer exchange, each side sending its
/// description once gathering completed.
pub async fn signal_pair(pc_offer: &RTCPeerConnection, pc_answer: &RTCPeerConnection) -> Result<()> {
    pc_offer.create_offer().await?;
    pc_offer.gathering_complete().await;
    let offer = pc_offer
        .local_description()
        .await
        .ok_or_else(|| Error::new("no offer".to_owned()))?;
    pc_answer.set_remote_description(over_the_wire(&offer)?).await?;

    pc_answer.create_answer().await?;
    pc_answer.gathering_complete().await;
    let answer = pc_answer
        .local_description()
        .await
        .ok_or_else(|| Error::new("no answer".to_owned()))?;
    pc_offer.set_remote_description(over_the_wire(&answer)?).await?;

    Ok(())
}
