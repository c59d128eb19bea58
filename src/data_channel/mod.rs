
pub mod data_channel_message;
pub mod data_channel_state;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as SyncMutex};

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use data_channel_message::*;
use data_channel_state::RTCDataChannelState;
use portable_atomic::{AtomicU16, AtomicU8, Ordering};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Labels longer than this can not be announced.
pub(crate) const DATA_CHANNEL_LABEL_LIMIT: usize = u16::MAX as usize;

pub type OnMessageHdlrFn = Box<
    dyn (FnMut(DataChannelMessage) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnOpenHdlrFn =
    Box<dyn (FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

pub type OnCloseHdlrFn =
    Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

/// DataChannel represents a WebRTC DataChannel
/// The DataChannel interface represents a network channel
/// which can be used for bidirectional peer-to-peer transfers of arbitrary data
///
/// Messages are delivered reliably and in the order they were sent.
///
/// ## Specifications
///
/// * [MDN]
/// * [W3C]
///
/// [MDN]: https://developer.mozilla.org/en-US/docs/Web/API/RTCDataChannel
/// [W3C]: https://w3c.github.io/webrtc-pc/#dom-rtcdatachannel
pub struct RTCDataChannel {
    pub(crate) label: String,
    pub(crate) id: AtomicU16,
    pub(crate) ready_state: Arc<AtomicU8>, // DataChannelState

    pub(crate) on_message_handler: Arc<ArcSwapOption<Mutex<OnMessageHdlrFn>>>,
    pub(crate) on_open_handler: SyncMutex<Option<OnOpenHdlrFn>>,
    pub(crate) on_close_handler: Arc<ArcSwapOption<Mutex<OnCloseHdlrFn>>>,

    pub(crate) transport: Mutex<Option<Arc<dyn Transport>>>,
}

impl std::fmt::Debug for RTCDataChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTCDataChannel")
            .field("label", &self.label)
            .field("id", &self.id())
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

impl RTCDataChannel {
    // create the DataChannel object before the networking is set up.
    pub(crate) fn new(label: String, id: u16) -> Self {
        RTCDataChannel {
            label,
            id: AtomicU16::new(id),
            ready_state: Arc::new(AtomicU8::new(RTCDataChannelState::Connecting as u8)),
            on_message_handler: Arc::new(ArcSwapOption::empty()),
            on_open_handler: SyncMutex::new(None),
            on_close_handler: Arc::new(ArcSwapOption::empty()),
            transport: Mutex::new(None),
        }
    }

    /// on_open sets an event handler which is invoked when
    /// the underlying data transport has been established.
    /// Registering it after the channel opened invokes it right away.
    pub fn on_open(&self, f: OnOpenHdlrFn) {
        if let Ok(mut handler) = self.on_open_handler.lock() {
            handler.replace(f);
        }

        if self.ready_state() == RTCDataChannelState::Open {
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

    /// on_close sets an event handler which is invoked when
    /// the channel has been closed by either side.
    pub fn on_close(&self, f: OnCloseHdlrFn) {
        self.on_close_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_message sets an event handler which is invoked on a text or binary
    /// message arrival from the remote peer. Messages are handed over one at
    /// a time, in the order they were sent.
    pub fn on_message(&self, f: OnMessageHdlrFn) {
        self.on_message_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    async fn do_close(&self) {
        if let Some(handler) = &*self.on_close_handler.load() {
            let mut f = handler.lock().await;
            f().await;
        }
    }

    /// handle_open binds the channel to the connected transport and opens it.
    /// Only the first call has an effect, and none once the channel closed.
    pub(crate) async fn handle_open(&self, transport: Arc<dyn Transport>) {
        {
            let mut t = self.transport.lock().await;
            if t.is_some() || self.ready_state() == RTCDataChannelState::Closed {
                return;
            }
            *t = Some(transport);
        }

        if self
            .ready_state
            .compare_exchange(
                RTCDataChannelState::Connecting as u8,
                RTCDataChannelState::Open as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }

        log::debug!("data channel {} ({}) open", self.label, self.id());
        self.do_open();
    }

    /// handle_message delivers an inbound message. Messages for a closed
    /// channel are dropped.
    pub(crate) async fn handle_message(&self, msg: DataChannelMessage) {
        if self.ready_state() != RTCDataChannelState::Open {
            log::debug!(
                "data channel {} ({}) dropped message in state {}",
                self.label,
                self.id(),
                self.ready_state()
            );
            return;
        }

        if let Some(handler) = &*self.on_message_handler.load() {
            let mut f = handler.lock().await;
            f(msg).await;
        }
    }

    /// handle_remote_close closes the channel on behalf of the peer.
    pub(crate) async fn handle_remote_close(&self) {
        if self.set_closed() {
            log::debug!("data channel {} ({}) closed by peer", self.label, self.id());
            self.do_close().await;
        }
    }

    /// set_closed moves the channel to closed, reporting whether this call did it.
    fn set_closed(&self) -> bool {
        self.ready_state
            .swap(RTCDataChannelState::Closed as u8, Ordering::SeqCst)
            != RTCDataChannelState::Closed as u8
    }

    /// send sends the binary message to the DataChannel peer
    pub async fn send(&self, data: &Bytes) -> Result<usize> {
        self.send_message(DataChannelMessage {
            is_string: false,
            data: data.clone(),
        })
        .await
    }

    /// send_text sends the text message to the DataChannel peer
    pub async fn send_text(&self, s: impl Into<String>) -> Result<usize> {
        self.send_message(DataChannelMessage::text(s)).await
    }

    async fn send_message(&self, msg: DataChannelMessage) -> Result<usize> {
        self.ensure_open()?;

        let transport = {
            let t = self.transport.lock().await;
            t.clone()
        };
        let Some(transport) = transport else {
            return Err(Error::ErrDataChannelNotOpen(self.ready_state()));
        };

        let n = msg.data.len();
        transport.send_data(self.id(), &msg).await?;
        Ok(n)
    }

    fn ensure_open(&self) -> Result<()> {
        let state = self.ready_state();
        if state != RTCDataChannelState::Open {
            Err(Error::ErrDataChannelNotOpen(state))
        } else {
            Ok(())
        }
    }

    /// close closes the DataChannel. It may be called regardless of whether
    /// the DataChannel object was created by this peer or the remote peer.
    /// Closing an already closed channel does nothing.
    pub async fn close(&self) -> Result<()> {
        let was_open = self.ready_state() == RTCDataChannelState::Open;
        if !self.set_closed() {
            return Ok(());
        }

        log::debug!("data channel {} ({}) closed", self.label, self.id());

        let transport = {
            let mut t = self.transport.lock().await;
            t.take()
        };

        let result = match transport {
            Some(transport) if was_open => transport.close_data_channel(self.id()).await,
            _ => Ok(()),
        };

        self.do_close().await;
        result
    }

    /// label represents a label that can be used to distinguish this
    /// DataChannel object from other DataChannel objects. Scripts are
    /// allowed to create multiple DataChannel objects with the same label.
    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    /// id represents the stream ID of this DataChannel. Channels created by
    /// the offering side use even IDs, the answering side odd ones.
    pub fn id(&self) -> u16 {
        self.id.load(Ordering::SeqCst)
    }

    /// set_id moves a channel that was announced before this side knew its
    /// role to a stream ID of the other parity.
    pub(crate) fn set_id(&self, id: u16) {
        self.id.store(id, Ordering::SeqCst);
    }

    /// ready_state represents the state of the DataChannel object.
    pub fn ready_state(&self) -> RTCDataChannelState {
        self.ready_state.load(Ordering::SeqCst).into()
    }

    /// is_open reports whether messages can be sent.
    pub fn is_open(&self) -> bool {
        self.ready_state() == RTCDataChannelState::Open
    }
}
