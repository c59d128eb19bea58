use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use portable_atomic::{AtomicBool, AtomicU8, Ordering};
use tokio::sync::{Mutex, Notify};

use crate::error::Result;
use crate::ice_transport::ice_candidate::RTCIceCandidate;
use crate::ice_transport::ice_gathering_state::RTCIceGatheringState;
use crate::ice_transport::ice_parameters::RTCIceParameters;
use crate::ice_transport::ice_server::RTCIceServer;
use crate::transport::Transport;

pub type OnLocalCandidateHdlrFn = Box<
    dyn (FnMut(Option<RTCIceCandidate>) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnIceGatheringStateChangeHdlrFn = Box<
    dyn (FnMut(RTCIceGatheringState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnGatheringCompleteHdlrFn =
    Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

#[derive(Default)]
struct GathererHandlers {
    on_local_candidate: ArcSwapOption<Mutex<OnLocalCandidateHdlrFn>>,
    on_state_change: ArcSwapOption<Mutex<OnIceGatheringStateChangeHdlrFn>>,
    on_gathering_complete: ArcSwapOption<Mutex<OnGatheringCompleteHdlrFn>>,
}

/// RTCIceGatherer drives candidate discovery on the transport and keeps the
/// candidates found so far. It moves `new -> gathering -> complete` and
/// reports completion exactly once.
pub struct RTCIceGatherer {
    transport: Arc<dyn Transport>,
    ice_servers: Vec<RTCIceServer>,

    state: Arc<AtomicU8>, //RTCIceGatheringState
    closed: Arc<AtomicBool>,
    /// Set once every completion handler has run.
    finished: Arc<AtomicBool>,
    candidates: Arc<Mutex<Vec<RTCIceCandidate>>>,
    handlers: Arc<GathererHandlers>,
    complete: Arc<Notify>,
}

impl RTCIceGatherer {
    pub(crate) fn new(transport: Arc<dyn Transport>, ice_servers: Vec<RTCIceServer>) -> Self {
        RTCIceGatherer {
            transport,
            ice_servers,
            state: Arc::new(AtomicU8::new(RTCIceGatheringState::New as u8)),
            closed: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
            candidates: Arc::new(Mutex::new(vec![])),
            handlers: Arc::new(GathererHandlers::default()),
            complete: Arc::new(Notify::new()),
        }
    }

    /// gather starts collecting candidates. Calling it again once gathering
    /// has started does nothing.
    pub async fn gather(&self) -> Result<()> {
        if self
            .state
            .compare_exchange(
                RTCIceGatheringState::New as u8,
                RTCIceGatheringState::Gathering as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return Ok(());
        }

        log::debug!("ice gathering started");
        RTCIceGatherer::do_state_change(&self.handlers, RTCIceGatheringState::Gathering).await;

        let mut candidate_rx = match self.transport.gather(&self.ice_servers).await {
            Ok(rx) => rx,
            Err(err) => {
                // nothing more will arrive, the description stays host-less
                log::warn!("ice gathering failed: {err}");
                RTCIceGatherer::finish(
                    &self.state,
                    &self.closed,
                    &self.finished,
                    &self.handlers,
                    &self.complete,
                )
                .await;
                return Err(err);
            }
        };

        let state = Arc::clone(&self.state);
        let closed = Arc::clone(&self.closed);
        let finished = Arc::clone(&self.finished);
        let candidates = Arc::clone(&self.candidates);
        let handlers = Arc::clone(&self.handlers);
        let complete = Arc::clone(&self.complete);
        tokio::spawn(async move {
            while let Some(candidate) = candidate_rx.recv().await {
                if closed.load(Ordering::SeqCst) {
                    return;
                }

                log::trace!("ice gathered local candidate {candidate}");
                {
                    let mut c = candidates.lock().await;
                    c.push(candidate.clone());
                }

                if let Some(handler) = &*handlers.on_local_candidate.load() {
                    let mut f = handler.lock().await;
                    f(Some(candidate)).await;
                }
            }

            RTCIceGatherer::finish(&state, &closed, &finished, &handlers, &complete).await;
        });

        Ok(())
    }

    async fn finish(
        state: &AtomicU8,
        closed: &AtomicBool,
        finished: &AtomicBool,
        handlers: &GathererHandlers,
        complete: &Notify,
    ) {
        if closed.load(Ordering::SeqCst) {
            return;
        }

        state.store(RTCIceGatheringState::Complete as u8, Ordering::SeqCst);
        log::debug!("ice gathering complete");

        RTCIceGatherer::do_state_change(handlers, RTCIceGatheringState::Complete).await;
        if let Some(handler) = &*handlers.on_gathering_complete.load() {
            let mut f = handler.lock().await;
            f().await;
        }
        if let Some(handler) = &*handlers.on_local_candidate.load() {
            let mut f = handler.lock().await;
            f(None).await;
        }

        finished.store(true, Ordering::SeqCst);
        complete.notify_waiters();
    }

    async fn do_state_change(handlers: &GathererHandlers, state: RTCIceGatheringState) {
        if let Some(handler) = &*handlers.on_state_change.load() {
            let mut f = handler.lock().await;
            f(state).await;
        }
    }

    /// close stops delivering candidates. No completion is reported after it.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.complete.notify_waiters();
    }

    /// get_local_parameters returns the ICE parameters of the transport.
    pub fn get_local_parameters(&self) -> RTCIceParameters {
        self.transport.local_parameters()
    }

    /// get_local_candidates returns the candidates gathered so far.
    pub async fn get_local_candidates(&self) -> Vec<RTCIceCandidate> {
        let candidates = self.candidates.lock().await;
        candidates.clone()
    }

    /// gathering_complete waits until gathering completed and every
    /// completion handler ran, or the gatherer is closed.
    pub async fn gathering_complete(&self) {
        loop {
            let notified = self.complete.notified();
            if self.finished.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst)
            {
                return;
            }
            notified.await;
        }
    }

    /// on_local_candidate sets an event handler which fires when a new local ICE candidate is available
    /// Take note that the handler is gonna be called with a None when gathering is finished.
    pub fn on_local_candidate(&self, f: OnLocalCandidateHdlrFn) {
        self.handlers
            .on_local_candidate
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_state_change sets an event handler which fires any time the gathering state changes
    pub fn on_state_change(&self, f: OnIceGatheringStateChangeHdlrFn) {
        self.handlers
            .on_state_change
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_gathering_complete sets an event handler which fires once, when gathering finishes
    pub fn on_gathering_complete(&self, f: OnGatheringCompleteHdlrFn) {
        self.handlers
            .on_gathering_complete
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// state indicates the current state of the ICE gatherer.
    pub fn state(&self) -> RTCIceGatheringState {
        self.state.load(Ordering::SeqCst).into()
    }
}
