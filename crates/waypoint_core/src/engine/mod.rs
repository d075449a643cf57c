//! Tracking engine: the composition root of the synchronization core.
//!
//! # Responsibility
//! - Own decoy, remote and self state plus the merged view.
//! - Drive the shared tick (simulation step + remote poll).
//! - Route user actions through the alert dispatcher.
//! - Publish read-only `TrackingView` snapshots to subscribers.
//!
//! # Invariants
//! - All state sits behind one mutex that is never held across an await.
//! - Every merge and publish happens under that mutex, so consumers never
//!   observe a partial update.
//! - Async completions carry the epoch they were issued in; completions from
//!   a torn-down session are dropped.
//! - Self authority holds from the moment a start is applied locally.
//! - Lock order is state, then scope. Epoch bump and scope renewal happen in
//!   one state critical section, so no task is spawned between them.

mod scope;
mod view;

pub use scope::TickerHandle;
pub use view::{JourneyView, TrackingView};

use crate::config::CoreConfig;
use crate::lifecycle::{JourneyAction, JourneyLifecycle, SELF_POSITION};
use crate::model::heatmap::{HeatmapPoint, RiskAnalysis, DEFAULT_BOUNDS};
use crate::model::session::{Identity, JourneyStatus, Role};
use crate::reconcile::merge;
use crate::remote::client::{BackendResult, HttpTrackingBackend, TrackingBackend};
use crate::remote::poller::{PollOutcome, PollTicket, RemoteSyncPoller};
use crate::remote::wire::{project_heatmap, JourneysResponse};
use crate::repo::resilient_store::ResilientSessionStore;
use crate::service::dispatcher::{AlertDispatcher, DispatchTicket};
use crate::sim::{SimulationGenerator, TICK_PERIOD};
use log::{debug, info, warn};
use scope::{wait_for_shutdown, TaskScope};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

struct TrackingState {
    epoch: u64,
    revision: u64,
    simulation: SimulationGenerator,
    poller: RemoteSyncPoller,
    lifecycle: JourneyLifecycle,
    dispatcher: AlertDispatcher,
    identity: Option<Identity>,
    store: ResilientSessionStore,
    heatmap: Vec<HeatmapPoint>,
    backend_online: Option<bool>,
    risk: Option<RiskAnalysis>,
}

impl TrackingState {
    fn build_view(&mut self) -> TrackingView {
        self.revision += 1;
        let own = self.lifecycle.self_entity(self.identity.as_ref());
        TrackingView {
            revision: self.revision,
            entities: merge(
                self.simulation.decoys(),
                self.poller.remotes(),
                own.as_ref(),
            ),
            identity: self.identity.clone(),
            journey: JourneyView {
                status: self.lifecycle.status(),
                journey_id: self
                    .lifecycle
                    .journey_id()
                    .map(|id| id.as_str().to_string()),
                backend_sync: self.dispatcher.sync(),
            },
            heatmap: self.heatmap.clone(),
            backend_online: self.backend_online,
            risk: self.risk.clone(),
        }
    }
}

struct EngineInner {
    state: Mutex<TrackingState>,
    scope: Mutex<TaskScope>,
    view_tx: watch::Sender<TrackingView>,
    backend: Arc<dyn TrackingBackend>,
    runtime: Handle,
}

impl EngineInner {
    fn lock_state(&self) -> MutexGuard<'_, TrackingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_scope(&self) -> MutexGuard<'_, TaskScope> {
        self.scope.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &mut TrackingState) {
        let view = state.build_view();
        self.view_tx.send_replace(view);
    }
}

/// Journey state synchronization engine.
///
/// Cheap to clone; clones share one state.
#[derive(Clone)]
pub struct TrackingEngine {
    inner: Arc<EngineInner>,
}

impl TrackingEngine {
    /// Builds the engine and restores the persisted session.
    ///
    /// `store.load()` is called exactly once, here. Spawned work runs on
    /// `runtime`.
    pub fn new(
        backend: Arc<dyn TrackingBackend>,
        mut store: ResilientSessionStore,
        simulation: SimulationGenerator,
        runtime: Handle,
    ) -> Self {
        let restored = store.load();
        let (lifecycle, identity) = match restored.as_ref() {
            Some(session) => (JourneyLifecycle::restore(session), session.identity.clone()),
            None => (JourneyLifecycle::idle(), None),
        };
        info!(
            "event=engine_start module=engine status=ok restored={} journey_status={} durable_store={}",
            restored.is_some(),
            lifecycle.status().as_str(),
            store.is_durable()
        );

        let mut state = TrackingState {
            epoch: 0,
            revision: 0,
            simulation,
            poller: RemoteSyncPoller::new(),
            lifecycle,
            dispatcher: AlertDispatcher::new(),
            identity,
            store,
            heatmap: Vec::new(),
            backend_online: None,
            risk: None,
        };
        let (view_tx, _) = watch::channel(state.build_view());

        Self {
            inner: Arc::new(EngineInner {
                state: Mutex::new(state),
                scope: Mutex::new(TaskScope::new()),
                view_tx,
                backend,
                runtime,
            }),
        }
    }

    /// Builds the HTTP backend and SQLite session store from `config`.
    pub fn from_config(config: &CoreConfig, runtime: Handle) -> BackendResult<Self> {
        let backend = HttpTrackingBackend::new(config.api_base_url.clone(), config.http_timeout)?;
        let store = ResilientSessionStore::open(&config.session_db_path);
        Ok(Self::new(
            Arc::new(backend),
            store,
            SimulationGenerator::with_default_population(),
            runtime,
        ))
    }

    /// Current view (copy-on-read).
    pub fn snapshot(&self) -> TrackingView {
        self.inner.view_tx.borrow().clone()
    }

    /// Receiver notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<TrackingView> {
        self.inner.view_tx.subscribe()
    }

    pub fn journey_status(&self) -> JourneyStatus {
        self.inner.lock_state().lifecycle.status()
    }

    pub fn has_durable_session_store(&self) -> bool {
        self.inner.lock_state().store.is_durable()
    }

    pub fn login(&self, role: Role) {
        self.login_as(Identity::for_role(role));
    }

    /// Sets the identity; a restored journey is re-saved with it.
    pub fn login_as(&self, identity: Identity) {
        let mut guard = self.inner.lock_state();
        let state = &mut *guard;
        info!(
            "event=login module=engine status=ok role={}",
            identity.role.as_str()
        );
        state.identity = Some(identity);
        if state.lifecycle.has_journey() {
            let session = state.lifecycle.to_session(state.identity.as_ref());
            state.store.save(&session);
        }
        self.inner.publish(state);
    }

    /// Ends the login session.
    ///
    /// # Side effects
    /// - Drops the local journey without notifying the backend.
    /// - Clears the session store.
    /// - Stops the ticker and discards every in-flight request.
    pub fn logout(&self) {
        let mut guard = self.inner.lock_state();
        let state = &mut *guard;
        state.epoch += 1;
        self.inner.lock_scope().renew();
        state.identity = None;
        let dropped = state.lifecycle.reset();
        state.dispatcher.reset();
        state.poller.reset();
        state.risk = None;
        state.store.clear();
        info!(
            "event=logout module=engine status=ok dropped_journey={}",
            dropped.is_some()
        );
        self.inner.publish(state);
    }

    /// Stops the ticker and discards in-flight requests, keeping state.
    ///
    /// An unconfirmed backend call is abandoned, so `backend_sync` returns
    /// to idle instead of waiting for a completion that is dropped.
    pub fn teardown(&self) {
        let mut guard = self.inner.lock_state();
        let state = &mut *guard;
        state.epoch += 1;
        self.inner.lock_scope().renew();
        let abandoned = state.dispatcher.reset();
        info!("event=teardown module=engine status=ok abandoned_call={abandoned}");
        self.inner.publish(state);
    }

    /// Starts a journey. Returns `false` when one already exists.
    pub fn start_journey(&self) -> bool {
        self.act(JourneyAction::Start)
    }

    /// Raises a panic alert. Idempotent while critical; no-op without journey.
    pub fn trigger_panic(&self) -> bool {
        self.act(JourneyAction::TriggerPanic)
    }

    /// Cancels a raised panic, optimistically returning to active.
    pub fn cancel_panic(&self) -> bool {
        self.act(JourneyAction::CancelPanic)
    }

    /// Ends the journey and clears the persisted session.
    pub fn end_journey(&self) -> bool {
        self.act(JourneyAction::End)
    }

    fn act(&self, action: JourneyAction) -> bool {
        let (prepared, epoch) = {
            let mut guard = self.inner.lock_state();
            let state = &mut *guard;
            let prepared = state.dispatcher.prepare(
                action,
                &mut state.lifecycle,
                &mut state.store,
                state.identity.as_ref(),
                SELF_POSITION,
            );
            if let Some(prepared) = prepared.as_ref() {
                if prepared.transition.to == JourneyStatus::Idle {
                    state.risk = None;
                }
                self.inner.publish(state);
            }
            (prepared, state.epoch)
        };

        let Some(prepared) = prepared else {
            return false;
        };
        let engine = self.clone();
        self.spawn_scoped(async move {
            let result = prepared.call.send(engine.inner.backend.as_ref()).await;
            engine.finish_dispatch(epoch, prepared.ticket, result);
        });
        true
    }

    fn finish_dispatch(&self, epoch: u64, ticket: DispatchTicket, result: BackendResult<()>) {
        let mut guard = self.inner.lock_state();
        if guard.epoch != epoch {
            debug!(
                "event=backend_notify module=engine status=skip reason=stale_epoch action={} ok={}",
                ticket.action().as_str(),
                result.is_ok()
            );
            return;
        }
        if guard.dispatcher.complete(ticket, &result) {
            self.inner.publish(&mut guard);
        }
    }

    /// Moves every decoy one random-walk step and republishes.
    pub fn advance_simulation(&self) {
        let mut guard = self.inner.lock_state();
        guard.simulation.step();
        self.inner.publish(&mut guard);
    }

    fn begin_poll(&self) -> (u64, PollTicket) {
        let mut guard = self.inner.lock_state();
        let ticket = guard.poller.begin();
        (guard.epoch, ticket)
    }

    fn finish_poll(
        &self,
        epoch: u64,
        ticket: PollTicket,
        result: BackendResult<JourneysResponse>,
    ) -> PollOutcome {
        let mut guard = self.inner.lock_state();
        if guard.epoch != epoch {
            debug!(
                "event=remote_poll module=engine status=skip reason=stale_epoch seq={}",
                ticket.sequence()
            );
            return PollOutcome::Superseded;
        }
        let outcome = guard.poller.complete(ticket, result);
        if outcome.changed_view() {
            self.inner.publish(&mut guard);
        }
        outcome
    }

    /// Fetches remote journeys and applies the result before returning.
    pub async fn poll_once(&self) -> PollOutcome {
        let (epoch, ticket) = self.begin_poll();
        let result = self.inner.backend.list_journeys().await;
        self.finish_poll(epoch, ticket, result)
    }

    /// Issues a remote poll in the background.
    pub fn spawn_poll(&self) {
        let (epoch, ticket) = self.begin_poll();
        let engine = self.clone();
        self.spawn_scoped(async move {
            let result = engine.inner.backend.list_journeys().await;
            engine.finish_poll(epoch, ticket, result);
        });
    }

    /// One complete tick: simulation step, then an awaited poll.
    pub async fn tick_once(&self) -> PollOutcome {
        self.advance_simulation();
        self.poll_once().await
    }

    /// Starts the shared 2000 ms tick loop.
    ///
    /// The first tick fires one period after the call. Each tick steps the
    /// simulation and issues a background poll, so a slow fetch never delays
    /// the next step. The loop stops when the handle is cancelled or dropped,
    /// or when the session is torn down.
    pub fn start_ticker(&self) -> TickerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let mut scope_rx = self.inner.lock_scope().subscribe();
        let engine = self.clone();
        let task = self.inner.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                "event=ticker_start module=engine status=ok period_ms={}",
                TICK_PERIOD.as_millis()
            );
            loop {
                tokio::select! {
                    _ = wait_for_shutdown(&mut stop_rx) => break,
                    _ = wait_for_shutdown(&mut scope_rx) => break,
                    _ = ticker.tick() => {
                        engine.advance_simulation();
                        engine.spawn_poll();
                    }
                }
            }
            info!("event=ticker_stop module=engine status=ok");
        });
        TickerHandle::new(stop_tx, task)
    }

    fn spawn_scoped<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = self.inner.lock_scope().subscribe();
        self.inner.runtime.spawn(async move {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => {}
                _ = task => {}
            }
        });
    }

    fn current_epoch(&self) -> u64 {
        self.inner.lock_state().epoch
    }

    /// Checks `GET /` and records the result in the view.
    pub async fn check_health(&self) -> bool {
        let epoch = self.current_epoch();
        let online = match self.inner.backend.health().await {
            Ok(_) => true,
            Err(err) => {
                warn!(
                    "event=health_check module=engine status=error error_code={} error={err}",
                    err.code()
                );
                false
            }
        };
        let mut guard = self.inner.lock_state();
        if guard.epoch == epoch {
            guard.backend_online = Some(online);
            self.inner.publish(&mut guard);
        }
        online
    }

    /// Replaces the heatmap wholesale; keeps the previous one on failure.
    pub async fn refresh_heatmap(&self) -> bool {
        let epoch = self.current_epoch();
        let response = match self.inner.backend.heatmap().await {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    "event=heatmap_refresh module=engine status=error error_code={} error={err}",
                    err.code()
                );
                return false;
            }
        };
        let points = project_heatmap(&response, &DEFAULT_BOUNDS);
        let mut guard = self.inner.lock_state();
        if guard.epoch != epoch {
            return false;
        }
        debug!(
            "event=heatmap_refresh module=engine status=ok count={}",
            points.len()
        );
        guard.heatmap = points;
        self.inner.publish(&mut guard);
        true
    }

    /// Requests a backend risk analysis for the active journey.
    ///
    /// Returns `None` without a journey, on failure, or when the journey
    /// changed while the request was in flight.
    pub async fn request_risk_analysis(&self) -> Option<RiskAnalysis> {
        let (epoch, journey_id) = {
            let guard = self.inner.lock_state();
            (guard.epoch, guard.lifecycle.journey_id().cloned())
        };
        let journey_id = journey_id?;

        let analysis = match self.inner.backend.analyze_journey(journey_id.as_str()).await {
            Ok(response) => response.data,
            Err(err) => {
                warn!(
                    "event=risk_analysis module=engine status=error error_code={} error={err}",
                    err.code()
                );
                return None;
            }
        };

        let mut guard = self.inner.lock_state();
        if guard.epoch != epoch || guard.lifecycle.journey_id() != Some(&journey_id) {
            return None;
        }
        guard.risk = Some(analysis.clone());
        self.inner.publish(&mut guard);
        Some(analysis)
    }
}
