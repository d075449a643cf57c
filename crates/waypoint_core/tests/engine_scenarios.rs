use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use waypoint_core::remote::poller::PollOutcome;
use waypoint_core::remote::wire::{
    AnalyzeResponse, DispatchRequest, HeatmapResponse, JourneysResponse, StartJourneyRequest,
};
use waypoint_core::repo::session_repo::MemorySessionStore;
use waypoint_core::sim::TICK_PERIOD;
use waypoint_core::{
    BackendError, BackendResult, BackendSync, Entity, EntityId, EntityOrigin, EntityStatus, Identity,
    GridPosition, JourneyId, JourneyStatus, ResilientSessionStore, Role, Session, SessionStore,
    SimulationGenerator, SqliteSessionStore, SyncedAction, TrackingBackend, TrackingEngine,
};

#[derive(Default)]
struct FakeBackend {
    /// `None` makes `GET /journeys` fail.
    journeys: Mutex<Option<Value>>,
    heatmap: Mutex<Option<Value>>,
    fail_notifications: AtomicBool,
    poll_gate: Mutex<Option<Arc<Notify>>>,
    notify_gate: Mutex<Option<Arc<Notify>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    fn with_journeys(journeys: Value) -> Arc<Self> {
        let backend = Self::default();
        *backend.journeys.lock().unwrap() = Some(json!({ "journeys": journeys }));
        Arc::new(backend)
    }

    fn set_journeys(&self, journeys: Option<Value>) {
        *self.journeys.lock().unwrap() = journeys.map(|value| json!({ "journeys": value }));
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    async fn pass_notify_gate(&self) {
        let gate = self.notify_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    fn notification_result(&self, path: &str) -> BackendResult<()> {
        if self.fail_notifications.load(Ordering::SeqCst) {
            Err(BackendError::Status {
                status: 503,
                path: path.to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TrackingBackend for FakeBackend {
    async fn health(&self) -> BackendResult<Value> {
        Ok(json!({ "status": "ok" }))
    }

    async fn heatmap(&self) -> BackendResult<HeatmapResponse> {
        let body = self.heatmap.lock().unwrap().clone();
        match body {
            Some(body) => Ok(serde_json::from_value(body).unwrap()),
            None => Err(BackendError::Transport("connection refused".to_string())),
        }
    }

    async fn list_journeys(&self) -> BackendResult<JourneysResponse> {
        let gate = self.poll_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let body = self.journeys.lock().unwrap().clone();
        match body {
            Some(body) => Ok(serde_json::from_value(body).unwrap()),
            None => Err(BackendError::Transport("connection refused".to_string())),
        }
    }

    async fn start_journey(
        &self,
        journey_id: &str,
        request: &StartJourneyRequest,
    ) -> BackendResult<()> {
        self.pass_notify_gate().await;
        self.record(format!("start {journey_id} {}", request.user_id));
        self.notification_result("/journey/start")
    }

    async fn dispatch_panic(&self, request: &DispatchRequest) -> BackendResult<Value> {
        self.record(format!(
            "dispatch {} {} {},{}",
            request.journey_id, request.user_id, request.location.lat, request.location.lng
        ));
        self.notification_result("/alert/dispatch")
            .map(|_| json!({ "status": "dispatched" }))
    }

    async fn cancel_alert(&self, journey_id: &str) -> BackendResult<()> {
        self.record(format!("cancel {journey_id}"));
        self.notification_result("/alert/cancel")
    }

    async fn end_journey(&self, journey_id: &str) -> BackendResult<()> {
        self.record(format!("end {journey_id}"));
        self.notification_result("/journey/end")
    }

    async fn analyze_journey(&self, journey_id: &str) -> BackendResult<AnalyzeResponse> {
        Ok(serde_json::from_value(json!({
            "status": "success",
            "data": { "journey_id": journey_id, "risk_level": 3, "factors": ["Low lighting"] }
        }))
        .unwrap())
    }
}

fn engine_with(backend: Arc<FakeBackend>) -> TrackingEngine {
    TrackingEngine::new(
        backend,
        ResilientSessionStore::memory_only(),
        SimulationGenerator::with_default_population(),
        Handle::current(),
    )
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn full_journey_cycle_updates_view_and_notifies_backend() {
    let backend = FakeBackend::with_journeys(json!([]));
    let engine = engine_with(backend.clone());
    engine.login(Role::Citizen);

    assert!(engine.start_journey());
    let view = engine.snapshot();
    assert_eq!(view.journey.status, JourneyStatus::Active);
    let own = view.self_entity().expect("self entity after start").clone();
    assert_eq!(own.status, EntityStatus::Active);
    assert_eq!(own.name, "Me (Citizen)");
    assert_eq!((own.position.x, own.position.y), (50.0, 90.0));
    let journey_id = view.journey.journey_id.clone().expect("journey id");

    assert!(engine.trigger_panic());
    let view = engine.snapshot();
    assert_eq!(view.journey.status, JourneyStatus::Critical);
    let ordered = view.display_order();
    assert!(ordered[0].status.is_critical());
    assert!(ordered
        .iter()
        .take_while(|entity| entity.status.is_critical())
        .any(|entity| entity.origin == EntityOrigin::SelfJourney));

    assert!(engine.cancel_panic());
    assert_eq!(engine.snapshot().journey.status, JourneyStatus::Active);

    assert!(engine.end_journey());
    let view = engine.snapshot();
    assert_eq!(view.journey.status, JourneyStatus::Idle);
    assert!(view.self_entity().is_none());

    settle().await;
    assert_eq!(
        backend.calls(),
        vec![
            format!("start {journey_id} Citizen User"),
            format!("dispatch {journey_id} Citizen User 50,90"),
            format!("cancel {journey_id}"),
            format!("end {journey_id}"),
        ]
    );
    assert_eq!(
        engine.snapshot().journey.backend_sync,
        BackendSync::Confirmed(SyncedAction::End)
    );
}

#[tokio::test]
async fn self_journey_leads_the_display_order_while_critical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.sqlite3");
    let calm_decoys = vec![
        Entity::new(
            "1",
            "Thabo M.",
            EntityStatus::Safe,
            GridPosition::new(20.0, 30.0),
            EntityOrigin::Decoy,
        ),
        Entity::new(
            "2",
            "Sarah L.",
            EntityStatus::Active,
            GridPosition::new(80.0, 15.0),
            EntityOrigin::Decoy,
        ),
    ];
    let engine = TrackingEngine::new(
        FakeBackend::with_journeys(json!([])),
        ResilientSessionStore::open(&path),
        SimulationGenerator::new(calm_decoys),
        Handle::current(),
    );
    engine.login(Role::Citizen);
    assert!(engine.start_journey());
    assert!(engine.trigger_panic());

    let view = engine.snapshot();
    let ordered = view.display_order();
    assert_eq!(ordered[0].origin, EntityOrigin::SelfJourney);
    assert_eq!(ordered[0].status, EntityStatus::Critical);
    assert_eq!(
        view.entities
            .iter()
            .filter(|entity| entity.origin == EntityOrigin::SelfJourney)
            .count(),
        1
    );

    assert!(engine.cancel_panic());
    let view = engine.snapshot();
    assert_eq!(view.journey.status, JourneyStatus::Active);
    assert_eq!(
        view.self_entity().map(|entity| entity.status),
        Some(EntityStatus::Active)
    );

    assert!(engine.end_journey());
    let view = engine.snapshot();
    assert!(view.self_entity().is_none());
    assert_eq!(view.entities.len(), 2);
    assert_eq!(SqliteSessionStore::open(&path).unwrap().load().unwrap(), None);
    settle().await;
}

#[tokio::test]
async fn ignored_actions_do_not_reach_the_backend() {
    let backend = FakeBackend::with_journeys(json!([]));
    let engine = engine_with(backend.clone());

    assert!(!engine.trigger_panic());
    assert!(!engine.cancel_panic());
    assert!(!engine.end_journey());

    assert!(engine.start_journey());
    assert!(!engine.start_journey());
    assert!(engine.trigger_panic());
    assert!(!engine.trigger_panic());

    settle().await;
    assert_eq!(backend.calls().len(), 2);
    assert!(backend.calls()[0].ends_with(" anon"));
}

#[tokio::test]
async fn remote_journeys_are_merged_after_a_poll() {
    let backend = FakeBackend::with_journeys(json!([{ "id": "7", "x": 10, "y": 10 }]));
    let engine = engine_with(backend);

    let outcome = engine.tick_once().await;
    assert_eq!(outcome, PollOutcome::Updated { count: 1 });

    let view = engine.snapshot();
    let remotes = view
        .entities
        .iter()
        .filter(|entity| entity.origin == EntityOrigin::Remote)
        .collect::<Vec<_>>();
    assert_eq!(remotes.len(), 1);
    assert_eq!(remotes[0].id, EntityId::from("7"));
    assert_eq!((remotes[0].position.x, remotes[0].position.y), (10.0, 10.0));
    assert_eq!(view.entities.len(), 4);
}

#[tokio::test]
async fn colliding_remote_ids_never_duplicate_entities() {
    let backend = FakeBackend::with_journeys(json!([
        { "id": 1, "name": "Remote one", "status": "active" },
        { "id": "7", "name": "First seven" },
        { "id": 7.0, "name": "Second seven" }
    ]));
    let engine = engine_with(backend);

    assert_eq!(engine.poll_once().await, PollOutcome::Updated { count: 2 });
    let view = engine.snapshot();
    let tagged = view
        .entities
        .iter()
        .map(|entity| format!("{}:{}", entity.id, entity.origin.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(tagged, vec!["2:decoy", "3:decoy", "1:remote", "7:remote"]);
    assert_eq!(
        view.entity(&EntityId::from("7"))
            .map(|entity| entity.name.as_str()),
        Some("First seven")
    );
}

#[tokio::test]
async fn self_journey_wins_over_its_remote_echo() {
    let backend = FakeBackend::with_journeys(json!([]));
    let engine = engine_with(backend.clone());
    engine.start_journey();
    let journey_id = engine.snapshot().journey.journey_id.expect("journey id");

    backend.set_journeys(Some(json!([
        { "id": journey_id, "x": 5, "y": 5, "status": "active", "name": "Echo" }
    ])));
    engine.poll_once().await;

    let view = engine.snapshot();
    let matching = view
        .entities
        .iter()
        .filter(|entity| entity.id.as_str() == journey_id)
        .collect::<Vec<_>>();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].origin, EntityOrigin::SelfJourney);
    assert_eq!((matching[0].position.x, matching[0].position.y), (50.0, 90.0));
}

#[tokio::test]
async fn failed_poll_keeps_previous_remote_set() {
    let backend = FakeBackend::with_journeys(json!([{ "id": 101, "status": "panic_dispatched" }]));
    let engine = engine_with(backend.clone());
    engine.poll_once().await;
    let before = engine.snapshot();

    backend.set_journeys(None);
    assert_eq!(engine.poll_once().await, PollOutcome::Retained);

    let after = engine.snapshot();
    assert_eq!(after.revision, before.revision);
    let remote = after
        .entities
        .iter()
        .find(|entity| entity.origin == EntityOrigin::Remote)
        .expect("remote retained");
    assert_eq!(remote.status, EntityStatus::Critical);
}

#[tokio::test]
async fn backend_failure_marks_sync_failed_without_rollback() {
    let backend = FakeBackend::with_journeys(json!([]));
    backend.fail_notifications.store(true, Ordering::SeqCst);
    let engine = engine_with(backend);

    engine.start_journey();
    engine.trigger_panic();
    assert_eq!(
        engine.snapshot().journey.backend_sync,
        BackendSync::Pending(SyncedAction::TriggerPanic)
    );

    settle().await;
    let view = engine.snapshot();
    assert_eq!(view.journey.status, JourneyStatus::Critical);
    assert_eq!(
        view.journey.backend_sync,
        BackendSync::Failed(SyncedAction::TriggerPanic)
    );
    assert!(view.journey.backend_sync.is_stale());
}

#[tokio::test]
async fn poll_completing_after_logout_is_discarded() {
    let backend = FakeBackend::with_journeys(json!([{ "id": "late", "x": 1, "y": 1 }]));
    let gate = Arc::new(Notify::new());
    *backend.poll_gate.lock().unwrap() = Some(gate.clone());
    let engine = engine_with(backend);
    engine.login(Role::Operator);
    engine.start_journey();

    let (outcome, ()) = tokio::join!(engine.poll_once(), async {
        engine.logout();
        gate.notify_one();
    });

    assert_eq!(outcome, PollOutcome::Superseded);
    let view = engine.snapshot();
    assert!(view.identity.is_none());
    assert_eq!(view.journey.status, JourneyStatus::Idle);
    assert!(view
        .entities
        .iter()
        .all(|entity| entity.origin == EntityOrigin::Decoy));
}

#[tokio::test]
async fn teardown_abandons_an_unconfirmed_backend_call() {
    let backend = FakeBackend::with_journeys(json!([]));
    let gate = Arc::new(Notify::new());
    *backend.notify_gate.lock().unwrap() = Some(gate.clone());
    let engine = engine_with(backend.clone());

    assert!(engine.start_journey());
    settle().await;
    assert_eq!(
        engine.snapshot().journey.backend_sync,
        BackendSync::Pending(SyncedAction::Start)
    );

    engine.teardown();
    let view = engine.snapshot();
    assert_eq!(view.journey.backend_sync, BackendSync::Idle);
    assert!(!view.journey.backend_sync.is_stale());
    assert_eq!(view.journey.status, JourneyStatus::Active);

    gate.notify_one();
    settle().await;
    assert_eq!(engine.snapshot().journey.backend_sync, BackendSync::Idle);
    assert!(backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn ticker_steps_until_cancelled() {
    let backend = FakeBackend::with_journeys(json!([]));
    let engine = engine_with(backend);
    let ticker = engine.start_ticker();
    settle().await;
    let start = engine.snapshot().revision;

    tokio::time::advance(TICK_PERIOD).await;
    settle().await;
    let after_one = engine.snapshot().revision;
    assert!(after_one > start);

    ticker.cancel();
    settle().await;
    tokio::time::advance(TICK_PERIOD * 3).await;
    settle().await;
    assert_eq!(engine.snapshot().revision, after_one);
}

#[tokio::test(start_paused = true)]
async fn logout_stops_the_ticker() {
    let backend = FakeBackend::with_journeys(json!([]));
    let engine = engine_with(backend);
    engine.login(Role::Citizen);
    let ticker = engine.start_ticker();

    engine.logout();
    settle().await;
    assert!(ticker.is_finished());

    let revision = engine.snapshot().revision;
    tokio::time::advance(TICK_PERIOD * 2).await;
    settle().await;
    assert_eq!(engine.snapshot().revision, revision);
}

#[tokio::test]
async fn engine_restores_a_persisted_critical_journey() {
    let mut store = SqliteSessionStore::open_in_memory().unwrap();
    store
        .save(&Session::new(
            Some(JourneyId::new("1718000000000-deadbeef")),
            JourneyStatus::Critical,
            Some(Identity::for_role(Role::Citizen)),
        ))
        .unwrap();

    let engine = TrackingEngine::new(
        FakeBackend::with_journeys(json!([])),
        ResilientSessionStore::new(Box::new(store)),
        SimulationGenerator::with_default_population(),
        Handle::current(),
    );

    let view = engine.snapshot();
    assert_eq!(view.journey.status, JourneyStatus::Critical);
    assert_eq!(
        view.identity.as_ref().map(|identity| identity.role),
        Some(Role::Citizen)
    );
    let own = view.self_entity().expect("restored self entity");
    assert_eq!(own.id, EntityId::from("1718000000000-deadbeef"));
    assert!(own.status.is_critical());
}

#[tokio::test]
async fn ending_a_journey_clears_the_persisted_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.sqlite3");
    let backend = FakeBackend::with_journeys(json!([]));

    let engine = TrackingEngine::new(
        backend.clone(),
        ResilientSessionStore::open(&path),
        SimulationGenerator::with_default_population(),
        Handle::current(),
    );
    engine.start_journey();
    assert!(SqliteSessionStore::open(&path).unwrap().load().unwrap().is_some());

    engine.end_journey();
    assert_eq!(SqliteSessionStore::open(&path).unwrap().load().unwrap(), None);
    settle().await;
}

#[tokio::test]
async fn heatmap_refresh_replaces_points_and_keeps_them_on_failure() {
    let backend = FakeBackend::with_journeys(json!([]));
    *backend.heatmap.lock().unwrap() = Some(json!({
        "points": [{ "lat": -26.5, "lng": 27.5, "weight": 0.8 }, { "lat": -26.0, "lng": 28.0, "weight": 0.2 }]
    }));
    let engine = engine_with(backend.clone());

    assert!(engine.refresh_heatmap().await);
    let points = engine.snapshot().heatmap;
    assert_eq!(points.len(), 2);
    assert_eq!((points[0].position.x, points[0].position.y), (0.0, 100.0));
    assert_eq!((points[1].position.x, points[1].position.y), (50.0, 50.0));

    *backend.heatmap.lock().unwrap() = None;
    assert!(!engine.refresh_heatmap().await);
    assert_eq!(engine.snapshot().heatmap.len(), 2);
}

#[tokio::test]
async fn health_and_risk_analysis_are_reflected_in_the_view() {
    let backend = FakeBackend::with_journeys(json!([]));
    let engine = engine_with(backend);

    assert!(engine.check_health().await);
    assert_eq!(engine.snapshot().backend_online, Some(true));

    assert!(engine.request_risk_analysis().await.is_none());
    engine.start_journey();
    let analysis = engine
        .request_risk_analysis()
        .await
        .expect("analysis for active journey");
    assert_eq!(analysis.risk_level, 3);
    assert_eq!(engine.snapshot().risk, Some(analysis));

    engine.end_journey();
    assert!(engine.snapshot().risk.is_none());
}

#[test]
fn memory_store_can_seed_an_engine() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let mut store = MemorySessionStore::new();
    store
        .save(&Session::new(
            Some(JourneyId::new("j-9")),
            JourneyStatus::Active,
            None,
        ))
        .unwrap();

    let engine = TrackingEngine::new(
        FakeBackend::with_journeys(json!([])),
        ResilientSessionStore::new(Box::new(store)),
        SimulationGenerator::with_default_population(),
        runtime.handle().clone(),
    );
    assert_eq!(engine.journey_status(), JourneyStatus::Active);
    assert!(engine.has_durable_session_store());
}
