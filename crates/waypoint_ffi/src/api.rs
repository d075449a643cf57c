//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose login, journey actions and view snapshots to Dart via FRB.
//! - Own the process-wide tracking engine and its async runtime.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Engine failures are reported through response envelopes, never thrown.
//! - At most one tick loop runs per process.

use log::{info, warn};
use std::sync::{Mutex, OnceLock, PoisonError};
use tokio::runtime::{Builder, Runtime};
use waypoint_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    BackendSync, CoreConfig, Entity, Role, SyncedAction, TickerHandle, TrackingEngine,
    TrackingView,
};

static BRIDGE: OnceLock<Result<Bridge, String>> = OnceLock::new();

struct Bridge {
    runtime: Runtime,
    engine: TrackingEngine,
    ticker: Mutex<Option<TickerHandle>>,
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Idempotent for the same `level + log_dir`.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Generic result envelope for session-level commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub ok: bool,
    /// Human-readable message for diagnostics/UI.
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Result of one journey action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JourneyActionResponse {
    /// `false` when the action did not apply in the current state.
    pub applied: bool,
    /// Journey status after the call (`idle|active|critical`).
    pub status: String,
    pub journey_id: Option<String>,
    pub message: String,
}

/// One map/list entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityItem {
    pub id: String,
    pub name: String,
    /// `safe|active|critical`.
    pub status: String,
    /// `decoy|remote|self`.
    pub origin: String,
    pub x: f64,
    pub y: f64,
    pub alert_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapItem {
    pub x: f64,
    pub y: f64,
    pub weight: f64,
}

/// Full view snapshot. `entities` are already in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSnapshot {
    pub revision: u64,
    /// `citizen|operator`, `None` while logged out.
    pub role: Option<String>,
    pub display_name: Option<String>,
    pub journey_status: String,
    pub journey_id: Option<String>,
    /// `idle`, or `<pending|confirmed|failed>:<action>`.
    pub backend_sync: String,
    pub backend_stale: bool,
    pub entities: Vec<EntityItem>,
    pub critical_count: u32,
    pub heatmap: Vec<HeatmapItem>,
    pub backend_online: Option<bool>,
    pub risk_level: Option<u8>,
    pub risk_factors: Vec<String>,
    /// Set when the engine could not be started.
    pub error: Option<String>,
}

/// Logs in with `role` (`citizen|operator`).
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Unknown roles are rejected without changing state.
#[flutter_rust_bridge::frb(sync)]
pub fn tracking_login(role: String) -> ActionResponse {
    let Some(parsed) = Role::parse(role.as_str()) else {
        return ActionResponse::failure(format!(
            "tracking_login failed: unknown role `{}`",
            role.trim()
        ));
    };
    match bridge() {
        Ok(bridge) => {
            bridge.engine.login(parsed);
            ActionResponse::success(format!("Logged in as {}.", parsed.default_display_name()))
        }
        Err(err) => ActionResponse::failure(format!("tracking_login failed: {err}")),
    }
}

/// Logs out, dropping the local journey and stopping the tick loop.
#[flutter_rust_bridge::frb(sync)]
pub fn tracking_logout() -> ActionResponse {
    match bridge() {
        Ok(bridge) => {
            drop(bridge.take_ticker());
            bridge.engine.logout();
            ActionResponse::success("Logged out.")
        }
        Err(err) => ActionResponse::failure(format!("tracking_logout failed: {err}")),
    }
}

/// Starts the shared tick loop. Calling it while running is a no-op.
#[flutter_rust_bridge::frb(sync)]
pub fn tracking_start_ticker() -> ActionResponse {
    let bridge = match bridge() {
        Ok(bridge) => bridge,
        Err(err) => {
            return ActionResponse::failure(format!("tracking_start_ticker failed: {err}"))
        }
    };
    let mut ticker = bridge.ticker.lock().unwrap_or_else(PoisonError::into_inner);
    if ticker.as_ref().is_some_and(|handle| !handle.is_finished()) {
        return ActionResponse::success("Ticker already running.");
    }
    *ticker = Some(bridge.engine.start_ticker());
    ActionResponse::success("Ticker started.")
}

#[flutter_rust_bridge::frb(sync)]
pub fn tracking_stop_ticker() -> ActionResponse {
    match bridge() {
        Ok(bridge) => match bridge.take_ticker() {
            Some(handle) => {
                handle.cancel();
                ActionResponse::success("Ticker stopped.")
            }
            None => ActionResponse::success("Ticker not running."),
        },
        Err(err) => ActionResponse::failure(format!("tracking_stop_ticker failed: {err}")),
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn journey_start() -> JourneyActionResponse {
    run_journey_action("journey_start", TrackingEngine::start_journey)
}

#[flutter_rust_bridge::frb(sync)]
pub fn journey_trigger_panic() -> JourneyActionResponse {
    run_journey_action("journey_trigger_panic", TrackingEngine::trigger_panic)
}

#[flutter_rust_bridge::frb(sync)]
pub fn journey_cancel_panic() -> JourneyActionResponse {
    run_journey_action("journey_cancel_panic", TrackingEngine::cancel_panic)
}

#[flutter_rust_bridge::frb(sync)]
pub fn journey_end() -> JourneyActionResponse {
    run_journey_action("journey_end", TrackingEngine::end_journey)
}

/// Returns the current view.
///
/// # FFI contract
/// - Sync call, non-blocking; reads the last published snapshot.
#[flutter_rust_bridge::frb(sync)]
pub fn tracking_snapshot() -> TrackingSnapshot {
    match bridge() {
        Ok(bridge) => to_snapshot(&bridge.engine.snapshot()),
        Err(err) => TrackingSnapshot {
            revision: 0,
            role: None,
            display_name: None,
            journey_status: "idle".to_string(),
            journey_id: None,
            backend_sync: "idle".to_string(),
            backend_stale: false,
            entities: Vec::new(),
            critical_count: 0,
            heatmap: Vec::new(),
            backend_online: None,
            risk_level: None,
            risk_factors: Vec::new(),
            error: Some(err.to_string()),
        },
    }
}

/// Checks backend health.
///
/// # FFI contract
/// - Sync call; blocks for at most the configured HTTP timeout.
#[flutter_rust_bridge::frb(sync)]
pub fn tracking_check_health() -> ActionResponse {
    match bridge() {
        Ok(bridge) => {
            if bridge.runtime.block_on(bridge.engine.check_health()) {
                ActionResponse::success("Backend online.")
            } else {
                ActionResponse::failure("Backend unreachable.")
            }
        }
        Err(err) => ActionResponse::failure(format!("tracking_check_health failed: {err}")),
    }
}

/// Refreshes the risk heatmap; the previous one stays on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn tracking_refresh_heatmap() -> ActionResponse {
    match bridge() {
        Ok(bridge) => {
            if bridge.runtime.block_on(bridge.engine.refresh_heatmap()) {
                ActionResponse::success("Heatmap updated.")
            } else {
                ActionResponse::failure("Heatmap unavailable; showing last known data.")
            }
        }
        Err(err) => ActionResponse::failure(format!("tracking_refresh_heatmap failed: {err}")),
    }
}

/// Requests a risk analysis for the current journey.
#[flutter_rust_bridge::frb(sync)]
pub fn journey_request_risk_analysis() -> ActionResponse {
    match bridge() {
        Ok(bridge) => match bridge.runtime.block_on(bridge.engine.request_risk_analysis()) {
            Some(analysis) => {
                ActionResponse::success(format!("Risk level {}.", analysis.risk_level))
            }
            None => ActionResponse::failure("Risk analysis unavailable."),
        },
        Err(err) => {
            ActionResponse::failure(format!("journey_request_risk_analysis failed: {err}"))
        }
    }
}

impl Bridge {
    fn start() -> Result<Self, String> {
        let config = CoreConfig::from_env().map_err(|err| format!("invalid config: {err}"))?;
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("waypoint-core")
            .enable_all()
            .build()
            .map_err(|err| format!("runtime start failed: {err}"))?;
        let engine = TrackingEngine::from_config(&config, runtime.handle().clone())
            .map_err(|err| format!("engine start failed: {err}"))?;
        info!(
            "event=ffi_bridge_start module=ffi status=ok api_url={}",
            config.api_base_url
        );
        Ok(Self {
            runtime,
            engine,
            ticker: Mutex::new(None),
        })
    }

    fn take_ticker(&self) -> Option<TickerHandle> {
        self.ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

fn bridge() -> Result<&'static Bridge, &'static str> {
    BRIDGE
        .get_or_init(|| {
            Bridge::start().map_err(|err| {
                warn!("event=ffi_bridge_start module=ffi status=error error={err}");
                err
            })
        })
        .as_ref()
        .map_err(String::as_str)
}

fn run_journey_action(
    name: &str,
    action: fn(&TrackingEngine) -> bool,
) -> JourneyActionResponse {
    let bridge = match bridge() {
        Ok(bridge) => bridge,
        Err(err) => {
            return JourneyActionResponse {
                applied: false,
                status: "idle".to_string(),
                journey_id: None,
                message: format!("{name} failed: {err}"),
            }
        }
    };

    let applied = action(&bridge.engine);
    let view = bridge.engine.snapshot();
    JourneyActionResponse {
        applied,
        status: view.journey.status.as_str().to_string(),
        journey_id: view.journey.journey_id.clone(),
        message: if applied {
            format!("Journey {}.", view.journey.status.as_str())
        } else {
            format!("Ignored while {}.", view.journey.status.as_str())
        },
    }
}

fn to_snapshot(view: &TrackingView) -> TrackingSnapshot {
    TrackingSnapshot {
        revision: view.revision,
        role: view
            .identity
            .as_ref()
            .map(|identity| identity.role.as_str().to_string()),
        display_name: view
            .identity
            .as_ref()
            .map(|identity| identity.display_name.clone()),
        journey_status: view.journey.status.as_str().to_string(),
        journey_id: view.journey.journey_id.clone(),
        backend_sync: sync_label(view.journey.backend_sync),
        backend_stale: view.journey.backend_sync.is_stale(),
        entities: view.display_order().iter().map(to_entity_item).collect(),
        critical_count: u32::try_from(view.critical_count()).unwrap_or(u32::MAX),
        heatmap: view
            .heatmap
            .iter()
            .map(|point| HeatmapItem {
                x: point.position.x,
                y: point.position.y,
                weight: point.weight,
            })
            .collect(),
        backend_online: view.backend_online,
        risk_level: view.risk.as_ref().map(|risk| risk.risk_level),
        risk_factors: view
            .risk
            .as_ref()
            .map(|risk| risk.factors.clone())
            .unwrap_or_default(),
        error: None,
    }
}

fn to_entity_item(entity: &Entity) -> EntityItem {
    EntityItem {
        id: entity.id.to_string(),
        name: entity.name.clone(),
        status: entity.status.as_str().to_string(),
        origin: entity.origin.as_str().to_string(),
        x: entity.position.x,
        y: entity.position.y,
        alert_type: entity
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.alert_type.clone()),
    }
}

fn sync_label(sync: BackendSync) -> String {
    let (state, action) = match sync {
        BackendSync::Idle => return "idle".to_string(),
        BackendSync::Pending(action) => ("pending", action),
        BackendSync::Confirmed(action) => ("confirmed", action),
        BackendSync::Failed(action) => ("failed", action),
    };
    let action = match action {
        SyncedAction::Start => "start",
        SyncedAction::TriggerPanic => "trigger_panic",
        SyncedAction::CancelPanic => "cancel_panic",
        SyncedAction::End => "end",
    };
    format!("{state}:{action}")
}

#[cfg(test)]
mod tests {
    use super::{
        core_version, init_logging, journey_cancel_panic, journey_end, journey_start,
        journey_trigger_panic, ping, sync_label, tracking_login, tracking_logout,
        tracking_snapshot, tracking_start_ticker, tracking_stop_ticker,
    };
    use waypoint_core::{BackendSync, SyncedAction};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "/tmp/waypoint-logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn login_rejects_unknown_role() {
        let response = tracking_login("admin".to_string());
        assert!(!response.ok);
        assert!(response.message.contains("unknown role"));
    }

    #[test]
    fn sync_label_is_stable() {
        assert_eq!(sync_label(BackendSync::Idle), "idle");
        assert_eq!(
            sync_label(BackendSync::Failed(SyncedAction::TriggerPanic)),
            "failed:trigger_panic"
        );
    }

    #[test]
    fn journey_flow_is_reflected_in_snapshots() {
        // Leftover state from a previous run may have been restored.
        journey_end();

        let login = tracking_login(" Citizen ".to_string());
        assert!(login.ok, "{}", login.message);

        let started = journey_start();
        assert!(started.applied, "{}", started.message);
        assert_eq!(started.status, "active");
        let journey_id = started.journey_id.clone().expect("journey id after start");

        let panic = journey_trigger_panic();
        assert_eq!(panic.status, "critical");
        let snapshot = tracking_snapshot();
        assert_eq!(snapshot.role.as_deref(), Some("citizen"));
        assert_eq!(snapshot.entities[0].status, "critical");
        let own = snapshot
            .entities
            .iter()
            .find(|entity| entity.origin == "self")
            .expect("self entity");
        assert_eq!(own.id, journey_id);
        assert_eq!(own.alert_type.as_deref(), Some("panic"));

        assert_eq!(journey_cancel_panic().status, "active");
        assert!(!journey_start().applied);

        assert!(tracking_start_ticker().ok);
        assert!(tracking_stop_ticker().ok);

        assert!(tracking_logout().ok);
        let snapshot = tracking_snapshot();
        assert!(snapshot.role.is_none());
        assert_eq!(snapshot.journey_status, "idle");
        assert!(snapshot.entities.iter().all(|entity| entity.origin == "decoy"));
    }
}
