//! Alert dispatcher: optimistic lifecycle updates plus backend notification.
//!
//! # Responsibility
//! - Apply a journey action locally and persist the resulting session.
//! - Describe the backend call that notifies the server of the change.
//! - Track confirmation of the latest transition so staleness is visible.
//!
//! # Invariants
//! - Local state is never rolled back when the backend call fails.
//! - Backend calls are not retried.
//! - Only the latest transition's completion may change `BackendSync`.
//! - Ignored actions persist nothing and produce no call.

use crate::lifecycle::{JourneyAction, JourneyLifecycle, Transition, TransitionOutcome};
use crate::model::entity::GridPosition;
use crate::model::session::{Identity, JourneyStatus, ANONYMOUS_USER_ID};
use crate::remote::client::{BackendResult, TrackingBackend};
use crate::remote::wire::{DispatchLocation, DispatchRequest, StartJourneyRequest};
use crate::repo::resilient_store::ResilientSessionStore;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Backend confirmation state of the latest lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "action", rename_all = "snake_case")]
pub enum BackendSync {
    /// No transition issued in this session.
    Idle,
    /// Applied locally, backend call in flight.
    Pending(SyncedAction),
    Confirmed(SyncedAction),
    /// Backend call failed; local state may diverge from the backend record.
    Failed(SyncedAction),
}

impl BackendSync {
    pub fn is_stale(self) -> bool {
        matches!(self, Self::Pending(_) | Self::Failed(_))
    }
}

/// Serializable mirror of `JourneyAction` for view consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncedAction {
    Start,
    TriggerPanic,
    CancelPanic,
    End,
}

impl From<JourneyAction> for SyncedAction {
    fn from(value: JourneyAction) -> Self {
        match value {
            JourneyAction::Start => Self::Start,
            JourneyAction::TriggerPanic => Self::TriggerPanic,
            JourneyAction::CancelPanic => Self::CancelPanic,
            JourneyAction::End => Self::End,
        }
    }
}

/// Identifies one issued backend notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTicket {
    sequence: u64,
    action: JourneyAction,
}

impl DispatchTicket {
    pub fn action(self) -> JourneyAction {
        self.action
    }
}

/// Backend notification for one applied transition.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Start {
        journey_id: String,
        request: StartJourneyRequest,
    },
    Dispatch(DispatchRequest),
    Cancel {
        journey_id: String,
    },
    End {
        journey_id: String,
    },
}

impl BackendCall {
    /// Builds the call matching `transition`.
    pub fn for_transition(
        transition: &Transition,
        identity: Option<&Identity>,
        position: GridPosition,
    ) -> Self {
        let journey_id = transition.journey_id.as_str().to_string();
        let user_id = identity
            .map(Identity::user_id)
            .unwrap_or(ANONYMOUS_USER_ID)
            .to_string();
        match transition.action {
            JourneyAction::Start => Self::Start {
                journey_id,
                request: StartJourneyRequest { user_id },
            },
            JourneyAction::TriggerPanic => Self::Dispatch(DispatchRequest {
                journey_id,
                user_id,
                location: DispatchLocation::from_grid(position),
            }),
            JourneyAction::CancelPanic => Self::Cancel { journey_id },
            JourneyAction::End => Self::End { journey_id },
        }
    }

    pub fn journey_id(&self) -> &str {
        match self {
            Self::Start { journey_id, .. }
            | Self::Cancel { journey_id }
            | Self::End { journey_id } => journey_id.as_str(),
            Self::Dispatch(request) => request.journey_id.as_str(),
        }
    }

    /// Sends the call; response bodies beyond success are not inspected.
    pub async fn send(&self, backend: &dyn TrackingBackend) -> BackendResult<()> {
        match self {
            Self::Start {
                journey_id,
                request,
            } => backend.start_journey(journey_id, request).await,
            Self::Dispatch(request) => backend.dispatch_panic(request).await.map(|_| ()),
            Self::Cancel { journey_id } => backend.cancel_alert(journey_id).await,
            Self::End { journey_id } => backend.end_journey(journey_id).await,
        }
    }
}

/// Locally applied action awaiting backend notification.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedDispatch {
    pub ticket: DispatchTicket,
    pub transition: Transition,
    pub call: BackendCall,
}

/// Optimistic-update coordinator with per-transition confirmation tracking.
#[derive(Debug, Clone)]
pub struct AlertDispatcher {
    sequence: u64,
    sync: BackendSync,
}

impl Default for AlertDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertDispatcher {
    pub fn new() -> Self {
        Self {
            sequence: 0,
            sync: BackendSync::Idle,
        }
    }

    pub fn sync(&self) -> BackendSync {
        self.sync
    }

    /// Applies `action` locally and persists the session.
    ///
    /// Returns `None` when the lifecycle ignored the action.
    ///
    /// # Side effects
    /// - Saves the session after start/panic/cancel; clears it after end.
    /// - Marks the transition as pending backend confirmation.
    pub fn prepare(
        &mut self,
        action: JourneyAction,
        lifecycle: &mut JourneyLifecycle,
        store: &mut ResilientSessionStore,
        identity: Option<&Identity>,
        position: GridPosition,
    ) -> Option<PreparedDispatch> {
        let transition = match lifecycle.apply(action) {
            TransitionOutcome::Applied(transition) => transition,
            TransitionOutcome::Ignored { action, status } => {
                info!(
                    "event=journey_action module=dispatcher status=skip action={} journey_status={}",
                    action.as_str(),
                    status.as_str()
                );
                return None;
            }
        };

        if transition.to == JourneyStatus::Idle {
            store.clear();
        } else {
            store.save(&lifecycle.to_session(identity));
        }

        self.sequence += 1;
        self.sync = BackendSync::Pending(action.into());
        info!(
            "event=journey_action module=dispatcher status=ok action={} from={} to={} journey_id={}",
            action.as_str(),
            transition.from.as_str(),
            transition.to.as_str(),
            transition.journey_id
        );

        let call = BackendCall::for_transition(&transition, identity, position);
        Some(PreparedDispatch {
            ticket: DispatchTicket {
                sequence: self.sequence,
                action,
            },
            transition,
            call,
        })
    }

    /// Records the backend result for `ticket`.
    ///
    /// Returns `true` when the visible sync state changed.
    pub fn complete(&mut self, ticket: DispatchTicket, result: &BackendResult<()>) -> bool {
        let action = ticket.action.as_str();
        if let Err(err) = result {
            warn!(
                "event=backend_notify module=dispatcher status=error action={action} error_code={} error={err}",
                err.code()
            );
        } else {
            info!("event=backend_notify module=dispatcher status=ok action={action}");
        }

        if ticket.sequence != self.sequence {
            return false;
        }
        self.sync = match result {
            Ok(()) => BackendSync::Confirmed(ticket.action.into()),
            Err(_) => BackendSync::Failed(ticket.action.into()),
        };
        true
    }

    /// Forgets confirmation tracking; outstanding tickets become inert.
    ///
    /// Returns `true` when a backend call was still pending.
    pub fn reset(&mut self) -> bool {
        let was_pending = matches!(self.sync, BackendSync::Pending(_));
        self.sequence += 1;
        self.sync = BackendSync::Idle;
        was_pending
    }
}

#[cfg(test)]
mod tests {
    use super::{AlertDispatcher, BackendCall, BackendSync, SyncedAction};
    use crate::lifecycle::{JourneyAction, JourneyLifecycle, SELF_POSITION};
    use crate::model::session::{Identity, JourneyStatus, Role};
    use crate::remote::client::BackendError;
    use crate::repo::resilient_store::ResilientSessionStore;

    #[test]
    fn prepare_persists_and_marks_pending() {
        let mut dispatcher = AlertDispatcher::new();
        let mut lifecycle = JourneyLifecycle::idle();
        let mut store = ResilientSessionStore::memory_only();
        let identity = Identity::for_role(Role::Citizen);

        let prepared = dispatcher
            .prepare(
                JourneyAction::Start,
                &mut lifecycle,
                &mut store,
                Some(&identity),
                SELF_POSITION,
            )
            .expect("start should apply");

        assert_eq!(dispatcher.sync(), BackendSync::Pending(SyncedAction::Start));
        let saved = store.load().expect("session should be saved");
        assert_eq!(saved.status, JourneyStatus::Active);
        assert_eq!(saved.identity, Some(identity));
        match prepared.call {
            BackendCall::Start { request, .. } => assert_eq!(request.user_id, "Citizen User"),
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn ignored_action_has_no_side_effects() {
        let mut dispatcher = AlertDispatcher::new();
        let mut lifecycle = JourneyLifecycle::idle();
        let mut store = ResilientSessionStore::memory_only();

        let prepared = dispatcher.prepare(
            JourneyAction::TriggerPanic,
            &mut lifecycle,
            &mut store,
            None,
            SELF_POSITION,
        );

        assert!(prepared.is_none());
        assert_eq!(dispatcher.sync(), BackendSync::Idle);
        assert!(store.load().is_none());
    }

    #[test]
    fn failure_keeps_local_state_and_marks_failed() {
        let mut dispatcher = AlertDispatcher::new();
        let mut lifecycle = JourneyLifecycle::idle();
        let mut store = ResilientSessionStore::memory_only();
        dispatcher.prepare(JourneyAction::Start, &mut lifecycle, &mut store, None, SELF_POSITION);
        let panic = dispatcher
            .prepare(
                JourneyAction::TriggerPanic,
                &mut lifecycle,
                &mut store,
                None,
                SELF_POSITION,
            )
            .expect("panic should apply");

        let changed = dispatcher.complete(
            panic.ticket,
            &Err(BackendError::Transport("offline".to_string())),
        );

        assert!(changed);
        assert_eq!(
            dispatcher.sync(),
            BackendSync::Failed(SyncedAction::TriggerPanic)
        );
        assert_eq!(lifecycle.status(), JourneyStatus::Critical);
        match panic.call {
            BackendCall::Dispatch(request) => {
                assert_eq!(request.user_id, "anon");
                assert_eq!(request.location.lat, SELF_POSITION.x);
                assert_eq!(request.location.lng, SELF_POSITION.y);
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn stale_completion_does_not_override_newer_transition() {
        let mut dispatcher = AlertDispatcher::new();
        let mut lifecycle = JourneyLifecycle::idle();
        let mut store = ResilientSessionStore::memory_only();
        let start = dispatcher
            .prepare(JourneyAction::Start, &mut lifecycle, &mut store, None, SELF_POSITION)
            .expect("start should apply");
        dispatcher.prepare(
            JourneyAction::TriggerPanic,
            &mut lifecycle,
            &mut store,
            None,
            SELF_POSITION,
        );

        assert!(!dispatcher.complete(start.ticket, &Ok(())));
        assert_eq!(
            dispatcher.sync(),
            BackendSync::Pending(SyncedAction::TriggerPanic)
        );
    }

    #[test]
    fn reset_abandons_a_pending_call() {
        let mut dispatcher = AlertDispatcher::new();
        let mut lifecycle = JourneyLifecycle::idle();
        let mut store = ResilientSessionStore::memory_only();
        let start = dispatcher
            .prepare(JourneyAction::Start, &mut lifecycle, &mut store, None, SELF_POSITION)
            .expect("start should apply");

        assert!(dispatcher.reset());
        assert_eq!(dispatcher.sync(), BackendSync::Idle);
        assert!(!dispatcher.complete(start.ticket, &Ok(())));
        assert_eq!(dispatcher.sync(), BackendSync::Idle);
        assert!(!dispatcher.reset());
    }

    #[test]
    fn end_clears_session() {
        let mut dispatcher = AlertDispatcher::new();
        let mut lifecycle = JourneyLifecycle::idle();
        let mut store = ResilientSessionStore::memory_only();
        dispatcher.prepare(JourneyAction::Start, &mut lifecycle, &mut store, None, SELF_POSITION);
        let end = dispatcher
            .prepare(JourneyAction::End, &mut lifecycle, &mut store, None, SELF_POSITION)
            .expect("end should apply");

        assert!(store.load().is_none());
        assert!(matches!(end.call, BackendCall::End { .. }));
    }
}
