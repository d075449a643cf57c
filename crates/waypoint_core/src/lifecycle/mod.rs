//! Journey lifecycle state machine.
//!
//! # Responsibility
//! - Drive the local user's journey through `idle -> active -> critical`.
//! - Derive the self entity and persisted session from the current state.
//!
//! # Invariants
//! - A journey id exists iff the status is not `idle`.
//! - Unlisted (state, action) pairs are ignored and cause no side effects.
//! - `TriggerPanic` while critical is idempotent.
//! - The machine performs no I/O; callers own side effects.

use crate::model::entity::{Entity, EntityMetadata, EntityOrigin, EntityStatus, GridPosition};
use crate::model::session::{Identity, JourneyId, JourneyStatus, Session};
use log::warn;

/// Label of the self entity on the shared view.
pub const SELF_ENTITY_NAME: &str = "Me (Citizen)";
/// Where the self entity is drawn.
pub const SELF_POSITION: GridPosition = GridPosition { x: 50.0, y: 90.0 };
/// `alert_type` metadata attached while a panic is raised.
pub const PANIC_ALERT_TYPE: &str = "panic";

/// User-initiated journey action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JourneyAction {
    Start,
    TriggerPanic,
    CancelPanic,
    End,
}

impl JourneyAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::TriggerPanic => "trigger_panic",
            Self::CancelPanic => "cancel_panic",
            Self::End => "end",
        }
    }
}

/// One applied state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub action: JourneyAction,
    pub from: JourneyStatus,
    pub to: JourneyStatus,
    /// Journey the transition acted on; for `End` this is the discarded id.
    pub journey_id: JourneyId,
}

/// Result of offering an action to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied(Transition),
    Ignored {
        action: JourneyAction,
        status: JourneyStatus,
    },
}

impl TransitionOutcome {
    pub fn transition(&self) -> Option<&Transition> {
        match self {
            Self::Applied(transition) => Some(transition),
            Self::Ignored { .. } => None,
        }
    }
}

/// The local user's journey state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JourneyLifecycle {
    status: JourneyStatus,
    journey_id: Option<JourneyId>,
}

impl Default for JourneyLifecycle {
    fn default() -> Self {
        Self::idle()
    }
}

impl JourneyLifecycle {
    pub fn idle() -> Self {
        Self {
            status: JourneyStatus::Idle,
            journey_id: None,
        }
    }

    /// Restores state from a persisted session; inconsistent sessions start idle.
    pub fn restore(session: &Session) -> Self {
        if let Err(err) = session.validate() {
            warn!("event=lifecycle_restore module=lifecycle status=skip reason=invalid_session error={err}");
            return Self::idle();
        }
        Self {
            status: session.status,
            journey_id: session.journey_id.clone(),
        }
    }

    pub fn status(&self) -> JourneyStatus {
        self.status
    }

    pub fn journey_id(&self) -> Option<&JourneyId> {
        self.journey_id.as_ref()
    }

    pub fn has_journey(&self) -> bool {
        self.journey_id.is_some()
    }

    /// Applies `action`, generating a fresh journey id on start.
    pub fn apply(&mut self, action: JourneyAction) -> TransitionOutcome {
        self.apply_with(action, JourneyId::generate)
    }

    /// Applies `action`; `new_id` is only invoked for an accepted start.
    pub fn apply_with(
        &mut self,
        action: JourneyAction,
        new_id: impl FnOnce() -> JourneyId,
    ) -> TransitionOutcome {
        let from = self.status;
        let next = match (from, action, self.journey_id.clone()) {
            (JourneyStatus::Idle, JourneyAction::Start, _) => {
                Some((JourneyStatus::Active, new_id()))
            }
            (JourneyStatus::Active, JourneyAction::TriggerPanic, Some(id)) => {
                Some((JourneyStatus::Critical, id))
            }
            (JourneyStatus::Critical, JourneyAction::CancelPanic, Some(id)) => {
                Some((JourneyStatus::Active, id))
            }
            (JourneyStatus::Active | JourneyStatus::Critical, JourneyAction::End, Some(id)) => {
                Some((JourneyStatus::Idle, id))
            }
            _ => None,
        };

        let Some((to, journey_id)) = next else {
            return TransitionOutcome::Ignored {
                action,
                status: from,
            };
        };

        self.status = to;
        self.journey_id = (to != JourneyStatus::Idle).then(|| journey_id.clone());
        TransitionOutcome::Applied(Transition {
            action,
            from,
            to,
            journey_id,
        })
    }

    /// Drops any journey without a transition record (logout path).
    pub fn reset(&mut self) -> Option<JourneyId> {
        self.status = JourneyStatus::Idle;
        self.journey_id.take()
    }

    /// Session record mirroring this state.
    pub fn to_session(&self, identity: Option<&Identity>) -> Session {
        Session::new(self.journey_id.clone(), self.status, identity.cloned())
    }

    /// Self entity for the merged view, present while a journey exists.
    pub fn self_entity(&self, identity: Option<&Identity>) -> Option<Entity> {
        let journey_id = self.journey_id.as_ref()?;
        let status = match self.status {
            JourneyStatus::Critical => EntityStatus::Critical,
            JourneyStatus::Active => EntityStatus::Active,
            JourneyStatus::Idle => return None,
        };

        let mut metadata = identity
            .and_then(|identity| identity.profile.as_ref())
            .map(|profile| EntityMetadata {
                full_name: profile.full_name.clone(),
                contact_number: profile.contact_number.clone(),
                home_address: profile.home_address.clone(),
                alert_type: None,
                best_contacts: profile.best_contacts.clone(),
            })
            .unwrap_or_default();
        if status.is_critical() {
            metadata.alert_type = Some(PANIC_ALERT_TYPE.to_string());
        }

        Some(
            Entity::new(
                journey_id.entity_id(),
                SELF_ENTITY_NAME,
                status,
                SELF_POSITION,
                EntityOrigin::SelfJourney,
            )
            .with_metadata(metadata),
        )
    }
}
