//! Session and identity model.
//!
//! # Responsibility
//! - Define the locally persisted journey session.
//! - Define user identity (role + display name) and journey identifiers.
//!
//! # Invariants
//! - `Session::journey_id` is present and non-empty iff `status != Idle`.
//! - `JourneyId` values are time-based and unique with overwhelming probability.

use crate::model::entity::{BestContact, EntityId};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Backend user id used when no identity is logged in.
pub const ANONYMOUS_USER_ID: &str = "anon";

/// Lifecycle status of the local user's journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyStatus {
    Idle,
    Active,
    Critical,
}

impl JourneyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "idle" => Some(Self::Idle),
            "active" => Some(Self::Active),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Identifier of one local journey.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JourneyId(String);

impl JourneyId {
    /// Generates a new id from wall-clock milliseconds plus a random suffix.
    ///
    /// The random suffix keeps two starts within one millisecond distinct.
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{millis}-{}", &suffix[..8]))
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Entity identity used when the journey is rendered as the self entity.
    pub fn entity_id(&self) -> EntityId {
        EntityId::new(self.0.clone())
    }
}

impl Display for JourneyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Application role chosen at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Citizen,
    Operator,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Citizen => "citizen",
            Self::Operator => "operator",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "citizen" => Some(Self::Citizen),
            "operator" => Some(Self::Operator),
            _ => None,
        }
    }

    /// Display name assigned by a plain role login.
    pub fn default_display_name(self) -> &'static str {
        match self {
            Self::Citizen => "Citizen User",
            Self::Operator => "Ops Commander",
        }
    }
}

/// Optional contact details a citizen shares with operators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactProfile {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub contact_number: Option<String>,
    #[serde(default)]
    pub home_address: Option<String>,
    #[serde(default)]
    pub best_contacts: Vec<BestContact>,
}

/// Logged-in user identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub role: Role,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ContactProfile>,
}

impl Identity {
    /// Identity produced by a plain role login.
    pub fn for_role(role: Role) -> Self {
        Self {
            role,
            display_name: role.default_display_name().to_string(),
            profile: None,
        }
    }

    /// Backend user id for this identity.
    pub fn user_id(&self) -> &str {
        let trimmed = self.display_name.trim();
        if trimmed.is_empty() {
            ANONYMOUS_USER_ID
        } else {
            trimmed
        }
    }
}

/// Validation failures for persisted session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionValidationError {
    MissingJourneyId { status: JourneyStatus },
    UnexpectedJourneyId,
}

impl Display for SessionValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingJourneyId { status } => {
                write!(f, "journey_id is required when status is {}", status.as_str())
            }
            Self::UnexpectedJourneyId => write!(f, "journey_id must be empty when status is idle"),
        }
    }
}

impl Error for SessionValidationError {}

/// Locally persisted journey session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub journey_id: Option<JourneyId>,
    pub status: JourneyStatus,
    pub identity: Option<Identity>,
}

impl Session {
    pub fn new(
        journey_id: Option<JourneyId>,
        status: JourneyStatus,
        identity: Option<Identity>,
    ) -> Self {
        Self {
            journey_id,
            status,
            identity,
        }
    }

    /// Checks the journey-id/status pairing invariant.
    pub fn validate(&self) -> Result<(), SessionValidationError> {
        let has_id = self
            .journey_id
            .as_ref()
            .is_some_and(|id| !id.as_str().trim().is_empty());
        match (self.status, has_id) {
            (JourneyStatus::Idle, true) => Err(SessionValidationError::UnexpectedJourneyId),
            (JourneyStatus::Idle, false) => Ok(()),
            (status, false) => Err(SessionValidationError::MissingJourneyId { status }),
            (_, true) => Ok(()),
        }
    }
}
