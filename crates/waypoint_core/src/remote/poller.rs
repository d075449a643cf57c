//! Remote journey poll state.
//!
//! # Responsibility
//! - Hold the last successfully fetched remote entity set.
//! - Order concurrent poll completions by issue sequence.
//!
//! # Invariants
//! - A failed poll never clears or alters the retained remote set.
//! - A completion issued before the latest applied one is discarded.
//! - Poll failures are logged here and never returned to callers.

use crate::model::entity::Entity;
use crate::remote::client::BackendResult;
use crate::remote::wire::{normalize_journeys, JourneysResponse};
use log::{debug, warn};

/// Sequence token handed out when a poll is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PollTicket(u64);

impl PollTicket {
    pub fn sequence(self) -> u64 {
        self.0
    }
}

/// Effect of applying one poll completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Remote set replaced with `count` entities.
    Updated { count: usize },
    /// Fetch failed; previous set kept.
    Retained,
    /// A newer poll already applied; completion ignored.
    Superseded,
}

impl PollOutcome {
    pub fn changed_view(self) -> bool {
        matches!(self, Self::Updated { .. })
    }
}

/// Remote sync state owned by the engine.
#[derive(Debug, Default, Clone)]
pub struct RemoteSyncPoller {
    remotes: Vec<Entity>,
    issued: u64,
    applied: u64,
    consecutive_failures: u32,
}

impl RemoteSyncPoller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remotes(&self) -> &[Entity] {
        &self.remotes
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Issues a new poll sequence number.
    pub fn begin(&mut self) -> PollTicket {
        self.issued += 1;
        PollTicket(self.issued)
    }

    /// Applies a completed fetch.
    pub fn complete(
        &mut self,
        ticket: PollTicket,
        result: BackendResult<JourneysResponse>,
    ) -> PollOutcome {
        if ticket.0 <= self.applied {
            debug!(
                "event=remote_poll module=remote status=skip reason=superseded seq={} applied_seq={}",
                ticket.0, self.applied
            );
            return PollOutcome::Superseded;
        }

        match result {
            Ok(response) => {
                self.remotes = normalize_journeys(&response);
                self.applied = ticket.0;
                self.consecutive_failures = 0;
                debug!(
                    "event=remote_poll module=remote status=ok seq={} count={}",
                    ticket.0,
                    self.remotes.len()
                );
                PollOutcome::Updated {
                    count: self.remotes.len(),
                }
            }
            Err(err) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                warn!(
                    "event=remote_poll module=remote status=error seq={} error_code={} retained={} failure_streak={} error={err}",
                    ticket.0,
                    err.code(),
                    self.remotes.len(),
                    self.consecutive_failures
                );
                PollOutcome::Retained
            }
        }
    }

    /// Drops the remote set and invalidates every outstanding ticket.
    pub fn reset(&mut self) {
        self.remotes.clear();
        self.applied = self.issued;
        self.consecutive_failures = 0;
    }
}
