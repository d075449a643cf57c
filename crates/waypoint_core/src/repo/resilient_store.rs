//! Infallible session store facade used by the engine.
//!
//! # Responsibility
//! - Hide storage failures from lifecycle callers.
//! - Degrade to memory-only operation when the durable store breaks.
//!
//! # Invariants
//! - No method returns an error or panics.
//! - The memory mirror always holds the latest saved session, so a degraded
//!   store keeps serving in-process state.
//! - A storage failure drops the durable store for the rest of the process.

use crate::model::session::Session;
use crate::repo::session_repo::{MemorySessionStore, SessionStore, SqliteSessionStore};
use log::{info, warn};
use std::path::Path;

/// Session store wrapper that never surfaces storage errors.
pub struct ResilientSessionStore {
    durable: Option<Box<dyn SessionStore>>,
    memory: MemorySessionStore,
}

impl ResilientSessionStore {
    pub fn new(durable: Box<dyn SessionStore>) -> Self {
        Self {
            durable: Some(durable),
            memory: MemorySessionStore::new(),
        }
    }

    /// Store without durable backing; equivalent to "no prior session".
    pub fn memory_only() -> Self {
        Self {
            durable: None,
            memory: MemorySessionStore::new(),
        }
    }

    /// Opens a SQLite store at `path`, falling back to memory-only on failure.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match SqliteSessionStore::open(path) {
            Ok(store) => {
                info!(
                    "event=session_store_open module=repo status=ok path={}",
                    path.display()
                );
                Self::new(Box::new(store))
            }
            Err(err) => {
                warn!(
                    "event=session_store_open module=repo status=error mode=memory_fallback path={} error={err}",
                    path.display()
                );
                Self::memory_only()
            }
        }
    }

    pub fn is_durable(&self) -> bool {
        self.durable.is_some()
    }

    /// Loads the persisted session; unreadable state is treated as empty.
    pub fn load(&mut self) -> Option<Session> {
        let loaded = match self.durable.as_ref() {
            Some(store) => match store.load() {
                Ok(session) => session,
                Err(err) if err.is_storage_failure() => {
                    warn!("event=session_load module=repo status=error mode=memory_fallback error={err}");
                    self.durable = None;
                    None
                }
                Err(err) => {
                    warn!("event=session_load module=repo status=skip reason=invalid_state error={err}");
                    None
                }
            },
            None => self.memory.load().ok().flatten(),
        };

        if let Some(session) = loaded.as_ref() {
            // Memory save only fails validation, which the durable load already passed.
            let _ = self.memory.save(session);
        }
        loaded
    }

    pub fn save(&mut self, session: &Session) {
        if let Err(err) = self.memory.save(session) {
            warn!("event=session_save module=repo status=skip reason=invalid_state error={err}");
            return;
        }
        if let Some(store) = self.durable.as_mut() {
            if let Err(err) = store.save(session) {
                warn!("event=session_save module=repo status=error mode=memory_fallback error={err}");
                self.durable = None;
            }
        }
    }

    pub fn clear(&mut self) {
        let _ = self.memory.clear();
        if let Some(store) = self.durable.as_mut() {
            if let Err(err) = store.clear() {
                warn!("event=session_clear module=repo status=error mode=memory_fallback error={err}");
                self.durable = None;
            }
        }
    }
}
