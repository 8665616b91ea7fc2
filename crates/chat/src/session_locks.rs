//! Per-session append serialization.
//!
//! While one question is being answered, a second question for the same
//! session waits, so the persisted order is Q1, A1, Q2, A2 and Q2 sees A1
//! in its history. Different sessions never block each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use ragachat_core::SessionId;
use tokio::sync::OwnedMutexGuard;

/// Held for the lifetime of one `add_message` call.
pub type SessionGuard = OwnedMutexGuard<()>;

#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<SessionId, Weak<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `session_id`.
    pub async fn lock(&self, session_id: SessionId) -> SessionGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.retain(|_, weak| weak.strong_count() > 0);
            match locks.get(&session_id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(tokio::sync::Mutex::new(()));
                    locks.insert(session_id, Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    /// Sessions with a live lock (held or awaited).
    pub fn active(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.values().filter(|weak| weak.strong_count() > 0).count()
    }
}
