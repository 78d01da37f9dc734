//! Session context passed to every schema mutator.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Caller-owned session token.
///
/// Schema mutations are rejected while the session reports an active
/// transaction.
#[derive(Debug)]
pub struct SchemaSession {
    id: u64,
    user: String,
    transaction_active: AtomicBool,
}

impl SchemaSession {
    /// Creates a new session for the given user.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            user: user.into(),
            transaction_active: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn begin_transaction(&self) {
        self.transaction_active.store(true, Ordering::Release);
    }

    pub fn end_transaction(&self) {
        self.transaction_active.store(false, Ordering::Release);
    }

    pub fn is_transaction_active(&self) -> bool {
        self.transaction_active.load(Ordering::Acquire)
    }
}

impl Default for SchemaSession {
    fn default() -> Self {
        Self::new("admin")
    }
}
