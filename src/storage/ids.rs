// src/storage/ids.rs
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out chat ids that follow wall-clock seconds but never repeat or go
/// backwards, even when several chats are created within the same second.
#[derive(Debug, Default)]
pub struct ChatIdGenerator {
    last: AtomicU64,
}

impl ChatIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        self.next_at(now_seconds())
    }

    fn next_at(&self, now: u64) -> u64 {
        let (Ok(prev) | Err(prev)) =
            self.last
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                    Some(now.max(last + 1))
                });
        now.max(prev + 1)
    }

    /// Records an id seen on disk so later ids are issued above it.
    pub fn observe(&self, id: u64) {
        self.last.fetch_max(id, Ordering::SeqCst);
    }
}

fn now_seconds() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}
