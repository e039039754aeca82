use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A transient notification ("Record deleted", "Delete failed: ...").
#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub raised_at: Instant,
}

/// Queue of notices owned by one view. The renderer drains it; anything it
/// never picks up is dropped after `ttl`.
#[derive(Debug)]
pub struct Notices {
    queue: VecDeque<Notice>,
    ttl: Duration,
}

impl Notices {
    pub fn new(ttl: Duration) -> Self {
        Self {
            queue: VecDeque::new(),
            ttl,
        }
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(NoticeLevel::Success, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(NoticeLevel::Error, message.into());
    }

    fn push(&mut self, level: NoticeLevel, message: String) {
        self.queue.push_back(Notice {
            level,
            message,
            raised_at: Instant::now(),
        });
    }

    pub fn drain(&mut self) -> Vec<Notice> {
        self.expire();
        self.queue.drain(..).collect()
    }

    pub fn peek(&self) -> impl Iterator<Item = &Notice> {
        self.queue.iter()
    }

    /// Drop notices older than the TTL. Returns how many were dropped.
    pub fn expire(&mut self) -> usize {
        let before = self.queue.len();
        let ttl = self.ttl;
        self.queue.retain(|n| n.raised_at.elapsed() < ttl);
        before - self.queue.len()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for Notices {
    fn default() -> Self {
        Self::new(Duration::from_secs(6))
    }
}
