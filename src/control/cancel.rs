//! Cancellation and deadlines for long-running navigation calls

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cloneable flag another thread can raise to stop a navigation call
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Why a call stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Interruption {
    Cancelled,
    TimedOut,
}

/// Cancel token plus optional deadline, polled between motion segments
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    token: CancelToken,
    deadline: Option<Instant>,
}

impl Interrupt {
    pub fn new(token: CancelToken, timeout: Option<Duration>) -> Self {
        Interrupt {
            token,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn check(&self) -> Option<Interruption> {
        if self.token.is_cancelled() {
            return Some(Interruption::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interruption::TimedOut),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancelToken::new();
        let interrupt = Interrupt::new(token.clone(), None);
        assert_eq!(interrupt.check(), None);
        token.cancel();
        assert_eq!(interrupt.check(), Some(Interruption::Cancelled));
    }

    #[test]
    fn zero_timeout_expires_immediately() {
        let interrupt = Interrupt::new(CancelToken::new(), Some(Duration::ZERO));
        assert_eq!(interrupt.check(), Some(Interruption::TimedOut));
    }
}
