//! Per-document debounce and single-flight guard.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::Completion;
use crate::config::BusyPolicy;

/// Observable state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// A debounced request is waiting for its timer.
    Scheduled,
    /// A generation is in flight.
    Running,
}

struct Pending {
    ticket: u64,
    superseded: CancellationToken,
}

#[derive(Default)]
struct SessionState {
    running: bool,
    pending: Option<Pending>,
    next_ticket: u64,
    last_result: Option<Completion>,
}

/// Debounce and guard state for one editing session.
pub struct CompletionSession {
    state: Mutex<SessionState>,
    debounce: Duration,
    busy_policy: BusyPolicy,
}

impl std::fmt::Debug for CompletionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionSession")
            .field("phase", &self.phase())
            .field("debounce", &self.debounce)
            .field("busy_policy", &self.busy_policy)
            .finish()
    }
}

/// Clears `running` when the evaluation ends or its future is dropped.
struct RunningGuard<'a> {
    session: &'a CompletionSession,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.session.lock().running = false;
    }
}

impl CompletionSession {
    #[must_use]
    pub fn new(debounce: Duration, busy_policy: BusyPolicy) -> Self {
        Self {
            state: Mutex::new(SessionState::default()),
            debounce,
            busy_policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        let state = self.lock();
        if state.running {
            Phase::Running
        } else if state.pending.is_some() {
            Phase::Scheduled
        } else {
            Phase::Idle
        }
    }

    #[must_use]
    pub fn last_result(&self) -> Option<Completion> {
        self.lock().last_result.clone()
    }

    /// Schedule `evaluate` after the debounce delay.
    ///
    /// Resolves to `None` when a newer request supersedes this one, when `cancel`
    /// fires during the wait, or when a generation is already running (the last
    /// result is returned instead under [`BusyPolicy::LastResult`]).
    pub async fn request<F, Fut>(&self, cancel: &CancellationToken, evaluate: F) -> Option<Completion>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<Completion>>,
    {
        let (ticket, superseded) = self.schedule();

        tokio::select! {
            () = cancel.cancelled() => {
                self.clear_pending(ticket);
                tracing::debug!(ticket, "completion cancelled during debounce");
                return None;
            }
            () = superseded.cancelled() => {
                tracing::trace!(ticket, "completion superseded");
                return None;
            }
            () = tokio::time::sleep(self.debounce) => {}
        }

        let _guard = {
            let mut state = self.lock();
            if !state.pending.as_ref().is_some_and(|p| p.ticket == ticket) {
                return None;
            }
            state.pending = None;
            if state.running {
                tracing::debug!(ticket, "generation in flight, request declined");
                return match self.busy_policy {
                    BusyPolicy::Empty => None,
                    BusyPolicy::LastResult => state.last_result.clone(),
                };
            }
            state.running = true;
            RunningGuard { session: self }
        };

        let result = evaluate().await;
        if let Some(completion) = &result {
            self.lock().last_result = Some(completion.clone());
        }
        result
    }

    fn schedule(&self) -> (u64, CancellationToken) {
        let mut state = self.lock();
        state.next_ticket += 1;
        let ticket = state.next_ticket;
        let superseded = CancellationToken::new();
        if let Some(previous) = state.pending.replace(Pending {
            ticket,
            superseded: superseded.clone(),
        }) {
            previous.superseded.cancel();
        }
        (ticket, superseded)
    }

    fn clear_pending(&self, ticket: u64) {
        let mut state = self.lock();
        if state.pending.as_ref().is_some_and(|p| p.ticket == ticket) {
            state.pending = None;
        }
    }
}
