//! Bookkeeping for asynchronous calls.
//!
//! A [`PendingCall`] starts out pending and makes at most one transition to
//! a terminal state: fulfilled, failed or cancelled. The transport's
//! completion callbacks and the caller's cancellation race each other from
//! different threads; every transition goes through [`PendingCall::complete`],
//! which only succeeds while the call is still pending. Losing transitions
//! are dropped without error.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::task::AtomicWaker;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::Error;

/// Observable state of an asynchronous call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    Pending,
    Fulfilled,
    Failed,
    Cancelled,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        self != CallState::Pending
    }
}

/// A terminal outcome offered to a pending call.
#[derive(Debug)]
pub(crate) enum Outcome {
    Fulfilled(Value),
    Failed(Error),
    Cancelled,
}

impl Outcome {
    fn state(&self) -> CallState {
        match self {
            Outcome::Fulfilled(_) => CallState::Fulfilled,
            Outcome::Failed(_) => CallState::Failed,
            Outcome::Cancelled => CallState::Cancelled,
        }
    }
}

struct Slot {
    state: CallState,
    /// The result, until it is handed out by polling.
    result: Option<Result<Value, Error>>,
}

/// Shared between the caller's [`CallFuture`] and the transport callbacks.
pub(crate) struct PendingCall {
    id: Uuid,
    method: String,
    slot: Mutex<Slot>,
    waker: AtomicWaker,
}

impl PendingCall {
    pub(crate) fn new(method: &str) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            method: method.to_string(),
            slot: Mutex::new(Slot {
                state: CallState::Pending,
                result: None,
            }),
            waker: AtomicWaker::new(),
        })
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> CallState {
        self.lock().state
    }

    /// Move out of the pending state. Returns `false`, leaving the call
    /// untouched, if it already reached a terminal state.
    pub(crate) fn complete(&self, outcome: Outcome) -> bool {
        {
            let mut slot = self.lock();
            if slot.state.is_terminal() {
                tracing::trace!(
                    id = %self.id,
                    method = %self.method,
                    current = ?slot.state,
                    discarded = ?outcome.state(),
                    "discarding completion of finished call"
                );
                return false;
            }

            slot.state = outcome.state();
            slot.result = Some(match outcome {
                Outcome::Fulfilled(value) => Ok(value),
                Outcome::Failed(err) => Err(err),
                Outcome::Cancelled => Err(Error::cancelled()),
            });
            tracing::trace!(id = %self.id, method = %self.method, state = ?slot.state, "call completed");
        }
        self.waker.wake();
        true
    }

    pub(crate) fn fulfil(&self, value: Value) -> bool {
        self.complete(Outcome::Fulfilled(value))
    }

    pub(crate) fn fail(&self, err: Error) -> bool {
        self.complete(Outcome::Failed(err))
    }

    pub(crate) fn cancel(&self) -> bool {
        self.complete(Outcome::Cancelled)
    }
}

/// The result of an asynchronous call, which can also cancel it.
///
/// Await it to get the call's result. A cancelled call resolves to an
/// [`Error`] with code [`Cancelled`](crate::StatusCode::Cancelled).
/// Dropping a `CallFuture` does not cancel the call.
#[must_use = "dropping a call future detaches from the call's result"]
pub struct CallFuture {
    call: Arc<PendingCall>,
    token: CancellationToken,
}

impl CallFuture {
    pub(crate) fn new(call: Arc<PendingCall>, token: CancellationToken) -> Self {
        Self { call, token }
    }

    /// Correlation id of the call, as it appears in logs.
    pub fn id(&self) -> Uuid {
        self.call.id()
    }

    pub fn state(&self) -> CallState {
        self.call.state()
    }

    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == CallState::Cancelled
    }

    /// Cancel the call.
    ///
    /// Returns `true` if the call was still pending: it is now cancelled for
    /// good and the transport has been asked to abandon it. Returns `false`
    /// if the call had already finished, in which case nothing changes.
    pub fn cancel(&self) -> bool {
        if !self.call.cancel() {
            return false;
        }
        tracing::debug!(id = %self.call.id(), method = %self.call.method, "cancelling call");
        self.token.cancel();
        true
    }

    /// A copy of the result if the call has finished and the result has not
    /// been taken by awaiting the future.
    pub fn try_result(&self) -> Option<Result<Value, Error>> {
        self.call.lock().result.clone()
    }

    /// Block the current thread until the call finishes.
    ///
    /// Must not be called from within an async task.
    pub fn wait(self) -> Result<Value, Error> {
        futures::executor::block_on(self)
    }
}

impl std::fmt::Debug for CallFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallFuture")
            .field("id", &self.call.id)
            .field("method", &self.call.method)
            .field("state", &self.state())
            .finish()
    }
}

impl Future for CallFuture {
    type Output = Result<Value, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Register before looking so a completion racing with us wakes us.
        self.call.waker.register(cx.waker());

        let mut slot = self.call.lock();
        if !slot.state.is_terminal() {
            return Poll::Pending;
        }
        match slot.result.take() {
            Some(result) => Poll::Ready(result),
            None => Poll::Ready(Err(Error::internal_error(format!(
                "result of call `{}` was already taken",
                self.call.method
            )))),
        }
    }
}
