//! Caller-side handles for coordinated requests
//!
//! A `RequestHandle` is a future for one caller's interest in a request.
//! Several handles may share one outbound call; each can be cancelled on its
//! own without affecting the others.

use std::{
  future::Future,
  pin::Pin,
  sync::{Arc, Weak},
  task::{Context, Poll},
  time::Duration,
};

use lens_core::{QueryError, RenderedDocument, RequestKey};
use tokio::sync::oneshot;

use super::Shared;

/// Final result delivered to every waiter on a request
pub type Outcome = Result<Arc<RenderedDocument>, QueryError>;

/// Identifies one waiter inside one pending request
#[derive(Clone)]
pub(super) struct Ticket {
  pub(super) shared: Weak<Shared>,
  pub(super) key: RequestKey,
  pub(super) generation: u64,
  pub(super) waiter: u64,
}

impl Ticket {
  fn withdraw(&self) -> bool {
    self
      .shared
      .upgrade()
      .is_some_and(|shared| shared.withdraw(self.key, self.generation, self.waiter))
  }
}

enum State {
  Ready(Option<Outcome>),
  Waiting(oneshot::Receiver<Outcome>),
}

/// Future resolving to the rendered document for one request.
///
/// Dropping an unresolved handle withdraws its interest, same as `cancel()`.
pub struct RequestHandle {
  key: RequestKey,
  state: State,
  ticket: Option<Ticket>,
}

impl RequestHandle {
  pub(super) fn ready(key: RequestKey, outcome: Outcome) -> Self {
    Self {
      key,
      state: State::Ready(Some(outcome)),
      ticket: None,
    }
  }

  pub(super) fn waiting(key: RequestKey, rx: oneshot::Receiver<Outcome>, ticket: Ticket) -> Self {
    Self {
      key,
      state: State::Waiting(rx),
      ticket: Some(ticket),
    }
  }

  pub fn key(&self) -> RequestKey {
    self.key
  }

  /// Whether the outcome is available without waiting
  pub fn is_ready(&self) -> bool {
    matches!(self.state, State::Ready(_))
  }

  /// Withdraw this caller's interest. The handle then resolves to
  /// `Cancelled`. Returns `false` if the request already resolved.
  pub fn cancel(&self) -> bool {
    self.ticket.as_ref().is_some_and(Ticket::withdraw)
  }

  /// A detached handle that can cancel this request from elsewhere
  pub fn cancel_handle(&self) -> CancelHandle {
    CancelHandle {
      key: self.key,
      ticket: self.ticket.clone(),
    }
  }

  /// Wait at most `deadline` for the outcome. On expiry this caller's
  /// interest is withdrawn and `Cancelled` is returned; other waiters on the
  /// same request are unaffected.
  pub async fn wait_timeout(mut self, deadline: Duration) -> Outcome {
    match tokio::time::timeout(deadline, &mut self).await {
      Ok(outcome) => outcome,
      Err(_) => {
        self.cancel();
        self.ticket = None;
        Err(QueryError::Cancelled)
      }
    }
  }
}

impl Future for RequestHandle {
  type Output = Outcome;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = &mut *self;
    let outcome = match &mut this.state {
      State::Ready(outcome) => outcome.take().unwrap_or(Err(QueryError::Cancelled)),
      State::Waiting(rx) => match Pin::new(rx).poll(cx) {
        // A dropped sender means the driver went away without an answer
        Poll::Ready(result) => result.unwrap_or(Err(QueryError::Cancelled)),
        Poll::Pending => return Poll::Pending,
      },
    };
    this.ticket = None;
    Poll::Ready(outcome)
  }
}

impl Drop for RequestHandle {
  fn drop(&mut self) {
    if let Some(ticket) = self.ticket.take() {
      ticket.withdraw();
    }
  }
}

impl std::fmt::Debug for RequestHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RequestHandle")
      .field("key", &self.key)
      .field("ready", &self.is_ready())
      .field("pending", &self.ticket.is_some())
      .finish()
  }
}

/// Detached cancellation capability for one waiter.
///
/// Cheap to clone; cancelling more than once is a no-op.
#[derive(Clone)]
pub struct CancelHandle {
  key: RequestKey,
  ticket: Option<Ticket>,
}

impl CancelHandle {
  pub fn key(&self) -> RequestKey {
    self.key
  }

  pub(super) fn belongs_to(&self, shared: &Arc<Shared>) -> bool {
    self
      .ticket
      .as_ref()
      .is_some_and(|t| std::ptr::eq(t.shared.as_ptr(), Arc::as_ptr(shared)))
  }

  pub(super) fn cancel(&self) -> bool {
    self.ticket.as_ref().is_some_and(Ticket::withdraw)
  }
}

impl std::fmt::Debug for CancelHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CancelHandle").field("key", &self.key).finish_non_exhaustive()
  }
}
