//! Request coordinator
//!
//! Sits between callers and the remote query client. For every request it
//!
//! - answers from the response cache when possible,
//! - joins callers asking for the same key onto one outbound call,
//! - admits outbound calls FIFO under a global concurrency limit,
//! - retries transient failures with backoff,
//! - and aborts a call once every caller has lost interest.
//!
//! # Usage
//!
//! ```ignore
//! let coordinator = Coordinator::from_config(&config)?;
//! let handle = coordinator.request(&fragment, &params);
//! let document = handle.await?;
//! ```

mod handle;

#[cfg(test)]
mod __tests__;

use std::{
  collections::HashMap,
  sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
  },
  time::{Duration, Instant},
};

use dashmap::{DashMap, mapref::entry::Entry};
use lens_core::{CodeFragment, Config, QueryError, QueryParams, RequestKey};
use llm::{ClientError, HttpQueryClient, QueryClient};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

pub use handle::{CancelHandle, Outcome, RequestHandle};

use crate::{cache::ResponseCache, retry::RetryPolicy};

type SlotSender = oneshot::Sender<OwnedSemaphorePermit>;

// ============================================================================
// Options & Stats
// ============================================================================

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
  /// Maximum outbound calls in flight at once (minimum 1)
  pub max_concurrent: usize,
  /// Upper bound on a single outbound call
  pub call_timeout: Duration,
  pub retry: RetryPolicy,
}

impl CoordinatorOptions {
  pub fn from_config(config: &Config) -> Self {
    Self {
      max_concurrent: config.coordinator.max_concurrent,
      call_timeout: config.request_timeout(),
      retry: RetryPolicy::from_config(&config.retry),
    }
  }
}

impl Default for CoordinatorOptions {
  fn default() -> Self {
    Self::from_config(&Config::default())
  }
}

/// Counters since the coordinator was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
  /// Calls handed to the query client, retries included
  pub outbound_calls: u64,
  pub retries: u64,
  pub cache_hits: u64,
  pub cache_misses: u64,
  /// Requests that joined an existing in-flight call
  pub joined: u64,
  /// Waiters withdrawn by cancel, drop or caller deadline
  pub cancelled: u64,
  /// Keys with a pending outbound call right now
  pub in_flight: usize,
}

#[derive(Default)]
struct Counters {
  outbound_calls: AtomicU64,
  retries: AtomicU64,
  cache_hits: AtomicU64,
  cache_misses: AtomicU64,
  joined: AtomicU64,
  cancelled: AtomicU64,
}

fn bump(counter: &AtomicU64) {
  counter.fetch_add(1, Ordering::Relaxed);
}

// ============================================================================
// Pending requests
// ============================================================================

struct PendingRequest {
  waiters: HashMap<u64, oneshot::Sender<Outcome>>,
  cancel: CancellationToken,
  started: Instant,
  /// Distinguishes this request from a later one on the same key
  generation: u64,
}

pub(crate) struct Shared {
  client: Arc<dyn QueryClient>,
  cache: Arc<ResponseCache>,
  pending: DashMap<RequestKey, PendingRequest>,
  slots: Arc<Semaphore>,
  /// Sender into the admission task; replaced if that task has gone away
  admission: Mutex<Option<mpsc::UnboundedSender<SlotSender>>>,
  options: CoordinatorOptions,
  next_generation: AtomicU64,
  next_waiter: AtomicU64,
  counters: Counters,
}

impl Shared {
  /// Queue for a concurrency slot. Slots are granted in queue order.
  ///
  /// The admission task lives on the runtime that first needed it. If that
  /// runtime has shut down since, a new task is started on the current one.
  fn enqueue_for_slot(&self) -> oneshot::Receiver<OwnedSemaphorePermit> {
    let (tx, rx) = oneshot::channel();
    let mut admission = self.admission.lock().unwrap_or_else(PoisonError::into_inner);

    let tx = match admission.as_ref() {
      Some(queue) => match queue.send(tx) {
        Ok(()) => return rx,
        Err(mpsc::error::SendError(tx)) => {
          debug!("Admission task gone, restarting it");
          tx
        }
      },
      None => tx,
    };

    let (queue_tx, queue_rx) = mpsc::unbounded_channel();
    tokio::spawn(admit(queue_rx, self.slots.clone()));
    // The receiver was just created, so this cannot fail
    let _ = queue_tx.send(tx);
    *admission = Some(queue_tx);
    rx
  }

  /// Remove one waiter, resolving it to `Cancelled`. When it was the last
  /// waiter the outbound call is aborted and the key is free again.
  fn withdraw(&self, key: RequestKey, generation: u64, waiter: u64) -> bool {
    let Entry::Occupied(mut entry) = self.pending.entry(key) else {
      return false;
    };
    if entry.get().generation != generation {
      return false;
    }
    let Some(tx) = entry.get_mut().waiters.remove(&waiter) else {
      return false;
    };

    let _ = tx.send(Err(QueryError::Cancelled));
    bump(&self.counters.cancelled);

    let remaining = entry.get().waiters.len();
    if remaining == 0 {
      let pending = entry.remove();
      pending.cancel.cancel();
      info!(
        key = %key.short(),
        elapsed_ms = pending.started.elapsed().as_millis() as u64,
        "All waiters cancelled, aborting request"
      );
    } else {
      debug!(key = %key.short(), remaining, "Waiter cancelled");
    }
    true
  }

  /// Deliver the outcome to every waiter of this generation
  fn finish(&self, key: RequestKey, generation: u64, outcome: Outcome) {
    let Some((_, pending)) = self.pending.remove_if(&key, |_, p| p.generation == generation) else {
      return;
    };

    let elapsed_ms = pending.started.elapsed().as_millis() as u64;
    match &outcome {
      Ok(doc) => info!(
        key = %key.short(),
        waiters = pending.waiters.len(),
        blocks = doc.len(),
        elapsed_ms,
        "Request succeeded"
      ),
      Err(e) => warn!(
        key = %key.short(),
        waiters = pending.waiters.len(),
        error = %e,
        kind = e.kind(),
        elapsed_ms,
        "Request failed"
      ),
    }

    for (_, tx) in pending.waiters {
      let _ = tx.send(outcome.clone());
    }
  }

  /// Call the client until success, a permanent error, or retries run out
  async fn run(
    &self,
    key: RequestKey,
    fragment: &CodeFragment,
    params: &QueryParams,
    first_slot: oneshot::Receiver<OwnedSemaphorePermit>,
  ) -> Outcome {
    let mut slot = first_slot;
    let mut retries = 0;

    loop {
      let result = {
        let _permit = slot.await.map_err(|_| QueryError::network("admission queue closed"))?;
        bump(&self.counters.outbound_calls);
        debug!(key = %key.short(), attempt = retries + 1, client = self.client.name(), "Sending query");

        match tokio::time::timeout(self.options.call_timeout, self.client.send(fragment, params)).await {
          Ok(result) => result,
          Err(_) => Err(QueryError::Timeout),
        }
      };

      let error = match result {
        Ok(raw) => {
          let document = render::render(&raw)?;
          self.cache.put(key, raw);
          return Ok(Arc::new(document));
        }
        Err(e) => e,
      };

      let Some(backoff) = self.options.retry.delay_for(&error, retries) else {
        if error.is_transient() {
          warn!(key = %key.short(), retries, error = %error, "All retries exhausted");
        }
        return Err(error);
      };

      retries += 1;
      bump(&self.counters.retries);
      warn!(
        key = %key.short(),
        attempt = retries,
        max_retries = self.options.retry.max_retries,
        backoff_ms = backoff.as_millis() as u64,
        error = %error,
        "Retryable error, will retry"
      );
      tokio::time::sleep(backoff).await;
      slot = self.enqueue_for_slot();
    }
  }
}

/// Hand out concurrency slots in the order drivers queued for them
async fn admit(mut queue: mpsc::UnboundedReceiver<SlotSender>, slots: Arc<Semaphore>) {
  while let Some(waiter) = queue.recv().await {
    if waiter.is_closed() {
      continue;
    }
    let Ok(permit) = slots.clone().acquire_owned().await else {
      break;
    };
    // A driver that gave up meanwhile drops the permit straight back
    let _ = waiter.send(permit);
  }
  trace!("Admission queue closed");
}

/// Resolves the waiters of one generation when its driver goes away without
/// an outcome: a panic in the client or renderer, or runtime shutdown.
struct DriverGuard {
  shared: Arc<Shared>,
  key: RequestKey,
  generation: u64,
  armed: bool,
}

impl Drop for DriverGuard {
  fn drop(&mut self) {
    if !self.armed {
      return;
    }
    error!(key = %self.key.short(), generation = self.generation, "Request driver stopped without an outcome");
    self.shared.finish(
      self.key,
      self.generation,
      Err(QueryError::network("request driver stopped without an outcome")),
    );
  }
}

/// Performs, and retries, the outbound call for one pending request
async fn drive(
  shared: Arc<Shared>,
  key: RequestKey,
  generation: u64,
  fragment: CodeFragment,
  params: QueryParams,
  first_slot: oneshot::Receiver<OwnedSemaphorePermit>,
  cancel: CancellationToken,
) {
  let mut guard = DriverGuard {
    shared: shared.clone(),
    key,
    generation,
    armed: true,
  };

  let outcome = tokio::select! {
    biased;
    _ = cancel.cancelled() => {
      guard.armed = false;
      debug!(key = %key.short(), "Driver stopped, no waiters left");
      return;
    }
    outcome = shared.run(key, &fragment, &params, first_slot) => outcome,
  };
  guard.armed = false;
  shared.finish(key, generation, outcome);
}

// ============================================================================
// Coordinator
// ============================================================================

/// Deduplicating, rate-limited front for a `QueryClient`.
///
/// Cheap to clone; clones share the cache, pending table and slots.
/// Requests must be made from within a Tokio runtime.
#[derive(Clone)]
pub struct Coordinator {
  shared: Arc<Shared>,
}

impl Coordinator {
  pub fn new(client: Arc<dyn QueryClient>, cache: Arc<ResponseCache>, options: CoordinatorOptions) -> Self {
    let max_concurrent = options.max_concurrent.max(1);
    Self {
      shared: Arc::new(Shared {
        client,
        cache,
        pending: DashMap::new(),
        slots: Arc::new(Semaphore::new(max_concurrent)),
        admission: Mutex::new(None),
        options,
        next_generation: AtomicU64::new(0),
        next_waiter: AtomicU64::new(0),
        counters: Counters::default(),
      }),
    }
  }

  /// Build the HTTP client, cache and options from configuration
  pub fn from_config(config: &Config) -> Result<Self, ClientError> {
    let client = HttpQueryClient::from_config(config)?;
    Ok(Self::new(
      Arc::new(client),
      Arc::new(ResponseCache::from_config(&config.cache)),
      CoordinatorOptions::from_config(config),
    ))
  }

  /// Ask for the rendered answer to `params` about `fragment`.
  ///
  /// At most one outbound call is in flight per key; concurrent callers for
  /// the same key share its outcome.
  pub fn request(&self, fragment: &CodeFragment, params: &QueryParams) -> RequestHandle {
    let shared = &self.shared;
    let key = lens_core::key(fragment, params);
    let waiter = shared.next_waiter.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = oneshot::channel();

    let (generation, start) = match shared.pending.entry(key) {
      Entry::Occupied(mut entry) => {
        let pending = entry.get_mut();
        pending.waiters.insert(waiter, tx);
        bump(&shared.counters.joined);
        debug!(key = %key.short(), waiters = pending.waiters.len(), "Joined in-flight request");
        (pending.generation, None)
      }
      Entry::Vacant(entry) => {
        if let Some(cached) = shared.cache.get(&key) {
          drop(entry);
          bump(&shared.counters.cache_hits);
          debug!(key = %key.short(), "Cache hit");
          let outcome = render::render(&cached.response).map(Arc::new);
          return RequestHandle::ready(key, outcome);
        }

        bump(&shared.counters.cache_misses);
        let generation = shared.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        entry.insert(PendingRequest {
          waiters: HashMap::from([(waiter, tx)]),
          cancel: cancel.clone(),
          started: Instant::now(),
          generation,
        });
        debug!(key = %key.short(), generation, fragment = %fragment.id(), "Starting request");
        (generation, Some(cancel))
      }
    };

    // The entry guard is released before the driver exists
    if let Some(cancel) = start {
      let first_slot = shared.enqueue_for_slot();
      tokio::spawn(drive(
        shared.clone(),
        key,
        generation,
        fragment.clone(),
        params.clone(),
        first_slot,
        cancel,
      ));
    }

    RequestHandle::waiting(
      key,
      rx,
      handle::Ticket {
        shared: Arc::downgrade(shared),
        key,
        generation,
        waiter,
      },
    )
  }

  /// Withdraw the waiter behind `handle`. Returns `false` if it already
  /// resolved, was already cancelled, or belongs to another coordinator.
  pub fn cancel(&self, handle: &CancelHandle) -> bool {
    handle.belongs_to(&self.shared) && handle.cancel()
  }

  pub fn cache(&self) -> &Arc<ResponseCache> {
    &self.shared.cache
  }

  /// Whether an outbound call for `key` is currently pending
  pub fn is_pending(&self, key: &RequestKey) -> bool {
    self.shared.pending.contains_key(key)
  }

  pub fn stats(&self) -> CoordinatorStats {
    let c = &self.shared.counters;
    CoordinatorStats {
      outbound_calls: c.outbound_calls.load(Ordering::Relaxed),
      retries: c.retries.load(Ordering::Relaxed),
      cache_hits: c.cache_hits.load(Ordering::Relaxed),
      cache_misses: c.cache_misses.load(Ordering::Relaxed),
      joined: c.joined.load(Ordering::Relaxed),
      cancelled: c.cancelled.load(Ordering::Relaxed),
      in_flight: self.shared.pending.len(),
    }
  }
}
