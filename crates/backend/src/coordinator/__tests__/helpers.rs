//! Test helpers for coordinator scenario tests.
//!
//! Provides `ScriptedClient`, a `QueryClient` that replays a fixed script of
//! replies and failures while recording how it was called.

use std::{
  collections::VecDeque,
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use lens_core::{CodeFragment, Language, QueryError, QueryParams, RawResponse};
use llm::QueryClient;

use crate::{
  cache::ResponseCache,
  coordinator::{Coordinator, CoordinatorOptions},
  retry::RetryPolicy,
};

/// One scripted call: wait `delay`, then return `result`
#[derive(Clone)]
pub struct Step {
  pub delay: Duration,
  pub result: Result<RawResponse, QueryError>,
}

impl Step {
  pub fn reply(content: &str) -> Self {
    Self {
      delay: Duration::ZERO,
      result: Ok(RawResponse::markdown(content)),
    }
  }

  pub fn fail(error: QueryError) -> Self {
    Self {
      delay: Duration::ZERO,
      result: Err(error),
    }
  }

  pub fn after(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }
}

/// Replays `script` in order, then repeats `fallback` forever
pub struct ScriptedClient {
  script: Mutex<VecDeque<Step>>,
  fallback: Step,
  calls: AtomicUsize,
  completed: AtomicUsize,
  active: AtomicUsize,
  max_active: AtomicUsize,
  order: Mutex<Vec<String>>,
}

impl ScriptedClient {
  pub fn new(script: Vec<Step>, fallback: Step) -> Arc<Self> {
    Arc::new(Self {
      script: Mutex::new(script.into()),
      fallback,
      calls: AtomicUsize::new(0),
      completed: AtomicUsize::new(0),
      active: AtomicUsize::new(0),
      max_active: AtomicUsize::new(0),
      order: Mutex::new(Vec::new()),
    })
  }

  /// Every call answers with `content` after `delay`
  pub fn always(content: &str, delay: Duration) -> Arc<Self> {
    Self::new(Vec::new(), Step::reply(content).after(delay))
  }

  /// Calls started
  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  /// Calls that ran to the end of their delay
  pub fn completed(&self) -> usize {
    self.completed.load(Ordering::SeqCst)
  }

  pub fn max_active(&self) -> usize {
    self.max_active.load(Ordering::SeqCst)
  }

  /// Fragment texts in the order calls started
  pub fn order(&self) -> Vec<String> {
    self.order.lock().unwrap().clone()
  }
}

/// Decrements the active count even when the call future is dropped
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::SeqCst);
  }
}

#[async_trait]
impl QueryClient for ScriptedClient {
  fn name(&self) -> &str {
    "scripted"
  }

  async fn send(&self, fragment: &CodeFragment, _params: &QueryParams) -> Result<RawResponse, QueryError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.order.lock().unwrap().push(fragment.text().to_string());

    let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_active.fetch_max(active, Ordering::SeqCst);
    let _guard = ActiveGuard(&self.active);

    let step = self
      .script
      .lock()
      .unwrap()
      .pop_front()
      .unwrap_or_else(|| self.fallback.clone());

    if !step.delay.is_zero() {
      tokio::time::sleep(step.delay).await;
    }
    self.completed.fetch_add(1, Ordering::SeqCst);
    step.result
  }
}

pub fn fragment(text: &str) -> CodeFragment {
  CodeFragment::new("com.example.Foo", text, Language::Java)
}

pub fn explain() -> QueryParams {
  QueryParams::new().with("question", "What does this do?")
}

/// Millisecond backoffs without jitter
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
  RetryPolicy {
    max_retries,
    initial_backoff: Duration::from_millis(1),
    max_backoff: Duration::from_millis(5),
    backoff_multiplier: 2.0,
    add_jitter: false,
  }
}

pub fn options(max_concurrent: usize, retry: RetryPolicy) -> CoordinatorOptions {
  CoordinatorOptions {
    max_concurrent,
    call_timeout: Duration::from_secs(5),
    retry,
  }
}

pub fn coordinator(client: Arc<ScriptedClient>, options: CoordinatorOptions) -> Coordinator {
  Coordinator::new(client, Arc::new(ResponseCache::new(64, 1 << 20, None)), options)
}
