//! Drivers that die without an outcome, and admission across runtimes.

#[cfg(test)]
mod tests {
  use std::{
    sync::{
      Arc,
      atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
  };

  use async_trait::async_trait;
  use lens_core::{CodeFragment, QueryError, QueryParams, RawResponse};
  use llm::QueryClient;

  use crate::{
    cache::ResponseCache,
    coordinator::{
      Coordinator,
      __tests__::helpers::{ScriptedClient, coordinator, explain, fast_retry, fragment, options},
    },
  };

  /// Panics on its first call, answers normally afterwards
  struct PanicOnceClient {
    calls: AtomicUsize,
  }

  #[async_trait]
  impl QueryClient for PanicOnceClient {
    fn name(&self) -> &str {
      "panic-once"
    }

    async fn send(&self, _fragment: &CodeFragment, _params: &QueryParams) -> Result<RawResponse, QueryError> {
      if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
        panic!("client bug");
      }
      Ok(RawResponse::markdown("recovered"))
    }
  }

  #[tokio::test]
  async fn test_client_panic_resolves_every_waiter() {
    let client = Arc::new(PanicOnceClient {
      calls: AtomicUsize::new(0),
    });
    let coord = Coordinator::new(
      client.clone(),
      Arc::new(ResponseCache::new(64, 1 << 20, None)),
      options(2, fast_retry(3)),
    );

    let first = coord.request(&fragment("class Foo {}"), &explain());
    let second = coord.request(&fragment("class Foo {}"), &explain());
    let key = first.key();

    let (first, second) = tokio::join!(
      tokio::time::timeout(Duration::from_secs(2), first),
      tokio::time::timeout(Duration::from_secs(2), second),
    );
    assert!(matches!(first.expect("first waiter resolved"), Err(QueryError::Network(_))));
    assert!(matches!(second.expect("second waiter resolved"), Err(QueryError::Network(_))));
    assert!(!coord.is_pending(&key));
    assert_eq!(coord.stats().in_flight, 0);

    // The key is free again and the next request goes out normally
    let doc = coord.request(&fragment("class Foo {}"), &explain()).await.unwrap();
    assert_eq!(doc.plain_text(), "recovered");
    assert_eq!(client.calls.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn test_admission_survives_runtime_shutdown() {
    let client = ScriptedClient::always("ok", Duration::ZERO);
    let coord = coordinator(client.clone(), options(1, fast_retry(0)));

    let first_runtime = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .unwrap();
    let doc = first_runtime
      .block_on(async { coord.request(&fragment("class A {}"), &explain()).await })
      .unwrap();
    assert_eq!(doc.plain_text(), "ok");
    // Takes the admission task down with it
    drop(first_runtime);

    let second_runtime = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .unwrap();
    let doc = second_runtime
      .block_on(async { coord.request(&fragment("class B {}"), &explain()).await })
      .unwrap();
    assert_eq!(doc.plain_text(), "ok");
    assert_eq!(client.calls(), 2);
  }
}
