//! Deduplication and caching through the coordinator.

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use futures::future::join_all;
  use lens_core::{ProseStyle, QueryError};

  use crate::coordinator::__tests__::helpers::{
    ScriptedClient, Step, coordinator, explain, fast_retry, fragment, options,
  };

  #[tokio::test]
  async fn test_concurrent_callers_share_one_call() {
    let client = ScriptedClient::always("## Foo\n\nDoes foo things.", Duration::from_millis(50));
    let coord = coordinator(client.clone(), options(4, fast_retry(0)));

    let handles: Vec<_> = (0..10).map(|_| coord.request(&fragment("class Foo {}"), &explain())).collect();
    assert!(coord.is_pending(&handles[0].key()));
    assert_eq!(coord.stats().in_flight, 1);

    let results = join_all(handles).await;
    assert_eq!(client.calls(), 1);

    let first = results[0].as_ref().unwrap();
    for result in &results {
      // Every waiter gets the same shared document
      assert!(std::sync::Arc::ptr_eq(first, result.as_ref().unwrap()));
    }

    let stats = coord.stats();
    assert_eq!(stats.outbound_calls, 1);
    assert_eq!(stats.joined, 9);
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.in_flight, 0);
  }

  #[tokio::test]
  async fn test_second_request_served_from_cache() {
    let client = ScriptedClient::always("## Foo", Duration::ZERO);
    let coord = coordinator(client.clone(), options(4, fast_retry(0)));

    let doc = coord.request(&fragment("class Foo {}"), &explain()).await.unwrap();
    assert_eq!(doc.prose().next().unwrap().style, ProseStyle::Heading { level: 2 });

    let handle = coord.request(&fragment("class Foo {}"), &explain());
    assert!(handle.is_ready());
    let again = handle.await.unwrap();

    assert_eq!(*doc, *again);
    assert_eq!(client.calls(), 1);
    assert_eq!(coord.stats().cache_hits, 1);
    assert_eq!(coord.cache().len(), 1);
  }

  #[tokio::test]
  async fn test_different_params_are_different_requests() {
    let client = ScriptedClient::always("ok", Duration::ZERO);
    let coord = coordinator(client.clone(), options(4, fast_retry(0)));

    let a = coord.request(&fragment("class Foo {}"), &explain());
    let b = coord.request(&fragment("class Foo {}"), &explain().with("depth", "deep"));
    assert_ne!(a.key(), b.key());

    let (a, b) = tokio::join!(a, b);
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(client.calls(), 2);
  }

  #[tokio::test]
  async fn test_error_reaches_every_waiter() {
    let client = ScriptedClient::new(
      vec![Step::fail(QueryError::from_status(400, "bad request", None)).after(Duration::from_millis(20))],
      Step::reply("unused"),
    );
    let coord = coordinator(client.clone(), options(4, fast_retry(3)));

    let handles: Vec<_> = (0..3).map(|_| coord.request(&fragment("class Foo {}"), &explain())).collect();
    for result in join_all(handles).await {
      assert_eq!(
        result.unwrap_err(),
        QueryError::ServerError {
          code: 400,
          message: "bad request".to_string()
        }
      );
    }
    assert_eq!(client.calls(), 1);
    assert_eq!(coord.stats().retries, 0);
    assert!(coord.cache().is_empty());
  }

  #[tokio::test]
  async fn test_render_failure_is_not_cached() {
    let client = ScriptedClient::new(vec![Step::reply("```java\nclass Foo {")], Step::reply("## Fixed"));
    let coord = coordinator(client.clone(), options(4, fast_retry(3)));

    let err = coord.request(&fragment("class Foo {}"), &explain()).await.unwrap_err();
    assert!(matches!(err, QueryError::Malformed(_)));
    assert_eq!(client.calls(), 1);
    assert!(coord.cache().is_empty());

    // The next request goes back to the service
    let doc = coord.request(&fragment("class Foo {}"), &explain()).await.unwrap();
    assert_eq!(doc.plain_text(), "Fixed");
    assert_eq!(client.calls(), 2);
  }
}
