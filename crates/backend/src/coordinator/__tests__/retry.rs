//! Retry behaviour of the coordinator driver.

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use lens_core::QueryError;

  use crate::coordinator::__tests__::helpers::{
    ScriptedClient, Step, coordinator, explain, fast_retry, fragment, options,
  };

  fn rate_limited() -> Step {
    Step::fail(QueryError::RateLimited {
      retry_after: Some(Duration::from_millis(2)),
    })
  }

  #[tokio::test]
  async fn test_rate_limited_three_times_then_success() {
    let client = ScriptedClient::new(
      vec![rate_limited(), rate_limited(), rate_limited()],
      Step::reply("## Foo"),
    );
    let coord = coordinator(client.clone(), options(2, fast_retry(3)));

    let doc = coord.request(&fragment("class Foo {}"), &explain()).await.unwrap();
    assert_eq!(doc.plain_text(), "Foo");

    let stats = coord.stats();
    assert_eq!(stats.retries, 3);
    assert_eq!(stats.outbound_calls, 4);
    assert_eq!(client.calls(), 4);
  }

  #[tokio::test]
  async fn test_transient_errors_exhaust_retries() {
    let client = ScriptedClient::new(Vec::new(), Step::fail(QueryError::Timeout));
    let coord = coordinator(client.clone(), options(2, fast_retry(2)));

    let err = coord.request(&fragment("class Foo {}"), &explain()).await.unwrap_err();
    assert_eq!(err, QueryError::Timeout);
    assert_eq!(client.calls(), 3);
    assert_eq!(coord.stats().retries, 2);
    assert!(coord.cache().is_empty());
  }

  #[tokio::test]
  async fn test_server_errors_5xx_retried() {
    let client = ScriptedClient::new(
      vec![Step::fail(QueryError::from_status(503, "unavailable", None))],
      Step::reply("ok"),
    );
    let coord = coordinator(client.clone(), options(2, fast_retry(3)));

    assert!(coord.request(&fragment("class Foo {}"), &explain()).await.is_ok());
    assert_eq!(client.calls(), 2);
  }

  #[tokio::test]
  async fn test_permanent_errors_never_retried() {
    for error in [
      QueryError::from_status(400, "bad request", None),
      QueryError::from_status(401, "unauthorized", None),
      QueryError::malformed("missing content"),
    ] {
      let client = ScriptedClient::new(vec![Step::fail(error.clone())], Step::reply("unused"));
      let coord = coordinator(client.clone(), options(2, fast_retry(3)));

      let err = coord.request(&fragment("class Foo {}"), &explain()).await.unwrap_err();
      assert_eq!(err, error);
      assert_eq!(client.calls(), 1);
      assert_eq!(coord.stats().retries, 0);
    }
  }

  #[tokio::test]
  async fn test_slow_call_times_out_and_retries() {
    let client = ScriptedClient::new(vec![Step::reply("late").after(Duration::from_secs(5))], Step::reply("ok"));
    let mut opts = options(1, fast_retry(1));
    opts.call_timeout = Duration::from_millis(50);
    let coord = coordinator(client.clone(), opts);

    let doc = coord.request(&fragment("class Foo {}"), &explain()).await.unwrap();
    assert_eq!(doc.plain_text(), "ok");
    assert_eq!(client.calls(), 2);
    assert_eq!(client.completed(), 1);
  }

  #[tokio::test]
  async fn test_slot_released_during_backoff() {
    // One slot; the first key backs off for a while, the second key must not wait for it
    let client = ScriptedClient::new(
      vec![Step::fail(QueryError::RateLimited {
        retry_after: Some(Duration::from_millis(300)),
      })],
      Step::reply("ok"),
    );
    let mut retry = fast_retry(1);
    retry.max_backoff = Duration::from_secs(1);
    let coord = coordinator(client.clone(), options(1, retry));

    let slow = coord.request(&fragment("class Slow {}"), &explain());
    let fast = coord.request(&fragment("class Fast {}"), &explain());

    let started = std::time::Instant::now();
    assert!(fast.await.is_ok());
    assert!(started.elapsed() < Duration::from_millis(250));
    assert!(slow.await.is_ok());
    assert_eq!(client.order(), vec!["class Slow {}", "class Fast {}", "class Slow {}"]);
  }
}
