//! Concurrency limit and FIFO admission.

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use futures::future::join_all;

  use crate::coordinator::__tests__::helpers::{ScriptedClient, coordinator, explain, fast_retry, fragment, options};

  #[tokio::test]
  async fn test_concurrency_limit_respected() {
    let client = ScriptedClient::always("ok", Duration::from_millis(30));
    let coord = coordinator(client.clone(), options(2, fast_retry(0)));

    let handles: Vec<_> = (0..6)
      .map(|i| coord.request(&fragment(&format!("class C{i} {{}}")), &explain()))
      .collect();
    assert_eq!(coord.stats().in_flight, 6);

    for result in join_all(handles).await {
      assert!(result.is_ok());
    }
    assert_eq!(client.calls(), 6);
    assert_eq!(client.max_active(), 2);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_slots_granted_in_submission_order() {
    let client = ScriptedClient::always("ok", Duration::from_millis(5));
    let coord = coordinator(client.clone(), options(1, fast_retry(0)));

    let texts: Vec<String> = (0..8).map(|i| format!("class C{i} {{}}")).collect();
    let handles: Vec<_> = texts.iter().map(|t| coord.request(&fragment(t), &explain())).collect();
    join_all(handles).await;

    assert_eq!(client.order(), texts);
    assert_eq!(client.max_active(), 1);
  }

  #[tokio::test]
  async fn test_zero_limit_treated_as_one() {
    let client = ScriptedClient::always("ok", Duration::from_millis(5));
    let coord = coordinator(client.clone(), options(0, fast_retry(0)));

    let a = coord.request(&fragment("class A {}"), &explain());
    let b = coord.request(&fragment("class B {}"), &explain());
    let (a, b) = tokio::join!(a, b);
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(client.max_active(), 1);
  }
}
