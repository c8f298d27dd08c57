//! Cancellation, drop and caller deadlines.

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use lens_core::QueryError;

  use crate::coordinator::__tests__::helpers::{
    ScriptedClient, Step, coordinator, explain, fast_retry, fragment, options,
  };

  #[tokio::test]
  async fn test_cancel_sole_waiter_leaves_clean_slate() {
    let client = ScriptedClient::new(vec![Step::reply("first").after(Duration::from_secs(10))], Step::reply("second"));
    let coord = coordinator(client.clone(), options(2, fast_retry(0)));

    let handle = coord.request(&fragment("class Foo {}"), &explain());
    let key = handle.key();
    // Let the driver start its call
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(client.calls(), 1);

    assert!(handle.cancel());
    assert!(!coord.is_pending(&key));
    assert_eq!(handle.await.unwrap_err(), QueryError::Cancelled);

    let doc = coord.request(&fragment("class Foo {}"), &explain()).await.unwrap();
    assert_eq!(doc.plain_text(), "second");
    assert_eq!(client.calls(), 2);
    // The first call was aborted, not waited out
    assert_eq!(client.completed(), 1);

    let stats = coord.stats();
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.in_flight, 0);
  }

  #[tokio::test]
  async fn test_cancel_one_of_many_waiters() {
    let client = ScriptedClient::always("shared", Duration::from_millis(50));
    let coord = coordinator(client.clone(), options(2, fast_retry(0)));

    let keep = coord.request(&fragment("class Foo {}"), &explain());
    let drop_me = coord.request(&fragment("class Foo {}"), &explain());
    let cancel = drop_me.cancel_handle();

    assert!(coord.cancel(&cancel));
    assert!(!coord.cancel(&cancel));
    assert!(coord.is_pending(&keep.key()));

    assert_eq!(drop_me.await.unwrap_err(), QueryError::Cancelled);
    assert_eq!(keep.await.unwrap().plain_text(), "shared");
    assert_eq!(client.calls(), 1);
  }

  #[tokio::test]
  async fn test_cancel_after_resolution_is_noop() {
    let client = ScriptedClient::always("done", Duration::ZERO);
    let coord = coordinator(client.clone(), options(2, fast_retry(0)));

    let handle = coord.request(&fragment("class Foo {}"), &explain());
    let cancel = handle.cancel_handle();
    assert!(handle.await.is_ok());
    assert!(!coord.cancel(&cancel));

    // Cache hits resolve immediately and cannot be cancelled
    let cached = coord.request(&fragment("class Foo {}"), &explain());
    assert!(!cached.cancel());
    assert!(cached.await.is_ok());
    assert_eq!(coord.stats().cancelled, 0);
  }

  #[tokio::test]
  async fn test_cancel_handle_from_other_coordinator_rejected() {
    let client = ScriptedClient::always("x", Duration::from_millis(50));
    let first = coordinator(client.clone(), options(2, fast_retry(0)));
    let second = coordinator(client.clone(), options(2, fast_retry(0)));

    let handle = first.request(&fragment("class Foo {}"), &explain());
    assert!(!second.cancel(&handle.cancel_handle()));
    assert!(handle.await.is_ok());
  }

  #[tokio::test]
  async fn test_dropping_handle_withdraws_interest() {
    let client = ScriptedClient::always("late", Duration::from_secs(10));
    let coord = coordinator(client.clone(), options(2, fast_retry(0)));

    let handle = coord.request(&fragment("class Foo {}"), &explain());
    let key = handle.key();
    drop(handle);

    assert!(!coord.is_pending(&key));
    assert_eq!(coord.stats().cancelled, 1);
  }

  #[tokio::test]
  async fn test_cancel_during_backoff_stops_retries() {
    let client = ScriptedClient::new(Vec::new(), Step::fail(QueryError::network("connection reset")));
    let mut retry = fast_retry(5);
    retry.initial_backoff = Duration::from_secs(10);
    retry.max_backoff = Duration::from_secs(10);
    let coord = coordinator(client.clone(), options(2, retry));

    let handle = coord.request(&fragment("class Foo {}"), &explain());
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(client.calls(), 1);

    assert!(handle.cancel());
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(client.calls(), 1);
    assert_eq!(coord.stats().in_flight, 0);
  }

  #[tokio::test]
  async fn test_wait_timeout_only_affects_that_caller() {
    let client = ScriptedClient::always("slow answer", Duration::from_millis(200));
    let coord = coordinator(client.clone(), options(2, fast_retry(0)));

    let impatient = coord.request(&fragment("class Foo {}"), &explain());
    let patient = coord.request(&fragment("class Foo {}"), &explain());

    let err = impatient.wait_timeout(Duration::from_millis(20)).await.unwrap_err();
    assert_eq!(err, QueryError::Cancelled);
    assert_eq!(patient.await.unwrap().plain_text(), "slow answer");
    assert_eq!(client.calls(), 1);
    assert_eq!(coord.stats().cancelled, 1);
  }

  #[tokio::test]
  async fn test_wait_timeout_returns_result_in_time() {
    let client = ScriptedClient::always("quick", Duration::ZERO);
    let coord = coordinator(client.clone(), options(2, fast_retry(0)));

    let doc = coord
      .request(&fragment("class Foo {}"), &explain())
      .wait_timeout(Duration::from_secs(5))
      .await
      .unwrap();
    assert_eq!(doc.plain_text(), "quick");
  }
}
