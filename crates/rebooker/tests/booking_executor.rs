mod support;

use std::time::Duration;

use rebooker::booking::{BookingExecutor, BookingResult, RetryPolicy};
use rebooker::client::{BookingOutcome, Credentials, SchedulingApi};
use rebooker::error::BotError;
use rebooker::types::TimeSlot;
use tokio_test::{assert_err, assert_ok};

use support::{date, reset, target, timeout, ScriptedApi, CONFIRMED_URL, FORM_URL};

async fn session(api: &ScriptedApi) -> rebooker::client::Session {
    api.login(&Credentials::new("me@example.com", "secret"))
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_success_after_two_resets() {
    let api = ScriptedApi::new()
        .submit(Err(reset("booking")))
        .submit(Err(timeout("booking")))
        .submit(Ok(BookingOutcome::from_location(CONFIRMED_URL)));
    let target = target();
    let retry = RetryPolicy::default();
    let session = session(&api).await;

    let start = tokio::time::Instant::now();
    let result = assert_ok!(
        BookingExecutor::new(&api, &target, false, &retry)
            .execute(&session, date("2026-05-01"))
            .await
    );

    assert!(matches!(result, BookingResult::Confirmed { dry_run: false, .. }));
    assert_eq!(api.calls().submits, 3);
    // Two backoffs between three submissions
    assert!(start.elapsed() >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_three_attempts() {
    let api = ScriptedApi::new()
        .submit(Err(reset("booking")))
        .submit(Err(reset("booking")))
        .submit(Err(reset("booking")))
        .submit(Ok(BookingOutcome::from_location(CONFIRMED_URL)));
    let target = target();
    let retry = RetryPolicy::default();
    let session = session(&api).await;

    let result = BookingExecutor::new(&api, &target, false, &retry)
        .execute(&session, date("2026-05-01"))
        .await
        .unwrap();

    match result {
        BookingResult::Failed {
            attempts, error, ..
        } => {
            assert_eq!(attempts, 3);
            assert!(error.requires_reauth());
        }
        other => panic!("expected Failed, got {:?}", other),
    }
    assert_eq!(api.calls().submits, 3);
}

#[tokio::test(start_paused = true)]
async fn test_non_transport_errors_are_not_retried() {
    let api = ScriptedApi::new().submit(Err(BotError::auth("booking", "refused")));
    let target = target();
    let retry = RetryPolicy::default();
    let session = session(&api).await;

    let result = BookingExecutor::new(&api, &target, false, &retry)
        .execute(&session, date("2026-05-01"))
        .await
        .unwrap();

    assert!(matches!(result, BookingResult::Failed { attempts: 1, .. }));
    assert_eq!(api.calls().submits, 1);
}

#[tokio::test(start_paused = true)]
async fn test_dry_run_never_submits() {
    let api = ScriptedApi::new();
    let target = target();
    let retry = RetryPolicy::default();
    let session = session(&api).await;

    let result = BookingExecutor::new(&api, &target, true, &retry)
        .execute(&session, date("2026-05-01"))
        .await
        .unwrap();

    match result {
        BookingResult::Confirmed { slot, dry_run } => {
            assert!(dry_run);
            assert_eq!(slot.date, date("2026-05-01"));
            assert_eq!(slot.time, TimeSlot::new("09:00"));
        }
        other => panic!("expected dry-run confirmation, got {:?}", other),
    }
    assert_eq!(api.calls().times, 1);
    assert_eq!(api.calls().submits, 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_time_means_no_slot() {
    let api = ScriptedApi::new().times(Ok(None));
    let target = target();
    let retry = RetryPolicy::default();
    let session = session(&api).await;

    let result = BookingExecutor::new(&api, &target, false, &retry)
        .execute(&session, date("2026-05-01"))
        .await
        .unwrap();

    assert!(matches!(result, BookingResult::NoSlot { .. }));
    assert!(result.confirmed_slot().is_none());
    assert_eq!(api.calls().submits, 0);
}

#[tokio::test(start_paused = true)]
async fn test_time_lookup_errors_propagate() {
    let api = ScriptedApi::new().times(Err(BotError::protocol("available_times", "not JSON")));
    let target = target();
    let retry = RetryPolicy::default();
    let session = session(&api).await;

    let err = assert_err!(
        BookingExecutor::new(&api, &target, false, &retry)
            .execute(&session, date("2026-05-01"))
            .await
    );

    assert!(matches!(err, BotError::Protocol { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_and_unverified_are_not_confirmed() {
    let api = ScriptedApi::new()
        .submit(Ok(BookingOutcome::from_location(FORM_URL)))
        .submit(Ok(BookingOutcome::from_location(
            "https://site.test/en-ca/niv/groups/42",
        )));
    let target = target();
    let retry = RetryPolicy::default();
    let session = session(&api).await;
    let executor = BookingExecutor::new(&api, &target, false, &retry);

    let rejected = executor.execute(&session, date("2026-05-01")).await.unwrap();
    assert!(matches!(rejected, BookingResult::Rejected { .. }));
    assert!(rejected.confirmed_slot().is_none());

    let unverified = executor.execute(&session, date("2026-05-01")).await.unwrap();
    match &unverified {
        BookingResult::Unverified { location, .. } => assert!(location.ends_with("/groups/42")),
        other => panic!("expected Unverified, got {:?}", other),
    }
    assert!(unverified.confirmed_slot().is_none());
    // Neither outcome is retried
    assert_eq!(api.calls().submits, 2);
}

#[tokio::test(start_paused = true)]
async fn test_custom_retry_policy() {
    let api = ScriptedApi::new()
        .submit(Err(timeout("booking")))
        .submit(Err(timeout("booking")));
    let target = target();
    let retry = RetryPolicy {
        max_attempts: 1,
        backoff: Duration::from_millis(10),
    };
    let session = session(&api).await;

    let result = BookingExecutor::new(&api, &target, false, &retry)
        .execute(&session, date("2026-05-01"))
        .await
        .unwrap();

    assert!(matches!(result, BookingResult::Failed { attempts: 1, .. }));
    assert_eq!(api.calls().submits, 1);
}
