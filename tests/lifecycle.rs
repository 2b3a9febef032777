//! Session lifecycle integration tests
//!
//! Drives the public API against a scripted browser on a paused clock.

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use rstest::rstest;
use tokio::time::Instant;
use upload_session::session::progress;
use upload_session::types::{FailureReason, LoginOutcome};
use upload_session::{Account, Platform, ProgressEvent, VerificationResult};

use common::helpers::{DOUYIN_HOME, LOGIN_TIMEOUT, create_test_env};

#[tokio::test(start_paused = true)]
async fn test_empty_store_logs_in_and_verifies() {
    let env = create_test_env();
    env.driver
        .issue_state("douyin-session")
        .accept_state("douyin-session")
        .navigate_after_login(Duration::from_secs(20), &[DOUYIN_HOME]);
    let account = Account::default();

    let ready = env
        .manager
        .ensure_valid_session(Platform::Douyin, &account, false)
        .await
        .unwrap();
    assert!(ready);
    assert_eq!(env.driver.stats().login_sessions, 1);

    let record = env.manager.store().read(Platform::Douyin, &account).unwrap().unwrap();
    assert_eq!(record.blob, "douyin-session");

    let result = env.manager.verify(Platform::Douyin, &account).await.unwrap();
    assert!(result.valid);
    assert_eq!(result.reason, VerificationResult::ACCEPTED);
    assert_eq!(env.driver.stats().open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stale_record_survives_timed_out_login() {
    let env = create_test_env();
    let account = Account::new("brand_1").unwrap();
    let stale = env
        .manager
        .store()
        .write(Platform::Douyin, &account, "expired-session")
        .unwrap();

    let start = Instant::now();
    let ready = env
        .manager
        .ensure_valid_session(Platform::Douyin, &account, false)
        .await
        .unwrap();

    assert!(!ready);
    assert!(start.elapsed() >= LOGIN_TIMEOUT);
    assert_eq!(env.driver.stats().login_sessions, 1);

    let record = env.manager.store().read(Platform::Douyin, &account).unwrap().unwrap();
    assert_eq!(record, stale);
    assert_eq!(env.driver.stats().open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_ensure_is_idempotent_for_valid_session() {
    let env = create_test_env();
    env.driver
        .issue_state("fresh")
        .accept_state("fresh")
        .navigate_after_login(Duration::from_secs(5), &["https://www.xiaohongshu.com/explore"]);
    let account = Account::default();

    assert!(
        env.manager
            .ensure_valid_session(Platform::Xhs, &account, false)
            .await
            .unwrap()
    );
    let after_first = env.driver.stats().login_sessions;

    assert!(
        env.manager
            .ensure_valid_session(Platform::Xhs, &account, false)
            .await
            .unwrap()
    );
    assert_eq!(env.driver.stats().login_sessions, after_first);
}

#[rstest]
#[case(Platform::Douyin, true)]
#[case(Platform::Kuaishou, true)]
#[case(Platform::Tiktok, false)]
#[case(Platform::Tencent, true)]
#[case(Platform::Xhs, false)]
#[tokio::test(start_paused = true)]
async fn test_ensure_agrees_with_verify(#[case] platform: Platform, #[case] accepted: bool) {
    let env = create_test_env();
    let account = Account::default();
    env.manager
        .store()
        .write(platform, &account, "stored")
        .unwrap();
    if accepted {
        env.driver.accept_state("stored");
    }

    let ready = env
        .manager
        .ensure_valid_session(platform, &account, false)
        .await
        .unwrap();
    let verified = env.manager.verify(platform, &account).await.unwrap();

    assert_eq!(ready, accepted);
    assert_eq!(verified.valid, ready);
}

#[tokio::test(start_paused = true)]
async fn test_network_failure_is_invalid_not_fatal() {
    let env = create_test_env();
    let account = Account::default();
    env.manager
        .store()
        .write(Platform::Tencent, &account, "stored")
        .unwrap();
    env.driver.accept_state("stored").fail_navigation(true);

    let result = env.manager.verify(Platform::Tencent, &account).await.unwrap();
    assert!(!result.valid);
    assert!(result.reason.starts_with(VerificationResult::NETWORK_OR_TIMEOUT));

    let ready = env
        .manager
        .ensure_valid_session(Platform::Tencent, &account, false)
        .await
        .unwrap();
    assert!(!ready);
    assert_eq!(
        env.manager.store().read(Platform::Tencent, &account).unwrap().unwrap().blob,
        "stored"
    );
    assert_eq!(env.driver.stats().open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_login_deadline_is_honored() {
    let env = create_test_env();
    let deadline = Duration::from_secs(45);
    let (tx, rx) = progress::channel();

    let start = Instant::now();
    let attempt = env
        .manager
        .login(Platform::Kuaishou, &Account::default(), Some(deadline), tx)
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(attempt.outcome, LoginOutcome::TimedOut);
    assert!(elapsed >= deadline);
    assert!(elapsed < deadline + Duration::from_millis(500));
    assert!(!env.manager.store().exists(Platform::Kuaishou, &Account::default()));

    let events = rx.collect().await;
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], ProgressEvent::Artifact { .. }));
    assert_eq!(events[1], ProgressEvent::Timeout);
}

#[tokio::test(start_paused = true)]
async fn test_missing_artifact_reports_failure() {
    let env = create_test_env();
    env.driver.show_artifact(None);
    let (tx, rx) = progress::channel();

    let attempt = env
        .manager
        .login(Platform::Tiktok, &Account::default(), None, tx)
        .await
        .unwrap();

    assert_eq!(
        attempt.outcome,
        LoginOutcome::Failed(FailureReason::ArtifactNotFound)
    );
    assert_eq!(
        rx.collect().await,
        vec![ProgressEvent::Error {
            detail: "artifact-not-found".to_string()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_different_accounts_run_independently() {
    let env = create_test_env();
    env.driver
        .issue_state("fresh")
        .accept_state("fresh")
        .navigate_after_login(Duration::from_secs(30), &[DOUYIN_HOME]);

    let first = {
        let manager = env.manager.clone();
        tokio::spawn(async move {
            manager
                .ensure_valid_session(Platform::Douyin, &Account::new("a").unwrap(), false)
                .await
        })
    };
    let second = {
        let manager = env.manager.clone();
        tokio::spawn(async move {
            manager
                .ensure_valid_session(Platform::Douyin, &Account::new("b").unwrap(), false)
                .await
        })
    };

    let start = Instant::now();
    assert!(first.await.unwrap().unwrap());
    assert!(second.await.unwrap().unwrap());
    // Both waited for the same 30s navigation concurrently
    assert!(start.elapsed() < Duration::from_secs(60));

    let listing = env.manager.list().unwrap();
    assert_eq!(listing[&Platform::Douyin].len(), 2);
}
