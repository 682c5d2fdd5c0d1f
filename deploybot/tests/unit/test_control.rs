//! Status and control tests

use std::sync::Arc;
use std::time::Duration;

use deploybot::app::state::INTERRUPTED_MESSAGE;
use deploybot::control::service::{RestartOutcome, StopOutcome};
use deploybot::deploy::fsm::{DeploymentStatus, LifecycleEvent};
use deploybot::http::probe::ElapsedStatusProbe;
use deploybot::http::provider::SimulatedProvisioner;

use crate::support::{deploy, harness, messages, new_record, CountingReachability};

#[tokio::test]
async fn test_stop_and_restart_are_idempotent() {
    let h = harness().build().await;
    deploy(&h.app, 1, "demo-bot").await;
    h.app.supervisor.wait(1, "demo-bot").await;
    let control = &h.app.control;

    assert!(matches!(control.restart(1, "demo-bot").await.unwrap(), RestartOutcome::AlreadyRunning));

    let StopOutcome::Stopped(stopped) = control.stop(1, "demo-bot").await.unwrap() else {
        panic!("expected the deployment to stop");
    };
    assert_eq!(stopped.status, DeploymentStatus::Stopped);
    assert_eq!(messages(&stopped).last().map(String::as_str), Some("Stopped by owner"));

    let writes = h.backend.writes();
    let log_len = stopped.log.len();
    assert_eq!(control.stop(1, "demo-bot").await.unwrap(), StopOutcome::AlreadyStopped);
    assert_eq!(h.backend.writes(), writes);
    assert_eq!(control.find(1, "demo-bot").await.unwrap().log.len(), log_len);

    let RestartOutcome::Restarted(restarted) = control.restart(1, "demo-bot").await.unwrap() else {
        panic!("expected the deployment to restart");
    };
    assert_eq!(restarted.status, DeploymentStatus::Running);
    assert_eq!(restarted.url.as_deref(), Some("https://demo-bot.onrender.com"));
}

#[tokio::test]
async fn test_unknown_deployment_is_not_found() {
    let h = harness().build().await;
    deploy(&h.app, 1, "demo-bot").await;
    let control = &h.app.control;

    // other owners cannot see the record
    assert!(control.get_status(2, "demo-bot").await.unwrap_err().is_not_found());
    assert!(control.stop(2, "demo-bot").await.unwrap_err().is_not_found());
    assert!(control.restart(2, "missing").await.unwrap_err().is_not_found());
    assert!(control.list_logs(2, "demo-bot", 20).await.unwrap_err().is_not_found());
    assert!(control.delete(2, "demo-bot").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_delete_removes_everywhere() {
    let h = harness().build().await;
    deploy(&h.app, 1, "demo-bot").await;
    deploy(&h.app, 1, "keep-bot").await;
    h.app.supervisor.wait(1, "demo-bot").await;
    h.app.supervisor.wait(1, "keep-bot").await;
    let control = &h.app.control;

    let removed = control.delete(1, "demo-bot").await.unwrap();
    assert_eq!(removed.name, "demo-bot");

    let names: Vec<String> = control.list(1).await.into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["keep-bot"]);
    assert!(control.get_status(1, "demo-bot").await.unwrap_err().is_not_found());

    let snapshot = String::from_utf8(h.backend.snapshot().unwrap()).unwrap();
    assert!(!snapshot.contains("demo-bot"));
    assert!(snapshot.contains("keep-bot"));

    // the name is free again
    assert!(!h.app.store.name_taken("demo-bot").await);
}

#[tokio::test]
async fn test_list_logs_returns_latest() {
    let h = harness().build().await;
    deploy(&h.app, 1, "demo-bot").await;
    h.app.supervisor.wait(1, "demo-bot").await;

    let all = h.app.control.list_logs(1, "demo-bot", 100).await.unwrap();
    let last_two = h.app.control.list_logs(1, "demo-bot", 2).await.unwrap();
    assert_eq!(last_two.len(), 2);
    assert_eq!(last_two, all[all.len() - 2..].to_vec());
}

#[tokio::test]
async fn test_probe_promotes_deploying_record() {
    let h = harness()
        .probe(Arc::new(ElapsedStatusProbe::new(Duration::ZERO)))
        .build()
        .await;
    let store = &h.app.store;

    // records left deploying with no executor task, e.g. after a restart of the process
    for name in ["warm-bot", "halted-bot"] {
        store
            .create(1, new_record(name))
            .await
            .unwrap();
        store
            .transition(1, name, LifecycleEvent::Deploy, None)
            .await
            .unwrap();
    }
    store
        .set_endpoint(1, "warm-bot", "https://warm-bot.onrender.com".to_string(), "svc_warm-bot".to_string())
        .await
        .unwrap();
    store
        .transition(1, "halted-bot", LifecycleEvent::Stop, None)
        .await
        .unwrap();

    let warm = h.app.control.get_status(1, "warm-bot").await.unwrap();
    assert_eq!(warm.status, DeploymentStatus::Running);
    assert_eq!(messages(&warm).last().map(String::as_str), Some("Service is reachable"));

    let halted = h.app.control.get_status(1, "halted-bot").await.unwrap();
    assert_eq!(halted.status, DeploymentStatus::Stopped);
}

#[tokio::test]
async fn test_deploying_record_without_url_is_not_promoted() {
    let checks = Arc::new(CountingReachability::default());
    let h = harness().probe(checks.clone()).build().await;
    let store = &h.app.store;
    store.create(1, new_record("bare-bot")).await.unwrap();
    store
        .transition(1, "bare-bot", LifecycleEvent::Deploy, None)
        .await
        .unwrap();

    let bare = h.app.control.get_status(1, "bare-bot").await.unwrap();
    assert_eq!(bare.status, DeploymentStatus::Deploying);
    assert!(bare.url.is_none());
    assert_eq!(checks.calls(), 0);
}

#[tokio::test]
async fn test_running_record_is_not_checked() {
    let checks = Arc::new(CountingReachability::default());
    let h = harness().probe(checks.clone()).build().await;
    deploy(&h.app, 1, "demo-bot").await;
    h.app.supervisor.wait(1, "demo-bot").await;

    for _ in 0..3 {
        let running = h.app.control.get_status(1, "demo-bot").await.unwrap();
        assert_eq!(running.status, DeploymentStatus::Running);
    }
    assert_eq!(checks.calls(), 0);
}

#[tokio::test]
async fn test_reopen_fails_interrupted_deployments() {
    let h = harness()
        .provisioner(Arc::new(SimulatedProvisioner::new(Duration::from_secs(600))))
        .build()
        .await;
    h.app.store.create(1, new_record("queued-bot")).await.unwrap();
    deploy(&h.app, 1, "slow-bot").await;

    // wait until the provider call is in flight
    for _ in 0..500 {
        let current = h.app.store.find(1, "slow-bot").await.unwrap();
        if messages(&current).iter().any(|m| m.starts_with("Creating service")) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    h.app.shutdown(Duration::from_secs(5)).await.unwrap();

    let interrupted = h.app.store.find(1, "slow-bot").await.unwrap();
    assert_eq!(interrupted.status, DeploymentStatus::Deploying);
    assert!(interrupted.url.is_none());

    let reopened = harness()
        .backend(h.backend.clone())
        .probe(Arc::new(ElapsedStatusProbe::new(Duration::ZERO)))
        .build()
        .await;
    for name in ["slow-bot", "queued-bot"] {
        let status = reopened.app.control.get_status(1, name).await.unwrap();
        assert_eq!(status.status, DeploymentStatus::Failed);
        assert!(status.url.is_none());
        assert_eq!(messages(&status).last().map(String::as_str), Some(INTERRUPTED_MESSAGE));
    }

    // the recovery is durable
    let snapshot = String::from_utf8(h.backend.snapshot().unwrap()).unwrap();
    assert!(snapshot.contains(INTERRUPTED_MESSAGE));
    assert!(!snapshot.contains("\"deploying\""));
}

#[tokio::test]
async fn test_probe_waits_for_warmup() {
    let h = harness().build().await;
    let store = &h.app.store;
    store.create(1, new_record("cold-bot")).await.unwrap();
    store
        .transition(1, "cold-bot", LifecycleEvent::Deploy, None)
        .await
        .unwrap();
    store
        .set_endpoint(1, "cold-bot", "https://cold-bot.onrender.com".to_string(), "svc_cold-bot".to_string())
        .await
        .unwrap();

    let cold = h.app.control.get_status(1, "cold-bot").await.unwrap();
    assert_eq!(cold.status, DeploymentStatus::Deploying);
}

#[tokio::test]
async fn test_stats() {
    let h = harness().build().await;
    deploy(&h.app, 1, "demo-bot").await;
    deploy(&h.app, 2, "other-bot").await;
    h.app.supervisor.wait(1, "demo-bot").await;
    h.app.supervisor.wait(2, "other-bot").await;
    h.app.control.stop(2, "other-bot").await.unwrap();

    let stats = h.app.control.stats().await;
    assert_eq!(stats.summary.total_owners, 2);
    assert_eq!(stats.summary.total_deployments, 2);
    assert_eq!(stats.summary.count(DeploymentStatus::Running), 1);
    assert_eq!(stats.summary.count(DeploymentStatus::Stopped), 1);
    assert_eq!(stats.active_tasks, 0);
}
