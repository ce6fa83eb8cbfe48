#![cfg(unix)]

use hypertrader_supervisor::{ExecError, ExecOutput, SupervisorSettings, WorkerSupervisor};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

// Stand-in worker: `trade` stays up, the other subcommands exercise the
// one-shot execution paths.
const WORKER_SCRIPT: &str = r#"#!/bin/sh
case "$1" in
  trade) exec sleep 30 ;;
  stats) echo '{"open_trades": 2}' ;;
  version) echo "worker 1.0" ;;
  broken) echo "boom" >&2; exit 2 ;;
  slow) sleep 30 ;;
esac
"#;

struct Harness {
    supervisor: WorkerSupervisor,
    user_data: PathBuf,
    _dir: TempDir,
}

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("worker.sh");
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn harness_with(script_body: &str) -> Harness {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), script_body);
    let user_data = dir.path().join("user_data");
    fs::create_dir_all(&user_data).unwrap();
    let settings = SupervisorSettings {
        user_data_dir: user_data.clone(),
        worker_command: script.display().to_string(),
        default_strategy: "HyperliquidHybridStrategy".to_string(),
        start_grace: Duration::from_millis(100),
        stop_timeout: Duration::from_millis(300),
        exec_timeout: Duration::from_millis(400),
    };
    Harness {
        supervisor: WorkerSupervisor::new(settings),
        user_data,
        _dir: dir,
    }
}

fn harness() -> Harness {
    harness_with(WORKER_SCRIPT)
}

fn seed_config(harness: &Harness, user_id: &str) {
    let dir = harness.user_data.join(format!("user_{user_id}"));
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.json"), "{}").unwrap();
}

#[tokio::test]
async fn start_and_stop_round_trip() {
    let h = harness();
    seed_config(&h, "100");

    assert!(h.supervisor.start("100", None, None).await);
    let status = h.supervisor.status("100").await.unwrap();
    assert!(status.is_running);
    assert!(status.pid > 0);
    assert_eq!(status.strategy, "HyperliquidHybridStrategy");

    // Second start for the same user is rejected.
    assert!(!h.supervisor.start("100", None, None).await);

    assert!(h.supervisor.stop("100").await);
    assert!(h.supervisor.status("100").await.is_none());
    assert!(!h.supervisor.stop("100").await);
}

#[tokio::test]
async fn start_without_config_fails() {
    let h = harness();
    assert!(!h.supervisor.start("200", None, None).await);
    assert!(h.supervisor.status("200").await.is_none());
}

#[tokio::test]
async fn early_exit_is_a_failed_start() {
    let h = harness_with(
        r#"#!/bin/sh
echo "config invalid" >&2
exit 3
"#,
    );
    seed_config(&h, "300");

    assert!(!h.supervisor.start("300", None, None).await);
    assert!(h.supervisor.status("300").await.is_none());
}

#[tokio::test]
async fn stubborn_worker_is_killed() {
    let h = harness_with(
        r#"#!/bin/sh
trap '' TERM
sleep 5
"#,
    );
    seed_config(&h, "400");

    assert!(h.supervisor.start("400", None, None).await);
    let begin = Instant::now();
    assert!(h.supervisor.stop("400").await);
    // Kill path kicks in after the 300ms stop timeout.
    assert!(begin.elapsed() < Duration::from_secs(3));
    assert!(h.supervisor.status("400").await.is_none());
}

#[tokio::test]
async fn stop_in_progress_rejects_a_new_start() {
    // A worker that ignores SIGTERM keeps the stop busy until the kill
    // deadline, which is exactly when a racing start must not slip in.
    let h = harness_with(
        r#"#!/bin/sh
trap '' TERM
sleep 5
"#,
    );
    seed_config(&h, "450");

    assert!(h.supervisor.start("450", None, None).await);

    let supervisor = h.supervisor.clone();
    let stopper = tokio::spawn(async move { supervisor.stop("450").await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Old process is still terminating: the user stays in the table and a
    // second worker must not be spawned for them.
    assert!(!h.supervisor.start("450", None, None).await);
    assert!(!h.supervisor.stop("450").await);

    assert!(stopper.await.unwrap());
    assert!(h.supervisor.status("450").await.is_none());

    // With termination confirmed, a fresh start succeeds again.
    assert!(h.supervisor.start("450", None, None).await);
    assert!(h.supervisor.stop("450").await);
}

#[tokio::test]
async fn crash_is_reported_once_then_forgotten() {
    let h = harness_with(
        r#"#!/bin/sh
exec sleep 0.3
"#,
    );
    seed_config(&h, "500");

    assert!(h.supervisor.start("500", None, None).await);
    tokio::time::sleep(Duration::from_millis(600)).await;

    let last = h.supervisor.status("500").await.unwrap();
    assert!(!last.is_running);
    assert_eq!(last.exit_code, Some(0));
    assert!(h.supervisor.status("500").await.is_none());
}

#[tokio::test]
async fn execute_runs_one_shot_subcommands() {
    let h = harness();
    seed_config(&h, "600");
    assert!(h.supervisor.start("600", None, None).await);

    let data = h.supervisor.execute("600", "stats", &[]).await.unwrap();
    assert_eq!(
        data.unwrap(),
        ExecOutput::Data(serde_json::json!({"open_trades": 2}))
    );

    let text = h.supervisor.execute("600", "version", &[]).await.unwrap();
    assert_eq!(text.unwrap(), ExecOutput::Text("worker 1.0".to_string()));

    let failed = h.supervisor.execute("600", "broken", &[]).await.unwrap();
    match failed.unwrap_err() {
        ExecError::CommandFailed { command, stderr } => {
            assert_eq!(command, "broken");
            assert!(stderr.contains("boom"));
        }
        other => panic!("expected CommandFailed, got {other:?}"),
    }

    let slow = h.supervisor.execute("600", "slow", &[]).await.unwrap();
    assert!(matches!(
        slow.unwrap_err(),
        ExecError::CommandTimeout { .. }
    ));

    // No worker, no command.
    assert!(h.supervisor.execute("601", "stats", &[]).await.is_none());

    assert!(h.supervisor.stop("600").await);
}

#[tokio::test]
async fn stop_all_stops_everything() {
    let h = harness();
    seed_config(&h, "700");
    seed_config(&h, "701");

    assert!(h.supervisor.start("700", None, None).await);
    assert!(h.supervisor.start("701", None, None).await);
    assert_eq!(h.supervisor.running_count().await, 2);

    let results = h.supervisor.stop_all().await;
    assert_eq!(results.len(), 2);
    assert!(results.values().all(|stopped| *stopped));
    assert_eq!(h.supervisor.running_count().await, 0);
}

#[tokio::test]
async fn restart_spawns_a_fresh_process() {
    let h = harness();
    seed_config(&h, "800");

    assert!(!h.supervisor.restart("800").await);

    assert!(h.supervisor.start("800", None, None).await);
    let old_pid = h.supervisor.status("800").await.unwrap().pid;

    assert!(h.supervisor.restart("800").await);
    let status = h.supervisor.status("800").await.unwrap();
    assert!(status.is_running);
    assert_ne!(status.pid, old_pid);

    assert!(h.supervisor.stop("800").await);
}
