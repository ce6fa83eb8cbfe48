use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tracing::{debug, warn};

/// How many recent stderr lines to keep for crash diagnostics.
const STDERR_TAIL_LINES: usize = 20;

/// A live (or recently exited) worker process owned by the supervisor.
///
/// `child` is `None` while a stop is terminating the process; the entry
/// itself stays registered until the process is confirmed dead.
pub(crate) struct WorkerInstance {
    pub child: Option<Child>,
    pub pid: u32,
    pub config_path: PathBuf,
    pub strategy: String,
    pub started_at: DateTime<Utc>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
}

/// Point-in-time view of one user's worker.
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    pub user_id: String,
    pub is_running: bool,
    pub pid: u32,
    pub config_path: PathBuf,
    pub strategy: String,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub exit_code: Option<i32>,
}

impl WorkerInstance {
    /// Wraps a freshly spawned child, taking over its stdout/stderr pipes.
    pub fn new(user_id: &str, mut child: Child, config_path: PathBuf, strategy: String) -> Self {
        let pid = child.id().unwrap_or_default();
        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        Self::spawn_drains(user_id, &mut child, Arc::clone(&stderr_tail));
        Self {
            child: Some(child),
            pid,
            config_path,
            strategy,
            started_at: Utc::now(),
            stderr_tail,
        }
    }

    pub fn snapshot(&self, user_id: &str, exit_code: Option<i32>) -> WorkerStatus {
        WorkerStatus {
            user_id: user_id.to_string(),
            is_running: exit_code.is_none(),
            pid: self.pid,
            config_path: self.config_path.clone(),
            strategy: self.strategy.clone(),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
            exit_code,
        }
    }

    /// Recent stderr lines, joined for logging.
    pub fn stderr_excerpt(&self) -> String {
        self.stderr_tail
            .lock()
            .map(|tail| tail.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default()
    }

    // Worker pipes must be drained or the child blocks once they fill.
    // stdout goes straight to logs; stderr is also kept in a bounded tail so
    // an early crash can be reported with context.
    fn spawn_drains(user_id: &str, child: &mut Child, tail: Arc<Mutex<VecDeque<String>>>) {
        if let Some(stdout) = child.stdout.take() {
            let user_id = user_id.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(user_id = %user_id, "worker: {line}");
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let user_id = user_id.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(user_id = %user_id, "worker stderr: {line}");
                    if let Ok(mut tail) = tail.lock() {
                        if tail.len() >= STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
            });
        }
    }
}
