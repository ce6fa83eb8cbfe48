use crate::exec::{ExecError, ExecOutput};
use crate::instance::{WorkerInstance, WorkerStatus};
use hypertrader_core::WorkerConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Delay between stop and start during a restart, so the old process can
/// release its database and log files.
const RESTART_SETTLE: Duration = Duration::from_secs(1);

/// Runtime knobs for the supervisor, resolved once at startup.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub user_data_dir: PathBuf,
    pub worker_command: String,
    pub default_strategy: String,
    pub start_grace: Duration,
    pub stop_timeout: Duration,
    pub exec_timeout: Duration,
}

impl SupervisorSettings {
    #[must_use]
    pub fn from_config(worker: &WorkerConfig, user_data_dir: impl Into<PathBuf>) -> Self {
        Self {
            user_data_dir: user_data_dir.into(),
            worker_command: worker.command.clone(),
            default_strategy: worker.default_strategy.clone(),
            start_grace: Duration::from_secs(worker.start_grace_secs),
            stop_timeout: Duration::from_secs(worker.stop_timeout_secs),
            exec_timeout: Duration::from_secs(worker.exec_timeout_secs),
        }
    }
}

/// Owns every worker process, keyed by user id.
///
/// Cheap to clone; all clones share the same process table.
#[derive(Clone)]
pub struct WorkerSupervisor {
    settings: Arc<SupervisorSettings>,
    instances: Arc<RwLock<HashMap<String, WorkerInstance>>>,
}

impl WorkerSupervisor {
    #[must_use]
    pub fn new(settings: SupervisorSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            instances: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn user_dir(&self, user_id: &str) -> PathBuf {
        self.settings.user_data_dir.join(format!("user_{user_id}"))
    }

    /// Starts a worker for `user_id`, unless one is already running.
    ///
    /// Returns `true` only once the process has survived the start grace
    /// period. A worker that exits during the grace window is logged with its
    /// stderr tail and counts as a failed start.
    pub async fn start(
        &self,
        user_id: &str,
        config_path: Option<&Path>,
        strategy: Option<&str>,
    ) -> bool {
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => self.user_dir(user_id).join("config.json"),
        };
        if !config_path.exists() {
            error!(user_id, path = %config_path.display(), "worker config not found");
            return false;
        }
        let strategy = strategy
            .unwrap_or(&self.settings.default_strategy)
            .to_string();
        let db_path = self.user_dir(user_id).join("tradesv3.sqlite");
        let db_url = format!("sqlite:///{}", db_path.display());

        // Check-and-spawn under one write lock so two concurrent starts for
        // the same user cannot both spawn.
        {
            let mut table = self.instances.write().await;
            if let Some(existing) = table.get_mut(user_id) {
                let Some(child) = existing.child.as_mut() else {
                    warn!(user_id, pid = existing.pid, "worker is being stopped");
                    return false;
                };
                match child.try_wait() {
                    Ok(None) => {
                        warn!(user_id, pid = existing.pid, "worker already running");
                        return false;
                    }
                    Ok(Some(status)) => {
                        warn!(
                            user_id,
                            exit_code = status.code(),
                            "reaping exited worker before restart"
                        );
                        table.remove(user_id);
                    }
                    Err(err) => {
                        error!(user_id, error = %err, "could not poll existing worker");
                        return false;
                    }
                }
            }

            let mut command = Command::new(&self.settings.worker_command);
            command
                .arg("trade")
                .arg("--config")
                .arg(&config_path)
                .arg("--strategy")
                .arg(&strategy)
                .arg("--db-url")
                .arg(&db_url)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());

            let child = match command.spawn() {
                Ok(child) => child,
                Err(err) => {
                    error!(
                        user_id,
                        command = %self.settings.worker_command,
                        error = %err,
                        "failed to spawn worker"
                    );
                    return false;
                }
            };
            let instance = WorkerInstance::new(user_id, child, config_path, strategy);
            info!(user_id, pid = instance.pid, "spawned worker");
            table.insert(user_id.to_string(), instance);
        }

        // Let the worker load its config before declaring success.
        tokio::time::sleep(self.settings.start_grace).await;

        let mut table = self.instances.write().await;
        let Some(instance) = table.get_mut(user_id) else {
            warn!(user_id, "worker removed during start grace");
            return false;
        };
        let poll = match instance.child.as_mut() {
            Some(child) => child.try_wait(),
            None => {
                warn!(user_id, "worker stopped during start grace");
                return false;
            }
        };
        match poll {
            Ok(None) => {
                info!(user_id, pid = instance.pid, "worker started");
                true
            }
            Ok(Some(status)) => {
                let stderr = instance.stderr_excerpt();
                error!(
                    user_id,
                    exit_code = status.code(),
                    stderr = %stderr,
                    "worker exited during start grace"
                );
                table.remove(user_id);
                false
            }
            Err(err) => {
                error!(user_id, error = %err, "could not poll worker after start");
                table.remove(user_id);
                false
            }
        }
    }

    /// Stops `user_id`'s worker: graceful termination first, then a hard kill
    /// once `stop_timeout` elapses. The table entry stays registered until the
    /// process is confirmed dead, so a start issued mid-stop is rejected
    /// instead of spawning a second worker. Returns `false` when no worker is
    /// known or another stop is already terminating it.
    pub async fn stop(&self, user_id: &str) -> bool {
        // Take the child out of the entry but leave the entry in the table;
        // only confirmed termination removes it.
        let (mut child, pid) = {
            let mut table = self.instances.write().await;
            let Some(instance) = table.get_mut(user_id) else {
                warn!(user_id, "no worker to stop");
                return false;
            };
            let Some(child) = instance.child.take() else {
                warn!(user_id, pid = instance.pid, "stop already in progress");
                return false;
            };
            (child, instance.pid)
        };

        if let Ok(Some(status)) = child.try_wait() {
            info!(
                user_id,
                exit_code = status.code(),
                "worker already exited before stop"
            );
            self.instances.write().await.remove(user_id);
            return true;
        }

        info!(user_id, pid, "stopping worker");
        request_graceful_exit(pid, &mut child);
        match tokio::time::timeout(self.settings.stop_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                info!(user_id, exit_code = status.code(), "worker stopped");
            }
            Ok(Err(err)) => {
                warn!(user_id, error = %err, "waiting on worker failed");
            }
            Err(_) => {
                warn!(
                    user_id,
                    timeout_secs = self.settings.stop_timeout.as_secs(),
                    "worker ignored termination, killing"
                );
                if let Err(err) = child.kill().await {
                    warn!(user_id, error = %err, "kill failed");
                }
            }
        }

        self.instances.write().await.remove(user_id);
        true
    }

    /// Stops every known worker, one at a time, and reports per-user results.
    pub async fn stop_all(&self) -> HashMap<String, bool> {
        let user_ids: Vec<String> = self.instances.read().await.keys().cloned().collect();
        if !user_ids.is_empty() {
            info!(count = user_ids.len(), "stopping all workers");
        }
        let mut results = HashMap::with_capacity(user_ids.len());
        for user_id in user_ids {
            let stopped = self.stop(&user_id).await;
            results.insert(user_id, stopped);
        }
        results
    }

    /// Restarts a worker with the same config and strategy it was started
    /// with. Returns `false` if no worker is known or the stop/start fails.
    pub async fn restart(&self, user_id: &str) -> bool {
        let previous = {
            let table = self.instances.read().await;
            table
                .get(user_id)
                .map(|instance| (instance.config_path.clone(), instance.strategy.clone()))
        };
        let Some((config_path, strategy)) = previous else {
            warn!(user_id, "no worker to restart");
            return false;
        };

        if !self.stop(user_id).await {
            return false;
        }
        tokio::time::sleep(RESTART_SETTLE).await;
        self.start(user_id, Some(&config_path), Some(&strategy))
            .await
    }

    /// Current status of one user's worker, or `None` when nothing is known.
    ///
    /// Polling is where crashes get noticed: a worker found dead is logged,
    /// removed from the table, and reported one final time with
    /// `is_running: false`. A later call returns `None`.
    pub async fn status(&self, user_id: &str) -> Option<WorkerStatus> {
        let mut table = self.instances.write().await;
        let instance = table.get_mut(user_id)?;
        let poll = match instance.child.as_mut() {
            Some(child) => child.try_wait(),
            // A stop owns the child right now; the process is still alive
            // until that stop confirms termination and drops the entry.
            None => return Some(instance.snapshot(user_id, None)),
        };
        match poll {
            Ok(None) => Some(instance.snapshot(user_id, None)),
            Ok(Some(status)) => {
                let exit_code = status.code();
                let stderr = instance.stderr_excerpt();
                warn!(
                    user_id,
                    exit_code,
                    stderr = %stderr,
                    "worker exited unexpectedly"
                );
                let snapshot = instance.snapshot(user_id, exit_code.or(Some(-1)));
                table.remove(user_id);
                Some(snapshot)
            }
            Err(err) => {
                error!(user_id, error = %err, "could not poll worker");
                None
            }
        }
    }

    /// Statuses for every known worker.
    pub async fn statuses(&self) -> Vec<WorkerStatus> {
        let user_ids: Vec<String> = self.instances.read().await.keys().cloned().collect();
        let mut statuses = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            if let Some(status) = self.status(&user_id).await {
                statuses.push(status);
            }
        }
        statuses
    }

    /// Number of workers currently running.
    pub async fn running_count(&self) -> usize {
        self.statuses()
            .await
            .iter()
            .filter(|status| status.is_running)
            .count()
    }

    /// Runs a one-shot worker subcommand against the user's config, e.g.
    /// `show-trades`. Returns `None` when the user has no live worker.
    pub async fn execute(
        &self,
        user_id: &str,
        subcommand: &str,
        args: &[String],
    ) -> Option<Result<ExecOutput, ExecError>> {
        let config_path = {
            let table = self.instances.read().await;
            table.get(user_id)?.config_path.clone()
        };
        if !config_path.exists() {
            warn!(user_id, path = %config_path.display(), "worker config vanished");
            return None;
        }

        debug!(user_id, subcommand, "running worker subcommand");
        let mut command = Command::new(&self.settings.worker_command);
        command
            .arg(subcommand)
            .arg("--config")
            .arg(&config_path)
            .args(args)
            .stdin(Stdio::null())
            // Make a timed-out subcommand die with its dropped future.
            .kill_on_drop(true);

        Some(self.run_one_shot(command, subcommand).await)
    }

    async fn run_one_shot(
        &self,
        mut command: Command,
        subcommand: &str,
    ) -> Result<ExecOutput, ExecError> {
        let timeout = self.settings.exec_timeout;
        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return Err(ExecError::Io(err)),
            Err(_) => {
                return Err(ExecError::CommandTimeout {
                    command: subcommand.to_string(),
                    timeout_secs: timeout.as_secs(),
                })
            }
        };
        if !output.status.success() {
            return Err(ExecError::CommandFailed {
                command: subcommand.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(ExecOutput::from_stdout(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }
}

#[cfg(unix)]
fn request_graceful_exit(pid: u32, _child: &mut Child) {
    // SAFETY: the pid belongs to a child we spawned and have not reaped.
    unsafe {
        libc::kill(pid as i32, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn request_graceful_exit(_pid: u32, child: &mut Child) {
    // No signal story here, go straight to termination.
    let _ = child.start_kill();
}
