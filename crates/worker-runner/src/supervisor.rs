//! Worker process supervision
//!
//! The supervisor owns the map from operation id to live worker process.
//! Each worker runs in its own process group so that any indirection (a
//! shell spawning the real interpreter) is killable as a unit. Abort sends
//! a graceful terminate to the group, then a forceful kill if the process
//! has not exited when the grace period elapses.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::classify::classify;
use crate::environment::EnvironmentValidator;
use crate::error::{Result, SupervisorError};

/// Configuration for the worker supervisor
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Delay between graceful terminate and forceful kill
    pub grace_period: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_millis(1000),
        }
    }
}

/// Request to spawn a worker process
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Caller-generated cancellation handle; untracked when absent
    pub operation_id: Option<String>,
    /// Arguments passed to the interpreter (script, mode, positionals, flags)
    pub args: Vec<String>,
    /// Host-side timeout, armed independently of the client
    pub server_timeout: Option<Duration>,
}

impl SpawnRequest {
    pub fn new(args: Vec<String>) -> Self {
        Self {
            operation_id: None,
            args,
            server_timeout: None,
        }
    }

    pub fn with_operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = Some(operation_id.into());
        self
    }

    pub fn with_server_timeout(mut self, timeout: Duration) -> Self {
        self.server_timeout = Some(timeout);
        self
    }
}

/// A tracked worker process; exactly one entry per live operation id
struct ActiveProcess {
    /// Process id, which is also the process group id
    pid: u32,
    started_at: Instant,
    /// Host-side timeout task, cancelled on exit or abort
    server_timeout: Option<JoinHandle<()>>,
    /// Set when the supervisor itself signalled the process
    aborted: Arc<AtomicBool>,
}

/// Supervises external worker processes keyed by operation id
#[derive(Clone)]
pub struct WorkerSupervisor {
    env: Arc<dyn EnvironmentValidator>,
    config: SupervisorConfig,
    active: Arc<Mutex<HashMap<String, ActiveProcess>>>,
}

impl WorkerSupervisor {
    pub fn new(env: Arc<dyn EnvironmentValidator>) -> Self {
        Self::with_config(env, SupervisorConfig::default())
    }

    pub fn with_config(env: Arc<dyn EnvironmentValidator>, config: SupervisorConfig) -> Self {
        Self {
            env,
            config,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Spawn a worker and await its classified outcome
    ///
    /// When an operation id is supplied, the process is registered before
    /// any await on the child, so `abort` works from the moment the caller
    /// holds the id. The optional server timeout fires even if the client
    /// that initiated the request has disconnected.
    pub async fn spawn(&self, request: SpawnRequest) -> Result<Value> {
        let interpreter = match self.env.interpreter_path() {
            Some(path) if self.env.ready() => path,
            _ => return Err(SupervisorError::EnvironmentNotReady),
        };

        let mut cmd = Command::new(&interpreter);
        cmd.args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Run the worker in its own process group so abort reaps the
        // whole subtree, shells included
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| {
            SupervisorError::spawn_failed_with_source(
                format!("failed to spawn {}: {}", interpreter.display(), e),
                e,
            )
        })?;

        let pid = child
            .id()
            .ok_or_else(|| SupervisorError::spawn_failed("worker exited before tracking began"))?;

        let aborted = Arc::new(AtomicBool::new(false));

        if let Some(operation_id) = &request.operation_id {
            // The timer is armed while the registry lock is held, so even a
            // zero timeout cannot reach `abort` before the entry is visible
            let mut active = self.active.lock().await;
            let server_timeout = request.server_timeout.map(|timeout| {
                let supervisor = self.clone();
                let id = operation_id.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    warn!(operation_id = %id, ?timeout, "server-side timeout fired");
                    supervisor.abort(&id).await;
                })
            });

            active.insert(
                operation_id.clone(),
                ActiveProcess {
                    pid,
                    started_at: Instant::now(),
                    server_timeout,
                    aborted: Arc::clone(&aborted),
                },
            );
            info!(operation_id = %operation_id, pid, "worker registered");
        }

        debug!(pid, args = ?request.args, "worker spawned");

        let output = child.wait_with_output().await;

        // Exit handling: untrack and disarm the timer before classifying,
        // so is_active flips false the moment the exit has been collected
        if let Some(operation_id) = &request.operation_id {
            let mut active = self.active.lock().await;
            if let Some(entry) = active.remove(operation_id) {
                if let Some(timer) = entry.server_timeout {
                    timer.abort();
                }
                debug!(
                    operation_id = %operation_id,
                    elapsed_ms = entry.started_at.elapsed().as_millis() as u64,
                    "worker untracked"
                );
            }
        }

        let output = output?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let was_aborted = aborted.load(Ordering::SeqCst);

        debug!(
            exit_code = ?output.status.code(),
            aborted = was_aborted,
            "worker exited"
        );

        classify(output.status.code(), was_aborted, &stdout, &stderr)
            .map_err(SupervisorError::Worker)
    }

    /// Abort a tracked operation
    ///
    /// Returns false when no process is registered for the id (already
    /// completed, unknown, or never tracked). Returns true as soon as the
    /// terminate signal was dispatched; it does not wait for the exit.
    pub async fn abort(&self, operation_id: &str) -> bool {
        let pid = {
            let mut active = self.active.lock().await;
            match active.get_mut(operation_id) {
                None => return false,
                Some(entry) => {
                    if let Some(timer) = entry.server_timeout.take() {
                        timer.abort();
                    }
                    entry.aborted.store(true, Ordering::SeqCst);
                    entry.pid
                }
            }
        };

        info!(operation_id = %operation_id, pid, "aborting worker");
        terminate_group(pid);

        // Escalate to a forceful kill if the process outlives the grace period
        let supervisor = self.clone();
        let id = operation_id.to_string();
        let grace = self.config.grace_period;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            // Only the pid signalled above is fair game: once the old entry
            // leaves the map the id may be reused for a fresh worker, and
            // that worker must not inherit this timer
            let survivor = supervisor.active.lock().await.get(&id).map(|e| e.pid);
            if survivor == Some(pid) {
                warn!(operation_id = %id, pid, "grace period elapsed, killing process group");
                kill_group(pid);
            }
        });

        true
    }

    /// Abort every tracked operation; returns the number signalled
    pub async fn abort_all(&self) -> usize {
        let ids: Vec<String> = self.active.lock().await.keys().cloned().collect();
        let mut count = 0;
        for id in ids {
            if self.abort(&id).await {
                count += 1;
            }
        }
        count
    }

    pub async fn is_active(&self, operation_id: &str) -> bool {
        self.active.lock().await.contains_key(operation_id)
    }

    pub async fn list_active(&self) -> Vec<String> {
        self.active.lock().await.keys().cloned().collect()
    }
}

/// Graceful terminate of the whole process group
#[cfg(unix)]
fn terminate_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        debug!(pid, "SIGTERM to process group failed: {e}");
    }
}

/// Forceful kill of the whole process group
#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        debug!(pid, "SIGKILL to process group failed: {e}");
    }
}

// Windows has no process groups; terminate the process tree instead,
// preserving the "abort reaps the whole subtree" invariant
#[cfg(windows)]
fn terminate_group(pid: u32) {
    let _ = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T"])
        .spawn();
}

#[cfg(windows)]
fn kill_group(pid: u32) {
    let _ = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .spawn();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::StaticEnvironment;
    use sdv_core::ErrorKind;
    use serde_json::json;

    fn shell_supervisor() -> WorkerSupervisor {
        WorkerSupervisor::new(Arc::new(StaticEnvironment::new("/bin/sh")))
    }

    fn shell_request(script: &str) -> SpawnRequest {
        SpawnRequest::new(vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn refuses_to_spawn_when_environment_not_ready() {
        let supervisor = WorkerSupervisor::new(Arc::new(StaticEnvironment::unavailable()));
        let err = supervisor
            .spawn(SpawnRequest::new(vec!["anything".to_string()]))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::EnvironmentNotReady));
    }

    #[tokio::test]
    async fn abort_of_unknown_id_returns_false() {
        let supervisor = shell_supervisor();
        assert!(!supervisor.abort("never-spawned").await);
        assert_eq!(supervisor.abort_all().await, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn json_stdout_resolves_to_parsed_value() {
        let supervisor = shell_supervisor();
        let value = supervisor
            .spawn(shell_request("printf '{\"v\":1}'"))
            .await
            .unwrap();
        assert_eq!(value, json!({"v": 1}));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn plain_stdout_resolves_to_raw_string() {
        let supervisor = shell_supervisor();
        let value = supervisor.spawn(shell_request("echo not json")).await.unwrap();
        assert_eq!(value, json!("not json"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_module_failure_is_classified() {
        let supervisor = shell_supervisor();
        let err = supervisor
            .spawn(shell_request(
                "echo \"ModuleNotFoundError: No module named 'xarray'\" >&2; exit 1",
            ))
            .await
            .unwrap_err();
        let err = sdv_core::OperationError::from(err);
        assert_eq!(err.kind, ErrorKind::MissingDependency);
        assert!(err.message.contains("xarray"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tracked_operation_is_active_until_exit() {
        let supervisor = shell_supervisor();
        let request = shell_request("sleep 30").with_operation_id("op-active");

        let runner = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.spawn(request).await })
        };

        // Registration happens before the first await on the child
        let mut registered = false;
        for _ in 0..50 {
            if supervisor.is_active("op-active").await {
                registered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(registered, "operation never became active");
        assert_eq!(supervisor.list_active().await, vec!["op-active".to_string()]);

        assert!(supervisor.abort("op-active").await);

        let err = runner.await.unwrap().unwrap_err();
        let err = sdv_core::OperationError::from(err);
        assert_eq!(err.kind, ErrorKind::Aborted);

        // Gone forever after the exit was processed
        assert!(!supervisor.is_active("op-active").await);
        assert!(!supervisor.abort("op-active").await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn term_ignoring_worker_is_force_killed_after_grace() {
        let supervisor = WorkerSupervisor::with_config(
            Arc::new(StaticEnvironment::new("/bin/sh")),
            SupervisorConfig {
                grace_period: Duration::from_millis(300),
            },
        );
        let request = shell_request("trap '' TERM; sleep 30").with_operation_id("op-stubborn");

        let runner = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.spawn(request).await })
        };

        while !supervisor.is_active("op-stubborn").await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let started = Instant::now();
        assert!(supervisor.abort("op-stubborn").await);

        let err = tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .expect("worker survived the forceful kill")
            .unwrap()
            .unwrap_err();
        let err = sdv_core::OperationError::from(err);
        assert_eq!(err.kind, ErrorKind::Aborted);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn grace_escalation_spares_a_worker_reusing_the_operation_id() {
        let supervisor = WorkerSupervisor::with_config(
            Arc::new(StaticEnvironment::new("/bin/sh")),
            SupervisorConfig {
                grace_period: Duration::from_millis(500),
            },
        );

        // First worker dies promptly on TERM, well inside the grace period
        let request = shell_request("sleep 30").with_operation_id("op-reuse");
        let runner = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.spawn(request).await })
        };
        while !supervisor.is_active("op-reuse").await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(supervisor.abort("op-reuse").await);
        let err = sdv_core::OperationError::from(runner.await.unwrap().unwrap_err());
        assert_eq!(err.kind, ErrorKind::Aborted);

        // Reusing the id immediately is legal; the second worker outlives
        // the first worker's grace deadline and must still succeed
        let request = shell_request("sleep 1; printf '{\"ok\":true}'")
            .with_operation_id("op-reuse");
        let value = supervisor.spawn(request).await.unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn immediate_server_timeout_still_aborts_the_worker() {
        let supervisor = shell_supervisor();
        let request = shell_request("sleep 30")
            .with_operation_id("op-instant")
            .with_server_timeout(Duration::ZERO);

        // The timer must not fire into an empty registry and become a no-op
        let err = tokio::time::timeout(Duration::from_secs(5), supervisor.spawn(request))
            .await
            .expect("spawn never resolved")
            .unwrap_err();
        assert_eq!(sdv_core::OperationError::from(err).kind, ErrorKind::Aborted);
        assert!(!supervisor.is_active("op-instant").await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn server_timeout_aborts_without_client_involvement() {
        let supervisor = shell_supervisor();
        let request = shell_request("sleep 30")
            .with_operation_id("op-timed")
            .with_server_timeout(Duration::from_millis(100));

        let err = supervisor.spawn(request).await.unwrap_err();
        let err = sdv_core::OperationError::from(err);
        assert_eq!(err.kind, ErrorKind::Aborted);
        assert!(!supervisor.is_active("op-timed").await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn abort_all_signals_every_tracked_operation() {
        let supervisor = shell_supervisor();
        let mut runners = Vec::new();
        for i in 0..3 {
            let request = shell_request("sleep 30").with_operation_id(format!("op-{i}"));
            let supervisor = supervisor.clone();
            runners.push(tokio::spawn(async move { supervisor.spawn(request).await }));
        }

        while supervisor.list_active().await.len() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(supervisor.abort_all().await, 3);

        for runner in runners {
            let err = runner.await.unwrap().unwrap_err();
            assert_eq!(sdv_core::OperationError::from(err).kind, ErrorKind::Aborted);
        }
        assert!(supervisor.list_active().await.is_empty());
    }
}
