//! Child-process execution shared by all executor variants

use crate::error::{ExecutorError, Result};
use crate::logs::tail_lines;
use crate::{EventSender, ExecutionStatus, ExecutorEvent, StartedWorkload, WorkloadExecutor};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use workmesh_shared::workload::ProcessConfig;
use workmesh_shared::{Workload, WorkloadId};

/// How often the watch task polls a batch child for termination
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fully resolved command line for a child process
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<String>,
}

impl CommandSpec {
    pub fn display_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

struct ProcessHandle {
    child: Mutex<Option<Child>>,
    status: RwLock<ExecutionStatus>,
    log_path: PathBuf,
}

/// Owns child-process handles and per-workload capture files
///
/// Shared by composition: the process and container executors use it
/// directly, the service supervisor uses it to spawn and respawn the
/// children it watches. Only the runner touches `Child` handles.
pub struct ProcessRunner {
    log_dir: PathBuf,
    stop_timeout: Duration,
    handles: DashMap<WorkloadId, Arc<ProcessHandle>>,
}

impl ProcessRunner {
    pub fn new(log_dir: PathBuf, stop_timeout: Duration) -> Self {
        Self {
            log_dir,
            stop_timeout,
            handles: DashMap::new(),
        }
    }

    /// Spawn a child with output captured to the workload's log file;
    /// respawns append to the existing capture
    pub(crate) async fn spawn(&self, id: WorkloadId, spec: &CommandSpec) -> Result<Option<u32>> {
        std::fs::create_dir_all(&self.log_dir)?;
        let log_path = self.log_dir.join(format!("{}.log", id));
        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        let stderr = stdout.try_clone()?;

        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        command.envs(&spec.env);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }
        command.stdin(Stdio::null());
        command.stdout(Stdio::from(stdout));
        command.stderr(Stdio::from(stderr));
        command.kill_on_drop(true);

        let child = command.spawn().map_err(|e| ExecutorError::Launch {
            command: spec.display_line(),
            source: e,
        })?;
        let pid = child.id();

        let handle = Arc::new(ProcessHandle {
            child: Mutex::new(Some(child)),
            status: RwLock::new(ExecutionStatus::Running),
            log_path,
        });
        self.handles.insert(id, handle);

        debug!("spawned `{}` for {} (pid {:?})", spec.display_line(), id, pid);
        Ok(pid)
    }

    /// Watch a batch child until it terminates on its own, then report
    /// the exit through the event channel
    pub(crate) fn watch(self: &Arc<Self>, id: WorkloadId, events: EventSender) {
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(REAP_POLL_INTERVAL).await;

                let Some(handle) = runner.handles.get(&id).map(|h| Arc::clone(&h)) else {
                    break;
                };
                let mut child_guard = handle.child.lock().await;
                let Some(child) = child_guard.as_mut() else {
                    break;
                };

                match child.try_wait() {
                    Ok(Some(exit)) => {
                        let exit_code = exit.code().unwrap_or(-1);
                        *child_guard = None;
                        *handle.status.write() =
                            ExecutionStatus::Completed { exit_code };
                        info!("workload {} exited with code {}", id, exit_code);
                        let _ = events.send(ExecutorEvent::Exited {
                            workload_id: id,
                            exit_code: Some(exit_code),
                        });
                        break;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("wait failed for workload {}: {}", id, e);
                        break;
                    }
                }
            }
        });
    }

    /// Terminate a child: SIGTERM, bounded wait, then SIGKILL. Safe to
    /// call repeatedly and for unknown ids.
    pub(crate) async fn stop(&self, id: WorkloadId) -> Result<()> {
        let Some(handle) = self.handles.get(&id).map(|h| Arc::clone(&h)) else {
            return Ok(());
        };
        let mut child_guard = handle.child.lock().await;
        let Some(child) = child_guard.as_mut() else {
            return Ok(());
        };

        #[cfg(unix)]
        if let Some(pid) = child.id() {
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
        }

        let exit_code = match tokio::time::timeout(self.stop_timeout, child.wait()).await {
            Ok(Ok(status)) => status.code().unwrap_or(-1),
            Ok(Err(e)) => {
                warn!("wait after SIGTERM failed for {}: {}", id, e);
                -1
            }
            Err(_) => {
                let _ = child.kill().await;
                -1
            }
        };

        *child_guard = None;
        *handle.status.write() = ExecutionStatus::Stopped { exit_code };
        info!("workload {} stopped (exit code {})", id, exit_code);
        Ok(())
    }

    /// Kill a child immediately without the graceful window
    pub(crate) async fn kill(&self, id: WorkloadId) {
        let Some(handle) = self.handles.get(&id).map(|h| Arc::clone(&h)) else {
            return;
        };
        let mut child_guard = handle.child.lock().await;
        if let Some(child) = child_guard.as_mut() {
            let _ = child.kill().await;
        }
        *child_guard = None;
        *handle.status.write() = ExecutionStatus::Failed;
    }

    pub(crate) fn status(&self, id: WorkloadId) -> ExecutionStatus {
        self.handles
            .get(&id)
            .map(|h| *h.status.read())
            .unwrap_or(ExecutionStatus::Unknown)
    }

    pub(crate) fn set_status(&self, id: WorkloadId, status: ExecutionStatus) {
        if let Some(handle) = self.handles.get(&id) {
            *handle.status.write() = status;
        }
    }

    pub(crate) fn logs(&self, id: WorkloadId, lines: usize) -> Result<Vec<String>> {
        let handle = self
            .handles
            .get(&id)
            .ok_or(ExecutorError::NotTracked { id })?;
        Ok(tail_lines(&handle.log_path, lines)?)
    }
}

/// Executor for plain `process` workloads
pub struct ProcessExecutor {
    runner: Arc<ProcessRunner>,
    events: EventSender,
}

impl ProcessExecutor {
    pub fn new(runner: Arc<ProcessRunner>, events: EventSender) -> Self {
        Self { runner, events }
    }
}

#[async_trait]
impl WorkloadExecutor for ProcessExecutor {
    async fn execute(&self, workload: &Workload) -> Result<StartedWorkload> {
        let config: ProcessConfig =
            workload
                .parsed_config()
                .map_err(|e| ExecutorError::InvalidConfig {
                    message: e.to_string(),
                })?;

        let spec = CommandSpec {
            program: config.command,
            args: config.args,
            env: config.env,
            working_dir: config.working_dir,
        };

        let pid = self.runner.spawn(workload.id, &spec).await?;
        self.runner.watch(workload.id, self.events.clone());

        Ok(StartedWorkload {
            pid,
            endpoint: None,
        })
    }

    async fn stop(&self, id: WorkloadId) -> Result<()> {
        self.runner.stop(id).await
    }

    async fn logs(&self, id: WorkloadId, lines: usize) -> Result<Vec<String>> {
        self.runner.logs(id, lines)
    }

    async fn status(&self, id: WorkloadId) -> ExecutionStatus {
        self.runner.status(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;
    use workmesh_shared::WorkloadSpec;

    fn process_workload(command: &str, args: &[&str]) -> Workload {
        let spec: WorkloadSpec = serde_json::from_value(json!({
            "name": "test-process",
            "type": "process",
            "config": {"command": command, "args": args}
        }))
        .unwrap();
        Workload::from_spec(spec)
    }

    fn test_executor(dir: &std::path::Path) -> (ProcessExecutor, crate::EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let runner = Arc::new(ProcessRunner::new(
            dir.to_path_buf(),
            Duration::from_secs(2),
        ));
        (ProcessExecutor::new(runner, tx), rx)
    }

    #[tokio::test]
    async fn test_batch_process_runs_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let (executor, mut events) = test_executor(dir.path());
        let workload = process_workload("sh", &["-c", "echo captured-output; exit 7"]);

        let started = executor.execute(&workload).await.unwrap();
        assert!(started.pid.is_some());
        assert!(started.endpoint.is_none());

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            ExecutorEvent::Exited {
                workload_id,
                exit_code,
            } => {
                assert_eq!(workload_id, workload.id);
                assert_eq!(exit_code, Some(7));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        assert_eq!(
            executor.status(workload.id).await,
            ExecutionStatus::Completed { exit_code: 7 }
        );
        let logs = executor.logs(workload.id, 10).await.unwrap();
        assert!(logs.iter().any(|l| l.contains("captured-output")));
    }

    #[tokio::test]
    async fn test_stop_terminates_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (executor, _events) = test_executor(dir.path());
        let workload = process_workload("sleep", &["60"]);

        executor.execute(&workload).await.unwrap();
        assert_eq!(executor.status(workload.id).await, ExecutionStatus::Running);

        executor.stop(workload.id).await.unwrap();
        assert!(matches!(
            executor.status(workload.id).await,
            ExecutionStatus::Stopped { .. }
        ));

        // repeat stops are no-ops
        executor.stop(workload.id).await.unwrap();
        executor.stop(workload.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_of_unknown_workload_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let (executor, _events) = test_executor(dir.path());
        executor.stop(WorkloadId::random()).await.unwrap();
    }

    #[tokio::test]
    async fn test_launch_failure_surfaces_command() {
        let dir = tempfile::tempdir().unwrap();
        let (executor, _events) = test_executor(dir.path());
        let workload = process_workload("/nonexistent/workmesh-binary", &[]);

        let err = executor.execute(&workload).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Launch { .. }));
    }

    #[tokio::test]
    async fn test_missing_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (executor, _events) = test_executor(dir.path());
        let spec: WorkloadSpec = serde_json::from_value(json!({
            "name": "broken",
            "type": "process",
            "config": {}
        }))
        .unwrap();
        let workload = Workload::from_spec(spec);

        let err = executor.execute(&workload).await.unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidConfig { .. }));
    }
}
