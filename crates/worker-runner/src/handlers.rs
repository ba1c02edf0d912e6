//! Command handlers backed by the worker supervisor
//!
//! One handler instance serves every command name; the host bus registers
//! it once per name. Data commands are translated into the worker argv
//! contract `<script> <mode> <positional…> [--flag value]*` and executed
//! through the supervisor; control commands act on the supervisor directly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use sdv_core::{CommandHandler, CommandRequest, OperationError};

use crate::supervisor::{SpawnRequest, WorkerSupervisor};

/// Locations of the worker scripts shipped alongside the host
#[derive(Debug, Clone)]
pub struct WorkerScripts {
    /// Metadata extraction and plotting (modes `info` and `plot`)
    pub data_info: PathBuf,
    pub data_slice: PathBuf,
    pub html_repr: PathBuf,
    pub text_repr: PathBuf,
    pub package_check: PathBuf,
    pub show_versions: PathBuf,
}

impl WorkerScripts {
    /// Resolve all scripts relative to one directory, using the original
    /// script file names
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            data_info: dir.join("get_data_info.py"),
            data_slice: dir.join("get_data_slice.py"),
            html_repr: dir.join("get_html_representation.py"),
            text_repr: dir.join("get_text_representation.py"),
            package_check: dir.join("check_package_availability.py"),
            show_versions: dir.join("get_show_versions.py"),
        }
    }
}

/// Host-side handler for every viewer command
pub struct WorkerCommandHandler {
    supervisor: WorkerSupervisor,
    scripts: WorkerScripts,
}

impl WorkerCommandHandler {
    pub fn new(supervisor: WorkerSupervisor, scripts: WorkerScripts) -> Self {
        Self {
            supervisor,
            scripts,
        }
    }

    pub fn supervisor(&self) -> &WorkerSupervisor {
        &self.supervisor
    }

    async fn run_worker(
        &self,
        operation_id: Option<String>,
        server_timeout_ms: Option<u64>,
        args: Vec<String>,
    ) -> Result<Value, OperationError> {
        let mut request = SpawnRequest::new(args);
        request.operation_id = operation_id;
        request.server_timeout = server_timeout_ms.map(Duration::from_millis);

        debug!(args = ?request.args, operation_id = ?request.operation_id, "dispatching worker");
        self.supervisor.spawn(request).await.map_err(Into::into)
    }

    fn script(&self, path: &Path) -> String {
        path.to_string_lossy().to_string()
    }
}

#[async_trait]
impl CommandHandler for WorkerCommandHandler {
    async fn handle(&self, request: CommandRequest) -> Result<Value, OperationError> {
        match request {
            CommandRequest::DataInfo {
                path,
                operation_id,
                server_timeout_ms,
            } => {
                let args = vec![self.script(&self.scripts.data_info), "info".to_string(), path];
                self.run_worker(operation_id, server_timeout_ms, args).await
            }

            CommandRequest::CreatePlot {
                path,
                variable,
                plot_type,
                style,
                operation_id,
                server_timeout_ms,
            } => {
                let mut args = vec![
                    self.script(&self.scripts.data_info),
                    "plot".to_string(),
                    path,
                    variable,
                ];
                if let Some(plot_type) = plot_type {
                    args.push(plot_type);
                }
                if let Some(style) = style {
                    args.push("--style".to_string());
                    args.push(style);
                }
                self.run_worker(operation_id, server_timeout_ms, args).await
            }

            CommandRequest::DataSlice {
                path,
                variable,
                selection,
                operation_id,
                server_timeout_ms,
            } => {
                let mut args = vec![self.script(&self.scripts.data_slice), path, variable];
                if let Some(selection) = selection {
                    args.push(selection.to_string());
                }
                self.run_worker(operation_id, server_timeout_ms, args).await
            }

            CommandRequest::HtmlRepresentation {
                path,
                operation_id,
                server_timeout_ms,
            } => {
                let args = vec![self.script(&self.scripts.html_repr), path];
                self.run_worker(operation_id, server_timeout_ms, args).await
            }

            CommandRequest::TextRepresentation {
                path,
                operation_id,
                server_timeout_ms,
            } => {
                let args = vec![self.script(&self.scripts.text_repr), path];
                self.run_worker(operation_id, server_timeout_ms, args).await
            }

            CommandRequest::PackageCheck { packages } => {
                let mut args = vec![self.script(&self.scripts.package_check)];
                args.extend(packages);
                self.run_worker(None, None, args).await
            }

            CommandRequest::ShowVersions => {
                let args = vec![self.script(&self.scripts.show_versions)];
                self.run_worker(None, None, args).await
            }

            CommandRequest::AbortOperation { operation_id } => {
                let aborted = self.supervisor.abort(&operation_id).await;
                Ok(json!({ "aborted": aborted }))
            }

            CommandRequest::ListOperations => {
                Ok(json!({ "operations": self.supervisor.list_active().await }))
            }
        }
    }
}
