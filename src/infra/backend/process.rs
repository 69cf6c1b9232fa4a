//! Detection backend run as local processes (typically container commands).

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::BufReader;

use crate::core::{BackendError, BackendStream, DetectionBackend, StreamingBackend};
use crate::infra::backend::CommandTemplate;

/// Default bound on stop, cleanup and preflight commands.
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Backend driven by command templates.
///
/// - `detect` runs once per job and prints a textual report
/// - `stream` starts the long-lived instance whose stdout is the event stream
/// - `stop` asks a running instance to exit (e.g. `docker stop {instance}`)
/// - `cleanup` removes an instance by name (e.g. `docker rm -f {instance}`)
/// - `preflight` checks the backend is usable before serving jobs
#[derive(Debug, Clone, Default)]
pub struct ProcessBackend {
    detect: Option<CommandTemplate>,
    stream: Option<CommandTemplate>,
    stop: Option<CommandTemplate>,
    cleanup: Option<CommandTemplate>,
    preflight: Option<CommandTemplate>,
    cleanup_timeout: Option<Duration>,
}

impl ProcessBackend {
    /// Backend with no commands configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-job detect command.
    pub fn with_detect(mut self, template: CommandTemplate) -> Self {
        self.detect = Some(template);
        self
    }

    /// Set the streaming command.
    pub fn with_stream(mut self, template: CommandTemplate) -> Self {
        self.stream = Some(template);
        self
    }

    /// Set the graceful stop command.
    pub fn with_stop(mut self, template: Option<CommandTemplate>) -> Self {
        self.stop = template;
        self
    }

    /// Set the instance cleanup command.
    pub fn with_cleanup(mut self, template: Option<CommandTemplate>) -> Self {
        self.cleanup = template;
        self
    }

    /// Set the preflight command.
    pub fn with_preflight(mut self, template: Option<CommandTemplate>) -> Self {
        self.preflight = template;
        self
    }

    /// Bound stop, cleanup and preflight commands.
    pub fn with_cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = Some(timeout);
        self
    }

    fn cleanup_timeout(&self) -> Duration {
        self.cleanup_timeout.unwrap_or(DEFAULT_CLEANUP_TIMEOUT)
    }

    /// Run an auxiliary command to completion within the cleanup timeout.
    async fn run_aux(
        &self,
        template: &CommandTemplate,
        instance: &str,
    ) -> Result<(), BackendError> {
        let Some(mut cmd) = template.command(instance, None) else {
            return Err(BackendError::Spawn("empty command".into()));
        };
        let child = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BackendError::Spawn(e.to_string()))?;
        let limit = self.cleanup_timeout();
        match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => {
                let status = output.status.to_string();
                Err(BackendError::Crashed(tail(&output.stderr, &status)))
            }
            Ok(Err(e)) => Err(BackendError::Crashed(e.to_string())),
            Err(_) => Err(BackendError::Timeout(limit.as_secs())),
        }
    }

    async fn remove_instance(&self, instance: &str) {
        let Some(cleanup) = &self.cleanup else {
            return;
        };
        match self.run_aux(cleanup, instance).await {
            Ok(()) => tracing::debug!(instance, "backend instance removed"),
            // A missing instance makes `docker rm -f` fail; that is the normal case.
            Err(e) => tracing::debug!(instance, error = %e, "backend cleanup reported failure"),
        }
    }
}

fn tail(bytes: &[u8], fallback: &str) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.is_empty() {
        return fallback.to_string();
    }
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(5)..].join("\n")
}

#[async_trait]
impl DetectionBackend for ProcessBackend {
    async fn prepare(&self) -> Result<(), BackendError> {
        let Some(detect) = &self.detect else {
            return Err(BackendError::Preflight("no detect command configured".into()));
        };
        detect.validate().map_err(BackendError::Preflight)?;
        if let Some(preflight) = &self.preflight {
            self.run_aux(preflight, "preflight")
                .await
                .map_err(|e| BackendError::Preflight(e.to_string()))?;
        }
        Ok(())
    }

    async fn detect(&self, instance: &str, source: &Path) -> Result<String, BackendError> {
        let mut cmd = self
            .detect
            .as_ref()
            .and_then(|t| t.command(instance, Some(source)))
            .ok_or_else(|| BackendError::Spawn("no detect command configured".into()))?;
        let child = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BackendError::Spawn(e.to_string()))?;
        tracing::debug!(instance, source = %source.display(), pid = ?child.id(), "detect started");

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| BackendError::Crashed(e.to_string()))?;
        if !output.status.success() {
            return Err(BackendError::Crashed(tail(&output.stderr, &output.status.to_string())));
        }
        // Detectors differ in which stream carries the summary line.
        let mut report = String::from_utf8_lossy(&output.stdout).into_owned();
        report.push('\n');
        report.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(report)
    }

    async fn teardown(&self, instance: &str) {
        self.remove_instance(instance).await;
    }
}

#[async_trait]
impl StreamingBackend for ProcessBackend {
    async fn open(&self, instance: &str) -> Result<BackendStream, BackendError> {
        let mut cmd = self
            .stream
            .as_ref()
            .and_then(|t| t.command(instance, None))
            .ok_or_else(|| BackendError::Spawn("no stream command configured".into()))?;
        let mut child = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| BackendError::Spawn(e.to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Spawn("stream stdout unavailable".into()))?;
        tracing::debug!(instance, pid = ?child.id(), "stream started");
        Ok(BackendStream {
            lines: Box::new(BufReader::new(stdout)),
            child: Some(child),
        })
    }

    async fn request_stop(&self, instance: &str) {
        let Some(stop) = &self.stop else {
            return;
        };
        if let Err(e) = self.run_aux(stop, instance).await {
            tracing::warn!(instance, error = %e, "graceful stop command failed");
        }
    }

    async fn teardown(&self, instance: &str) {
        self.remove_instance(instance).await;
    }
}
