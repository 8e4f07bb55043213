//! Probe adapter - runs one measurement against one target
//!
//! The probe is a black box: an external command (the `speedtest` CLI by
//! default) that prints a JSON document on success. Every invocation is
//! bounded by a timeout; a timed out child is killed when its handle is
//! dropped.
//!
//! Field extraction is tolerant. Each known field has exactly one accessor
//! on [`RawPayload`] that returns `None` when the path is missing or has the
//! wrong type.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{instrument, trace};

use crate::TargetId;
use crate::config::ProbeConfig;

/// Placeholder in probe arguments that is replaced by the target id
pub const TARGET_PLACEHOLDER: &str = "{id}";

/// Verbatim probe output together with its parsed document
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    text: String,
    document: Value,
}

impl RawPayload {
    pub fn parse(text: impl Into<String>) -> Result<Self, serde_json::Error> {
        let text = text.into();
        let document = serde_json::from_str(text.trim())?;
        Ok(Self { text, document })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    fn number_at(&self, pointer: &str) -> Option<f64> {
        self.document.pointer(pointer).and_then(Value::as_f64)
    }

    fn integer_at(&self, pointer: &str) -> Option<i64> {
        let value = self.document.pointer(pointer)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|v| v.round() as i64))
    }

    /// `ping.latency`
    pub fn latency_ms(&self) -> Option<f64> {
        self.number_at("/ping/latency")
    }

    /// `ping.jitter`
    pub fn jitter_ms(&self) -> Option<f64> {
        self.number_at("/ping/jitter")
    }

    /// `download.bandwidth`
    pub fn download_bps(&self) -> Option<i64> {
        self.integer_at("/download/bandwidth")
    }

    /// `upload.bandwidth`
    pub fn upload_bps(&self) -> Option<i64> {
        self.integer_at("/upload/bandwidth")
    }

    /// `packetLoss`
    pub fn packet_loss_pct(&self) -> Option<f64> {
        self.number_at("/packetLoss")
    }
}

/// Reasons a single probe attempt produced no measurement
#[derive(Debug)]
pub enum ProbeError {
    /// The probe did not finish within the allowed time
    Timeout(Duration),

    /// The probe command could not be started
    Spawn(std::io::Error),

    /// The probe exited unsuccessfully
    Exit { code: Option<i32>, stderr: String },

    /// The probe output is not a JSON document
    Malformed(serde_json::Error),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Timeout(timeout) => {
                write!(f, "probe timed out after {}s", timeout.as_secs_f64())
            }
            ProbeError::Spawn(err) => write!(f, "failed to start probe: {}", err),
            ProbeError::Exit { code, stderr } => match code {
                Some(code) => write!(f, "probe exited with status {}: {}", code, stderr.trim()),
                None => write!(f, "probe terminated by signal: {}", stderr.trim()),
            },
            ProbeError::Malformed(err) => write!(f, "malformed probe output: {}", err),
        }
    }
}

impl std::error::Error for ProbeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProbeError::Spawn(err) => Some(err),
            ProbeError::Malformed(err) => Some(err),
            _ => None,
        }
    }
}

/// Executes one measurement against one target
#[async_trait]
pub trait ProbeAdapter: Send + Sync {
    async fn invoke(
        &self,
        target_id: TargetId,
        timeout: Duration,
    ) -> Result<RawPayload, ProbeError>;
}

/// Probe backed by an external command
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
}

impl CommandProbe {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }

    fn args_for(&self, target_id: TargetId) -> Vec<String> {
        let id = target_id.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace(TARGET_PLACEHOLDER, &id))
            .collect()
    }
}

#[async_trait]
impl ProbeAdapter for CommandProbe {
    #[instrument(skip(self), fields(program = %self.program))]
    async fn invoke(
        &self,
        target_id: TargetId,
        timeout: Duration,
    ) -> Result<RawPayload, ProbeError> {
        let args = self.args_for(target_id);
        trace!("running {} {}", self.program, args.join(" "));

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ProbeError::Spawn)?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ProbeError::Timeout(timeout))?
            .map_err(ProbeError::Spawn)?;

        if !output.status.success() {
            return Err(ProbeError::Exit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        RawPayload::parse(text).map_err(ProbeError::Malformed)
    }
}
