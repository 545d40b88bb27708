use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::outcome::{OutcomeKind, RequestOutcome};

/// One line of the per-request outcome file.
#[derive(Debug, Serialize)]
struct OutcomeLine<'a> {
    label: &'a str,
    outcome: &'static str,
    status: Option<u16>,
    error: Option<String>,
    latency_ms: f64,
    issued_at: String,
    stage: usize,
    vu: usize,
}

impl<'a> From<&'a RequestOutcome> for OutcomeLine<'a> {
    fn from(outcome: &'a RequestOutcome) -> Self {
        let (kind, error) = match outcome.kind {
            OutcomeKind::Success { .. } => ("success", None),
            OutcomeKind::Failure { .. } => ("failure", None),
            OutcomeKind::Error { kind } => ("error", Some(kind.to_string())),
        };

        Self {
            label: &outcome.label,
            outcome: kind,
            status: outcome.kind.status(),
            error,
            latency_ms: outcome.latency.as_secs_f64() * 1000.0,
            issued_at: outcome.issued_at.to_rfc3339(),
            stage: outcome.stage,
            vu: outcome.vu_id,
        }
    }
}

/// Writes every outcome as a JSON line.
pub(crate) struct OutcomeFileWriter {
    writer: BufWriter<File>,
    line: Vec<u8>,
}

impl OutcomeFileWriter {
    /// Create the file up front so that a bad path fails the run before any traffic is sent.
    pub(crate) fn create(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create outcome file {}", path.display()))?;

        Ok(Self {
            writer: BufWriter::new(File::from_std(file)),
            line: Vec::with_capacity(256),
        })
    }

    pub(crate) async fn write(&mut self, outcome: &RequestOutcome) -> anyhow::Result<()> {
        self.line.clear();
        serde_json::to_writer(&mut self.line, &OutcomeLine::from(outcome))?;
        self.line.push(b'\n');
        self.writer.write_all(&self.line).await?;
        Ok(())
    }

    pub(crate) async fn flush(&mut self) -> anyhow::Result<()> {
        self.writer.flush().await?;
        Ok(())
    }
}
