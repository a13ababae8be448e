use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{ImportError, ImportReceipt, ImportRequest, TimelineImporter};
use crate::sanitize;

/// Runs the `timesketch` CLI client.
pub struct TimesketchCli {
    program: PathBuf,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct SketchSummary {
    id: i64,
}

impl TimesketchCli {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Output, ImportError> {
        let program = self.program.display().to_string();
        debug!("Running {} {}", program, args.join(" "));

        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ImportError::Spawn {
                program: program.clone(),
                source: e,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ImportError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| ImportError::Spawn { program, source: e })?;

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ImportError::Failed {
                code,
                stderr: sanitize::preview(stderr.trim(), 500),
            });
        }

        Ok(output)
    }
}

#[async_trait]
impl TimelineImporter for TimesketchCli {
    async fn import(&self, request: &ImportRequest) -> Result<ImportReceipt, ImportError> {
        if request.timeline_name.starts_with('-') {
            return Err(ImportError::InvalidArgument(format!(
                "timeline name '{}' looks like a flag",
                request.timeline_name
            )));
        }
        let path = request.artifact.to_str().ok_or_else(|| {
            ImportError::InvalidArgument("artifact path is not valid UTF-8".to_string())
        })?;
        // A leading dash would be parsed as an option by the client.
        let path = if path.starts_with('-') {
            format!("./{}", path)
        } else {
            path.to_string()
        };
        let sketch = request.collection_id.to_string();

        let output = self
            .run(&[
                "--sketch",
                &sketch,
                "import",
                "--name",
                &request.timeline_name,
                &path,
            ])
            .await?;

        info!(
            "Imported timeline {} into sketch {}",
            request.timeline_name, request.collection_id
        );
        Ok(ImportReceipt {
            output: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        })
    }

    async fn create_collection(&self, name: &str) -> Result<i64, ImportError> {
        if name.trim().is_empty() {
            return Err(ImportError::InvalidArgument("sketch name is empty".to_string()));
        }

        self.run(&["--output-format", "json", "sketch", "create", "--name", name])
            .await?;

        // The create command does not reliably echo the new id; the newest
        // sketch is the highest id in the listing.
        let listing = self
            .run(&["--output-format", "json", "sketch", "list"])
            .await?;
        let sketches: Vec<SketchSummary> = serde_json::from_slice(&listing.stdout)
            .map_err(|e| ImportError::InvalidOutput(format!("sketch list: {}", e)))?;

        let id = sketches
            .iter()
            .map(|s| s.id)
            .max()
            .ok_or_else(|| ImportError::InvalidOutput("sketch list is empty".to_string()))?;

        if sketches.len() > 1 {
            debug!("Picked sketch {} out of {}", id, sketches.len());
        } else {
            warn!("Sketch listing had a single entry; assuming it is the new one");
        }
        info!("Created sketch '{}' (ID: {})", name, id);
        Ok(id)
    }
}
