//! `pygetpapers` command-line harvester as a provider adapter.
//!
//! The tool is spawned into a fresh temporary directory and its per-paper
//! `eupmc_result.json` files are read back as Europe PMC records. The child is
//! killed if it outlives its timeout, and the directory is removed on every
//! exit path when the `TempDir` guard drops.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use super::europe_pmc::EpmcRecord;
use crate::models::{FetchRequest, Paper};
use crate::sources::{Source, SourceError, SourceHealth};
use crate::utils::normalize_values;

const PROGRAM: &str = "pygetpapers";
const RESULT_FILE: &str = "eupmc_result.json";
const RUN_TIMEOUT: Duration = Duration::from_secs(60);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RESULTS: usize = 100;

/// Harvester-backed source
#[derive(Debug, Clone)]
pub struct PygetpapersSource {
    program: String,
    base_args: Vec<String>,
    run_timeout: Duration,
}

impl PygetpapersSource {
    /// Use the `pygetpapers` executable from `PATH`
    pub fn new() -> Self {
        Self::with_command(PROGRAM, Vec::new())
    }

    /// Use a different program; `base_args` are passed before the search arguments
    pub fn with_command(program: impl Into<String>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
            run_timeout: RUN_TIMEOUT,
        }
    }

    /// Override the timeout of one harvester run
    pub fn run_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.base_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn run(&self, query: &str, limit: usize, output_dir: &Path) -> Result<(), SourceError> {
        let mut command = self.command();
        command
            .arg("-q")
            .arg(query)
            .arg("-o")
            .arg(output_dir)
            .arg("-k")
            .arg(limit.to_string())
            .arg("-j");

        let child = command
            .spawn()
            .map_err(|e| SourceError::Unavailable(format!("Failed to start {}: {}", self.program, e)))?;

        let output = match timeout(self.run_timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(SourceError::Timeout(format!(
                    "{} did not finish within {:?}",
                    self.program, self.run_timeout
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SourceError::Process(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Default for PygetpapersSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Read every `<dir>/*/eupmc_result.json`, in directory-name order.
///
/// Unreadable or invalid files are logged and skipped.
pub(crate) async fn read_results(dir: &Path) -> Result<Vec<Value>, SourceError> {
    let mut folders = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            folders.push(entry.path());
        }
    }
    folders.sort();

    let mut records = Vec::new();
    for folder in folders {
        let path = folder.join(RESULT_FILE);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                tracing::warn!(source = "pygetpapers", path = %path.display(), error = %e, "Skipping unreadable result");
                continue;
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Null) => {}
            Ok(value) => records.push(value),
            Err(e) => {
                tracing::warn!(source = "pygetpapers", path = %path.display(), error = %e, "Skipping invalid result");
            }
        }
    }
    Ok(records)
}

#[async_trait]
impl Source for PygetpapersSource {
    fn id(&self) -> &str {
        "pygetpapers"
    }

    fn name(&self) -> &str {
        "pygetpapers"
    }

    fn max_results(&self) -> usize {
        MAX_RESULTS
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Paper>, SourceError> {
        request.validate()?;
        let limit = request.capped_limit(self.max_results());

        let workdir = tempfile::tempdir()?;
        self.run(request.query.trim(), limit, workdir.path()).await?;

        let records = read_results(workdir.path()).await?;
        let mut papers = normalize_values::<EpmcRecord>(records, self.id());
        papers.truncate(limit);
        Ok(papers)
    }

    async fn health(&self) -> SourceHealth {
        let mut command = self.command();
        command.arg("--version");

        let probe = async {
            let child = command.spawn().ok()?;
            child.wait_with_output().await.ok()
        };

        match timeout(PROBE_TIMEOUT, probe).await {
            Ok(Some(output)) if output.status.success() => SourceHealth::Available,
            _ => SourceHealth::Unavailable,
        }
    }
}
