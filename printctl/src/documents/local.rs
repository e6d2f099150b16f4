//! Conversion through a locally installed headless office suite.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::DocumentFormat;
use super::normalizer::{ConversionStrategy, StrategyError};
use crate::config::LocalEngineConfig;

pub struct LocalEngine {
    program: PathBuf,
    timeout: Duration,
}

impl LocalEngine {
    pub fn new(config: &LocalEngineConfig) -> Self {
        Self {
            program: config.program.clone(),
            timeout: config.timeout,
        }
    }

    fn command(&self, source: &Path, output_dir: &Path) -> Command {
        // A private profile per run: concurrent engines sharing one profile lock each other out
        let profile = url::Url::from_directory_path(output_dir.join("profile"))
            .map(|u| format!("-env:UserInstallation={u}"))
            .ok();

        let mut command = Command::new(&self.program);
        command.args(profile);
        command
            .arg("--headless")
            .arg("--norestore")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(output_dir)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl ConversionStrategy for LocalEngine {
    fn name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self, output_dir), fields(source = %source.display(), program = %self.program.display()), err)]
    async fn convert(&self, source: &Path, _format: DocumentFormat, output_dir: &Path) -> Result<PathBuf, StrategyError> {
        let child = self.command(source, output_dir).spawn().map_err(StrategyError::Spawn)?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| StrategyError::TimedOut(self.timeout))??;

        if output.status.success() {
            debug!("Conversion engine exited cleanly");
        } else {
            warn!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Conversion engine exited with failure status"
            );
        }

        // The exit status is unreliable; the expected output file decides
        let stem = source
            .file_stem()
            .ok_or_else(|| StrategyError::NoOutput(format!("{} has no file name", source.display())))?;
        let mut file_name = stem.to_os_string();
        file_name.push(".pdf");
        let expected = output_dir.join(file_name);

        if tokio::fs::try_exists(&expected).await? {
            Ok(expected)
        } else {
            Err(StrategyError::NoOutput(format!(
                "expected {} after engine exited with {}",
                expected.display(),
                output.status
            )))
        }
    }
}
