//! Invocation of the external VCS-fetcher binary.
//!
//! The core never performs network I/O itself; it shells out to a separate
//! executable for exactly two operations: installing a dependency into a
//! target directory, and a diagnostic version query.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tanmi_schema::{CoreError, Platform};

/// Grace period given to an in-flight fetcher process after a cancellation
/// request before it is abandoned.
const TERMINATION_GRACE: Duration = Duration::from_secs(5);

/// Handle onto the external fetcher binary.
#[derive(Debug, Clone)]
pub struct Fetcher {
    binary: std::path::PathBuf,
}

impl Fetcher {
    pub fn new(binary: impl Into<std::path::PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    /// Locate the fetcher on `PATH`.
    pub fn discover(name: &str) -> Result<Self, CoreError> {
        let path = which::which(name)
            .map_err(|_| CoreError::FetcherError(format!("fetcher binary `{name}` not found on PATH")))?;
        Ok(Self::new(path))
    }

    /// Confirm the fetcher is present and runnable. Must succeed before any
    /// download-issuing operation proceeds.
    pub fn check_present(&self) -> Result<(), CoreError> {
        if !self.binary.exists() && which::which(&self.binary).is_err() {
            return Err(CoreError::FetcherError(format!(
                "fetcher binary {} is not present",
                self.binary.display()
            )));
        }
        Ok(())
    }

    /// Diagnostic version query.
    pub fn version(&self) -> Result<String, CoreError> {
        let output = Command::new(&self.binary)
            .arg("version")
            .output()
            .map_err(|e| CoreError::FetcherError(format!("failed to run fetcher: {e}")))?;

        if !output.status.success() {
            return Err(CoreError::FetcherError(format!(
                "fetcher version query exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Install `lib`'s `commit` into `target_dir`, restricted to
    /// `platform_tags`, using the project's dependency configuration at
    /// `config_path`. Consumes stdout line-wise, logging each line at
    /// `info` as progress. A non-zero exit is a `FetcherError` carrying
    /// stderr.
    pub fn install(
        &self,
        target_dir: &Path,
        config_path: &Path,
        commit: &str,
        platform_tags: &[Platform],
    ) -> Result<(), CoreError> {
        self.check_present()?;

        let platforms_arg = platform_tags.iter().map(Platform::as_str).collect::<Vec<_>>().join(",");

        let mut child = Command::new(&self.binary)
            .arg("install")
            .arg("--target")
            .arg(target_dir)
            .arg("--config")
            .arg(config_path)
            .arg("--commit")
            .arg(commit)
            .arg("--platforms")
            .arg(&platforms_arg)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CoreError::FetcherError(format!("failed to spawn fetcher: {e}")))?;

        // stderr is drained on its own thread so a chatty child can't fill
        // that pipe's buffer and block while we're still reading stdout.
        let stderr = child.stderr.take();
        let stderr_handle = stderr.map(|s| {
            std::thread::spawn(move || {
                use std::io::Read;
                let mut buf = String::new();
                let _ = BufReader::new(s).read_to_string(&mut buf);
                buf
            })
        });

        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                tracing::info!(target: "tanmi_core::fetcher", "{line}");
            }
        }

        let status = child
            .wait()
            .map_err(|e| CoreError::FetcherError(format!("failed to wait on fetcher: {e}")))?;
        let stderr = stderr_handle.and_then(|h| h.join().ok()).unwrap_or_default();

        if !status.success() {
            return Err(CoreError::FetcherError(format!(
                "fetcher exited with {status}: {stderr}"
            )));
        }

        Ok(())
    }

    /// Signal `child` to terminate and give it [`TERMINATION_GRACE`] to
    /// exit before abandoning it. Used when a download is cancelled mid
    /// flight.
    pub fn terminate(&self, child: &mut Child) -> Result<(), CoreError> {
        use wait_timeout::ChildExt;

        let _ = child.kill();
        match child.wait_timeout(TERMINATION_GRACE) {
            Ok(Some(_)) => Ok(()),
            Ok(None) => {
                tracing::warn!("fetcher did not terminate within grace period; abandoning");
                Ok(())
            }
            Err(e) => Err(CoreError::FetcherError(format!("error waiting on fetcher termination: {e}"))),
        }
    }
}
