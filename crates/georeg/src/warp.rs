//! Hand-off to the external "translate with GCPs" step.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use georeg_core::{Gcp, GEOGRAPHIC_CRS};
use georeg_features::FeatureAlgorithm;
use serde::Serialize;

#[cfg(feature = "tracing")]
use tracing::instrument;

const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// How long stderr is still collected once the child has exited or been
/// killed. Grandchildren may hold the pipe open indefinitely.
const STDERR_GRACE: Duration = Duration::from_millis(500);

#[derive(thiserror::Error, Debug)]
pub enum TranslateError {
    #[error("cannot start {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("lost track of {}: {source}", .program.display())]
    Wait {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} failed ({status}): {}", .program.display(), .stderr.trim())]
    Failed {
        program: PathBuf,
        status: ExitStatus,
        stderr: String,
    },
    #[error("{} did not finish within {timeout:?}", .program.display())]
    Timeout { program: PathBuf, timeout: Duration },
}

/// Output format, CRS and creation options of the registered raster.
///
/// This is a fixed contract of the pipeline and deliberately not part of the
/// user configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutputPolicy {
    pub format: &'static str,
    pub srs: &'static str,
    pub creation_options: &'static [&'static str],
}

impl Default for OutputPolicy {
    fn default() -> Self {
        Self {
            format: "COG",
            srs: GEOGRAPHIC_CRS,
            creation_options: &["COMPRESS=JPEG"],
        }
    }
}

/// `{dir}/{stem}_{algorithm}_registered.{ext}` next to the target raster.
///
/// The target's extension is kept; `tif` is used when it has none.
pub fn registered_output_path(target: &Path, algorithm: FeatureAlgorithm) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let ext = target
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tif".to_string());
    target.with_file_name(format!("{stem}_{}_registered.{ext}", algorithm.name()))
}

/// Everything the translate step needs for one run.
#[derive(Clone, Debug, PartialEq)]
pub struct TranslateRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub gcps: Vec<Gcp>,
    pub policy: OutputPolicy,
}

impl TranslateRequest {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, gcps: &[Gcp]) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            gcps: gcps.to_vec(),
            policy: OutputPolicy::default(),
        }
    }

    /// Argument vector for `gdal_translate` (without the program name).
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-of".to_string(),
            self.policy.format.to_string(),
            "-a_srs".to_string(),
            self.policy.srs.to_string(),
        ];
        for opt in self.policy.creation_options {
            args.push("-co".to_string());
            args.push(opt.to_string());
        }
        for g in &self.gcps {
            args.push("-gcp".to_string());
            args.extend(g.to_tuple().iter().map(f64::to_string));
        }
        args.push(self.input.to_string_lossy().into_owned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

/// Resamples the target raster using GCPs and writes the output file.
pub trait Translator {
    fn translate(&self, request: &TranslateRequest) -> Result<(), TranslateError>;
}

/// Runs an external `gdal_translate` compatible program.
#[derive(Clone, Debug)]
pub struct GdalTranslate {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl Default for GdalTranslate {
    fn default() -> Self {
        Self::new("gdal_translate")
    }
}

impl GdalTranslate {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, TranslateError> {
        let wait_err = |source| TranslateError::Wait {
            program: self.program.clone(),
            source,
        };
        let Some(timeout) = self.timeout else {
            return child.wait().map_err(wait_err);
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait().map_err(wait_err)? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(TranslateError::Timeout {
                    program: self.program.clone(),
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Translator for GdalTranslate {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(program = %self.program.display(), gcps = request.gcps.len()))
    )]
    fn translate(&self, request: &TranslateRequest) -> Result<(), TranslateError> {
        log::info!(
            "running {} with {} GCPs -> {}",
            self.program.display(),
            request.gcps.len(),
            request.output.display()
        );
        let previous_output = modified_time(&request.output);
        let mut child = Command::new(&self.program)
            .args(request.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TranslateError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // drain stderr concurrently so a chatty child cannot block on a full pipe
        let stderr = child.stderr.take();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut text = String::new();
            if let Some(mut pipe) = stderr {
                let _ = pipe.read_to_string(&mut text);
            }
            let _ = tx.send(text);
        });

        let result = self.wait(&mut child);
        let stderr = rx.recv_timeout(STDERR_GRACE).unwrap_or_default();

        let result = result.and_then(|status| {
            if status.success() {
                Ok(())
            } else {
                Err(TranslateError::Failed {
                    program: self.program.clone(),
                    status,
                    stderr,
                })
            }
        });

        if result.is_err() {
            remove_if_written(&request.output, previous_output);
        }
        result
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Remove `output` if it was created or rewritten since `previous` was taken.
/// An older file the failed run never touched is left alone.
fn remove_if_written(output: &Path, previous: Option<SystemTime>) {
    let Some(current) = modified_time(output) else {
        return;
    };
    if previous == Some(current) {
        log::debug!("keeping untouched {}", output.display());
        return;
    }
    log::warn!("removing partial output {}", output.display());
    if let Err(e) = fs::remove_file(output) {
        log::warn!("cannot remove {}: {e}", output.display());
    }
}
