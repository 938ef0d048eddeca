//! Decide whether a stage has to run, based on the artifacts it produces.
//!
//! The presence of non-empty output files is the only done/not-done state of
//! the pipeline.  Optionally, a completion marker with the artifact sizes is
//! written after each stage so that truncated leftovers of an interrupted run
//! can be told apart from complete outputs.

use std::path::{Path, PathBuf};

use crate::common::{io::write_atomically, worker_version};

/// Name of the directory below the analysis directory holding the markers.
pub const MARKER_DIR: &str = ".markers";

/// Whether `path` exists and is not empty.
pub fn is_present(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.len() > 0)
        .unwrap_or(false)
}

/// Whether a stage with the given expected artifacts has to run.
///
/// Returns `true` unless every path exists with non-zero size.  A stage
/// without declared artifacts always runs.
pub fn should_run<P>(expected: &[P]) -> bool
where
    P: AsRef<Path>,
{
    expected.is_empty() || !expected.iter().all(|p| is_present(p.as_ref()))
}

/// One artifact as recorded in a completion marker.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ArtifactRecord {
    pub path: PathBuf,
    pub size: u64,
}

/// Completion marker written after a stage produced all of its outputs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CompletionMarker {
    pub stage: String,
    pub worker_version: String,
    pub finished: chrono::DateTime<chrono::Utc>,
    pub artifacts: Vec<ArtifactRecord>,
}

/// Path of the marker for `stage` below `analysis_dir`.
pub fn marker_path(analysis_dir: &Path, stage: &str) -> PathBuf {
    let file_name = stage
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect::<String>();
    analysis_dir.join(MARKER_DIR).join(format!("{file_name}.json"))
}

/// Write the completion marker for `stage`.
pub fn write_marker<P>(analysis_dir: &Path, stage: &str, outputs: &[P]) -> Result<(), anyhow::Error>
where
    P: AsRef<Path>,
{
    let artifacts = outputs
        .iter()
        .map(|p| {
            let size = std::fs::metadata(p.as_ref())?.len();
            Ok(ArtifactRecord {
                path: p.as_ref().to_path_buf(),
                size,
            })
        })
        .collect::<Result<Vec<_>, std::io::Error>>()?;
    let marker = CompletionMarker {
        stage: stage.to_owned(),
        worker_version: worker_version().to_owned(),
        finished: chrono::Utc::now(),
        artifacts,
    };

    let path = marker_path(analysis_dir, stage);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_atomically(&path, |w| {
        serde_json::to_writer_pretty(w, &marker)?;
        Ok(())
    })?;
    tracing::trace!("wrote completion marker {:?}", &path);
    Ok(())
}

/// Whether the marker for `stage` exists and matches the current artifacts.
pub fn marker_matches<P>(analysis_dir: &Path, stage: &str, outputs: &[P]) -> bool
where
    P: AsRef<Path>,
{
    let path = marker_path(analysis_dir, stage);
    let marker: CompletionMarker = match std::fs::read_to_string(&path)
        .map_err(anyhow::Error::from)
        .and_then(|s| serde_json::from_str(&s).map_err(anyhow::Error::from))
    {
        Ok(marker) => marker,
        Err(e) => {
            tracing::debug!("no usable marker for {}: {}", stage, e);
            return false;
        }
    };

    outputs.iter().all(|p| {
        let current = std::fs::metadata(p.as_ref()).map(|m| m.len()).ok();
        marker
            .artifacts
            .iter()
            .any(|a| a.path == p.as_ref() && Some(a.size) == current)
    })
}

/// The gate as used by the stage runner.
#[derive(Debug, Clone)]
pub struct StageGate {
    analysis_dir: PathBuf,
    verify_markers: bool,
}

impl StageGate {
    pub fn new(analysis_dir: &Path, verify_markers: bool) -> Self {
        Self {
            analysis_dir: analysis_dir.to_path_buf(),
            verify_markers,
        }
    }

    /// Whether the stage `stage` producing `outputs` has to run.
    pub fn must_run<P>(&self, stage: &str, outputs: &[P]) -> bool
    where
        P: AsRef<Path>,
    {
        if should_run(outputs) {
            return true;
        }
        if self.verify_markers && !marker_matches(&self.analysis_dir, stage, outputs) {
            tracing::warn!(
                "outputs of {} are present but do not match their completion marker, re-running",
                stage
            );
            return true;
        }
        false
    }

    /// Record successful completion of `stage`.
    pub fn complete<P>(&self, stage: &str, outputs: &[P]) -> Result<(), anyhow::Error>
    where
        P: AsRef<Path>,
    {
        if outputs.is_empty() {
            return Ok(());
        }
        write_marker(&self.analysis_dir, stage, outputs)
    }
}
