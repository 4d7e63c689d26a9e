//! Dated insight artifacts produced by a search run.
//!
//! Artifacts are immutable once written. Writes go to a temporary file in
//! the same directory followed by a rename, so a concurrently running
//! trading cycle never observes a partially written file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use common::{Error, Result, StrategyParams};
use serde::{Deserialize, Serialize};

use crate::search::SearchOutcome;

const ARTIFACT_PREFIX: &str = "insight-";
const ARTIFACT_SUFFIX: &str = ".json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightArtifact {
    pub selected_parameters: StrategyParams,
    pub rationale_text: String,
    pub generated_at: DateTime<Utc>,
    pub simulated_score: f64,
    pub nodes_evaluated: usize,
}

impl InsightArtifact {
    pub fn from_outcome(outcome: &SearchOutcome, generated_at: DateTime<Utc>) -> Self {
        Self {
            selected_parameters: outcome.selected_params.clone(),
            rationale_text: outcome.rationale.clone(),
            generated_at,
            simulated_score: outcome.best_score,
            nodes_evaluated: outcome.nodes_evaluated,
        }
    }

    fn file_name(&self) -> String {
        format!(
            "{ARTIFACT_PREFIX}{}{ARTIFACT_SUFFIX}",
            self.generated_at.format("%Y-%m-%d")
        )
    }

    /// Write the artifact atomically into `dir` and return its final path.
    pub fn write_atomic(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        let tmp_path = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(self)?;
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &path)?;
        Ok(path)
    }

    /// Load the most recent dated artifact in `dir`, if any.
    ///
    /// Dated names sort lexically, so the latest artifact is the maximum
    /// matching file name.
    pub fn load_latest(dir: &Path) -> Result<Option<Self>> {
        if !dir.exists() {
            return Ok(None);
        }

        let mut latest: Option<String> = None;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(ARTIFACT_PREFIX) || !name.ends_with(ARTIFACT_SUFFIX) {
                continue;
            }
            if latest.as_deref().map_or(true, |current| name.as_str() > current) {
                latest = Some(name);
            }
        }

        let Some(name) = latest else {
            return Ok(None);
        };

        let raw = fs::read_to_string(dir.join(&name))?;
        let artifact = serde_json::from_str(&raw)
            .map_err(|e| Error::StateCorruption(format!("insight artifact {name}: {e}")))?;
        Ok(Some(artifact))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn artifact(day: u32, score: f64) -> InsightArtifact {
        InsightArtifact {
            selected_parameters: StrategyParams::default(),
            rationale_text: "test rationale".into(),
            generated_at: Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap(),
            simulated_score: score,
            nodes_evaluated: 10,
        }
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = artifact(7, 0.62).write_atomic(dir.path()).unwrap();
        assert!(path.ends_with("insight-2026-03-07.json"));

        let loaded = InsightArtifact::load_latest(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.simulated_score, 0.62);
        assert_eq!(loaded.rationale_text, "test rationale");
    }

    #[test]
    fn latest_artifact_wins() {
        let dir = tempfile::tempdir().unwrap();
        artifact(3, 0.1).write_atomic(dir.path()).unwrap();
        artifact(21, 0.9).write_atomic(dir.path()).unwrap();
        artifact(11, 0.5).write_atomic(dir.path()).unwrap();

        let loaded = InsightArtifact::load_latest(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.simulated_score, 0.9);
    }

    #[test]
    fn missing_dir_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("never-created");
        assert!(InsightArtifact::load_latest(&missing).unwrap().is_none());
    }

    #[test]
    fn no_temporary_file_survives_a_write() {
        let dir = tempfile::tempdir().unwrap();
        artifact(7, 0.62).write_atomic(dir.path()).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn corrupt_artifact_reports_state_corruption() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("insight-2026-03-01.json"), "{not json").unwrap();

        let err = InsightArtifact::load_latest(dir.path()).unwrap_err();
        assert!(matches!(err, Error::StateCorruption(_)));
    }
}
