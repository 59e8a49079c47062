/// Per-group build results and the aggregated report
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::adapter::RunOutput;
use crate::build::source::Language;
use crate::cache::Fingerprint;
use crate::error::BuildError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Cached,
    Built,
    Failed,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Cached => "cached",
            BuildStatus::Built => "built",
            BuildStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

fn millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_nanos() as f64 / 1_000_000.0)
}

/// Time spent in each phase of a group's build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Timings {
    #[serde(rename = "fingerprint_ms", serialize_with = "millis")]
    pub fingerprint: Duration,
    #[serde(rename = "compile_ms", serialize_with = "millis")]
    pub compile: Duration,
    #[serde(rename = "run_ms", serialize_with = "millis")]
    pub run: Duration,
}

/// Outcome of one build group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildResult {
    pub label: String,
    pub language: Option<Language>,
    pub files: Vec<PathBuf>,
    pub status: BuildStatus,
    #[serde(rename = "duration_ms", serialize_with = "millis")]
    pub duration: Duration,
    pub diagnostics: String,
    pub artifact: Option<PathBuf>,
    pub fingerprint: Option<Fingerprint>,
    pub error: Option<BuildError>,
    pub run: Option<RunOutput>,
    pub timings: Timings,
}

impl BuildResult {
    /// A failed result carrying `error`; diagnostics come from the error.
    pub fn failed(
        label: impl Into<String>,
        language: Option<Language>,
        files: Vec<PathBuf>,
        error: BuildError,
    ) -> Self {
        Self {
            label: label.into(),
            language,
            files,
            status: BuildStatus::Failed,
            duration: Duration::ZERO,
            diagnostics: error.diagnostics().unwrap_or_default().to_string(),
            artifact: None,
            fingerprint: None,
            error: Some(error),
            run: None,
            timings: Timings::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status != BuildStatus::Failed
    }
}

/// Phase breakdown for one group, present when profiling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupProfile {
    pub label: String,
    pub status: BuildStatus,
    #[serde(flatten)]
    pub timings: Timings,
    #[serde(rename = "total_ms", serialize_with = "millis")]
    pub total: Duration,
}

/// Ordered outcome of a whole invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub overall_success: bool,
    pub per_group: Vec<BuildResult>,
    #[serde(rename = "total_duration_ms", serialize_with = "millis")]
    pub total_duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Vec<GroupProfile>>,
}

impl Report {
    pub fn failed_groups(&self) -> impl Iterator<Item = &BuildResult> {
        self.per_group.iter().filter(|r| !r.is_success())
    }
}

/// Merge per-group results, already in submission order, into one report.
///
/// An empty result list is vacuously successful.
pub fn aggregate(results: Vec<BuildResult>, total_duration: Duration, profile: bool) -> Report {
    let overall_success = results.iter().all(BuildResult::is_success);

    let profile = profile.then(|| {
        results
            .iter()
            .map(|r| GroupProfile {
                label: r.label.clone(),
                status: r.status,
                timings: r.timings,
                total: r.duration,
            })
            .collect()
    });

    Report {
        overall_success,
        per_group: results,
        total_duration,
        profile,
    }
}

fn secs(duration: Duration) -> String {
    format!("{:.2}s", duration.as_secs_f64())
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.overall_success {
            "SUCCESS"
        } else {
            "FAILED"
        };
        writeln!(
            f,
            "Build {} ({} groups, {})",
            verdict,
            self.per_group.len(),
            secs(self.total_duration)
        )?;

        for result in &self.per_group {
            let detail = match (&result.error, &result.artifact) {
                (Some(error), _) => error.to_string(),
                (None, Some(artifact)) => artifact.display().to_string(),
                (None, None) => String::new(),
            };
            writeln!(
                f,
                "  {:<24} {:<7} {:>8}  {}",
                result.label,
                result.status,
                secs(result.duration),
                detail
            )?;

            if let Some(diagnostics) = result.error.as_ref().and_then(BuildError::diagnostics) {
                for line in diagnostics.lines().filter(|l| !l.trim().is_empty()) {
                    writeln!(f, "      {}", line)?;
                }
            }
        }

        if let Some(profile) = &self.profile {
            writeln!(f)?;
            writeln!(
                f,
                "  {:<24} {:>11} {:>9} {:>9} {:>9}",
                "profile", "fingerprint", "compile", "run", "total"
            )?;
            for group in profile {
                writeln!(
                    f,
                    "  {:<24} {:>11} {:>9} {:>9} {:>9}",
                    group.label,
                    secs(group.timings.fingerprint),
                    secs(group.timings.compile),
                    secs(group.timings.run),
                    secs(group.total)
                )?;
            }
        }

        Ok(())
    }
}
