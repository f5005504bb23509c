use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Plagiarism,
    Generation,
    /// The worker holding the attempt went away before recording an outcome.
    Stalled,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Plagiarism => "plagiarism",
            Stage::Generation => "generation",
            Stage::Stalled => "stalled",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttemptError {
    pub at: DateTime<Utc>,
    pub attempt: i32,
    pub stage: Stage,
    pub detail: String,
}

/// Returns `log` with `entry` appended as a new line.
pub fn append(log: &str, entry: &AttemptError) -> Result<String, serde_json::Error> {
    let line = serde_json::to_string(entry)?;
    if log.is_empty() {
        Ok(line)
    } else {
        Ok(format!("{log}\n{line}"))
    }
}

pub fn entries(log: &str) -> Vec<AttemptError> {
    log.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}
