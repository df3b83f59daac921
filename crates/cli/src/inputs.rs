//! What the `fanout` binary should do, read from environment variables.
//!
//! | Variable           | Required | Description                                  |
//! |--------------------|----------|----------------------------------------------|
//! | `WATCH_GROUP_ID`   | no       | Attach to an existing group instead of submitting |
//! | `WORKFLOW_PATH`    | submit   | Path to the workflow JSON file               |
//! | `BACKEND_IDS`      | submit   | Comma-separated backend ids                  |
//! | `SEED_STRATEGY`    | no       | `random`, `sequential`, `fibonacci`, `golden_ratio` |
//! | `BASE_SEED`        | no       | Starting seed                                |
//! | `JOB_TIMEOUT_SECS` | no       | Group timeout in seconds                     |

use std::path::{Path, PathBuf};

use fanout_core::error::CoreError;
use fanout_core::status::SeedStrategy;
use fanout_core::submission::SubmitJobGroupRequest;

/// Errors raised while reading binary inputs.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("Invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },

    #[error("Failed to read workflow {}: {source}", .path.display())]
    ReadWorkflow {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Workflow {} is not valid JSON: {source}", .path.display())]
    ParseWorkflow {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Request(#[from] CoreError),
}

/// Run mode selected by the environment.
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    /// Submit a new job group and follow it.
    Submit(SubmitInputs),
    /// Follow a group that already exists on the gateway.
    Watch { job_group_id: String },
}

/// Everything needed to build a submission except the workflow body.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitInputs {
    pub workflow_path: PathBuf,
    pub backend_ids: Vec<String>,
    pub seed_strategy: Option<SeedStrategy>,
    pub base_seed: Option<i64>,
    pub timeout_seconds: Option<u64>,
}

impl Mode {
    pub fn from_env() -> Result<Self, InputError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, InputError> {
        let present = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(id) = present("WATCH_GROUP_ID") {
            return Ok(Self::Watch {
                job_group_id: id.trim().to_string(),
            });
        }

        let workflow_path = present("WORKFLOW_PATH")
            .map(PathBuf::from)
            .ok_or(InputError::Missing("WORKFLOW_PATH"))?;
        let backend_ids = present("BACKEND_IDS")
            .map(|raw| split_ids(&raw))
            .ok_or(InputError::Missing("BACKEND_IDS"))?;

        let seed_strategy = present("SEED_STRATEGY")
            .map(|raw| {
                raw.trim().parse::<SeedStrategy>().map_err(|_| InputError::Invalid {
                    var: "SEED_STRATEGY",
                    value: raw,
                })
            })
            .transpose()?;
        let base_seed = parse_optional(&present, "BASE_SEED")?;
        let timeout_seconds = parse_optional(&present, "JOB_TIMEOUT_SECS")?;

        Ok(Self::Submit(SubmitInputs {
            workflow_path,
            backend_ids,
            seed_strategy,
            base_seed,
            timeout_seconds,
        }))
    }
}

impl SubmitInputs {
    /// Build and validate the submission around `workflow`.
    pub fn into_request(
        self,
        workflow: serde_json::Value,
    ) -> Result<SubmitJobGroupRequest, InputError> {
        let mut request = SubmitJobGroupRequest::new(workflow, self.backend_ids);
        request.seed_strategy = self.seed_strategy;
        request.base_seed = self.base_seed;
        request.timeout_seconds = self.timeout_seconds;
        request.validate()?;
        Ok(request)
    }
}

/// Read a workflow JSON file.
pub fn read_workflow(path: &Path) -> Result<serde_json::Value, InputError> {
    let raw = std::fs::read_to_string(path).map_err(|source| InputError::ReadWorkflow {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| InputError::ParseWorkflow {
        path: path.to_path_buf(),
        source,
    })
}

fn split_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_optional<T: std::str::FromStr>(
    present: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, InputError> {
    present(var)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| InputError::Invalid { var, value: raw })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| map.get(var).cloned()
    }

    #[test]
    fn watch_mode_takes_precedence() {
        let mode = Mode::from_lookup(lookup(&[
            ("WATCH_GROUP_ID", " g-42 "),
            ("WORKFLOW_PATH", "wf.json"),
        ]))
        .unwrap();
        assert_eq!(
            mode,
            Mode::Watch {
                job_group_id: "g-42".to_string()
            }
        );
    }

    #[test]
    fn submit_mode_parses_all_inputs() {
        let mode = Mode::from_lookup(lookup(&[
            ("WORKFLOW_PATH", "wf.json"),
            ("BACKEND_IDS", "gpu-1, gpu-2,,gpu-3 "),
            ("SEED_STRATEGY", "golden_ratio"),
            ("BASE_SEED", "1234"),
            ("JOB_TIMEOUT_SECS", "900"),
        ]))
        .unwrap();

        let inputs = assert_matches!(mode, Mode::Submit(inputs) => inputs);
        assert_eq!(inputs.workflow_path, PathBuf::from("wf.json"));
        assert_eq!(inputs.backend_ids, vec!["gpu-1", "gpu-2", "gpu-3"]);
        assert_eq!(inputs.seed_strategy, Some(SeedStrategy::GoldenRatio));
        assert_eq!(inputs.base_seed, Some(1234));
        assert_eq!(inputs.timeout_seconds, Some(900));
    }

    #[test]
    fn submit_mode_requires_workflow_and_backends() {
        assert_matches!(
            Mode::from_lookup(lookup(&[("BACKEND_IDS", "gpu-1")])),
            Err(InputError::Missing("WORKFLOW_PATH"))
        );
        assert_matches!(
            Mode::from_lookup(lookup(&[("WORKFLOW_PATH", "wf.json"), ("BACKEND_IDS", "  ")])),
            Err(InputError::Missing("BACKEND_IDS"))
        );
    }

    #[test]
    fn bad_values_are_named() {
        let base = [("WORKFLOW_PATH", "wf.json"), ("BACKEND_IDS", "gpu-1")];

        let mut pairs = base.to_vec();
        pairs.push(("SEED_STRATEGY", "chaotic"));
        assert_matches!(
            Mode::from_lookup(lookup(&pairs)),
            Err(InputError::Invalid { var: "SEED_STRATEGY", .. })
        );

        let mut pairs = base.to_vec();
        pairs.push(("JOB_TIMEOUT_SECS", "-5"));
        assert_matches!(
            Mode::from_lookup(lookup(&pairs)),
            Err(InputError::Invalid { var: "JOB_TIMEOUT_SECS", .. })
        );
    }

    #[test]
    fn into_request_validates() {
        let inputs = SubmitInputs {
            workflow_path: PathBuf::from("wf.json"),
            backend_ids: vec!["gpu-1".into(), "gpu-1".into()],
            seed_strategy: None,
            base_seed: None,
            timeout_seconds: None,
        };
        assert_matches!(
            inputs.clone().into_request(json!({"3": {}})),
            Err(InputError::Request(CoreError::Validation(_)))
        );

        let inputs = SubmitInputs {
            backend_ids: vec!["gpu-1".into(), "gpu-2".into()],
            timeout_seconds: Some(120),
            ..inputs
        };
        let request = inputs.into_request(json!({"3": {}})).unwrap();
        assert_eq!(request.backend_ids.len(), 2);
        assert_eq!(request.timeout_seconds, Some(120));
    }

    #[test]
    fn missing_workflow_file_is_reported() {
        let err = read_workflow(Path::new("/nonexistent/fanout/wf.json")).unwrap_err();
        assert_matches!(err, InputError::ReadWorkflow { .. });
    }
}
