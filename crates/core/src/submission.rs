//! Request and response payloads for job group submission.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job_group::{ChildJob, JobGroup, DEFAULT_TIMEOUT_SECONDS};
use crate::status::{JobGroupStatus, SeedStrategy};
use crate::types::{JobGroupId, Timestamp};

/// Body of `POST /api/job-group`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitJobGroupRequest {
    pub workflow: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
    pub backend_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_strategy: Option<SeedStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_capabilities: Option<Vec<String>>,
}

impl SubmitJobGroupRequest {
    /// A request with only the required fields set.
    pub fn new(workflow: serde_json::Value, backend_ids: Vec<String>) -> Self {
        Self {
            workflow,
            parameters: None,
            backend_ids,
            seed_strategy: None,
            base_seed: None,
            metadata: None,
            timeout_seconds: None,
            required_capabilities: None,
        }
    }

    /// Check the request before it is sent.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.workflow.is_object() {
            return Err(CoreError::Validation(
                "Workflow must be a JSON object".to_string(),
            ));
        }
        if self.backend_ids.is_empty() {
            return Err(CoreError::Validation(
                "At least one backend id is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for id in &self.backend_ids {
            if id.trim().is_empty() {
                return Err(CoreError::Validation(
                    "Backend ids must not be blank".to_string(),
                ));
            }
            if !seen.insert(id.as_str()) {
                return Err(CoreError::Validation(format!(
                    "Duplicate backend id '{id}'"
                )));
            }
        }
        if self.timeout_seconds == Some(0) {
            return Err(CoreError::Validation(
                "Timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Response of `POST /api/job-group`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitJobGroupResponse {
    pub job_group_id: JobGroupId,
    #[serde(default)]
    pub child_jobs: Vec<ChildJob>,
    #[serde(default)]
    pub status: JobGroupStatus,
    pub created_at: Timestamp,
}

impl SubmitJobGroupResponse {
    /// Build the caller-owned group from the submission and its response.
    pub fn into_job_group(self, request: &SubmitJobGroupRequest) -> JobGroup {
        JobGroup {
            id: self.job_group_id,
            panel_id: None,
            child_jobs: self.child_jobs,
            status: self.status,
            seed_strategy: request.seed_strategy.unwrap_or_default(),
            base_seed: request.base_seed,
            timeout_seconds: request.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS),
            metadata: request.metadata.clone().unwrap_or_default(),
            created_at: self.created_at,
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::status::ChildJobStatus;

    fn request() -> SubmitJobGroupRequest {
        SubmitJobGroupRequest::new(json!({"3": {"class_type": "KSampler"}}), vec!["gpu-1".into(), "gpu-2".into()])
    }

    #[test]
    fn valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn empty_backends_rejected() {
        let mut req = request();
        req.backend_ids.clear();
        assert_matches!(req.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn duplicate_backends_rejected() {
        let mut req = request();
        req.backend_ids.push("gpu-1".into());
        assert_matches!(req.validate(), Err(CoreError::Validation(msg)) if msg.contains("gpu-1"));
    }

    #[test]
    fn blank_backend_rejected() {
        let mut req = request();
        req.backend_ids.push("  ".into());
        assert_matches!(req.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut req = request();
        req.timeout_seconds = Some(0);
        assert_matches!(req.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn non_object_workflow_rejected() {
        let mut req = request();
        req.workflow = json!(null);
        assert_matches!(req.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn optional_fields_are_omitted() {
        let body = serde_json::to_value(request()).unwrap();
        assert!(body.get("seed_strategy").is_none());
        assert!(body.get("timeout_seconds").is_none());
        assert_eq!(body["backend_ids"], json!(["gpu-1", "gpu-2"]));
    }

    #[test]
    fn response_builds_job_group() {
        let mut req = request();
        req.seed_strategy = Some(SeedStrategy::Fibonacci);
        req.base_seed = Some(7);

        let response: SubmitJobGroupResponse = serde_json::from_value(json!({
            "job_group_id": "g1",
            "status": "pending",
            "created_at": "2026-01-01T00:00:00Z",
            "child_jobs": [
                {"job_id": "a", "backend_id": "gpu-1", "seed": 7, "status": "pending"},
                {"job_id": "b", "backend_id": "gpu-2", "seed": 8, "status": "pending"}
            ]
        }))
        .unwrap();

        let group = response.into_job_group(&req);
        assert_eq!(group.id, "g1");
        assert_eq!(group.seed_strategy, SeedStrategy::Fibonacci);
        assert_eq!(group.base_seed, Some(7));
        assert_eq!(group.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
        assert_eq!(group.child_jobs[1].seed, 8);
        assert_eq!(group.child_jobs[1].status, ChildJobStatus::Pending);
    }
}
