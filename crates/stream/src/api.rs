//! REST client for the job-group gateway.
//!
//! Wraps submission, status query and cancellation using [`reqwest`].
//! These are the only calls whose failures reach the caller directly;
//! stream-level failures travel through callbacks instead.

use std::time::Duration;

use async_trait::async_trait;
use fanout_core::job_group::{GroupCounts, JobGroup};
use fanout_core::submission::{SubmitJobGroupRequest, SubmitJobGroupResponse};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// HTTP client for the job-group gateway.
#[derive(Debug, Clone)]
pub struct JobGroupApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response of `GET /api/job-groups/{id}`: the full group plus tallies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobGroupStatusResponse {
    #[serde(flatten)]
    pub job_group: JobGroup,
    #[serde(default)]
    pub counts: GroupCounts,
}

/// Errors from the gateway layer.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The HTTP request itself failed (network, DNS, TLS, body decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The gateway rejected a submission.
    #[error("Job group submission failed ({status}): {body}")]
    Submission { status: u16, body: String },

    /// The job group does not exist.
    #[error("Job group {0} not found")]
    NotFound(String),

    /// Any other non-2xx response.
    #[error("Gateway API error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// Cancels job groups on the server.
///
/// Implemented by [`JobGroupApi`]; the registry only needs this one call.
#[async_trait]
pub trait JobGroupCanceller: Send + Sync {
    async fn cancel_job_group(&self, job_group_id: &str) -> Result<(), GatewayError>;
}

impl JobGroupApi {
    /// Create a client for the gateway at `api_url`, e.g. `http://host:8000`.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a job group. Sends `POST /api/job-group`.
    pub async fn submit_job_group(
        &self,
        request: &SubmitJobGroupRequest,
    ) -> Result<SubmitJobGroupResponse, GatewayError> {
        let response = self
            .client
            .post(format!("{}/api/job-group", self.api_url))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Submission {
                status: status.as_u16(),
                body: read_body(response).await,
            });
        }

        let submitted: SubmitJobGroupResponse = response.json().await?;
        tracing::info!(
            job_group_id = %submitted.job_group_id,
            children = submitted.child_jobs.len(),
            "Job group submitted",
        );
        Ok(submitted)
    }

    /// Fetch the full status of a job group. Sends `GET /api/job-groups/{id}`.
    pub async fn get_job_group(
        &self,
        job_group_id: &str,
    ) -> Result<JobGroupStatusResponse, GatewayError> {
        let response = self
            .client
            .get(self.group_url(job_group_id))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(job_group_id.to_string()));
        }
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    /// Best-effort cancel. Sends `DELETE /api/job-groups/{id}`; a 404 means
    /// the group is already gone and counts as success.
    pub async fn cancel_job_group(&self, job_group_id: &str) -> Result<(), GatewayError> {
        let response = self
            .client
            .delete(self.group_url(job_group_id))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(job_group_id, "Cancel target already gone");
            return Ok(());
        }
        ensure_success(response).await?;
        tracing::info!(job_group_id, "Job group cancelled");
        Ok(())
    }

    fn group_url(&self, job_group_id: &str) -> String {
        format!("{}/api/job-groups/{}", self.api_url, job_group_id)
    }
}

#[async_trait]
impl JobGroupCanceller for JobGroupApi {
    async fn cancel_job_group(&self, job_group_id: &str) -> Result<(), GatewayError> {
        JobGroupApi::cancel_job_group(self, job_group_id).await
    }
}

// ---- private helpers ----

/// Return the response unchanged on success, or a [`GatewayError::Api`]
/// carrying the status and body text.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        return Err(GatewayError::Api {
            status: status.as_u16(),
            body: read_body(response).await,
        });
    }
    Ok(response)
}

async fn read_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string())
}
