use crate::types::TestConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const DEFAULT_GITLAB_URL: &str = "https://gitlab.com";

pub struct GitLabClient {
    base_url: String,
    project_id: String,
    trigger_token: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum GitLabError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("GitLab API error: {status} - {body}")]
    Trigger { status: u16, body: String },
    #[error("Unexpected GitLab response: {0}")]
    Parse(String),
}

#[derive(Debug, Serialize)]
struct TriggerPipelineRequest<'a> {
    token: &'a str,
    #[serde(rename = "ref")]
    git_ref: &'a str,
    variables: PipelineVariables<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct PipelineVariables<'a> {
    triggered_by_slack: &'static str,
    slack_user: &'a str,
    slack_channel: &'a str,
    test_suite: &'static str,
    test_environment: &'static str,
}

/// The fields of GitLab's trigger response the bridge reports back to Slack.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineResponse {
    pub id: u64,
    pub web_url: String,
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub status: Option<String>,
}

impl GitLabClient {
    pub fn new(base_url: String, project_id: String, trigger_token: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id,
            trigger_token,
            client: reqwest::Client::new(),
        }
    }

    fn trigger_url(&self) -> String {
        format!(
            "{}/api/v4/projects/{}/trigger/pipeline",
            self.base_url,
            urlencoding::encode(&self.project_id)
        )
    }

    /// Creates a pipeline on `config.branch` with the test selection passed
    /// as CI variables. One attempt, no retries.
    pub async fn trigger_pipeline(
        &self,
        config: &TestConfig,
        slack_user: &str,
        slack_channel: &str,
    ) -> Result<PipelineResponse, GitLabError> {
        let url = self.trigger_url();
        let payload = TriggerPipelineRequest {
            token: &self.trigger_token,
            git_ref: &config.branch,
            variables: PipelineVariables {
                triggered_by_slack: "true",
                slack_user,
                slack_channel,
                test_suite: config.test_suite.as_str(),
                test_environment: config.environment.as_str(),
            },
        };

        debug!(
            url = %url,
            token_present = !self.trigger_token.is_empty(),
            token_is_trigger_token = self.trigger_token.starts_with("glptt-"),
            "Sending GitLab pipeline trigger"
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| GitLabError::Network(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "GitLab trigger rejected");
            return Err(GitLabError::Trigger {
                status: status.as_u16(),
                body,
            });
        }

        let pipeline: PipelineResponse = response
            .json()
            .await
            .map_err(|e| GitLabError::Parse(e.to_string()))?;

        info!(
            pipeline_id = pipeline.id,
            git_ref = pipeline.git_ref.as_deref().unwrap_or(&config.branch),
            status = pipeline.status.as_deref().unwrap_or("unknown"),
            "GitLab pipeline created"
        );
        Ok(pipeline)
    }
}
