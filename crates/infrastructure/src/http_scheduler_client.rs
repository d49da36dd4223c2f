use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orbit_application::{
    BackfillRequest, ExternalBackfill, ExternalRunRecord, ExternalSchedulerPort,
    ExternalTaskInstance, ScheduleRequest, SchedulerClientProvider, TriggerRunRequest,
    TriggeredRun,
};
use orbit_core::{AppError, AppResult};
use orbit_domain::{BackfillId, Cluster, ClusterId, ExternalRunId};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;
use url::Url;

mod backfills;
mod runs;
mod wire;

/// Transport settings shared by every HTTP scheduler client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSchedulerSettings {
    request_timeout: Duration,
    max_attempts: u8,
    retry_backoff_ms: u64,
    auth_token: Option<String>,
}

impl HttpSchedulerSettings {
    /// Creates validated settings.
    pub fn new(
        request_timeout: Duration,
        max_attempts: u8,
        retry_backoff_ms: u64,
        auth_token: Option<String>,
    ) -> AppResult<Self> {
        if request_timeout.is_zero() {
            return Err(AppError::Validation(
                "scheduler request timeout must be greater than zero".to_owned(),
            ));
        }

        if max_attempts == 0 {
            return Err(AppError::Validation(
                "scheduler max attempts must be at least one".to_owned(),
            ));
        }

        Ok(Self {
            request_timeout,
            max_attempts,
            retry_backoff_ms: retry_backoff_ms.max(50),
            auth_token: auth_token.filter(|token| !token.trim().is_empty()),
        })
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Builds the shared HTTP client.
    pub fn build_http_client(&self) -> AppResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|error| AppError::Internal(format!("failed to build http client: {error}")))
    }
}

impl Default for HttpSchedulerSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_attempts: 3,
            retry_backoff_ms: 200,
            auth_token: None,
        }
    }
}

/// Scheduler port adapter for one orchestrator speaking a REST v2 API.
pub struct HttpSchedulerClient {
    cluster_id: ClusterId,
    base_url: Url,
    http_client: reqwest::Client,
    settings: HttpSchedulerSettings,
}

impl HttpSchedulerClient {
    /// Creates a client for one cluster endpoint.
    pub fn new(
        cluster: &Cluster,
        http_client: reqwest::Client,
        settings: HttpSchedulerSettings,
    ) -> AppResult<Self> {
        let base_url = Url::parse(cluster.endpoint()).map_err(|error| {
            AppError::Validation(format!(
                "cluster '{}' endpoint '{}' is not a valid url: {error}",
                cluster.id(),
                cluster.endpoint()
            ))
        })?;

        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(AppError::Validation(format!(
                "cluster '{}' endpoint must use http or https",
                cluster.id()
            )));
        }

        Ok(Self {
            cluster_id: cluster.id().clone(),
            base_url,
            http_client,
            settings,
        })
    }

    /// Builds `{endpoint}/api/v2/{segments...}` with each segment escaped.
    fn api_url(&self, segments: &[&str]) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                AppError::Validation(format!(
                    "cluster '{}' endpoint cannot carry a path",
                    self.cluster_id
                ))
            })?;
            path.pop_if_empty().push("api").push("v2");
            for segment in segments {
                path.push(segment);
            }
        }

        Ok(url)
    }

    /// Builds the orchestrator UI link for one run.
    fn run_ui_url(&self, workflow_external_id: &str, external_run_id: &str) -> Option<String> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .push("dags")
            .push(workflow_external_id)
            .push("runs")
            .push(external_run_id);
        Some(url.to_string())
    }

    fn unreachable(&self, reason: impl Into<String>) -> AppError {
        AppError::ClusterUnreachable {
            cluster_id: self.cluster_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Sends one request, retrying transport errors, 5xx and 429 with
    /// linear backoff. Exhausted retries surface as `ClusterUnreachable`.
    async fn send_with_retry<F>(&self, operation: &str, mut build: F) -> AppResult<reqwest::Response>
    where
        F: FnMut(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_u8;
        let mut last_error: Option<String> = None;

        while attempt < self.settings.max_attempts {
            attempt = attempt.saturating_add(1);
            let mut builder = build(&self.http_client);
            if let Some(token) = self.settings.auth_token.as_deref() {
                builder = builder.bearer_auth(token);
            }

            match builder.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response)
                    if response.status().is_server_error()
                        || response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS =>
                {
                    last_error = Some(format!(
                        "transient HTTP status {} for {operation}",
                        response.status()
                    ));
                }
                Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => {
                    return Err(AppError::NotFound(format!(
                        "{operation} on cluster '{}' found nothing",
                        self.cluster_id
                    )));
                }
                Ok(response) if response.status() == reqwest::StatusCode::CONFLICT => {
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<response body unavailable>".to_owned());
                    return Err(AppError::Conflict(format!(
                        "{operation} on cluster '{}' conflicted: {body}",
                        self.cluster_id
                    )));
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<response body unavailable>".to_owned());
                    return Err(AppError::Internal(format!(
                        "{operation} on cluster '{}' failed with status {status}: {body}",
                        self.cluster_id
                    )));
                }
                Err(error) => {
                    last_error = Some(format!("{operation} transport error: {error}"));
                }
            }

            debug!(
                cluster_id = %self.cluster_id,
                operation,
                attempt,
                "retrying scheduler request"
            );

            if attempt < self.settings.max_attempts {
                let delay = self.settings.retry_backoff_ms.saturating_mul(u64::from(attempt));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(self.unreachable(
            last_error.unwrap_or_else(|| format!("{operation} exhausted retries")),
        ))
    }

    async fn send_json<T, F>(&self, operation: &str, build: F) -> AppResult<T>
    where
        T: DeserializeOwned,
        F: FnMut(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        self.send_with_retry(operation, build)
            .await?
            .json::<T>()
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "{operation} on cluster '{}' returned an unreadable body: {error}",
                    self.cluster_id
                ))
            })
    }
}

#[async_trait]
impl ExternalSchedulerPort for HttpSchedulerClient {
    fn cluster_id(&self) -> &ClusterId {
        &self.cluster_id
    }

    async fn trigger_run(&self, request: TriggerRunRequest) -> AppResult<TriggeredRun> {
        self.trigger_run_impl(request).await
    }

    async fn get_run(
        &self,
        workflow_external_id: &str,
        external_run_id: &ExternalRunId,
    ) -> AppResult<ExternalRunRecord> {
        self.get_run_impl(workflow_external_id, external_run_id).await
    }

    async fn stop_run(
        &self,
        workflow_external_id: &str,
        external_run_id: &ExternalRunId,
    ) -> AppResult<()> {
        self.stop_run_impl(workflow_external_id, external_run_id).await
    }

    async fn set_paused(&self, workflow_external_id: &str, paused: bool) -> AppResult<()> {
        let url = self.api_url(&["dags", workflow_external_id])?;
        self.send_with_retry("set_paused", |client| {
            client
                .patch(url.clone())
                .json(&json!({ "is_paused": paused }))
        })
        .await?;
        Ok(())
    }

    async fn create_schedule(&self, request: ScheduleRequest) -> AppResult<()> {
        let url = self.api_url(&["dags", request.workflow_external_id.as_str(), "schedule"])?;
        self.send_with_retry("create_schedule", |client| {
            client.put(url.clone()).json(&json!({
                "cron": request.cron,
                "timezone": request.timezone,
                "artifact_location": request.artifact_location,
            }))
        })
        .await?;
        Ok(())
    }

    async fn delete_schedule(&self, workflow_external_id: &str) -> AppResult<()> {
        let url = self.api_url(&["dags", workflow_external_id, "schedule"])?;
        match self
            .send_with_retry("delete_schedule", |client| client.delete(url.clone()))
            .await
        {
            Ok(_) | Err(AppError::NotFound(_)) => Ok(()),
            Err(error) => Err(error),
        }
    }

    async fn list_recent_runs(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ExternalRunRecord>> {
        self.list_recent_runs_impl(since, limit).await
    }

    async fn list_runs(
        &self,
        workflow_external_id: &str,
        limit: usize,
    ) -> AppResult<Vec<ExternalRunRecord>> {
        self.list_runs_impl(workflow_external_id, limit).await
    }

    async fn get_task_instances(
        &self,
        workflow_external_id: &str,
        external_run_id: &ExternalRunId,
    ) -> AppResult<Vec<ExternalTaskInstance>> {
        self.get_task_instances_impl(workflow_external_id, external_run_id)
            .await
    }

    async fn create_backfill(&self, request: BackfillRequest) -> AppResult<ExternalBackfill> {
        self.create_backfill_impl(request).await
    }

    async fn get_backfill_status(&self, backfill_id: &BackfillId) -> AppResult<ExternalBackfill> {
        self.get_backfill_impl(backfill_id).await
    }

    async fn pause_backfill(&self, backfill_id: &BackfillId) -> AppResult<()> {
        self.backfill_action(backfill_id, "pause").await
    }

    async fn unpause_backfill(&self, backfill_id: &BackfillId) -> AppResult<()> {
        self.backfill_action(backfill_id, "unpause").await
    }

    async fn cancel_backfill(&self, backfill_id: &BackfillId) -> AppResult<()> {
        self.backfill_action(backfill_id, "cancel").await
    }

    async fn is_available(&self) -> bool {
        let Ok(url) = self.api_url(&["monitor", "health"]) else {
            return false;
        };

        self.http_client
            .get(url)
            .send()
            .await
            .is_ok_and(|response| response.status().is_success())
    }
}

/// Builds HTTP scheduler clients that share one connection pool.
#[derive(Clone)]
pub struct HttpSchedulerClientProvider {
    http_client: reqwest::Client,
    settings: HttpSchedulerSettings,
}

impl HttpSchedulerClientProvider {
    /// Creates a provider and its shared HTTP client.
    pub fn new(settings: HttpSchedulerSettings) -> AppResult<Self> {
        Ok(Self {
            http_client: settings.build_http_client()?,
            settings,
        })
    }
}

impl SchedulerClientProvider for HttpSchedulerClientProvider {
    fn client_for(&self, cluster: &Cluster) -> AppResult<Arc<dyn ExternalSchedulerPort>> {
        Ok(Arc::new(HttpSchedulerClient::new(
            cluster,
            self.http_client.clone(),
            self.settings.clone(),
        )?))
    }
}
