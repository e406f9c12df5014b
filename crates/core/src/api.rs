use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::status::{LogLine, TaskStatusSnapshot};
use crate::{Error, Result};

/// Lines requested per log page.
pub const LOG_BATCH_LINES: u64 = 500;
/// Hard safety cap on lines fetched for one reconstruction.
pub const LOG_MAX_LINES: u64 = 10_000;

pub trait TaskApi {
    fn provider(&self) -> &'static str;

    fn fetch_status<'a>(
        &'a self,
        upid: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TaskStatusSnapshot>> + Send + 'a>>;

    fn fetch_log_page<'a>(
        &'a self,
        upid: &'a str,
        start: u64,
        limit: u64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<LogLine>>> + Send + 'a>>;
}

/// Fetches a task's full log in bounded pages, stopping at the first
/// short page or at [`LOG_MAX_LINES`]. No retries: a failed page fails
/// the fetch, and callers degrade to an empty log.
pub async fn fetch_task_log<A: TaskApi + ?Sized>(api: &A, upid: &str) -> Result<Vec<LogLine>> {
    let mut lines: Vec<LogLine> = Vec::new();

    loop {
        let start = lines.len() as u64;
        let remaining = LOG_MAX_LINES.saturating_sub(start);
        if remaining == 0 {
            warn!(
                event = "tasklog.capped",
                upid = %upid,
                max_lines = LOG_MAX_LINES,
                "tasklog.capped"
            );
            break;
        }

        let limit = LOG_BATCH_LINES.min(remaining);
        let page = api.fetch_log_page(upid, start, limit).await?;
        let got = page.len() as u64;
        debug!(
            event = "tasklog.page",
            upid = %upid,
            start,
            got,
            "tasklog.page"
        );
        lines.extend(page);
        if got < limit {
            break;
        }
    }

    Ok(lines)
}

#[derive(Debug, Clone)]
pub struct ClusterApiConfig {
    pub base_url: String,
    pub node: String,
    pub token_id: String,
    pub token_secret: String,
}

/// Client for the cluster management HTTP API.
pub struct ClusterApiClient {
    config: ClusterApiConfig,
    client: reqwest::Client,
}

impl ClusterApiClient {
    pub fn new(config: ClusterApiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn task_url(&self, upid: &str, leaf: &str) -> String {
        format!(
            "{}/api2/json/nodes/{}/tasks/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.node,
            upid,
            leaf
        )
    }

    fn auth_header(&self) -> String {
        format!(
            "PVEAPIToken={}={}",
            self.config.token_id, self.config.token_secret
        )
    }

    async fn get_data<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, u64)],
    ) -> Result<T> {
        let res = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Api {
                message: format!("request failed: {e}"),
            })?;

        let status = res.status();
        let body = res.text().await.map_err(|e| Error::Api {
            message: format!("read response failed: {e}"),
        })?;

        if !status.is_success() {
            return Err(Error::Api {
                message: format!("http {status}: {body}"),
            });
        }

        let parsed: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| Error::Api {
            message: format!("invalid json: {e}; body={body}"),
        })?;

        parsed.data.ok_or_else(|| Error::Api {
            message: "missing response data".to_string(),
        })
    }
}

impl TaskApi for ClusterApiClient {
    fn provider(&self) -> &'static str {
        "cluster.http"
    }

    fn fetch_status<'a>(
        &'a self,
        upid: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TaskStatusSnapshot>> + Send + 'a>> {
        Box::pin(async move { self.get_data(self.task_url(upid, "status"), &[]).await })
    }

    fn fetch_log_page<'a>(
        &'a self,
        upid: &'a str,
        start: u64,
        limit: u64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<LogLine>>> + Send + 'a>> {
        Box::pin(async move {
            self.get_data(
                self.task_url(upid, "log"),
                &[("start", start), ("limit", limit)],
            )
            .await
        })
    }
}

/// In-process double for tests and offline use.
#[derive(Debug, Default)]
pub struct InMemoryTaskApi {
    inner: Mutex<HashMap<String, InMemoryTask>>,
}

#[derive(Debug, Clone)]
struct InMemoryTask {
    status: TaskStatusSnapshot,
    log: Vec<LogLine>,
}

impl InMemoryTaskApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_task(&self, upid: &str, status: TaskStatusSnapshot, log: Vec<LogLine>) {
        self.inner
            .lock()
            .await
            .insert(upid.to_string(), InMemoryTask { status, log });
    }
}

impl TaskApi for InMemoryTaskApi {
    fn provider(&self) -> &'static str {
        "test.mem"
    }

    fn fetch_status<'a>(
        &'a self,
        upid: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TaskStatusSnapshot>> + Send + 'a>> {
        Box::pin(async move {
            self.inner
                .lock()
                .await
                .get(upid)
                .map(|task| task.status.clone())
                .ok_or_else(|| Error::Api {
                    message: format!("unknown task: {upid}"),
                })
        })
    }

    fn fetch_log_page<'a>(
        &'a self,
        upid: &'a str,
        start: u64,
        limit: u64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<LogLine>>> + Send + 'a>> {
        Box::pin(async move {
            let inner = self.inner.lock().await;
            let task = inner.get(upid).ok_or_else(|| Error::Api {
                message: format!("unknown task: {upid}"),
            })?;

            let start = (start as usize).min(task.log.len());
            let end = start.saturating_add(limit as usize).min(task.log.len());
            Ok(task.log[start..end].to_vec())
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: Option<T>,
}
