//! The unit of work run once per arrival

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use volley_http::{HttpClient, HttpError};

/// Why an iteration counts as failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),

    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Request(String),

    #[error("{0}")]
    Other(String),
}

impl From<HttpError> for TaskError {
    fn from(err: HttpError) -> Self {
        if err.is_timeout() {
            TaskError::Timeout
        } else {
            TaskError::Request(err.to_string())
        }
    }
}

/// Work performed for a single arrival
///
/// One instance is shared by every concurrent iteration of a run.
#[async_trait]
pub trait IterationTask: Send + Sync + 'static {
    async fn run(&self, iteration: u64) -> Result<(), TaskError>;
}

#[async_trait]
impl<T: IterationTask + ?Sized> IterationTask for Arc<T> {
    async fn run(&self, iteration: u64) -> Result<(), TaskError> {
        (**self).run(iteration).await
    }
}

/// One GET request against the target URL per iteration
///
/// Transport errors, timeouts and statuses outside 2xx/3xx are failures.
#[derive(Debug)]
pub struct HttpGetTask<C> {
    client: C,
    url: String,
}

impl<C: HttpClient> HttpGetTask<C> {
    pub fn new(client: C, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl<C: HttpClient + 'static> IterationTask for HttpGetTask<C> {
    async fn run(&self, _iteration: u64) -> Result<(), TaskError> {
        let response = self.client.get(&self.url).await?;
        if response.is_expected() {
            Ok(())
        } else {
            Err(TaskError::UnexpectedStatus(response.status))
        }
    }
}

/// Adapts an async closure into an [`IterationTask`]
pub struct FnTask<F>(F);

impl<F> std::fmt::Debug for FnTask<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnTask")
    }
}

pub fn task_fn<F, Fut>(f: F) -> FnTask<F>
where
    F: Fn(u64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    FnTask(f)
}

#[async_trait]
impl<F, Fut> IterationTask for FnTask<F>
where
    F: Fn(u64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    async fn run(&self, iteration: u64) -> Result<(), TaskError> {
        (self.0)(iteration).await
    }
}
