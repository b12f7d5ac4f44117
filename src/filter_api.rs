use crate::mute_manager::filter_model::{
    FilterAction, FilterContext, FilterKeyword, FilterV1, FilterV2, HashTag,
};
use async_trait::async_trait;
use std::future::Future;
use thiserror::Error;
use tokio::time::{timeout, Duration};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    /// The endpoint does not exist. For filters this means the server lacks that API version.
    #[error("not found")]
    NotFound,
    #[error("server rejected the request ({status}): {message}")]
    ServerRejected { status: u16, message: String },
    #[error("request timed out")]
    Timeout,
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl ApiError {
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            404 => ApiError::NotFound,
            400..=499 => ApiError::ServerRejected {
                status,
                message: message.into(),
            },
            _ => ApiError::Unknown(format!("HTTP {}: {}", status, message.into())),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Fields sent when updating a legacy filter. `None` leaves the server value untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterV1Update {
    pub phrase: String,
    pub contexts: Vec<FilterContext>,
    pub irreversible: Option<bool>,
    pub whole_word: Option<bool>,
    pub expires_in_seconds: Option<u64>,
}

// MARK: - Collaborators

/// The server's filter endpoints, in both API versions
#[async_trait]
pub trait FilterApi: Send + Sync {
    async fn list_filters_v2(&self) -> ApiResult<Vec<FilterV2>>;

    async fn list_filters_v1(&self) -> ApiResult<Vec<FilterV1>>;

    async fn create_filter_v2(
        &self,
        title: &str,
        contexts: &[FilterContext],
        action: FilterAction,
        expires_in_seconds: Option<u64>,
    ) -> ApiResult<FilterV2>;

    async fn add_filter_keyword(
        &self,
        filter_id: &str,
        keyword: &str,
        whole_word: bool,
    ) -> ApiResult<FilterKeyword>;

    async fn create_filter_v1(
        &self,
        phrase: &str,
        contexts: &[FilterContext],
        irreversible: bool,
        whole_word: bool,
        expires_in_seconds: Option<u64>,
    ) -> ApiResult<FilterV1>;

    async fn update_filter_v2(&self, id: &str, contexts: &[FilterContext])
        -> ApiResult<FilterV2>;

    async fn update_filter_v1(&self, id: &str, update: FilterV1Update) -> ApiResult<FilterV1>;

    async fn delete_filter_v2(&self, id: &str) -> ApiResult<()>;

    async fn delete_filter_v1(&self, id: &str) -> ApiResult<()>;
}

/// Hashtag entity endpoints
#[async_trait]
pub trait TagApi: Send + Sync {
    async fn tag(&self, name: &str) -> ApiResult<HashTag>;

    async fn follow_tag(&self, name: &str) -> ApiResult<HashTag>;

    async fn unfollow_tag(&self, name: &str) -> ApiResult<HashTag>;
}

/// Runs a collaborator call, turning an elapsed deadline into `ApiError::Timeout`
pub async fn with_timeout<T, F>(limit: Duration, request: F) -> ApiResult<T>
where
    F: Future<Output = ApiResult<T>>,
{
    match timeout(limit, request).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Timeout),
    }
}
