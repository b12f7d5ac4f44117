use super::filter_model::{tag_with_hash, FilterV1, FilterV2, TrackedFilter};
use crate::filter_api::{with_timeout, ApiResult, FilterApi};
use tokio::time::Duration;

/// Which filter API the server answered with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterApiVersion {
    V2,
    V1,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuteFilterMatch {
    V2(FilterV2),
    V1(FilterV1),
    /// Nothing mutes the hashtag. The version records which API was consulted.
    NoMatch(FilterApiVersion),
}

impl MuteFilterMatch {
    pub fn is_muted(&self) -> bool {
        !matches!(self, MuteFilterMatch::NoMatch(_))
    }

    pub fn api_version(&self) -> FilterApiVersion {
        match self {
            MuteFilterMatch::V2(_) => FilterApiVersion::V2,
            MuteFilterMatch::V1(_) => FilterApiVersion::V1,
            MuteFilterMatch::NoMatch(version) => *version,
        }
    }

    pub fn into_tracked(self) -> Option<TrackedFilter> {
        match self {
            MuteFilterMatch::V2(filter) => Some(TrackedFilter::V2(filter)),
            MuteFilterMatch::V1(filter) => Some(TrackedFilter::V1(filter)),
            MuteFilterMatch::NoMatch(_) => None,
        }
    }
}

/// Finds the filter muting `hashtag` (given without the leading `#`) in the home timeline.
///
/// The v2 filters are consulted first. A `NotFound` answer means the server only
/// has the legacy API, which is then listed once. Every other error is returned
/// as-is, and callers must treat the mute state as unknown.
pub async fn find_mute_filter(
    api: &dyn FilterApi,
    hashtag: &str,
    request_timeout: Duration,
) -> ApiResult<MuteFilterMatch> {
    let tag = tag_with_hash(hashtag);

    match with_timeout(request_timeout, api.list_filters_v2()).await {
        Ok(filters) => {
            log::debug!("Checking {} v2 filters for {}", filters.len(), tag);
            Ok(filters
                .into_iter()
                .find(|f| f.matches_hashtag_in_home(&tag))
                .map_or(MuteFilterMatch::NoMatch(FilterApiVersion::V2), MuteFilterMatch::V2))
        }
        Err(error) if error.is_not_found() => {
            log::debug!("Server has no v2 filters, falling back to v1 for {}", tag);
            let filters = with_timeout(request_timeout, api.list_filters_v1())
                .await
                .map_err(|e| {
                    log::error!("Error getting v1 filters: {}", e);
                    e
                })?;
            Ok(filters
                .into_iter()
                .find(|f| f.matches_hashtag_in_home(&tag))
                .map_or(MuteFilterMatch::NoMatch(FilterApiVersion::V1), MuteFilterMatch::V1))
        }
        Err(error) => {
            log::error!("Error getting filters: {}", error);
            Err(error)
        }
    }
}
