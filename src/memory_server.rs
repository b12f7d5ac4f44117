use crate::filter_api::{ApiError, ApiResult, FilterApi, FilterV1Update, TagApi};
use crate::mute_manager::filter_model::{
    FilterAction, FilterContext, FilterKeyword, FilterV1, FilterV2, HashTag,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use uuid::Uuid;

/// Which filter API the emulated server implements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerFlavor {
    V2,
    V1Only,
    /// Serves both APIs, like a v2 server that kept the legacy endpoints
    Both,
}

impl FromStr for ServerFlavor {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v2" => Ok(ServerFlavor::V2),
            "v1" | "v1only" | "v1_only" => Ok(ServerFlavor::V1Only),
            "both" => Ok(ServerFlavor::Both),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiCall {
    ListFiltersV2,
    ListFiltersV1,
    CreateFilterV2,
    AddFilterKeyword,
    CreateFilterV1,
    UpdateFilterV2,
    UpdateFilterV1,
    DeleteFilterV2,
    DeleteFilterV1,
    Tag,
    FollowTag,
    UnfollowTag,
}

impl ApiCall {
    fn is_v2_filter_call(&self) -> bool {
        matches!(
            self,
            ApiCall::ListFiltersV2
                | ApiCall::CreateFilterV2
                | ApiCall::AddFilterKeyword
                | ApiCall::UpdateFilterV2
                | ApiCall::DeleteFilterV2
        )
    }

    fn is_v1_filter_call(&self) -> bool {
        matches!(
            self,
            ApiCall::ListFiltersV1
                | ApiCall::CreateFilterV1
                | ApiCall::UpdateFilterV1
                | ApiCall::DeleteFilterV1
        )
    }
}

#[derive(Default)]
struct ServerState {
    filters_v2: Vec<FilterV2>,
    filters_v1: Vec<FilterV1>,
    followed_tags: HashMap<String, bool>,
    failures: HashMap<ApiCall, ApiError>,
    calls: Vec<ApiCall>,
}

/// A filter server kept in memory. Serves the simulator binary and the tests.
pub struct InMemoryFilterServer {
    flavor: ServerFlavor,
    state: Mutex<ServerState>,
    paused: watch::Sender<bool>,
}

impl InMemoryFilterServer {
    pub fn new(flavor: ServerFlavor) -> Self {
        let (paused, _) = watch::channel(false);
        InMemoryFilterServer {
            flavor,
            state: Mutex::new(ServerState::default()),
            paused,
        }
    }

    pub fn flavor(&self) -> ServerFlavor {
        self.flavor
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // MARK: - Seeding and inspection

    pub fn with_filter_v2(self, filter: FilterV2) -> Self {
        self.lock().filters_v2.push(filter);
        self
    }

    pub fn with_filter_v1(self, filter: FilterV1) -> Self {
        self.lock().filters_v1.push(filter);
        self
    }

    pub fn with_followed_tag(self, name: &str) -> Self {
        self.lock().followed_tags.insert(name.to_string(), true);
        self
    }

    pub fn filters_v2(&self) -> Vec<FilterV2> {
        self.lock().filters_v2.clone()
    }

    pub fn filters_v1(&self) -> Vec<FilterV1> {
        self.lock().filters_v1.clone()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, call: ApiCall) -> usize {
        self.lock().calls.iter().filter(|c| **c == call).count()
    }

    // MARK: - Fault injection

    /// Makes every subsequent `call` fail with `error` until cleared
    pub fn fail(&self, call: ApiCall, error: ApiError) {
        self.lock().failures.insert(call, error);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Holds every request at the door until `resume` is called
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    async fn admit(&self, call: ApiCall) -> ApiResult<()> {
        let mut paused = self.paused.subscribe();
        // The sender lives as long as `self`, so this only returns once unpaused
        let _ = paused.wait_for(|is_paused| !*is_paused).await;

        let mut state = self.lock();
        state.calls.push(call);
        if let Some(error) = state.failures.get(&call) {
            return Err(error.clone());
        }
        let unsupported = match self.flavor {
            ServerFlavor::V2 => call.is_v1_filter_call(),
            ServerFlavor::V1Only => call.is_v2_filter_call(),
            ServerFlavor::Both => false,
        };
        if unsupported {
            return Err(ApiError::NotFound);
        }
        Ok(())
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn expires_at(expires_in_seconds: Option<u64>) -> ApiResult<Option<DateTime<Utc>>> {
    let Some(secs) = expires_in_seconds else {
        return Ok(None);
    };
    i64::try_from(secs)
        .ok()
        .and_then(ChronoDuration::try_seconds)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .map(Some)
        .ok_or_else(|| ApiError::from_status(422, "Validation failed: Expires in is out of range"))
}

fn require_contexts(contexts: &[FilterContext]) -> ApiResult<()> {
    if contexts.is_empty() {
        return Err(ApiError::from_status(
            422,
            "Validation failed: Context can't be blank",
        ));
    }
    Ok(())
}

#[async_trait]
impl FilterApi for InMemoryFilterServer {
    async fn list_filters_v2(&self) -> ApiResult<Vec<FilterV2>> {
        self.admit(ApiCall::ListFiltersV2).await?;
        Ok(self.filters_v2())
    }

    async fn list_filters_v1(&self) -> ApiResult<Vec<FilterV1>> {
        self.admit(ApiCall::ListFiltersV1).await?;
        Ok(self.filters_v1())
    }

    async fn create_filter_v2(
        &self,
        title: &str,
        contexts: &[FilterContext],
        action: FilterAction,
        expires_in_seconds: Option<u64>,
    ) -> ApiResult<FilterV2> {
        self.admit(ApiCall::CreateFilterV2).await?;
        require_contexts(contexts)?;
        let expires_at = expires_at(expires_in_seconds)?;
        let filter = FilterV2 {
            id: new_id(),
            title: title.to_string(),
            contexts: contexts.to_vec(),
            keywords: Vec::new(),
            action,
            expires_at,
        };
        self.lock().filters_v2.push(filter.clone());
        log::debug!("Created v2 filter {}", filter.id);
        Ok(filter)
    }

    async fn add_filter_keyword(
        &self,
        filter_id: &str,
        keyword: &str,
        whole_word: bool,
    ) -> ApiResult<FilterKeyword> {
        self.admit(ApiCall::AddFilterKeyword).await?;
        let mut state = self.lock();
        let filter = state
            .filters_v2
            .iter_mut()
            .find(|f| f.id == filter_id)
            .ok_or(ApiError::NotFound)?;
        let keyword = FilterKeyword {
            id: new_id(),
            keyword: keyword.to_string(),
            whole_word,
        };
        filter.keywords.push(keyword.clone());
        Ok(keyword)
    }

    async fn create_filter_v1(
        &self,
        phrase: &str,
        contexts: &[FilterContext],
        irreversible: bool,
        whole_word: bool,
        expires_in_seconds: Option<u64>,
    ) -> ApiResult<FilterV1> {
        self.admit(ApiCall::CreateFilterV1).await?;
        require_contexts(contexts)?;
        let expires_at = expires_at(expires_in_seconds)?;
        let filter = FilterV1 {
            id: new_id(),
            phrase: phrase.to_string(),
            contexts: contexts.to_vec(),
            irreversible,
            whole_word,
            expires_at,
        };
        self.lock().filters_v1.push(filter.clone());
        log::debug!("Created v1 filter {}", filter.id);
        Ok(filter)
    }

    async fn update_filter_v2(
        &self,
        id: &str,
        contexts: &[FilterContext],
    ) -> ApiResult<FilterV2> {
        self.admit(ApiCall::UpdateFilterV2).await?;
        require_contexts(contexts)?;
        let mut state = self.lock();
        let filter = state
            .filters_v2
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(ApiError::NotFound)?;
        filter.contexts = contexts.to_vec();
        Ok(filter.clone())
    }

    async fn update_filter_v1(&self, id: &str, update: FilterV1Update) -> ApiResult<FilterV1> {
        self.admit(ApiCall::UpdateFilterV1).await?;
        require_contexts(&update.contexts)?;
        let new_expiry = expires_at(update.expires_in_seconds)?;
        let mut state = self.lock();
        let filter = state
            .filters_v1
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(ApiError::NotFound)?;
        filter.phrase = update.phrase;
        filter.contexts = update.contexts;
        if let Some(irreversible) = update.irreversible {
            filter.irreversible = irreversible;
        }
        if let Some(whole_word) = update.whole_word {
            filter.whole_word = whole_word;
        }
        if new_expiry.is_some() {
            filter.expires_at = new_expiry;
        }
        Ok(filter.clone())
    }

    async fn delete_filter_v2(&self, id: &str) -> ApiResult<()> {
        self.admit(ApiCall::DeleteFilterV2).await?;
        let mut state = self.lock();
        let before = state.filters_v2.len();
        state.filters_v2.retain(|f| f.id != id);
        if state.filters_v2.len() == before {
            return Err(ApiError::NotFound);
        }
        Ok(())
    }

    async fn delete_filter_v1(&self, id: &str) -> ApiResult<()> {
        self.admit(ApiCall::DeleteFilterV1).await?;
        let mut state = self.lock();
        let before = state.filters_v1.len();
        state.filters_v1.retain(|f| f.id != id);
        if state.filters_v1.len() == before {
            return Err(ApiError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl TagApi for InMemoryFilterServer {
    async fn tag(&self, name: &str) -> ApiResult<HashTag> {
        self.admit(ApiCall::Tag).await?;
        let following = self.lock().followed_tags.get(name).copied().unwrap_or(false);
        Ok(HashTag {
            name: name.to_string(),
            following: Some(following),
        })
    }

    async fn follow_tag(&self, name: &str) -> ApiResult<HashTag> {
        self.admit(ApiCall::FollowTag).await?;
        self.lock().followed_tags.insert(name.to_string(), true);
        Ok(HashTag {
            name: name.to_string(),
            following: Some(true),
        })
    }

    async fn unfollow_tag(&self, name: &str) -> ApiResult<HashTag> {
        self.admit(ApiCall::UnfollowTag).await?;
        self.lock().followed_tags.insert(name.to_string(), false);
        Ok(HashTag {
            name: name.to_string(),
            following: Some(false),
        })
    }
}
