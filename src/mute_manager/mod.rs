pub mod capabilities;
pub mod event_hub;
pub mod filter_lookup;
pub mod filter_model;
pub mod menu_state;

use crate::config::TagMuteConfig;
use crate::filter_api::{with_timeout, ApiError, ApiResult, FilterApi, FilterV1Update};
use capabilities::{
    supports_filtering, CapabilityParseError, ServerCapabilities, Version, VersionConstraint,
};
use event_hub::EventHub;
use filter_lookup::{find_mute_filter, FilterApiVersion};
use filter_model::{tag_with_hash, FilterAction, FilterContext, TrackedFilter};
use menu_state::{project_mute_menu, MuteMenuState};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// MARK: - Mute state

/// Where the hashtag's mute stands. There is no error state: a failed request is
/// returned as a [`TagMuteError`] and the state reverts to what it was before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteState {
    /// No lookup has completed yet, or the last one failed
    Unknown,
    Unmuted,
    Muting,
    Muted,
    Unmuting,
}

impl MuteState {
    /// `None` while unknown or while a request is in flight
    pub fn muted(&self) -> Option<bool> {
        match self {
            MuteState::Muted => Some(true),
            MuteState::Unmuted => Some(false),
            MuteState::Unknown | MuteState::Muting | MuteState::Unmuting => None,
        }
    }
}

impl fmt::Display for MuteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MuteState::Unknown => "unknown",
            MuteState::Unmuted => "unmuted",
            MuteState::Muting => "muting",
            MuteState::Muted => "muted",
            MuteState::Unmuting => "unmuting",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagMuteError {
    #[error("the server does not support filters")]
    FilteringUnsupported,
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: MuteState,
    },
    /// The v2 filter was created but its keyword could not be added
    #[error("filter {filter_id} was created without its keyword: {source}")]
    PartialMuteFailure {
        filter_id: String,
        cleaned_up: bool,
        source: ApiError,
    },
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Transient message shown to the user after an action completes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Confirmation(String),
    Error(String),
}

impl Notice {
    pub fn for_mute<T>(hashtag: &str, result: &Result<T, TagMuteError>) -> Notice {
        match result {
            Ok(_) => Notice::Confirmation(format!("#{} muted", hashtag)),
            Err(_) => Notice::Error(format!("Error muting #{}", hashtag)),
        }
    }

    pub fn for_unmute<T>(hashtag: &str, result: &Result<T, TagMuteError>) -> Notice {
        match result {
            Ok(_) => Notice::Confirmation(format!("#{} unmuted", hashtag)),
            Err(_) => Notice::Error(format!("Error unmuting #{}", hashtag)),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Confirmation(message) | Notice::Error(message) => f.write_str(message),
        }
    }
}

/// What an unmute did to the tracked filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnmuteAction {
    /// The filter still applies to other contexts and only lost `Home`
    Narrowed(TrackedFilter),
    Deleted { filter_id: String },
}

// MARK: - State transitions

/// Puts the manager in an in-flight state and restores the prior state when
/// dropped without being committed. Covers both failed requests and futures
/// abandoned by their caller.
struct Transition<'a> {
    state: &'a watch::Sender<MuteState>,
    prior: MuteState,
    committed: bool,
}

impl<'a> Transition<'a> {
    fn begin(state: &'a watch::Sender<MuteState>, in_flight: MuteState) -> Self {
        let prior = state.send_replace(in_flight);
        log::debug!("Mute state {} -> {}", prior, in_flight);
        Transition {
            state,
            prior,
            committed: false,
        }
    }

    fn commit(mut self, next: MuteState) {
        log::debug!("Mute state {} -> {}", *self.state.borrow(), next);
        self.state.send_replace(next);
        self.committed = true;
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        if !self.committed {
            log::debug!("Mute state reverting to {}", self.prior);
            self.state.send_replace(self.prior);
        }
    }
}

// MARK: - HashtagMuteManager

/// Mute/unmute orchestration for one hashtag timeline.
///
/// Each operation takes `&mut self`, so a screen can only run one at a time.
/// Dropping an operation's future abandons it: the in-flight state is rolled
/// back and nothing learned from the server is cached.
pub struct HashtagMuteManager {
    hashtag: String,
    api: Arc<dyn FilterApi>,
    event_hub: EventHub,
    capabilities: Option<ServerCapabilities>,
    filters_constraint: VersionConstraint,
    request_timeout: Duration,
    cleanup_partial_mute: bool,
    api_version: Option<FilterApiVersion>,
    tracked_filter: Option<TrackedFilter>,
    state: watch::Sender<MuteState>,
}

impl HashtagMuteManager {
    // MARK: - Initialization

    /// `hashtag` is given without its leading `#`
    pub fn new(hashtag: impl Into<String>, api: Arc<dyn FilterApi>, event_hub: EventHub) -> Self {
        let (state, _) = watch::channel(MuteState::Unknown);
        HashtagMuteManager {
            hashtag: hashtag.into().trim_start_matches('#').to_string(),
            api,
            event_hub,
            capabilities: None,
            filters_constraint: VersionConstraint::at_least(Version::new(1, 0, 0)),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cleanup_partial_mute: false,
            api_version: None,
            tracked_filter: None,
            state,
        }
    }

    pub fn from_config(
        hashtag: impl Into<String>,
        api: Arc<dyn FilterApi>,
        event_hub: EventHub,
        config: &TagMuteConfig,
    ) -> Result<Self, CapabilityParseError> {
        Ok(Self::new(hashtag, api, event_hub)
            .with_filters_constraint(config.filters_constraint()?)
            .with_request_timeout(config.request_timeout())
            .with_partial_mute_cleanup(config.cleanup_partial_mute))
    }

    pub fn with_capabilities(mut self, capabilities: Option<ServerCapabilities>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_filters_constraint(mut self, constraint: VersionConstraint) -> Self {
        self.filters_constraint = constraint;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Delete the empty filter left behind when adding its keyword fails
    pub fn with_partial_mute_cleanup(mut self, enabled: bool) -> Self {
        self.cleanup_partial_mute = enabled;
        self
    }

    // MARK: - Observing

    pub fn hashtag(&self) -> &str {
        &self.hashtag
    }

    pub fn state(&self) -> MuteState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<MuteState> {
        self.state.subscribe()
    }

    pub fn tracked_filter(&self) -> Option<&TrackedFilter> {
        self.tracked_filter.as_ref()
    }

    pub fn supports_filtering(&self) -> bool {
        supports_filtering(self.capabilities.as_ref(), &self.filters_constraint)
    }

    pub fn menu_state(&self) -> MuteMenuState {
        project_mute_menu(self.supports_filtering(), self.state().muted())
    }

    async fn call<T, F>(&self, request: F) -> ApiResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        with_timeout(self.request_timeout, request).await
    }

    // MARK: - Lookup

    /// Asks the server whether the hashtag is muted and updates the state.
    ///
    /// On failure the state goes back to what it was before, which is
    /// `Unknown` until a lookup has succeeded.
    pub async fn refresh(&mut self) -> Result<MuteState, TagMuteError> {
        if !self.supports_filtering() {
            return Err(TagMuteError::FilteringUnsupported);
        }
        let current = self.state();
        if matches!(current, MuteState::Muting | MuteState::Unmuting) {
            return Err(TagMuteError::InvalidState {
                action: "refresh",
                state: current,
            });
        }

        let transition = Transition::begin(&self.state, MuteState::Unknown);
        let found = find_mute_filter(self.api.as_ref(), &self.hashtag, self.request_timeout).await?;

        let next = if found.is_muted() {
            MuteState::Muted
        } else {
            MuteState::Unmuted
        };
        transition.commit(next);
        self.api_version = Some(found.api_version());
        self.tracked_filter = found.into_tracked();
        log::debug!("#{} is {}", self.hashtag, next);
        Ok(next)
    }

    // MARK: - Muting

    /// Creates a filter hiding the hashtag from the home timeline
    pub async fn mute(&mut self) -> Result<TrackedFilter, TagMuteError> {
        if !self.supports_filtering() {
            return Err(TagMuteError::FilteringUnsupported);
        }
        let current = self.state();
        if current != MuteState::Unmuted {
            return Err(TagMuteError::InvalidState {
                action: "mute",
                state: current,
            });
        }

        let transition = Transition::begin(&self.state, MuteState::Muting);
        let filter = match self.create_mute_filter().await {
            Ok(filter) => filter,
            Err(error) => {
                log::error!("Failed to mute #{}: {}", self.hashtag, error);
                return Err(error);
            }
        };
        transition.commit(MuteState::Muted);

        self.api_version = Some(match &filter {
            TrackedFilter::V2(_) => FilterApiVersion::V2,
            TrackedFilter::V1(_) => FilterApiVersion::V1,
        });
        let context = filter
            .contexts()
            .first()
            .copied()
            .unwrap_or(FilterContext::Home);
        self.tracked_filter = Some(filter.clone());
        self.event_hub.publish_filter_changed(context);
        log::info!("Muted #{} with filter {}", self.hashtag, filter.id());
        Ok(filter)
    }

    async fn create_mute_filter(&self) -> Result<TrackedFilter, TagMuteError> {
        // A lookup that had to fall back already told us v2 is missing
        if self.api_version == Some(FilterApiVersion::V1) {
            return self.create_mute_filter_v1().await;
        }

        let tag = tag_with_hash(&self.hashtag);
        let created = self
            .call(
                self.api
                    .create_filter_v2(&tag, &[FilterContext::Home], FilterAction::Warn, None),
            )
            .await;
        let mut filter = match created {
            Ok(filter) => filter,
            Err(error) if error.is_not_found() => {
                log::debug!("Server has no v2 filters, muting #{} with v1", self.hashtag);
                return self.create_mute_filter_v1().await;
            }
            Err(error) => return Err(error.into()),
        };

        match self
            .call(self.api.add_filter_keyword(&filter.id, &tag, true))
            .await
        {
            Ok(keyword) => {
                filter.keywords.push(keyword);
                Ok(TrackedFilter::V2(filter))
            }
            Err(source) => {
                log::warn!(
                    "Filter {} created for #{} but adding its keyword failed: {}",
                    filter.id,
                    self.hashtag,
                    source
                );
                let cleaned_up = self.cleanup_partial_mute && self.delete_orphan(&filter.id).await;
                Err(TagMuteError::PartialMuteFailure {
                    filter_id: filter.id,
                    cleaned_up,
                    source,
                })
            }
        }
    }

    async fn create_mute_filter_v1(&self) -> Result<TrackedFilter, TagMuteError> {
        let tag = tag_with_hash(&self.hashtag);
        let filter = self
            .call(
                self.api
                    .create_filter_v1(&tag, &[FilterContext::Home], false, true, None),
            )
            .await?;
        Ok(TrackedFilter::V1(filter))
    }

    async fn delete_orphan(&self, filter_id: &str) -> bool {
        match self.call(self.api.delete_filter_v2(filter_id)).await {
            Ok(()) => {
                log::info!("Deleted keywordless filter {}", filter_id);
                true
            }
            Err(error) => {
                log::warn!("Could not delete keywordless filter {}: {}", filter_id, error);
                false
            }
        }
    }

    // MARK: - Unmuting

    /// Stops the tracked filter from applying to the home timeline.
    ///
    /// A filter that also applies elsewhere loses `Home` from its contexts and
    /// is kept. A home-only filter is deleted.
    pub async fn unmute(&mut self) -> Result<UnmuteAction, TagMuteError> {
        let current = self.state();
        let filter = match (current, self.tracked_filter.clone()) {
            (MuteState::Muted, Some(filter)) => filter,
            _ => {
                return Err(TagMuteError::InvalidState {
                    action: "unmute",
                    state: current,
                })
            }
        };

        let transition = Transition::begin(&self.state, MuteState::Unmuting);
        let action = match self.remove_home_context(&filter).await {
            Ok(action) => action,
            Err(error) => {
                log::error!("Failed to unmute #{}: {}", self.hashtag, error);
                return Err(error.into());
            }
        };
        transition.commit(MuteState::Unmuted);

        self.tracked_filter = None;
        self.event_hub.publish_filter_changed(FilterContext::Home);
        log::info!("Unmuted #{} ({:?})", self.hashtag, action);
        Ok(action)
    }

    async fn remove_home_context(&self, filter: &TrackedFilter) -> ApiResult<UnmuteAction> {
        if filter.applies_elsewhere() {
            let contexts = filter.contexts_without_home();
            let narrowed = match filter {
                TrackedFilter::V2(f) => TrackedFilter::V2(
                    self.call(self.api.update_filter_v2(&f.id, &contexts))
                        .await?,
                ),
                TrackedFilter::V1(f) => {
                    let update = FilterV1Update {
                        phrase: f.phrase.clone(),
                        contexts,
                        irreversible: None,
                        whole_word: None,
                        expires_in_seconds: None,
                    };
                    TrackedFilter::V1(self.call(self.api.update_filter_v1(&f.id, update)).await?)
                }
            };
            return Ok(UnmuteAction::Narrowed(narrowed));
        }

        match filter {
            TrackedFilter::V2(f) => self.call(self.api.delete_filter_v2(&f.id)).await?,
            TrackedFilter::V1(f) => self.call(self.api.delete_filter_v1(&f.id)).await?,
        }
        Ok(UnmuteAction::Deleted {
            filter_id: filter.id().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_server::{ApiCall, InMemoryFilterServer, ServerFlavor};
    use super::capabilities::ServerOperation;
    use super::event_hub::{FilterChangedEvent, TimelineEvent};
    use super::filter_lookup::MuteFilterMatch;
    use super::filter_model::{FilterKeyword, FilterV1, FilterV2};
    use super::menu_state::MenuItemState;
    use tokio::sync::broadcast::error::TryRecvError;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn v2_capabilities() -> ServerCapabilities {
        ServerCapabilities::new()
            .with_operation(ServerOperation::FiltersServer, Version::new(1, 0, 0))
    }

    fn v1_capabilities() -> ServerCapabilities {
        ServerCapabilities::new()
            .with_operation(ServerOperation::FiltersClient, Version::new(1, 0, 0))
    }

    fn manager_for(
        server: &Arc<InMemoryFilterServer>,
        capabilities: Option<ServerCapabilities>,
    ) -> (HashtagMuteManager, EventHub) {
        let hub = EventHub::new(16);
        let manager = HashtagMuteManager::new("foo", server.clone(), hub.clone())
            .with_capabilities(capabilities)
            .with_request_timeout(TIMEOUT);
        (manager, hub)
    }

    fn home_and_notifications_v2(keyword: &str) -> FilterV2 {
        FilterV2 {
            id: "shared".to_string(),
            title: "shared".to_string(),
            contexts: vec![FilterContext::Home, FilterContext::Notifications],
            keywords: vec![FilterKeyword {
                id: "k".to_string(),
                keyword: keyword.to_string(),
                whole_word: true,
            }],
            action: FilterAction::Hide,
            expires_at: None,
        }
    }

    fn v1_filter(contexts: Vec<FilterContext>) -> FilterV1 {
        FilterV1 {
            id: "legacy".to_string(),
            phrase: "#foo".to_string(),
            contexts,
            irreversible: true,
            whole_word: true,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_mute_scenario_v2() {
        let server = Arc::new(InMemoryFilterServer::new(ServerFlavor::V2));
        let (mut manager, hub) = manager_for(&server, Some(v2_capabilities()));
        let mut events = hub.subscribe();

        assert_eq!(manager.state(), MuteState::Unknown);
        assert_eq!(manager.refresh().await, Ok(MuteState::Unmuted));
        assert_eq!(manager.menu_state().mute, MenuItemState::shown(true));

        let filter = manager.mute().await.unwrap();
        assert_eq!(manager.state(), MuteState::Muted);
        match &filter {
            TrackedFilter::V2(f) => {
                assert_eq!(f.title, "#foo");
                assert_eq!(f.contexts, vec![FilterContext::Home]);
                assert_eq!(f.action, FilterAction::Warn);
                assert!(f.expires_at.is_none());
                assert_eq!(f.keywords.len(), 1);
                assert_eq!(f.keywords[0].keyword, "#foo");
                assert!(f.keywords[0].whole_word);
            }
            other => panic!("expected a v2 filter, got {:?}", other),
        }
        assert_eq!(manager.tracked_filter(), Some(&filter));
        assert_eq!(
            events.recv().await.unwrap(),
            TimelineEvent::FilterChanged(FilterChangedEvent {
                context: FilterContext::Home
            })
        );

        let found = find_mute_filter(server.as_ref(), "foo", TIMEOUT).await.unwrap();
        match found {
            MuteFilterMatch::V2(f) => assert_eq!(f.id, filter.id()),
            other => panic!("expected the new filter, got {:?}", other),
        }
        assert!(manager.menu_state().unmute.visible);
    }

    #[tokio::test]
    async fn test_mute_then_unmute_restores_no_match() {
        let server = Arc::new(InMemoryFilterServer::new(ServerFlavor::V2));
        let (mut manager, _hub) = manager_for(&server, Some(v2_capabilities()));

        manager.refresh().await.unwrap();
        let filter = manager.mute().await.unwrap();
        let action = manager.unmute().await.unwrap();

        assert_eq!(
            action,
            UnmuteAction::Deleted {
                filter_id: filter.id().to_string()
            }
        );
        assert_eq!(manager.state(), MuteState::Unmuted);
        assert!(manager.tracked_filter().is_none());
        assert!(server.filters_v2().is_empty());
        assert!(!find_mute_filter(server.as_ref(), "foo", TIMEOUT)
            .await
            .unwrap()
            .is_muted());
    }

    #[tokio::test]
    async fn test_unmute_narrows_multi_context_v2_filter() {
        let server = Arc::new(
            InMemoryFilterServer::new(ServerFlavor::V2)
                .with_filter_v2(home_and_notifications_v2("#foo")),
        );
        let (mut manager, hub) = manager_for(&server, Some(v2_capabilities()));
        let mut events = hub.subscribe();

        assert_eq!(manager.refresh().await, Ok(MuteState::Muted));
        let action = manager.unmute().await.unwrap();

        match action {
            UnmuteAction::Narrowed(TrackedFilter::V2(f)) => {
                assert_eq!(f.contexts, vec![FilterContext::Notifications])
            }
            other => panic!("expected a narrowed filter, got {:?}", other),
        }
        let stored = server.filters_v2();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].contexts, vec![FilterContext::Notifications]);
        assert_eq!(server.call_count(ApiCall::DeleteFilterV2), 0);
        assert_eq!(server.call_count(ApiCall::UpdateFilterV2), 1);
        assert_eq!(
            events.recv().await.unwrap(),
            TimelineEvent::FilterChanged(FilterChangedEvent {
                context: FilterContext::Home
            })
        );
    }

    #[tokio::test]
    async fn test_unmute_narrows_v1_filter_and_keeps_phrase() {
        let server = Arc::new(InMemoryFilterServer::new(ServerFlavor::V1Only).with_filter_v1(
            v1_filter(vec![FilterContext::Public, FilterContext::Home]),
        ));
        let (mut manager, _hub) = manager_for(&server, Some(v1_capabilities()));

        assert_eq!(manager.refresh().await, Ok(MuteState::Muted));
        manager.unmute().await.unwrap();

        let stored = server.filters_v1();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].phrase, "#foo");
        assert_eq!(stored[0].contexts, vec![FilterContext::Public]);
        assert!(stored[0].irreversible);
        assert_eq!(server.call_count(ApiCall::DeleteFilterV1), 0);
    }

    #[tokio::test]
    async fn test_unmute_deletes_home_only_v1_filter() {
        let server = Arc::new(
            InMemoryFilterServer::new(ServerFlavor::V1Only)
                .with_filter_v1(v1_filter(vec![FilterContext::Home])),
        );
        let (mut manager, _hub) = manager_for(&server, Some(v1_capabilities()));

        manager.refresh().await.unwrap();
        let action = manager.unmute().await.unwrap();
        assert_eq!(
            action,
            UnmuteAction::Deleted {
                filter_id: "legacy".to_string()
            }
        );
        assert!(server.filters_v1().is_empty());
        assert_eq!(server.call_count(ApiCall::UpdateFilterV1), 0);
    }

    #[tokio::test]
    async fn test_mute_on_v1_server_skips_v2_after_lookup() {
        let server = Arc::new(InMemoryFilterServer::new(ServerFlavor::V1Only));
        let (mut manager, _hub) = manager_for(&server, Some(v1_capabilities()));

        manager.refresh().await.unwrap();
        let filter = manager.mute().await.unwrap();

        match filter {
            TrackedFilter::V1(f) => {
                assert_eq!(f.phrase, "#foo");
                assert_eq!(f.contexts, vec![FilterContext::Home]);
                assert!(!f.irreversible);
                assert!(f.whole_word);
            }
            other => panic!("expected a v1 filter, got {:?}", other),
        }
        assert_eq!(server.call_count(ApiCall::CreateFilterV2), 0);
        assert_eq!(server.call_count(ApiCall::CreateFilterV1), 1);
    }

    #[tokio::test]
    async fn test_mute_creates_v1_filter_when_create_v2_is_missing() {
        let server = Arc::new(InMemoryFilterServer::new(ServerFlavor::Both));
        let (mut manager, hub) = manager_for(&server, Some(v2_capabilities()));
        let mut events = hub.subscribe();
        assert_eq!(manager.refresh().await, Ok(MuteState::Unmuted));

        server.fail(ApiCall::CreateFilterV2, ApiError::NotFound);
        let filter = manager.mute().await.unwrap();

        match &filter {
            TrackedFilter::V1(f) => {
                assert_eq!(f.phrase, "#foo");
                assert_eq!(f.contexts, vec![FilterContext::Home]);
                assert!(!f.irreversible);
                assert!(f.whole_word);
                assert!(f.expires_at.is_none());
            }
            other => panic!("expected a v1 filter, got {:?}", other),
        }
        assert_eq!(manager.state(), MuteState::Muted);
        assert_eq!(manager.tracked_filter(), Some(&filter));
        assert_eq!(server.call_count(ApiCall::CreateFilterV2), 1);
        assert_eq!(server.call_count(ApiCall::AddFilterKeyword), 0);
        assert!(server.filters_v2().is_empty());
        assert_eq!(server.filters_v1().len(), 1);
        assert_eq!(
            events.recv().await.unwrap(),
            TimelineEvent::FilterChanged(FilterChangedEvent {
                context: FilterContext::Home
            })
        );
        assert!(manager.menu_state().unmute.visible);
    }

    #[tokio::test]
    async fn test_mute_falls_back_to_v1_when_create_v2_is_missing() {
        let server = Arc::new(InMemoryFilterServer::new(ServerFlavor::V2));
        let (mut manager, _hub) = manager_for(&server, Some(v2_capabilities()));
        manager.refresh().await.unwrap();

        server.fail(ApiCall::CreateFilterV2, ApiError::NotFound);
        // v1 endpoints are missing on this server too, so the fallback fails
        let result = manager.mute().await;
        assert_eq!(result, Err(TagMuteError::Api(ApiError::NotFound)));
        assert_eq!(server.call_count(ApiCall::CreateFilterV1), 1);
        assert_eq!(manager.state(), MuteState::Unmuted);
    }

    #[tokio::test]
    async fn test_partial_mute_failure_leaves_filter() {
        let server = Arc::new(InMemoryFilterServer::new(ServerFlavor::V2));
        let (mut manager, hub) = manager_for(&server, Some(v2_capabilities()));
        let mut events = hub.subscribe();
        manager.refresh().await.unwrap();

        server.fail(ApiCall::AddFilterKeyword, ApiError::Network("reset".into()));
        let result = manager.mute().await;

        match &result {
            Err(TagMuteError::PartialMuteFailure {
                filter_id,
                cleaned_up,
                source,
            }) => {
                assert!(!cleaned_up);
                assert_eq!(source, &ApiError::Network("reset".into()));
                assert_eq!(server.filters_v2()[0].id, *filter_id);
            }
            other => panic!("expected a partial failure, got {:?}", other),
        }
        assert_eq!(manager.state(), MuteState::Unmuted);
        assert!(manager.tracked_filter().is_none());
        assert_eq!(server.filters_v2().len(), 1);
        assert!(server.filters_v2()[0].keywords.is_empty());
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(
            Notice::for_mute("foo", &result),
            Notice::Error("Error muting #foo".to_string())
        );
    }

    #[tokio::test]
    async fn test_partial_mute_failure_cleanup() {
        let server = Arc::new(InMemoryFilterServer::new(ServerFlavor::V2));
        let (manager, _hub) = manager_for(&server, Some(v2_capabilities()));
        let mut manager = manager.with_partial_mute_cleanup(true);
        manager.refresh().await.unwrap();

        server.fail(ApiCall::AddFilterKeyword, ApiError::Timeout);
        let result = manager.mute().await;

        assert!(matches!(
            result,
            Err(TagMuteError::PartialMuteFailure {
                cleaned_up: true,
                ..
            })
        ));
        assert!(server.filters_v2().is_empty());
    }

    #[tokio::test]
    async fn test_failed_unmute_keeps_muted_state() {
        let server = Arc::new(
            InMemoryFilterServer::new(ServerFlavor::V2)
                .with_filter_v2(home_and_notifications_v2("#foo")),
        );
        let (mut manager, _hub) = manager_for(&server, Some(v2_capabilities()));
        manager.refresh().await.unwrap();

        server.fail(
            ApiCall::UpdateFilterV2,
            ApiError::ServerRejected {
                status: 422,
                message: "invalid".to_string(),
            },
        );
        let result = manager.unmute().await;
        assert!(matches!(
            result,
            Err(TagMuteError::Api(ApiError::ServerRejected { .. }))
        ));
        assert_eq!(manager.state(), MuteState::Muted);
        assert!(manager.tracked_filter().is_some());
        assert_eq!(
            Notice::for_unmute("foo", &result),
            Notice::Error("Error unmuting #foo".to_string())
        );
    }

    #[tokio::test]
    async fn test_lookup_failure_stays_unknown() {
        let server = Arc::new(InMemoryFilterServer::new(ServerFlavor::V2));
        server.fail(ApiCall::ListFiltersV2, ApiError::Network("offline".into()));
        let (mut manager, _hub) = manager_for(&server, Some(v2_capabilities()));

        assert!(manager.refresh().await.is_err());
        assert_eq!(manager.state(), MuteState::Unknown);
        let menu = manager.menu_state();
        assert!(menu.mute.visible);
        assert!(!menu.mute.enabled);
        assert!(!menu.unmute.visible);
    }

    #[tokio::test]
    async fn test_no_capabilities_disables_muting() {
        let server = Arc::new(InMemoryFilterServer::new(ServerFlavor::V2));
        let (mut manager, _hub) = manager_for(&server, None);

        assert_eq!(
            manager.refresh().await,
            Err(TagMuteError::FilteringUnsupported)
        );
        assert_eq!(manager.mute().await, Err(TagMuteError::FilteringUnsupported));
        assert!(!manager.menu_state().mute.visible);
        assert!(!manager.menu_state().unmute.visible);
        assert!(server.calls().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_state_does_not_touch_the_network() {
        let server = Arc::new(InMemoryFilterServer::new(ServerFlavor::V2));
        let (mut manager, _hub) = manager_for(&server, Some(v2_capabilities()));

        assert!(matches!(
            manager.mute().await,
            Err(TagMuteError::InvalidState {
                state: MuteState::Unknown,
                ..
            })
        ));
        assert!(matches!(
            manager.unmute().await,
            Err(TagMuteError::InvalidState { .. })
        ));
        assert!(server.calls().is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_state_is_observable() {
        let server = Arc::new(InMemoryFilterServer::new(ServerFlavor::V2));
        let (mut manager, _hub) = manager_for(&server, Some(v2_capabilities()));
        manager.refresh().await.unwrap();
        let mut states = manager.subscribe_state();

        server.pause();
        let observer = async {
            states
                .wait_for(|s| *s == MuteState::Muting)
                .await
                .map(|s| *s)
                .ok();
            server.resume();
        };
        let (result, _) = futures::join!(manager.mute(), observer);

        assert!(result.is_ok());
        assert_eq!(manager.state(), MuteState::Muted);
    }

    #[tokio::test]
    async fn test_abandoned_mute_rolls_back() {
        let server = Arc::new(InMemoryFilterServer::new(ServerFlavor::V2));
        let (mut manager, hub) = manager_for(&server, Some(v2_capabilities()));
        let mut events = hub.subscribe();
        manager.refresh().await.unwrap();

        server.pause();
        let abandoned = tokio::time::timeout(Duration::from_millis(50), manager.mute()).await;
        assert!(abandoned.is_err());

        assert_eq!(manager.state(), MuteState::Unmuted);
        assert!(manager.tracked_filter().is_none());
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        server.resume();
    }

    #[tokio::test]
    async fn test_request_timeout_reverts_state() {
        let server = Arc::new(InMemoryFilterServer::new(ServerFlavor::V2));
        let (manager, _hub) = manager_for(&server, Some(v2_capabilities()));
        let mut manager = manager.with_request_timeout(Duration::from_millis(30));
        manager.refresh().await.unwrap();

        server.pause();
        let result = manager.mute().await;
        server.resume();

        assert_eq!(result, Err(TagMuteError::Api(ApiError::Timeout)));
        assert_eq!(manager.state(), MuteState::Unmuted);
    }

    #[test]
    fn test_notice_text() {
        let ok: Result<(), TagMuteError> = Ok(());
        assert_eq!(
            Notice::for_mute("foo", &ok).to_string(),
            "#foo muted".to_string()
        );
        assert_eq!(
            Notice::for_unmute("foo", &ok),
            Notice::Confirmation("#foo unmuted".to_string())
        );
    }
}
