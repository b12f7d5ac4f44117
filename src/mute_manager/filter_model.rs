use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Returns the hashtag as it appears in filter keywords and phrases (`foo` -> `#foo`)
pub fn tag_with_hash(hashtag: &str) -> String {
    format!("#{}", hashtag.trim_start_matches('#'))
}

// MARK: - Filter building blocks

/// Where a filter applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterContext {
    Home,
    Notifications,
    Public,
    Thread,
    Account,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterAction {
    Warn,
    Hide,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterKeyword {
    pub id: String,
    pub keyword: String,
    pub whole_word: bool,
}

// MARK: - Filter versions

/// Server-side filter as exposed by the v2 filters API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterV2 {
    pub id: String,
    pub title: String,
    #[serde(rename = "context")]
    pub contexts: Vec<FilterContext>,
    #[serde(default)]
    pub keywords: Vec<FilterKeyword>,
    #[serde(rename = "filter_action")]
    pub action: FilterAction,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Legacy single-phrase filter, only served by servers without the v2 API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterV1 {
    pub id: String,
    pub phrase: String,
    #[serde(rename = "context")]
    pub contexts: Vec<FilterContext>,
    pub irreversible: bool,
    pub whole_word: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl FilterV2 {
    /// Expiry is left to the server; a listed filter counts whatever its `expires_at`
    pub fn matches_hashtag_in_home(&self, tag_with_hash: &str) -> bool {
        self.contexts.contains(&FilterContext::Home)
            && self.keywords.iter().any(|k| k.keyword == tag_with_hash)
    }
}

impl FilterV1 {
    pub fn matches_hashtag_in_home(&self, tag_with_hash: &str) -> bool {
        self.phrase == tag_with_hash && self.contexts.contains(&FilterContext::Home)
    }
}

// MARK: - Tracked filter

/// The filter currently known to mute a hashtag, in whichever shape the server answered with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedFilter {
    V2(FilterV2),
    V1(FilterV1),
}

impl TrackedFilter {
    pub fn id(&self) -> &str {
        match self {
            TrackedFilter::V2(filter) => &filter.id,
            TrackedFilter::V1(filter) => &filter.id,
        }
    }

    pub fn contexts(&self) -> &[FilterContext] {
        match self {
            TrackedFilter::V2(filter) => &filter.contexts,
            TrackedFilter::V1(filter) => &filter.contexts,
        }
    }

    pub fn matches_hashtag_in_home(&self, tag_with_hash: &str) -> bool {
        match self {
            TrackedFilter::V2(filter) => filter.matches_hashtag_in_home(tag_with_hash),
            TrackedFilter::V1(filter) => filter.matches_hashtag_in_home(tag_with_hash),
        }
    }

    /// The filter's contexts with `Home` removed, order preserved
    pub fn contexts_without_home(&self) -> Vec<FilterContext> {
        self.contexts()
            .iter()
            .copied()
            .filter(|c| *c != FilterContext::Home)
            .collect()
    }

    /// Whether unmuting should narrow the filter instead of deleting it
    pub fn applies_elsewhere(&self) -> bool {
        self.contexts().len() > 1
    }
}

// MARK: - Hashtags

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashTag {
    pub name: String,
    #[serde(default)]
    pub following: Option<bool>,
}
