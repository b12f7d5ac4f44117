use crate::filter_api::{with_timeout, ApiError, TagApi};
use crate::mute_manager::event_hub::{EventHub, TimelineEvent};
use crate::mute_manager::menu_state::{project_follow_menu, FollowMenuState};
use std::sync::Arc;
use tokio::time::Duration;

/// Follow state of the hashtag shown by a timeline. `following` is `None` until the tag has been fetched.
pub struct HashtagFollowManager {
    hashtag: String,
    api: Arc<dyn TagApi>,
    event_hub: EventHub,
    request_timeout: Duration,
    following: Option<bool>,
}

impl HashtagFollowManager {
    pub fn new(
        hashtag: impl Into<String>,
        api: Arc<dyn TagApi>,
        event_hub: EventHub,
        request_timeout: Duration,
    ) -> Self {
        HashtagFollowManager {
            hashtag: hashtag.into().trim_start_matches('#').to_string(),
            api,
            event_hub,
            request_timeout,
            following: None,
        }
    }

    pub fn following(&self) -> Option<bool> {
        self.following
    }

    pub fn menu_state(&self) -> FollowMenuState {
        project_follow_menu(self.following)
    }

    pub async fn refresh(&mut self) -> Result<Option<bool>, ApiError> {
        match with_timeout(self.request_timeout, self.api.tag(&self.hashtag)).await {
            Ok(tag) => {
                self.following = tag.following;
                Ok(self.following)
            }
            Err(error) => {
                log::warn!("Failed to query tag #{}: {}", self.hashtag, error);
                Err(error)
            }
        }
    }

    pub async fn follow(&mut self) -> Result<(), ApiError> {
        self.set_following(true).await
    }

    pub async fn unfollow(&mut self) -> Result<(), ApiError> {
        self.set_following(false).await
    }

    async fn set_following(&mut self, follow: bool) -> Result<(), ApiError> {
        let request = if follow {
            self.api.follow_tag(&self.hashtag)
        } else {
            self.api.unfollow_tag(&self.hashtag)
        };
        match with_timeout(self.request_timeout, request).await {
            Ok(tag) => {
                let following = tag.following.unwrap_or(follow);
                self.following = Some(following);
                self.event_hub.publish(TimelineEvent::HashtagFollowChanged {
                    hashtag: self.hashtag.clone(),
                    following,
                });
                Ok(())
            }
            Err(error) => {
                let verb = if follow { "follow" } else { "unfollow" };
                log::error!("Failed to {} #{}: {}", verb, self.hashtag, error);
                Err(error)
            }
        }
    }
}
