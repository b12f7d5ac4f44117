use super::filter_model::FilterContext;
use tokio::sync::broadcast;

pub const DEFAULT_EVENT_BUS_CAPACITY: usize = 64;

/// Filters that apply to `context` changed; timelines showing it should reload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChangedEvent {
    pub context: FilterContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineEvent {
    FilterChanged(FilterChangedEvent),
    HashtagFollowChanged { hashtag: String, following: bool },
}

/// Process-wide publish/subscribe channel shared between screens
#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<TimelineEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        EventHub { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimelineEvent> {
        self.sender.subscribe()
    }

    /// Returns how many subscribers saw the event
    pub fn publish(&self, event: TimelineEvent) -> usize {
        log::debug!("Publishing {:?}", event);
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                log::debug!("No subscribers for timeline event");
                0
            }
        }
    }

    pub fn publish_filter_changed(&self, context: FilterContext) -> usize {
        self.publish(TimelineEvent::FilterChanged(FilterChangedEvent { context }))
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUS_CAPACITY)
    }
}
