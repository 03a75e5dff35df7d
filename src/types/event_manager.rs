use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::types::event_callback::{BatchEvent, EventCallback, EventType};

type SharedEventCallback = Arc<Mutex<Box<dyn EventCallback + Send + Sync>>>;

#[derive(Clone, Default)]
pub struct EventManager {
    event_callbacks: Vec<(EventType, SharedEventCallback)>,
}

impl EventManager {
    pub fn new() -> Self {
        Self {
            event_callbacks: Vec::new(),
        }
    }

    pub fn register_callback<T: EventCallback + Send + Sync + 'static>(
        &mut self,
        events_flag: EventType,
        callback: T,
    ) {
        self.event_callbacks
            .push((events_flag, Arc::new(Mutex::new(Box::new(callback)))));
    }

    pub fn is_callback_registered(&self) -> bool {
        !self.event_callbacks.is_empty()
    }

    pub async fn trigger_event(&self, event: BatchEvent) {
        let event_type = event.event_type();
        for (event_flags, callback) in &self.event_callbacks {
            if event_flags.contains(event_type) {
                callback.lock().await.on_event(event.clone()).await;
            }
        }
    }
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let event_flags: Vec<EventType> = self
            .event_callbacks
            .iter()
            .map(|(flags, _)| *flags)
            .collect();
        f.debug_struct("EventManager")
            .field("event_flags", &event_flags)
            .finish()
    }
}
