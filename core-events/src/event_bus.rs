// =====================================================================================
// File: core-events/src/event_bus.rs
// Description: In-memory event bus implementation
// =====================================================================================

use crate::{DomainEvent, EventError, EventHandler, EventPublisher, EventResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, warn};

/// In-memory event bus.
///
/// Events are queued on an unbounded channel and drained by a single
/// processing task, which preserves publication order per subscriber.
/// Handler failures are logged and swallowed; nothing propagates back to
/// the publishing command.
pub struct InMemoryEventBus {
    handlers: Arc<RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>>,
    sender: Mutex<Option<mpsc::UnboundedSender<DomainEvent>>>,
    stats: Arc<RwLock<EventBusStats>>,
}

/// Processing statistics
#[derive(Debug, Clone, Default)]
pub struct EventBusStats {
    pub published: u64,
    /// Events fully dispatched to their subscriber list
    pub dispatched: u64,
    pub handler_failures: u64,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            sender: Mutex::new(None),
            stats: Arc::new(RwLock::new(EventBusStats::default())),
        }
    }

    /// Register a handler for one event kind.
    pub async fn subscribe(&self, kind: &str, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        debug!(kind = %kind, handler = %handler.name(), "Event subscription created");
        handlers.entry(kind.to_string()).or_default().push(handler);
    }

    /// Start the processing loop. Must be called once before publishing.
    pub async fn start(&self) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<DomainEvent>();
        {
            let mut slot = self.sender.lock().await;
            *slot = Some(sender);
        }

        let handlers = Arc::clone(&self.handlers);
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            debug!("Event bus processing started");
            while let Some(event) = receiver.recv().await {
                Self::dispatch(&event, &handlers, &stats).await;
            }
            warn!("Event bus processing stopped");
        });
    }

    async fn dispatch(
        event: &DomainEvent,
        handlers: &Arc<RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>>,
        stats: &Arc<RwLock<EventBusStats>>,
    ) {
        let kind = event.kind();
        let subscribers = {
            let map = handlers.read().await;
            map.get(kind).cloned().unwrap_or_default()
        };

        if subscribers.is_empty() {
            debug!(kind = %kind, "No handlers registered for event kind");
        }

        for handler in &subscribers {
            match handler.handle(event).await {
                Ok(()) => {
                    debug!(kind = %kind, handler = %handler.name(), "Event processed");
                }
                Err(e) => {
                    // Subscriber failures never reach the publisher.
                    error!(
                        kind = %kind,
                        handler = %handler.name(),
                        error = %e,
                        "Event handler failed"
                    );
                    let mut guard = stats.write().await;
                    guard.handler_failures += 1;
                }
            }
        }

        let mut guard = stats.write().await;
        guard.dispatched += 1;
    }

    /// Snapshot of the processing statistics
    pub async fn stats(&self) -> EventBusStats {
        self.stats.read().await.clone()
    }

    /// Wait until every published event has been dispatched. Test helper.
    pub async fn drain(&self) {
        for _ in 0..200 {
            let stats = self.stats.read().await.clone();
            if stats.dispatched >= stats.published {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: DomainEvent) -> EventResult<()> {
        let kind = event.kind();
        let slot = self.sender.lock().await;
        let sender = slot
            .as_ref()
            .ok_or_else(|| EventError::PublishingFailed("Event bus not started".to_string()))?;
        sender
            .send(event)
            .map_err(|e| EventError::PublishingFailed(e.to_string()))?;

        let mut guard = self.stats.write().await;
        guard.published += 1;
        debug!(kind = %kind, "Event published");
        Ok(())
    }
}
