//! Fan-out event bus over a registry of observer callbacks

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::Event;

/// Capacity of a subscriber channel created by [`EventBus::subscribe`]
pub const DEFAULT_CAPACITY: usize = 1000;

/// Returned by an observer's send callback when it can no longer accept
/// payloads. The bus unregisters that observer.
#[derive(Debug, Error)]
#[error("observer rejected payload: {0}")]
pub struct SendError(pub String);

type SendFn = Box<dyn Fn(&str) -> Result<(), SendError> + Send + Sync>;
pub type CloseFn = Box<dyn FnOnce() + Send>;

struct Client {
    send: SendFn,
    close: Mutex<Option<CloseFn>>,
}

impl Client {
    fn close(&self) {
        let hook = self
            .close
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

#[derive(Default)]
struct Registry {
    clients: Mutex<HashMap<u64, Arc<Client>>>,
    next_id: AtomicU64,
    /// Number of events broadcast (for monitoring)
    event_count: AtomicUsize,
}

impl Registry {
    fn remove(&self, id: u64) -> Option<Arc<Client>> {
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id)
    }
}

/// Event bus for publishing orchestration events to registered observers.
///
/// Each broadcast is serialized once and handed to every observer's send
/// callback. An observer whose callback fails is dropped and its close hook
/// runs; the other observers are unaffected. Delivery is at-most-once with
/// no buffering for observers that were not registered at broadcast time.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Dropping (or calling `unregister` on) the
    /// returned handle removes it again and runs `close`.
    pub fn register_client<S>(&self, send: S, close: Option<CloseFn>) -> ClientHandle
    where
        S: Fn(&str) -> Result<(), SendError> + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let client = Arc::new(Client {
            send: Box::new(send),
            close: Mutex::new(close),
        });
        self.registry
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, client);

        ClientHandle {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Serialize `event` and push it to every observer.
    ///
    /// Returns the number of observers that accepted the payload.
    pub fn broadcast(&self, event: &Event) -> usize {
        match serde_json::to_string(event) {
            Ok(payload) => self.broadcast_raw(&payload),
            Err(e) => {
                tracing::error!(error = %e, kind = event.kind(), "Failed to serialize event");
                0
            }
        }
    }

    pub fn broadcast_raw(&self, payload: &str) -> usize {
        self.registry.event_count.fetch_add(1, Ordering::Relaxed);

        // Snapshot so callbacks run without the registry lock held.
        let clients: Vec<(u64, Arc<Client>)> = self
            .registry
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(id, client)| (*id, Arc::clone(client)))
            .collect();

        let mut delivered = 0;
        for (id, client) in clients {
            match (client.send)(payload) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(client_id = id, error = %e, "Dropping event observer");
                    if let Some(removed) = self.registry.remove(id) {
                        removed.close();
                    }
                }
            }
        }
        delivered
    }

    /// Subscribe through a bounded channel.
    ///
    /// The first message is always `connection:ack`. A subscriber that falls
    /// [`DEFAULT_CAPACITY`] messages behind is dropped.
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_with_capacity(DEFAULT_CAPACITY)
    }

    pub fn subscribe_with_capacity(&self, capacity: usize) -> Subscription {
        let (sender, receiver) = mpsc::channel::<String>(capacity.max(1));

        if let Ok(ack) = serde_json::to_string(&Event::connection_ack()) {
            let _ = sender.try_send(ack);
        }

        let handle = self.register_client(
            move |payload| {
                sender
                    .try_send(payload.to_string())
                    .map_err(|e| SendError(e.to_string()))
            },
            None,
        );

        Subscription { receiver, handle }
    }

    /// Get the number of registered observers
    pub fn client_count(&self) -> usize {
        self.registry
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Get the total number of events broadcast
    pub fn event_count(&self) -> usize {
        self.registry.event_count.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("client_count", &self.client_count())
            .field("event_count", &self.event_count())
            .finish()
    }
}

/// Registration of one observer. Unregisters on drop.
#[derive(Debug)]
pub struct ClientHandle {
    id: u64,
    registry: Weak<Registry>,
}

impl ClientHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the observer now. Returns false if the bus had already
    /// dropped it.
    pub fn unregister(self) -> bool {
        self.detach()
    }

    fn detach(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        match registry.remove(self.id) {
            Some(client) => {
                client.close();
                true
            }
            None => false,
        }
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Channel-backed observer returned by [`EventBus::subscribe`]
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<String>,
    handle: ClientHandle,
}

impl Subscription {
    /// Next raw JSON payload, or `None` once the bus dropped this subscriber
    /// and the backlog is drained.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Next payload that parses as an [`Event`].
    pub async fn recv_event(&mut self) -> Option<Event> {
        while let Some(payload) = self.receiver.recv().await {
            match serde_json::from_str(&payload) {
                Ok(event) => return Some(event),
                Err(e) => tracing::debug!(error = %e, "Skipping unparsable event payload"),
            }
        }
        None
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }

    pub fn into_parts(self) -> (mpsc::Receiver<String>, ClientHandle) {
        (self.receiver, self.handle)
    }
}
