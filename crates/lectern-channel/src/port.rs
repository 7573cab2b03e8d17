//! Message ports: the raw frame carrier underneath the correlation channel.
//!
//! A port moves opaque text frames between exactly two endpoints, preserving
//! order while both ends are alive and making no other guarantees. The
//! in-process implementations here back tests and same-process embedding;
//! production hosts wrap whatever carrier the embedding environment provides
//! behind the same trait.

use async_trait::async_trait;
use lectern_core::{LecternError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};

/// One endpoint of a bidirectional, ordered, unreliable frame carrier.
///
/// `recv` returning `None` means the peer endpoint is gone and no further
/// frames will ever arrive. Frames already in flight when an endpoint drops
/// are delivered; nothing else is retried or acknowledged.
#[async_trait]
pub trait MessagePort: Send + Sync + std::fmt::Debug {
    /// Queue one frame for the peer endpoint.
    async fn send(&self, frame: String) -> Result<()>;

    /// Wait for the next frame from the peer, or `None` once the peer is gone.
    async fn recv(&self) -> Option<String>;

    /// Short label for the underlying carrier, used in logs.
    fn port_kind(&self) -> &'static str;
}

/// In-process port endpoint backed by a pair of unbounded channels.
#[derive(Debug)]
pub struct InProcessPort {
    sender: mpsc::UnboundedSender<String>,
    receiver: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl InProcessPort {
    /// Create two connected endpoints. Frames sent on one arrive on the other.
    pub fn pair() -> (Self, Self) {
        let (left_tx, right_rx) = mpsc::unbounded_channel();
        let (right_tx, left_rx) = mpsc::unbounded_channel();
        (
            Self {
                sender: left_tx,
                receiver: Mutex::new(left_rx),
            },
            Self {
                sender: right_tx,
                receiver: Mutex::new(right_rx),
            },
        )
    }
}

#[async_trait]
impl MessagePort for InProcessPort {
    async fn send(&self, frame: String) -> Result<()> {
        self.sender
            .send(frame)
            .map_err(|_| LecternError::transport("peer endpoint disconnected"))
    }

    async fn recv(&self) -> Option<String> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await
    }

    fn port_kind(&self) -> &'static str {
        "in-process"
    }
}

/// Registry shared by every [`BusPort`] attached to one [`MessageBus`].
#[derive(Debug, Default)]
struct BusRegistry {
    peers: HashMap<u64, mpsc::UnboundedSender<String>>,
    next_peer: u64,
}

/// Hub connecting more than two endpoints: every frame sent by one attached
/// port is delivered to all the others.
///
/// Used when a host multiplexes several content frames over one carrier in
/// tests. Delivery to a departed peer is silently skipped.
#[derive(Debug, Clone, Default)]
pub struct MessageBus {
    registry: Arc<StdMutex<BusRegistry>>,
}

impl MessageBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new endpoint to the bus.
    pub fn attach(&self) -> BusPort {
        let (sender, receiver) = mpsc::unbounded_channel();
        let peer_id = {
            let mut registry = lock_registry(&self.registry);
            let peer_id = registry.next_peer;
            registry.next_peer += 1;
            registry.peers.insert(peer_id, sender);
            peer_id
        };
        BusPort {
            peer_id,
            registry: Arc::clone(&self.registry),
            receiver: Mutex::new(receiver),
        }
    }

    /// Number of currently attached endpoints.
    pub fn peer_count(&self) -> usize {
        lock_registry(&self.registry).peers.len()
    }
}

/// One endpoint attached to a [`MessageBus`]. Detaches itself on drop.
#[derive(Debug)]
pub struct BusPort {
    peer_id: u64,
    registry: Arc<StdMutex<BusRegistry>>,
    receiver: Mutex<mpsc::UnboundedReceiver<String>>,
}

#[async_trait]
impl MessagePort for BusPort {
    async fn send(&self, frame: String) -> Result<()> {
        let mut registry = lock_registry(&self.registry);
        let mut departed = Vec::new();
        for (peer_id, sender) in &registry.peers {
            if *peer_id == self.peer_id {
                continue;
            }
            if sender.send(frame.clone()).is_err() {
                departed.push(*peer_id);
            }
        }
        for peer_id in departed {
            registry.peers.remove(&peer_id);
        }
        Ok(())
    }

    async fn recv(&self) -> Option<String> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await
    }

    fn port_kind(&self) -> &'static str {
        "bus"
    }
}

impl Drop for BusPort {
    fn drop(&mut self) {
        lock_registry(&self.registry).peers.remove(&self.peer_id);
    }
}

/// The registry mutex is only held for map bookkeeping, so a poisoned lock
/// just means another thread panicked mid-insert; the map itself is still
/// coherent and we continue with it.
fn lock_registry(registry: &StdMutex<BusRegistry>) -> std::sync::MutexGuard<'_, BusRegistry> {
    match registry.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
