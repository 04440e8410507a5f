//! Room registry and new-message subscriptions.
//!
//! The registry owns every room and its message log. All reads and writes go
//! through its accessors; nothing else holds a mutable reference to a room.
//!
//! ```text
//!                      Arc<RoomRegistry>
//!               ┌──────────────────────────────┐
//!               │ rooms: RwLock<RoomTable {    │
//!               │   order: Vec<Arc<Room>>,     │
//!               │   by_id: HashMap<id, Room>,  │
//!               │ }>                           │
//!               └──────────────┬───────────────┘
//!                              │
//!          ┌───────────────────┼────────────────────┐
//!          ▼                   ▼                    ▼
//!   append_message()      Subscription          Subscription
//!   push + watch::send    changed().await       changed().await
//! ```
//!
//! Each room carries a `tokio::sync::watch` channel holding its committed
//! message count. Appends publish the new count while still holding the
//! room's write lock, so a subscriber that sees count `n` can always read the
//! first `n` messages. Subscribers wake on the count change and drain every
//! message between their cursor and the new count, so bursts that land
//! between two wake-ups are delivered in full.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::error::RoomError;
use crate::room::{Message, RoomInfo, validate_room_id};

struct Room {
    id: String,
    messages: RwLock<Vec<Message>>,
    length_tx: watch::Sender<usize>,
}

impl Room {
    fn new(id: String) -> Self {
        let (length_tx, _) = watch::channel(0);
        Self {
            id,
            messages: RwLock::new(Vec::new()),
            length_tx,
        }
    }

    /// Count of fully appended messages.
    fn message_count(&self) -> usize {
        *self.length_tx.borrow()
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id.clone(),
            message_count: self.message_count(),
        }
    }
}

#[derive(Default)]
struct RoomTable {
    order: Vec<Arc<Room>>,
    by_id: HashMap<String, Arc<Room>>,
}

/// Process-wide set of rooms, safe to share across tasks behind an `Arc`.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<RoomTable>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty room.
    ///
    /// Exactly one of several concurrent creators of the same id succeeds;
    /// the others get [`RoomError::AlreadyExists`].
    pub async fn create_room(&self, id: &str) -> Result<RoomInfo, RoomError> {
        validate_room_id(id)?;

        let mut rooms = self.rooms.write().await;
        if rooms.by_id.contains_key(id) {
            return Err(RoomError::AlreadyExists(id.to_string()));
        }

        let room = Arc::new(Room::new(id.to_string()));
        rooms.by_id.insert(id.to_string(), Arc::clone(&room));
        rooms.order.push(Arc::clone(&room));

        tracing::info!(room = %id, rooms = rooms.order.len(), "room created");
        Ok(room.info())
    }

    pub async fn get_room(&self, id: &str) -> Result<RoomInfo, RoomError> {
        Ok(self.lookup(id).await?.info())
    }

    /// Snapshot of every room, in creation order.
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let rooms = self.rooms.read().await;
        rooms.order.iter().map(|room| room.info()).collect()
    }

    /// Appends one message to a room and wakes its subscribers.
    pub async fn append_message(
        &self,
        id: &str,
        author: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<(), RoomError> {
        let room = self.lookup(id).await?;
        let mut messages = room.messages.write().await;
        messages.push(Message::new(author, content));
        // Published under the write lock: readers never see a count ahead of
        // the log.
        room.length_tx.send_replace(messages.len());

        tracing::debug!(room = %id, message_count = messages.len(), "message appended");
        Ok(())
    }

    /// Starts a subscription that yields messages appended from now on.
    ///
    /// Every call returns an independent subscription positioned at the
    /// room's current length.
    pub async fn subscribe(&self, id: &str) -> Result<Subscription, RoomError> {
        let room = self.lookup(id).await?;
        let (cursor, length_rx) = {
            let messages = room.messages.read().await;
            (messages.len(), room.length_tx.subscribe())
        };

        tracing::debug!(
            room = %id,
            cursor,
            subscribers = room.length_tx.receiver_count(),
            "subscriber added"
        );

        Ok(Subscription {
            room,
            cursor,
            length_rx,
            pending: VecDeque::new(),
        })
    }

    /// Number of live subscriptions on a room.
    pub async fn subscriber_count(&self, id: &str) -> Result<usize, RoomError> {
        Ok(self.lookup(id).await?.length_tx.receiver_count())
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.order.len()
    }

    async fn lookup(&self, id: &str) -> Result<Arc<Room>, RoomError> {
        let rooms = self.rooms.read().await;
        rooms
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(id.to_string()))
    }
}

/// A live feed of messages appended to one room after the subscription began.
pub struct Subscription {
    room: Arc<Room>,
    cursor: usize,
    length_rx: watch::Receiver<usize>,
    pending: VecDeque<Message>,
}

impl Subscription {
    pub fn room_id(&self) -> &str {
        &self.room.id
    }

    /// Waits for and returns the next new message.
    ///
    /// Returns `None` once the room has been torn down. Cancel safe: dropping
    /// the future loses no messages, so this can sit in a `select!` arm.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return Some(message);
            }

            let committed = *self.length_rx.borrow_and_update();
            if committed > self.cursor {
                let messages = self.room.messages.read().await;
                self.pending
                    .extend(messages[self.cursor..committed].iter().cloned());
                self.cursor = committed;
                continue;
            }

            if self.length_rx.changed().await.is_err() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn create_then_get() {
        let registry = RoomRegistry::new();
        let info = registry.create_room("general").await.unwrap();
        assert_eq!(info.id, "general");
        assert_eq!(info.message_count, 0);

        let fetched = registry.get_room("general").await.unwrap();
        assert_eq!(fetched, info);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let registry = RoomRegistry::new();
        registry.create_room("general").await.unwrap();

        let second = registry.create_room("general").await;
        assert_eq!(second, Err(RoomError::AlreadyExists("general".into())));
        assert_eq!(registry.room_count().await, 1);
    }

    #[tokio::test]
    async fn invalid_id_is_rejected() {
        let registry = RoomRegistry::new();
        let result = registry.create_room("").await;
        assert!(matches!(result, Err(RoomError::InvalidArgument(_))));
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let registry = RoomRegistry::new();
        assert_eq!(
            registry.get_room("nowhere").await,
            Err(RoomError::NotFound("nowhere".into()))
        );
        assert!(matches!(
            registry.append_message("nowhere", "alice", "hi").await,
            Err(RoomError::NotFound(_))
        ));
        assert!(matches!(
            registry.subscribe("nowhere").await,
            Err(RoomError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_preserves_creation_order() {
        let registry = RoomRegistry::new();
        for id in ["zeta", "alpha", "mu"] {
            registry.create_room(id).await.unwrap();
        }
        registry.append_message("alpha", "bob", "yo").await.unwrap();

        let first = registry.list_rooms().await;
        let ids: Vec<_> = first.iter().map(|room| room.id.as_str()).collect();
        assert_eq!(ids, ["zeta", "alpha", "mu"]);
        assert_eq!(first[1].message_count, 1);

        assert_eq!(registry.list_rooms().await, first);
    }

    #[tokio::test]
    async fn subscription_skips_existing_messages() {
        let registry = RoomRegistry::new();
        registry.create_room("general").await.unwrap();
        registry.append_message("general", "alice", "hi").await.unwrap();
        registry.append_message("general", "bob", "yo").await.unwrap();
        assert_eq!(registry.get_room("general").await.unwrap().message_count, 2);

        let mut subscription = registry.subscribe("general").await.unwrap();
        registry.append_message("general", "alice", "bye").await.unwrap();

        let delivered = timeout(Duration::from_secs(1), subscription.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered, Message::new("alice", "bye"));

        let nothing_more = timeout(Duration::from_millis(50), subscription.recv()).await;
        assert!(nothing_more.is_err());
    }

    #[tokio::test]
    async fn burst_between_wakeups_is_delivered_in_order() {
        let registry = RoomRegistry::new();
        registry.create_room("general").await.unwrap();
        let mut subscription = registry.subscribe("general").await.unwrap();

        for n in 0..5 {
            registry
                .append_message("general", "alice", format!("msg {n}"))
                .await
                .unwrap();
        }

        for n in 0..5 {
            let message = subscription.recv().await.unwrap();
            assert_eq!(message.content, format!("msg {n}"));
        }
    }

    #[tokio::test]
    async fn recv_wakes_on_append() {
        let registry = Arc::new(RoomRegistry::new());
        registry.create_room("general").await.unwrap();
        let mut subscription = registry.subscribe("general").await.unwrap();

        let writer = Arc::clone(&registry);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.append_message("general", "carol", "late").await.unwrap();
        });

        let message = timeout(Duration::from_secs(1), subscription.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.author, "carol");
        assert_eq!(subscription.room_id(), "general");
    }
}
