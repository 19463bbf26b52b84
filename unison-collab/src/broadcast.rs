use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, warn};
use tokio::sync::broadcast::{self, error::RecvError, Receiver, Sender};
use unison_core::{Id, Payload, Publication, RoomId, Topic, UserId};

pub type SubscriptionId = Id<Subscription>;

/// Fans out publications to everyone subscribed to a room or user topic.
///
/// Every room has its own channel, and only that room's actor publishes on it,
/// so subscribers see a room's messages in the order they were published.
#[derive(Debug)]
pub struct Broadcaster {
    capacity: usize,
    rooms: DashMap<RoomId, Sender<Arc<Publication>>>,
    users: DashMap<UserId, Sender<Arc<Publication>>>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            rooms: Default::default(),
            users: Default::default(),
        }
    }

    fn room_sender(&self, room_id: RoomId) -> Sender<Arc<Publication>> {
        self.rooms
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publishes on the channel the topic belongs to
    pub fn publish(&self, publication: Publication) {
        let sender = match publication.topic {
            // Nobody subscribed as this user, so there is nothing to deliver
            Topic::UserSyncResponse(user_id) => match self.users.get(&user_id) {
                Some(sender) => sender.clone(),
                None => return,
            },
            topic => match topic.room_id() {
                Some(room_id) => self.room_sender(room_id),
                None => return,
            },
        };

        debug!("Publishing on {}", publication.topic);

        // Nobody listening is fine
        let _ = sender.send(Arc::new(publication));
    }

    /// Subscribes to every topic of a room, plus the user's own topics
    pub fn subscribe(&self, room_id: RoomId, user_id: UserId) -> Subscription {
        self.prune_users();

        // Subscribing while the entry is held keeps pruning from dropping the sender
        let user = self
            .users
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        Subscription {
            id: SubscriptionId::new(),
            room_id,
            user_id,
            room: self.room_sender(room_id).subscribe(),
            user,
        }
    }

    /// Drops the channels of users without any subscription left
    pub fn prune_users(&self) {
        self.users.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn user_channels(&self) -> usize {
        self.users.len()
    }

    /// Forgets a room's channel. Existing subscriptions end.
    pub fn close_room(&self, room_id: RoomId) {
        self.rooms.remove(&room_id);
    }
}

/// A subscription to a room, as seen by one user
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub room_id: RoomId,
    pub user_id: UserId,
    room: Receiver<Arc<Publication>>,
    user: Receiver<Arc<Publication>>,
}

impl Subscription {
    /// Waits for the next publication for this subscriber.
    ///
    /// If the subscriber fell behind and messages were dropped, a resync
    /// request is returned instead, since applying later messages on top of a
    /// gap would leave the client out of sync. Returns `None` once the room
    /// is gone.
    pub async fn recv(&mut self) -> Option<Arc<Publication>> {
        loop {
            // A user's own responses go first. Each channel still arrives in order.
            let result = tokio::select! {
                biased;

                result = self.user.recv() => match result {
                    Ok(publication) if !self.is_for_this_room(&publication) => continue,
                    result => result,
                },
                result = self.room.recv() => result,
            };

            match result {
                Ok(publication) => return Some(publication),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "Subscriber {} of room {} lagged behind by {} messages",
                        self.id, self.room_id, skipped
                    );

                    return Some(Arc::new(Publication {
                        topic: Topic::RoomState(self.room_id),
                        payload: Payload::Resync,
                    }));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    fn is_for_this_room(&self, publication: &Publication) -> bool {
        match &publication.payload {
            Payload::Sync(snapshot) => snapshot.room_id == self.room_id,
            Payload::Error(error) => error.room_id == Some(self.room_id),
            _ => true,
        }
    }
}
