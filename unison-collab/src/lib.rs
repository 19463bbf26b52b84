mod auth;
mod broadcast;
mod db;
mod errors;
mod rooms;
mod util;

use std::sync::Arc;

use dashmap::DashMap;
use unison_core::{Config, RoomId, SharedClock, SystemClock, UserId};

pub use auth::*;
pub use broadcast::*;
pub use db::*;
pub use errors::*;
pub use rooms::*;

/// The unison collab system, facilitating room management, authentication, and more.
pub struct Collab<Db> {
    context: CollabContext<Db>,

    pub rooms: RoomManager<Db>,
    pub auth: Auth<Db>,
}

/// A type passed to various components of the collab system, to access state and publish events.
pub struct CollabContext<Db> {
    pub database: Arc<Db>,
    pub broadcaster: Arc<Broadcaster>,
    pub clock: SharedClock,
    pub config: Config,

    pub rooms: Arc<DashMap<RoomId, RoomHandle>>,
}

impl<Db> Collab<Db>
where
    Db: Database,
{
    pub fn new(database: Db, config: Config) -> Self {
        Self::with_clock(database, config, Arc::new(SystemClock))
    }

    pub fn with_clock(database: Db, config: Config, clock: SharedClock) -> Self {
        let database = Arc::new(database);

        let context = CollabContext {
            database: database.clone(),
            broadcaster: Arc::new(Broadcaster::new(config.channel_capacity)),
            clock,
            config,

            rooms: Default::default(),
        };

        let rooms = RoomManager::new(&context);
        let auth = Auth::new(&database);

        Self {
            context,
            rooms,
            auth,
        }
    }

    pub fn database(&self) -> &Arc<Db> {
        &self.context.database
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.context.clock
    }

    /// Subscribes to everything published for a room, and the user's sync responses
    pub fn subscribe(&self, room_id: RoomId, user_id: UserId) -> Subscription {
        self.context.broadcaster.subscribe(room_id, user_id)
    }
}

impl<Db> Clone for CollabContext<Db>
where
    Db: Database,
{
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            broadcaster: self.broadcaster.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
            rooms: self.rooms.clone(),
        }
    }
}
