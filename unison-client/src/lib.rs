//! The listening side of unison: keeps a local player in step with a room.
//!
//! A [ClientSession] talks to a room through a [Transport], and hands every
//! command and snapshot it receives to a [PlaybackExecutor], which drives the
//! [LocalPlayer] at the scheduled instants.

mod clock;
mod errors;
mod executor;
mod player;
mod session;
mod transport;

pub use clock::*;
pub use errors::*;
pub use executor::*;
pub use player::*;
pub use session::*;
pub use transport::*;
