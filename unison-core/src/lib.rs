//! The unison domain: queue, voting, playback and presence for a single room,
//! plus the wire protocol spoken between room actors and clients.
//!
//! Nothing in this crate performs I/O. Time is always passed in as a
//! [Timestamp], which keeps every transition deterministic and testable.

mod clock;
mod config;
mod error;
mod events;
mod media;
mod playback;
mod presence;
mod protocol;
mod queuing;
mod room;
mod util;

pub use clock::*;
pub use config::*;
pub use error::*;
pub use events::*;
pub use media::*;
pub use playback::*;
pub use presence::*;
pub use protocol::*;
pub use queuing::*;
pub use room::*;
pub use util::*;
