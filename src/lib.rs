// Core types live in wxcore; events (with the event bus) stay here.
pub mod types {
    pub use wxcore::{contacts, message, session, topic};
    pub mod events;
}

pub mod bot;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod login;
pub mod send;
pub mod sync;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use bot::Bot;
pub use client::Client;
pub use config::ClientConfig;
pub use error::{LoginError, SendError, SyncError, TransportError};
pub use handlers::{FnHandler, MessageContext, Reply, TextHandler};
pub use send::SendAck;
pub use sync::{SyncStage, SyncStatus};
