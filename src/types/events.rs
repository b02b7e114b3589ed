use crate::sync::SyncStage;
use std::sync::{Arc, RwLock};
use wxcore::session::SelfUser;

/// Lifecycle events published by the client. Message traffic goes through
/// the handler registry instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A handshake identifier is ready for out-of-band confirmation; `url`
    /// points at the scannable code image.
    QrCode { uuid: String, url: String },
    QrScanned,
    LoggedIn(SelfUser),
    SyncStalled {
        stage: SyncStage,
        attempts: u32,
        reason: String,
    },
    SyncStopped,
}

pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &Event);
}

#[derive(Default, Clone)]
pub struct CoreEventBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
}

impl CoreEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .expect("RwLock should not be poisoned")
            .push(handler);
    }

    pub fn has_handlers(&self) -> bool {
        !self
            .handlers
            .read()
            .expect("RwLock should not be poisoned")
            .is_empty()
    }

    pub fn dispatch(&self, event: &Event) {
        for handler in self
            .handlers
            .read()
            .expect("RwLock should not be poisoned")
            .iter()
        {
            handler.handle_event(event);
        }
    }
}
