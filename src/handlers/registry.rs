use super::traits::TextHandler;
use log::debug;
use std::sync::{Arc, RwLock};
use wxcore::topic::{Topic, TopicPattern};

/// One handler bound to one pattern.
#[derive(Clone)]
pub struct Subscription {
    pub pattern: TopicPattern,
    pub handler: Arc<dyn TextHandler>,
}

impl Subscription {
    fn is_same(&self, pattern: &TopicPattern, handler: &Arc<dyn TextHandler>) -> bool {
        handler_identity(&self.handler) == handler_identity(handler) && &self.pattern == pattern
    }
}

/// Handlers are identified by their allocation, so subscribing the same
/// `Arc` twice is recognised even through different trait-object vtables.
fn handler_identity(handler: &Arc<dyn TextHandler>) -> *const () {
    Arc::as_ptr(handler) as *const ()
}

/// Subscriptions in the order they were made.
///
/// Mutable at any time; a message is matched against a snapshot taken when
/// it is published, so a subscription added meanwhile only sees later
/// messages.
#[derive(Default)]
pub struct HandlerRegistry {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if this handler already holds this pattern.
    pub fn subscribe(&self, pattern: TopicPattern, handler: Arc<dyn TextHandler>) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .expect("RwLock should not be poisoned");
        if subscriptions.iter().any(|s| s.is_same(&pattern, &handler)) {
            debug!(
                target: "Client/Dispatch",
                "{} already subscribed to {pattern}",
                handler.name()
            );
            return false;
        }
        debug!(target: "Client/Dispatch", "{} subscribed to {pattern}", handler.name());
        subscriptions.push(Subscription { pattern, handler });
        true
    }

    /// Handlers whose pattern matches `topic`, in subscription order. A
    /// handler holding several matching patterns appears once.
    pub fn matching(&self, topic: &Topic) -> Vec<Arc<dyn TextHandler>> {
        let subscriptions = self
            .subscriptions
            .read()
            .expect("RwLock should not be poisoned");
        let mut matched: Vec<Arc<dyn TextHandler>> = Vec::new();
        for sub in subscriptions.iter().filter(|s| s.pattern.matches(topic)) {
            let id = handler_identity(&sub.handler);
            if !matched.iter().any(|h| handler_identity(h) == id) {
                matched.push(sub.handler.clone());
            }
        }
        matched
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions
            .read()
            .expect("RwLock should not be poisoned")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.subscriptions
            .read()
            .expect("RwLock should not be poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
