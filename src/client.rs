use crate::config::ClientConfig;
use crate::handlers::registry::HandlerRegistry;
use crate::handlers::traits::TextHandler;
use crate::sync::SyncStatus;
use crate::transport::Transport;
use crate::types::events::{CoreEventBus, Event, EventHandler};
use log::info;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{RwLock, watch};
use wxcore::contacts::ContactDirectory;
use wxcore::net::HttpClient;
use wxcore::session::{SelfUser, Session};
use wxcore::topic::{PatternError, Scope, TopicPattern};

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Handle owning one account's session, contact directory, handler registry
/// and transport. Independent instances share nothing.
pub struct Client {
    pub(crate) config: ClientConfig,
    pub(crate) transport: Transport,

    /// Written by login (whole value) and by the sync loop (cursor only).
    pub(crate) session: RwLock<Option<Session>>,
    pub(crate) contacts: std::sync::RwLock<ContactDirectory>,

    pub(crate) registry: HandlerRegistry,
    pub(crate) event_bus: CoreEventBus,

    pub(crate) is_running: AtomicBool,
    pub(crate) shutdown_tx: watch::Sender<bool>,
    pub(crate) sync_status: watch::Sender<SyncStatus>,
}

impl Client {
    pub fn new(config: ClientConfig, http_client: Arc<dyn HttpClient>) -> Arc<Self> {
        let transport = Transport::new(
            http_client,
            config.user_agent.clone(),
            config.request_timeout(),
        );
        Arc::new(Self {
            config,
            transport,
            session: RwLock::new(None),
            contacts: std::sync::RwLock::new(ContactDirectory::default()),
            registry: HandlerRegistry::new(),
            event_bus: CoreEventBus::new(),
            is_running: AtomicBool::new(false),
            shutdown_tx: watch::Sender::new(false),
            sync_status: watch::Sender::new(SyncStatus::Idle),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn is_logged_in(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub async fn self_user(&self) -> Option<SelfUser> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.self_user.clone())
    }

    /// Copy of the session as it stands, cursor included.
    pub async fn session_snapshot(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    pub fn contacts(&self) -> ContactDirectory {
        self.contacts
            .read()
            .expect("RwLock should not be poisoned")
            .clone()
    }

    pub(crate) async fn install_session(&self, session: Session, contacts: ContactDirectory) {
        *self.contacts.write().expect("RwLock should not be poisoned") = contacts;
        *self.session.write().await = Some(session);
    }

    pub fn add_event_handler(&self, handler: Arc<dyn EventHandler>) {
        self.event_bus.add_handler(handler);
    }

    pub(crate) fn dispatch_event(&self, event: Event) {
        self.event_bus.dispatch(&event);
    }

    /// Subscribes `handler` to `<scope>[.<peer-or-*>]`. Returns `Ok(false)`
    /// when the same handler already holds the same pattern.
    pub fn subscribe(
        &self,
        pattern: &str,
        handler: Arc<dyn TextHandler>,
    ) -> Result<bool, PatternError> {
        let pattern = TopicPattern::parse_subscription(pattern)?;
        Ok(self.registry.subscribe(pattern, handler))
    }

    /// Direct chats; all of them when `peer` is `None`.
    pub fn respond_single_with(&self, handler: Arc<dyn TextHandler>, peer: Option<&str>) -> bool {
        self.registry
            .subscribe(TopicPattern::subscription(Scope::Single, peer), handler)
    }

    /// Group chats; all of them when `group` is `None`.
    pub fn respond_group_with(&self, handler: Arc<dyn TextHandler>, group: Option<&str>) -> bool {
        self.registry
            .subscribe(TopicPattern::subscription(Scope::Group, group), handler)
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Asks the sync loop to finish. No new check is issued afterwards and
    /// an in-flight request is abandoned. Pending logins are cancelled too.
    pub fn stop(&self) {
        info!(target: "Client", "Stop requested.");
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub fn is_syncing(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    pub fn sync_status(&self) -> watch::Receiver<SyncStatus> {
        self.sync_status.subscribe()
    }

    /// Runs `fut` unless a stop is requested first; `None` means stopped.
    pub(crate) async fn until_stopped<F: Future>(&self, fut: F) -> Option<F::Output> {
        let mut stop_rx = self.shutdown_tx.subscribe();
        tokio::select! {
            biased;
            _ = stop_rx.wait_for(|stop| *stop) => None,
            out = fut => Some(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockHttpClient, create_logged_in_client, test_config};
    use std::time::Duration;

    #[tokio::test]
    async fn fresh_client_is_logged_out() {
        let client = Client::new(test_config(), Arc::new(MockHttpClient::new()));
        assert!(!client.is_logged_in().await);
        assert!(client.self_user().await.is_none());
        assert!(client.contacts().is_empty());
        assert_eq!(*client.sync_status().borrow(), SyncStatus::Idle);
    }

    #[tokio::test]
    async fn instances_are_independent() {
        let a = create_logged_in_client(Arc::new(MockHttpClient::new())).await;
        let b = Client::new(test_config(), Arc::new(MockHttpClient::new()));
        assert!(a.is_logged_in().await);
        assert!(!b.is_logged_in().await);
        a.stop();
        assert!(a.is_stop_requested());
        assert!(!b.is_stop_requested());
    }

    #[tokio::test]
    async fn until_stopped_short_circuits() {
        let client = Client::new(test_config(), Arc::new(MockHttpClient::new()));
        assert_eq!(client.until_stopped(async { 7 }).await, Some(7));

        let c = client.clone();
        let pending = tokio::spawn(async move {
            c.until_stopped(tokio::time::sleep(Duration::from_secs(60)))
                .await
        });
        tokio::task::yield_now().await;
        client.stop();
        assert_eq!(pending.await.unwrap(), None);
    }
}
