use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::SyncError;
use crate::handlers::traits::TextHandler;
use crate::types::events::{Event, EventHandler};
use anyhow::{Context, Result};
use log::info;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task;
use webwx_ureq_http_client::UreqHttpClient;
use wxcore::net::HttpClient;
use wxcore::session::SelfUser;

type EventHandlerCallback =
    Arc<dyn Fn(Event, Arc<Client>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct BotEventHandler {
    client: Arc<Client>,
    event_handler: Option<EventHandlerCallback>,
}

impl EventHandler for BotEventHandler {
    fn handle_event(&self, event: &Event) {
        if let Some(handler) = &self.event_handler {
            let handler_clone = handler.clone();
            let event_clone = event.clone();
            let client_clone = self.client.clone();

            tokio::spawn(async move {
                handler_clone(event_clone, client_clone).await;
            });
        }
    }
}

pub struct Bot {
    client: Arc<Client>,
    event_handler: Option<EventHandlerCallback>,
}

impl Bot {
    pub fn builder() -> BotBuilder {
        BotBuilder::new()
    }

    pub fn client(&self) -> Arc<Client> {
        self.client.clone()
    }

    /// Logs in, then starts the sync loop on its own task.
    ///
    /// Returns once the session is established; the handle resolves when
    /// the loop stops or stalls.
    pub async fn run(&mut self) -> Result<task::JoinHandle<Result<(), SyncError>>> {
        let handler = Arc::new(BotEventHandler {
            client: self.client.clone(),
            event_handler: self.event_handler.take(),
        });
        self.client.add_event_handler(handler);

        let me: SelfUser = self.client.login().await.context("login failed")?;
        info!("Logged in as {} ({})", me.nick_name, me.user_name);

        let client_for_run = self.client.clone();
        let client_handle = tokio::spawn(async move { client_for_run.run_sync().await });

        Ok(client_handle)
    }
}

#[derive(Default)]
pub struct BotBuilder {
    event_handler: Option<EventHandlerCallback>,
    config: Option<ClientConfig>,
    http_client: Option<Arc<dyn HttpClient>>,
    subscriptions: Vec<(String, Arc<dyn TextHandler>)>,
}

impl BotBuilder {
    fn new() -> Self {
        Self::default()
    }

    pub fn on_event<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Event, Arc<Client>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.event_handler = Some(Arc::new(move |event, client| {
            Box::pin(handler(event, client))
        }));
        self
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a custom HTTP client instead of the default `ureq` one. The same
    /// client carries the session cookies, so it must not be shared between
    /// bots.
    pub fn with_http_client<C>(mut self, client: C) -> Self
    where
        C: HttpClient + 'static,
    {
        self.http_client = Some(Arc::new(client));
        self
    }

    pub fn with_shared_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Subscribes `handler` to `<scope>[.<peer-or-*>]`, e.g. `group`,
    /// `single.*` or `group.@@abc`. Patterns are validated in `build`.
    pub fn respond_with(mut self, pattern: impl Into<String>, handler: Arc<dyn TextHandler>) -> Self {
        self.subscriptions.push((pattern.into(), handler));
        self
    }

    pub async fn build(self) -> Result<Bot> {
        let config = self.config.unwrap_or_default();
        let http_client = self
            .http_client
            .unwrap_or_else(|| Arc::new(UreqHttpClient::new()) as Arc<dyn HttpClient>);

        let client = Client::new(config, http_client);
        for (pattern, handler) in self.subscriptions {
            client
                .subscribe(&pattern, handler)
                .with_context(|| format!("invalid subscription pattern '{pattern}'"))?;
        }

        Ok(Bot {
            client,
            event_handler: self.event_handler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::traits::FnHandler;
    use crate::test_utils::{
        MockHttpClient, MockResponse, send_ack_body, sync_body, sync_check_body, test_config,
        text_message_json,
    };
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn rejects_bad_pattern() {
        let handler = FnHandler::new("noop", |_, _, _| async { anyhow::Ok(()) });
        let result = Bot::builder()
            .with_config(test_config())
            .with_http_client(MockHttpClient::new())
            .respond_with("channel.*", handler)
            .build()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn logs_in_syncs_and_replies() {
        let mock = Arc::new(
            MockHttpClient::new()
                .with_login_script()
                .route("synccheck", [MockResponse::ok(sync_check_body(0, 2))])
                .route_repeat("synccheck", MockResponse::ok(sync_check_body(0, 0)))
                .route("webwxsync", [MockResponse::ok(sync_body(
                    vec![text_message_json("m1", "@@room", "@me", "Alice:<br/>@Bob ping")],
                    &[(1, 101), (2, 201)],
                ))])
                .route("webwxsendmsg", [MockResponse::ok(send_ack_body("srv-1", "loc-1"))]),
        );

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let pong = FnHandler::new("pong", |text, reply, ctx| async move {
            if ctx.mentioned() && text == "ping" {
                reply.send("pong").await?;
            }
            anyhow::Ok(())
        });
        let mut bot = Bot::builder()
            .with_config(test_config())
            .with_shared_http_client(mock.clone())
            .on_event(move |event, _client| {
                let events_tx = events_tx.clone();
                async move {
                    let _ = events_tx.send(event);
                }
            })
            .respond_with("group", pong)
            .build()
            .await
            .unwrap();

        let sync = bot.run().await.unwrap();

        let mut sent = Vec::new();
        for _ in 0..200 {
            sent = mock.requests_to("webwxsendmsg");
            if !sent.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(sent.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(sent[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(body["Msg"]["ToUserName"], "@@room");
        assert_eq!(body["Msg"]["Content"], "pong");

        bot.client().stop();
        assert!(sync.await.unwrap().is_ok());

        let mut seen = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(100), events_rx.recv()).await
        {
            seen.push(event);
        }
        assert!(seen.iter().any(|e| matches!(e, Event::QrCode { uuid, .. } if uuid == "uuid-1")));
        assert!(seen.contains(&Event::QrScanned));
        assert!(seen.iter().any(|e| matches!(e, Event::LoggedIn(_))));
        assert!(seen.contains(&Event::SyncStopped));
    }
}
