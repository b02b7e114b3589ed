use super::traits::{MessageContext, Reply, TextHandler};
use crate::client::Client;
use futures_util::FutureExt;
use log::{debug, error, warn};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use wxcore::message::{InboundMessage, RawMessage};
use wxcore::session::SelfUser;
use wxcore::topic::Topic;

/// What one call to [`Client::classify_and_publish`] did.
#[derive(Default)]
pub struct PublishReport {
    /// Topics of the messages that were classified, in batch order.
    pub topics: Vec<Topic>,
    /// The task delivering the batch, if any message had a matching handler.
    pub delivery: Option<JoinHandle<()>>,
}

impl PublishReport {
    /// Waits for the delivery task to finish.
    pub async fn join(self) {
        if let Some(delivery) = self.delivery {
            let _ = delivery.await;
        }
    }
}

impl Client {
    /// Classifies a fetched batch and hands each text message to the
    /// handlers subscribed to its topic.
    ///
    /// Messages of unsupported kinds are dropped with a warning. Matching is
    /// done here, in batch order. Delivery runs on one spawned task that
    /// walks the messages in batch order and each message's handlers in
    /// subscription order, so this returns without waiting for them.
    pub(crate) fn classify_and_publish(
        self: &Arc<Self>,
        self_user: &SelfUser,
        messages: Vec<RawMessage>,
    ) -> PublishReport {
        let mut report = PublishReport::default();
        let mut batch = Vec::new();
        for raw in messages {
            let message = match InboundMessage::classify(&raw, self_user) {
                Ok(message) => message,
                Err(e) => {
                    warn!(
                        target: "Client/Dispatch",
                        "Dropping message {} from {}: {e}",
                        raw.msg_id, raw.from_user_name
                    );
                    continue;
                }
            };
            let topic = message.topic();
            let handlers = self.registry.matching(&topic);
            debug!(
                target: "Client/Dispatch",
                "Message {} on {topic} -> {} handler(s)",
                message.id,
                handlers.len()
            );
            report.topics.push(topic);
            if !handlers.is_empty() {
                batch.push((message, handlers));
            }
        }
        if !batch.is_empty() {
            let client = self.clone();
            report.delivery = Some(tokio::spawn(async move {
                for (message, handlers) in batch {
                    deliver(&client, message, handlers).await;
                }
            }));
        }
        report
    }
}

/// Runs the handlers for one message in subscription order. Each call is
/// isolated: an error or a panic is logged and the next handler still runs.
async fn deliver(client: &Arc<Client>, message: InboundMessage, handlers: Vec<Arc<dyn TextHandler>>) {
    for handler in handlers {
        let reply = Reply::new(client.clone(), message.peer_id.clone());
        let ctx = MessageContext {
            message: message.clone(),
            client: client.clone(),
        };
        let text = message.text().to_string();
        let outcome = AssertUnwindSafe(handler.on_text(text, reply, ctx))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                target: "Client/Dispatch",
                "Handler {} failed on message {}: {e:?}",
                handler.name(),
                message.id
            ),
            Err(_) => error!(
                target: "Client/Dispatch",
                "Handler {} panicked on message {}",
                handler.name(),
                message.id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::traits::FnHandler;
    use crate::test_utils::{MockHttpClient, create_logged_in_client, login_script_user, text_message_json};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use wxcore::topic::Scope;

    #[derive(Debug, Clone, PartialEq)]
    struct Seen {
        text: String,
        peer: String,
        scope: Scope,
        mentioned: bool,
        sender: Option<String>,
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Seen>>);

    #[async_trait]
    impl TextHandler for Recorder {
        async fn on_text(&self, text: String, reply: Reply, ctx: MessageContext) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(Seen {
                text,
                peer: reply.peer().to_string(),
                scope: ctx.scope(),
                mentioned: ctx.mentioned(),
                sender: ctx.resolved_sender().map(str::to_string),
            });
            Ok(())
        }
    }

    impl Recorder {
        fn seen(&self) -> Vec<Seen> {
            self.0.lock().unwrap().clone()
        }
    }

    fn raw(value: serde_json::Value) -> RawMessage {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn routes_single_and_group_to_their_handlers() {
        let client = create_logged_in_client(Arc::new(MockHttpClient::new())).await;
        let singles = Arc::new(Recorder::default());
        let groups = Arc::new(Recorder::default());
        client.respond_single_with(singles.clone(), None);
        client.respond_group_with(groups.clone(), None);

        let report = client.classify_and_publish(
            &login_script_user(),
            vec![
                raw(text_message_json("1", "@alice", "@me", "hi there")),
                raw(text_message_json("2", "@@room", "@me", "Alice:<br/>@Bob\u{2005}ping")),
            ],
        );
        assert_eq!(report.topics.len(), 2);
        assert_eq!(report.topics[0].to_string(), "message.single.@alice.text");
        assert_eq!(report.topics[1].to_string(), "message.group.@@room.text");
        report.join().await;

        assert_eq!(
            singles.seen(),
            vec![Seen {
                text: "hi there".into(),
                peer: "@alice".into(),
                scope: Scope::Single,
                mentioned: false,
                sender: None,
            }]
        );
        assert_eq!(
            groups.seen(),
            vec![Seen {
                text: "ping".into(),
                peer: "@@room".into(),
                scope: Scope::Group,
                mentioned: true,
                sender: Some("Alice".into()),
            }]
        );
    }

    #[tokio::test]
    async fn self_authored_messages_reply_to_the_counterpart() {
        let client = create_logged_in_client(Arc::new(MockHttpClient::new())).await;
        let rec = Arc::new(Recorder::default());
        client.subscribe("*", rec.clone()).unwrap();

        client
            .classify_and_publish(
                &login_script_user(),
                vec![
                    raw(text_message_json("1", "@me", "@alice", "note to alice")),
                    raw(text_message_json("2", "@me", "@@room", "lg")),
                ],
            )
            .join()
            .await;

        let seen = rec.seen();
        assert_eq!(seen[0].peer, "@alice");
        assert_eq!(seen[0].scope, Scope::Single);
        assert_eq!(seen[1].peer, "@@room");
        assert_eq!(seen[1].scope, Scope::Group);
        assert_eq!(seen[1].sender.as_deref(), Some("@me"));
        assert_eq!(seen[1].text, "lg");
    }

    #[tokio::test]
    async fn non_text_is_dropped() {
        let client = create_logged_in_client(Arc::new(MockHttpClient::new())).await;
        let rec = Arc::new(Recorder::default());
        client.subscribe("*", rec.clone()).unwrap();

        let mut image = text_message_json("1", "@alice", "@me", "<img/>");
        image["MsgType"] = 3.into();
        let report = client.classify_and_publish(&login_script_user(), vec![raw(image)]);
        assert!(report.topics.is_empty());
        assert!(report.delivery.is_none());
        assert!(rec.seen().is_empty());
    }

    #[tokio::test]
    async fn peer_filter_excludes_other_groups() {
        let client = create_logged_in_client(Arc::new(MockHttpClient::new())).await;
        let rec = Arc::new(Recorder::default());
        client.subscribe("group.@@room", rec.clone()).unwrap();

        let report = client.classify_and_publish(
            &login_script_user(),
            vec![
                raw(text_message_json("1", "@@other", "@me", "Carol: hey")),
                raw(text_message_json("2", "@alice", "@me", "hey")),
            ],
        );
        assert!(report.delivery.is_none());
    }

    #[tokio::test]
    async fn failing_and_panicking_handlers_do_not_block_others() {
        let client = create_logged_in_client(Arc::new(MockHttpClient::new())).await;
        let failing = FnHandler::new("failing", |_, _, _| async {
            Err::<(), _>(anyhow::anyhow!("nope"))
        });
        let panicking = FnHandler::new("panicking", |text: String, _, _| async move {
            if text == "one" {
                panic!("handler blew up");
            }
            anyhow::Ok(())
        });
        let rec = Arc::new(Recorder::default());
        client.respond_single_with(failing, None);
        client.respond_single_with(panicking, None);
        client.respond_single_with(rec.clone(), None);

        client
            .classify_and_publish(
                &login_script_user(),
                vec![
                    raw(text_message_json("1", "@alice", "@me", "one")),
                    raw(text_message_json("2", "@alice", "@me", "two")),
                ],
            )
            .join()
            .await;

        let texts: Vec<_> = rec.seen().into_iter().map(|s| s.text).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_handler_does_not_reorder_a_topic() {
        let client = create_logged_in_client(Arc::new(MockHttpClient::new())).await;
        let slow = FnHandler::new("slow", |text: String, _, _| async move {
            if text == "one" {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
            anyhow::Ok(())
        });
        let rec = Arc::new(Recorder::default());
        client.respond_single_with(slow, None);
        client.respond_single_with(rec.clone(), None);

        client
            .classify_and_publish(
                &login_script_user(),
                vec![
                    raw(text_message_json("1", "@alice", "@me", "one")),
                    raw(text_message_json("2", "@alice", "@me", "two")),
                ],
            )
            .join()
            .await;

        let texts: Vec<_> = rec.seen().into_iter().map(|s| s.text).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn late_subscription_only_sees_later_messages() {
        let client = create_logged_in_client(Arc::new(MockHttpClient::new())).await;
        let early = Arc::new(Recorder::default());
        client.respond_single_with(early.clone(), None);

        let first = client.classify_and_publish(
            &login_script_user(),
            vec![raw(text_message_json("1", "@alice", "@me", "first"))],
        );
        let late = Arc::new(Recorder::default());
        client.respond_single_with(late.clone(), None);
        first.join().await;

        client
            .classify_and_publish(
                &login_script_user(),
                vec![raw(text_message_json("2", "@alice", "@me", "second"))],
            )
            .join()
            .await;

        assert_eq!(early.seen().len(), 2);
        let late_texts: Vec<_> = late.seen().into_iter().map(|s| s.text).collect();
        assert_eq!(late_texts, vec!["second"]);
    }
}
