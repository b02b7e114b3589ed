use crate::client::Client;
use crate::error::SendError;
use crate::send::SendAck;
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use wxcore::message::{GroupContext, InboundMessage};
use wxcore::topic::Scope;

/// Consumer of classified text messages.
///
/// Handlers are matched against a message's topic by the registry and run on
/// a task of their own, so a slow or failing handler never holds up the sync
/// loop. An `Err` is logged and otherwise ignored.
#[async_trait]
pub trait TextHandler: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Handles one message.
    ///
    /// # Arguments
    /// * `text` - visible text; for group messages the sender prefix and a
    ///   leading mention of the account are already stripped
    /// * `reply` - sends back into the conversation the message came from
    /// * `ctx` - the full classified message plus the owning client
    async fn on_text(&self, text: String, reply: Reply, ctx: MessageContext) -> anyhow::Result<()>;
}

/// Reply capability bound to one conversation.
#[derive(Clone)]
pub struct Reply {
    client: Arc<Client>,
    peer: String,
}

impl Reply {
    pub(crate) fn new(client: Arc<Client>, peer: impl Into<String>) -> Self {
        Self {
            client,
            peer: peer.into(),
        }
    }

    /// Conversation replies go to: the other party of a direct chat, or the
    /// group id.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn send(&self, text: impl Into<String>) -> Result<SendAck, SendError> {
        self.client.send_text(&self.peer, &text.into()).await
    }
}

pub struct MessageContext {
    pub message: InboundMessage,
    pub client: Arc<Client>,
}

impl MessageContext {
    pub fn scope(&self) -> Scope {
        self.message.scope
    }

    pub fn sender_id(&self) -> &str {
        &self.message.sender_id
    }

    pub fn is_self_authored(&self) -> bool {
        self.message.is_self_authored
    }

    pub fn group(&self) -> Option<&GroupContext> {
        self.message.group.as_ref()
    }

    /// Whether the group text opened with a mention of the account. Always
    /// false in direct chats.
    pub fn mentioned(&self) -> bool {
        self.group().is_some_and(|g| g.mentioned)
    }

    pub fn resolved_sender(&self) -> Option<&str> {
        self.group().and_then(|g| g.resolved_sender.as_deref())
    }
}

/// Adapts an async closure into a [`TextHandler`].
pub struct FnHandler<F, Fut> {
    name: String,
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(String, Reply, MessageContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            f,
            _fut: PhantomData,
        })
    }
}

#[async_trait]
impl<F, Fut> TextHandler for FnHandler<F, Fut>
where
    F: Fn(String, Reply, MessageContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_text(&self, text: String, reply: Reply, ctx: MessageContext) -> anyhow::Result<()> {
        (self.f)(text, reply, ctx).await
    }
}
