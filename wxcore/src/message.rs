use crate::session::{SelfUser, is_group_id};
use crate::topic::{Scope, Topic};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// One entry of `AddMsgList` in a fetch-batch response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawMessage {
    #[serde(default)]
    pub msg_id: String,
    #[serde(default)]
    pub from_user_name: String,
    #[serde(default)]
    pub to_user_name: String,
    #[serde(default)]
    pub msg_type: u32,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub create_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Image,
    Voice,
    Card,
    Video,
    Emoticon,
    App,
    StatusNotify,
    System,
    Recalled,
    Other(u32),
}

impl From<u32> for MessageKind {
    fn from(code: u32) -> Self {
        match code {
            1 => MessageKind::Text,
            3 => MessageKind::Image,
            34 => MessageKind::Voice,
            42 => MessageKind::Card,
            43 => MessageKind::Video,
            47 => MessageKind::Emoticon,
            49 => MessageKind::App,
            51 => MessageKind::StatusNotify,
            10000 => MessageKind::System,
            10002 => MessageKind::Recalled,
            other => MessageKind::Other(other),
        }
    }
}

impl MessageKind {
    pub const TEXT_CODE: u32 = 1;

    /// Topic segment for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Voice => "voice",
            MessageKind::Card => "card",
            MessageKind::Video => "video",
            MessageKind::Emoticon => "emoticon",
            MessageKind::App => "app",
            MessageKind::StatusNotify => "status",
            MessageKind::System => "system",
            MessageKind::Recalled => "recalled",
            MessageKind::Other(_) => "other",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Other(code) => write!(f, "other({code})"),
            kind => f.write_str(kind.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("unsupported message kind {0}")]
    UnsupportedKind(MessageKind),
}

/// Extra fields derived for multi-party chats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupContext {
    /// Member that wrote the message: the `name:` prefix of the content, or
    /// the account itself for self-authored messages. `None` when the
    /// content carried no prefix.
    pub resolved_sender: Option<String>,
    /// The visible text opens with `@<self display name>` and the name is not
    /// continued by a letter, digit or `_`: `@Bob,` counts, `@Bobby` does not.
    pub mentioned: bool,
    /// Content with the sender prefix and a leading self-mention removed.
    pub text: String,
}

impl GroupContext {
    pub fn parse(content: &str, self_authored: bool, self_user: &SelfUser) -> Self {
        let (resolved_sender, body) = if self_authored {
            (Some(self_user.user_name.clone()), content)
        } else {
            split_sender_prefix(content)
        };

        let (mentioned, text) = match strip_mention(body, &self_user.nick_name) {
            Some(rest) => (true, rest),
            None => (false, body),
        };

        Self {
            resolved_sender,
            mentioned,
            text: text.to_string(),
        }
    }
}

// The prefix ends at the first ':'; the backend form `@id:\n` leaves a line
// break that the trim removes.
fn split_sender_prefix(content: &str) -> (Option<String>, &str) {
    match content.split_once(':') {
        Some((name, rest)) if !name.trim().is_empty() && !name.contains('\n') => {
            (Some(name.trim().to_string()), rest.trim_start())
        }
        _ => (None, content),
    }
}

fn strip_mention<'a>(text: &'a str, nick_name: &str) -> Option<&'a str> {
    if nick_name.is_empty() {
        return None;
    }
    let rest = text.strip_prefix('@')?.strip_prefix(nick_name)?;
    match rest.chars().next() {
        Some(c) if c.is_alphanumeric() || c == '_' => None,
        // U+2005 is the separator the web client inserts after a mention.
        _ => Some(rest.trim_start_matches(|c: char| {
            c.is_whitespace() || c == '\u{2005}' || c == ',' || c == ':'
        })),
    }
}

/// Undoes the markup the backend wraps text content in.
pub fn normalize_content(content: &str) -> String {
    content
        .replace("<br/>", "\n")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// A classified inbound text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: String,
    pub scope: Scope,
    /// The conversation: the counterpart of the account in direct chats,
    /// the group id in group chats.
    pub peer_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub is_self_authored: bool,
    pub group: Option<GroupContext>,
}

impl InboundMessage {
    pub fn classify(raw: &RawMessage, self_user: &SelfUser) -> Result<Self, ClassifyError> {
        let kind = MessageKind::from(raw.msg_type);
        if kind != MessageKind::Text {
            return Err(ClassifyError::UnsupportedKind(kind));
        }

        let is_self_authored = raw.from_user_name == self_user.user_name;
        let peer_id = if is_self_authored {
            raw.to_user_name.clone()
        } else {
            raw.from_user_name.clone()
        };
        let scope = if is_group_id(&peer_id) {
            Scope::Group
        } else {
            Scope::Single
        };

        let content = normalize_content(&raw.content);
        let group = (scope == Scope::Group)
            .then(|| GroupContext::parse(&content, is_self_authored, self_user));

        Ok(Self {
            id: raw.msg_id.clone(),
            scope,
            peer_id,
            sender_id: raw.from_user_name.clone(),
            recipient_id: raw.to_user_name.clone(),
            content,
            kind,
            is_self_authored,
            group,
        })
    }

    pub fn topic(&self) -> Topic {
        Topic::new(self.scope, self.peer_id.clone(), self.kind.as_str())
    }

    /// Text handed to handlers: the visible group text, or the whole content.
    pub fn text(&self) -> &str {
        match &self.group {
            Some(group) => &group.text,
            None => &self.content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn me() -> SelfUser {
        SelfUser {
            user_name: "@me".into(),
            nick_name: "Bob".into(),
        }
    }

    fn raw(from: &str, to: &str, msg_type: u32, content: &str) -> RawMessage {
        RawMessage {
            msg_id: "1".into(),
            from_user_name: from.into(),
            to_user_name: to.into(),
            msg_type,
            content: content.into(),
            create_time: 0,
        }
    }

    #[test]
    fn group_mention_and_sender() {
        let msg =
            InboundMessage::classify(&raw("@@room", "@me", 1, "Alice: @Bob hello"), &me()).unwrap();
        assert_eq!(msg.scope, Scope::Group);
        assert_eq!(msg.peer_id, "@@room");
        let group = msg.group.as_ref().unwrap();
        assert!(group.mentioned);
        assert_eq!(group.resolved_sender.as_deref(), Some("Alice"));
        assert_eq!(group.text, "hello");
        assert_eq!(msg.text(), "hello");
        assert_eq!(msg.topic().to_string(), "message.group.@@room.text");
    }

    #[test]
    fn sender_prefix_ends_at_first_colon() {
        let msg = InboundMessage::classify(
            &raw("@@room", "@me", 1, "Alice: @Bob look:<br/>this"),
            &me(),
        )
        .unwrap();
        let group = msg.group.unwrap();
        assert_eq!(group.resolved_sender.as_deref(), Some("Alice"));
        assert!(group.mentioned);
        assert_eq!(group.text, "look:\nthis");
    }

    #[test]
    fn mention_followed_by_punctuation() {
        let msg =
            InboundMessage::classify(&raw("@@room", "@me", 1, "Alice: @Bob, lunch?"), &me())
                .unwrap();
        let group = msg.group.unwrap();
        assert!(group.mentioned);
        assert_eq!(group.text, "lunch?");
    }

    #[test]
    fn group_backend_line_break_prefix() {
        let msg = InboundMessage::classify(
            &raw("@@room", "@me", 1, "@a1b2c3:<br/>@Bob\u{2005}ping"),
            &me(),
        )
        .unwrap();
        let group = msg.group.unwrap();
        assert_eq!(group.resolved_sender.as_deref(), Some("@a1b2c3"));
        assert!(group.mentioned);
        assert_eq!(group.text, "ping");
    }

    #[test]
    fn mention_of_someone_else_is_not_flagged() {
        let msg =
            InboundMessage::classify(&raw("@@room", "@me", 1, "Alice: @Bobby hi"), &me()).unwrap();
        let group = msg.group.unwrap();
        assert!(!group.mentioned);
        assert_eq!(group.text, "@Bobby hi");
    }

    #[test]
    fn self_authored_group_message() {
        let msg = InboundMessage::classify(&raw("@me", "@@room", 1, "lg"), &me()).unwrap();
        assert!(msg.is_self_authored);
        assert_eq!(msg.scope, Scope::Group);
        assert_eq!(msg.peer_id, "@@room");
        let group = msg.group.unwrap();
        assert_eq!(group.resolved_sender.as_deref(), Some("@me"));
        assert_eq!(group.text, "lg");
    }

    #[test]
    fn single_chat_peer_is_counterpart() {
        let inbound = InboundMessage::classify(&raw("@alice", "@me", 1, "hi"), &me()).unwrap();
        assert_eq!(inbound.peer_id, "@alice");
        assert_eq!(inbound.scope, Scope::Single);
        assert!(inbound.group.is_none());

        let outbound = InboundMessage::classify(&raw("@me", "@alice", 1, "yo"), &me()).unwrap();
        assert_eq!(outbound.peer_id, "@alice");
        assert!(outbound.is_self_authored);
    }

    #[test]
    fn non_text_is_rejected() {
        assert_eq!(
            InboundMessage::classify(&raw("@alice", "@me", 3, ""), &me()),
            Err(ClassifyError::UnsupportedKind(MessageKind::Image))
        );
        assert_eq!(MessageKind::from(9999).to_string(), "other(9999)");
    }

    #[test]
    fn content_markup_is_undone() {
        assert_eq!(normalize_content("a&lt;b&gt;<br/>&amp;lt;"), "a<b>\n&lt;");
    }
}
