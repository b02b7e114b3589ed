//! Routing keys for inbound events and the patterns handlers subscribe with.
//!
//! A topic is the ordered tuple `message.<scope>.<peer-id>.<kind>`. Peer ids
//! are opaque backend strings, so topics are never built by joining strings
//! and split again; both sides stay as segment lists.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const TOPIC_ROOT: &str = "message";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Single,
    Group,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Single => "single",
            Scope::Group => "group",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Scope::Single),
            "group" => Ok(Scope::Group),
            other => Err(PatternError::UnknownScope(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("unknown scope '{0}', expected 'single', 'group' or '*'")]
    UnknownScope(String),
    #[error("empty subscription pattern")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    pub scope: Scope,
    pub peer: String,
    pub kind: String,
}

impl Topic {
    pub fn new(scope: Scope, peer: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            scope,
            peer: peer.into(),
            kind: kind.into(),
        }
    }

    pub fn segments(&self) -> [&str; 4] {
        [TOPIC_ROOT, self.scope.as_str(), &self.peer, &self.kind]
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments().join("."))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Exact(String),
    /// `*`: exactly one segment.
    Any,
    /// `**`: zero or more trailing segments.
    AnyTail,
}

impl Segment {
    fn from_token(token: &str) -> Self {
        match token {
            "*" => Segment::Any,
            "**" => Segment::AnyTail,
            other => Segment::Exact(other.to_string()),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Exact(s) => f.write_str(s),
            Segment::Any => f.write_str("*"),
            Segment::AnyTail => f.write_str("**"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPattern {
    segments: Vec<Segment>,
}

impl TopicPattern {
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// `message.<scope>.<peer or *>.**`
    pub fn subscription(scope: Scope, peer: Option<&str>) -> Self {
        let peer = match peer {
            Some(p) => Segment::from_token(p),
            None => Segment::Any,
        };
        Self {
            segments: vec![
                Segment::Exact(TOPIC_ROOT.to_string()),
                Segment::Exact(scope.as_str().to_string()),
                peer,
                Segment::AnyTail,
            ],
        }
    }

    /// Parses the short `<scope>[.<peer-or-wildcard>]` form handlers are
    /// registered with. The scope may itself be `*`. Everything after the
    /// first dot is the peer, so peer ids containing dots survive intact.
    pub fn parse_subscription(pattern: &str) -> Result<Self, PatternError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }
        let (scope, peer) = match pattern.split_once('.') {
            Some((scope, peer)) if !peer.is_empty() => (scope, Some(peer)),
            Some((scope, _)) => (scope, None),
            None => (pattern, None),
        };
        let scope = match scope {
            "*" => Segment::Any,
            s => Segment::Exact(s.parse::<Scope>()?.as_str().to_string()),
        };
        let peer = peer.map(Segment::from_token).unwrap_or(Segment::Any);
        Ok(Self {
            segments: vec![
                Segment::Exact(TOPIC_ROOT.to_string()),
                scope,
                peer,
                Segment::AnyTail,
            ],
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn matches(&self, topic: &Topic) -> bool {
        matches_segments(&self.segments, &topic.segments())
    }
}

fn matches_segments(pattern: &[Segment], topic: &[&str]) -> bool {
    match pattern.split_first() {
        None => topic.is_empty(),
        Some((Segment::AnyTail, rest)) => {
            (0..=topic.len()).any(|skip| matches_segments(rest, &topic[skip..]))
        }
        Some((segment, rest)) => match topic.split_first() {
            None => false,
            Some((head, tail)) => {
                let hit = match segment {
                    Segment::Exact(s) => s == head,
                    _ => true,
                };
                hit && matches_segments(rest, tail)
            }
        },
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for TopicPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_subscription(s)
    }
}
