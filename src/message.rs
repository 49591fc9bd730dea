//! Message Payloads
//!
//! Transport-neutral inbound events and outbound replies. The Telegram
//! adapter converts to and from these; the controller never sees a
//! transport envelope.

use std::fmt;

/// One inbound text event from a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub user_id: i64,
    /// Raw text as typed (commands included)
    pub text: String,
    /// Lower-cased command name without the leading `/` or `@botname`
    pub command: Option<String>,
}

impl InboundMessage {
    /// Build an event from raw text, extracting a leading `/command`
    pub fn parse(user_id: i64, text: &str) -> Self {
        let command = text.trim().strip_prefix('/').and_then(|rest| {
            let word = rest.split(char::is_whitespace).next().unwrap_or("");
            let name = word.split('@').next().unwrap_or("");
            if name.is_empty() {
                None
            } else {
                Some(name.to_lowercase())
            }
        });

        Self {
            user_id,
            text: text.to_string(),
            command,
        }
    }
}

/// Inline button opening a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkButton {
    pub label: String,
    pub url: String,
}

impl LinkButton {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// Keyboard attached to a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    /// Buttons under the message, each opening a link
    Inline(Vec<Vec<LinkButton>>),
    /// Persistent menu replacing the user's keyboard; pressing a button
    /// sends its label as text
    Reply(Vec<Vec<String>>),
}

impl Keyboard {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Inline(rows) => rows.iter().all(Vec::is_empty),
            Self::Reply(rows) => rows.iter().all(Vec::is_empty),
        }
    }
}

/// One reply to deliver, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text {
        text: String,
        keyboard: Option<Keyboard>,
    },
    Media {
        /// URL or transport file id
        media: String,
        caption: String,
        keyboard: Option<Keyboard>,
    },
}

impl Outbound {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self::Text {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }

    /// Text body or caption
    pub fn body(&self) -> &str {
        match self {
            Self::Text { text, .. } => text,
            Self::Media { caption, .. } => caption,
        }
    }

    pub fn keyboard(&self) -> Option<&Keyboard> {
        match self {
            Self::Text { keyboard, .. } | Self::Media { keyboard, .. } => keyboard.as_ref(),
        }
    }
}

impl fmt::Display for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { text, .. } => write!(f, "text({} chars)", text.chars().count()),
            Self::Media { media, .. } => write!(f, "media({})", media),
        }
    }
}
