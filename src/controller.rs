//! Conversation Controller
//!
//! Turns each inbound message into replies by:
//! 1. Locking the sender's session (one message per user at a time)
//! 2. Classifying the message once, from the current mode and its content
//! 3. Querying the catalog when the intent needs it (bounded by a timeout)
//! 4. Updating the session and rendering the replies
//!
//! `classify` is the only place that decides what a message means, so a
//! digits-only message can never be read both as a keyword and as a
//! selection.

use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogError, CatalogStore, Status, Title, SEARCH_LIMIT};
use crate::message::{InboundMessage, Outbound};
use crate::presentation::{self, ListingKind};
use crate::session::{Mode, SessionStore};

/// Shortest keyword accepted for a search (characters)
pub const MIN_QUERY_CHARS: usize = 4;

/// Default bound on a single catalog call
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

static SELECTION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+$").expect("valid selection regex"));

/// What one inbound message asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Start,
    Search,
    BrowseAiring,
    Help,
    Channel,
    Chat,
    /// Keyword typed while awaiting a query
    Query(String),
    /// 1-based pick typed while selecting; overflowing numbers saturate
    Select(usize),
    /// Non-numeric text while selecting
    NotANumber,
    /// Free text with no active flow
    NoActiveMode,
    /// Unknown command or empty text; logged and dropped
    Ignore(String),
}

/// Decide what a message means in the given mode.
///
/// Priority: command, then menu button label, then the mode's content rule.
pub fn classify(mode: Mode, msg: &InboundMessage) -> Intent {
    if let Some(command) = msg.command.as_deref() {
        return match command {
            "start" => Intent::Start,
            "search" => Intent::Search,
            "airing" => Intent::BrowseAiring,
            "help" => Intent::Help,
            "channel" => Intent::Channel,
            "chat" => Intent::Chat,
            other => Intent::Ignore(format!("unknown command /{}", other)),
        };
    }

    let text = msg.text.trim();
    if text.is_empty() {
        return Intent::Ignore("empty text".to_string());
    }

    if let Some(intent) = menu_intent(text) {
        return intent;
    }

    match mode {
        Mode::AwaitingQuery => Intent::Query(text.to_string()),
        Mode::Selecting if SELECTION_PATTERN.is_match(text) => {
            Intent::Select(text.parse().unwrap_or(usize::MAX))
        }
        Mode::Selecting => Intent::NotANumber,
        Mode::Idle => Intent::NoActiveMode,
    }
}

fn menu_intent(text: &str) -> Option<Intent> {
    let intents = [
        (presentation::BUTTON_SEARCH, Intent::Search),
        (presentation::BUTTON_AIRING, Intent::BrowseAiring),
        (presentation::BUTTON_HELP, Intent::Help),
        (presentation::BUTTON_CHANNEL, Intent::Channel),
        (presentation::BUTTON_CHAT, Intent::Chat),
    ];

    intents
        .into_iter()
        .find(|(label, _)| label.eq_ignore_ascii_case(text))
        .map(|(_, intent)| intent)
}

/// Links appended to the channel/chat informational replies
#[derive(Debug, Clone, Default)]
pub struct InfoLinks {
    pub channel_url: Option<String>,
    pub chat_url: Option<String>,
}

/// Per-user conversation state machine over a shared catalog
pub struct Controller {
    catalog: Arc<dyn CatalogStore>,
    sessions: SessionStore,
    query_timeout: Duration,
    links: InfoLinks,
}

impl Controller {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self {
            catalog,
            sessions: SessionStore::new(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            links: InfoLinks::default(),
        }
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_info_links(mut self, links: InfoLinks) -> Self {
        self.links = links;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Current mode of a user (idle if never seen)
    pub async fn mode(&self, user_id: i64) -> Mode {
        self.sessions
            .snapshot(user_id)
            .await
            .map(|s| s.mode())
            .unwrap_or_default()
    }

    /// Handle one inbound message and return the replies in send order
    pub async fn handle(&self, msg: &InboundMessage) -> Vec<Outbound> {
        let mut session = self.sessions.lock(msg.user_id).await;
        let mode = session.mode();
        let intent = classify(mode, msg);
        debug!("user={} mode={} intent={:?}", msg.user_id, mode, intent);

        match intent {
            Intent::Start => {
                session.reset();
                vec![Outbound::with_keyboard(
                    presentation::WELCOME_TEXT,
                    presentation::main_menu(),
                )]
            }
            Intent::Search => {
                session.begin_search();
                vec![Outbound::text(presentation::ASK_QUERY_TEXT)]
            }
            Intent::BrowseAiring => {
                let listing = self
                    .bounded(msg.user_id, self.catalog.list_by_status(Status::Airing))
                    .await;
                match listing {
                    Some(titles) if !titles.is_empty() => {
                        let text = presentation::render_result_list(&titles, ListingKind::Airing);
                        session.present(titles);
                        vec![Outbound::text(text)]
                    }
                    Some(_) => {
                        session.reset();
                        vec![Outbound::text(ListingKind::Airing.empty_text())]
                    }
                    None => {
                        session.reset();
                        vec![Outbound::text(presentation::UNAVAILABLE_TEXT)]
                    }
                }
            }
            Intent::Query(keyword) => {
                if keyword.chars().count() < MIN_QUERY_CHARS {
                    return vec![Outbound::text(presentation::QUERY_TOO_SHORT_TEXT)];
                }

                let mut replies = vec![Outbound::text(presentation::SEARCHING_TEXT)];
                let results = self
                    .bounded(msg.user_id, self.catalog.search(&keyword, SEARCH_LIMIT))
                    .await;
                match results {
                    Some(titles) if !titles.is_empty() => {
                        info!("Search {:?} by user {}: {} results", keyword, msg.user_id, titles.len());
                        let text = presentation::render_result_list(&titles, ListingKind::Search);
                        session.present(titles);
                        replies.push(Outbound::text(text));
                    }
                    Some(_) => {
                        info!("Search {:?} by user {}: no results", keyword, msg.user_id);
                        session.reset();
                        replies.push(Outbound::text(ListingKind::Search.empty_text()));
                    }
                    None => {
                        session.reset();
                        replies.push(Outbound::text(presentation::UNAVAILABLE_TEXT));
                    }
                }
                replies
            }
            Intent::Select(number) => match session.take_selection(number) {
                Some(title) => {
                    info!("User {} opened title {} ({})", msg.user_id, title.id, title.name);
                    vec![presentation::render_detail(&title).to_outbound()]
                }
                None => vec![Outbound::text(presentation::INVALID_NUMBER_TEXT)],
            },
            Intent::NotANumber => vec![Outbound::text(presentation::NOT_A_NUMBER_TEXT)],
            Intent::NoActiveMode => vec![Outbound::text(presentation::NO_ACTIVE_MODE_TEXT)],
            Intent::Help => {
                session.reset();
                vec![Outbound::text(presentation::HELP_TEXT)]
            }
            Intent::Channel => {
                session.reset();
                vec![Outbound::text(presentation::info_text(
                    presentation::CHANNEL_TEXT,
                    self.links.channel_url.as_deref(),
                ))]
            }
            Intent::Chat => {
                session.reset();
                vec![Outbound::text(presentation::info_text(
                    presentation::CHAT_TEXT,
                    self.links.chat_url.as_deref(),
                ))]
            }
            Intent::Ignore(reason) => {
                warn!("Ignoring message from user {}: {}", msg.user_id, reason);
                Vec::new()
            }
        }
    }

    /// Run a catalog call under the query timeout; `None` means unavailable
    async fn bounded<F>(&self, user_id: i64, call: F) -> Option<Vec<Title>>
    where
        F: Future<Output = Result<Vec<Title>, CatalogError>>,
    {
        let result = match tokio::time::timeout(self.query_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CatalogError::Timeout(self.query_timeout)),
        };

        match result {
            Ok(titles) => Some(titles),
            Err(e) => {
                warn!("Catalog call failed for user {}: {}", user_id, e);
                None
            }
        }
    }
}
