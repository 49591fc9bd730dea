//! Presentation Builder
//!
//! Pure rendering of result lists, detail views and the static menu/help
//! copy. Nothing here performs I/O.

use crate::catalog::Title;
use crate::message::{Keyboard, LinkButton, Outbound};

/// Episode buttons per keyboard row
pub const EPISODE_ROW_WIDTH: usize = 3;

/// Telegram's limit for media captions (UTF-16 code units)
pub const CAPTION_LIMIT: usize = 1024;

// ============ Menu Labels ============

pub const BUTTON_SEARCH: &str = "Search Series";
pub const BUTTON_AIRING: &str = "Airing Now";
pub const BUTTON_CHANNEL: &str = "Channel";
pub const BUTTON_CHAT: &str = "Chat";
pub const BUTTON_HELP: &str = "Help";

// ============ Copy ============

pub const WELCOME_TEXT: &str = "Welcome to the Club Kdrama bot! Choose an option:";
pub const ASK_QUERY_TEXT: &str =
    "Which series do you want to find? Please type its name or a keyword.";
pub const QUERY_TOO_SHORT_TEXT: &str = "Please type at least 4 characters to search.";
pub const SEARCHING_TEXT: &str = "Searching the catalog, please wait...";
pub const UNAVAILABLE_TEXT: &str =
    "The catalog could not be reached. Please try again later.";
pub const INVALID_NUMBER_TEXT: &str = "Invalid number. Please enter a number from the list.";
pub const NOT_A_NUMBER_TEXT: &str = "Please enter a valid number.";
pub const NO_ACTIVE_MODE_TEXT: &str =
    "Please use the 'Search Series' button to start a search.";
pub const CHANNEL_TEXT: &str = "This is the official Club Kdrama channel.";
pub const CHAT_TEXT: &str = "This is the Club Kdrama chat. How can we help you?";
pub const RATE_LIMITED_TEXT: &str = "Too many messages. Please wait a moment and try again.";
pub const HELP_TEXT: &str = "How to use this bot:\n\
    1. Press the 'Search Series' button.\n\
    2. Type the name of the series you are looking for.\n\
    3. Wait while the catalog is searched.\n\
    4. Send the number of a series from the result list to see its details.\n\
    5. You will get its cover, synopsis and one button per episode.\n\
    Press 'Airing Now' to list the series currently on air.\n\
    Enjoy Club Kdrama!";

const PICK_NUMBER_TEXT: &str = "Please enter the number of the series you want to see.";

/// Which flow produced a result list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingKind {
    Search,
    Airing,
}

impl ListingKind {
    fn header(&self) -> &'static str {
        match self {
            Self::Search => "Results found:",
            Self::Airing => "Series currently airing:",
        }
    }

    /// Reply when the list is empty
    pub fn empty_text(&self) -> &'static str {
        match self {
            Self::Search => "No results were found for your search.",
            Self::Airing => "There are no series airing right now.",
        }
    }
}

/// Numbered list (1-based, in the given order), or the flow's empty copy
pub fn render_result_list(titles: &[Title], kind: ListingKind) -> String {
    if titles.is_empty() {
        return kind.empty_text().to_string();
    }

    let mut text = String::from(kind.header());
    text.push('\n');
    for (idx, title) in titles.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", idx + 1, title.name));
    }
    text.push('\n');
    text.push_str(PICK_NUMBER_TEXT);
    text
}

/// Rendered detail of one title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailView {
    /// Name, followed by the synopsis when there is one
    pub text: String,
    pub media: String,
    pub episodes: Vec<Vec<LinkButton>>,
}

impl DetailView {
    /// Text capped to the caption limit
    pub fn caption(&self) -> String {
        truncate_utf16(&self.text, CAPTION_LIMIT)
    }

    /// Single media reply carrying the caption and episode buttons
    pub fn to_outbound(&self) -> Outbound {
        let keyboard = if self.episodes.is_empty() {
            None
        } else {
            Some(Keyboard::Inline(self.episodes.clone()))
        };

        Outbound::Media {
            media: self.media.clone(),
            caption: self.caption(),
            keyboard,
        }
    }
}

pub fn render_detail(title: &Title) -> DetailView {
    let text = if title.synopsis.trim().is_empty() {
        title.name.clone()
    } else {
        format!("{}\n\n{}", title.name, title.synopsis.trim())
    };

    DetailView {
        text,
        media: title.cover_media.clone(),
        episodes: episode_grid(&title.episode_links),
    }
}

/// One button per link, `EP01`.., rows of [`EPISODE_ROW_WIDTH`]
pub fn episode_grid(links: &[String]) -> Vec<Vec<LinkButton>> {
    let buttons: Vec<LinkButton> = links
        .iter()
        .enumerate()
        .map(|(idx, link)| LinkButton::new(episode_label(idx + 1), link.as_str()))
        .collect();

    buttons
        .chunks(EPISODE_ROW_WIDTH)
        .map(<[LinkButton]>::to_vec)
        .collect()
}

pub fn episode_label(number: usize) -> String {
    format!("EP{:02}", number)
}

/// Main menu shown on /start
pub fn main_menu() -> Keyboard {
    Keyboard::Reply(vec![
        vec![BUTTON_SEARCH.to_string(), BUTTON_AIRING.to_string()],
        vec![
            BUTTON_CHANNEL.to_string(),
            BUTTON_CHAT.to_string(),
            BUTTON_HELP.to_string(),
        ],
    ])
}

/// Informational reply with an optional link appended
pub fn info_text(base: &str, link: Option<&str>) -> String {
    match link {
        Some(url) if !url.trim().is_empty() => format!("{}\n{}", base, url.trim()),
        _ => base.to_string(),
    }
}

/// Truncate to at most `max` UTF-16 code units (Telegram's measure),
/// on char boundaries, ending with an ellipsis
fn truncate_utf16(s: &str, max: usize) -> String {
    if s.encode_utf16().count() <= max {
        return s.to_string();
    }

    let budget = max.saturating_sub('…'.len_utf16());
    let mut used = 0;
    let mut kept = String::new();
    for c in s.chars() {
        used += c.len_utf16();
        if used > budget {
            break;
        }
        kept.push(c);
    }
    kept.push('…');
    kept
}
