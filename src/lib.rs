//! Club Kdrama Bot
//!
//! Telegram front end for a series catalog: keyword search, the "airing now"
//! list, and a detail view with cover, synopsis and one button per episode.
//!
//! # Architecture
//!
//! ```text
//! Telegram ──► telegram (adapter) ──► Controller ──► CatalogStore
//!                    ▲                   │   │         (SQLite + listing cache)
//!                    │                   │   └──► SessionStore (per-user mode)
//!                    └──── Outbound ◄────┴──► presentation (lists, detail, menu)
//! ```
//!
//! The controller classifies every message exactly once, from the user's
//! current mode and the message content, and holds that user's session lock
//! until the replies are built.

pub mod catalog;
pub mod config;
pub mod controller;
pub mod message;
pub mod presentation;
pub mod session;
pub mod telegram;

pub use catalog::{CachedCatalog, CatalogError, CatalogStore, NewTitle, SqliteCatalog, Status, Title};
pub use config::{Config, LogFormat};
pub use controller::{classify, Controller, InfoLinks, Intent};
pub use message::{InboundMessage, Keyboard, LinkButton, Outbound};
pub use presentation::{render_detail, render_result_list, DetailView, ListingKind};
pub use session::{Mode, Session, SessionStore};
