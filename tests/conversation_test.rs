//! Conversation Controller Integration Tests
//!
//! Drives the controller through full user flows against a scripted catalog.

use async_trait::async_trait;
use clubkdrama_bot::presentation::{
    ASK_QUERY_TEXT, HELP_TEXT, INVALID_NUMBER_TEXT, NOT_A_NUMBER_TEXT, NO_ACTIVE_MODE_TEXT,
    QUERY_TOO_SHORT_TEXT, SEARCHING_TEXT, UNAVAILABLE_TEXT, WELCOME_TEXT,
};
use clubkdrama_bot::{
    CatalogError, CatalogStore, Controller, InboundMessage, Keyboard, ListingKind, Mode, Outbound,
    Status, Title,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

const USER: i64 = 1001;

fn title(id: i64, name: &str) -> Title {
    Title {
        id,
        name: name.to_string(),
        cover_media: format!("https://img.example/{}.jpg", id),
        synopsis: format!("Synopsis of {}", name),
        episode_links: (1..=4).map(|n| format!("https://ep.example/{}/{}", id, n)).collect(),
        status: Status::Finished,
    }
}

/// Catalog returning fixed results and recording every call
#[derive(Default)]
struct ScriptedCatalog {
    search_results: Vec<Title>,
    airing: Vec<Title>,
    failing: AtomicBool,
    delay: Option<Duration>,
    gate: Option<Arc<Notify>>,
    searches: Mutex<Vec<(String, usize)>>,
    listings: AtomicUsize,
}

impl ScriptedCatalog {
    fn searching(results: Vec<Title>) -> Self {
        Self {
            search_results: results,
            ..Default::default()
        }
    }

    fn airing(titles: Vec<Title>) -> Self {
        Self {
            airing: titles,
            ..Default::default()
        }
    }

    fn search_calls(&self) -> Vec<(String, usize)> {
        self.searches.lock().unwrap().clone()
    }

    async fn wait(&self) -> Result<(), CatalogError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for ScriptedCatalog {
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<Title>, CatalogError> {
        self.searches
            .lock()
            .unwrap()
            .push((keyword.to_string(), limit));
        self.wait().await?;
        Ok(self.search_results.iter().take(limit).cloned().collect())
    }

    async fn list_by_status(&self, status: Status) -> Result<Vec<Title>, CatalogError> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        self.wait().await?;
        assert_eq!(status, Status::Airing);
        Ok(self.airing.clone())
    }
}

fn setup(catalog: ScriptedCatalog) -> (Arc<Controller>, Arc<ScriptedCatalog>) {
    setup_with_timeout(catalog, Duration::from_millis(200))
}

fn setup_with_timeout(
    catalog: ScriptedCatalog,
    timeout: Duration,
) -> (Arc<Controller>, Arc<ScriptedCatalog>) {
    let catalog = Arc::new(catalog);
    let controller = Controller::new(catalog.clone() as Arc<dyn CatalogStore>)
        .with_query_timeout(timeout);
    (Arc::new(controller), catalog)
}

async fn send(controller: &Controller, text: &str) -> Vec<Outbound> {
    controller.handle(&InboundMessage::parse(USER, text)).await
}

fn bodies(replies: &[Outbound]) -> Vec<&str> {
    replies.iter().map(Outbound::body).collect()
}

// ============ Search Flow ============

#[tokio::test]
async fn test_search_validate_list_and_select() {
    let (controller, catalog) = setup(ScriptedCatalog::searching(vec![title(1, "Descendants of the Sun")]));

    let replies = send(&controller, "Search Series").await;
    assert_eq!(bodies(&replies), vec![ASK_QUERY_TEXT]);
    assert_eq!(controller.mode(USER).await, Mode::AwaitingQuery);

    let replies = send(&controller, "ab").await;
    assert_eq!(bodies(&replies), vec![QUERY_TOO_SHORT_TEXT]);
    assert_eq!(controller.mode(USER).await, Mode::AwaitingQuery);
    assert!(catalog.search_calls().is_empty());

    let replies = send(&controller, "abcd").await;
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].body(), SEARCHING_TEXT);
    assert!(replies[1].body().contains("1. Descendants of the Sun"));
    assert_eq!(controller.mode(USER).await, Mode::Selecting);
    assert_eq!(catalog.search_calls(), vec![("abcd".to_string(), 9)]);

    let replies = send(&controller, "1").await;
    assert_eq!(replies.len(), 1);
    match &replies[0] {
        Outbound::Media {
            media,
            caption,
            keyboard,
        } => {
            assert_eq!(media, "https://img.example/1.jpg");
            assert!(caption.starts_with("Descendants of the Sun"));
            match keyboard {
                Some(Keyboard::Inline(rows)) => {
                    let labels: Vec<Vec<&str>> = rows
                        .iter()
                        .map(|row| row.iter().map(|b| b.label.as_str()).collect())
                        .collect();
                    assert_eq!(labels, vec![vec!["EP01", "EP02", "EP03"], vec!["EP04"]]);
                    assert_eq!(rows[0][0].url, "https://ep.example/1/1");
                }
                other => panic!("expected episode buttons, got {:?}", other),
            }
        }
        other => panic!("expected media reply, got {:?}", other),
    }
    assert_eq!(controller.mode(USER).await, Mode::Idle);
    assert!(controller.sessions().snapshot(USER).await.unwrap().last_results().is_empty());
}

#[tokio::test]
async fn test_short_keywords_never_search() {
    let (controller, catalog) = setup(ScriptedCatalog::searching(vec![title(1, "Signal")]));
    send(&controller, "/search").await;

    for keyword in ["a", "ab", "abc", "ñññ", "  ab  ", "한국드"] {
        let replies = send(&controller, keyword).await;
        assert_eq!(bodies(&replies), vec![QUERY_TOO_SHORT_TEXT], "keyword {:?}", keyword);
        assert_eq!(controller.mode(USER).await, Mode::AwaitingQuery);
    }
    assert!(catalog.search_calls().is_empty());

    // Four multibyte characters are enough
    let replies = send(&controller, "한국드라").await;
    assert_eq!(replies.len(), 2);
}

#[tokio::test]
async fn test_result_list_numbers_follow_store_order() {
    for len in 1..=9 {
        let results: Vec<Title> = (0..len)
            .map(|i| title(100 + i, &format!("Title {}", 9 - i)))
            .collect();
        let (controller, _) = setup(ScriptedCatalog::searching(results.clone()));

        send(&controller, "/search").await;
        let replies = send(&controller, "title").await;
        let list = replies[1].body();

        let mut last_pos = 0;
        for (idx, t) in results.iter().enumerate() {
            let line = format!("{}. {}", idx + 1, t.name);
            let pos = list.find(&line).unwrap_or_else(|| panic!("missing {:?} in {:?}", line, list));
            assert!(pos >= last_pos);
            last_pos = pos;
        }
        assert!(!list.contains(&format!("{}. ", len + 1)));
    }
}

#[tokio::test]
async fn test_no_results_returns_to_idle() {
    let (controller, _) = setup(ScriptedCatalog::searching(Vec::new()));

    send(&controller, "/search").await;
    let replies = send(&controller, "nothing here").await;
    assert_eq!(bodies(&replies), vec![SEARCHING_TEXT, ListingKind::Search.empty_text()]);
    assert_eq!(controller.mode(USER).await, Mode::Idle);

    // A retry needs the search trigger again
    let replies = send(&controller, "nothing again").await;
    assert_eq!(bodies(&replies), vec![NO_ACTIVE_MODE_TEXT]);
}

#[tokio::test]
async fn test_store_failure_reports_and_resets() {
    let (controller, catalog) = setup(ScriptedCatalog::searching(vec![title(1, "Signal")]));
    catalog.failing.store(true, Ordering::SeqCst);

    send(&controller, "/search").await;
    let replies = send(&controller, "signal").await;
    assert_eq!(bodies(&replies), vec![SEARCHING_TEXT, UNAVAILABLE_TEXT]);
    assert_eq!(controller.mode(USER).await, Mode::Idle);

    // User-initiated retry succeeds once the store is back
    catalog.failing.store(false, Ordering::SeqCst);
    send(&controller, "/search").await;
    let replies = send(&controller, "signal").await;
    assert!(replies[1].body().contains("1. Signal"));
    assert_eq!(catalog.search_calls().len(), 2);
}

#[tokio::test]
async fn test_stalled_store_times_out() {
    let (controller, _) = setup(ScriptedCatalog {
        search_results: vec![title(1, "Signal")],
        delay: Some(Duration::from_secs(30)),
        ..Default::default()
    });

    send(&controller, "/search").await;
    let started = std::time::Instant::now();
    let replies = send(&controller, "signal").await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(bodies(&replies), vec![SEARCHING_TEXT, UNAVAILABLE_TEXT]);
    assert_eq!(controller.mode(USER).await, Mode::Idle);
}

// ============ Selection ============

#[tokio::test]
async fn test_selection_bounds() {
    let (controller, _) = setup(ScriptedCatalog::searching(vec![
        title(1, "Signal"),
        title(2, "Stranger"),
    ]));
    send(&controller, "/search").await;
    send(&controller, "drama").await;

    for pick in ["0", "3", "99999999999999999999999"] {
        let replies = send(&controller, pick).await;
        assert_eq!(bodies(&replies), vec![INVALID_NUMBER_TEXT], "pick {:?}", pick);
        assert_eq!(controller.mode(USER).await, Mode::Selecting);
    }

    let replies = send(&controller, "2").await;
    assert!(replies[0].body().starts_with("Stranger"));
    assert_eq!(controller.mode(USER).await, Mode::Idle);
}

#[tokio::test]
async fn test_text_while_selecting_is_not_a_new_search() {
    let (controller, catalog) = setup(ScriptedCatalog::searching(vec![title(1, "Signal")]));
    send(&controller, "/search").await;
    send(&controller, "signal").await;

    let replies = send(&controller, "Vincenzo").await;
    assert_eq!(bodies(&replies), vec![NOT_A_NUMBER_TEXT]);
    assert_eq!(controller.mode(USER).await, Mode::Selecting);
    assert_eq!(catalog.search_calls().len(), 1);

    // The list is still there
    let replies = send(&controller, "1").await;
    assert!(replies[0].body().starts_with("Signal"));
}

#[tokio::test]
async fn test_digits_when_idle_prompt_for_search() {
    let (controller, _) = setup(ScriptedCatalog::default());

    let replies = send(&controller, "1").await;
    assert_eq!(bodies(&replies), vec![NO_ACTIVE_MODE_TEXT]);
    assert_eq!(controller.mode(USER).await, Mode::Idle);
}

// ============ Airing List ============

#[tokio::test]
async fn test_airing_empty_stays_idle() {
    let (controller, _) = setup(ScriptedCatalog::airing(Vec::new()));

    let replies = send(&controller, "Airing Now").await;
    assert_eq!(bodies(&replies), vec!["There are no series airing right now."]);
    assert_eq!(controller.mode(USER).await, Mode::Idle);
}

#[tokio::test]
async fn test_airing_list_then_select() {
    let (controller, catalog) = setup(ScriptedCatalog::airing(vec![
        title(7, "Lovely Runner"),
        title(8, "Queen of Tears"),
    ]));

    let replies = send(&controller, "/airing").await;
    assert!(replies[0].body().starts_with("Series currently airing:"));
    assert!(replies[0].body().contains("2. Queen of Tears"));
    assert_eq!(controller.mode(USER).await, Mode::Selecting);
    assert_eq!(catalog.listings.load(Ordering::SeqCst), 1);

    let replies = send(&controller, "2").await;
    assert!(replies[0].body().starts_with("Queen of Tears"));
    assert_eq!(controller.mode(USER).await, Mode::Idle);
}

#[tokio::test]
async fn test_airing_replaces_search_results() {
    let (controller, _) = setup(ScriptedCatalog {
        search_results: vec![title(1, "Signal"), title(2, "Stranger")],
        airing: vec![title(7, "Lovely Runner")],
        ..Default::default()
    });

    send(&controller, "/search").await;
    send(&controller, "drama").await;
    send(&controller, "/airing").await;

    let replies = send(&controller, "2").await;
    assert_eq!(bodies(&replies), vec![INVALID_NUMBER_TEXT]);
    let replies = send(&controller, "1").await;
    assert!(replies[0].body().starts_with("Lovely Runner"));
}

#[tokio::test]
async fn test_airing_failure_resets() {
    let (controller, catalog) = setup(ScriptedCatalog::airing(vec![title(7, "Lovely Runner")]));
    send(&controller, "/search").await;
    catalog.failing.store(true, Ordering::SeqCst);

    let replies = send(&controller, "/airing").await;
    assert_eq!(bodies(&replies), vec![UNAVAILABLE_TEXT]);
    assert_eq!(controller.mode(USER).await, Mode::Idle);
}

// ============ Informational Commands ============

#[tokio::test]
async fn test_help_resets_mode_and_results() {
    let (controller, _) = setup(ScriptedCatalog::searching(vec![title(1, "Signal")]));
    send(&controller, "/search").await;
    send(&controller, "signal").await;

    let replies = send(&controller, "Help").await;
    assert_eq!(bodies(&replies), vec![HELP_TEXT]);
    assert_eq!(controller.mode(USER).await, Mode::Idle);

    let replies = send(&controller, "1").await;
    assert_eq!(bodies(&replies), vec![NO_ACTIVE_MODE_TEXT]);
}

#[tokio::test]
async fn test_channel_and_chat_reset_awaiting_query() {
    let (controller, catalog) = setup(ScriptedCatalog::searching(vec![title(1, "Signal")]));

    for trigger in ["/channel", "Chat"] {
        send(&controller, "/search").await;
        let replies = send(&controller, trigger).await;
        assert_eq!(replies.len(), 1);
        assert_eq!(controller.mode(USER).await, Mode::Idle);
    }
    assert!(catalog.search_calls().is_empty());
}

#[tokio::test]
async fn test_start_shows_menu() {
    let (controller, _) = setup(ScriptedCatalog::default());

    let replies = send(&controller, "/start").await;
    assert_eq!(bodies(&replies), vec![WELCOME_TEXT]);
    assert!(matches!(replies[0].keyboard(), Some(Keyboard::Reply(_))));
}

#[tokio::test]
async fn test_unknown_command_is_ignored() {
    let (controller, _) = setup(ScriptedCatalog::searching(vec![title(1, "Signal")]));
    send(&controller, "/search").await;

    let replies = send(&controller, "/unknown").await;
    assert!(replies.is_empty());
    assert_eq!(controller.mode(USER).await, Mode::AwaitingQuery);
}

// ============ Concurrency ============

#[tokio::test]
async fn test_same_user_messages_are_serialized() {
    let gate = Arc::new(Notify::new());
    let (controller, _) = setup_with_timeout(
        ScriptedCatalog {
            search_results: vec![title(1, "Old Pick")],
            airing: vec![title(7, "Fresh Pick")],
            gate: Some(gate.clone()),
            ..Default::default()
        },
        Duration::from_secs(5),
    );

    // Put the user in selecting mode with a stale list; the stored permit
    // lets this first search through immediately.
    gate.notify_one();
    send(&controller, "/search").await;
    send(&controller, "pick").await;
    assert_eq!(controller.mode(USER).await, Mode::Selecting);

    // Browse is held inside the store while "1" arrives
    let browse = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { send(&controller, "/airing").await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    let select = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { send(&controller, "1").await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!browse.is_finished());
    assert!(!select.is_finished());

    gate.notify_one();
    let browse_replies = browse.await.unwrap();
    let select_replies = select.await.unwrap();

    // The pick resolves against the list the browse produced, never the stale one
    assert!(browse_replies[0].body().contains("1. Fresh Pick"));
    assert!(select_replies[0].body().starts_with("Fresh Pick"));
    assert_eq!(controller.mode(USER).await, Mode::Idle);
}

#[tokio::test]
async fn test_other_users_are_not_blocked() {
    let gate = Arc::new(Notify::new());
    let (controller, _) = setup_with_timeout(
        ScriptedCatalog {
            airing: vec![title(7, "Lovely Runner")],
            gate: Some(gate.clone()),
            ..Default::default()
        },
        Duration::from_secs(5),
    );

    let stuck = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.handle(&InboundMessage::parse(1, "/airing")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // A different user proceeds while user 1 waits on the store
    let replies = controller.handle(&InboundMessage::parse(2, "/help")).await;
    assert_eq!(bodies(&replies), vec![HELP_TEXT]);
    assert!(!stuck.is_finished());

    gate.notify_one();
    let replies = stuck.await.unwrap();
    assert!(replies[0].body().contains("1. Lovely Runner"));
    assert_eq!(controller.mode(1).await, Mode::Selecting);
    assert_eq!(controller.mode(2).await, Mode::Idle);
}
