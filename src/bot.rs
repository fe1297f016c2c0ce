use chrono::{Datelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::format::{escape_html, Button, FeatureMode, ReplyEntry, MAGNET_CALLBACK_PREFIX};
use crate::models::magnet_from_hash;
use crate::pipeline::Pipeline;
use crate::telegram::{CallbackQuery, ChatApi, Message, RateLimited, Update};

const DEFAULT_SEND_INTERVAL: Duration = Duration::from_millis(100);
const MAX_RETRY_AFTER_SECS: u64 = 30;

pub const MENU_SEARCH: &str = "menu:search";
pub const MENU_NEW: &str = "menu:new";
pub const MENU_HELP: &str = "menu:help";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    /// `/search <title>` or bare text; the title may be blank.
    Search(String),
    Featured,
    Unknown(String),
}

/// Parses a chat message. Anything not starting with `/` is a search.
pub fn parse_command(text: &str) -> Command {
    let text = text.trim();
    let Some(rest) = text.strip_prefix('/') else {
        return Command::Search(text.to_string());
    };
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };
    // Group chats address commands as /search@SomeBot.
    let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
    match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "search" => Command::Search(args.to_string()),
        "new" | "featured" => Command::Featured,
        _ => Command::Unknown(name),
    }
}

pub fn main_menu() -> Vec<Button> {
    vec![
        Button::callback("🔍 Search Movies", MENU_SEARCH),
        Button::callback("🆕 What's New?", MENU_NEW),
        Button::callback("❓ Help", MENU_HELP),
    ]
}

fn welcome_text(mode: FeatureMode, min_rating: f32) -> String {
    let mut text = format!(
        "🎬 <b>Movie Search Bot</b>\n\n\
         Send me a movie title and I'll look it up on YTS.\n\
         Only movies rated {min_rating:.1} or higher on IMDb are shown.\n\n\
         <b>Commands:</b>\n\
         /search &lt;title&gt; - search for a movie\n\
         /new - featured movies of this year\n\
         /help - usage help\n\n\
         <b>Example:</b> /search Inception"
    );
    if mode == FeatureMode::Restricted {
        text.push_str("\n\n<i>This bot shows movie information and YTS links only.</i>");
    }
    text
}

fn help_text(mode: FeatureMode, min_rating: f32) -> String {
    let what = match mode {
        FeatureMode::Full => {
            "• Title, year, IMDb rating and genres\n\
             • Available qualities with seed/peer counts\n\
             • One download button per quality\n\
             • A link to the YTS page"
        }
        FeatureMode::Restricted => {
            "• Title, year, IMDb rating and genres\n\
             • A link to the YTS page"
        }
    };
    format!(
        "🔍 <b>How to use this bot</b>\n\n\
         1. Type a movie title, e.g. <code>The Dark Knight</code>\n\
         2. Or use /search &lt;title&gt;, e.g. <code>/search Inception</code>\n\
         3. Use /new to see this year's featured releases\n\n\
         <b>What you'll get:</b>\n{what}\n\n\
         Only movies rated ≥ {min_rating:.1} are listed."
    )
}

const SEARCH_PROMPT: &str = "🔍 <b>Search Movies</b>\n\nSend me a movie title to search for.\n\nExamples:\n• 28 Years Later\n• Deadpool 3\n• The Batman";

fn magnet_reply(hash: &str) -> ReplyEntry {
    let hash = hash.trim();
    let text = if hash.is_empty() {
        "❌ No magnet link is available for this release.".to_string()
    } else {
        format!(
            "🧲 <b>Magnet link</b>\n<code>{}</code>",
            escape_html(&magnet_from_hash(hash, None))
        )
    };
    ReplyEntry {
        text,
        buttons: Vec::new(),
    }
}

/// Routes chat updates to the pipeline and sends the replies back.
pub struct Bot {
    pipeline: Pipeline,
    chat: Arc<dyn ChatApi>,
    send_interval: Duration,
}

impl Bot {
    pub fn new(pipeline: Pipeline, chat: Arc<dyn ChatApi>) -> Self {
        Self {
            pipeline,
            chat,
            send_interval: DEFAULT_SEND_INTERVAL,
        }
    }

    /// Pause between consecutive messages of one reply batch.
    pub fn with_send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval;
        self
    }

    pub async fn handle_update(&self, update: Update) {
        if let Some(callback) = update.callback_query {
            self.handle_callback(callback).await;
        } else if let Some(message) = update.message {
            self.handle_message(message).await;
        } else {
            debug!(update_id = update.update_id, "Ignoring unsupported update");
        }
    }

    async fn handle_message(&self, message: Message) {
        let Some(text) = message.text.as_deref() else {
            return;
        };
        let chat_id = message.chat.id;
        info!(chat_id, "Received message '{}'", text);
        let replies = self.replies_for_command(parse_command(text)).await;
        self.deliver(chat_id, replies).await;
    }

    async fn handle_callback(&self, callback: CallbackQuery) {
        if let Err(e) = self.chat.answer_callback(&callback.id).await {
            warn!("Failed to answer callback {}: {:#}", callback.id, e);
        }
        let chat_id = callback
            .message
            .as_ref()
            .map(|m| m.chat.id)
            .unwrap_or(callback.from.id);
        let replies = match callback.data.as_deref() {
            Some(MENU_SEARCH) => vec![ReplyEntry {
                text: SEARCH_PROMPT.to_string(),
                buttons: Vec::new(),
            }],
            Some(MENU_NEW) => self.replies_for_command(Command::Featured).await,
            Some(MENU_HELP) => self.replies_for_command(Command::Help).await,
            Some(data) if data.starts_with(MAGNET_CALLBACK_PREFIX) => {
                vec![magnet_reply(&data[MAGNET_CALLBACK_PREFIX.len()..])]
            }
            other => {
                debug!("Ignoring callback data {:?}", other);
                return;
            }
        };
        self.deliver(chat_id, replies).await;
    }

    /// Replies for one command, in sending order.
    pub async fn replies_for_command(&self, command: Command) -> Vec<ReplyEntry> {
        let settings = self.pipeline.settings();
        match command {
            Command::Start => vec![ReplyEntry {
                text: welcome_text(settings.mode, settings.min_rating),
                buttons: main_menu(),
            }],
            Command::Help => vec![ReplyEntry {
                text: help_text(settings.mode, settings.min_rating),
                buttons: main_menu(),
            }],
            Command::Unknown(name) => vec![ReplyEntry {
                text: format!(
                    "🤔 Unknown command /{}. Send /help to see what I can do.",
                    escape_html(&name)
                ),
                buttons: Vec::new(),
            }],
            Command::Search(title) => self.pipeline.run(&title).await.into_messages(settings),
            Command::Featured => {
                let year = Utc::now().year();
                self.pipeline.featured(year).await.into_messages(settings)
            }
        }
    }

    async fn deliver(&self, chat_id: i64, replies: Vec<ReplyEntry>) {
        for (i, reply) in replies.iter().enumerate() {
            if i > 0 && !self.send_interval.is_zero() {
                tokio::time::sleep(self.send_interval).await;
            }
            self.send_with_retry(chat_id, reply).await;
        }
    }

    /// Sends one message, waiting out a single flood-control rejection.
    async fn send_with_retry(&self, chat_id: i64, reply: &ReplyEntry) {
        let err = match self.chat.send_message(chat_id, reply).await {
            Ok(()) => return,
            Err(e) => e,
        };
        let Some(limited) = err.downcast_ref::<RateLimited>() else {
            error!(chat_id, "Failed to send reply: {:#}", err);
            return;
        };
        let wait = limited.retry_after.min(MAX_RETRY_AFTER_SECS);
        warn!(chat_id, "Rate limited by Telegram, retrying in {}s", wait);
        tokio::time::sleep(Duration::from_secs(wait)).await;
        if let Err(e) = self.chat.send_message(chat_id, reply).await {
            error!(chat_id, "Failed to send reply after retry: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchSettings;
    use crate::error::SearchError;
    use crate::models::MovieRecord;
    use crate::telegram::{Chat, User};
    use crate::yts::MovieIndex;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct EmptyIndex;

    #[async_trait]
    impl MovieIndex for EmptyIndex {
        async fn search(&self, _title: &str) -> Result<Vec<MovieRecord>, SearchError> {
            Ok(Vec::new())
        }

        async fn featured(&self, _year: i32, _min: f32) -> Result<Vec<MovieRecord>, SearchError> {
            Ok(Vec::new())
        }
    }

    /// Rejects the first `limited` sends with a flood-control error.
    #[derive(Default)]
    struct FloodedChat {
        limited: Mutex<usize>,
        attempts: Mutex<usize>,
        sent: Mutex<Vec<ReplyEntry>>,
        answered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatApi for FloodedChat {
        async fn send_message(&self, _chat_id: i64, message: &ReplyEntry) -> anyhow::Result<()> {
            *self.attempts.lock().unwrap() += 1;
            let mut limited = self.limited.lock().unwrap();
            if *limited > 0 {
                *limited -= 1;
                return Err(RateLimited {
                    method: "sendMessage".to_string(),
                    retry_after: 0,
                }
                .into());
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }

        async fn answer_callback(&self, callback_id: &str) -> anyhow::Result<()> {
            self.answered.lock().unwrap().push(callback_id.to_string());
            Ok(())
        }

        async fn get_updates(&self, _offset: i64, _timeout: u64) -> anyhow::Result<Vec<Update>> {
            Ok(Vec::new())
        }
    }

    fn bot_with(chat: Arc<FloodedChat>) -> Bot {
        Bot::new(
            Pipeline::new(Arc::new(EmptyIndex), SearchSettings::default()),
            chat,
        )
        .with_send_interval(Duration::ZERO)
    }

    fn callback_update(data: &str) -> Update {
        Update {
            update_id: 1,
            message: None,
            callback_query: Some(CallbackQuery {
                id: "cb".to_string(),
                from: User {
                    id: 7,
                    username: None,
                },
                message: Some(Message {
                    message_id: 1,
                    chat: Chat { id: 7 },
                    from: None,
                    text: None,
                }),
                data: Some(data.to_string()),
            }),
        }
    }

    #[tokio::test]
    async fn flood_limited_send_is_retried_once() {
        let chat = Arc::new(FloodedChat::default());
        *chat.limited.lock().unwrap() = 1;
        let bot = bot_with(chat.clone());

        let replies = vec![
            ReplyEntry {
                text: "one".to_string(),
                buttons: vec![],
            },
            ReplyEntry {
                text: "two".to_string(),
                buttons: vec![],
            },
        ];
        bot.deliver(7, replies).await;

        let sent: Vec<String> = chat.sent.lock().unwrap().iter().map(|r| r.text.clone()).collect();
        assert_eq!(sent, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(*chat.attempts.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn magnet_button_posts_magnet_uri() {
        let chat = Arc::new(FloodedChat::default());
        let bot = bot_with(chat.clone());

        bot.handle_update(callback_update("dl:ABCDEF")).await;

        assert_eq!(*chat.answered.lock().unwrap(), vec!["cb".to_string()]);
        let sent = chat.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0]
            .text
            .contains("<code>magnet:?xt=urn:btih:ABCDEF&amp;tr="));
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("/start"), Command::Start);
        assert_eq!(parse_command("/help"), Command::Help);
        assert_eq!(parse_command("/HELP@ReelScoutBot"), Command::Help);
        assert_eq!(
            parse_command("/search   The Dark Knight "),
            Command::Search("The Dark Knight".to_string())
        );
        assert_eq!(
            parse_command("/search@ReelScoutBot Heat"),
            Command::Search("Heat".to_string())
        );
        assert_eq!(parse_command("/search"), Command::Search(String::new()));
        assert_eq!(parse_command("/new"), Command::Featured);
        assert_eq!(
            parse_command("/torrent_1"),
            Command::Unknown("torrent_1".to_string())
        );
    }

    #[test]
    fn bare_text_is_an_implicit_search() {
        assert_eq!(
            parse_command("  Inception \n"),
            Command::Search("Inception".to_string())
        );
    }

    #[test]
    fn help_mentions_downloads_only_in_full_mode() {
        assert!(help_text(FeatureMode::Full, 6.0).contains("download button"));
        assert!(!help_text(FeatureMode::Restricted, 6.0).contains("download"));
        assert!(welcome_text(FeatureMode::Restricted, 6.0).contains("links only"));
    }
}
