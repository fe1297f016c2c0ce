//! Mapping of movie records into chat replies.
//!
//! Each surfaced movie becomes one [`ReplyEntry`]: an HTML text block plus an
//! ordered list of buttons. What the buttons offer depends on [`FeatureMode`].

use chrono::NaiveDateTime;
use std::fmt::Write as _;
use std::str::FromStr;

use crate::models::{ExternalRatings, MovieRecord, TorrentVariant};

/// Which actions a reply may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureMode {
    /// Direct download buttons, one per torrent variant, plus the source link.
    Full,
    /// Only the source link; torrent data is never surfaced.
    #[default]
    Restricted,
}

impl FromStr for FeatureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(FeatureMode::Full),
            "restricted" => Ok(FeatureMode::Restricted),
            other => Err(format!("expected 'full' or 'restricted', got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    Url(String),
    Callback(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: ButtonAction,
}

impl Button {
    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Url(url.into()),
        }
    }

    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }
}

/// One movie rendered for the chat: text block and its buttons.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyEntry {
    pub text: String,
    pub buttons: Vec<Button>,
}

pub const SOURCE_LINK_LABEL: &str = "🔗 View on YTS";

/// Callback data prefix of "send me the magnet" buttons, followed by the
/// info hash.
pub const MAGNET_CALLBACK_PREFIX: &str = "dl:";

// Telegram limit on callback_data.
const MAX_CALLBACK_DATA_BYTES: usize = 64;

pub fn format_entry(record: &MovieRecord, mode: FeatureMode) -> ReplyEntry {
    format_entry_with_ratings(record, None, mode)
}

pub fn format_entry_with_ratings(
    record: &MovieRecord,
    ratings: Option<&ExternalRatings>,
    mode: FeatureMode,
) -> ReplyEntry {
    let mut text = String::new();
    let title = if record.title.is_empty() {
        "Unknown title"
    } else {
        record.title.as_str()
    };
    let _ = write!(text, "🎬 <b>{}</b>", escape_html(title));
    if record.year > 0 {
        let _ = write!(text, " ({})", record.year);
    }
    text.push('\n');
    let _ = writeln!(text, "⭐ IMDb: {:.1}/10", record.rating);

    if let Some(r) = ratings {
        if let Some(rt) = &r.rotten_tomatoes {
            let _ = writeln!(text, "🍅 Rotten Tomatoes: {}", escape_html(rt));
        }
        if let Some(ms) = &r.metascore {
            let _ = writeln!(text, "Ⓜ️ Metascore: {}", escape_html(ms));
        }
    }

    if !record.genres.is_empty() {
        let _ = writeln!(
            text,
            "🎭 Genres: {}",
            escape_html(&record.genres.join(", "))
        );
    }
    if let Some(runtime) = format_runtime(record.runtime_minutes) {
        let _ = writeln!(text, "⏱ Runtime: {runtime}");
    }
    if let Some(added) = record.date_uploaded.as_deref().map(format_upload_date) {
        let _ = writeln!(text, "📅 Added: {}", escape_html(&added));
    }
    if let Some(poster) = &record.poster {
        let _ = writeln!(text, "🖼 <a href=\"{}\">Poster</a>", escape_html(poster));
    }

    let mut buttons = Vec::new();
    if mode == FeatureMode::Full {
        text.push('\n');
        if record.torrents.is_empty() {
            text.push_str("❌ No torrents available yet\n");
        } else {
            text.push_str("📥 <b>Available torrents:</b>\n");
            for (i, t) in record.torrents.iter().enumerate() {
                let _ = writeln!(text, "{}. {}", i + 1, variant_line(t));
            }
        }
        buttons.extend(
            record
                .torrents
                .iter()
                .map(|t| variant_button(t, &record.page_url)),
        );
    }
    buttons.push(Button::url(SOURCE_LINK_LABEL, record.page_url.clone()));

    ReplyEntry {
        text: text.trim_end().to_string(),
        buttons,
    }
}

/// Inline buttons only open http(s) links, so variants without a direct
/// `.torrent` URL get a callback that makes the bot post the magnet URI.
fn variant_button(t: &TorrentVariant, page_url: &str) -> Button {
    let label = variant_label(t);
    if let Some(url) = t.web_download_url() {
        return Button::url(label, url);
    }
    match magnet_callback_data(&t.hash) {
        Some(data) => Button::callback(label, data),
        None => Button::url(label, page_url),
    }
}

pub fn magnet_callback_data(hash: &str) -> Option<String> {
    let hash = hash.trim();
    let data = format!("{MAGNET_CALLBACK_PREFIX}{hash}");
    (!hash.is_empty() && data.len() <= MAX_CALLBACK_DATA_BYTES).then_some(data)
}

fn variant_label(t: &TorrentVariant) -> String {
    format!("📥 {} · {}S/{}P", t.quality, t.seeds, t.peers)
}

fn variant_line(t: &TorrentVariant) -> String {
    let mut line = format!("<b>{}</b>", escape_html(&t.quality));
    if let Some(kind) = &t.release_type {
        let _ = write!(line, " {}", escape_html(kind));
    }
    if let Some(size) = &t.size {
        let _ = write!(line, " · {}", escape_html(size));
    }
    let seed_marker = if t.seeds > 0 { "🌱" } else { "❌" };
    let _ = write!(line, " · {} {} / 👥 {}", seed_marker, t.seeds, t.peers);
    line
}

fn format_runtime(minutes: u32) -> Option<String> {
    match (minutes / 60, minutes % 60) {
        (0, 0) => None,
        (0, m) => Some(format!("{m}m")),
        (h, 0) => Some(format!("{h}h")),
        (h, m) => Some(format!("{h}h {m}m")),
    }
}

fn format_upload_date(raw: &str) -> String {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|d| d.format("%B %d, %Y").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Escapes the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
