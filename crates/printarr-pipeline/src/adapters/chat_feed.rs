//! Chat-feed adapter (spec.md §4.3): ingests messages and their document
//! attachments from a bot-API-style chat channel (Telegram-shaped).
//!
//! Scanning is two-phase by design (spec.md §9 design note 3): `scan`
//! performs all network I/O and returns a plain in-memory batch; the
//! caller handles one item at a time against the database afterwards, so
//! a slow or failing upstream call never holds a SQLite write lock.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, warn};

use printarr_core::domain::BackfillMode;
use printarr_core::error::{PrintarrError, Result};

use super::{ByteStream, FetchedBytes, RawFileDescriptor, RawItem, RawPreviewDescriptor, ScanResult};

const API_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: i64 = 100;

/// How far back an initial backfill should reach, resolved from a
/// channel's `backfill_mode`/`backfill_value` columns.
#[derive(Debug, Clone, Copy)]
pub enum BackfillHorizon {
    AllHistory,
    LastNMessages(i64),
    LastNDays(i64),
}

impl BackfillHorizon {
    pub fn from_mode(mode: BackfillMode, value: Option<i64>) -> Self {
        match mode {
            BackfillMode::AllHistory => BackfillHorizon::AllHistory,
            BackfillMode::LastNMessages => BackfillHorizon::LastNMessages(value.unwrap_or(100)),
            BackfillMode::LastNDays => BackfillHorizon::LastNDays(value.unwrap_or(30)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    messages: Vec<ChatMessage>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    id: i64,
    #[serde(with = "chrono::serde::ts_seconds")]
    date: DateTime<Utc>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    document: Option<ChatDocument>,
    #[serde(default)]
    photos: Vec<ChatPhoto>,
}

#[derive(Debug, Deserialize)]
struct ChatDocument {
    file_name: String,
    file_size: i64,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatPhoto {
    file_id: String,
    #[serde(default)]
    width: Option<i32>,
    #[serde(default)]
    height: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct FileInfoResponse {
    file_path: String,
    file_size: i64,
}

pub struct ChatFeedAdapter {
    client: reqwest::Client,
    base_url: String,
    bot_token: String,
    channel_upstream_id: String,
    backfill: BackfillHorizon,
}

impl ChatFeedAdapter {
    pub fn new(base_url: &str, bot_token: &str, channel_upstream_id: &str, backfill: BackfillHorizon) -> Self {
        let client = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .user_agent("printarr")
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            channel_upstream_id: channel_upstream_id.to_string(),
            backfill,
        }
    }

    fn oldest_allowed(&self) -> Option<DateTime<Utc>> {
        match self.backfill {
            BackfillHorizon::AllHistory => None,
            BackfillHorizon::LastNMessages(_) => None,
            BackfillHorizon::LastNDays(days) => Some(Utc::now() - chrono::Duration::days(days)),
        }
    }

    /// `cursor` holds the highest upstream message id already ingested,
    /// encoded as a decimal string. `None` means this is the first scan.
    pub async fn scan(&self, cursor: Option<&str>) -> Result<ScanResult> {
        let after_id: i64 = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let oldest_allowed = self.oldest_allowed();
        let max_messages = match self.backfill {
            BackfillHorizon::LastNMessages(n) if after_id == 0 => Some(n),
            _ => None,
        };

        let mut items = Vec::new();
        let mut before: Option<i64> = None;
        let mut highest_seen = after_id;

        loop {
            let url = format!(
                "{}/bot{}/getChannelHistory",
                self.base_url, self.bot_token
            );
            let resp: HistoryResponse = self
                .client
                .get(&url)
                .query(&[
                    ("channel_id", self.channel_upstream_id.as_str()),
                    ("limit", &PAGE_SIZE.to_string()),
                    ("before", &before.map(|b| b.to_string()).unwrap_or_default()),
                ])
                .send()
                .await
                .map_err(|e| PrintarrError::Transient { message: format!("chat feed history request failed: {e}") })?
                .json()
                .await
                .map_err(|e| PrintarrError::Upstream { service: "chat_feed".into(), message: format!("malformed history response: {e}") })?;

            if resp.messages.is_empty() {
                break;
            }

            let mut stop = false;
            for msg in &resp.messages {
                if msg.id <= after_id {
                    stop = true;
                    break;
                }
                if let Some(cutoff) = oldest_allowed {
                    if msg.date < cutoff {
                        stop = true;
                        break;
                    }
                }
                items.push(to_raw_item(msg));
                highest_seen = highest_seen.max(msg.id);
                before = Some(msg.id);
                if let Some(limit) = max_messages {
                    if items.len() as i64 >= limit {
                        stop = true;
                        break;
                    }
                }
            }

            if stop || !resp.has_more {
                break;
            }
        }

        debug!(channel = %self.channel_upstream_id, count = items.len(), "chat feed scan collected items");

        Ok(ScanResult {
            items,
            next_cursor: Some(highest_seen.to_string()),
        })
    }

    pub async fn fetch_bytes(&self, _item: &RawItem, file: &RawFileDescriptor) -> Result<FetchedBytes> {
        let url = format!("{}/bot{}/getFile", self.base_url, self.bot_token);
        let info: FileInfoResponse = self
            .client
            .get(&url)
            .query(&[("file_id", file.filename.as_str())])
            .send()
            .await
            .map_err(|e| PrintarrError::Transient { message: format!("chat feed getFile failed: {e}") })?
            .json()
            .await
            .map_err(|e| PrintarrError::Upstream { service: "chat_feed".into(), message: format!("malformed getFile response: {e}") })?;

        let download_url = format!("{}/file/bot{}/{}", self.base_url, self.bot_token, info.file_path);
        let resp = self
            .client
            .get(&download_url)
            .send()
            .await
            .map_err(|e| PrintarrError::Transient { message: format!("chat feed download failed: {e}") })?;

        if !resp.status().is_success() {
            return Err(PrintarrError::Upstream {
                service: "chat_feed".into(),
                message: format!("download returned status {}", resp.status()),
            });
        }

        let stream: ByteStream = Box::pin(resp.bytes_stream().map(|r| r.map_err(std::io::Error::other)));
        Ok(FetchedBytes {
            stream,
            size: info.file_size,
            mtime: None,
        })
    }
}

fn to_raw_item(msg: &ChatMessage) -> RawItem {
    let mut files = Vec::new();
    if let Some(doc) = &msg.document {
        let is_candidate = printarr_core::domain::is_candidate_design_extension(
            std::path::Path::new(&doc.file_name)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or(""),
        );
        files.push(RawFileDescriptor {
            filename: doc.file_name.clone(),
            size: doc.file_size,
            mime: doc.mime_type.clone(),
            is_candidate_model: is_candidate,
        });
    }
    if msg.document.is_none() && msg.photos.is_empty() {
        warn!(message_id = msg.id, "chat message has no media, treating as caption-only");
    }

    let previews = msg
        .photos
        .iter()
        .map(|p| RawPreviewDescriptor {
            filename: p.file_id.clone(),
            width: p.width,
            height: p.height,
        })
        .collect();

    RawItem {
        upstream_id: msg.id.to_string(),
        timestamp: msg.date,
        author: msg.from.clone(),
        title_hint: None,
        designer_hint: msg.from.clone(),
        caption: msg.caption.clone(),
        files,
        previews,
        folder_path: None,
    }
}

/// Resolves a Unix timestamp into a `DateTime<Utc>`, used by integration
/// tests that construct `ChatMessage` fixtures without going through serde.
#[allow(dead_code)]
fn from_unix(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backfill_horizon_from_last_n_days() {
        let h = BackfillHorizon::from_mode(BackfillMode::LastNDays, Some(7));
        match h {
            BackfillHorizon::LastNDays(7) => {}
            _ => panic!("expected LastNDays(7)"),
        }
    }

    #[test]
    fn backfill_horizon_defaults_when_value_missing() {
        let h = BackfillHorizon::from_mode(BackfillMode::LastNMessages, None);
        match h {
            BackfillHorizon::LastNMessages(100) => {}
            _ => panic!("expected default of 100"),
        }
    }
}
