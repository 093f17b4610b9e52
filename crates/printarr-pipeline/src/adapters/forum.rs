//! Forum adapter (spec.md §4.3): scrapes a session-cookie-authenticated
//! forum thread for posts with attachments. The session cookie is cached
//! in memory for the adapter's lifetime and a fresh login is attempted
//! automatically whenever a request comes back unauthorized.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use printarr_core::domain::is_candidate_design_extension;
use printarr_core::error::{PrintarrError, Result};

use super::{ByteStream, FetchedBytes, RawFileDescriptor, RawItem, RawPreviewDescriptor, ScanResult};

const API_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ThreadPage {
    posts: Vec<ForumPost>,
    #[serde(default)]
    next_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ForumPost {
    id: i64,
    #[serde(with = "chrono::serde::ts_seconds")]
    posted_at: DateTime<Utc>,
    author: String,
    #[serde(default)]
    body_text: Option<String>,
    #[serde(default)]
    attachments: Vec<ForumAttachment>,
}

#[derive(Debug, Deserialize)]
struct ForumAttachment {
    id: String,
    filename: String,
    size: i64,
}

struct Session {
    cookie: String,
}

pub struct ForumAdapter {
    client: reqwest::Client,
    base_url: String,
    thread_id: String,
    username: String,
    password: String,
    session: Arc<Mutex<Option<Session>>>,
}

impl ForumAdapter {
    pub fn new(base_url: &str, thread_id: &str, username: &str, password: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .user_agent("printarr")
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            thread_id: thread_id.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            session: Arc::new(Mutex::new(None)),
        }
    }

    async fn login(&self) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}/login", self.base_url))
            .form(&[("username", self.username.as_str()), ("password", self.password.as_str())])
            .send()
            .await
            .map_err(|e| PrintarrError::AuthFailed { service: "forum".into(), message: e.to_string() })?;

        if !resp.status().is_success() {
            return Err(PrintarrError::AuthFailed {
                service: "forum".into(),
                message: format!("login returned status {}", resp.status()),
            });
        }

        let cookie = resp
            .headers()
            .get("set-cookie")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(';').next().unwrap_or(s).to_string())
            .ok_or_else(|| PrintarrError::AuthFailed { service: "forum".into(), message: "no session cookie in login response".into() })?;

        Ok(cookie)
    }

    async fn session_cookie(&self) -> Result<String> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            let cookie = self.login().await?;
            *guard = Some(Session { cookie });
        }
        Ok(guard.as_ref().expect("just set").cookie.clone())
    }

    async fn invalidate_session(&self) {
        let mut guard = self.session.lock().await;
        *guard = None;
    }

    async fn get_with_reauth(&self, url: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        for attempt in 0..2 {
            let cookie = self.session_cookie().await?;
            let resp = self
                .client
                .get(url)
                .header(reqwest::header::COOKIE, &cookie)
                .query(query)
                .send()
                .await
                .map_err(|e| PrintarrError::Transient { message: format!("forum request failed: {e}") })?;

            if resp.status() == reqwest::StatusCode::UNAUTHORIZED && attempt == 0 {
                warn!("forum session expired, re-authenticating");
                self.invalidate_session().await;
                continue;
            }
            return Ok(resp);
        }
        unreachable!("loop always returns on second iteration")
    }

    /// `cursor` holds the last forum page number already consumed.
    pub async fn scan(&self, cursor: Option<&str>) -> Result<ScanResult> {
        let mut page: u32 = cursor.and_then(|c| c.parse().ok()).unwrap_or(1);
        let mut items = Vec::new();
        let mut last_page = page;

        loop {
            let url = format!("{}/threads/{}/posts", self.base_url, self.thread_id);
            let resp = self.get_with_reauth(&url, &[("page", &page.to_string())]).await?;
            if !resp.status().is_success() {
                return Err(PrintarrError::Upstream {
                    service: "forum".into(),
                    message: format!("thread fetch returned status {}", resp.status()),
                });
            }
            let body: ThreadPage = resp
                .json()
                .await
                .map_err(|e| PrintarrError::Upstream { service: "forum".into(), message: format!("malformed thread page: {e}") })?;

            for post in &body.posts {
                if post.attachments.is_empty() {
                    continue;
                }
                items.push(to_raw_item(post));
            }
            last_page = page;

            match body.next_page {
                Some(next) => page = next,
                None => break,
            }
        }

        debug!(thread = %self.thread_id, count = items.len(), "forum scan collected items");
        Ok(ScanResult { items, next_cursor: Some(last_page.to_string()) })
    }

    pub async fn fetch_bytes(&self, _item: &RawItem, file: &RawFileDescriptor) -> Result<FetchedBytes> {
        let url = format!("{}/attachments/{}", self.base_url, file.filename);
        let resp = self.get_with_reauth(&url, &[]).await?;
        if !resp.status().is_success() {
            return Err(PrintarrError::Upstream {
                service: "forum".into(),
                message: format!("attachment download returned status {}", resp.status()),
            });
        }
        let size = resp.content_length().unwrap_or(file.size as u64) as i64;
        let stream: ByteStream = Box::pin(resp.bytes_stream().map(|r| r.map_err(std::io::Error::other)));
        Ok(FetchedBytes { stream, size, mtime: None })
    }
}

fn to_raw_item(post: &ForumPost) -> RawItem {
    let files = post
        .attachments
        .iter()
        .map(|a| {
            let ext = std::path::Path::new(&a.filename)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("");
            RawFileDescriptor {
                filename: a.id.clone(),
                size: a.size,
                mime: None,
                is_candidate_model: is_candidate_design_extension(ext),
            }
        })
        .collect();

    RawItem {
        upstream_id: post.id.to_string(),
        timestamp: post.posted_at,
        author: Some(post.author.clone()),
        title_hint: None,
        designer_hint: Some(post.author.clone()),
        caption: post.body_text.clone(),
        files,
        previews: Vec::<RawPreviewDescriptor>::new(),
        folder_path: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_session_is_none_until_first_use() {
        let adapter = ForumAdapter::new("https://forum.example.com", "42", "bot", "secret");
        assert!(adapter.session.lock().await.is_none());
    }
}
