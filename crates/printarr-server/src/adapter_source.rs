//! Resolves the single globally-configured upstream integration kind from
//! `PRINTARR_*` env vars at startup, mirroring `PrintarrConfig::resolve`'s
//! own env-var convention.
//!
//! A `Channel` row carries no credential fields (spec.md §3) — only an
//! `upstream_id` naming its place within whichever upstream is configured
//! (a chat channel id, a forum thread id, a drive folder id). The actual
//! base URL and credentials are process-wide, read once here, and paired
//! with each channel's `upstream_id` to build that channel's [`Adapter`].
//! Adding or changing a channel under an already-running server therefore
//! takes effect on the next restart, the same `restart_required` contract
//! `max_concurrent_downloads` already uses in the settings schema.

use printarr_core::domain::Channel;
use printarr_pipeline::adapters::chat_feed::BackfillHorizon;
use printarr_pipeline::adapters::{Adapter, ChatFeedAdapter, CloudDriveAdapter, ForumAdapter};

#[derive(Debug, Clone)]
pub enum AdapterSourceConfig {
    None,
    ChatFeed { base_url: String, bot_token: String },
    CloudDrive { base_url: String, token_url: String, client_id: String, client_secret: String, refresh_token: String },
    Forum { base_url: String, username: String, password: String },
}

impl AdapterSourceConfig {
    /// Reads `PRINTARR_ADAPTER_KIND` (`chat_feed` | `cloud_drive` | `forum`
    /// | unset) plus the credential envs for whichever kind is selected.
    pub fn from_env() -> Self {
        let kind = std::env::var("PRINTARR_ADAPTER_KIND").unwrap_or_default();
        match kind.as_str() {
            "chat_feed" => AdapterSourceConfig::ChatFeed {
                base_url: env_or_empty("PRINTARR_CHATFEED_BASE_URL"),
                bot_token: env_or_empty("PRINTARR_CHATFEED_BOT_TOKEN"),
            },
            "cloud_drive" => AdapterSourceConfig::CloudDrive {
                base_url: env_or_empty("PRINTARR_CLOUDDRIVE_BASE_URL"),
                token_url: env_or_empty("PRINTARR_CLOUDDRIVE_TOKEN_URL"),
                client_id: env_or_empty("PRINTARR_CLOUDDRIVE_CLIENT_ID"),
                client_secret: env_or_empty("PRINTARR_CLOUDDRIVE_CLIENT_SECRET"),
                refresh_token: env_or_empty("PRINTARR_CLOUDDRIVE_REFRESH_TOKEN"),
            },
            "forum" => AdapterSourceConfig::Forum {
                base_url: env_or_empty("PRINTARR_FORUM_BASE_URL"),
                username: env_or_empty("PRINTARR_FORUM_USERNAME"),
                password: env_or_empty("PRINTARR_FORUM_PASSWORD"),
            },
            _ => AdapterSourceConfig::None,
        }
    }

    /// Builds the adapter for one channel, if this channel is a real
    /// (non-virtual) one and a source kind is configured. Returns `None`
    /// for virtual channels (`upstream_id` absent) and when no source
    /// integration is configured at all.
    pub fn build_for_channel(&self, channel: &Channel) -> Option<Adapter> {
        let upstream_id = channel.upstream_id.as_deref()?;
        match self {
            AdapterSourceConfig::None => None,
            AdapterSourceConfig::ChatFeed { base_url, bot_token } => {
                let backfill = BackfillHorizon::from_mode(channel.backfill_mode, channel.backfill_value);
                Some(Adapter::ChatFeed(ChatFeedAdapter::new(base_url, bot_token, upstream_id, backfill)))
            }
            AdapterSourceConfig::CloudDrive { base_url, token_url, client_id, client_secret, refresh_token } => {
                Some(Adapter::CloudDrive(CloudDriveAdapter::new(
                    base_url,
                    token_url,
                    client_id,
                    client_secret,
                    refresh_token,
                    upstream_id,
                )))
            }
            AdapterSourceConfig::Forum { base_url, username, password } => {
                Some(Adapter::Forum(ForumAdapter::new(base_url, upstream_id, username, password)))
            }
        }
    }
}

fn env_or_empty(key: &str) -> String {
    std::env::var(key).unwrap_or_default()
}
