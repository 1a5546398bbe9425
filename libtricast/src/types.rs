//! Unified data model shared by every platform adapter
//!
//! Adapters map vendor payloads into these shapes and callers only ever see
//! these shapes. Request options carry their own precondition checks; the
//! platform layer runs them once before any network call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{PlatformError, PlatformResult, TricastError};

/// The three supported networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Twitter,
    Instagram,
    LinkedIn,
}

impl PlatformKind {
    /// All platforms in a stable order
    pub const ALL: [PlatformKind; 3] = [
        PlatformKind::Twitter,
        PlatformKind::Instagram,
        PlatformKind::LinkedIn,
    ];

    /// Lowercase identifier used in config sections and CLI flags
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Twitter => "twitter",
            PlatformKind::Instagram => "instagram",
            PlatformKind::LinkedIn => "linkedin",
        }
    }

    /// Human-facing name used in error messages
    pub fn display_name(&self) -> &'static str {
        match self {
            PlatformKind::Twitter => "Twitter",
            PlatformKind::Instagram => "Instagram",
            PlatformKind::LinkedIn => "LinkedIn",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformKind {
    type Err = TricastError;

    /// Resolve a platform name, accepting the common aliases
    /// (`x`/`twitter`, `ig`/`instagram`, `li`/`linkedin`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "twitter" | "x" | "tw" => Ok(PlatformKind::Twitter),
            "instagram" | "ig" | "insta" => Ok(PlatformKind::Instagram),
            "linkedin" | "li" => Ok(PlatformKind::LinkedIn),
            _ => Err(TricastError::InvalidInput(format!(
                "Unknown platform '{}'. Valid options: twitter (x), instagram (ig), linkedin (li)",
                s
            ))),
        }
    }
}

/// A profile on one of the platforms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Vendor-native id, opaque to callers
    pub id: String,
    pub handle: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub follower_count: Option<u64>,
    pub following_count: Option<u64>,
    pub verified: bool,
}

impl User {
    /// Placeholder author for results where the vendor does not disclose one
    pub fn undisclosed() -> Self {
        Self {
            id: String::new(),
            handle: String::new(),
            display_name: String::new(),
            avatar_url: None,
            bio: None,
            follower_count: None,
            following_count: None,
            verified: false,
        }
    }
}

/// A piece of published content
///
/// `platform` always names the adapter that produced the post, so engagement
/// calls can be routed back to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub platform: PlatformKind,
    pub author: User,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_urls: Vec<String>,
    pub like_count: Option<u64>,
    pub comment_count: Option<u64>,
    pub share_count: Option<u64>,
    pub permalink: Option<String>,
}

/// One page of a feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub posts: Vec<Post>,
    /// Opaque vendor cursor for the next page, if there is one
    pub next_cursor: Option<String>,
}

/// Content to publish
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostOptions {
    pub text: Option<String>,
    pub caption: Option<String>,
    /// Local file to upload
    pub media_path: Option<String>,
    /// Publicly reachable media
    #[serde(default)]
    pub media_urls: Vec<String>,
    pub link_url: Option<String>,
    pub link_title: Option<String>,
}

impl PostOptions {
    /// Text-only post
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// The body to publish: `text` when set, otherwise `caption`
    pub fn body(&self) -> &str {
        self.text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or(self.caption.as_deref())
            .unwrap_or("")
    }

    pub fn has_media(&self) -> bool {
        self.media_path.is_some() || !self.media_urls.is_empty()
    }

    pub fn media_count(&self) -> usize {
        self.media_urls.len() + usize::from(self.media_path.is_some())
    }

    /// Platform-independent preconditions
    pub fn validate(&self) -> PlatformResult<()> {
        if self.body().trim().is_empty() && !self.has_media() {
            return Err(PlatformError::ValidationFailed(
                "A post needs text, a caption, or media".to_string(),
            ));
        }

        if let Some(path) = &self.media_path {
            if path.trim().is_empty() {
                return Err(PlatformError::ValidationFailed(
                    "media_path cannot be empty".to_string(),
                ));
            }
        }

        for url in &self.media_urls {
            if !is_http_url(url) {
                return Err(PlatformError::ValidationFailed(format!(
                    "Media URL '{}' must be an http(s) URL",
                    url
                )));
            }
        }

        match (&self.link_url, &self.link_title) {
            (None, Some(_)) => Err(PlatformError::ValidationFailed(
                "link_title requires link_url".to_string(),
            )),
            (Some(url), _) if !is_http_url(url) => Err(PlatformError::ValidationFailed(format!(
                "Link '{}' must be an http(s) URL",
                url
            ))),
            _ => Ok(()),
        }
    }
}

/// Engagement verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementAction {
    Like,
    Comment,
    Share,
    Retweet,
    Reply,
}

impl EngagementAction {
    pub const ALL: [EngagementAction; 5] = [
        EngagementAction::Like,
        EngagementAction::Comment,
        EngagementAction::Share,
        EngagementAction::Retweet,
        EngagementAction::Reply,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementAction::Like => "like",
            EngagementAction::Comment => "comment",
            EngagementAction::Share => "share",
            EngagementAction::Retweet => "retweet",
            EngagementAction::Reply => "reply",
        }
    }

    /// Whether the action carries text
    pub fn requires_text(&self) -> bool {
        matches!(self, EngagementAction::Comment | EngagementAction::Reply)
    }
}

impl fmt::Display for EngagementAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngagementAction {
    type Err = TricastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "like" => Ok(EngagementAction::Like),
            "comment" => Ok(EngagementAction::Comment),
            "share" => Ok(EngagementAction::Share),
            "retweet" | "repost" => Ok(EngagementAction::Retweet),
            "reply" => Ok(EngagementAction::Reply),
            _ => Err(TricastError::InvalidInput(format!(
                "Unknown action '{}'. Valid options: like, comment, share, retweet, reply",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementOptions {
    pub post_id: String,
    pub action: EngagementAction,
    pub comment_text: Option<String>,
}

impl EngagementOptions {
    pub fn new(post_id: impl Into<String>, action: EngagementAction) -> Self {
        Self {
            post_id: post_id.into(),
            action,
            comment_text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.comment_text = Some(text.into());
        self
    }

    pub fn validate(&self) -> PlatformResult<()> {
        if self.post_id.trim().is_empty() {
            return Err(PlatformError::ValidationFailed(
                "post_id cannot be empty".to_string(),
            ));
        }

        let has_text = self
            .comment_text
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        if self.action.requires_text() && !has_text {
            return Err(PlatformError::ValidationFailed(format!(
                "The '{}' action requires non-empty comment text",
                self.action
            )));
        }

        Ok(())
    }
}

/// Upper bound accepted for `limit` on feed and search requests
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub query: String,
    pub limit: Option<u32>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl SearchOptions {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> PlatformResult<()> {
        if self.query.trim().is_empty() {
            return Err(PlatformError::ValidationFailed(
                "Search query cannot be empty".to_string(),
            ));
        }
        validate_limit(self.limit)?;
        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since >= until {
                return Err(PlatformError::ValidationFailed(format!(
                    "Search window is empty: since ({}) must be before until ({})",
                    since.to_rfc3339(),
                    until.to_rfc3339()
                )));
            }
        }
        Ok(())
    }

    /// Whether a timestamp falls inside the requested window
    pub fn in_window(&self, timestamp: DateTime<Utc>) -> bool {
        self.since.map_or(true, |since| timestamp >= since)
            && self.until.map_or(true, |until| timestamp < until)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedOptions {
    pub limit: Option<u32>,
    /// Opaque vendor cursor returned as [`Feed::next_cursor`]
    pub cursor: Option<String>,
}

impl FeedOptions {
    pub fn validate(&self) -> PlatformResult<()> {
        validate_limit(self.limit)?;
        if self.cursor.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(PlatformError::ValidationFailed(
                "Feed cursor cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_limit(limit: Option<u32>) -> PlatformResult<()> {
    match limit {
        Some(0) => Err(PlatformError::ValidationFailed(
            "limit must be at least 1".to_string(),
        )),
        Some(n) if n > MAX_PAGE_SIZE => Err(PlatformError::ValidationFailed(format!(
            "limit must be at most {} (got {})",
            MAX_PAGE_SIZE, n
        ))),
        _ => Ok(()),
    }
}

fn is_http_url(value: &str) -> bool {
    let value = value.trim();
    (value.starts_with("https://") || value.starts_with("http://")) && value.len() > "https://".len()
}
