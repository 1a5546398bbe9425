//! LinkedIn platform implementation
//!
//! Posts go through the UGC Posts API; likes, comments and reshares are all
//! POSTs to `/v2/socialActions/{urn}/{verb}`. LinkedIn offers no general
//! search to third-party apps.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::classify::{self, ErrorRule, VendorFailure};
use crate::config::LinkedInConfig;
use crate::error::{ErrorKind, PlatformError, PlatformResult};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::platforms::{Capabilities, MediaSupport, Platform};
use crate::types::{
    EngagementAction, EngagementOptions, Feed, FeedOptions, PlatformKind, Post, PostOptions, User,
};

pub const CAPABILITIES: Capabilities = Capabilities {
    search: false,
    actions: &[
        EngagementAction::Like,
        EngagementAction::Comment,
        EngagementAction::Share,
    ],
    media: MediaSupport::None,
    requires_media: false,
    max_media: 0,
    links: true,
    character_limit: 3000,
};

const API_BASE: &str = "https://api.linkedin.com";
const DEFAULT_LIMIT: u32 = 20;

const SHARE_CONTENT: &str = "com.linkedin.ugc.ShareContent";
const VISIBILITY: &str = "com.linkedin.ugc.MemberNetworkVisibility";

const RULES: &[ErrorRule] = &[
    ErrorRule::code(
        "INVALID_ACCESS_TOKEN",
        ErrorKind::AuthenticationFailed,
        "Generate a new access token.",
    ),
    ErrorRule::code(
        "EXPIRED_ACCESS_TOKEN",
        ErrorKind::AuthenticationFailed,
        "The access token expired. Generate a new one.",
    ),
    ErrorRule::code(
        "REVOKED_ACCESS_TOKEN",
        ErrorKind::AuthenticationFailed,
        "The member revoked the app's access. Authorize the app again.",
    ),
    ErrorRule::code(
        "65600",
        ErrorKind::AuthenticationFailed,
        "Generate a new access token.",
    ),
    ErrorRule::code(
        "ACCESS_DENIED",
        ErrorKind::PermissionDenied,
        "Check the app's products and OAuth scopes in the developer portal.",
    ),
    ErrorRule::code(
        "DUPLICATE_POST",
        ErrorKind::ValidationFailed,
        "LinkedIn rejects content identical to a recent post.",
    ),
    ErrorRule::status(
        422,
        ErrorKind::ValidationFailed,
        "LinkedIn could not process the content.",
    ),
];

/// Resource fragments in a permission message and the scope they need.
/// More specific fragments come first.
const SCOPES: &[(&str, &str)] = &[
    ("ugcPosts.CREATE", "w_member_social"),
    ("socialActions", "w_member_social"),
    ("ugcPosts", "r_member_social"),
    ("userinfo", "openid and profile"),
];

fn scope_remediation(message: &str) -> Option<String> {
    SCOPES
        .iter()
        .find(|(fragment, _)| message.contains(fragment))
        .map(|(_, scope)| format!("Authorize the app again with the {} scope.", scope))
}

/// Application rate limits reset at midnight UTC
fn next_utc_midnight() -> Option<DateTime<Utc>> {
    let tomorrow = Utc::now().date_naive().succ_opt()?;
    Some(tomorrow.and_hms_opt(0, 0, 0)?.and_utc())
}

#[derive(Debug)]
struct Session {
    urn: String,
    me: User,
}

/// LinkedIn platform client
pub struct LinkedInClient {
    config: LinkedInConfig,
    api_base: String,
    transport: Arc<dyn HttpTransport>,
    session: Option<Session>,
}

impl LinkedInClient {
    pub fn new(config: LinkedInConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            api_base: super::api_base(config.base_url.as_deref(), API_BASE),
            config,
            transport,
            session: None,
        }
    }

    fn session(&self) -> PlatformResult<&Session> {
        self.session.as_ref().ok_or_else(|| {
            PlatformError::AuthenticationFailed("Not authenticated with LinkedIn".to_string())
        })
    }

    async fn send(&self, request: HttpRequest) -> PlatformResult<HttpResponse> {
        let request = request
            .bearer(self.config.access_token.expose())
            .header("X-Restli-Protocol-Version", "2.0.0");

        debug!(method = request.method.as_str(), url = %request.url, "LinkedIn request");
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| classify::classify_transport(PlatformKind::LinkedIn, &e))?;

        if response.is_success() {
            Ok(response)
        } else {
            Err(classify(&response))
        }
    }

    async fn userinfo(&self) -> PlatformResult<UserInfo> {
        let response = self
            .send(HttpRequest::get(format!("{}/v2/userinfo", self.api_base)))
            .await?;
        classify::decode(PlatformKind::LinkedIn, &response)
    }
}

/// Accept a full URN or a bare share id
fn post_urn(post_id: &str) -> String {
    let post_id = post_id.trim();
    if post_id.starts_with("urn:") {
        post_id.to_string()
    } else {
        format!("urn:li:share:{}", post_id)
    }
}

fn permalink(urn: &str) -> String {
    format!("https://www.linkedin.com/feed/update/{}", urn)
}

/// The social-action verb for an engagement
fn verb(action: EngagementAction) -> Option<&'static str> {
    match action {
        EngagementAction::Like => Some("likes"),
        EngagementAction::Comment => Some("comments"),
        EngagementAction::Share => Some("shares"),
        EngagementAction::Retweet | EngagementAction::Reply => None,
    }
}

/// Translate a failed LinkedIn response
pub fn classify(response: &HttpResponse) -> PlatformError {
    let body: ApiError = response.json().unwrap_or_default();
    let message = body
        .message
        .clone()
        .unwrap_or_else(|| response.body.chars().take(200).collect());

    let mut failure = VendorFailure::new(response.status, message.clone());
    if let Some(code) = body.code {
        failure = failure.with_code(code);
    }
    if let Some(service_code) = body.service_error_code {
        failure = failure.with_code(service_code.to_string());
    }
    if response.status == 403 {
        failure.remediation = scope_remediation(&message);
    }
    if response.status == 429 {
        failure.reset_at = classify::retry_after(response).or_else(next_utc_midnight);
    }

    classify::classify(PlatformKind::LinkedIn, RULES, &failure)
}

fn share_body(author: &str, options: &PostOptions) -> Value {
    let mut content = json!({
        "shareCommentary": { "text": options.body().trim() },
        "shareMediaCategory": "NONE",
    });

    if let Some(link) = &options.link_url {
        let mut article = json!({ "status": "READY", "originalUrl": link });
        if let Some(title) = &options.link_title {
            article["title"] = json!({ "text": title });
        }
        content["shareMediaCategory"] = json!("ARTICLE");
        content["media"] = json!([article]);
    }

    json!({
        "author": author,
        "lifecycleState": "PUBLISHED",
        "specificContent": { SHARE_CONTENT: content },
        "visibility": { VISIBILITY: "PUBLIC" },
    })
}

#[async_trait]
impl Platform for LinkedInClient {
    fn kind(&self) -> PlatformKind {
        PlatformKind::LinkedIn
    }

    fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    async fn authenticate(&mut self) -> PlatformResult<()> {
        if self.session.is_some() {
            return Ok(());
        }

        if self.config.access_token.is_blank() {
            return Err(PlatformError::AuthenticationFailed(
                "LinkedIn access_token is empty".to_string(),
            ));
        }

        let info = self.userinfo().await?;
        let person_id = self
            .config
            .person_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(info.sub.as_str())
            .to_string();
        let urn = format!("urn:li:person:{}", person_id);
        let me = info.into_user(&person_id);

        info!(urn = %urn, "Authenticated with LinkedIn");
        self.session = Some(Session { urn, me });
        Ok(())
    }

    async fn fetch_profile(&self) -> PlatformResult<User> {
        let session = self.session()?;
        let info = self.userinfo().await?;
        Ok(info.into_user(&session.me.handle))
    }

    async fn fetch_feed(&self, options: &FeedOptions) -> PlatformResult<Feed> {
        let session = self.session()?;
        let limit = options.limit.unwrap_or(DEFAULT_LIMIT);
        let start = match &options.cursor {
            Some(cursor) => cursor.trim().parse::<u32>().map_err(|_| {
                PlatformError::ValidationFailed(format!("Invalid LinkedIn feed cursor '{}'", cursor))
            })?,
            None => 0,
        };

        // Rest.li list syntax must reach the server with literal parentheses
        let url = format!(
            "{}/v2/ugcPosts?q=authors&authors=List({})",
            self.api_base,
            urlencoding::encode(&session.urn)
        );
        let request = HttpRequest::get(url)
            .query("count", limit.to_string())
            .query("start", start.to_string());

        let response = self.send(request).await?;
        let page: UgcPage = classify::decode(PlatformKind::LinkedIn, &response)?;

        let total = page.paging.as_ref().and_then(|p| p.total);
        let posts: Vec<Post> = page
            .elements
            .into_iter()
            .take(limit as usize)
            .map(|element| element.into_post(&session.me))
            .collect();

        let next = (start as usize).saturating_add(posts.len());
        let next_cursor = match total {
            Some(total) if next < total => Some(next.to_string()),
            None if !posts.is_empty() && posts.len() == limit as usize => Some(next.to_string()),
            _ => None,
        };

        Ok(Feed { posts, next_cursor })
    }

    async fn submit_post(&self, options: &PostOptions) -> PlatformResult<Post> {
        let session = self.session()?;
        let request = HttpRequest::post(format!("{}/v2/ugcPosts", self.api_base))
            .json(share_body(&session.urn, options));
        let response = self.send(request).await?;

        let id = response
            .header("x-restli-id")
            .map(str::to_string)
            .or_else(|| {
                response
                    .json_or_null()
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .ok_or_else(|| PlatformError::Unknown {
                status: Some(response.status),
                message: "LinkedIn accepted the post but returned no id".to_string(),
            })?;

        info!(id = %id, "Posted to LinkedIn");
        Ok(Post {
            permalink: Some(permalink(&id)),
            id,
            platform: PlatformKind::LinkedIn,
            author: session.me.clone(),
            content: options.body().trim().to_string(),
            timestamp: Utc::now(),
            media_urls: Vec::new(),
            like_count: None,
            comment_count: None,
            share_count: None,
        })
    }

    async fn submit_engagement(&self, options: &EngagementOptions) -> PlatformResult<()> {
        let session = self.session()?;
        let verb = verb(options.action)
            .ok_or_else(|| PlatformError::unsupported(PlatformKind::LinkedIn, options.action.as_str()))?;

        let target = post_urn(&options.post_id);
        let mut body = json!({ "actor": session.urn, "object": target });
        if let Some(text) = options.comment_text.as_deref().filter(|t| !t.trim().is_empty()) {
            body["message"] = json!({ "text": text });
        }

        let url = format!(
            "{}/v2/socialActions/{}/{}",
            self.api_base,
            urlencoding::encode(&target),
            verb
        );
        self.send(HttpRequest::post(url).json(body)).await?;

        info!(action = %options.action, target = %target, "Engaged on LinkedIn");
        Ok(())
    }
}

// ============================================================================
// Vendor payloads
// ============================================================================

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
}

impl UserInfo {
    fn into_user(self, person_id: &str) -> User {
        let display_name = self.name.unwrap_or_else(|| {
            [self.given_name, self.family_name]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ")
        });

        User {
            id: format!("urn:li:person:{}", person_id),
            handle: person_id.to_string(),
            display_name,
            avatar_url: self.picture,
            bio: None,
            follower_count: None,
            following_count: None,
            verified: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UgcPage {
    #[serde(default)]
    elements: Vec<UgcPost>,
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    total: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UgcPost {
    id: String,
    first_published_at: Option<i64>,
    created: Option<AuditStamp>,
    #[serde(default)]
    specific_content: Value,
}

#[derive(Debug, Deserialize)]
struct AuditStamp {
    time: i64,
}

impl UgcPost {
    fn into_post(self, me: &User) -> Post {
        let share = &self.specific_content[SHARE_CONTENT];
        let content = share["shareCommentary"]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let media_urls = share["media"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| m["originalUrl"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let millis = self
            .first_published_at
            .or(self.created.as_ref().map(|c| c.time));
        let timestamp = millis
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        Post {
            permalink: Some(permalink(&self.id)),
            id: self.id,
            platform: PlatformKind::LinkedIn,
            author: me.clone(),
            content,
            timestamp,
            media_urls,
            like_count: None,
            comment_count: None,
            share_count: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiError {
    message: Option<String>,
    code: Option<String>,
    service_error_code: Option<i64>,
}
