//! Twitter (X) platform implementation
//!
//! Talks to the v2 REST API. Two credential modes are supported:
//!
//! - **User context**: OAuth 1.0a with the four app/user keys. Reads and
//!   writes on behalf of the account.
//! - **App context**: a bearer token plus the `username` to act as. Read-only;
//!   every write is rejected as `PermissionDenied` before a request is made.
//!
//! Media is uploaded through the v1.1 upload endpoint, which is the only one
//! that accepts OAuth 1.0a signed uploads.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::classify::{self, ErrorRule, VendorFailure};
use crate::config::{Secret, TwitterConfig};
use crate::error::{ErrorKind, PlatformError, PlatformResult};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::platforms::{Capabilities, MediaSupport, Platform};
use crate::types::{
    EngagementAction, EngagementOptions, Feed, FeedOptions, PlatformKind, Post, PostOptions,
    SearchOptions, User,
};

pub mod oauth;

use oauth::OAuth1Credentials;

pub const CAPABILITIES: Capabilities = Capabilities {
    search: true,
    actions: &[
        EngagementAction::Like,
        EngagementAction::Comment,
        EngagementAction::Share,
        EngagementAction::Retweet,
        EngagementAction::Reply,
    ],
    media: MediaSupport::Upload,
    requires_media: false,
    max_media: 4,
    links: true,
    character_limit: 280,
};

const API_BASE: &str = "https://api.twitter.com";
const UPLOAD_URL: &str = "https://upload.twitter.com/1.1/media/upload.json";

const USER_FIELDS: &str = "id,name,username,profile_image_url,description,verified,public_metrics";
const TWEET_FIELDS: &str = "id,text,author_id,created_at,public_metrics,attachments";
const MEDIA_FIELDS: &str = "media_key,url,preview_image_url";
const EXPANSIONS: &str = "author_id,attachments.media_keys";

const DEFAULT_LIMIT: u32 = 20;

const RULES: &[ErrorRule] = &[
    ErrorRule::code(
        "CreditsDepleted",
        ErrorKind::QuotaExhausted,
        "The app's API credits are used up. Purchase more credits or upgrade the plan \
         in the developer portal.",
    ),
    ErrorRule::code(
        "usage-capped",
        ErrorKind::RateLimited,
        "The plan's monthly post cap has been reached.",
    ),
    ErrorRule::code(
        "oauth1-permissions",
        ErrorKind::PermissionDenied,
        "Set the app permissions to \"Read and write\" in the developer portal, then \
         regenerate the access token and secret.",
    ),
    ErrorRule::code(
        "client-not-enrolled",
        ErrorKind::PermissionDenied,
        "Attach the app to a Project in the developer portal to use the v2 API.",
    ),
    ErrorRule::code(
        "unsupported-authentication",
        ErrorKind::PermissionDenied,
        "This endpoint needs user context. Configure api_key, api_secret, access_token \
         and access_token_secret.",
    ),
    ErrorRule::code(
        "89",
        ErrorKind::AuthenticationFailed,
        "The access token is invalid or expired. Regenerate it in the developer portal.",
    ),
    ErrorRule::code(
        "32",
        ErrorKind::AuthenticationFailed,
        "The request signature was rejected. Check the API key and secret.",
    ),
    ErrorRule::code(
        "88",
        ErrorKind::RateLimited,
        "Wait for the rate limit window to reset.",
    ),
    ErrorRule::code(
        "187",
        ErrorKind::ValidationFailed,
        "Twitter rejects posts that duplicate a recent one.",
    ),
    ErrorRule::code(
        "186",
        ErrorKind::ValidationFailed,
        "The text is longer than the account may post.",
    ),
];

/// How requests are authorised
#[derive(Debug, Clone)]
enum Auth {
    User(OAuth1Credentials),
    App { bearer: Secret, username: String },
}

impl Auth {
    fn context(&self) -> &'static str {
        match self {
            Auth::User(_) => "user",
            Auth::App { .. } => "app",
        }
    }
}

#[derive(Debug)]
struct Session {
    auth: Auth,
    me: User,
}

/// Twitter platform client
pub struct TwitterClient {
    config: TwitterConfig,
    api_base: String,
    transport: Arc<dyn HttpTransport>,
    session: Option<Session>,
}

impl TwitterClient {
    pub fn new(config: TwitterConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            api_base: super::api_base(config.base_url.as_deref(), API_BASE),
            config,
            transport,
            session: None,
        }
    }

    fn session(&self) -> PlatformResult<&Session> {
        self.session.as_ref().ok_or_else(|| {
            PlatformError::AuthenticationFailed("Not authenticated with Twitter".to_string())
        })
    }

    /// Writes need user context
    fn require_user_context<'a>(
        &self,
        session: &'a Session,
        action: &str,
    ) -> PlatformResult<&'a OAuth1Credentials> {
        match &session.auth {
            Auth::User(credentials) => Ok(credentials),
            Auth::App { .. } => Err(PlatformError::PermissionDenied {
                message: format!(
                    "Twitter: {} needs user context, but only a bearer token is configured",
                    action
                ),
                remediation: Some(
                    "Configure api_key, api_secret, access_token and access_token_secret \
                     for an app with \"Read and write\" permissions."
                        .to_string(),
                ),
            }),
        }
    }

    async fn send(&self, auth: &Auth, request: HttpRequest) -> PlatformResult<HttpResponse> {
        let request = match auth {
            Auth::User(credentials) => oauth::sign(credentials, request)?,
            Auth::App { bearer, .. } => request.bearer(bearer.expose()),
        };

        debug!(method = request.method.as_str(), url = %request.url, "Twitter request");
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| classify::classify_transport(PlatformKind::Twitter, &e))?;

        if response.is_success() {
            Ok(response)
        } else {
            Err(classify(&response))
        }
    }

    async fn upload_media(&self, credentials: &OAuth1Credentials, path: &str) -> PlatformResult<String> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            PlatformError::ValidationFailed(format!("Failed to read media file '{}': {}", path, e))
        })?;

        debug!(path, size = bytes.len(), "Uploading media to Twitter");
        let url = match self.config.base_url {
            Some(_) => format!("{}/1.1/media/upload.json", self.api_base),
            None => UPLOAD_URL.to_string(),
        };
        let request = HttpRequest::post(url)
            .form(vec![("media_data".to_string(), STANDARD.encode(&bytes))]);
        let response = self
            .send(&Auth::User(credentials.clone()), request)
            .await?;

        let uploaded: UploadedMedia = classify::decode(PlatformKind::Twitter, &response)?;
        Ok(uploaded.media_id_string)
    }

    async fn get_tweets(&self, session: &Session, request: HttpRequest) -> PlatformResult<TweetPage> {
        let request = request
            .query("expansions", EXPANSIONS)
            .query("tweet.fields", TWEET_FIELDS)
            .query("user.fields", USER_FIELDS)
            .query("media.fields", MEDIA_FIELDS);
        let response = self.send(&session.auth, request).await?;
        classify::decode(PlatformKind::Twitter, &response)
    }
}

fn blank(value: &Option<Secret>) -> bool {
    value.as_ref().map_or(true, Secret::is_blank)
}

/// Pick the credential mode from whatever is configured
fn resolve_auth(config: &TwitterConfig) -> PlatformResult<Auth> {
    let oauth_fields = [
        ("api_key", &config.api_key),
        ("api_secret", &config.api_secret),
        ("access_token", &config.access_token),
        ("access_token_secret", &config.access_token_secret),
    ];
    let missing: Vec<&str> = oauth_fields
        .iter()
        .filter(|(_, value)| blank(value))
        .map(|(name, _)| *name)
        .collect();

    match (&config.api_key, &config.api_secret, &config.access_token, &config.access_token_secret) {
        (Some(key), Some(secret), Some(token), Some(token_secret)) if missing.is_empty() => {
            return Ok(Auth::User(OAuth1Credentials {
                consumer_key: key.clone(),
                consumer_secret: secret.clone(),
                token: token.clone(),
                token_secret: token_secret.clone(),
            }));
        }
        _ => {}
    }

    if missing.len() < oauth_fields.len() {
        return Err(PlatformError::AuthenticationFailed(format!(
            "Incomplete Twitter OAuth 1.0a credentials: missing {}",
            missing.join(", ")
        )));
    }

    match (&config.bearer_token, &config.username) {
        (Some(bearer), Some(username)) if !bearer.is_blank() && !username.trim().is_empty() => {
            Ok(Auth::App {
                bearer: bearer.clone(),
                username: username.trim().trim_start_matches('@').to_string(),
            })
        }
        (Some(bearer), _) if !bearer.is_blank() => Err(PlatformError::AuthenticationFailed(
            "A Twitter bearer token needs `username` to know which account to read".to_string(),
        )),
        _ => Err(PlatformError::AuthenticationFailed(
            "No Twitter credentials configured. Set api_key, api_secret, access_token and \
             access_token_secret, or bearer_token and username, in the [twitter] section"
                .to_string(),
        )),
    }
}

/// Translate a failed Twitter response
pub fn classify(response: &HttpResponse) -> PlatformError {
    let body: ApiErrorBody = response.json().unwrap_or_default();

    let message = body
        .detail
        .clone()
        .or_else(|| body.errors.iter().find_map(|e| e.message.clone().or(e.detail.clone())))
        .or_else(|| body.title.clone())
        .unwrap_or_else(|| response.body.chars().take(200).collect());

    let mut failure = VendorFailure::new(response.status, message);
    if let Some(title) = &body.title {
        failure = failure.with_code(title.clone());
    }
    if let Some(problem) = body.problem_type.as_deref().and_then(|t| t.rsplit('/').next()) {
        failure = failure.with_code(problem);
    }
    if let Some(reason) = &body.reason {
        failure = failure.with_code(reason.clone());
    }
    for error in &body.errors {
        if let Some(code) = error.code {
            failure = failure.with_code(code.to_string());
        }
    }

    if response.status == 429 {
        failure.reset_at = classify::epoch_header(response, "x-rate-limit-reset")
            .or_else(|| classify::retry_after(response));
    }

    classify::classify(PlatformKind::Twitter, RULES, &failure)
}

fn permalink(handle: &str, id: &str) -> String {
    if handle.is_empty() {
        format!("https://x.com/i/web/status/{}", id)
    } else {
        format!("https://x.com/{}/status/{}", handle, id)
    }
}

fn format_time(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl Platform for TwitterClient {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Twitter
    }

    fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    async fn authenticate(&mut self) -> PlatformResult<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let auth = resolve_auth(&self.config)?;
        let url = match &auth {
            Auth::User(_) => format!("{}/2/users/me", self.api_base),
            Auth::App { username, .. } => format!(
                "{}/2/users/by/username/{}",
                self.api_base,
                urlencoding::encode(username)
            ),
        };

        let response = self
            .send(&auth, HttpRequest::get(url).query("user.fields", USER_FIELDS))
            .await?;
        let envelope: Single<ApiUser> = classify::decode(PlatformKind::Twitter, &response)?;
        let me = envelope.data.into_user();

        info!(handle = %me.handle, context = auth.context(), "Authenticated with Twitter");
        self.session = Some(Session { auth, me });
        Ok(())
    }

    async fn fetch_profile(&self) -> PlatformResult<User> {
        let session = self.session()?;
        let url = format!("{}/2/users/{}", self.api_base, session.me.id);
        let response = self
            .send(&session.auth, HttpRequest::get(url).query("user.fields", USER_FIELDS))
            .await?;
        let envelope: Single<ApiUser> = classify::decode(PlatformKind::Twitter, &response)?;
        Ok(envelope.data.into_user())
    }

    async fn fetch_feed(&self, options: &FeedOptions) -> PlatformResult<Feed> {
        let session = self.session()?;
        let limit = options.limit.unwrap_or(DEFAULT_LIMIT);

        // The home timeline needs user context; app context reads the account's own posts
        let url = match &session.auth {
            Auth::User(_) => format!(
                "{}/2/users/{}/timelines/reverse_chronological",
                self.api_base, session.me.id
            ),
            Auth::App { .. } => format!("{}/2/users/{}/tweets", self.api_base, session.me.id),
        };

        let mut request = HttpRequest::get(url).query("max_results", limit.clamp(5, 100).to_string());
        if let Some(cursor) = &options.cursor {
            request = request.query("pagination_token", cursor.clone());
        }

        let page = self.get_tweets(session, request).await?;
        let next_cursor = page.meta.as_ref().and_then(|m| m.next_token.clone());
        let mut posts = page.into_posts(&session.me);
        posts.truncate(limit as usize);

        Ok(Feed { posts, next_cursor })
    }

    async fn submit_post(&self, options: &PostOptions) -> PlatformResult<Post> {
        let session = self.session()?;
        let credentials = self.require_user_context(session, "posting")?;

        let mut text = options.body().trim().to_string();
        if let Some(link) = &options.link_url {
            text = if text.is_empty() {
                link.clone()
            } else {
                format!("{}\n\n{}", text, link)
            };
        }

        let mut body = json!({ "text": text });
        if let Some(path) = &options.media_path {
            let media_id = self.upload_media(credentials, path).await?;
            body["media"] = json!({ "media_ids": [media_id] });
        }

        let request = HttpRequest::post(format!("{}/2/tweets", self.api_base)).json(body);
        let response = self.send(&session.auth, request).await?;
        let created: Single<CreatedTweet> = classify::decode(PlatformKind::Twitter, &response)?;

        info!(id = %created.data.id, "Posted to Twitter");
        Ok(Post {
            permalink: Some(permalink(&session.me.handle, &created.data.id)),
            id: created.data.id,
            platform: PlatformKind::Twitter,
            author: session.me.clone(),
            content: created.data.text,
            timestamp: Utc::now(),
            media_urls: Vec::new(),
            like_count: None,
            comment_count: None,
            share_count: None,
        })
    }

    async fn submit_engagement(&self, options: &EngagementOptions) -> PlatformResult<()> {
        let session = self.session()?;
        self.require_user_context(session, options.action.as_str())?;

        let request = match options.action {
            EngagementAction::Like => {
                HttpRequest::post(format!("{}/2/users/{}/likes", self.api_base, session.me.id))
                    .json(json!({ "tweet_id": options.post_id }))
            }
            EngagementAction::Share | EngagementAction::Retweet => {
                HttpRequest::post(format!("{}/2/users/{}/retweets", self.api_base, session.me.id))
                    .json(json!({ "tweet_id": options.post_id }))
            }
            EngagementAction::Comment | EngagementAction::Reply => {
                HttpRequest::post(format!("{}/2/tweets", self.api_base)).json(json!({
                    "text": options.comment_text.as_deref().unwrap_or_default(),
                    "reply": { "in_reply_to_tweet_id": options.post_id },
                }))
            }
        };

        self.send(&session.auth, request).await?;
        info!(action = %options.action, post_id = %options.post_id, "Engaged on Twitter");
        Ok(())
    }

    async fn run_search(&self, options: &SearchOptions) -> PlatformResult<Vec<Post>> {
        let session = self.session()?;
        let limit = options.limit.unwrap_or(DEFAULT_LIMIT);

        let mut request = HttpRequest::get(format!("{}/2/tweets/search/recent", self.api_base))
            .query("query", options.query.trim())
            .query("max_results", limit.clamp(10, 100).to_string());
        if let Some(since) = options.since {
            request = request.query("start_time", format_time(since));
        }
        if let Some(until) = options.until {
            request = request.query("end_time", format_time(until));
        }

        let page = self.get_tweets(session, request).await?;
        let mut posts: Vec<Post> = page
            .into_posts(&session.me)
            .into_iter()
            .filter(|post| options.in_window(post.timestamp))
            .collect();
        posts.truncate(limit as usize);
        Ok(posts)
    }
}

// ============================================================================
// Vendor payloads
// ============================================================================

#[derive(Debug, Deserialize)]
struct Single<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct UploadedMedia {
    media_id_string: String,
}

#[derive(Debug, Deserialize)]
struct CreatedTweet {
    id: String,
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiUser {
    id: String,
    username: String,
    name: String,
    profile_image_url: Option<String>,
    description: Option<String>,
    #[serde(default)]
    verified: bool,
    public_metrics: Option<UserMetrics>,
}

#[derive(Debug, Clone, Deserialize)]
struct UserMetrics {
    followers_count: Option<u64>,
    following_count: Option<u64>,
}

impl ApiUser {
    fn into_user(self) -> User {
        let metrics = self.public_metrics;
        User {
            id: self.id,
            handle: self.username,
            display_name: self.name,
            avatar_url: self.profile_image_url,
            bio: self.description.filter(|d| !d.is_empty()),
            follower_count: metrics.as_ref().and_then(|m| m.followers_count),
            following_count: metrics.as_ref().and_then(|m| m.following_count),
            verified: self.verified,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiTweet {
    id: String,
    text: String,
    author_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
    public_metrics: Option<TweetMetrics>,
    attachments: Option<Attachments>,
}

#[derive(Debug, Deserialize)]
struct TweetMetrics {
    like_count: Option<u64>,
    reply_count: Option<u64>,
    retweet_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Attachments {
    #[serde(default)]
    media_keys: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<ApiUser>,
    #[serde(default)]
    media: Vec<ApiMedia>,
}

#[derive(Debug, Deserialize)]
struct ApiMedia {
    media_key: String,
    url: Option<String>,
    preview_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TweetPage {
    #[serde(default)]
    data: Vec<ApiTweet>,
    #[serde(default)]
    includes: Includes,
    meta: Option<Meta>,
}

impl TweetPage {
    fn into_posts(self, me: &User) -> Vec<Post> {
        let includes = self.includes;
        self.data
            .into_iter()
            .map(|tweet| {
                let author = match tweet.author_id.as_deref() {
                    Some(id) if id == me.id => me.clone(),
                    Some(id) => includes
                        .users
                        .iter()
                        .find(|u| u.id == id)
                        .cloned()
                        .map(ApiUser::into_user)
                        .unwrap_or_else(|| User {
                            id: id.to_string(),
                            ..User::undisclosed()
                        }),
                    None => User::undisclosed(),
                };

                let media_urls = tweet
                    .attachments
                    .map(|a| a.media_keys)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|key| includes.media.iter().find(|m| &m.media_key == key))
                    .filter_map(|m| m.url.clone().or_else(|| m.preview_image_url.clone()))
                    .collect();

                let metrics = tweet.public_metrics;
                Post {
                    permalink: Some(permalink(&author.handle, &tweet.id)),
                    id: tweet.id,
                    platform: PlatformKind::Twitter,
                    author,
                    content: tweet.text,
                    timestamp: tweet.created_at.unwrap_or_else(Utc::now),
                    media_urls,
                    like_count: metrics.as_ref().and_then(|m| m.like_count),
                    comment_count: metrics.as_ref().and_then(|m| m.reply_count),
                    share_count: metrics.as_ref().and_then(|m| m.retweet_count),
                }
            })
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    title: Option<String>,
    #[serde(rename = "type")]
    problem_type: Option<String>,
    detail: Option<String>,
    reason: Option<String>,
    #[serde(default)]
    errors: Vec<ApiErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEntry {
    code: Option<i64>,
    message: Option<String>,
    detail: Option<String>,
}
