//! Instagram platform implementation
//!
//! Uses the Instagram Graph API, which only serves Business and Creator
//! accounts linked to a Facebook Page. Publishing is a two-step affair: create
//! a media container from a public URL, then publish the container. Instagram
//! fetches the media itself, so local files cannot be posted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classify::{self, ErrorRule, VendorFailure};
use crate::config::InstagramConfig;
use crate::error::{ErrorKind, PlatformError, PlatformResult};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::platforms::{Capabilities, MediaSupport, Platform};
use crate::types::{
    EngagementAction, EngagementOptions, Feed, FeedOptions, PlatformKind, Post, PostOptions,
    SearchOptions, User,
};

pub const CAPABILITIES: Capabilities = Capabilities {
    search: true,
    actions: &[EngagementAction::Comment, EngagementAction::Reply],
    media: MediaSupport::PublicUrl,
    requires_media: true,
    max_media: 10,
    links: false,
    character_limit: 2200,
};

const API_BASE: &str = "https://graph.facebook.com/v19.0";

const PROFILE_FIELDS: &str =
    "id,username,name,profile_picture_url,biography,followers_count,follows_count";
const MEDIA_FIELDS: &str =
    "id,caption,media_type,media_url,thumbnail_url,permalink,timestamp,username,like_count,comments_count";
const HASHTAG_MEDIA_FIELDS: &str =
    "id,caption,media_type,media_url,permalink,timestamp,like_count,comments_count";

const DEFAULT_LIMIT: u32 = 20;
/// Hashtag pages are capped lower than the account's own media
const HASHTAG_PAGE_MAX: u32 = 50;


const RULES: &[ErrorRule] = &[
    ErrorRule::code(
        "2207042",
        ErrorKind::QuotaExhausted,
        "The account has reached Instagram's 24-hour publishing limit.",
    ),
    ErrorRule::code(
        "2207052",
        ErrorKind::ValidationFailed,
        "Instagram could not fetch the media. Make sure the URL is publicly reachable.",
    ),
    ErrorRule::code(
        "2207026",
        ErrorKind::ValidationFailed,
        "The media format is not supported.",
    ),
    ErrorRule::code(
        "190",
        ErrorKind::AuthenticationFailed,
        "The access token is invalid or expired. Generate a new long-lived token.",
    ),
    ErrorRule::code(
        "102",
        ErrorKind::AuthenticationFailed,
        "The session is invalid. Generate a new long-lived token.",
    ),
    ErrorRule::code(
        "10",
        ErrorKind::PermissionDenied,
        "Grant the app the instagram_basic and instagram_content_publish permissions.",
    ),
    ErrorRule::code(
        "200",
        ErrorKind::PermissionDenied,
        "Grant the app the instagram_basic, instagram_content_publish and \
         instagram_manage_comments permissions.",
    ),
    ErrorRule::code(
        "3",
        ErrorKind::PermissionDenied,
        "The app does not have the capability for this call. Check its use cases in \
         the developer dashboard.",
    ),
    ErrorRule::code("4", ErrorKind::RateLimited, "Wait for app usage to drop."),
    ErrorRule::code("17", ErrorKind::RateLimited, "Wait for account usage to drop."),
    ErrorRule::code("32", ErrorKind::RateLimited, "Wait for page usage to drop."),
    ErrorRule::code("613", ErrorKind::RateLimited, "Wait for usage to drop."),
    ErrorRule::code(
        "100",
        ErrorKind::ValidationFailed,
        "Check the request parameters and media URLs.",
    ),
];

#[derive(Debug)]
struct Session {
    account_id: String,
    me: User,
}

/// Instagram platform client
pub struct InstagramClient {
    config: InstagramConfig,
    api_base: String,
    transport: Arc<dyn HttpTransport>,
    session: Option<Session>,
}

impl InstagramClient {
    pub fn new(config: InstagramConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            api_base: super::api_base(config.base_url.as_deref(), API_BASE),
            config,
            transport,
            session: None,
        }
    }

    fn session(&self) -> PlatformResult<&Session> {
        self.session.as_ref().ok_or_else(|| {
            PlatformError::AuthenticationFailed("Not authenticated with Instagram".to_string())
        })
    }

    async fn send(&self, request: HttpRequest) -> PlatformResult<HttpResponse> {
        let request = request.bearer(self.config.access_token.expose());

        debug!(method = request.method.as_str(), url = %request.url, "Instagram request");
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| classify::classify_transport(PlatformKind::Instagram, &e))?;

        if response.is_success() {
            Ok(response)
        } else {
            Err(classify(&response))
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, request: HttpRequest) -> PlatformResult<T> {
        let response = self.send(request).await?;
        classify::decode(PlatformKind::Instagram, &response)
    }

    async fn create_container(
        &self,
        account_id: &str,
        url: &str,
        caption: Option<&str>,
        carousel_item: bool,
    ) -> PlatformResult<String> {
        let mut form = Vec::new();
        if is_video(url) {
            let media_type = if carousel_item { "VIDEO" } else { "REELS" };
            form.push(("media_type".to_string(), media_type.to_string()));
            form.push(("video_url".to_string(), url.to_string()));
        } else {
            form.push(("image_url".to_string(), url.to_string()));
        }
        if carousel_item {
            form.push(("is_carousel_item".to_string(), "true".to_string()));
        }
        if let Some(caption) = caption.filter(|c| !c.trim().is_empty()) {
            form.push(("caption".to_string(), caption.to_string()));
        }

        let request = HttpRequest::post(format!("{}/{}/media", self.api_base, account_id)).form(form);
        let created: Created = self.get(request).await?;
        Ok(created.id)
    }

    /// One status check; video containers are processed asynchronously
    async fn ensure_container_ready(&self, container_id: &str) -> PlatformResult<()> {
        let path = urlencoding::encode(container_id);
        let request = HttpRequest::get(format!("{}/{}", self.api_base, path))
            .query("fields", "status_code");
        let status: ContainerStatus = self.get(request).await?;

        match status.status_code.as_deref() {
            Some("FINISHED") => Ok(()),
            Some(code @ ("ERROR" | "EXPIRED" | "PUBLISHED")) => Err(PlatformError::ValidationFailed(
                format!("Instagram media container {} cannot be published (status {})", container_id, code),
            )),
            other => {
                debug!(container_id, status = ?other, "Media container still processing");
                Err(PlatformError::Unknown {
                    status: None,
                    message: format!(
                        "Instagram is still processing media container {} (status {}). \
                         Publish it later with that container id",
                        container_id,
                        other.unwrap_or("unknown")
                    ),
                })
            }
        }
    }

    /// Publish a container created earlier, e.g. a video that was still processing
    pub async fn publish_container(&self, container_id: &str) -> PlatformResult<Post> {
        let session = self.session()?;
        self.ensure_container_ready(container_id).await?;
        self.publish(session, container_id).await
    }

    async fn publish(&self, session: &Session, container_id: &str) -> PlatformResult<Post> {
        let published: Created = self
            .get(
                HttpRequest::post(format!("{}/{}/media_publish", self.api_base, session.account_id))
                    .form(vec![("creation_id".to_string(), container_id.to_string())]),
            )
            .await?;
        info!(id = %published.id, "Published to Instagram");

        let media: ApiMedia = self
            .get(
                HttpRequest::get(format!("{}/{}", self.api_base, published.id))
                    .query("fields", MEDIA_FIELDS),
            )
            .await?;
        Ok(media.into_post(session.me.clone()))
    }
}

/// Lowercase path of a URL ends in a video extension
fn is_video(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    path.ends_with(".mp4") || path.ends_with(".mov")
}

/// Instagram formats timestamps as `2024-05-01T12:00:00+0000`
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// A search query must be one hashtag, with or without the leading `#`
fn hashtag(query: &str) -> PlatformResult<&str> {
    let tag = query.trim().trim_start_matches('#');
    if tag.is_empty() || tag.chars().any(char::is_whitespace) {
        return Err(PlatformError::ValidationFailed(format!(
            "Instagram search takes a single hashtag (got '{}')",
            query
        )));
    }
    Ok(tag)
}

/// Translate a failed Graph API response
pub fn classify(response: &HttpResponse) -> PlatformError {
    let envelope: ApiErrorEnvelope = response.json().unwrap_or_default();
    let error = envelope.error.unwrap_or_default();

    let message = error
        .error_user_msg
        .clone()
        .or_else(|| error.message.clone())
        .unwrap_or_else(|| response.body.chars().take(200).collect());

    let mut failure = VendorFailure::new(response.status, message);
    if let Some(subcode) = error.error_subcode {
        failure = failure.with_code(subcode.to_string());
    }
    if let Some(code) = error.code {
        failure = failure.with_code(code.to_string());
    }
    if let Some(error_type) = error.error_type {
        failure = failure.with_code(error_type);
    }
    if response.status == 429 {
        failure.reset_at = classify::retry_after(response);
    }

    classify::classify(PlatformKind::Instagram, RULES, &failure)
}

#[async_trait]
impl Platform for InstagramClient {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Instagram
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
                "Instagram access_token is empty".to_string(),
            ));
        }

        let account_id = match self.config.business_account_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                return Err(PlatformError::AuthenticationFailed(
                    "Instagram needs business_account_id: the id of the Instagram Business or \
                     Creator account, which is not the Facebook user id the token belongs to. \
                     Look it up with GET /me/accounts?fields=instagram_business_account"
                        .to_string(),
                ));
            }
        };

        // Validates the token itself before touching the account
        let token_owner: TokenOwner = self
            .get(HttpRequest::get(format!("{}/me", self.api_base)).query("fields", "id,name"))
            .await?;
        if token_owner.id == account_id {
            return Err(PlatformError::AuthenticationFailed(format!(
                "Instagram business_account_id {} is the Facebook user the token belongs to. \
                 Use the linked Instagram Business account id from \
                 GET /me/accounts?fields=instagram_business_account",
                account_id
            )));
        }
        debug!(facebook_user = %token_owner.id, "Instagram token is valid");

        let profile: ApiProfile = self
            .get(HttpRequest::get(format!("{}/{}", self.api_base, account_id)).query("fields", "id,username"))
            .await?;
        let me = profile.into_user();

        info!(handle = %me.handle, "Authenticated with Instagram");
        self.session = Some(Session { account_id, me });
        Ok(())
    }

    async fn fetch_profile(&self) -> PlatformResult<User> {
        let session = self.session()?;
        let profile: ApiProfile = self
            .get(
                HttpRequest::get(format!("{}/{}", self.api_base, session.account_id))
                    .query("fields", PROFILE_FIELDS),
            )
            .await?;
        Ok(profile.into_user())
    }

    async fn fetch_feed(&self, options: &FeedOptions) -> PlatformResult<Feed> {
        let session = self.session()?;
        let limit = options.limit.unwrap_or(DEFAULT_LIMIT);

        let mut request = HttpRequest::get(format!("{}/{}/media", self.api_base, session.account_id))
            .query("fields", MEDIA_FIELDS)
            .query("limit", limit.to_string());
        if let Some(cursor) = &options.cursor {
            request = request.query("after", cursor.clone());
        }

        let page: MediaPage = self.get(request).await?;
        let next_cursor = page.next_cursor();
        let posts = page
            .data
            .into_iter()
            .take(limit as usize)
            .map(|media| media.into_post(session.me.clone()))
            .collect();

        Ok(Feed { posts, next_cursor })
    }

    async fn submit_post(&self, options: &PostOptions) -> PlatformResult<Post> {
        let session = self.session()?;
        let account_id = session.account_id.as_str();
        let caption = options.body().trim();

        let container_id = match options.media_urls.as_slice() {
            [single] => {
                self.create_container(account_id, single, Some(caption), false)
                    .await?
            }
            urls => {
                let mut children = Vec::with_capacity(urls.len());
                for url in urls {
                    children.push(self.create_container(account_id, url, None, true).await?);
                }
                debug!(items = children.len(), "Creating Instagram carousel");

                let mut form = vec![
                    ("media_type".to_string(), "CAROUSEL".to_string()),
                    ("children".to_string(), children.join(",")),
                ];
                if !caption.is_empty() {
                    form.push(("caption".to_string(), caption.to_string()));
                }
                let created: Created = self
                    .get(HttpRequest::post(format!("{}/{}/media", self.api_base, account_id)).form(form))
                    .await?;
                created.id
            }
        };

        if options.media_urls.iter().any(|url| is_video(url)) {
            self.ensure_container_ready(&container_id).await?;
        }
        self.publish(session, &container_id).await
    }

    async fn submit_engagement(&self, options: &EngagementOptions) -> PlatformResult<()> {
        let edge = match options.action {
            EngagementAction::Comment => "comments",
            EngagementAction::Reply => "replies",
            other => return Err(PlatformError::unsupported(PlatformKind::Instagram, other.as_str())),
        };

        let message = options.comment_text.clone().unwrap_or_default();
        let post_id = urlencoding::encode(&options.post_id);
        let request = HttpRequest::post(format!("{}/{}/{}", self.api_base, post_id, edge))
            .form(vec![("message".to_string(), message)]);
        let created: Created = self.get(request).await?;

        info!(action = %options.action, id = %created.id, "Engaged on Instagram");
        Ok(())
    }

    async fn run_search(&self, options: &SearchOptions) -> PlatformResult<Vec<Post>> {
        let session = self.session()?;
        let tag = hashtag(&options.query)?;
        let limit = options.limit.unwrap_or(DEFAULT_LIMIT);

        let hashtags: IdList = self
            .get(
                HttpRequest::get(format!("{}/ig_hashtag_search", self.api_base))
                    .query("user_id", session.account_id.clone())
                    .query("q", tag),
            )
            .await?;

        let Some(hashtag_id) = hashtags.data.into_iter().next().map(|h| h.id) else {
            warn!(tag, "Instagram knows no such hashtag");
            return Ok(Vec::new());
        };

        let page: MediaPage = self
            .get(
                HttpRequest::get(format!("{}/{}/recent_media", self.api_base, hashtag_id))
                    .query("user_id", session.account_id.clone())
                    .query("fields", HASHTAG_MEDIA_FIELDS)
                    .query("limit", limit.min(HASHTAG_PAGE_MAX).to_string()),
            )
            .await?;

        // Hashtag results never disclose the author
        Ok(page
            .data
            .into_iter()
            .map(|media| media.into_post(User::undisclosed()))
            .filter(|post| options.in_window(post.timestamp))
            .take(limit as usize)
            .collect())
    }
}

// ============================================================================
// Vendor payloads
// ============================================================================

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TokenOwner {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    status_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdList {
    #[serde(default)]
    data: Vec<Created>,
}

#[derive(Debug, Deserialize)]
struct ApiProfile {
    id: String,
    username: Option<String>,
    name: Option<String>,
    profile_picture_url: Option<String>,
    biography: Option<String>,
    followers_count: Option<u64>,
    follows_count: Option<u64>,
}

impl ApiProfile {
    fn into_user(self) -> User {
        let handle = self.username.unwrap_or_default();
        User {
            id: self.id,
            display_name: self.name.unwrap_or_else(|| handle.clone()),
            handle,
            avatar_url: self.profile_picture_url,
            bio: self.biography.filter(|b| !b.is_empty()),
            follower_count: self.followers_count,
            following_count: self.follows_count,
            verified: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiMedia {
    id: String,
    caption: Option<String>,
    media_url: Option<String>,
    thumbnail_url: Option<String>,
    permalink: Option<String>,
    timestamp: Option<String>,
    like_count: Option<u64>,
    comments_count: Option<u64>,
}

impl ApiMedia {
    fn into_post(self, author: User) -> Post {
        Post {
            id: self.id,
            platform: PlatformKind::Instagram,
            author,
            content: self.caption.unwrap_or_default(),
            timestamp: self
                .timestamp
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or_else(Utc::now),
            media_urls: self.media_url.or(self.thumbnail_url).into_iter().collect(),
            like_count: self.like_count,
            comment_count: self.comments_count,
            share_count: None,
            permalink: self.permalink,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MediaPage {
    #[serde(default)]
    data: Vec<ApiMedia>,
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    cursors: Option<Cursors>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Cursors {
    after: Option<String>,
}

impl MediaPage {
    /// The `after` cursor only leads somewhere when a `next` link is present
    fn next_cursor(&self) -> Option<String> {
        let paging = self.paging.as_ref()?;
        paging.next.as_ref()?;
        paging.cursors.as_ref()?.after.clone()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorEnvelope {
    error: Option<GraphError>,
}

#[derive(Debug, Default, Deserialize)]
struct GraphError {
    message: Option<String>,
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<i64>,
    error_subcode: Option<i64>,
    error_user_msg: Option<String>,
}
