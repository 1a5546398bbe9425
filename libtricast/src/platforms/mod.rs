//! Platform abstraction and implementations
//!
//! Every network is an implementation of the [`Platform`] trait. The trait's
//! provided methods (`identify`, `list_feed`, `create_post`, `engage`,
//! `search`) are the capability contract callers use. They run the shared
//! preconditions once, before any network call:
//!
//! 1. the adapter must be authenticated (`AuthenticationFailed` otherwise)
//! 2. the platform must offer the action (`UnsupportedOperation` otherwise)
//! 3. the request options must be valid (`ValidationFailed` otherwise)
//!
//! and then hand over to the adapter's vendor step (`fetch_profile`,
//! `fetch_feed`, `submit_post`, `submit_engagement`, `run_search`).
//!
//! # Examples
//!
//! ```no_run
//! use libtricast::config::Config;
//! use libtricast::dispatcher::Dispatcher;
//! use libtricast::types::{PlatformKind, PostOptions};
//!
//! # async fn example() -> libtricast::error::Result<()> {
//! let dispatcher = Dispatcher::new(Config::load()?);
//! let platform = dispatcher.connect(PlatformKind::LinkedIn).await?;
//!
//! let post = platform.create_post(&PostOptions::text("Hello from tricast")).await?;
//! println!("Posted {} to {}", post.id, post.platform);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{PlatformError, PlatformResult};
use crate::types::{
    EngagementAction, EngagementOptions, Feed, FeedOptions, PlatformKind, Post, PostOptions,
    SearchOptions, User,
};

pub mod instagram;
pub mod linkedin;
pub mod twitter;

/// How a platform accepts media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaSupport {
    /// Local files are uploaded by the adapter
    Upload,
    /// Only publicly reachable URLs; the vendor fetches them itself
    PublicUrl,
    /// No media attachments
    None,
}

/// What a platform's API offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub search: bool,
    pub actions: &'static [EngagementAction],
    pub media: MediaSupport,
    /// Posts must carry media
    pub requires_media: bool,
    pub max_media: usize,
    pub links: bool,
    pub character_limit: usize,
}

impl Capabilities {
    pub fn of(platform: PlatformKind) -> Self {
        match platform {
            PlatformKind::Twitter => twitter::CAPABILITIES,
            PlatformKind::Instagram => instagram::CAPABILITIES,
            PlatformKind::LinkedIn => linkedin::CAPABILITIES,
        }
    }

    pub fn supports(&self, action: EngagementAction) -> bool {
        self.actions.contains(&action)
    }
}

/// Check a post request against a platform's capabilities
pub fn check_post(platform: PlatformKind, options: &PostOptions) -> PlatformResult<()> {
    let caps = Capabilities::of(platform);
    let name = platform.display_name();

    options.validate()?;

    if caps.requires_media && !options.has_media() {
        return Err(PlatformError::unsupported(platform, "text-only post"));
    }

    if options.link_url.is_some() && !caps.links {
        return Err(PlatformError::unsupported(platform, "link attachment"));
    }

    if options.has_media() {
        match caps.media {
            MediaSupport::None => {
                return Err(PlatformError::ValidationFailed(format!(
                    "{} posts cannot carry media attachments",
                    name
                )));
            }
            MediaSupport::PublicUrl if options.media_path.is_some() => {
                return Err(PlatformError::ValidationFailed(format!(
                    "{} requires publicly reachable media URLs; upload the file somewhere public \
                     and pass its URL instead of a local path",
                    name
                )));
            }
            MediaSupport::Upload if !options.media_urls.is_empty() => {
                return Err(PlatformError::ValidationFailed(format!(
                    "{} cannot attach remote media URLs; pass a local media path",
                    name
                )));
            }
            _ => {}
        }

        if options.media_count() > caps.max_media {
            return Err(PlatformError::ValidationFailed(format!(
                "{} allows at most {} media items per post (got {})",
                name,
                caps.max_media,
                options.media_count()
            )));
        }
    }

    let chars = options.body().chars().count();
    if chars > caps.character_limit {
        return Err(PlatformError::ValidationFailed(format!(
            "Content exceeds {}'s {} character limit (current: {} characters)",
            name, caps.character_limit, chars
        )));
    }

    Ok(())
}

pub fn check_engagement(platform: PlatformKind, options: &EngagementOptions) -> PlatformResult<()> {
    if !Capabilities::of(platform).supports(options.action) {
        return Err(PlatformError::unsupported(platform, options.action.as_str()));
    }
    options.validate()
}

pub fn check_search(platform: PlatformKind, options: &SearchOptions) -> PlatformResult<()> {
    if !Capabilities::of(platform).search {
        return Err(PlatformError::unsupported(platform, "search"));
    }
    options.validate()
}

pub fn check_feed(options: &FeedOptions) -> PlatformResult<()> {
    options.validate()
}

/// Configured API root without a trailing slash
pub(crate) fn api_base(base_url: Option<&str>, default: &str) -> String {
    base_url
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

/// Platform trait for unified social media platform interactions
///
/// Implementations own their HTTP transport and session exclusively. The
/// session is created by `authenticate` and replaced wholesale, never patched.
#[async_trait]
pub trait Platform: Send + Sync {
    fn kind(&self) -> PlatformKind;

    /// Lowercase identifier (e.g., "twitter", "instagram", "linkedin")
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::of(self.kind())
    }

    fn is_authenticated(&self) -> bool;

    /// Establish and validate a session
    ///
    /// Must succeed before any other operation. Calling it again while a
    /// session exists is a no-op.
    ///
    /// # Errors
    ///
    /// `AuthenticationFailed` when credentials are missing, incomplete or
    /// rejected; other kinds when the vendor fails for another reason.
    async fn authenticate(&mut self) -> PlatformResult<()>;

    // ========================================================================
    // Vendor steps
    //
    // Called only through the contract methods below, after the shared
    // preconditions have passed.
    // ========================================================================

    async fn fetch_profile(&self) -> PlatformResult<User>;

    async fn fetch_feed(&self, options: &FeedOptions) -> PlatformResult<Feed>;

    async fn submit_post(&self, options: &PostOptions) -> PlatformResult<Post>;

    async fn submit_engagement(&self, options: &EngagementOptions) -> PlatformResult<()>;

    /// Platforms without search keep this default; the contract rejects
    /// search before it is reached.
    async fn run_search(&self, _options: &SearchOptions) -> PlatformResult<Vec<Post>> {
        Err(PlatformError::unsupported(self.kind(), "search"))
    }

    // ========================================================================
    // Capability contract
    // ========================================================================

    fn ensure_authenticated(&self) -> PlatformResult<()> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(PlatformError::AuthenticationFailed(format!(
                "Not authenticated with {}; call authenticate() first",
                self.kind().display_name()
            )))
        }
    }

    /// The authenticated account's own profile; doubles as a liveness probe
    async fn identify(&self) -> PlatformResult<User> {
        self.ensure_authenticated()?;
        self.fetch_profile().await
    }

    /// The platform's notion of "my feed"; ordering is platform-defined
    async fn list_feed(&self, options: &FeedOptions) -> PlatformResult<Feed> {
        self.ensure_authenticated()?;
        check_feed(options)?;
        self.fetch_feed(options).await
    }

    /// Publish content
    ///
    /// # Errors
    ///
    /// `UnsupportedOperation` when the platform mandates media and none was
    /// given, `ValidationFailed` for invalid content.
    async fn create_post(&self, options: &PostOptions) -> PlatformResult<Post> {
        self.ensure_authenticated()?;
        check_post(self.kind(), options)?;
        self.submit_post(options).await
    }

    /// Like, comment, share, retweet or reply
    ///
    /// # Errors
    ///
    /// `UnsupportedOperation` naming the action when the platform's API does
    /// not offer it.
    async fn engage(&self, options: &EngagementOptions) -> PlatformResult<()> {
        self.ensure_authenticated()?;
        check_engagement(self.kind(), options)?;
        self.submit_engagement(options).await
    }

    /// # Errors
    ///
    /// `UnsupportedOperation` where the vendor offers no general search.
    async fn search(&self, options: &SearchOptions) -> PlatformResult<Vec<Post>> {
        self.ensure_authenticated()?;
        check_search(self.kind(), options)?;
        self.run_search(options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_api_base() {
        assert_eq!(api_base(None, "https://api.example.com"), "https://api.example.com");
        assert_eq!(api_base(Some("http://localhost:9000/"), "x"), "http://localhost:9000");
        assert_eq!(api_base(Some("  "), "https://api.example.com"), "https://api.example.com");
    }

    #[test]
    fn test_capability_matrix() {
        let twitter = Capabilities::of(PlatformKind::Twitter);
        assert!(twitter.search);
        assert!(EngagementAction::ALL.iter().all(|a| twitter.supports(*a)));

        let instagram = Capabilities::of(PlatformKind::Instagram);
        assert!(instagram.search);
        assert!(instagram.requires_media);
        assert!(!instagram.supports(EngagementAction::Like));
        assert!(instagram.supports(EngagementAction::Comment));

        let linkedin = Capabilities::of(PlatformKind::LinkedIn);
        assert!(!linkedin.search);
        assert!(linkedin.supports(EngagementAction::Share));
        assert!(!linkedin.supports(EngagementAction::Retweet));
    }

    #[test]
    fn test_unsupported_before_validation() {
        // An unsupported action is reported even when its input is also invalid
        let options = EngagementOptions::new("", EngagementAction::Like);
        let err = check_engagement(PlatformKind::Instagram, &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
        assert!(err.to_string().contains("like"));
    }

    #[test]
    fn test_search_unsupported_on_linkedin() {
        let err = check_search(PlatformKind::LinkedIn, &SearchOptions::new("rust")).unwrap_err();
        assert_eq!(err, PlatformError::unsupported(PlatformKind::LinkedIn, "search"));
    }

    #[test]
    fn test_instagram_requires_media() {
        let err = check_post(PlatformKind::Instagram, &PostOptions::text("hello")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
        assert!(err.to_string().contains("text-only post"));
    }

    #[test]
    fn test_instagram_rejects_local_media() {
        let options = PostOptions {
            media_path: Some("/tmp/photo.jpg".to_string()),
            ..PostOptions::text("hello")
        };
        let err = check_post(PlatformKind::Instagram, &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert!(err.to_string().contains("publicly reachable"));
    }

    #[test]
    fn test_twitter_rejects_remote_media() {
        let options = PostOptions {
            media_urls: vec!["https://cdn.example.com/a.png".to_string()],
            ..PostOptions::text("hello")
        };
        let err = check_post(PlatformKind::Twitter, &options).unwrap_err();
        assert!(err.to_string().contains("local media path"));
    }

    #[test]
    fn test_linkedin_rejects_media() {
        let options = PostOptions {
            media_urls: vec!["https://cdn.example.com/a.png".to_string()],
            ..PostOptions::text("hello")
        };
        let err = check_post(PlatformKind::LinkedIn, &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    }

    #[test]
    fn test_instagram_rejects_links() {
        let options = PostOptions {
            media_urls: vec!["https://cdn.example.com/a.png".to_string()],
            link_url: Some("https://example.com".to_string()),
            ..PostOptions::text("hello")
        };
        let err = check_post(PlatformKind::Instagram, &options).unwrap_err();
        assert!(err.to_string().contains("link attachment"));
    }

    #[test]
    fn test_character_limits() {
        let exactly = PostOptions::text("a".repeat(280));
        assert!(check_post(PlatformKind::Twitter, &exactly).is_ok());

        let over = PostOptions::text("a".repeat(281));
        let err = check_post(PlatformKind::Twitter, &over).unwrap_err();
        assert!(err.to_string().contains("280 character limit"));
        assert!(err.to_string().contains("281 characters"));

        assert!(check_post(PlatformKind::LinkedIn, &over).is_ok());
    }

    #[test]
    fn test_too_many_media() {
        let options = PostOptions {
            media_urls: (0..11)
                .map(|i| format!("https://cdn.example.com/{}.jpg", i))
                .collect(),
            ..Default::default()
        };
        let err = check_post(PlatformKind::Instagram, &options).unwrap_err();
        assert!(err.to_string().contains("at most 10"));
    }
}
