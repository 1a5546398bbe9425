//! Platform resolution and multi-platform dispatch
//!
//! The dispatcher turns platform names into authenticated adapters and runs
//! an operation against several platforms at once. Each platform gets its own
//! adapter and its own HTTP transport; nothing is pooled or cached beyond one
//! call. One platform failing never stops another, and the result reports
//! every platform separately.

use futures::future::join_all;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{PlatformError, PlatformResult, Result, TricastError};
use crate::http::{HttpTransport, ReqwestTransport};
use crate::platforms::{
    self, instagram::InstagramClient, linkedin::LinkedInClient, twitter::TwitterClient, Platform,
};
use crate::types::{
    EngagementOptions, Feed, FeedOptions, PlatformKind, Post, PostOptions, SearchOptions, User,
};

/// What happened on one platform
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformOutcome<T> {
    pub platform: PlatformKind,
    pub result: std::result::Result<T, PlatformError>,
}

impl<T> PlatformOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Serialized as `{platform, success, result}` or `{platform, success, error}`
impl<T: Serialize> Serialize for PlatformOutcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PlatformOutcome", 3)?;
        state.serialize_field("platform", &self.platform)?;
        state.serialize_field("success", &self.is_success())?;
        match &self.result {
            Ok(value) => state.serialize_field("result", value)?,
            Err(error) => state.serialize_field("error", &error.report())?,
        }
        state.end()
    }
}

/// Per-platform results of a multi-platform operation
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DispatchReport<T> {
    pub outcomes: Vec<PlatformOutcome<T>>,
}

impl<T> DispatchReport<T> {
    pub fn succeeded(&self) -> impl Iterator<Item = (PlatformKind, &T)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|value| (o.platform, value)))
    }

    pub fn failed(&self) -> impl Iterator<Item = (PlatformKind, &PlatformError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|error| (o.platform, error)))
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(PlatformOutcome::is_success)
    }

    pub fn any_succeeded(&self) -> bool {
        self.outcomes.iter().any(PlatformOutcome::is_success)
    }

    /// 0 when every platform succeeded, otherwise the first failure's code
    pub fn exit_code(&self) -> i32 {
        self.failed()
            .next()
            .map(|(_, error)| error.exit_code())
            .unwrap_or(0)
    }
}

pub struct Dispatcher {
    config: Config,
    /// Replaces the per-adapter reqwest transport (tests)
    transport: Option<Arc<dyn HttpTransport>>,
}

impl Dispatcher {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transport: None,
        }
    }

    /// Route every adapter through `transport` instead of the network
    pub fn with_transport(config: Config, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config,
            transport: Some(transport),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve one platform name or alias
    pub fn resolve(name: &str) -> Result<PlatformKind> {
        name.parse()
    }

    /// Resolve names in order, dropping duplicates
    ///
    /// With no names, falls back to `defaults.platforms` and then to every
    /// platform that has a config section.
    pub fn resolve_all<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<PlatformKind>> {
        let mut resolved = Vec::new();

        let kinds = if names.is_empty() {
            if self.config.defaults.platforms.is_empty() {
                self.config.configured_platforms()
            } else {
                self.config
                    .defaults
                    .platforms
                    .iter()
                    .map(|name| Self::resolve(name))
                    .collect::<Result<Vec<_>>>()?
            }
        } else {
            names
                .iter()
                .map(|name| Self::resolve(name.as_ref()))
                .collect::<Result<Vec<_>>>()?
        };

        for kind in kinds {
            if !resolved.contains(&kind) {
                resolved.push(kind);
            }
        }

        if resolved.is_empty() {
            return Err(TricastError::InvalidInput(
                "No platforms selected and none configured. Pass --platform or add a \
                 [twitter], [instagram] or [linkedin] section to the config file"
                    .to_string(),
            ));
        }

        Ok(resolved)
    }

    fn transport(&self, platform: PlatformKind) -> PlatformResult<Arc<dyn HttpTransport>> {
        if let Some(transport) = &self.transport {
            return Ok(transport.clone());
        }

        // A fresh client per adapter; adapters never share connections
        let transport = ReqwestTransport::new(self.config.http.timeout())
            .map_err(|e| crate::classify::classify_transport(platform, &e))?;
        Ok(Arc::new(transport))
    }

    /// Construct an unauthenticated adapter from its config section
    pub fn build(&self, platform: PlatformKind) -> PlatformResult<Box<dyn Platform>> {
        let missing = || {
            PlatformError::AuthenticationFailed(format!(
                "No credentials configured for {}. Add a [{}] section to the config file",
                platform.display_name(),
                platform.as_str()
            ))
        };

        let adapter: Box<dyn Platform> = match platform {
            PlatformKind::Twitter => {
                let config = self.config.twitter.clone().ok_or_else(missing)?;
                Box::new(TwitterClient::new(config, self.transport(platform)?))
            }
            PlatformKind::Instagram => {
                let config = self.config.instagram.clone().ok_or_else(missing)?;
                Box::new(InstagramClient::new(config, self.transport(platform)?))
            }
            PlatformKind::LinkedIn => {
                let config = self.config.linkedin.clone().ok_or_else(missing)?;
                Box::new(LinkedInClient::new(config, self.transport(platform)?))
            }
        };

        Ok(adapter)
    }

    /// Construct and authenticate an adapter
    pub async fn connect(&self, platform: PlatformKind) -> PlatformResult<Box<dyn Platform>> {
        let mut adapter = self.build(platform)?;
        adapter.authenticate().await?;
        Ok(adapter)
    }

    /// Run `op` on every target concurrently
    ///
    /// `preflight` runs before connecting, so requests a platform cannot
    /// serve fail without any network traffic.
    async fn fan_out<T, P, F, Fut>(
        &self,
        targets: &[PlatformKind],
        preflight: P,
        op: F,
    ) -> DispatchReport<T>
    where
        P: Fn(PlatformKind) -> PlatformResult<()>,
        F: Fn(Box<dyn Platform>) -> Fut,
        Fut: Future<Output = PlatformResult<T>>,
    {
        let preflight = &preflight;
        let op = &op;

        let futures = targets.iter().map(|&platform| async move {
            let result = match preflight(platform) {
                Ok(()) => match self.connect(platform).await {
                    Ok(adapter) => op(adapter).await,
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };

            match &result {
                Ok(_) => info!(platform = %platform, "Platform operation succeeded"),
                Err(e) => warn!(platform = %platform, kind = %e.kind(), "Platform operation failed: {}", e),
            }

            PlatformOutcome { platform, result }
        });

        DispatchReport {
            outcomes: join_all(futures).await,
        }
    }

    /// Publish the same content everywhere
    pub async fn cross_post(
        &self,
        targets: &[PlatformKind],
        options: &PostOptions,
    ) -> DispatchReport<Post> {
        self.fan_out(
            targets,
            |platform| platforms::check_post(platform, options),
            |adapter| async move { adapter.create_post(options).await },
        )
        .await
    }

    pub async fn feed_all(
        &self,
        targets: &[PlatformKind],
        options: &FeedOptions,
    ) -> DispatchReport<Feed> {
        self.fan_out(
            targets,
            |_| platforms::check_feed(options),
            |adapter| async move { adapter.list_feed(options).await },
        )
        .await
    }

    pub async fn search_all(
        &self,
        targets: &[PlatformKind],
        options: &SearchOptions,
    ) -> DispatchReport<Vec<Post>> {
        self.fan_out(
            targets,
            |platform| platforms::check_search(platform, options),
            |adapter| async move { adapter.search(options).await },
        )
        .await
    }

    pub async fn identify_all(&self, targets: &[PlatformKind]) -> DispatchReport<User> {
        self.fan_out(
            targets,
            |_| Ok(()),
            |adapter| async move { adapter.identify().await },
        )
        .await
    }

    /// Engage on one platform; a post id only means something on its own platform
    pub async fn engage(
        &self,
        platform: PlatformKind,
        options: &EngagementOptions,
    ) -> PlatformResult<()> {
        platforms::check_engagement(platform, options)?;
        let adapter = self.connect(platform).await?;
        adapter.engage(options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::http::mock::MockTransport;
    use crate::http::{HttpResponse, Method};
    use crate::types::EngagementAction;
    use serde_json::json;

    const CONFIG: &str = r#"
[defaults]
platforms = ["x", "li", "twitter"]

[twitter]
api_key = "key"
api_secret = "secret"
access_token = "token"
access_token_secret = "token-secret"

[linkedin]
access_token = "li-token"
"#;

    fn dispatcher(mock: Arc<MockTransport>) -> Dispatcher {
        Dispatcher::with_transport(Config::from_toml_str(CONFIG).unwrap(), mock)
    }

    #[test]
    fn test_resolve_all_dedupes_and_keeps_order() {
        let dispatcher = dispatcher(Arc::new(MockTransport::new()));
        let kinds = dispatcher.resolve_all(&["li", "x", "linkedin"]).unwrap();
        assert_eq!(kinds, vec![PlatformKind::LinkedIn, PlatformKind::Twitter]);
    }

    #[test]
    fn test_resolve_all_uses_defaults() {
        let dispatcher = dispatcher(Arc::new(MockTransport::new()));
        let kinds = dispatcher.resolve_all::<&str>(&[]).unwrap();
        assert_eq!(kinds, vec![PlatformKind::Twitter, PlatformKind::LinkedIn]);
    }

    #[test]
    fn test_resolve_all_falls_back_to_configured() {
        let config = Config::from_toml_str("[linkedin]\naccess_token = \"t\"").unwrap();
        let dispatcher = Dispatcher::with_transport(config, Arc::new(MockTransport::new()));
        assert_eq!(
            dispatcher.resolve_all::<&str>(&[]).unwrap(),
            vec![PlatformKind::LinkedIn]
        );

        let dispatcher = Dispatcher::new(Config::default());
        let err = dispatcher.resolve_all::<&str>(&[]).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_resolve_unknown_name() {
        let dispatcher = dispatcher(Arc::new(MockTransport::new()));
        let err = dispatcher.resolve_all(&["twitter", "friendster"]).unwrap_err();
        assert!(err.to_string().contains("friendster"));
    }

    #[tokio::test]
    async fn test_missing_section_fails_without_requests() {
        let mock = Arc::new(MockTransport::new());
        let dispatcher = dispatcher(mock.clone());

        let report = dispatcher.identify_all(&[PlatformKind::Instagram]).await;
        let (platform, error) = report.failed().next().unwrap();
        assert_eq!(platform, PlatformKind::Instagram);
        assert_eq!(error.kind(), ErrorKind::AuthenticationFailed);
        assert!(error.to_string().contains("[instagram]"));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_search_preflight_skips_network() {
        let mock = Arc::new(MockTransport::new());
        let dispatcher = dispatcher(mock.clone());

        let report = dispatcher
            .search_all(&[PlatformKind::LinkedIn], &SearchOptions::new("rust"))
            .await;
        assert_eq!(report.exit_code(), 6);
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_engage_preflight() {
        let mock = Arc::new(MockTransport::new());
        let dispatcher = dispatcher(mock.clone());

        let err = dispatcher
            .engage(
                PlatformKind::LinkedIn,
                &EngagementOptions::new("1", EngagementAction::Retweet),
            )
            .await
            .unwrap_err();
        assert_eq!(err, PlatformError::unsupported(PlatformKind::LinkedIn, "retweet"));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_report_serialization() {
        let mock = Arc::new(
            MockTransport::new()
                .on(
                    Method::Get,
                    "/2/users/me",
                    HttpResponse::json_value(429, json!({"title": "Too Many Requests"}))
                        .with_header("x-rate-limit-reset", "1900000000"),
                )
                .on(
                    Method::Get,
                    "/v2/userinfo",
                    HttpResponse::json_value(200, json!({"sub": "abc", "name": "Ada"})),
                ),
        );
        let dispatcher = dispatcher(mock);

        let report = dispatcher
            .identify_all(&[PlatformKind::Twitter, PlatformKind::LinkedIn])
            .await;
        assert!(report.any_succeeded());
        assert!(!report.all_succeeded());
        assert_eq!(report.exit_code(), 5);

        let value = serde_json::to_value(&report).unwrap();
        let outcomes = value["outcomes"].as_array().unwrap();
        assert_eq!(outcomes[0]["platform"], "twitter");
        assert_eq!(outcomes[0]["success"], false);
        assert_eq!(outcomes[0]["error"]["kind"], "rate_limited");
        assert_eq!(outcomes[0]["error"]["retryable"], true);
        assert_eq!(outcomes[0]["error"]["reset_at"], "2030-03-17T17:46:40Z");
        assert_eq!(outcomes[1]["platform"], "linkedin");
        assert_eq!(outcomes[1]["success"], true);
        assert_eq!(outcomes[1]["result"]["display_name"], "Ada");
        assert!(outcomes[1].get("error").is_none());
    }
}
