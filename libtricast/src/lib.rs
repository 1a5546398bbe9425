//! Tricast - one command surface for Twitter, Instagram and LinkedIn
//!
//! This library provides the platform abstraction: a unified data model, a
//! capability contract every network adapter satisfies, and one error
//! taxonomy that all three vendors' failures are translated into.

pub mod classify;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod logging;
pub mod platforms;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use dispatcher::{DispatchReport, Dispatcher, PlatformOutcome};
pub use error::{ErrorKind, PlatformError, PlatformResult, Result, TricastError};
pub use platforms::{Capabilities, Platform};
pub use types::{
    EngagementAction, EngagementOptions, Feed, FeedOptions, PlatformKind, Post, PostOptions,
    SearchOptions, User,
};
