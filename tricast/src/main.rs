//! tricast - post, read, search and engage on Twitter, Instagram and LinkedIn

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;

use libtricast::logging::LoggingConfig;
use libtricast::platforms::MediaSupport;
use libtricast::{
    Capabilities, Config, DispatchReport, Dispatcher, EngagementAction, EngagementOptions,
    ErrorKind, Feed, FeedOptions, PlatformError, PlatformKind, PlatformOutcome, Post, PostOptions,
    SearchOptions, TricastError, User,
};

#[derive(Parser, Debug)]
#[command(name = "tricast")]
#[command(version, about = "One command surface for Twitter, Instagram and LinkedIn")]
#[command(long_about = r##"Post, read, search and engage across Twitter (X), Instagram and LinkedIn.

EXAMPLES:
    # Who am I on every configured platform?
    tricast whoami

    # Cross-post to two platforms
    tricast post -p x,li "Shipping tricast 0.1 today"
    echo "Hello from a pipe" | tricast post -p linkedin

    # Instagram needs publicly reachable media
    tricast post -p ig --caption "Sunset" --media-url https://cdn.example.com/sunset.jpg

    # Like a tweet, comment on a LinkedIn share
    tricast engage -p x 1790000000000000000 like
    tricast engage -p li urn:li:share:6844785523593134080 comment --text "Congrats!"

    # Search recent posts
    tricast search -p twitter,instagram "#rustlang" --since 2025-10-01

    # What can each platform do?
    tricast capabilities

PLATFORMS:
    twitter (x), instagram (ig), linkedin (li)

EXIT CODES:
    0 - Success on every platform
    1 - Unknown error
    2 - Authentication failed
    3 - Invalid input or validation failed
    4 - Permission denied
    5 - Rate limited or quota exhausted
    6 - Operation not supported by the platform
"##)]
struct Cli {
    /// Config file (default: ~/.config/tricast/config.toml)
    #[arg(short, long, global = true, env = "TRICAST_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "text", value_name = "FORMAT")]
    #[arg(value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the authenticated account on each platform
    Whoami {
        /// Target platform(s), comma-separated
        #[arg(short, long, value_delimiter = ',')]
        platform: Vec<String>,
    },

    /// Read your feed
    Feed {
        #[arg(short, long, value_delimiter = ',')]
        platform: Vec<String>,

        /// Maximum posts per platform
        #[arg(short, long, value_name = "N")]
        limit: Option<u32>,

        /// Cursor from a previous page (single platform only)
        #[arg(long)]
        cursor: Option<String>,
    },

    /// Publish a post (reads from stdin if no content is given)
    Post {
        /// Post text
        content: Option<String>,

        #[arg(short, long, value_delimiter = ',')]
        platform: Vec<String>,

        /// Caption, used when no text is given
        #[arg(long)]
        caption: Option<String>,

        /// Local media file to upload
        #[arg(long, value_name = "PATH")]
        media: Option<String>,

        /// Publicly reachable media URL (repeatable)
        #[arg(long = "media-url", value_name = "URL")]
        media_urls: Vec<String>,

        /// Link to attach
        #[arg(long, value_name = "URL")]
        link: Option<String>,

        /// Title for the attached link
        #[arg(long, requires = "link")]
        link_title: Option<String>,
    },

    /// Like, comment, share, retweet or reply
    Engage {
        /// Platform the post lives on
        #[arg(short, long)]
        platform: String,

        post_id: String,

        /// like, comment, share, retweet or reply
        action: String,

        /// Comment or reply text
        #[arg(short, long)]
        text: Option<String>,
    },

    /// Search recent posts
    Search {
        query: String,

        #[arg(short, long, value_delimiter = ',')]
        platform: Vec<String>,

        #[arg(short, long, value_name = "N")]
        limit: Option<u32>,

        /// Only posts at or after this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        since: Option<String>,

        /// Only posts before this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        until: Option<String>,
    },

    /// Show what each platform supports
    Capabilities {
        #[arg(short, long, value_delimiter = ',')]
        platform: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();
    tracing::debug!("tricast started with args: {:?}", cli);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(exit_code(&e));
        }
    }
}

fn exit_code(error: &anyhow::Error) -> i32 {
    if let Some(e) = error.downcast_ref::<TricastError>() {
        e.exit_code()
    } else if let Some(e) = error.downcast_ref::<PlatformError>() {
        e.exit_code()
    } else {
        1
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => {
            let path = libtricast::config::resolve_config_path()?;
            if path.exists() {
                Ok(Config::load_from_path(&path)?)
            } else {
                tracing::debug!("No config file at {}, using empty config", path.display());
                Ok(Config::default())
            }
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let json = cli.format == "json";

    if let Command::Capabilities { platform } = &cli.command {
        let targets = if platform.is_empty() {
            PlatformKind::ALL.to_vec()
        } else {
            Dispatcher::new(Config::default()).resolve_all(platform)?
        };
        print_capabilities(&targets, json)?;
        return Ok(0);
    }

    let config = load_config(cli.config.as_ref())?;
    let dispatcher = Dispatcher::new(config);

    match cli.command {
        Command::Whoami { platform } => {
            let targets = dispatcher.resolve_all(&platform)?;
            let report = dispatcher.identify_all(&targets).await;
            print_report(&report, json, print_user)
        }
        Command::Feed {
            platform,
            limit,
            cursor,
        } => {
            let targets = dispatcher.resolve_all(&platform)?;
            if cursor.is_some() && targets.len() > 1 {
                return Err(TricastError::InvalidInput(
                    "--cursor belongs to one platform's feed; pass a single --platform".to_string(),
                )
                .into());
            }
            let report = dispatcher
                .feed_all(&targets, &FeedOptions { limit, cursor })
                .await;
            print_report(&report, json, print_feed)
        }
        Command::Post {
            content,
            platform,
            caption,
            media,
            media_urls,
            link,
            link_title,
        } => {
            let text = match content {
                Some(text) => Some(text),
                None if caption.is_none() && media.is_none() && media_urls.is_empty() => {
                    Some(read_stdin()?)
                }
                None => None,
            };
            let options = PostOptions {
                text,
                caption,
                media_path: media,
                media_urls,
                link_url: link,
                link_title,
            };

            let targets = dispatcher.resolve_all(&platform)?;
            let report = dispatcher.cross_post(&targets, &options).await;
            print_report(&report, json, print_post)
        }
        Command::Engage {
            platform,
            post_id,
            action,
            text,
        } => {
            let platform = Dispatcher::resolve(&platform)?;
            let action: EngagementAction = action.parse()?;
            let mut options = EngagementOptions::new(post_id, action);
            options.comment_text = text;

            let outcome = PlatformOutcome {
                platform,
                result: dispatcher.engage(platform, &options).await,
            };
            let report = DispatchReport {
                outcomes: vec![outcome],
            };
            print_report(&report, json, |_| {
                println!("  {} {}", action.as_str(), options.post_id)
            })
        }
        Command::Search {
            query,
            platform,
            limit,
            since,
            until,
        } => {
            let options = SearchOptions {
                query,
                limit,
                since: since.as_deref().map(parse_date).transpose()?,
                until: until.as_deref().map(parse_date).transpose()?,
            };
            let targets = dispatcher.resolve_all(&platform)?;
            let report = dispatcher.search_all(&targets, &options).await;
            print_report(&report, json, |posts| {
                for post in posts {
                    print_post_line(post);
                }
                if posts.is_empty() {
                    println!("  (no results)");
                }
            })
        }
        Command::Capabilities { .. } => Ok(0),
    }
}

fn read_stdin() -> Result<String> {
    if atty::is(atty::Stream::Stdin) {
        return Err(TricastError::InvalidInput(
            "No content provided. Pass it as an argument or pipe it on stdin".to_string(),
        )
        .into());
    }

    let mut content = String::new();
    std::io::stdin()
        .read_to_string(&mut content)
        .context("Failed to read content from stdin")?;
    Ok(content.trim_end().to_string())
}

/// RFC 3339 timestamp or a bare date (midnight UTC)
fn parse_date(value: &str) -> std::result::Result<DateTime<Utc>, TricastError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|t| t.and_utc())
                .ok_or(())
        })
        .map_err(|_| {
            TricastError::InvalidInput(format!(
                "Invalid date '{}'. Use RFC 3339 (2025-10-01T09:00:00Z) or YYYY-MM-DD",
                value
            ))
        })
}

fn print_report<T: Serialize>(
    report: &DispatchReport<T>,
    json: bool,
    print_value: impl Fn(&T),
) -> Result<i32> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(report.exit_code());
    }

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(value) => {
                println!("✓ {}", outcome.platform);
                print_value(value);
            }
            Err(error) => {
                eprintln!("✗ {}: {}", outcome.platform, error.kind());
                for line in describe_error(error) {
                    eprintln!("  {}", line);
                }
            }
        }
    }

    Ok(report.exit_code())
}

/// Kind-specific guidance; never the raw vendor payload
fn describe_error(error: &PlatformError) -> Vec<String> {
    let report = error.report();
    let mut lines = vec![report.message];

    if let Some(remediation) = report.remediation {
        lines.push(format!("Fix: {}", remediation));
    }

    match (error.kind(), error.reset_at()) {
        (ErrorKind::RateLimited | ErrorKind::QuotaExhausted, Some(reset_at)) => {
            lines.push(format!(
                "Resets at {} ({})",
                reset_at.to_rfc3339(),
                time_until(reset_at)
            ));
        }
        (ErrorKind::QuotaExhausted, None) => lines.push(
            "No reset time is known. Check the plan and billing settings before retrying."
                .to_string(),
        ),
        (ErrorKind::UnsupportedOperation, _) => {
            lines.push("This will not succeed on retry.".to_string())
        }
        _ => {}
    }

    lines
}

fn time_until(instant: DateTime<Utc>) -> String {
    match (instant - Utc::now()).to_std() {
        Ok(remaining) => {
            let seconds = std::time::Duration::from_secs(remaining.as_secs());
            format!("in {}", humantime::format_duration(seconds))
        }
        Err(_) => "now".to_string(),
    }
}

fn print_user(user: &User) {
    println!("  @{} ({})", user.handle, user.display_name);
    println!("  id: {}", user.id);
    if let (Some(followers), Some(following)) = (user.follower_count, user.following_count) {
        println!("  {} followers, {} following", followers, following);
    }
}

fn print_post(post: &Post) {
    println!("  id: {}", post.id);
    if let Some(permalink) = &post.permalink {
        println!("  {}", permalink);
    }
}

fn print_feed(feed: &Feed) {
    for post in &feed.posts {
        print_post_line(post);
    }
    if feed.posts.is_empty() {
        println!("  (empty)");
    }
    if let Some(cursor) = &feed.next_cursor {
        println!("  next page: --cursor {}", cursor);
    }
}

fn print_post_line(post: &Post) {
    let preview: String = post.content.replace('\n', " ").chars().take(80).collect();
    let author = if post.author.handle.is_empty() {
        String::new()
    } else {
        format!("@{} ", post.author.handle)
    };
    println!(
        "  {} | {} | {}{}",
        post.timestamp.format("%Y-%m-%d %H:%M"),
        post.id,
        author,
        preview
    );
}

#[derive(Serialize)]
struct CapabilityRow {
    platform: PlatformKind,
    #[serde(flatten)]
    capabilities: Capabilities,
}

fn print_capabilities(targets: &[PlatformKind], json: bool) -> Result<()> {
    let rows: Vec<CapabilityRow> = targets
        .iter()
        .map(|&platform| CapabilityRow {
            platform,
            capabilities: Capabilities::of(platform),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for row in rows {
        let caps = row.capabilities;
        let actions: Vec<&str> = caps.actions.iter().map(|a| a.as_str()).collect();
        let media = match caps.media {
            MediaSupport::Upload => format!("upload (up to {})", caps.max_media),
            MediaSupport::PublicUrl => format!("public URLs (up to {})", caps.max_media),
            MediaSupport::None => "none".to_string(),
        };

        println!("{}", row.platform.display_name());
        println!("  actions:   {}", actions.join(", "));
        println!("  search:    {}", if caps.search { "yes" } else { "no" });
        println!(
            "  media:     {}{}",
            media,
            if caps.requires_media { ", required" } else { "" }
        );
        println!("  links:     {}", if caps.links { "yes" } else { "no" });
        println!("  max chars: {}", caps.character_limit);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2025-10-01").unwrap().to_rfc3339(),
            "2025-10-01T00:00:00+00:00"
        );
        assert_eq!(
            parse_date("2025-10-01T09:30:00+02:00").unwrap().to_rfc3339(),
            "2025-10-01T07:30:00+00:00"
        );
        assert_eq!(parse_date("last week").unwrap_err().exit_code(), 3);
    }

    #[test]
    fn test_describe_quota_without_reset() {
        let lines = describe_error(&PlatformError::QuotaExhausted {
            message: "Twitter: no credits".to_string(),
            reset_at: None,
        });
        assert_eq!(lines[0], "Twitter: no credits");
        assert!(lines[1].contains("billing"));
    }

    #[test]
    fn test_describe_rate_limit_shows_reset() {
        let reset_at = Utc::now() + chrono::Duration::minutes(15);
        let lines = describe_error(&PlatformError::RateLimited {
            message: "slow down".to_string(),
            reset_at,
        });
        assert!(lines[1].starts_with("Resets at"));
        assert!(lines[1].contains("in 14m") || lines[1].contains("in 15m"));
    }

    #[test]
    fn test_exit_code_from_anyhow() {
        let error: anyhow::Error = TricastError::InvalidInput("bad".to_string()).into();
        assert_eq!(exit_code(&error), 3);

        let error = anyhow::anyhow!("something else");
        assert_eq!(exit_code(&error), 1);
    }
}
