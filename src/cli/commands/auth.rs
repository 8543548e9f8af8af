use anyhow::{bail, Context, Result};
use clap::{Arg, ArgMatches, Command};
use url::Url;

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_RESET_TOKEN_TTL_SECONDS: &str = "reset-token-ttl-seconds";
pub const ARG_OUTBOX_POLL_SECONDS: &str = "email-outbox-poll-seconds";
pub const ARG_OUTBOX_BATCH_SIZE: &str = "email-outbox-batch-size";
pub const ARG_OUTBOX_MAX_ATTEMPTS: &str = "email-outbox-max-attempts";
pub const ARG_OUTBOX_BACKOFF_BASE_SECONDS: &str = "email-outbox-backoff-base-seconds";
pub const ARG_OUTBOX_BACKOFF_MAX_SECONDS: &str = "email-outbox-backoff-max-seconds";

#[derive(Debug)]
pub struct OutboxOptions {
    pub poll_seconds: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub reset_token_ttl_seconds: i64,
    pub email_outbox: OutboxOptions,
}

impl Options {
    /// Parse auth and outbox arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the frontend URL is not an absolute http(s) URL or
    /// the reset token TTL is not positive.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .context("missing required argument: --frontend-base-url")?;
        let parsed = Url::parse(&frontend_base_url)
            .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            bail!("Frontend base URL must be http(s) with a host: {frontend_base_url}");
        }

        let reset_token_ttl_seconds = matches
            .get_one::<i64>(ARG_RESET_TOKEN_TTL_SECONDS)
            .copied()
            .unwrap_or(crate::auth::DEFAULT_RESET_TOKEN_TTL_SECONDS);
        if reset_token_ttl_seconds <= 0 {
            bail!("--{ARG_RESET_TOKEN_TTL_SECONDS} must be greater than zero");
        }

        let u64_arg = |id: &str, default: u64| matches.get_one::<u64>(id).copied().unwrap_or(default);

        Ok(Self {
            frontend_base_url: frontend_base_url.trim_end_matches('/').to_string(),
            reset_token_ttl_seconds,
            email_outbox: OutboxOptions {
                poll_seconds: u64_arg(ARG_OUTBOX_POLL_SECONDS, 5),
                batch_size: matches
                    .get_one::<usize>(ARG_OUTBOX_BATCH_SIZE)
                    .copied()
                    .unwrap_or(10),
                max_attempts: matches
                    .get_one::<u32>(ARG_OUTBOX_MAX_ATTEMPTS)
                    .copied()
                    .unwrap_or(5),
                backoff_base_seconds: u64_arg(ARG_OUTBOX_BACKOFF_BASE_SECONDS, 5),
                backoff_max_seconds: u64_arg(ARG_OUTBOX_BACKOFF_MAX_SECONDS, 300),
            },
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_reset_args(command);
    with_outbox_args(command)
}

fn with_reset_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for password reset links")
                .env("KEYTURN_FRONTEND_BASE_URL")
                .default_value("https://keyturn.dev"),
        )
        .arg(
            Arg::new(ARG_RESET_TOKEN_TTL_SECONDS)
                .long(ARG_RESET_TOKEN_TTL_SECONDS)
                .help("Password reset token TTL in seconds")
                .env("KEYTURN_RESET_TOKEN_TTL_SECONDS")
                .default_value("7200")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_outbox_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OUTBOX_POLL_SECONDS)
                .long(ARG_OUTBOX_POLL_SECONDS)
                .help("Email outbox poll interval in seconds")
                .env("KEYTURN_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_OUTBOX_BATCH_SIZE)
                .long(ARG_OUTBOX_BATCH_SIZE)
                .help("Email outbox batch size per poll")
                .env("KEYTURN_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_OUTBOX_MAX_ATTEMPTS)
                .long(ARG_OUTBOX_MAX_ATTEMPTS)
                .help("Max attempts before marking an email as failed")
                .env("KEYTURN_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_OUTBOX_BACKOFF_BASE_SECONDS)
                .long(ARG_OUTBOX_BACKOFF_BASE_SECONDS)
                .help("Base delay for email outbox retry backoff")
                .env("KEYTURN_EMAIL_OUTBOX_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_OUTBOX_BACKOFF_MAX_SECONDS)
                .long(ARG_OUTBOX_BACKOFF_MAX_SECONDS)
                .help("Max delay for email outbox retry backoff")
                .env("KEYTURN_EMAIL_OUTBOX_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}
