use clap::{Parser, Subcommand};
use grantstore::TokenKind;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Parser)]
#[command(name = "grantstore")]
#[command(about = "Operate an OAuth 2.0 authorization grant store")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true, env = "GRANTSTORE_CONFIG", default_value = "grantstore.toml")]
    pub config: String,

    /// Log level or filter directive (overrides config; RUST_LOG wins over both)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Delete grants whose access token has expired, once
    Sweep(SweepArgs),
    /// Run the periodic expiry sweeper until interrupted
    Run,
    /// Delete every grant of a client for one principal
    Revoke(RevokeArgs),
    /// Find the grant bound to a credential value
    Lookup(LookupArgs),
    /// Print the number of stored grants
    Count,
    /// Check the database connection and schema
    Status,
}

#[derive(clap::Args)]
pub struct SweepArgs {
    /// Delete grants whose access token expired before this RFC 3339 instant
    /// (defaults to now minus the configured grace)
    #[arg(long, value_parser = parse_rfc3339)]
    pub before: Option<OffsetDateTime>,
}

#[derive(clap::Args)]
pub struct RevokeArgs {
    /// Registered client id
    #[arg(long)]
    pub client: String,
    /// Principal name
    #[arg(long)]
    pub principal: String,
}

#[derive(clap::Args)]
pub struct LookupArgs {
    /// Credential value
    pub value: String,
    /// Credential kind: state, code, access or refresh (tries all if omitted)
    #[arg(long)]
    pub kind: Option<TokenKind>,
    /// Print credential values in full
    #[arg(long)]
    pub reveal: bool,
}

fn parse_rfc3339(s: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(s, &Rfc3339).map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}
