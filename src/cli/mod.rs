//! Command-line interface for the tenancy core.

use crate::config::humantime_serde::parse_duration;
use crate::multitenancy::TenantTier;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Tenancy tooling: issue and inspect tenant tokens, show tier limits.
#[derive(Parser)]
#[command(name = "strata-tenancy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "TENANCY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "TENANCY_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Tenant token operations
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Show the quota buckets derived from a tier's defaults
    Limits {
        /// Tenant tier (free, pro, enterprise)
        #[arg(short, long, default_value = "free")]
        tier: TenantTier,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Validate and print the effective configuration
    Config,

    /// Show version information
    Version,
}

/// Token subcommands.
#[derive(Subcommand)]
pub enum TokenCommands {
    /// Issue an HS256 token for a tenant
    Issue {
        /// Tenant the token grants access to
        #[arg(short, long)]
        tenant: String,

        /// Subject claim
        #[arg(long)]
        sub: Option<String>,

        /// Issuer claim
        #[arg(long)]
        issuer: Option<String>,

        /// Validity (e.g. 30m, 1h); omit for a token without expiry
        #[arg(long, value_parser = parse_ttl)]
        ttl: Option<Duration>,

        /// Signing secret
        #[arg(long, env = "TENANCY_JWT_SECRET", hide_env_values = true)]
        secret: String,
    },

    /// Decode a token and verify it when a secret is given
    Inspect {
        /// The token
        token: String,

        /// Signing secret
        #[arg(long, env = "TENANCY_JWT_SECRET", hide_env_values = true)]
        secret: Option<String>,
    },
}

fn parse_ttl(s: &str) -> Result<Duration, String> {
    let ttl = parse_duration(s)?;
    if ttl.is_zero() {
        return Err("ttl must be positive".to_string());
    }
    Ok(ttl)
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_issue() {
        let cli = Cli::try_parse_from([
            "strata-tenancy",
            "token",
            "issue",
            "--tenant",
            "acme",
            "--ttl",
            "1h",
            "--secret",
            "s",
        ])
        .unwrap();

        match cli.command {
            Commands::Token {
                command: TokenCommands::Issue { tenant, ttl, .. },
            } => {
                assert_eq!(tenant, "acme");
                assert_eq!(ttl, Some(Duration::from_secs(3600)));
            }
            _ => panic!("expected token issue"),
        }
    }

    #[test]
    fn test_parse_limits_tier() {
        let cli = Cli::try_parse_from(["strata-tenancy", "limits", "--tier", "Enterprise"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Limits {
                tier: TenantTier::Enterprise,
                json: false
            }
        ));
    }

    #[test]
    fn test_rejects_zero_ttl() {
        assert!(Cli::try_parse_from([
            "strata-tenancy",
            "token",
            "issue",
            "--tenant",
            "acme",
            "--ttl",
            "0s",
            "--secret",
            "s",
        ])
        .is_err());
    }
}
