//! strata-tenancy CLI - Main entry point.

use chrono::{DateTime, Utc};
use strata_tenancy::auth::{issue_token, TokenClaims, TokenParts, TokenVerifier};
use strata_tenancy::cli::{Cli, Commands, TokenCommands};
use strata_tenancy::config::{ObservabilityConfig, TenancyConfig};
use strata_tenancy::multitenancy::TenantConfiguration;
use strata_tenancy::observability;
use strata_tenancy::ratelimit::Operation;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    observability::init(&ObservabilityConfig {
        log_level: cli.log_level.clone(),
        json_logs: false,
        metrics_enabled: false,
    })?;

    let config = match &cli.config {
        Some(path) => TenancyConfig::from_file(path)?,
        None => TenancyConfig::default(),
    }
    .with_env_overrides();

    match cli.command {
        Commands::Token { command } => match command {
            TokenCommands::Issue {
                tenant,
                sub,
                issuer,
                ttl,
                secret,
            } => {
                let mut claims = TokenClaims::new(tenant);
                if let Some(sub) = sub {
                    claims = claims.with_subject(sub);
                }
                if let Some(issuer) = issuer {
                    claims = claims.with_issuer(issuer);
                }
                if let Some(ttl) = ttl {
                    claims = claims.expires_in(ttl);
                }
                println!("{}", issue_token(&claims, &secret)?);
            }
            TokenCommands::Inspect { token, secret } => {
                let claims = TokenParts::split(&token)?.claims()?;
                println!("{}", serde_json::to_string_pretty(&claims)?);

                if let Some(exp) = claims.exp {
                    match DateTime::<Utc>::from_timestamp(exp, 0) {
                        Some(at) => println!("Expires: {}", at.to_rfc3339()),
                        None => println!("Expires: out of range ({})", exp),
                    }
                }

                let secret = secret.or(config.resolver.jwt_secret);
                match secret {
                    Some(secret) => {
                        let verifier = TokenVerifier::new(Some(secret))
                            .with_algorithm_enforcement(config.resolver.enforce_algorithm);
                        match verifier.verify_str(&token) {
                            Ok(_) => println!("Verification: OK"),
                            Err(e) => {
                                println!("Verification: FAILED ({})", e);
                                std::process::exit(1);
                            }
                        }
                    }
                    None => println!("Verification: skipped (no secret)"),
                }
            }
        },

        Commands::Limits { tier, json } => {
            let tenant_config = TenantConfiguration::for_tier(tier);
            if json {
                let buckets: serde_json::Map<String, serde_json::Value> = Operation::ALL
                    .iter()
                    .map(|op| {
                        let limits = op.limits(&tenant_config);
                        (
                            op.as_str().to_string(),
                            serde_json::json!({
                                "capacity": limits.capacity,
                                "refill_rate_per_second": limits.refill_rate,
                            }),
                        )
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&buckets)?);
            } else {
                println!("Tier: {}", tier);
                println!("{:<12} {:>12} {:>16}", "OPERATION", "CAPACITY", "REFILL/SEC");
                for op in Operation::ALL {
                    let limits = op.limits(&tenant_config);
                    println!(
                        "{:<12} {:>12.2} {:>16.4}",
                        op.as_str(),
                        limits.capacity,
                        limits.refill_rate
                    );
                }
            }
        }

        Commands::Config => {
            config.validate()?;
            let mut shown = config;
            if shown.resolver.jwt_secret.is_some() {
                shown.resolver.jwt_secret = Some("<redacted>".to_string());
            }
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }

        Commands::Version => {
            println!("strata-tenancy {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
