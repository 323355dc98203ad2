//! Identity-propagating API gateway.
//!
//! ```text
//!                 ┌──────────────────────── gateway ────────────────────────┐
//!  Client ───────▶│ request id → trace span → edge auth → dispatch (proxy)  │
//!  (Bearer token) │                         (public routes bypass)          │
//!                 └──────────────┬──────────────────────────────────────────┘
//!                                │ x-user-id / x-user-email / x-user-roles
//!                                │ x-request-id
//!                 ┌──────────────▼──────────────┐   ┌──────────────────────┐
//!                 │ users service               │   │ orders service       │
//!                 │ internal auth → role gate   │   │ internal auth → role │
//!                 └─────────────────────────────┘   │ gate + ownership     │
//!                                                   └──────────────────────┘
//! ```

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use identity_gateway::auth::claims::IdentityClaims;
use identity_gateway::auth::roles::RoleSet;
use identity_gateway::auth::token::TokenCodec;
use identity_gateway::config::{load_or_default, GatewayConfig};
use identity_gateway::lifecycle::startup;
use identity_gateway::observability::{logging, metrics};
use identity_gateway::services::ServiceKind;

#[derive(Debug, Parser)]
#[command(name = "identity-gateway", version, about = "Identity-propagating API gateway")]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long, global = true, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the edge gateway.
    Gateway,

    /// Run one internal service.
    Service {
        #[arg(value_enum)]
        kind: ServiceKind,

        /// Override the configured bind address.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print a signed bearer token (operator tool).
    IssueToken {
        #[arg(long)]
        sub: String,

        #[arg(long, default_value = "")]
        email: String,

        /// Role to grant; repeat for several. Defaults to `user`.
        #[arg(long = "role")]
        roles: Vec<String>,

        #[arg(long, default_value_t = 3600)]
        ttl_secs: u32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::IssueToken {
            sub,
            email,
            roles,
            ttl_secs,
        } => {
            let codec = TokenCodec::new(config.auth.secret.as_bytes())?;
            let claims = IdentityClaims::new(sub, email, RoleSet::parse(&roles)?);
            let token = codec.issue(&claims, chrono::Duration::seconds(i64::from(ttl_secs)))?;
            println!("{}", token);
            return Ok(());
        }
        Command::Gateway => {
            init_observability(&config)?;
            startup::run_gateway(config).await?;
        }
        Command::Service { kind, bind } => {
            init_observability(&config)?;
            startup::run_service(kind, config, bind).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_observability(config: &GatewayConfig) -> Result<(), Box<dyn Error>> {
    logging::init_tracing(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "identity-gateway starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }
    Ok(())
}
