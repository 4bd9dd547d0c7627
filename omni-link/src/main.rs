//! omni-link - Link, inspect, and disconnect social platform accounts
//!
//! Drives the OAuth flow from a terminal: `authorize` prints the provider's
//! authorize URL, and after the browser redirect the user feeds the code and
//! state back through `complete`.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use libomnicast::providers::ProviderRegistry;
use libomnicast::service::events::EventBus;
use libomnicast::service::linking::{Identity, IdentityProvider, LinkingService};
use libomnicast::service::CallbackRequest;
use libomnicast::{Config, Database, Result};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "omni-link")]
#[command(version)]
#[command(about = "Link, inspect, and disconnect social platform accounts")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Acting user id
    #[arg(short, long, global = true, default_value = "default")]
    user: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Request an authorize URL for a platform
    Authorize {
        /// Platform to link (e.g. "instagram")
        platform: String,

        /// Redirect URI registered with the provider
        #[arg(long)]
        redirect_uri: String,
    },
    /// Complete a linking attempt with the callback's code and state
    Complete {
        platform: String,

        #[arg(long)]
        code: String,

        #[arg(long)]
        state: String,

        /// Must exactly match the URI passed to `authorize`
        #[arg(long)]
        redirect_uri: String,
    },
    /// List linked accounts
    List,
    /// Disconnect a linked platform
    Disconnect { platform: String },
}

/// Identity source for standalone CLI use: the locally stored account rows
/// are the identity set. A deployment with an external identity service
/// plugs its own `IdentityProvider` in here instead.
struct StoredAccountIdentities {
    db: Arc<Database>,
}

#[async_trait]
impl IdentityProvider for StoredAccountIdentities {
    async fn list_identities(&self, user_id: &str) -> Result<Vec<Identity>> {
        Ok(self
            .db
            .list_accounts(user_id)
            .await?
            .into_iter()
            .map(|account| Identity {
                provider: account.platform,
                external_id: account.provider_account_id,
            })
            .collect())
    }

    async fn unlink_identity(&self, user_id: &str, provider: &str) -> Result<()> {
        self.db.delete_account(user_id, provider).await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("error")
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Arc::new(Database::new(&config.database.path).await?);
    let registry = Arc::new(ProviderRegistry::from_config(&config)?);
    let identities = Arc::new(StoredAccountIdentities { db: db.clone() });
    let service = LinkingService::new(db, registry, identities, EventBus::new(16));

    match cli.command {
        Command::Authorize {
            platform,
            redirect_uri,
        } => {
            let response = service
                .request_auth_url(&platform, &cli.user, &redirect_uri)
                .await?;
            println!("Open this URL in your browser to authorize {}:", platform);
            println!("{}", response.auth_url);
            println!();
            println!(
                "Then run: omni-link complete {} --code <CODE> --state {} --redirect-uri {}",
                platform, response.state, redirect_uri
            );
        }
        Command::Complete {
            platform,
            code,
            state,
            redirect_uri,
        } => {
            let account_name = service
                .handle_callback(CallbackRequest {
                    platform: platform.clone(),
                    code,
                    state,
                    user_id: cli.user.clone(),
                    redirect_uri,
                })
                .await?;
            println!("Linked {} account: {}", platform, account_name);
        }
        Command::List => {
            let accounts = service.linked_accounts(&cli.user).await?;
            if accounts.is_empty() {
                println!("No linked accounts");
            } else {
                for account in accounts {
                    let expiry = account
                        .expires_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string());
                    println!(
                        "{:<12} {:<24} expires {}",
                        account.platform, account.display_name, expiry
                    );
                }
            }
        }
        Command::Disconnect { platform } => {
            service.disconnect(&cli.user, &platform).await?;
            println!("Disconnected {}", platform);
        }
    }

    Ok(())
}
