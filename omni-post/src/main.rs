//! omni-post - Schedule content for publication to linked accounts

use clap::Parser;
use libomnicast::scheduling::parse_schedule;
use libomnicast::service::posts::PostService;
use libomnicast::types::NewPost;
use libomnicast::{Config, Database, OmnicastError, Result};
use std::io::Read;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "omni-post")]
#[command(version)]
#[command(about = "Schedule content for publication to linked accounts", long_about = None)]
struct Cli {
    /// Content to post (reads from stdin if not provided)
    content: Option<String>,

    /// When to publish (e.g. "2h", "30m", "tomorrow 9am")
    #[arg(long, value_name = "WHEN")]
    at: String,

    /// Acting user id
    #[arg(short, long)]
    user: String,

    /// Target account platform(s), comma-separated (defaults from config)
    #[arg(short, long)]
    accounts: Option<String>,

    /// Attach a media URL (repeatable)
    #[arg(long = "media", value_name = "URL")]
    media: Vec<String>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
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

    let content = match cli.content {
        Some(content) => content,
        None => read_stdin()?,
    };

    let selected_accounts: Vec<String> = match &cli.accounts {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => config.defaults.platforms.clone(),
    };

    let scheduled_for = parse_schedule(&cli.at)?;

    let db = Arc::new(Database::new(&config.database.path).await?);
    let service = PostService::new(db);

    let post = service
        .create(NewPost {
            user_id: Some(cli.user),
            content,
            media_urls: cli.media,
            selected_accounts,
            scheduled_for,
        })
        .await?;

    match cli.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&post).unwrap_or_default()),
        _ => {
            println!("Scheduled post {}", post.id);
            println!("  publishes at: {}", post.scheduled_for.to_rfc3339());
            println!("  accounts:     {}", post.selected_accounts.join(", "));
        }
    }

    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .map_err(|e| OmnicastError::InvalidInput(format!("Failed to read stdin: {}", e)))?;
    Ok(buffer.trim_end().to_string())
}
