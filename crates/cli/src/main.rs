//! EC Space CLI - database migrations and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply storefront migrations
//! ecs-cli migrate
//!
//! # Load catalog items from YAML (existing names are skipped)
//! ecs-cli seed items crates/cli/seed/items.yaml
//!
//! # Create an administrator
//! ecs-cli account create-admin -u quartermaster -e qm@example.com -p 'long password'
//!
//! # Credit an account
//! ecs-cli account topup -u pilot -a 250.00
//! ```
//!
//! All commands read `EC_SPACE_DATABASE_URL` (or `DATABASE_URL`), loading a
//! `.env` file if present.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

mod commands;

#[derive(Parser)]
#[command(name = "ecs-cli")]
#[command(author, version, about = "EC Space CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Seed the database
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
    /// Manage accounts
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Insert catalog items from a YAML file
    Items {
        /// Path to the YAML file (a list of items)
        file: String,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    /// Create an administrator account
    CreateAdmin {
        /// Login handle
        #[arg(short, long)]
        username: String,

        /// Email address
        #[arg(short, long)]
        email: String,

        /// Password (at least 8 characters)
        #[arg(short, long)]
        password: String,
    },
    /// Add credits to an account
    Topup {
        /// Login handle of the account to credit
        #[arg(short, long)]
        username: String,

        /// Amount of credits, e.g. 250.00
        #[arg(short, long)]
        amount: Decimal,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CliError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { target } => match target {
            SeedTarget::Items { file } => commands::seed::items(&file).await?,
        },
        Commands::Account { action } => match action {
            AccountAction::CreateAdmin {
                username,
                email,
                password,
            } => {
                commands::account::create_admin(&username, &email, &password).await?;
            }
            AccountAction::Topup { username, amount } => {
                commands::account::top_up(&username, amount).await?;
            }
        },
    }
    Ok(())
}
