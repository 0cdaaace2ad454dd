//! paytokens - operator CLI for stored payment tokens.
//!
//! Works against the attribute store named in the configuration file, for
//! the gateway and environment configured there unless overridden.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use paytokens_store::{
    AttributeStore, CustomerId, Environment, FileAttributeStore, MemoryAttributeStore,
    MigrationStatus, StorageConfig, Token, TokenCollection, TokenId, TokenStore,
    TokenStoreConfig, TokenType,
};

/// Inspect, edit and migrate stored payment tokens
#[derive(Parser, Debug)]
#[command(name = "paytokens")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", env = "PAYTOKENS_CONFIG")]
    config: String,

    /// Environment override (omit for the configured one, "" for production)
    #[arg(short = 'e', long = "environment")]
    environment: Option<String>,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose")]
    verbose: bool,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration file and exit
    CheckConfig,
    /// List a customer's tokens (migrating legacy data if needed)
    List {
        customer: String,
    },
    /// List a customer's legacy-format tokens without migrating
    Legacy {
        customer: String,
    },
    /// Add a card token, replacing any token with the same id
    Add {
        customer: String,
        token_id: String,
        /// Instrument type (credit_card, echeck, ...)
        #[arg(long = "type", default_value = "credit_card")]
        token_type: String,
        #[arg(long)]
        card_type: Option<String>,
        #[arg(long)]
        last_four: Option<String>,
        #[arg(long)]
        exp_month: Option<String>,
        #[arg(long)]
        exp_year: Option<String>,
        /// Make this the customer's default token
        #[arg(long)]
        default: bool,
    },
    /// Remove a token
    Remove {
        customer: String,
        token_id: String,
    },
    /// Mark a token as the customer's default
    SetDefault {
        customer: String,
        token_id: String,
    },
    /// Migrate legacy tokens into the current format
    Migrate {
        customer: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let config = TokenStoreConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load configuration file {}", cli.config))?;

    if let Commands::CheckConfig = cli.command {
        info!(gateway = %config.gateway_id, storage = ?config.storage, "Configuration is valid");
        println!("paytokens: configuration file {} test is successful", cli.config);
        return Ok(());
    }

    let environment = match cli.environment.as_deref() {
        Some(env) => Environment::from_optional(Some(env)).context("Invalid environment")?,
        None => config.environment().context("Invalid configured environment")?,
    };

    let store = TokenStore::from_config(&config, open_attributes(&config.storage)?)
        .context("Failed to create token store")?;

    run(&store, &environment, cli.command)
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.with_target(false).init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn open_attributes(storage: &StorageConfig) -> Result<Arc<dyn AttributeStore>> {
    match storage {
        StorageConfig::File { path } => {
            let store = FileAttributeStore::open(path)
                .with_context(|| format!("Failed to open attribute store at {}", path.display()))?;
            Ok(Arc::new(store))
        }
        StorageConfig::Memory => {
            warn!("Using in-memory storage; changes will not persist");
            Ok(Arc::new(MemoryAttributeStore::new()))
        }
    }
}

fn run<S: AttributeStore>(
    store: &TokenStore<S>,
    environment: &Environment,
    command: Commands,
) -> Result<()> {
    match command {
        Commands::CheckConfig => Ok(()),
        Commands::List { customer } => {
            let tokens = store.get_tokens(&CustomerId::new(customer), environment);
            print_tokens(&tokens);
            Ok(())
        }
        Commands::Legacy { customer } => {
            let tokens = store.get_legacy_tokens(&CustomerId::new(customer), environment);
            print_tokens(&tokens);
            Ok(())
        }
        Commands::Add {
            customer,
            token_id,
            token_type,
            card_type,
            last_four,
            exp_month,
            exp_year,
            default,
        } => {
            let customer = CustomerId::new(customer);
            let token_id = TokenId::parse(token_id).context("Invalid token id")?;

            let mut token = Token::new(token_id.clone(), TokenType::from(token_type));
            if let Some(card_type) = card_type {
                token.set_card_type(card_type);
            }
            if let Some(last_four) = last_four {
                token.set_last_four(last_four);
            }
            if let Some(exp_month) = exp_month {
                token.set_exp_month(exp_month);
            }
            if let Some(exp_year) = exp_year {
                token.set_exp_year(exp_year);
            }

            store
                .add_token(&customer, token, environment)
                .context("Failed to add token")?;
            if default {
                store
                    .set_default_token(&customer, &token_id, environment)
                    .context("Failed to set default token")?;
            }
            println!("added {}", token_id);
            Ok(())
        }
        Commands::Remove { customer, token_id } => {
            let token_id = TokenId::parse(token_id).context("Invalid token id")?;
            let removed = store
                .remove_token(&CustomerId::new(customer), &token_id, environment)
                .context("Failed to remove token")?;
            if removed {
                println!("removed {}", token_id);
            } else {
                println!("no token {}", token_id);
            }
            Ok(())
        }
        Commands::SetDefault { customer, token_id } => {
            let token_id = TokenId::parse(token_id).context("Invalid token id")?;
            let updated = store
                .set_default_token(&CustomerId::new(customer), &token_id, environment)
                .context("Failed to set default token")?;
            if !updated {
                bail!("no token {}", token_id);
            }
            println!("default {}", token_id);
            Ok(())
        }
        Commands::Migrate { customer } => {
            let report = store
                .migrate(&CustomerId::new(customer), environment)
                .context("Migration failed")?;
            match report.status {
                MigrationStatus::AlreadyCurrent => println!("already migrated"),
                MigrationStatus::NothingToMigrate => {
                    println!("nothing to migrate ({} malformed skipped)", report.skipped)
                }
                MigrationStatus::Migrated => println!(
                    "migrated {} token(s), {} malformed skipped",
                    report.decoded, report.skipped
                ),
            }
            Ok(())
        }
    }
}

fn print_tokens(tokens: &TokenCollection) {
    for token in tokens {
        println!("{}", describe(token));
    }
}

fn describe(token: &Token) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}{}",
        token.id(),
        token.token_type(),
        token.card_type().unwrap_or("-"),
        token.last_four().unwrap_or("-"),
        token.exp_date().unwrap_or_else(|| "-".to_string()),
        if token.is_default() { "\tdefault" } else { "" },
    )
}
