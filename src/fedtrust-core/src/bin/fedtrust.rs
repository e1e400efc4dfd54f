//! fedtrust CLI - OpenID Federation trust chain inspection.
//!
//! Resolves trust chains for an entity, decodes statements and prints this
//! entity's own signed entity configuration.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use fedtrust_core::combiner::select_acceptable_chain;
use fedtrust_core::config::{FederationConfig, ResolverConfig};
use fedtrust_core::entity_configuration::EntityConfigurationBuilder;
use fedtrust_core::fetch::HttpFederationFetcher;
use fedtrust_core::jws;
use fedtrust_core::resolver::TrustChainResolver;
use fedtrust_core::statement::SignedStatement;
use fedtrust_core::FederationError;
use fedtrust_keyring::{
    Ed25519SoftwareSigner, KeyStatus, LocalKeyStore, SigningAlgorithm, SoftwareSigner,
    StatementSigner,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// fedtrust - resolve and inspect OpenID Federation trust chains.
#[derive(Parser)]
#[command(name = "fedtrust")]
#[command(version = VERSION)]
#[command(about = "OpenID Federation trust chain resolution")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve trust chains from an entity to the given anchors
    Resolve {
        /// Entity identifier of the leaf
        #[arg(long)]
        leaf: String,

        /// Trust anchor entity identifier (repeatable)
        #[arg(long = "trust-anchor", required = true)]
        trust_anchors: Vec<String>,

        /// Fold metadata policies and apply them to the leaf's metadata
        #[arg(long)]
        policy: bool,

        /// Per-fetch timeout in seconds
        #[arg(long, default_value = "10")]
        timeout: u64,

        /// Maximum statements per chain
        #[arg(long, default_value = "8")]
        max_chain_length: usize,
    },

    /// Decode a compact statement without verifying it
    Inspect {
        /// Compact token
        token: String,
    },

    /// Print a signed entity configuration for a TOML config, using a fresh key
    EntityConfiguration {
        /// Federation configuration file
        #[arg(long)]
        config: String,
    },
}

async fn run_resolve(
    leaf: &str,
    trust_anchors: Vec<String>,
    policy: bool,
    resolver_config: ResolverConfig,
    json: bool,
) -> Result<(), FederationError> {
    let fetcher = HttpFederationFetcher::from_config(&resolver_config)?;
    let resolver = TrustChainResolver::new(Arc::new(fetcher), resolver_config);
    let anchors: BTreeSet<String> = trust_anchors.into_iter().collect();

    let (statement, chains) = resolver.resolve_from_url(leaf, &anchors, policy).await?;
    let declared = statement.metadata.clone().unwrap_or_default();

    if json {
        let accepted = if policy {
            select_acceptable_chain(chains.clone(), &declared)
        } else {
            None
        };
        let output = serde_json::json!({
            "leaf": leaf,
            "chains": chains,
            "accepted": accepted,
        });
        println!("{}", to_pretty(&output)?);
        return Ok(());
    }

    println!("\nTRUST CHAINS");
    println!("============\n");
    println!("  Leaf:    {leaf}");
    println!("  Anchors: {}", anchors.iter().cloned().collect::<Vec<_>>().join(", "));
    println!("  Found:   {}\n", chains.len());

    for (i, chain) in chains.iter().enumerate() {
        println!("  [{}] {} -> {}", i + 1, chain.leaf_id, chain.trust_anchor_id);
        for statement in &chain.statements {
            println!("      {} about {}", statement.issuer_str(), statement.subject_str());
        }
    }

    if policy {
        println!();
        match select_acceptable_chain(chains, &declared) {
            Some(accepted) => {
                println!("  Accepted chain anchored at {}", accepted.chain.trust_anchor_id);
                println!("\n{}", to_pretty(&accepted.metadata)?);
            },
            None => println!("  No acceptable chain"),
        }
    }
    Ok(())
}

fn run_inspect(token: &str) -> Result<(), FederationError> {
    let header = jws::parse_header(token)?;
    let statement = jws::parse_typed(token)?;

    let payload = match &statement {
        SignedStatement::EntityStatement(s) => serde_json::to_value(s),
        SignedStatement::RegistrationResponse(r) => serde_json::to_value(r),
    }
    .map_err(|e| FederationError::malformed(e.to_string()))?;

    let output = serde_json::json!({
        "header": header,
        "type": statement.statement_type().typ(),
        "payload": payload,
    });
    println!("{}", to_pretty(&output)?);
    Ok(())
}

async fn run_entity_configuration(path: &str) -> Result<(), FederationError> {
    let config = FederationConfig::load(path)?;

    let signer: Arc<dyn StatementSigner> = match config.signing_algorithm {
        SigningAlgorithm::Es256 => Arc::new(SoftwareSigner::generate()?),
        SigningAlgorithm::EdDsa => Arc::new(Ed25519SoftwareSigner::generate()?),
    };
    let keys = LocalKeyStore::new();
    keys.insert(signer, KeyStatus::Active)?;

    let builder = EntityConfigurationBuilder::new(config).with_key_store(&keys)?;
    let token = builder.sign(&keys, chrono::Utc::now().timestamp()).await?;
    println!("{token}");
    Ok(())
}

fn to_pretty<T: serde::Serialize>(value: &T) -> Result<String, FederationError> {
    serde_json::to_string_pretty(value).map_err(|e| FederationError::ConfigError {
        message: format!("output: {e}"),
    })
}

/// Subscriber level for the output format and verbosity.
fn log_level(format: OutputFormat, verbose: bool) -> tracing::Level {
    match (format, verbose) {
        (OutputFormat::Json, _) => tracing::Level::ERROR,
        (OutputFormat::Text, true) => tracing::Level::DEBUG,
        (OutputFormat::Text, false) => tracing::Level::WARN,
    }
}

fn init_logging(format: OutputFormat, verbose: bool) {
    tracing_subscriber::fmt()
        .with_max_level(log_level(format, verbose))
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.format, cli.verbose);
    let json_output = cli.format == OutputFormat::Json;

    let result = match cli.command {
        Commands::Resolve {
            leaf,
            trust_anchors,
            policy,
            timeout,
            max_chain_length,
        } => {
            let config = ResolverConfig {
                fetch_timeout: Duration::from_secs(timeout),
                max_chain_length,
                ..ResolverConfig::default()
            };
            run_resolve(&leaf, trust_anchors, policy, config, json_output).await
        },
        Commands::Inspect { token } => run_inspect(token.trim()),
        Commands::EntityConfiguration { config } => run_entity_configuration(&config).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
