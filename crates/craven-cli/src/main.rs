// ============================================================================
// craven — access gate and driver rewards tool for the Craven apps
// ============================================================================
// Usage:
//   craven seed fixtures.json                   Load fixture records
//   craven stats                                Show fixture database counts
//   craven export                               Dump fixture records as JSON
//   craven check --user ID --gate customer      Evaluate a gate offline
//   craven tier --rating 4.85 --deliveries 120  Show a driver's tier
//   craven drivers                              Tier distribution of fixtures
//   craven routing 021000021                    Validate an ABA routing number
// ============================================================================

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use craven_core::access::{AccessGate, GateOutcome, GateState, GateVariant, LogNavigator};
use craven_core::backend::{CravenClient, MemoryBackend};
use craven_core::routing::RoutingNumber;
use craven_core::storage::{SafeStorage, RETURN_TO_KEY};
use craven_core::tiers::{
    color_for_rating, format_rating, format_trend, percentage_for_rating, tier_for_rating,
    Standing, TierDistribution,
};
use craven_core::{CravenConfig, ExecRole, FixtureDb, FixtureSeed, Identity};

/// Craven access and rewards tool
#[derive(Parser)]
#[command(name = "craven", version, about = "Inspect Craven access gates and driver rewards")]
struct Cli {
    /// Path to the fixture database (default: ~/.craven/fixtures.redb)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load records from a JSON fixture file
    Seed {
        /// Fixture file with applications, roles, exec_users, employees,
        /// driver_profiles and feature_flags arrays
        file: PathBuf,
    },

    /// Show fixture database statistics
    Stats,

    /// Export all fixture records as JSON
    Export,

    /// Evaluate an access gate against the fixture records
    Check {
        /// User id to sign in as (omit to check as a signed-out visitor)
        #[arg(long)]
        user: Option<Uuid>,

        /// Email to sign in with (used for the superuser allow-list)
        #[arg(long)]
        email: Option<String>,

        /// Gate: customer, onboarding, admin, business, executive
        #[arg(long)]
        gate: String,

        /// Required executive role: ceo, board_member, chairperson, ...
        #[arg(long)]
        role: Option<String>,

        /// Route to remember if the gate sends the visitor to a login page
        #[arg(long)]
        from: Option<String>,
    },

    /// Show the tier for a rating and delivery count
    Tier {
        #[arg(long)]
        rating: f64,

        #[arg(long, default_value = "0")]
        deliveries: u32,

        /// Rating change over the last period
        #[arg(long, allow_hyphen_values = true)]
        trend: Option<f64>,
    },

    /// Tier and rating distribution of the stored driver profiles
    Drivers,

    /// Validate a 9-digit ABA routing number
    Routing { number: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (optional)
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("craven_core=debug,craven=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dotenv {
        debug!("No .env file loaded: {}", e);
    }

    let cli = Cli::parse();
    let config = CravenConfig::from_env();
    let db_path = cli.db_path.or_else(|| config.db_path.clone());

    match cli.command {
        Commands::Seed { file } => cmd_seed(&open_db(db_path.as_deref())?, &file),
        Commands::Stats => cmd_stats(&open_db(db_path.as_deref())?),
        Commands::Export => cmd_export(&open_db(db_path.as_deref())?),
        Commands::Check {
            user,
            email,
            gate,
            role,
            from,
        } => {
            let db = Arc::new(open_db(db_path.as_deref())?);
            cmd_check(db, config, user, email, &gate, role, from).await
        }
        Commands::Tier {
            rating,
            deliveries,
            trend,
        } => cmd_tier(rating, deliveries, trend),
        Commands::Drivers => cmd_drivers(&open_db(db_path.as_deref())?),
        Commands::Routing { number } => cmd_routing(&number),
    }
}

fn open_db(path: Option<&Path>) -> Result<FixtureDb> {
    FixtureDb::open(path)
}

fn cmd_seed(db: &FixtureDb, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .map_err(|e| anyhow!("Failed to read {}: {}", file.display(), e))?;
    let seed: FixtureSeed = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("Failed to parse {}: {}", file.display(), e))?;

    let written = db.seed(&seed)?;
    println!("Seeded {} records into {}", written, db.path().display());
    Ok(())
}

fn cmd_stats(db: &FixtureDb) -> Result<()> {
    let stats = db.stats()?;

    println!("=== Craven Fixture Database ===");
    println!("Database: {}", db.path().display());
    println!();
    println!("Applications:    {}", stats.applications);
    println!("Role grants:     {}", stats.roles);
    println!("Exec users:      {}", stats.exec_users);
    println!("Employees:       {}", stats.employees);
    println!("Driver profiles: {}", stats.driver_profiles);
    println!("Feature flags:   {}", stats.feature_flags);
    println!("Preferences:     {}", stats.prefs);

    Ok(())
}

fn cmd_export(db: &FixtureDb) -> Result<()> {
    let seed = db.export()?;
    let json = serde_json::to_string_pretty(&seed)
        .map_err(|e| anyhow!("Failed to serialize export: {}", e))?;
    println!("{}", json);
    Ok(())
}

fn parse_gate(gate: &str, role: Option<String>) -> Result<GateVariant> {
    let variant: GateVariant = gate.parse()?;
    match (variant, role) {
        (_, None) => Ok(variant),
        (GateVariant::Executive { .. }, Some(role)) => Ok(GateVariant::Executive {
            required_role: Some(role.parse::<ExecRole>()?),
        }),
        (other, Some(_)) => anyhow::bail!("--role only applies to the executive gate, not {}", other),
    }
}

/// Result of one offline gate evaluation
struct CheckReport {
    state: GateState,
    outcome: GateOutcome,
    /// Route stashed by this evaluation, if it sent the visitor to login
    return_to: Option<String>,
}

async fn run_check(
    db: Arc<FixtureDb>,
    config: CravenConfig,
    identity: Option<Identity>,
    variant: GateVariant,
    from: Option<&str>,
) -> CheckReport {
    // Auth and realtime stay in memory; records come from the fixture db
    let backend = Arc::new(MemoryBackend::new());
    if let Some(identity) = identity {
        backend.sign_in(identity).await;
    }
    let client = CravenClient::new(backend.clone(), db.clone(), backend, config);

    let storage = SafeStorage::new(db);
    let mut gate = AccessGate::new(variant, &client, Arc::new(LogNavigator));
    if let Some(route) = from {
        // Drop what an earlier run left behind
        storage.remove(RETURN_TO_KEY);
        gate = gate.with_return_to(storage.clone(), route);
    }

    let state = gate.evaluate().await;
    let report = CheckReport {
        state,
        outcome: gate.outcome(),
        return_to: from.and_then(|_| storage.get(RETURN_TO_KEY)),
    };

    client.teardown();
    report
}

async fn cmd_check(
    db: Arc<FixtureDb>,
    config: CravenConfig,
    user: Option<Uuid>,
    email: Option<String>,
    gate: &str,
    role: Option<String>,
    from: Option<String>,
) -> Result<()> {
    let variant = parse_gate(gate, role)?;
    let identity = user.map(|id| Identity { id, email });

    match &identity {
        Some(identity) => info!("Evaluating {} gate for {}", variant, identity.id),
        None => info!("Evaluating {} gate for a signed-out visitor", variant),
    }
    let report = run_check(db, config, identity, variant, from.as_deref()).await;

    println!("Gate:    {}", variant);
    match user {
        Some(user) => println!("User:    {}", user),
        None => println!("User:    (signed out)"),
    }
    println!("State:   {:?}", report.state);
    println!(
        "Outcome: {}",
        serde_json::to_string(&report.outcome)
            .map_err(|e| anyhow!("Failed to serialize outcome: {}", e))?
    );
    if let Some(saved) = report.return_to {
        println!("Return:  {}", saved);
    }

    Ok(())
}

fn cmd_tier(rating: f64, deliveries: u32, trend: Option<f64>) -> Result<()> {
    if !rating.is_finite() || !(0.0..=5.0).contains(&rating) {
        anyhow::bail!("Rating must be between 0 and 5, got {}", rating);
    }

    let info = tier_for_rating(rating, deliveries);
    let standing = Standing::for_rating(rating);

    println!("{} {}", info.icon, info.name);
    println!("Rating:     {} ({:.0}%)", format_rating(rating), percentage_for_rating(rating));
    println!("Deliveries: {}", deliveries);
    println!("Tier color: {}", info.color);
    println!("Rating color: {}", color_for_rating(rating));
    println!("Standing:   {}", standing.label());
    if let Some(delta) = trend {
        println!("Trend:      {}", format_trend(delta));
    }

    if let Some(next) = info.tier.next() {
        let next = next.info();
        println!(
            "Next tier:  {} (needs {} rating and {} deliveries)",
            next.name,
            format_rating(next.minimum),
            next.min_deliveries
        );
    }

    Ok(())
}

fn cmd_drivers(db: &FixtureDb) -> Result<()> {
    let profiles = db.list_driver_profiles()?;
    if profiles.is_empty() {
        println!("No driver profiles found.");
        return Ok(());
    }

    let dist = TierDistribution::from_profiles(&profiles);

    println!("Drivers:         {}", dist.total);
    println!("Average rating:  {}", format_rating(dist.average_rating));
    println!("Top rated:       {}", dist.top_rated);
    println!("Needs attention: {}", dist.needs_attention);
    println!();
    println!("{:<14}  {}", "TIER", "DRIVERS");
    println!("{}", "-".repeat(24));
    for (tier, count) in &dist.tiers {
        println!("{:<14}  {}", tier.display_name(), count);
    }
    println!();
    println!("{:<14}  {}", "RATING", "DRIVERS");
    println!("{}", "-".repeat(24));
    for (bucket, count) in &dist.buckets {
        println!("{:<14}  {}", bucket.label(), count);
    }

    Ok(())
}

fn cmd_routing(number: &str) -> Result<()> {
    let routing = RoutingNumber::parse(number)?;
    println!(
        "{} is valid (Federal Reserve routing symbol {})",
        routing,
        routing.fed_routing_symbol()
    );
    Ok(())
}
