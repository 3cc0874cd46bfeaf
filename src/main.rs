use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use distribute::Distributor;
use keywords::GroqGenerator;
use lock::RunLock;
use merge::MergeAccumulator;
use planner::DistributionParams;
use types::{PlatformKey, Upload};
use utils::NumberFormatOptions;

mod archive;
mod config;
mod debug_log;
mod distribute;
mod error;
mod keywords;
mod lock;
mod merge;
mod planner;
mod platform;
mod report;
mod reqwest_simd_json;
mod table;
mod types;
mod utils;

#[derive(Parser)]
#[command(name = "kwdist")]
#[command(version, about = "Merge marketplace keyword exports and distribute them across accounts")]
#[command(disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory holding merged/, distributed/ and leftover/ (overrides config)
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge keyword export files into per-platform datasets
    Merge(MergeArgs),
    /// Distribute merged datasets into a day/account archive
    Distribute(DistributeArgs),
    /// Show row counts of the merged datasets
    Status(StatusArgs),
    /// Generate missing keywords for product titles
    Generate(GenerateArgs),
    /// Manage configuration
    Config(ConfigArgs),
}

#[derive(Args)]
struct MergeArgs {
    /// CSV files; the platform is taken from each file name
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(Args)]
struct DistributeArgs {
    /// First day to distribute (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Number of accounts per day (defaults to config)
    #[arg(long)]
    accounts: Option<usize>,

    /// Rows each account receives per platform and day (defaults to config)
    #[arg(long)]
    rows_per_account: Option<usize>,

    /// Print the result as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args)]
struct StatusArgs {
    /// Print the counts as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args)]
struct GenerateArgs {
    /// Spreadsheet with a product title column
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    /// Platform the output is meant for (e.g. amazon_us)
    #[arg(long)]
    platform: String,

    /// Output file. Defaults to generated/<platform>.csv in the data directory.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    subcommand: ConfigSubcommands,
}

#[derive(Subcommand)]
enum ConfigSubcommands {
    /// Create default configuration file
    Init {
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
    /// Show current configuration
    Show,
    /// Set configuration value
    Set {
        /// Configuration key (data-dir, merge-policy, platforms, accounts, rows-per-account, api-key, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() {
    debug_log::init();
    let cli = Cli::parse();

    let mut config = match config::Config::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            utils::warn_once(format!("⚠️  Ignoring config file: {e:#}"));
            config::Config::default()
        }
    };
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    let result = match cli.command {
        Commands::Merge(args) => run_merge(&config, args),
        Commands::Distribute(args) => run_distribute(&config, args),
        Commands::Status(args) => run_status(&config, args),
        Commands::Generate(args) => run_generate(&config, args).await,
        Commands::Config(args) => handle_config_subcommand(args),
    };

    if let Err(e) = result {
        eprintln!("❌ {e:#}");
        std::process::exit(1);
    }
}

fn run_merge(config: &config::Config, args: MergeArgs) -> Result<()> {
    let uploads = args
        .files
        .iter()
        .map(|path| -> Result<Upload> {
            let bytes =
                std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok(Upload::new(name, bytes))
        })
        .collect::<Result<Vec<_>>>()?;

    let paths = config.paths();
    let matcher = config.matcher();
    let _lock = RunLock::acquire(&paths.lock_file)?;
    let outcome = MergeAccumulator::new(&matcher, &paths.merged_dir, config.merge.policy)
        .merge(&uploads);

    let format_options = NumberFormatOptions::from(&config.formatting);
    for (platform, rows) in &outcome.row_counts {
        println!(
            "✅ {platform} merged with {} total rows.",
            utils::format_number(*rows, &format_options)
        );
    }
    for name in &outcome.skipped {
        println!("⏭️  Skipped {name}: no matching platform.");
    }
    for failure in &outcome.failures {
        eprintln!("⚠️  {failure}");
    }
    if outcome.row_counts.is_empty() && outcome.failures.is_empty() {
        println!("⚠️  No files matched a configured platform.");
    }

    if outcome.has_failures() {
        anyhow::bail!("{} file(s) could not be merged", outcome.failures.len());
    }
    Ok(())
}

fn run_distribute(config: &config::Config, args: DistributeArgs) -> Result<()> {
    let params = DistributionParams {
        start_date: args
            .start_date
            .unwrap_or_else(|| chrono::Local::now().date_naive()),
        accounts: args.accounts.unwrap_or(config.distribution.accounts),
        rows_per_account: args
            .rows_per_account
            .unwrap_or(config.distribution.rows_per_account),
    };

    let paths = config.paths();
    let matcher = config.matcher();
    let _lock = RunLock::acquire(&paths.lock_file)?;
    let merged = MergeAccumulator::new(&matcher, &paths.merged_dir, config.merge.policy)
        .load_all()?;
    let result = Distributor::new(&paths, &config.distribution.archive_suffix)
        .distribute(&merged, params)?;

    if args.json {
        println!("{}", simd_json::to_string_pretty(&result)?);
    } else {
        let format_options = NumberFormatOptions::from(&config.formatting);
        print!("{}", report::render_distribution(&result, &format_options));
    }
    Ok(())
}

fn run_status(config: &config::Config, args: StatusArgs) -> Result<()> {
    let paths = config.paths();
    let matcher = config.matcher();
    let merged = MergeAccumulator::new(&matcher, &paths.merged_dir, config.merge.policy)
        .load_all()?;
    let counts = report::merged_summary(&merged);

    if args.json {
        println!("{}", simd_json::to_string_pretty(&counts)?);
    } else {
        let format_options = NumberFormatOptions::from(&config.formatting);
        print!("{}", report::render_merged_summary(&counts, &format_options));
    }
    Ok(())
}

async fn run_generate(config: &config::Config, args: GenerateArgs) -> Result<()> {
    let platform = PlatformKey::new(&args.platform);
    if !config.matcher().keys().contains(&platform) {
        anyhow::bail!(
            "Unknown platform '{}'. Configured: {}",
            args.platform,
            config.merge.platforms.join(", ")
        );
    }
    let api_key = config.api_key().context(
        "No API key configured. Run `kwdist config set api-key ...` or set GROQ_API_KEY",
    )?;

    let dataset = table::read_csv_file(&args.input)?;
    let generator = GroqGenerator::new(&config.keywords, api_key)?;
    let pause = Duration::from_millis(config.keywords.retry_delay_ms);

    let (output, stats) = keywords::fill_missing_keywords(&dataset, &generator, pause, |done, total| {
        print!("\r⏳ Generating keywords... {done}/{total}");
        let _ = std::io::stdout().flush();
    })
    .await?;
    println!();

    let output_path = args
        .output
        .unwrap_or_else(|| config.paths().generated_dir.join(format!("{platform}.csv")));
    table::write_csv_file(&output_path, &output)?;

    println!(
        "✅ Generated {}, failed {}, skipped {}.",
        stats.generated, stats.failed, stats.skipped
    );
    println!("📍 Saved to {}", output_path.display());
    Ok(())
}

fn handle_config_subcommand(config_args: ConfigArgs) -> Result<()> {
    match config_args.subcommand {
        ConfigSubcommands::Init { overwrite } => {
            config::create_default_config(overwrite).context("Error creating config")
        }
        ConfigSubcommands::Show => config::show_config().context("Error showing config"),
        ConfigSubcommands::Set { key, value } => {
            config::set_config_value(&key, &value).context("Error setting config")
        }
    }
}
