use std::{
    io::{self, IsTerminal, Read},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::fs;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ruvsarpur_core::{
    Catalog, DownloadEvent, DownloadOptions, DownloadOrchestrator, EpisodeOutcome,
    FfmpegDownloader, Ledger, RuvClient, SarpurError, format_program_details,
    format_program_table, get_ledger_path, get_programs_cache_path, get_root_dir, load_catalog,
    search_all,
};

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let whole = d.as_secs();
        format!("{}m {}s", whole / 60, whole % 60)
    }
}

#[derive(Parser)]
#[command(name = "ruvsarpur")]
#[command(about = "Search the RÚV television catalog and archive episodes with ffmpeg")]
struct Cli {
    /// Directory holding the catalog cache (programs.json) and the download ledger
    #[arg(long, global = true, env = "RUVSARPUR_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Log progress details to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search program titles and foreign titles
    Search {
        /// Substrings to look for; a program matching any of them is listed
        #[arg(required = true)]
        patterns: Vec<String>,

        /// Compare case-insensitively
        #[arg(short, long)]
        ignore_case: bool,

        /// Print only program ids, one per line
        #[arg(long)]
        only_ids: bool,

        #[command(flatten)]
        catalog: CatalogArgs,
    },

    /// Show the description and episodes of programs
    Details {
        #[arg(required = true)]
        program_ids: Vec<String>,

        #[command(flatten)]
        catalog: CatalogArgs,
    },

    /// Download every episode of the given programs
    DownloadProgram(DownloadArgs),
}

#[derive(Args)]
struct CatalogArgs {
    /// Fetch the catalog from ruv.is even if a cached copy exists
    #[arg(long)]
    force_reload_programs: bool,
}

#[derive(Args)]
struct DownloadArgs {
    /// Program ids; read from stdin when none are given
    program_ids: Vec<String>,

    /// Rendition index, 0 being the lowest resolution. Defaults to the highest.
    #[arg(short, long)]
    quality: Option<usize>,

    /// Download again even if an episode is recorded as downloaded
    #[arg(long)]
    force: bool,

    /// Record episodes whose output file already exists instead of downloading them
    #[arg(long)]
    check_local: bool,

    /// Keep partially downloaded files when a download fails
    #[arg(long)]
    keep_partial: bool,

    /// Include the program's foreign title in file names
    #[arg(long)]
    original_title: bool,

    /// Directory the episodes are written to
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// ffmpeg executable
    #[arg(long, env = "RUVSARPUR_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    #[command(flatten)]
    catalog: CatalogArgs,
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "warn,ruvsarpur=info,ruvsarpur_core=info"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false),
        )
        .init();
}

async fn load_programs(work_dir: &Path, args: &CatalogArgs, client: &RuvClient) -> Result<Catalog> {
    let step_start = Instant::now();
    let cache_path = get_programs_cache_path(work_dir);
    let spinner = create_spinner(if args.force_reload_programs {
        "Fetching catalog from ruv.is..."
    } else {
        "Loading catalog..."
    });

    match load_catalog(args.force_reload_programs, &cache_path, client).await {
        Ok(catalog) => {
            spinner.finish_with_message(format!(
                "{} Catalog: {} programs, {} episodes {}",
                style("✓").green().bold(),
                catalog.len(),
                catalog.episode_count(),
                style(format!("[{}]", format_duration(step_start.elapsed()))).dim()
            ));
            Ok(catalog)
        }
        Err(e) => {
            spinner.finish_and_clear();
            Err(e).context("Could not load the program catalog")
        }
    }
}

/// Program ids from the command line, or whitespace separated from stdin
fn program_ids_or_stdin(ids: Vec<String>) -> Result<Vec<String>> {
    if !ids.is_empty() {
        return Ok(ids);
    }
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        bail!("No program ids given, pass them as arguments or pipe them in");
    }
    let mut input = String::new();
    stdin.read_to_string(&mut input)?;
    let ids: Vec<String> = input.split_whitespace().map(str::to_string).collect();
    if ids.is_empty() {
        bail!("No program ids found on stdin");
    }
    Ok(ids)
}

fn search_command(catalog: &Catalog, patterns: &[String], ignore_case: bool, only_ids: bool) {
    let found = search_all(catalog, patterns, ignore_case);

    if only_ids {
        for id in found.keys() {
            println!("{}", id);
        }
        return;
    }

    if found.is_empty() {
        println!("{} No programs matched", style("✗").yellow().bold());
        return;
    }

    println!();
    print!("{}", format_program_table(found.values().copied()));
}

fn details_command(catalog: &Catalog, program_ids: &[String]) {
    for program_id in program_ids {
        match catalog.get(program_id) {
            Some(program) => {
                println!("{}", style("─".repeat(60)).dim());
                print!("{}", format_program_details(program));
            }
            None => {
                let err = SarpurError::ProgramNotFound {
                    program_id: program_id.clone(),
                };
                eprintln!("{} {}", style("✗").red().bold(), err);
            }
        }
    }
}

async fn download_command(
    work_dir: &Path,
    catalog: &Catalog,
    client: &RuvClient,
    args: DownloadArgs,
    program_ids: Vec<String>,
) -> Result<()> {
    let ledger = Ledger::open(get_ledger_path(work_dir)).await?;
    let downloader = FfmpegDownloader::new(args.ffmpeg);
    let options = DownloadOptions {
        quality: args.quality,
        force: args.force,
        check_local: args.check_local,
        keep_partial: args.keep_partial,
        original_title: args.original_title,
        output_dir: args.output,
    };
    let mut orchestrator = DownloadOrchestrator::new(client.http(), &downloader, ledger, options);

    let total_start = Instant::now();
    let mut current: Option<(ProgressBar, Instant, String)> = None;

    let report = orchestrator
        .run_with(catalog, program_ids.as_slice(), |event| match event {
            DownloadEvent::Planned(plan) => {
                for program_id in &plan.missing_programs {
                    println!(
                        "{} Program {} not found",
                        style("✗").red().bold(),
                        style(program_id).yellow()
                    );
                }
                if !plan.already_recorded.is_empty() {
                    println!(
                        "{} {} episode(s) already downloaded {}",
                        style("✓").green().bold(),
                        plan.already_recorded.len(),
                        style("(skipped)").dim()
                    );
                }
            }
            DownloadEvent::Started { index, total, job } => {
                let label = job
                    .output
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| job.episode.id.clone());
                let counter = style(format!("{}/{}", index + 1, total)).dim();
                let spinner = create_spinner(&format!("{} Downloading {}...", counter, label));
                current = Some((spinner, Instant::now(), label));
            }
            DownloadEvent::Finished { result, .. } => {
                let Some((spinner, step_start, label)) = current.take() else {
                    return;
                };
                let message = match result {
                    Ok(EpisodeOutcome::Downloaded { resolution, output }) => format!(
                        "{} {} {} {}",
                        style("✓").green().bold(),
                        output
                            .file_name()
                            .map(|name| name.to_string_lossy().into_owned())
                            .unwrap_or(label),
                        style(resolution).yellow(),
                        style(format!("[{}]", format_duration(step_start.elapsed()))).dim()
                    ),
                    Ok(EpisodeOutcome::FoundLocally(_)) => format!(
                        "{} {} {}",
                        style("✓").green().bold(),
                        label,
                        style("(found locally)").dim()
                    ),
                    Err(e) => format!("{} {}: {}", style("✗").red().bold(), label, e),
                };
                spinner.finish_with_message(message);
            }
        })
        .await;

    println!("{}", style("─".repeat(60)).dim());
    println!(
        "{} downloaded, {} found locally, {} failed, {} already recorded {}",
        style(report.downloaded.len()).green().bold(),
        report.found_locally.len(),
        style(report.failed.len()).red().bold(),
        report.already_recorded.len(),
        style(format!("[{}]", format_duration(total_start.elapsed()))).dim()
    );
    if report.is_clean() {
        info!("all requested episodes are downloaded");
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let work_dir = cli.work_dir.unwrap_or_else(get_root_dir);
    fs::create_dir_all(&work_dir)
        .await
        .with_context(|| format!("Could not create working directory {}", work_dir.display()))?;

    info!(work_dir = %work_dir.display(), "using working directory");

    let client = RuvClient::new()?;

    match cli.command {
        Command::Search {
            patterns,
            ignore_case,
            only_ids,
            catalog,
        } => {
            let programs = load_programs(&work_dir, &catalog, &client).await?;
            search_command(&programs, &patterns, ignore_case, only_ids);
            Ok(())
        }
        Command::Details {
            program_ids,
            catalog,
        } => {
            let programs = load_programs(&work_dir, &catalog, &client).await?;
            details_command(&programs, &program_ids);
            Ok(())
        }
        Command::DownloadProgram(mut args) => {
            let program_ids = program_ids_or_stdin(std::mem::take(&mut args.program_ids))?;
            let programs = load_programs(&work_dir, &args.catalog, &client).await?;
            download_command(&work_dir, &programs, &client, args, program_ids).await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}
