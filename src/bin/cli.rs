//! StratX CLI - Season schedule, caching, result export and offline strategy estimates

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

use stratx::models::{Confidence, TyreStatus};
use stratx::openf1::OpenF1Client;
use stratx::{AppConfig, LapTimeModel, LoadMode, PredictionEngine, SessionResultCache};

#[derive(Parser)]
#[command(name = "stratx")]
#[command(author, version, about = "Race strategy prediction CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Season to fetch (defaults to STRATX_SEASON)
    #[arg(long, global = true)]
    season: Option<u16>,

    /// Number of rounds in the season (defaults to STRATX_TOTAL_ROUNDS)
    #[arg(long, global = true)]
    rounds: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the season's races in round order
    Schedule {
        /// Show only the last N rounds that have started
        #[arg(long)]
        last: Option<usize>,
    },

    /// Fetch every round of the season and report what loaded
    Precache,

    /// Write cached race results as static JSON files
    Export {
        /// Output directory
        #[arg(short, long, default_value = "data/results")]
        out: PathBuf,
    },

    /// Estimate remaining tyre life
    Tyre {
        /// Tyre compound (SOFT, MEDIUM, HARD, INTERMEDIATE, WET)
        #[arg(short, long)]
        compound: String,

        /// Laps completed on the current set
        #[arg(short, long)]
        laps: u32,
    },

    /// Recommend a pit stop window
    Pit {
        #[arg(long)]
        current_lap: u32,

        #[arg(long)]
        total_laps: u32,
    },

    /// Estimate the chance of overtaking the car ahead
    Overtake {
        /// Gap to the car ahead in seconds
        #[arg(short, long)]
        gap: f64,

        #[arg(long, default_value = "MEDIUM")]
        driver_compound: String,

        #[arg(long, default_value = "MEDIUM")]
        target_compound: String,
    },

    /// Score the lap-time model against a completed race
    Validate {
        /// Round number
        #[arg(short, long)]
        round: u32,

        /// Number of classified drivers to evaluate
        #[arg(long, default_value = "5")]
        top: usize,

        /// Model artifact directory (defaults to MODEL_DIR)
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if let Some(season) = cli.season {
        config.season = season;
    }
    if let Some(rounds) = cli.rounds {
        config.total_rounds = rounds;
    }

    println!("{}", format!("StratX CLI v{}", env!("CARGO_PKG_VERSION")).cyan().bold());
    println!();

    match cli.command {
        Commands::Schedule { last } => {
            schedule(&config, last)?;
        }
        Commands::Precache => {
            precache(&config)?;
        }
        Commands::Export { out } => {
            export(&config, &out)?;
        }
        Commands::Tyre { compound, laps } => {
            tyre(&compound, laps);
        }
        Commands::Pit {
            current_lap,
            total_laps,
        } => {
            pit(current_lap, total_laps)?;
        }
        Commands::Overtake {
            gap,
            driver_compound,
            target_compound,
        } => {
            overtake(gap, &driver_compound, &target_compound)?;
        }
        Commands::Validate {
            round,
            top,
            model_dir,
        } => {
            let model_dir = model_dir.unwrap_or_else(|| config.model_dir.clone());
            validate(&config, round, top, &model_dir)?;
        }
    }

    Ok(())
}

fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
}

/// Sweep the whole season into a warm cache
fn warm_cache(rt: &Runtime, config: &AppConfig) -> Result<SessionResultCache<OpenF1Client>> {
    let client =
        OpenF1Client::new(config.client_config()).context("Failed to create OpenF1 client")?;
    let cache = SessionResultCache::new(client, config.season, config.total_rounds, LoadMode::Warm);

    println!(
        "{}: {} season, {} rounds",
        "Fetching".green(),
        config.season,
        config.total_rounds
    );

    let pb = ProgressBar::new(config.total_rounds as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let progress = pb.clone();
    rt.block_on(cache.warm_up_with(move |round, result| {
        progress.set_message(format!("R{}", round));
        if let Err(e) = result {
            progress.println(format!("{} R{}: {}", "Skipped".yellow(), round, e));
        }
        progress.inc(1);
    }));

    pb.finish_and_clear();
    Ok(cache)
}

fn schedule(config: &AppConfig, last: Option<usize>) -> Result<()> {
    let rt = runtime()?;
    let client =
        OpenF1Client::new(config.client_config()).context("Failed to create OpenF1 client")?;
    let sessions = rt
        .block_on(client.race_sessions(config.season))
        .with_context(|| format!("Failed to fetch the {} schedule", config.season))?;

    let now = Utc::now();
    let mut rounds: Vec<(usize, _)> = sessions.iter().enumerate().map(|(i, s)| (i + 1, s)).collect();
    if let Some(last) = last {
        rounds.retain(|(_, s)| s.started_by(now));
        let skip = rounds.len().saturating_sub(last);
        rounds = rounds.split_off(skip);
    }

    println!("{}: {} races in {}", "Schedule".green(), sessions.len(), config.season);
    if sessions.len() as u32 != config.total_rounds {
        println!(
            "{}: configured for {} rounds",
            "Warning".yellow(),
            config.total_rounds
        );
    }
    println!();
    println!("{:>5} {:<12} {:<20} {:<16} {:>8}", "Round", "Date", "Country", "Circuit", "Session");
    println!("{}", "-".repeat(65));
    for (round, session) in rounds {
        let line = format!(
            "{:>5} {:<12} {:<20} {:<16} {:>8}",
            round,
            session.date(),
            session.country_name,
            session.circuit_short_name,
            session.session_key
        );
        if session.started_by(now) {
            println!("{}", line);
        } else {
            println!("{}", line.dimmed());
        }
    }
    Ok(())
}

fn precache(config: &AppConfig) -> Result<()> {
    let rt = runtime()?;
    let cache = warm_cache(&rt, config)?;
    let records = rt.block_on(cache.get_all());

    println!();
    println!("{:>5} {:<32} {:<12} {:<6} Winner", "Round", "Race", "Date", "Laps");
    println!("{}", "-".repeat(72));
    for record in &records {
        let winner = record
            .results
            .first()
            .map(|r| format!("{} ({})", r.driver_code, r.team))
            .unwrap_or_default();
        println!(
            "{:>5} {:<32} {:<12} {:<6} {}",
            record.round,
            record.race_name,
            record.date,
            record.total_laps.map(|l| l.to_string()).unwrap_or_default(),
            winner
        );
    }

    println!(
        "\n{}: {}/{} rounds cached",
        "Complete".green(),
        records.len(),
        config.total_rounds
    );
    Ok(())
}

fn export(config: &AppConfig, out: &Path) -> Result<()> {
    let rt = runtime()?;
    let cache = warm_cache(&rt, config)?;
    let records = rt.block_on(cache.get_all());

    std::fs::create_dir_all(out)
        .with_context(|| format!("Failed to create output directory: {:?}", out))?;

    for record in &records {
        let filepath = out.join(format!("race_{}.json", record.round));
        let json = serde_json::to_string_pretty(record.as_ref())?;
        std::fs::write(&filepath, json)
            .with_context(|| format!("Failed to write {:?}", filepath))?;
    }

    let all: Vec<_> = records.iter().map(|r| r.as_ref()).collect();
    let filepath = out.join("all_races.json");
    std::fs::write(&filepath, serde_json::to_string_pretty(&all)?)
        .with_context(|| format!("Failed to write {:?}", filepath))?;

    println!(
        "{}: {} races saved to {:?}",
        "Complete".green(),
        records.len(),
        out
    );
    Ok(())
}

fn tyre(compound: &str, laps: u32) {
    let engine = PredictionEngine::heuristic_only();
    let prediction = engine.predict_tyre_life("-", compound, laps);

    let status = match prediction.status {
        TyreStatus::Critical => "CRITICAL".red().bold(),
        TyreStatus::Ok => "OK".green(),
    };
    println!(
        "{} after {} laps: {:.1}% remaining [{}]",
        prediction.compound, laps, prediction.value, status
    );
}

fn pit(current_lap: u32, total_laps: u32) -> Result<()> {
    if total_laps == 0 || current_lap > total_laps {
        anyhow::bail!(
            "Current lap must be within 0..={}, got {}",
            total_laps,
            current_lap
        );
    }

    let engine = PredictionEngine::heuristic_only();
    let window = engine.predict_pit_window("-", current_lap, total_laps);

    let confidence = match window.confidence {
        Confidence::High => "HIGH".green(),
        Confidence::Low => "LOW".yellow(),
    };
    println!(
        "Pit window: laps {}-{} (optimal {}), confidence {}",
        window.open_lap, window.close_lap, window.optimal_lap, confidence
    );
    Ok(())
}

fn overtake(gap: f64, driver_compound: &str, target_compound: &str) -> Result<()> {
    if !gap.is_finite() || gap < 0.0 {
        anyhow::bail!("Gap must be a non-negative number of seconds, got {}", gap);
    }

    let engine = PredictionEngine::heuristic_only();
    let prediction = engine.predict_overtake(gap, driver_compound, target_compound);
    println!(
        "Overtake chance at {:.2}s ({} vs {}): {:.0}%",
        gap,
        driver_compound.to_ascii_uppercase(),
        target_compound.to_ascii_uppercase(),
        prediction.probability * 100.0
    );
    Ok(())
}

fn validate(config: &AppConfig, round: u32, top: usize, model_dir: &Path) -> Result<()> {
    if round == 0 || round > config.total_rounds {
        anyhow::bail!("Round must be between 1 and {}, got {}", config.total_rounds, round);
    }

    let engine = PredictionEngine::new(LapTimeModel::load(model_dir));
    if !engine.model_loaded() {
        println!(
            "{}: no model in {:?}, scoring the heuristic estimate",
            "Warning".yellow(),
            model_dir
        );
    }

    let rt = runtime()?;
    let client =
        OpenF1Client::new(config.client_config()).context("Failed to create OpenF1 client")?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(format!("Fetching round {} of {}...", round, config.season));
    let session = rt.block_on(client.fetch_race(config.season, round));
    pb.finish_and_clear();

    let session =
        session.with_context(|| format!("Failed to fetch round {} of {}", round, config.season))?;
    if let Err(reason) = session.validate() {
        anyhow::bail!("Round {} has no usable results: {}", round, reason);
    }

    let report = engine.evaluate_session(&session, top);

    println!("{}: {} (round {})", "Validating".green(), report.race_name, report.round);
    println!();
    println!("{:<6} {:>6} {:>10} {:>10}", "Driver", "Laps", "Model", "MAE (s)");
    println!("{}", "-".repeat(36));
    for driver in &report.drivers {
        println!(
            "{:<6} {:>6} {:>10} {:>10}",
            driver.driver,
            driver.laps,
            driver.model_laps,
            driver
                .mean_absolute_error
                .map(|m| format!("{:.3}", m))
                .unwrap_or_else(|| "-".to_string())
        );
    }
    println!("{}", "-".repeat(36));

    match report.mean_absolute_error {
        Some(mae) => println!(
            "\n{}: {:.3}s over {} laps",
            "Overall MAE".green().bold(),
            mae,
            report.laps
        ),
        None => println!("\n{}: no timed laps to score", "Overall MAE".yellow()),
    }
    Ok(())
}
