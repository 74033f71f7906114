//! Pulse CLI - Command-line interface for the SoulSync analytics core
//!
//! Commands:
//! - replay: Feed daily submissions through the engine (batch mode)
//! - insights: Print daily/weekly/monthly views from a state snapshot
//! - leaderboard: Print the streak leaderboard from a state snapshot
//! - validate: Validate submission input without mutating state

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use soulsync_pulse::ingest::parse_day;
use soulsync_pulse::types::{LeaderboardTimeframe, UserId};
use soulsync_pulse::{AnalyticsConfig, PulseEngine, QuizSubmission, PULSE_VERSION};

/// Pulse - Temporal wellness analytics engine
#[derive(Parser)]
#[command(name = "pulse")]
#[command(author = "SoulSync")]
#[command(version = PULSE_VERSION)]
#[command(about = "Replay daily risk submissions and inspect the projections", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed daily submissions through the engine (batch mode)
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Load engine state from a snapshot before replaying
        #[arg(long)]
        load_state: Option<PathBuf>,

        /// Save engine state to a snapshot after replaying
        #[arg(long)]
        save_state: Option<PathBuf>,

        /// Episode open threshold
        #[arg(long, default_value = "60")]
        open_threshold: f64,

        /// Episode continue threshold
        #[arg(long, default_value = "50")]
        continue_threshold: f64,

        /// Grace days before an episode closes
        #[arg(long, default_value = "3")]
        grace_days: u32,

        /// Print each ingest outcome as NDJSON
        #[arg(long)]
        verbose: bool,
    },

    /// Print insight views for a user from a state snapshot
    Insights {
        /// Engine state snapshot
        #[arg(long)]
        state: PathBuf,

        /// User id
        #[arg(long)]
        user: UserId,

        /// As-of day (YYYY-MM-DD)
        #[arg(long)]
        as_of: String,

        /// Which window to print
        #[arg(value_enum, default_value = "weekly")]
        window: Window,
    },

    /// Print the streak leaderboard from a state snapshot
    Leaderboard {
        /// Engine state snapshot
        #[arg(long)]
        state: PathBuf,

        /// Number of rows
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Rank by current or all-time streak
        #[arg(value_enum, long, default_value = "current")]
        timeframe: Timeframe,
    },

    /// Validate submission input without mutating state
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one submission per line)
    Ndjson,
    /// JSON array of submissions
    Json,
}

#[derive(Clone, ValueEnum)]
enum Window {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Clone, ValueEnum)]
enum Timeframe {
    Current,
    All,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Commands::Replay {
            input,
            input_format,
            load_state,
            save_state,
            open_threshold,
            continue_threshold,
            grace_days,
            verbose,
        } => {
            let config =
                AnalyticsConfig::with_thresholds(open_threshold, continue_threshold, grace_days);
            let engine = PulseEngine::with_config(config);

            if let Some(path) = load_state {
                let json = fs::read_to_string(&path)
                    .map_err(|e| format!("reading {}: {e}", path.display()))?;
                engine.import_state(&json).map_err(|e| e.to_string())?;
            }

            let submissions = read_submissions(&input, &input_format)?;
            let total = submissions.len();
            let mut accepted = 0usize;
            let mut rejected = 0usize;
            for submission in submissions {
                match engine.submit(submission) {
                    Ok(outcome) => {
                        accepted += 1;
                        if verbose {
                            let line = serde_json::to_string(&outcome)
                                .map_err(|e| e.to_string())?;
                            println!("{line}");
                        }
                    }
                    Err(err) => {
                        rejected += 1;
                        eprintln!("rejected: {err}");
                    }
                }
            }
            eprintln!("replayed {total} submissions: {accepted} accepted, {rejected} rejected");

            if let Some(path) = save_state {
                let json = engine.export_state().map_err(|e| e.to_string())?;
                fs::write(&path, json)
                    .map_err(|e| format!("writing {}: {e}", path.display()))?;
            }
            Ok(())
        }

        Commands::Insights {
            state,
            user,
            as_of,
            window,
        } => {
            let engine = load_engine(&state)?;
            let as_of = parse_day(&as_of).map_err(|e| e.to_string())?;
            let json = match window {
                Window::Daily => serde_json::to_string_pretty(&engine.daily_insights(user, as_of)),
                Window::Weekly => {
                    serde_json::to_string_pretty(&engine.weekly_insights(user, as_of))
                }
                Window::Monthly => {
                    serde_json::to_string_pretty(&engine.monthly_insights(user, as_of))
                }
            }
            .map_err(|e| e.to_string())?;
            println!("{json}");
            Ok(())
        }

        Commands::Leaderboard {
            state,
            limit,
            timeframe,
        } => {
            let engine = load_engine(&state)?;
            let timeframe = match timeframe {
                Timeframe::Current => LeaderboardTimeframe::Current,
                Timeframe::All => LeaderboardTimeframe::All,
            };
            let rows = engine.leaderboard(limit, timeframe);
            let json = serde_json::to_string_pretty(&rows).map_err(|e| e.to_string())?;
            println!("{json}");
            Ok(())
        }

        Commands::Validate {
            input,
            input_format,
        } => {
            let submissions = read_submissions(&input, &input_format)?;
            eprintln!("{} submissions parsed", submissions.len());
            Ok(())
        }
    }
}

fn load_engine(state: &PathBuf) -> Result<PulseEngine, String> {
    let json =
        fs::read_to_string(state).map_err(|e| format!("reading {}: {e}", state.display()))?;
    let engine = PulseEngine::new();
    engine.import_state(&json).map_err(|e| e.to_string())?;
    Ok(engine)
}

fn read_submissions(
    input: &PathBuf,
    format: &InputFormat,
) -> Result<Vec<QuizSubmission>, String> {
    let raw = if input.as_os_str() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err("stdin is a terminal; pipe submissions or pass --input FILE".to_string());
        }
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| e.to_string())?;
        buffer
    } else {
        fs::read_to_string(input).map_err(|e| format!("reading {}: {e}", input.display()))?
    };

    match format {
        InputFormat::Json => {
            serde_json::from_str::<Vec<QuizSubmission>>(&raw).map_err(|e| e.to_string())
        }
        InputFormat::Ndjson => {
            let mut submissions = Vec::new();
            for (number, line) in io::Cursor::new(raw).lines().enumerate() {
                let line = line.map_err(|e| e.to_string())?;
                if line.trim().is_empty() {
                    continue;
                }
                let submission: QuizSubmission = serde_json::from_str(&line)
                    .map_err(|e| format!("line {}: {e}", number + 1))?;
                submissions.push(submission);
            }
            Ok(submissions)
        }
    }
}
