mod content;
mod logging;
mod practice;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use literacy_core::model::{ContentCatalog, SessionMode, SubjectId, UnitId};
use services::{Clock, EngineConfig, LearnerEngine};
use storage::repository::Storage;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidUnit { raw: String },
    InvalidMode { raw: String },
    InvalidNumber { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidUnit { raw } => write!(f, "invalid --unit value: {raw}"),
            ArgsError::InvalidMode { raw } => {
                write!(f, "invalid --mode value: {raw} (expected auto or menu)")
            }
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  literacy practice [--db <sqlite_url>] [--subject <id>] [--unit <n>]");
    eprintln!("                    [--mode auto|menu] [--rounds <n>] [--seed <n>]");
    eprintln!("  literacy stats    [--db <sqlite_url>] [--subject <id>] [--unit <n>]");
    eprintln!("  literacy export   [--db <sqlite_url>] [--out <path>]");
    eprintln!("  literacy reset    [--db <sqlite_url>] [--subject <id>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://literacy.sqlite3");
    eprintln!("  --subject reading");
    eprintln!("  --unit 1");
    eprintln!("  --mode <recommended>");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  LITERACY_DB_URL, LITERACY_SUBJECT, LITERACY_UNIT, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Practice,
    Stats,
    Export,
    Reset,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "practice" => Some(Self::Practice),
            "stats" => Some(Self::Stats),
            "export" => Some(Self::Export),
            "reset" => Some(Self::Reset),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    subject: SubjectId,
    unit: UnitId,
    mode: Option<SessionMode>,
    rounds: usize,
    seed: Option<u64>,
    out: Option<PathBuf>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            db_url: std::env::var("LITERACY_DB_URL")
                .ok()
                .map_or_else(|| "sqlite://literacy.sqlite3".into(), normalize_sqlite_url),
            subject: std::env::var("LITERACY_SUBJECT")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map_or_else(|| SubjectId::new("reading"), SubjectId::new),
            unit: std::env::var("LITERACY_UNIT")
                .ok()
                .and_then(|value| value.parse::<UnitId>().ok())
                .unwrap_or_else(|| UnitId::new(1)),
            mode: None,
            rounds: 6,
            seed: None,
            out: None,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--subject" => {
                    parsed.subject = SubjectId::new(require_value(args, "--subject")?);
                }
                "--unit" => {
                    let value = require_value(args, "--unit")?;
                    parsed.unit = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidUnit { raw: value.clone() })?;
                }
                "--mode" => {
                    let value = require_value(args, "--mode")?;
                    parsed.mode = Some(match value.as_str() {
                        "auto" => SessionMode::Auto,
                        "menu" => SessionMode::Menu,
                        _ => return Err(ArgsError::InvalidMode { raw: value }),
                    });
                }
                "--rounds" => {
                    let value = require_value(args, "--rounds")?;
                    parsed.rounds = value.parse().map_err(|_| ArgsError::InvalidNumber {
                        flag: "--rounds",
                        raw: value.clone(),
                    })?;
                }
                "--seed" => {
                    let value = require_value(args, "--seed")?;
                    parsed.seed = Some(value.parse().map_err(|_| ArgsError::InvalidNumber {
                        flag: "--seed",
                        raw: value.clone(),
                    })?);
                }
                "--out" => {
                    parsed.out = Some(PathBuf::from(require_value(args, "--out")?));
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Bare invocation or flags only: practice.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Practice,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Practice,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let parsed = Args::parse(&mut argv.into_iter()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url).await?;
    tracing::info!(db = %parsed.db_url, command = ?cmd, "storage ready");

    let catalog: Arc<dyn ContentCatalog> = Arc::new(content::catalog());
    let mut engine = LearnerEngine::load(
        storage,
        Arc::clone(&catalog),
        Clock::default_clock(),
        EngineConfig::default(),
        parsed.subject.clone(),
        parsed.unit,
    )
    .await?
    .with_letter_progression(content::letter_progression());

    match cmd {
        Command::Practice => {
            let mode = parsed.mode.unwrap_or_else(|| engine.recommended_mode());
            let mut rng = match parsed.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            let summary = practice::run_session(
                &mut engine,
                catalog.as_ref(),
                mode,
                parsed.unit,
                parsed.rounds,
                &mut rng,
            )
            .await?;

            println!(
                "{mode:?} session, unit {}: {}/{} correct, +{} XP",
                parsed.unit, summary.successes, summary.activities, summary.xp_earned
            );
            if summary.level_ups > 0 {
                println!(
                    "level up! now level {}",
                    engine.progress().global_state().current_level()
                );
            }
            if !summary.newly_mastered.is_empty() {
                println!("newly mastered: {}", summary.newly_mastered.join(", "));
            }
        }
        Command::Stats => print_stats(&engine, parsed.unit),
        Command::Export => {
            let json = engine.export_review_data()?;
            match parsed.out {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("exported word reviews to {}", path.display());
                }
                None => println!("{json}"),
            }
        }
        Command::Reset => {
            engine.reset().await?;
            println!("all progress for {} cleared", parsed.subject);
        }
    }

    Ok(())
}

fn print_stats(engine: &LearnerEngine, unit: UnitId) {
    let global = engine.progress().global_state();
    let level = engine.progress().level_progress();
    let blending = engine.reviews().get_overall_blending_stats(unit);

    println!("subject:        {}", engine.subject());
    println!(
        "level:          {} ({} XP, {} to next)",
        level.level,
        global.total_xp(),
        level.xp_for_next
    );
    println!("daily streak:   {}", global.daily_streak());
    println!(
        "units done:     {}",
        engine.progress().completed_unit_count(engine.subject())
    );
    println!(
        "words:          {} reviewed, {} mastered, {} in progress",
        blending.total_words, blending.mastered_words, blending.in_progress_words
    );
    println!("reviews:        {}", blending.total_reviews);
    println!("avg smoothness: {:.2}", blending.avg_smoothness);
    println!(
        "due now:        {}",
        engine.reviews().due_count(Clock::default_clock().now())
    );
    println!("recommended:    {:?}", engine.recommended_mode());
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    logging::init_tracing("info");
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
