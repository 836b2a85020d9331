use std::fmt;

use pylearn_core::ResetRequest;
use pylearn_core::model::{LearnerId, Position, Understanding};
use serde::Serialize;
use services::{AppServices, Clock, LessonLookup};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingCommand,
    UnknownCommand(String),
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidLearner { raw: String },
    InvalidUnderstanding { raw: String },
    InvalidNumber { flag: &'static str, raw: String },
    InvalidPosition { module: u32, lesson: u32 },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingCommand => write!(f, "missing subcommand"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidLearner { raw } => write!(f, "invalid --learner value: {raw}"),
            ArgsError::InvalidUnderstanding { raw } => write!(
                f,
                "invalid understanding: {raw} (expected poor, fair, good or excellent)"
            ),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidPosition { module, lesson } => {
                write!(f, "invalid position: module {module}, lesson {lesson}")
            }
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

fn parse_understanding(raw: String) -> Result<Understanding, ArgsError> {
    raw.trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|_| ArgsError::InvalidUnderstanding { raw })
}

fn parse_number(flag: &'static str, raw: String) -> Result<u32, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Status,
    Context,
    Complete { understanding: Understanding },
    Next,
    Understanding { level: Understanding },
    Reset(ResetRequest),
    Fix { understanding: Understanding },
    Brief,
}

struct Args {
    db_url: String,
    learner: LearnerId,
    command: Command,
}

impl Args {
    fn parse(argv: impl IntoIterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("PYLEARN_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://pylearn.sqlite3".into(), normalize_sqlite_url);
        let mut learner = std::env::var("PYLEARN_LEARNER")
            .ok()
            .and_then(|value| value.parse::<LearnerId>().ok())
            .unwrap_or_else(|| LearnerId::new(1));

        let mut command_name: Option<String> = None;
        let mut understanding = None;
        let mut module = None;
        let mut lesson = None;
        let mut clear = false;
        let mut positional = Vec::new();

        let mut args = argv.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--learner" => {
                    let value = require_value(&mut args, "--learner")?;
                    learner = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidLearner { raw: value.clone() })?;
                }
                "--understanding" => {
                    understanding = Some(parse_understanding(require_value(
                        &mut args,
                        "--understanding",
                    )?)?);
                }
                "--module" => {
                    module = Some(parse_number("--module", require_value(&mut args, "--module")?)?);
                }
                "--lesson" => {
                    lesson = Some(parse_number("--lesson", require_value(&mut args, "--lesson")?)?);
                }
                "--clear" => clear = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ if arg.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ if command_name.is_none() => command_name = Some(arg),
                _ => positional.push(arg),
            }
        }

        let name = command_name.ok_or(ArgsError::MissingCommand)?;
        let command = match name.as_str() {
            "status" => Command::Status,
            "context" => Command::Context,
            "complete" => Command::Complete {
                understanding: understanding.unwrap_or_default(),
            },
            "next" => Command::Next,
            "understanding" => {
                let level = match positional.pop() {
                    Some(raw) => parse_understanding(raw)?,
                    None => understanding.ok_or(ArgsError::MissingValue {
                        flag: "understanding",
                    })?,
                };
                Command::Understanding { level }
            }
            "reset" => {
                let module = module.unwrap_or(1);
                let lesson = lesson.unwrap_or(1);
                let position = Position::new(module, lesson)
                    .map_err(|_| ArgsError::InvalidPosition { module, lesson })?;
                Command::Reset(ResetRequest {
                    position,
                    clear_completed: clear,
                })
            }
            "fix" => Command::Fix {
                understanding: understanding.unwrap_or_default(),
            },
            "brief" => Command::Brief,
            _ => return Err(ArgsError::UnknownCommand(name)),
        };

        if let Some(extra) = positional.into_iter().next() {
            return Err(ArgsError::UnknownArg(extra));
        }

        Ok(Self {
            db_url,
            learner,
            command,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  pylearn [--db <sqlite_url>] [--learner <id>] <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  status                              Progress summary");
    eprintln!("  context                             Current lesson with neighbouring lessons");
    eprintln!("  complete [--understanding <level>]  Mark the current lesson done and advance");
    eprintln!("  next                                Move on without recording the lesson");
    eprintln!("  understanding <level>               Record self-assessed understanding");
    eprintln!("  reset [--module N] [--lesson N] [--clear]");
    eprintln!("                                      Move to a lesson, optionally clearing");
    eprintln!("                                      the completion history");
    eprintln!("  fix [--understanding <level>]       Backfill completions implied by the position");
    eprintln!("  brief                               Ask the tutor for a lesson brief");
    eprintln!();
    eprintln!("Levels: poor, fair, good, excellent (default: fair)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PYLEARN_DB_URL, PYLEARN_LEARNER, PYLEARN_LOG, PYLEARN_LOG_FORMAT,");
    eprintln!("  PYLEARN_AI_API_KEY, PYLEARN_AI_BASE_URL, PYLEARN_AI_MODEL");
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw.contains(":memory:") || raw.starts_with("sqlite://") || raw.contains("mode=memory") {
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
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
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

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PYLEARN_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    match std::env::var("PYLEARN_LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&args.db_url)?;
    let services = AppServices::new_sqlite(&args.db_url, Clock::default()).await?;
    let progress = services.progress();
    let id = args.learner;

    match args.command {
        Command::Status => print_json(&progress.get_progress(id).await?),
        Command::Context => {
            let lookup = progress.current_context(id).await?;
            if let LessonLookup::StalePosition { position, .. } = &lookup {
                eprintln!("position {position} is outside the plan; try `pylearn reset`");
            }
            print_json(&lookup)
        }
        Command::Complete { understanding } => {
            print_json(&progress.complete_lesson(id, understanding).await?)
        }
        Command::Next => print_json(&progress.next_lesson(id).await?),
        Command::Understanding { level } => {
            progress.update_understanding(id, level).await?;
            print_json(&progress.get_progress(id).await?)
        }
        Command::Reset(request) => print_json(&progress.reset_progress(id, request).await?),
        Command::Fix { understanding } => {
            print_json(&progress.fix_progress(id, understanding).await?)
        }
        Command::Brief => match progress.current_context(id).await? {
            LessonLookup::Found(ctx) => {
                let brief = services.tutor().brief_for(&ctx).await?;
                println!("{brief}");
                Ok(())
            }
            LessonLookup::StalePosition { position, modules } => Err(format!(
                "position {position} is outside the plan ({modules} modules); try `pylearn reset`"
            )
            .into()),
        },
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
