use std::fmt;

use chrono::{DateTime, Utc};
use pylearn_core::LearnerState;
use pylearn_core::model::{Exercise, KnowledgeLevel, LearnerId, Lesson, Module, StudyPlan};
use storage::repository::{NewLearnerRecord, Storage};
use tracing_subscriber::EnvFilter;

const TOPICS: [(&str, [&str; 4]); 5] = [
    ("Python Basics", ["Variables", "Numbers", "Strings", "Input and Output"]),
    ("Control Flow", ["Conditionals", "While Loops", "For Loops", "Comprehensions"]),
    ("Functions", ["Defining Functions", "Arguments", "Scope", "Lambdas"]),
    ("Collections", ["Lists", "Tuples", "Dictionaries", "Sets"]),
    ("Objects", ["Classes", "Methods", "Inheritance", "Dunder Methods"]),
];

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    language: String,
    level: KnowledgeLevel,
    modules: u32,
    lessons: u32,
    plan_file: Option<String>,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidLevel { raw: String },
    InvalidModules { raw: String },
    InvalidLessons { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidLevel { raw } => write!(f, "invalid --level value: {raw}"),
            ArgsError::InvalidModules { raw } => write!(f, "invalid --modules value: {raw}"),
            ArgsError::InvalidLessons { raw } => write!(f, "invalid --lessons value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
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

fn parse_count(value: &str) -> Option<u32> {
    value.parse::<u32>().ok().filter(|n| *n > 0)
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("PYLEARN_DB_URL")
            .unwrap_or_else(|_| "sqlite:pylearn.sqlite3?mode=rwc".into());
        let mut language = "Python".to_string();
        let mut level = KnowledgeLevel::Beginner;
        let mut modules = 3;
        let mut lessons = 4;
        let mut plan_file = None;
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--language" => {
                    language = require_value(&mut args, "--language")?;
                }
                "--level" => {
                    let value = require_value(&mut args, "--level")?;
                    level = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidLevel { raw: value.clone() })?;
                }
                "--modules" => {
                    let value = require_value(&mut args, "--modules")?;
                    modules = parse_count(&value)
                        .ok_or_else(|| ArgsError::InvalidModules { raw: value.clone() })?;
                }
                "--lessons" => {
                    let value = require_value(&mut args, "--lessons")?;
                    lessons = parse_count(&value)
                        .ok_or_else(|| ArgsError::InvalidLessons { raw: value.clone() })?;
                }
                "--plan" => {
                    plan_file = Some(require_value(&mut args, "--plan")?);
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            language,
            level,
            modules,
            lessons,
            plan_file,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:pylearn.sqlite3?mode=rwc)");
    eprintln!("  --language <name>         Language being studied (default: Python)");
    eprintln!("  --level <level>           beginner | intermediate | advanced");
    eprintln!("  --modules <n>             Modules in the generated sample plan (default: 3)");
    eprintln!("  --lessons <n>             Lessons per module (default: 4)");
    eprintln!("  --plan <path>             Load the study plan from a JSON file instead");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PYLEARN_DB_URL, PYLEARN_LOG");
}

fn sample_plan(language: &str, modules: u32, lessons: u32) -> StudyPlan {
    let modules = (0..modules as usize)
        .map(|m| {
            let (title, names) = TOPICS[m % TOPICS.len()];
            let lessons = (0..lessons as usize)
                .map(|l| {
                    let name = names[l % names.len()];
                    let mut lesson = Lesson::new(name, format!("An introduction to {name}."));
                    lesson.objectives = vec![format!("Use {name} in a short program")];
                    lesson.exercise = Exercise {
                        description: format!("Write a snippet that practices {name}."),
                        code_template: "# your code here\n".into(),
                        ..Exercise::default()
                    };
                    lesson
                })
                .collect();
            Module::new(title, lessons)
        })
        .collect();
    StudyPlan::new(format!("{language} Fundamentals"), modules)
}

fn build_plan(args: &Args) -> Result<StudyPlan, Box<dyn std::error::Error>> {
    match &args.plan_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            Ok(StudyPlan::from_json(&raw).map_err(pylearn_core::Error::from)?)
        }
        None => Ok(sample_plan(&args.language, args.modules, args.lessons)),
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);
    let plan = build_plan(&args)?;

    // Validated through the domain type before the id is known.
    let draft = LearnerState::new(LearnerId::new(0), args.language.clone(), args.level, plan, now)
        .map_err(pylearn_core::Error::from)?;
    let id = storage
        .learners
        .insert_learner(NewLearnerRecord::from_state(&draft))
        .await?;

    println!(
        "Seeded learner {} ({} modules, {} lessons) into {}",
        id,
        draft.plan().module_count(),
        draft.plan().total_lessons(),
        args.db_url
    );

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PYLEARN_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    match std::env::var("PYLEARN_LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
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
