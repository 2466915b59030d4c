use std::fmt;

use chrono::{DateTime, Duration, Utc};
use progress_core::model::{CourseId, ProgressRecord, ProgressUpdate, UserId, Video, VideoId};
use storage::repository::{ProgressKey, Storage};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    course_id: CourseId,
    user_id: UserId,
    videos: u32,
    completed: u32,
    video_seconds: f64,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidId { flag: &'static str, raw: String },
    InvalidCount { flag: &'static str, raw: String },
    InvalidSeconds { raw: String },
    InvalidNow { raw: String },
    CompletedExceedsVideos { completed: u32, videos: u32 },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw:?}"),
            ArgsError::InvalidCount { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidSeconds { raw } => write!(f, "invalid --video-seconds value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
            ArgsError::CompletedExceedsVideos { completed, videos } => {
                write!(f, "--completed ({completed}) cannot exceed --videos ({videos})")
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

fn parse_count(flag: &'static str, value: String) -> Result<u32, ArgsError> {
    value
        .parse::<u32>()
        .map_err(|_| ArgsError::InvalidCount { flag, raw: value })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("PROGRESS_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3?mode=rwc".into());
        let mut course_id = std::env::var("PROGRESS_COURSE_ID")
            .ok()
            .and_then(|value| value.parse::<CourseId>().ok())
            .unwrap_or_else(|| CourseId::new("intro-to-trading"));
        let mut user_id = std::env::var("PROGRESS_USER_ID")
            .ok()
            .and_then(|value| value.parse::<UserId>().ok())
            .unwrap_or_else(|| UserId::new("demo-user"));
        let mut videos = std::env::var("PROGRESS_VIDEOS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(4);
        let mut completed = std::env::var("PROGRESS_COMPLETED")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(2);
        let mut video_seconds = 600.0;
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
                "--course-id" => {
                    let value = require_value(&mut args, "--course-id")?;
                    course_id = value.parse().map_err(|_| ArgsError::InvalidId {
                        flag: "--course-id",
                        raw: value.clone(),
                    })?;
                }
                "--user-id" => {
                    let value = require_value(&mut args, "--user-id")?;
                    user_id = value.parse().map_err(|_| ArgsError::InvalidId {
                        flag: "--user-id",
                        raw: value.clone(),
                    })?;
                }
                "--videos" => {
                    videos = parse_count("--videos", require_value(&mut args, "--videos")?)?;
                }
                "--completed" => {
                    completed =
                        parse_count("--completed", require_value(&mut args, "--completed")?)?;
                }
                "--video-seconds" => {
                    let value = require_value(&mut args, "--video-seconds")?;
                    video_seconds = value
                        .parse::<f64>()
                        .ok()
                        .filter(|s| s.is_finite() && *s > 0.0)
                        .ok_or(ArgsError::InvalidSeconds { raw: value.clone() })?;
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

        if completed > videos {
            return Err(ArgsError::CompletedExceedsVideos { completed, videos });
        }

        Ok(Self {
            db_url,
            course_id,
            user_id,
            videos,
            completed,
            video_seconds,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3?mode=rwc)");
    eprintln!("  --course-id <id>          Course to populate (default: intro-to-trading)");
    eprintln!("  --user-id <id>            User whose progress is seeded (default: demo-user)");
    eprintln!("  --videos <n>              Number of videos in the course (default: 4)");
    eprintln!("  --completed <n>           Videos the user has finished (default: 2)");
    eprintln!("  --video-seconds <secs>    Duration of each video (default: 600)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!(
        "  PROGRESS_DB_URL, PROGRESS_COURSE_ID, PROGRESS_USER_ID, PROGRESS_VIDEOS, PROGRESS_COMPLETED"
    );
    eprintln!("  RUST_LOG controls log output (default: info)");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    for i in 0..args.videos {
        let video_id = VideoId::new(format!("{}-{:02}", args.course_id, i + 1));
        let video = Video::new(
            video_id.clone(),
            args.course_id.clone(),
            format!("Lesson {}", i + 1),
        )?
        .with_duration(args.video_seconds)?;
        storage.catalog.upsert_video(&video).await?;

        let stamped_at = now - Duration::minutes(i64::from(args.videos - i));
        let record = ProgressRecord::started(
            args.user_id.clone(),
            video_id.clone(),
            args.course_id.clone(),
            stamped_at,
        );
        if storage.progress.create_progress(&record).await? {
            storage.catalog.increment_views(&video_id, 1).await?;
        }

        if i < args.completed {
            let update = ProgressUpdate::compute(0.0, args.video_seconds, args.video_seconds, stamped_at)
                .ok_or("seed duration must be positive")?;
            let key = ProgressKey::new(args.user_id.clone(), video_id, args.course_id.clone());
            storage.progress.merge_progress(&key, &update).await?;
        }
    }

    tracing::info!(
        course_id = %args.course_id,
        user_id = %args.user_id,
        videos = args.videos,
        completed = args.completed,
        db_url = %args.db_url,
        "seeded course progress"
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
