use chrono::Utc;
use clap::{Parser, Subcommand};
use meta_study::config::Config;
use meta_study::database::{ReviewStore, SqliteStore};
use meta_study::export::json::{collect, read_backup, restore, write_backup};
use meta_study::models::NewLocation;
use meta_study::{NextCard, Quality, StudySession};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "meta-study", about = "Spaced-repetition study of location metas")]
struct Cli {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, env = "META_STUDY_DB")]
    db: Option<PathBuf>,

    /// Only study these countries (comma separated)
    #[arg(long, env = "META_STUDY_COUNTRIES", value_delimiter = ',')]
    countries: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture a new location
    Add {
        country: String,
        meta: String,
        #[arg(long, default_value = "")]
        note: String,
        #[arg(long)]
        image_url: Option<String>,
    },
    /// Show the next location to study
    Next,
    /// Grade a location 0-5
    Grade { id: i64, quality: Quality },
    /// Due and total counts per bucket
    Counts,
    /// Reviews per day with success rate
    Stats,
    /// Back up all locations and progress to JSON
    Export { path: PathBuf },
    /// Restore locations and progress from a JSON backup
    Import { path: PathBuf },
}

/// Opens the configured database as-is; nothing is written until a subcommand asks for it.
fn open_session(config: &Config) -> Result<StudySession<SqliteStore>, Box<dyn std::error::Error>> {
    let store = SqliteStore::open(&config.database_path)?;
    Ok(StudySession::new(store, config.filter()))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?.with_overrides(cli.db, cli.countries);

    let mut session = open_session(&config)?;
    let now = Utc::now();

    match cli.command {
        Command::Add {
            country,
            meta,
            note,
            image_url,
        } => {
            let location = session.add_location(
                NewLocation {
                    country,
                    meta,
                    note,
                    image_url,
                },
                now,
            )?;
            println!("Added location {}", location.id);
        }
        Command::Next => match session.next_card(now, &mut rand::thread_rng())? {
            NextCard::NoCardsAvailable => println!("No cards available"),
            next => {
                let id = next.card_id().unwrap_or_default();
                if let Some(location) = session.store().get_location(id)? {
                    let tag = if matches!(next, NextCard::Due(_)) {
                        "due"
                    } else {
                        "practice"
                    };
                    println!("[{}] #{} {}", tag, location.id, location.meta);
                    if !location.note.is_empty() {
                        println!("  note: {}", location.note);
                    }
                    println!("  answer: {}", location.country);
                }
            }
        },
        Command::Grade { id, quality } => {
            let outcome = session.grade(id, quality, now)?;
            println!(
                "#{} is now {} (interval {}d, ease {:.2}), due {}",
                id,
                outcome.record.state,
                outcome.record.interval,
                outcome.record.ease_factor,
                outcome.record.due_at.format("%Y-%m-%d %H:%M")
            );
        }
        Command::Counts => {
            let counts = session.due_counts(now)?;
            println!("new:    {} due / {} total", counts.new_due, counts.new_total);
            println!("review: {} due / {} total", counts.review_due, counts.review_total);
            println!("lapsed: {} due / {} total", counts.lapsed_due, counts.lapsed_total);
        }
        Command::Stats => {
            let stats = session.daily_stats()?;
            if stats.is_empty() {
                println!("No reviews yet");
            }
            for day in stats {
                println!(
                    "{}  {:>4} reviews  {:>5.1}% success",
                    day.day,
                    day.count,
                    day.success_rate * 100.0
                );
            }
        }
        Command::Export { path } => {
            let collection = collect(session.store())?;
            write_backup(&collection, &path)?;
            println!("Exported {} locations", collection.locations.len());
        }
        Command::Import { path } => {
            let collection = read_backup(&path)?;
            let mut store = session.into_store();
            let added = restore(&mut store, &collection, now)?;
            println!("Imported {} locations", added);
        }
    }

    Ok(())
}
