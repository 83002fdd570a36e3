use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use lodge_availability::config::Config;
use lodge_availability::engine::{
    Alternatives, AvailabilityEngine, CalendarDate, CalendarDay, DayStatus, EditContext,
    ToggleOutcome,
};
use lodge_availability::model::{Lodge, LodgeId};
use lodge_availability::notify::NotifyHub;
use lodge_availability::repository::LodgeRepository;
use lodge_availability::store::WalLodgeRepository;

#[derive(Parser)]
#[command(name = "lodge-availability")]
#[command(about = "Manage lodge availability: blocked and booked dates, stay checks")]
struct Cli {
    /// Directory holding the lodge log (overrides LODGE_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Insert lodges from a JSON array file
    Import { file: PathBuf },
    /// Print every lodge as JSON
    Export,
    /// One line per lodge
    List,
    /// Check a stay and suggest other lodges when it is taken
    Check {
        lodge: String,
        check_in: String,
        check_out: String,
    },
    /// Cycle one date: available, booked, blocked, available
    Toggle {
        lodge: String,
        date: String,
        /// Act as an admin in edit mode
        #[arg(long)]
        admin: bool,
    },
    /// Print one month with a status letter per day
    Calendar {
        lodge: String,
        /// Month as YYYY-MM
        month: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    std::fs::create_dir_all(&config.data_dir)?;
    let repo = Arc::new(WalLodgeRepository::open(
        &config.wal_path(),
        config.compact_threshold,
    )?);
    info!(
        "lodge store: {} ({} lodges)",
        config.wal_path().display(),
        repo.len()
    );
    let engine = AvailabilityEngine::new(repo.clone(), Arc::new(NotifyHub::new()))
        .with_repo_timeout(config.repo_timeout);

    match cli.command {
        Command::Import { file } => {
            let content = std::fs::read_to_string(&file)?;
            let lodges: Vec<Lodge> = serde_json::from_str(&content)?;
            let mut imported = 0usize;
            for lodge in lodges {
                match repo.insert(lodge).await {
                    Ok(stored) => {
                        imported += 1;
                        println!("imported {} {}", stored.id, stored.name);
                    }
                    Err(e) => eprintln!("skipped: {e}"),
                }
            }
            println!("{imported} lodges imported");
        }
        Command::Export => {
            let lodges = repo.list().await?;
            println!("{}", serde_json::to_string_pretty(&lodges)?);
        }
        Command::List => {
            for lodge in repo.list().await? {
                println!(
                    "{}\t{}\t{}\t{:.2}",
                    lodge.id, lodge.name, lodge.location, lodge.price_per_person_per_night
                );
            }
        }
        Command::Check {
            lodge,
            check_in,
            check_out,
        } => {
            let id = LodgeId::new(lodge);
            let check_in = CalendarDate::parse(&check_in)?;
            let check_out = CalendarDate::parse(&check_out)?;
            let outcome = match engine.search(&id, Some(check_in), Some(check_out)).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    eprintln!("{}", e.user_message());
                    return Err(e.into());
                }
            };
            println!("{}", outcome.availability.message());
            if let Some(message) = outcome.alternatives.message() {
                println!("{message}");
            }
            match outcome.alternatives {
                Alternatives::Found(found) => {
                    for alt in found {
                        println!(
                            "  {}\t{}\t{}\t{:.2}",
                            alt.id, alt.name, alt.location, alt.price_per_person_per_night
                        );
                    }
                }
                Alternatives::LookupFailed(message) => eprintln!("{message}"),
                Alternatives::NotNeeded => {}
            }
        }
        Command::Toggle { lodge, date, admin } => {
            let id = LodgeId::new(lodge);
            let date = CalendarDate::parse(&date)?;
            let ctx = if admin {
                EditContext::editing()
            } else {
                EditContext::guest()
            };
            match engine.toggle_date(&id, date, &ctx).await {
                Ok(ToggleOutcome::Applied { date, from, to, .. }) => {
                    println!("{date}: {} -> {}", from.label(), to.label());
                }
                Ok(ToggleOutcome::Ignored(reason)) => {
                    println!("{date}: ignored ({})", reason.label());
                }
                Err(e) => {
                    eprintln!("{}", e.user_message());
                    return Err(e.into());
                }
            }
        }
        Command::Calendar { lodge, month } => {
            let id = LodgeId::new(lodge);
            let (year, month) = parse_month(&month)?;
            let days = engine
                .month_calendar(&id, year, month, CalendarDate::today(), None)
                .await?;
            print_month(&days);
        }
    }

    Ok(())
}

fn parse_month(s: &str) -> Result<(i32, u32), String> {
    let bad = || format!("invalid month {s:?} (expected YYYY-MM)");
    let (year, month) = s.split_once('-').ok_or_else(bad)?;
    let year: i32 = year.parse().map_err(|_| bad())?;
    let month: u32 = month.parse().map_err(|_| bad())?;
    if !(1..=12).contains(&month) {
        return Err(bad());
    }
    Ok((year, month))
}

/// `.` available, `B` booked, `X` blocked; past days in lowercase.
fn print_month(days: &[CalendarDay]) {
    let Some(first) = days.first() else { return };
    println!("{:04}-{:02}", first.date.year(), first.date.month());
    println!(" Mo  Tu  We  Th  Fr  Sa  Su");

    let mut line = "    ".repeat(first.date.weekday_from_monday() as usize);
    for day in days {
        let letter = match (day.status, day.past) {
            (DayStatus::Available, _) => '.',
            (DayStatus::Booked, false) => 'B',
            (DayStatus::Booked, true) => 'b',
            (DayStatus::Blocked, false) => 'X',
            (DayStatus::Blocked, true) => 'x',
        };
        line.push_str(&format!("{:>2}{} ", day.date.day(), letter));
        if day.date.weekday_from_monday() == 6 {
            println!("{}", line.trim_end());
            line.clear();
        }
    }
    if !line.is_empty() {
        println!("{}", line.trim_end());
    }
}
