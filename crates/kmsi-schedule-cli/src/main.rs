//! `kmsi` CLI: book, check, edit and cancel class schedules from the command line.
//!
//! ## Usage
//!
//! ```sh
//! # Is teacher 3 and student 17 free on Monday 10:00-11:00?
//! kmsi check --teacher 3 --student 17 --date 2024-06-03 --start 10:00 --end 11:00
//!
//! # Book it, repeating weekly (four more weeks are projected)
//! kmsi --as-user 1 create --teacher 3 --student 17 --grade 2 \
//!     --date 2024-06-03 --start 10:00 --end 11:00 --recurring weekly
//!
//! # Mark the student present
//! kmsi attend 12 Present --topic "Scales"
//!
//! # Cancel (future) or remove (past) a booking
//! kmsi delete 12
//!
//! # List a week
//! kmsi list --from 2024-06-03 --to 2024-06-09
//!
//! # Classes still waiting for attendance
//! kmsi pending --teacher 3
//! ```
//!
//! Results are printed as JSON on stdout. Failures print the user-facing message
//! on stderr and exit non-zero.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand};
use kmsi_schedule::{
    AttendanceDraft, AttendanceId, AttendanceStatus, BookingDraft, BookingId, BookingStatus,
    Deletion, GradeId, LessonReport, RequestContext, Scheduler, SlotQuery, SqliteStore, StudentId,
    TeacherId, TimeRange, UserId,
};
use serde::Serialize;
use serde_json::json;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "kmsi", version, about = "KMSI class schedule management")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./kmsi.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file, overriding the configured one
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// User id recorded in audit fields (0 = system)
    #[arg(long, global = true, default_value_t = 0)]
    as_user: i64,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a teacher and a student are both free for a slot
    Check {
        #[arg(long)]
        teacher: i64,
        #[arg(long)]
        student: i64,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long, value_parser = parse_time)]
        start: NaiveTime,
        #[arg(long, value_parser = parse_time)]
        end: NaiveTime,
        /// Booking to ignore (the one being edited)
        #[arg(long)]
        exclude: Option<i64>,
    },
    /// Book a class
    Create(BookingArgs),
    /// Edit an existing booking
    Update {
        id: i64,
        #[command(flatten)]
        booking: BookingArgs,
    },
    /// Delete a booking (today or later: cancel it instead)
    Delete { id: i64 },
    /// Show one booking
    Show { id: i64 },
    /// List bookings between two dates, inclusive
    List {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
    /// Scheduled classes from yesterday on that still need attendance
    Pending {
        #[arg(long)]
        teacher: Option<i64>,
    },
    /// Record attendance for a booking
    Attend(AttendArgs),
    /// Delete an attendance record and reopen its booking
    Unattend { id: i64 },
}

#[derive(Args)]
struct BookingArgs {
    #[arg(long)]
    teacher: i64,
    #[arg(long)]
    student: i64,
    #[arg(long)]
    grade: i64,
    #[arg(long)]
    date: NaiveDate,
    #[arg(long, value_parser = parse_time)]
    start: NaiveTime,
    #[arg(long, value_parser = parse_time)]
    end: NaiveTime,
    #[arg(long = "type", default_value = "Regular")]
    schedule_type: String,
    #[arg(long, default_value = "Scheduled")]
    status: BookingStatus,
    #[arg(long)]
    room: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    /// Recurrence pattern; "weekly" projects four more weekly lessons
    #[arg(long)]
    recurring: Option<String>,
}

impl BookingArgs {
    fn into_draft(self) -> BookingDraft {
        let mut draft = BookingDraft::new(
            TeacherId(self.teacher),
            StudentId(self.student),
            GradeId(self.grade),
            self.date,
            self.start,
            self.end,
        );
        draft.schedule_type = self.schedule_type;
        draft.status = self.status;
        draft.room = self.room;
        draft.notes = self.notes;
        if let Some(pattern) = self.recurring {
            draft = draft.recurring(&pattern);
        }
        draft
    }
}

#[derive(Args)]
struct AttendArgs {
    booking: i64,
    /// Present, Absent or Late
    status: AttendanceStatus,
    /// Attendance date (defaults to the booking date)
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long, value_parser = parse_time)]
    actual_start: Option<NaiveTime>,
    #[arg(long, value_parser = parse_time)]
    actual_end: Option<NaiveTime>,
    #[arg(long)]
    topic: Option<String>,
    #[arg(long)]
    progress: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long)]
    homework: Option<String>,
    #[arg(long)]
    next_prep: Option<String>,
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    score: Option<u8>,
}

impl AttendArgs {
    fn report(&self) -> LessonReport {
        LessonReport {
            actual_start: self.actual_start,
            actual_end: self.actual_end,
            lesson_topic: self.topic.clone(),
            student_progress: self.progress.clone(),
            teacher_notes: self.notes.clone(),
            homework_assigned: self.homework.clone(),
            next_lesson_prep: self.next_prep.clone(),
            performance_score: self.score,
        }
    }
}

fn parse_time(raw: &str) -> std::result::Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| format!("'{raw}' is not a time of day (expected HH:MM)"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let database = cli.db.clone().unwrap_or_else(|| config.database.clone());
    let store = SqliteStore::open(&database, config.busy_timeout())
        .with_context(|| format!("failed to open database: {}", database.display()))?;
    let mut scheduler = Scheduler::new(store);
    let ctx = RequestContext::new(UserId(cli.as_user), config.local_now()?);

    tracing::debug!(database = %database.display(), now = %ctx.now, "starting");
    run(cli.command, &mut scheduler, &ctx)
}

fn run(
    command: Commands,
    scheduler: &mut Scheduler<SqliteStore>,
    ctx: &RequestContext,
) -> Result<()> {
    match command {
        Commands::Check {
            teacher,
            student,
            date,
            start,
            end,
            exclude,
        } => {
            let query = SlotQuery {
                teacher_id: TeacherId(teacher),
                student_id: StudentId(student),
                date,
                slot: TimeRange::new(start, end)?,
                exclude: exclude.map(BookingId),
            };
            print_json(&scheduler.check_availability(&query)?)
        }
        Commands::Create(args) => {
            let created = scheduler.create(ctx, args.into_draft())?;
            print_json(&json!({
                "message": "Schedule created successfully.",
                "booking": created.booking,
                "projection": created.projection,
            }))
        }
        Commands::Update { id, booking } => {
            let updated = scheduler.update(ctx, BookingId(id), booking.into_draft())?;
            print_json(&json!({
                "message": "Schedule updated successfully.",
                "booking": updated,
            }))
        }
        Commands::Delete { id } => match scheduler.delete(ctx, BookingId(id))? {
            Deletion::Cancelled(booking) => print_json(&json!({
                "message": "Schedule cancelled successfully.",
                "booking": booking,
            })),
            Deletion::Removed(id) => print_json(&json!({
                "message": "Schedule deleted successfully.",
                "removed": id,
            })),
        },
        Commands::Show { id } => print_json(&scheduler.get(BookingId(id))?),
        Commands::List { from, to } => print_json(&scheduler.list(from, to)?),
        Commands::Pending { teacher } => {
            print_json(&scheduler.pending_attendance(ctx, teacher.map(TeacherId))?)
        }
        Commands::Attend(args) => {
            let booking_id = BookingId(args.booking);
            let report = args.report();
            let attendance = if args.date.is_none() && report == LessonReport::default() {
                scheduler.quick_attendance(ctx, booking_id, args.status)?
            } else {
                let date = match args.date {
                    Some(date) => date,
                    None => scheduler.get(booking_id)?.date,
                };
                let draft = AttendanceDraft {
                    date,
                    status: args.status,
                    report,
                };
                scheduler.record_attendance(ctx, booking_id, draft)?
            };
            print_json(&json!({
                "message": "Attendance recorded successfully.",
                "attendance": attendance,
            }))
        }
        Commands::Unattend { id } => {
            scheduler.delete_attendance(ctx, AttendanceId(id))?;
            print_json(&json!({
                "message": "Attendance record deleted successfully.",
                "removed": id,
            }))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{text}");
    Ok(())
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("KMSI_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
