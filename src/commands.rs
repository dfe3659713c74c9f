//! Subcommand handlers.
//!
//! Each handler talks to the record store, runs the aggregation engine over
//! what it loaded and prints the result. Handlers return the process exit
//! code on success.

use crate::analysis::{
    class_stats, daily_series, enrich_records, filter_records, filter_students, global_stats,
    has_existing_record, unique_class_ids, Clock,
};
use crate::cli::{AttendanceCommand, Command, OutputFormat, StudentsCommand};
use crate::config::Config;
use crate::models::{
    AttendanceDate, AttendanceFilter, AttendanceStatus, EnrichedRecord, NewAttendanceRecord,
    NewStudent,
};
use crate::report::{self, NarrativeClient};
use crate::store::RecordStore;
use crate::workflow::{self, BatchOptions, LoadOutcome, MarkClassRequest, MarkResult, Snapshot, SnapshotLoader};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything a handler needs.
pub struct App {
    pub store: Arc<dyn RecordStore>,
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    /// Show progress bars for batch work.
    pub show_progress: bool,
}

impl App {
    fn today(&self) -> AttendanceDate {
        AttendanceDate::from_naive(self.clock.today())
    }

    /// Load a roster and record set together.
    async fn load_snapshot(&self, filter: &AttendanceFilter) -> Result<Snapshot> {
        let loader = SnapshotLoader::new(self.store.clone());
        match loader.load(filter).await.context("Failed to load attendance data")? {
            LoadOutcome::Loaded(snapshot) => Ok(snapshot),
            LoadOutcome::Stale => anyhow::bail!("Attendance data changed while loading, try again"),
        }
    }
}

/// Run one subcommand. Returns the exit code.
pub async fn run_command(app: &App, command: Command) -> Result<i32> {
    debug!("Running {:?}", command);

    match command {
        Command::Students(cmd) => students(app, cmd).await,
        Command::Classes => classes(app).await,
        Command::Attendance(cmd) => attendance(app, cmd).await,
        Command::Stats { class, days } => stats(app, class, days).await,
        Command::Export {
            class,
            format,
            output,
            days,
        } => export(app, class, format, output, days).await,
        Command::Narrative { student, output } => narrative(app, &student, output).await,
    }
}

async fn students(app: &App, cmd: StudentsCommand) -> Result<i32> {
    match cmd {
        StudentsCommand::List { search, class } => {
            let roster = app
                .store
                .list_students()
                .await
                .context("Failed to list students")?;

            let mut matches = filter_students(&roster, search.as_deref().unwrap_or(""));
            if let Some(ref class_id) = class {
                matches.retain(|s| &s.class_id == class_id);
            }

            if matches.is_empty() {
                println!("No students found.");
                return Ok(0);
            }

            println!("👥 {} of {} students:\n", matches.len(), roster.len());
            for student in &matches {
                println!(
                    "   {:<8} {:<6} {:<28} {}",
                    student.student_id, student.roll_no, student.name, student.class_id
                );
            }
            Ok(0)
        }

        StudentsCommand::Add {
            name,
            roll_no,
            class,
            parent_name,
            parent_phone,
        } => {
            let new_student = NewStudent {
                name,
                roll_no,
                class_id: class,
                parent_name,
                parent_phone,
            };
            new_student.validate().map_err(anyhow::Error::msg)?;

            let created = app
                .store
                .create_student(&new_student)
                .await
                .context("Failed to add student")?;

            match created {
                Some(created) => {
                    info!("Created student {}", created.student_id);
                    println!(
                        "✅ Added {} (id {}, roll no. {}) to {}",
                        created.name, created.student_id, created.roll_no, created.class_id
                    );
                }
                None => {
                    info!("Store accepted {} without returning an id", new_student.name);
                    println!(
                        "✅ Added {} (roll no. {}) to {}",
                        new_student.name, new_student.roll_no, new_student.class_id
                    );
                    println!("   Run `rollcall students list` to see the assigned id.");
                }
            }
            Ok(0)
        }

        StudentsCommand::Remove { id } => {
            app.store
                .delete_student(&id)
                .await
                .with_context(|| format!("Failed to remove student {}", id))?;

            println!("🗑️  Removed student {}", id);
            println!("   Their attendance records were kept and show up as removed students.");
            Ok(0)
        }
    }
}

async fn classes(app: &App) -> Result<i32> {
    let roster = app
        .store
        .list_students()
        .await
        .context("Failed to list students")?;

    let class_ids = unique_class_ids(&roster);
    if class_ids.is_empty() {
        println!("No classes on the roster.");
        return Ok(0);
    }

    println!("🏫 {} classes:\n", class_ids.len());
    for class_id in class_ids {
        let size = roster.iter().filter(|s| s.class_id == class_id).count();
        println!("   {:<12} {} students", class_id, size);
    }
    Ok(0)
}

async fn attendance(app: &App, cmd: AttendanceCommand) -> Result<i32> {
    match cmd {
        AttendanceCommand::List {
            student,
            date,
            class,
        } => {
            let filter = AttendanceFilter {
                student_id: student,
                date,
                class_id: class,
            };
            let enriched = list_records(app, &filter).await?;

            if enriched.is_empty() {
                println!("No attendance records found.");
                return Ok(0);
            }

            println!("📋 {} attendance records:\n", enriched.len());
            for record in &enriched {
                let removed = if record.on_roster { "" } else { " (removed)" };
                println!(
                    "   {}  {} {:<9} {}{}  [{}]",
                    record.date,
                    record.status.emoji(),
                    record.status.to_string(),
                    record.display_name(),
                    removed,
                    record.attendance_id
                );
            }
            Ok(0)
        }

        AttendanceCommand::Mark {
            student,
            status,
            date,
        } => {
            let date = date.unwrap_or_else(|| app.today());
            let status = AttendanceStatus::from(status);

            let filter = AttendanceFilter {
                student_id: Some(student.clone()),
                date: Some(date),
                class_id: None,
            };
            let snapshot = app.load_snapshot(&filter).await?;

            let known = snapshot
                .students
                .iter()
                .find(|s| s.student_id == student)
                .with_context(|| format!("Unknown student {}", student))?;

            if has_existing_record(&snapshot.records, &student, &date) {
                anyhow::bail!("{} is already marked for {}", known.name, date);
            }

            let created = app
                .store
                .create_attendance(&NewAttendanceRecord {
                    student_id: student.clone(),
                    date,
                    status,
                })
                .await
                .with_context(|| format!("Failed to mark {}", student))?;

            let record_id = created
                .map(|r| format!(" (record {})", r.attendance_id))
                .unwrap_or_default();
            println!(
                "{} Marked {} {} for {}{}",
                status.emoji(),
                known.name,
                status,
                date,
                record_id
            );
            Ok(0)
        }

        AttendanceCommand::MarkClass {
            class,
            status,
            overrides,
            date,
        } => {
            let date = date.unwrap_or_else(|| app.today());
            let filter = AttendanceFilter {
                date: Some(date),
                ..AttendanceFilter::default()
            };
            let snapshot = app.load_snapshot(&filter).await?;

            if !snapshot.students.iter().any(|s| s.class_id == class) {
                anyhow::bail!("No students in class {}", class);
            }

            let request = MarkClassRequest {
                class_id: class,
                date,
                default_status: status.into(),
                overrides: overrides.into_iter().collect(),
            };
            let options = BatchOptions {
                concurrency: app.config.general.concurrency,
                show_progress: app.show_progress,
            };

            println!("📝 Marking {} for {}...", request.class_id, date);
            let summary =
                workflow::mark_class(app.store.as_ref(), &snapshot, &request, options).await;

            for outcome in &summary.outcomes {
                match outcome.result {
                    MarkResult::Created { .. } => {}
                    MarkResult::Skipped { ref reason } => {
                        println!("   ⏭️  {} ({}): {}", outcome.name, outcome.student_id, reason)
                    }
                    MarkResult::Failed { ref message } => {
                        eprintln!("   ⚠️  {} ({}): {}", outcome.name, outcome.student_id, message)
                    }
                }
            }

            if summary.has_failures() {
                eprintln!("\n⛔ {}", summary);
                return Ok(2);
            }

            println!("\n✅ {}", summary);
            Ok(0)
        }

        AttendanceCommand::Remove { id } => {
            app.store
                .delete_attendance(&id)
                .await
                .with_context(|| format!("Failed to remove attendance record {}", id))?;

            println!("🗑️  Removed attendance record {}", id);
            Ok(0)
        }
    }
}

/// Records matching `filter`, newest first, with roster display fields.
async fn list_records(app: &App, filter: &AttendanceFilter) -> Result<Vec<EnrichedRecord>> {
    let snapshot = app.load_snapshot(filter).await?;

    // The store may ignore filters it does not support.
    let records = filter_records(&snapshot.students, &snapshot.records, filter);
    let mut enriched = enrich_records(&snapshot.students, &records);
    enriched.sort_by(|a, b| b.date.cmp(&a.date));

    Ok(enriched)
}

async fn stats(app: &App, class: Option<String>, days: Option<usize>) -> Result<i32> {
    let window_days = days.unwrap_or(app.config.stats.window_days);
    let snapshot = app.load_snapshot(&AttendanceFilter::default()).await?;
    let clock = app.clock.as_ref();

    let stats = global_stats(&snapshot.students, &snapshot.records, clock);

    println!("📊 Attendance Summary:");
    println!("   Students: {}", stats.total_students);
    println!("   Records: {}", stats.total_records);
    println!("   Overall: {}", report::rate_line(&stats));
    println!(
        "   Today ({}): {} present | {} absent",
        app.today(),
        stats.today_present,
        stats.today_absent
    );

    if let Some(class_stats) = class_stats(&snapshot.students, &snapshot.records, class.as_deref()) {
        println!("\n🏫 Class {}:", class_stats.class_id);
        println!("   Students: {}", class_stats.total_students);
        println!("   Records: {}", class_stats.total_records);
        println!("   Attendance rate: {}", class_stats.rate_display());
    }

    println!("\n📅 Last {} days:", window_days);
    for bucket in daily_series(&snapshot.records, window_days, clock) {
        println!(
            "   {:<7} {} {:<3} {} {:<3} {} {:<3} {} {}",
            bucket.label,
            AttendanceStatus::Present.emoji(),
            bucket.present,
            AttendanceStatus::HalfDay.emoji(),
            bucket.half_day,
            AttendanceStatus::Absent.emoji(),
            bucket.absent,
            AttendanceStatus::Excused.emoji(),
            bucket.excused
        );
    }

    Ok(0)
}

async fn export(
    app: &App,
    class: Option<String>,
    format: OutputFormat,
    output: Option<PathBuf>,
    days: Option<usize>,
) -> Result<i32> {
    let window_days = days.unwrap_or(app.config.stats.window_days);
    let output = output.unwrap_or_else(|| PathBuf::from(&app.config.general.output));

    let snapshot = app.load_snapshot(&AttendanceFilter::default()).await?;

    println!("📝 Generating report...");
    let report = report::assemble_report(
        &snapshot,
        app.clock.as_ref(),
        window_days,
        class.as_deref(),
        &app.config.api.base_url,
    );

    let content = match format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    std::fs::write(&output, &content)
        .with_context(|| format!("Failed to write report to {}", output.display()))?;

    println!("   Students: {}", report.stats.total_students);
    println!("   Records: {}", report.stats.total_records);
    println!("   Overall: {}", report.stats.rate_display());
    println!("\n✅ Report saved to: {}", output.display());
    Ok(0)
}

async fn narrative(app: &App, student_id: &str, output: Option<PathBuf>) -> Result<i32> {
    let filter = AttendanceFilter {
        student_id: Some(student_id.to_string()),
        ..AttendanceFilter::default()
    };
    let snapshot = app.load_snapshot(&filter).await?;

    let student = snapshot
        .students
        .iter()
        .find(|s| s.student_id == student_id)
        .with_context(|| format!("Unknown student {}", student_id))?;

    println!("🤖 Writing narrative for {}...", student.name);
    println!("   Model: {}", app.config.narrative.model);
    println!("   Ollama: {}", app.config.narrative.ollama_url);

    let client = NarrativeClient::new(app.config.narrative.clone())?;
    let text = client.generate(student, &snapshot.records).await?;

    match output {
        Some(path) => {
            std::fs::write(&path, &text)
                .with_context(|| format!("Failed to write narrative to {}", path.display()))?;
            println!("\n✅ Narrative saved to: {}", path.display());
        }
        None => println!("\n{}", text),
    }
    Ok(0)
}
