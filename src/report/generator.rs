//! Attendance report generation.
//!
//! Builds an [`AttendanceReport`] from a loaded snapshot and renders it as
//! Markdown or JSON.

use crate::analysis::{
    class_breakdown, daily_series, enrich_records, filter_records, global_stats, lowest_attendance,
    student_summaries, Clock,
};
use crate::models::{
    AttendanceDate, AttendanceFilter, AttendanceReport, AttendanceStatus, ClassStats,
    DayBucket, EnrichedRecord, ReportMetadata, Stats, Student, StudentSummary,
};
use crate::workflow::Snapshot;
use anyhow::Result;
use chrono::Utc;

/// Students listed under "Needs Attention".
const NEEDS_ATTENTION_LIMIT: usize = 5;

/// Aggregate a snapshot into a report, optionally restricted to one class.
pub fn assemble_report(
    snapshot: &Snapshot,
    clock: &dyn Clock,
    window_days: usize,
    class_filter: Option<&str>,
    api_url: &str,
) -> AttendanceReport {
    debug_assert!(snapshot.is_complete(), "aggregating a failed load");

    let (students, records) = match class_filter {
        Some(class_id) => {
            let filter = AttendanceFilter {
                class_id: Some(class_id.to_string()),
                ..AttendanceFilter::default()
            };
            let students: Vec<Student> = snapshot
                .students
                .iter()
                .filter(|s| s.class_id == class_id)
                .cloned()
                .collect();
            let records = filter_records(&snapshot.students, &snapshot.records, &filter);
            (students, records)
        }
        None => (snapshot.students.clone(), snapshot.records.clone()),
    };

    let mut enriched = enrich_records(&snapshot.students, &records);
    enriched.sort_by(|a, b| b.date.cmp(&a.date));

    AttendanceReport {
        metadata: ReportMetadata {
            generated_at: Utc::now(),
            api_url: api_url.to_string(),
            class_filter: class_filter.map(str::to_string),
            reference_date: AttendanceDate::from_naive(clock.today()),
            window_days,
        },
        stats: global_stats(&students, &records, clock),
        classes: class_breakdown(&students, &records),
        daily: daily_series(&records, window_days, clock),
        students: student_summaries(&students, &records),
        records: enriched,
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &AttendanceReport) -> String {
    let mut output = String::new();

    // Title
    match report.metadata.class_filter {
        Some(ref class_id) => output.push_str(&format!("# Attendance Report: {}\n\n", class_id)),
        None => output.push_str("# Attendance Report\n\n"),
    }

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_table_of_contents(report));
    output.push_str(&generate_summary_section(&report.stats));
    output.push_str(&generate_classes_section(&report.classes));
    output.push_str(&generate_daily_section(&report.daily));
    output.push_str(&generate_students_section(&report.students));
    output.push_str(&generate_records_section(&report.records));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Record Store:** {}\n", metadata.api_url));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if let Some(ref class_id) = metadata.class_filter {
        section.push_str(&format!("- **Class:** {}\n", class_id));
    }
    section.push_str(&format!("- **Reference Date:** {}\n", metadata.reference_date));
    section.push_str(&format!("- **Daily Window:** {} days\n", metadata.window_days));
    section.push('\n');

    section
}

fn generate_table_of_contents(report: &AttendanceReport) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    toc.push_str("- [Summary](#summary)\n");
    if !report.classes.is_empty() {
        toc.push_str("- [Classes](#classes)\n");
    }
    toc.push_str(&format!(
        "- [Last {} Days](#last-{}-days)\n",
        report.metadata.window_days, report.metadata.window_days
    ));
    toc.push_str("- [Students](#students)\n");
    toc.push_str("- [Records](#records)\n");
    toc.push('\n');

    toc
}

/// Generate the summary section.
fn generate_summary_section(stats: &Stats) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| Students | Records | Attendance Rate | Present Today | Absent Today |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | **{}** | {} | {} |\n\n",
        stats.total_students,
        stats.total_records,
        stats.rate_display(),
        stats.today_present,
        stats.today_absent
    ));

    section
}

fn generate_classes_section(classes: &[ClassStats]) -> String {
    if classes.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Classes\n\n");
    section.push_str("| Class | Students | Records | Attendance Rate |\n");
    section.push_str("|:---|:---:|:---:|:---:|\n");

    for class in classes {
        section.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            class.class_id,
            class.total_students,
            class.total_records,
            class.rate_display()
        ));
    }
    section.push('\n');

    section
}

/// Generate the trailing daily series.
fn generate_daily_section(daily: &[DayBucket]) -> String {
    let mut section = String::new();

    section.push_str(&format!("## Last {} Days\n\n", daily.len()));
    section.push_str(&format!(
        "| Day | {} Present | {} Half Day | {} Absent | {} Excused | Total |\n",
        AttendanceStatus::Present.emoji(),
        AttendanceStatus::HalfDay.emoji(),
        AttendanceStatus::Absent.emoji(),
        AttendanceStatus::Excused.emoji(),
    ));
    section.push_str("|:---|:---:|:---:|:---:|:---:|:---:|\n");

    for bucket in daily {
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            bucket.label,
            bucket.present,
            bucket.half_day,
            bucket.absent,
            bucket.excused,
            bucket.total()
        ));
    }
    section.push('\n');

    section
}

/// Generate the per-student section.
fn generate_students_section(students: &[StudentSummary]) -> String {
    let mut section = String::new();

    section.push_str("## Students\n\n");

    if students.is_empty() {
        section.push_str("No students on the roster.\n\n");
        return section;
    }

    let needs_attention = lowest_attendance(students, NEEDS_ATTENTION_LIMIT);
    if !needs_attention.is_empty() {
        section.push_str("### Needs Attention\n\n");
        for summary in needs_attention {
            section.push_str(&format!(
                "- **{}** ({}): {} over {} days",
                summary.name,
                summary.class_id,
                summary.rate_display(),
                summary.total
            ));
            if !summary.recent_absences.is_empty() {
                let dates: Vec<String> =
                    summary.recent_absences.iter().map(|d| d.to_string()).collect();
                section.push_str(&format!(", last absent {}", dates.join(", ")));
            }
            section.push('\n');
        }
        section.push('\n');
    }

    section.push_str("### All Students\n\n");
    section.push_str("| Roll No | Name | Class | Present | Half Day | Absent | Excused | Rate |\n");
    section.push_str("|:---|:---|:---|:---:|:---:|:---:|:---:|:---:|\n");

    for summary in students {
        let rate = if summary.total == 0 {
            "-".to_string()
        } else {
            summary.rate_display()
        };
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} |\n",
            summary.roll_no,
            summary.name,
            summary.class_id,
            summary.present,
            summary.half_day,
            summary.absent,
            summary.excused,
            rate
        ));
    }
    section.push('\n');

    section
}

fn generate_records_section(records: &[EnrichedRecord]) -> String {
    let mut section = String::new();

    section.push_str("## Records\n\n");

    if records.is_empty() {
        section.push_str("No attendance has been recorded.\n\n");
        return section;
    }

    section.push_str("| Date | Student | Roll No | Class | Status |\n");
    section.push_str("|:---|:---|:---|:---|:---|\n");

    for record in records {
        let name = if record.on_roster {
            record.display_name().to_string()
        } else {
            format!("{} *(removed)*", record.display_name())
        };
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} {} |\n",
            record.date,
            name,
            record.roll_no.as_deref().unwrap_or("-"),
            record.class_id.as_deref().unwrap_or("-"),
            record.status.emoji(),
            record.status
        ));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by rollcall v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &AttendanceReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// One-line rate summary used in terminal output.
pub fn rate_line(stats: &Stats) -> String {
    format!(
        "{} attendance over {} records ({:.1} present days)",
        stats.rate_display(),
        stats.total_records,
        stats.present_count
    )
}
