//! Data models for the attendance manager.
//!
//! This module contains the roster and attendance types exchanged with the
//! record store, plus the statistics and report structures produced from them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The only date spelling accepted anywhere in the application.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Returned when a date string is not a canonical `YYYY-MM-DD` calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid date '{input}': expected a calendar date formatted YYYY-MM-DD")]
pub struct DateParseError {
    pub input: String,
}

/// A calendar date in canonical `YYYY-MM-DD` form.
///
/// Parsing rejects anything that does not format back to the exact input,
/// so two dates are equal exactly when their strings are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttendanceDate(NaiveDate);

impl AttendanceDate {
    /// Parse a canonical `YYYY-MM-DD` string.
    pub fn parse(input: &str) -> Result<Self, DateParseError> {
        let invalid = || DateParseError {
            input: input.to_string(),
        };

        let date = NaiveDate::parse_from_str(input, DATE_FORMAT).map_err(|_| invalid())?;

        // chrono tolerates unpadded fields ("2024-1-5"); those are not canonical
        if date.format(DATE_FORMAT).to_string() != input {
            return Err(invalid());
        }

        Ok(Self(date))
    }

    pub fn from_naive(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn naive(&self) -> NaiveDate {
        self.0
    }

    /// Short human-readable label, e.g. `Jan 5`.
    pub fn short_label(&self) -> String {
        self.0.format("%b %-d").to_string()
    }
}

impl fmt::Display for AttendanceDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

impl FromStr for AttendanceDate {
    type Err = DateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AttendanceDate {
    type Error = DateParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AttendanceDate> for String {
    fn from(date: AttendanceDate) -> Self {
        date.to_string()
    }
}

/// Attendance status of one student on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Excused,
    /// Counts as half a present day in attendance rates.
    #[serde(rename = "Half Day")]
    HalfDay,
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendanceStatus::Present => write!(f, "Present"),
            AttendanceStatus::Absent => write!(f, "Absent"),
            AttendanceStatus::Excused => write!(f, "Excused"),
            AttendanceStatus::HalfDay => write!(f, "Half Day"),
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "present" | "p" => Ok(AttendanceStatus::Present),
            "absent" | "a" => Ok(AttendanceStatus::Absent),
            "excused" | "e" => Ok(AttendanceStatus::Excused),
            "half day" | "half-day" | "halfday" | "half_day" | "h" => Ok(AttendanceStatus::HalfDay),
            other => Err(format!(
                "unknown status '{}' (expected present, absent, excused or half-day)",
                other
            )),
        }
    }
}

impl AttendanceStatus {
    /// Weight of this status in the attendance rate numerator.
    pub fn weight(&self) -> f64 {
        match self {
            AttendanceStatus::Present => 1.0,
            AttendanceStatus::HalfDay => 0.5,
            AttendanceStatus::Absent | AttendanceStatus::Excused => 0.0,
        }
    }

    /// Whether the student was in school at all that day.
    pub fn counts_as_present(&self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::HalfDay)
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "✅",
            AttendanceStatus::Absent => "❌",
            AttendanceStatus::Excused => "📝",
            AttendanceStatus::HalfDay => "🌓",
        }
    }
}

/// A student on the roster. `student_id` is always assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub student_id: String,
    pub name: String,
    pub roll_no: String,
    /// Free-text class label; classes exist only as equal strings here.
    pub class_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_phone: Option<String>,
}

/// Everything needed to create a student, minus the store-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub name: String,
    pub roll_no: String,
    pub class_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_phone: Option<String>,
}

impl NewStudent {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Student name must not be empty".to_string());
        }
        if self.class_id.trim().is_empty() {
            return Err("Class must not be empty".to_string());
        }
        Ok(())
    }
}

/// An attendance record as the store returns it.
///
/// `name`, `roll_no` and `class_id` are copies the store sometimes joins in.
/// They may be missing or stale; see [`EnrichedRecord`] for display fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub attendance_id: String,
    pub student_id: String,
    pub date: AttendanceDate,
    pub status: AttendanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
}

/// Payload for marking one student's attendance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttendanceRecord {
    pub student_id: String,
    pub date: AttendanceDate,
    pub status: AttendanceStatus,
}

/// An attendance record joined with display fields taken from the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    pub attendance_id: String,
    pub student_id: String,
    pub date: AttendanceDate,
    pub status: AttendanceStatus,
    pub name: Option<String>,
    pub roll_no: Option<String>,
    pub class_id: Option<String>,
    /// False when the student is no longer on the roster and the display
    /// fields came from the record's own copies.
    pub on_roster: bool,
}

impl EnrichedRecord {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown student")
    }
}

/// Optional narrowing of an attendance listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceFilter {
    pub student_id: Option<String>,
    pub date: Option<AttendanceDate>,
    pub class_id: Option<String>,
}

impl AttendanceFilter {
    pub fn is_empty(&self) -> bool {
        self.student_id.is_none() && self.date.is_none() && self.class_id.is_none()
    }

    /// Query parameters for the store, only for the fields that are set.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(ref id) = self.student_id {
            pairs.push(("studentId", id.clone()));
        }
        if let Some(date) = self.date {
            pairs.push(("date", date.to_string()));
        }
        if let Some(ref class) = self.class_id {
            pairs.push(("classId", class.clone()));
        }
        pairs
    }
}

/// Formats a percentage with one decimal place.
pub fn format_rate(rate: f64) -> String {
    format!("{:.1}%", rate)
}

/// School-wide statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total_students: usize,
    pub total_records: usize,
    /// Present days with half days weighted 0.5.
    pub present_count: f64,
    /// Percentage in `[0, 100]`; 0 when there are no records.
    pub overall_attendance_rate: f64,
    pub today_present: usize,
    pub today_absent: usize,
}

impl Stats {
    pub fn rate_display(&self) -> String {
        format_rate(self.overall_attendance_rate)
    }
}

/// Statistics scoped to one class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassStats {
    pub class_id: String,
    pub total_students: usize,
    pub total_records: usize,
    pub present_count: f64,
    pub overall_attendance_rate: f64,
}

impl ClassStats {
    pub fn rate_display(&self) -> String {
        format_rate(self.overall_attendance_rate)
    }
}

/// Counts for a single day of the trailing series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayBucket {
    pub date: AttendanceDate,
    pub label: String,
    pub present: usize,
    pub absent: usize,
    pub excused: usize,
    pub half_day: usize,
}

impl DayBucket {
    pub fn empty(date: AttendanceDate) -> Self {
        Self {
            date,
            label: date.short_label(),
            present: 0,
            absent: 0,
            excused: 0,
            half_day: 0,
        }
    }

    pub fn add(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::Excused => self.excused += 1,
            AttendanceStatus::HalfDay => self.half_day += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.present + self.absent + self.excused + self.half_day
    }
}

/// Attendance history of one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentSummary {
    pub student_id: String,
    pub name: String,
    pub roll_no: String,
    pub class_id: String,
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub excused: usize,
    pub half_day: usize,
    pub present_count: f64,
    pub attendance_rate: f64,
    pub first_date: Option<AttendanceDate>,
    pub last_date: Option<AttendanceDate>,
    /// Most recent absences, newest first.
    pub recent_absences: Vec<AttendanceDate>,
}

impl StudentSummary {
    pub fn rate_display(&self) -> String {
        format_rate(self.attendance_rate)
    }
}

/// Metadata about an exported attendance report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// When the report was produced.
    pub generated_at: DateTime<Utc>,
    /// Record store the data came from.
    pub api_url: String,
    /// Class the report is restricted to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_filter: Option<String>,
    /// Day the trailing series ends on.
    pub reference_date: AttendanceDate,
    /// Length of the trailing series.
    pub window_days: usize,
}

/// The complete exported attendance report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceReport {
    pub metadata: ReportMetadata,
    pub stats: Stats,
    pub classes: Vec<ClassStats>,
    pub daily: Vec<DayBucket>,
    pub students: Vec<StudentSummary>,
    pub records: Vec<EnrichedRecord>,
}
