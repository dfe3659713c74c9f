//! Attendance aggregation and statistics.
//!
//! Every function here is a pure transform over a roster and a record set.
//! Nothing mutates its inputs and nothing fails on empty collections.

use crate::analysis::clock::Clock;
use crate::models::{
    AttendanceDate, AttendanceFilter, AttendanceRecord, AttendanceStatus, ClassStats, DayBucket,
    EnrichedRecord, Stats, Student, StudentSummary,
};
use chrono::Days;
use std::collections::{HashMap, HashSet};

/// How many absence dates a student summary keeps.
const RECENT_ABSENCE_LIMIT: usize = 5;

/// Longest trailing daily series. Longer windows are clamped to this.
pub const MAX_WINDOW_DAYS: usize = 366;

/// Percentage of `present` over `total`, or 0 when there is nothing to divide by.
pub fn attendance_rate(present: f64, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        present / total as f64 * 100.0
    }
}

/// Sum of status weights: present days count 1, half days 0.5.
pub fn weighted_present<'a, I>(records: I) -> f64
where
    I: IntoIterator<Item = &'a AttendanceRecord>,
{
    records.into_iter().map(|r| r.status.weight()).sum()
}

fn roster_index(students: &[Student]) -> HashMap<&str, &Student> {
    students
        .iter()
        .map(|s| (s.student_id.as_str(), s))
        .collect()
}

/// Class of a record: its own copy when the store joined one in, otherwise
/// the roster's class for that student.
fn record_class<'a>(
    record: &'a AttendanceRecord,
    roster: &HashMap<&str, &'a Student>,
) -> Option<&'a str> {
    record.class_id.as_deref().or_else(|| {
        roster
            .get(record.student_id.as_str())
            .copied()
            .map(|s| s.class_id.as_str())
    })
}

/// School-wide statistics for the whole snapshot.
pub fn global_stats(students: &[Student], records: &[AttendanceRecord], clock: &dyn Clock) -> Stats {
    let today = AttendanceDate::from_naive(clock.today());
    let present_count = weighted_present(records);

    let mut today_present = 0;
    let mut today_absent = 0;
    for record in records.iter().filter(|r| r.date == today) {
        if record.status.counts_as_present() {
            today_present += 1;
        } else if record.status == AttendanceStatus::Absent {
            today_absent += 1;
        }
    }

    Stats {
        total_students: students.len(),
        total_records: records.len(),
        present_count,
        overall_attendance_rate: attendance_rate(present_count, records.len()),
        today_present,
        today_absent,
    }
}

/// Statistics for one class, or `None` when no class is selected.
pub fn class_stats(
    students: &[Student],
    records: &[AttendanceRecord],
    class_id: Option<&str>,
) -> Option<ClassStats> {
    let class_id = class_id?;
    let roster = roster_index(students);

    let total_students = students.iter().filter(|s| s.class_id == class_id).count();
    let class_records: Vec<&AttendanceRecord> = records
        .iter()
        .filter(|r| record_class(r, &roster) == Some(class_id))
        .collect();

    let present_count = weighted_present(class_records.iter().copied());

    Some(ClassStats {
        class_id: class_id.to_string(),
        total_students,
        total_records: class_records.len(),
        present_count,
        overall_attendance_rate: attendance_rate(present_count, class_records.len()),
    })
}

/// Class statistics for every class on the roster, in roster order.
pub fn class_breakdown(students: &[Student], records: &[AttendanceRecord]) -> Vec<ClassStats> {
    unique_class_ids(students)
        .iter()
        .filter_map(|class_id| class_stats(students, records, Some(class_id)))
        .collect()
}

/// One bucket per day for the `window_days` days ending today, oldest first.
///
/// The window is clamped to [`MAX_WINDOW_DAYS`] and stops at the earliest
/// representable date.
pub fn daily_series(
    records: &[AttendanceRecord],
    window_days: usize,
    clock: &dyn Clock,
) -> Vec<DayBucket> {
    let today = clock.today();
    let window_days = window_days.min(MAX_WINDOW_DAYS);

    let mut by_date: HashMap<AttendanceDate, Vec<AttendanceStatus>> = HashMap::new();
    for record in records {
        by_date.entry(record.date).or_default().push(record.status);
    }

    (0..window_days as u64)
        .rev()
        .filter_map(|offset| today.checked_sub_days(Days::new(offset)))
        .map(|day| {
            let date = AttendanceDate::from_naive(day);
            let mut bucket = DayBucket::empty(date);
            if let Some(statuses) = by_date.get(&date) {
                for status in statuses {
                    bucket.add(*status);
                }
            }
            bucket
        })
        .collect()
}

/// Distinct class labels in order of first appearance.
pub fn unique_class_ids(students: &[Student]) -> Vec<String> {
    let mut seen = HashSet::new();
    students
        .iter()
        .filter(|s| seen.insert(s.class_id.as_str()))
        .map(|s| s.class_id.clone())
        .collect()
}

/// Case-insensitive substring search over name and roll number.
///
/// A blank query returns the roster unchanged. Otherwise the query is matched
/// as typed, surrounding spaces included.
pub fn filter_students(students: &[Student], query: &str) -> Vec<Student> {
    if query.trim().is_empty() {
        return students.to_vec();
    }

    let needle = query.to_lowercase();
    students
        .iter()
        .filter(|s| {
            s.name.to_lowercase().contains(&needle) || s.roll_no.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}

/// Whether a record already exists for this student on this date.
///
/// Only as good as the loaded record set: another client can write the same
/// pair between this check and the submission.
pub fn has_existing_record(
    records: &[AttendanceRecord],
    student_id: &str,
    date: &AttendanceDate,
) -> bool {
    records
        .iter()
        .any(|r| r.student_id == student_id && r.date == *date)
}

/// Join records with display fields from the roster.
pub fn enrich_records(students: &[Student], records: &[AttendanceRecord]) -> Vec<EnrichedRecord> {
    let roster = roster_index(students);

    records
        .iter()
        .map(|record| {
            let student = roster.get(record.student_id.as_str()).copied();
            let (name, roll_no, class_id) = match student {
                Some(s) => (
                    Some(s.name.clone()),
                    Some(s.roll_no.clone()),
                    Some(s.class_id.clone()),
                ),
                None => (
                    record.name.clone(),
                    record.roll_no.clone(),
                    record.class_id.clone(),
                ),
            };

            EnrichedRecord {
                attendance_id: record.attendance_id.clone(),
                student_id: record.student_id.clone(),
                date: record.date,
                status: record.status,
                name,
                roll_no,
                class_id,
                on_roster: student.is_some(),
            }
        })
        .collect()
}

/// Apply a filter on the client side. Class matching follows [`class_stats`].
pub fn filter_records(
    students: &[Student],
    records: &[AttendanceRecord],
    filter: &AttendanceFilter,
) -> Vec<AttendanceRecord> {
    let roster = roster_index(students);

    records
        .iter()
        .filter(|r| {
            filter
                .student_id
                .as_deref()
                .map_or(true, |id| r.student_id == id)
        })
        .filter(|r| filter.date.map_or(true, |date| r.date == date))
        .filter(|r| {
            filter
                .class_id
                .as_deref()
                .map_or(true, |class| record_class(r, &roster) == Some(class))
        })
        .cloned()
        .collect()
}

/// Attendance history of a single student.
pub fn student_summary(student: &Student, records: &[AttendanceRecord]) -> StudentSummary {
    let own: Vec<&AttendanceRecord> = records
        .iter()
        .filter(|r| r.student_id == student.student_id)
        .collect();

    let count = |status: AttendanceStatus| own.iter().filter(|r| r.status == status).count();
    let present_count = weighted_present(own.iter().copied());

    let mut recent_absences: Vec<AttendanceDate> = own
        .iter()
        .filter(|r| r.status == AttendanceStatus::Absent)
        .map(|r| r.date)
        .collect();
    recent_absences.sort_by(|a, b| b.cmp(a));
    recent_absences.dedup();
    recent_absences.truncate(RECENT_ABSENCE_LIMIT);

    StudentSummary {
        student_id: student.student_id.clone(),
        name: student.name.clone(),
        roll_no: student.roll_no.clone(),
        class_id: student.class_id.clone(),
        total: own.len(),
        present: count(AttendanceStatus::Present),
        absent: count(AttendanceStatus::Absent),
        excused: count(AttendanceStatus::Excused),
        half_day: count(AttendanceStatus::HalfDay),
        present_count,
        attendance_rate: attendance_rate(present_count, own.len()),
        first_date: own.iter().map(|r| r.date).min(),
        last_date: own.iter().map(|r| r.date).max(),
        recent_absences,
    }
}

/// Summaries for every student, in roster order.
pub fn student_summaries(students: &[Student], records: &[AttendanceRecord]) -> Vec<StudentSummary> {
    students
        .iter()
        .map(|s| student_summary(s, records))
        .collect()
}

/// The `n` students with the lowest attendance rate among those with records.
pub fn lowest_attendance(summaries: &[StudentSummary], n: usize) -> Vec<&StudentSummary> {
    let mut ranked: Vec<&StudentSummary> = summaries.iter().filter(|s| s.total > 0).collect();

    ranked.sort_by(|a, b| {
        a.attendance_rate
            .partial_cmp(&b.attendance_rate)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(n);

    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::clock::FixedClock;
    use chrono::NaiveDate;

    fn date(s: &str) -> AttendanceDate {
        AttendanceDate::parse(s).unwrap()
    }

    fn clock(s: &str) -> FixedClock {
        FixedClock::new(NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap())
    }

    fn create_test_student(id: &str, name: &str, roll_no: &str, class_id: &str) -> Student {
        Student {
            student_id: id.to_string(),
            name: name.to_string(),
            roll_no: roll_no.to_string(),
            class_id: class_id.to_string(),
            parent_name: None,
            parent_phone: None,
        }
    }

    fn create_test_record(student_id: &str, day: &str, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            attendance_id: format!("{}-{}", student_id, day),
            student_id: student_id.to_string(),
            date: date(day),
            status,
            name: None,
            roll_no: None,
            class_id: None,
        }
    }

    fn class_10a() -> Vec<Student> {
        vec![
            create_test_student("S1", "Ana", "1", "10-A"),
            create_test_student("S2", "Ben", "2", "10-A"),
            create_test_student("S3", "Cleo", "3", "10-A"),
        ]
    }

    fn new_year_records() -> Vec<AttendanceRecord> {
        vec![
            create_test_record("S1", "2024-01-01", AttendanceStatus::Present),
            create_test_record("S2", "2024-01-01", AttendanceStatus::Absent),
            create_test_record("S3", "2024-01-01", AttendanceStatus::Present),
        ]
    }

    #[test]
    fn test_global_stats_scenario() {
        let stats = global_stats(&class_10a(), &new_year_records(), &clock("2024-03-15"));

        assert_eq!(stats.total_students, 3);
        assert_eq!(stats.total_records, 3);
        assert!((stats.overall_attendance_rate - 66.666).abs() < 0.01);
        assert_eq!(stats.rate_display(), "66.7%");
        assert_eq!(stats.today_present, 0);
        assert_eq!(stats.today_absent, 0);
    }

    #[test]
    fn test_global_stats_today_counts() {
        let mut records = new_year_records();
        records.push(create_test_record("S4", "2024-01-01", AttendanceStatus::HalfDay));
        records.push(create_test_record("S5", "2024-01-01", AttendanceStatus::Excused));

        let stats = global_stats(&class_10a(), &records, &clock("2024-01-01"));

        assert_eq!(stats.today_present, 3);
        assert_eq!(stats.today_absent, 1);
    }

    #[test]
    fn test_global_stats_empty() {
        let stats = global_stats(&[], &[], &clock("2024-01-01"));

        assert_eq!(stats.total_students, 0);
        assert_eq!(stats.overall_attendance_rate, 0.0);
        assert!(!stats.overall_attendance_rate.is_nan());
    }

    #[test]
    fn test_half_day_weighting() {
        let records = vec![
            create_test_record("S1", "2024-01-01", AttendanceStatus::HalfDay),
            create_test_record("S1", "2024-01-02", AttendanceStatus::Excused),
        ];

        let stats = global_stats(&class_10a(), &records, &clock("2024-01-05"));

        assert_eq!(stats.present_count, 0.5);
        assert_eq!(stats.overall_attendance_rate, 25.0);
    }

    #[test]
    fn test_rate_stays_in_bounds() {
        let statuses = [
            AttendanceStatus::Present,
            AttendanceStatus::Absent,
            AttendanceStatus::Excused,
            AttendanceStatus::HalfDay,
        ];
        let mut records = Vec::new();
        for (i, status) in statuses.iter().cycle().take(37).enumerate() {
            records.push(create_test_record(&format!("S{}", i), "2024-01-01", *status));
            let stats = global_stats(&[], &records, &clock("2024-01-01"));
            assert!((0.0..=100.0).contains(&stats.overall_attendance_rate));
        }
    }

    #[test]
    fn test_class_stats_none_when_unselected() {
        assert!(class_stats(&class_10a(), &new_year_records(), None).is_none());
    }

    #[test]
    fn test_class_stats_unknown_class_is_zero() {
        let stats = class_stats(&class_10a(), &new_year_records(), Some("12-Z")).unwrap();

        assert_eq!(stats.total_students, 0);
        assert_eq!(stats.total_records, 0);
        assert_eq!(stats.overall_attendance_rate, 0.0);
    }

    #[test]
    fn test_class_stats_uses_record_class_first() {
        let mut students = class_10a();
        students.push(create_test_student("S4", "Dev", "4", "10-B"));

        let mut stale = create_test_record("S1", "2024-01-02", AttendanceStatus::Absent);
        stale.class_id = Some("10-B".to_string());

        let mut records = new_year_records();
        records.push(stale);
        records.push(create_test_record("S4", "2024-01-02", AttendanceStatus::Present));

        let b = class_stats(&students, &records, Some("10-B")).unwrap();
        assert_eq!(b.total_students, 1);
        assert_eq!(b.total_records, 2);
        assert_eq!(b.overall_attendance_rate, 50.0);

        let a = class_stats(&students, &records, Some("10-A")).unwrap();
        assert_eq!(a.total_records, 3);
    }

    #[test]
    fn test_class_breakdown_order() {
        let students = vec![
            create_test_student("S1", "Ana", "1", "10-B"),
            create_test_student("S2", "Ben", "2", "10-A"),
        ];
        let breakdown = class_breakdown(&students, &[]);

        let ids: Vec<&str> = breakdown.iter().map(|c| c.class_id.as_str()).collect();
        assert_eq!(ids, vec!["10-B", "10-A"]);
    }

    #[test]
    fn test_daily_series_window() {
        let records = vec![
            create_test_record("S1", "2024-01-07", AttendanceStatus::Present),
            create_test_record("S2", "2024-01-07", AttendanceStatus::Absent),
            create_test_record("S3", "2024-01-05", AttendanceStatus::Excused),
            create_test_record("S1", "2023-12-31", AttendanceStatus::Present),
        ];

        let series = daily_series(&records, 7, &clock("2024-01-07"));

        assert_eq!(series.len(), 7);
        assert_eq!(series[0].date, date("2024-01-01"));
        assert_eq!(series[6].date, date("2024-01-07"));
        assert_eq!(series[6].label, "Jan 7");
        assert_eq!((series[6].present, series[6].absent), (1, 1));
        assert_eq!(series[4].excused, 1);
        assert_eq!(series[1].total(), 0);

        let total: usize = series.iter().map(|b| b.total()).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_daily_series_crosses_month_boundary() {
        let series = daily_series(&[], 3, &clock("2024-03-01"));

        let dates: Vec<String> = series.iter().map(|b| b.date.to_string()).collect();
        assert_eq!(dates, vec!["2024-02-28", "2024-02-29", "2024-03-01"]);
    }

    #[test]
    fn test_daily_series_is_repeatable() {
        let records = new_year_records();
        let fixed = clock("2024-01-03");

        assert_eq!(daily_series(&records, 7, &fixed), daily_series(&records, 7, &fixed));
        assert!(daily_series(&records, 0, &fixed).is_empty());
    }

    #[test]
    fn test_daily_series_clamps_huge_window() {
        let series = daily_series(&new_year_records(), 100_000_000, &clock("2024-01-07"));

        assert_eq!(series.len(), MAX_WINDOW_DAYS);
        assert_eq!(series[MAX_WINDOW_DAYS - 1].date, date("2024-01-07"));
        assert_eq!(series[0].date, date("2023-01-07"));
        assert_eq!(series.iter().map(|b| b.total()).sum::<usize>(), 3);
    }

    #[test]
    fn test_daily_series_stops_at_earliest_date() {
        let fixed = FixedClock::new(NaiveDate::MIN + Days::new(2));
        let series = daily_series(&[], 10, &fixed);

        assert_eq!(series.len(), 3);
        assert_eq!(series[0].date.naive(), NaiveDate::MIN);
    }

    #[test]
    fn test_unique_class_ids() {
        let students = vec![
            create_test_student("S1", "Ana", "1", "10-A"),
            create_test_student("S2", "Ben", "2", "10-B"),
            create_test_student("S3", "Cleo", "3", "10-A"),
        ];

        assert_eq!(unique_class_ids(&students), vec!["10-A", "10-B"]);
        assert_eq!(unique_class_ids(&students), vec!["10-A", "10-B"]);
        assert!(unique_class_ids(&[]).is_empty());
    }

    #[test]
    fn test_filter_students() {
        let students = class_10a();

        assert_eq!(filter_students(&students, ""), students);
        assert_eq!(filter_students(&students, "   "), students);

        let found = filter_students(&students, "ana");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Ana");

        let by_roll = filter_students(&students, "3");
        assert_eq!(by_roll[0].student_id, "S3");

        assert!(filter_students(&students, "zed").is_empty());

        let mut with_anabel = class_10a();
        with_anabel.push(create_test_student("S4", "Anabel", "4", "10-A"));
        assert!(filter_students(&with_anabel, "Ana ").is_empty());
        assert_eq!(filter_students(&with_anabel, "ana").len(), 2);
    }

    #[test]
    fn test_has_existing_record() {
        let records = new_year_records();

        assert!(has_existing_record(&records, "S1", &date("2024-01-01")));
        assert!(!has_existing_record(&records, "S1", &date("2024-01-02")));
        assert!(!has_existing_record(&records, "S9", &date("2024-01-01")));
        assert!(!has_existing_record(&[], "S1", &date("2024-01-01")));
    }

    #[test]
    fn test_enrich_records_prefers_roster() {
        let mut stale = create_test_record("S1", "2024-01-01", AttendanceStatus::Present);
        stale.name = Some("Old Name".to_string());

        let mut orphan = create_test_record("S9", "2024-01-01", AttendanceStatus::Absent);
        orphan.name = Some("Gone".to_string());

        let bare = create_test_record("S8", "2024-01-01", AttendanceStatus::Absent);

        let enriched = enrich_records(&class_10a(), &[stale, orphan, bare]);

        assert_eq!(enriched[0].name.as_deref(), Some("Ana"));
        assert_eq!(enriched[0].class_id.as_deref(), Some("10-A"));
        assert!(enriched[0].on_roster);
        assert_eq!(enriched[1].display_name(), "Gone");
        assert!(!enriched[1].on_roster);
        assert_eq!(enriched[2].display_name(), "Unknown student");
    }

    #[test]
    fn test_filter_records() {
        let mut records = new_year_records();
        records.push(create_test_record("S1", "2024-01-02", AttendanceStatus::Absent));

        let filter = AttendanceFilter {
            student_id: Some("S1".to_string()),
            ..AttendanceFilter::default()
        };
        assert_eq!(filter_records(&class_10a(), &records, &filter).len(), 2);

        let filter = AttendanceFilter {
            date: Some(date("2024-01-01")),
            class_id: Some("10-A".to_string()),
            ..AttendanceFilter::default()
        };
        assert_eq!(filter_records(&class_10a(), &records, &filter).len(), 3);

        assert_eq!(
            filter_records(&class_10a(), &records, &AttendanceFilter::default()).len(),
            4
        );
    }

    #[test]
    fn test_student_summary() {
        let student = create_test_student("S1", "Ana", "1", "10-A");
        let records = vec![
            create_test_record("S1", "2024-01-01", AttendanceStatus::Present),
            create_test_record("S1", "2024-01-02", AttendanceStatus::Absent),
            create_test_record("S1", "2024-01-04", AttendanceStatus::Absent),
            create_test_record("S1", "2024-01-03", AttendanceStatus::HalfDay),
            create_test_record("S2", "2024-01-01", AttendanceStatus::Absent),
        ];

        let summary = student_summary(&student, &records);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.absent, 2);
        assert_eq!(summary.half_day, 1);
        assert_eq!(summary.present_count, 1.5);
        assert_eq!(summary.rate_display(), "37.5%");
        assert_eq!(summary.first_date, Some(date("2024-01-01")));
        assert_eq!(summary.last_date, Some(date("2024-01-04")));
        assert_eq!(
            summary.recent_absences,
            vec![date("2024-01-04"), date("2024-01-02")]
        );
    }

    #[test]
    fn test_lowest_attendance() {
        let records = new_year_records();
        let mut students = class_10a();
        students.push(create_test_student("S4", "Dev", "4", "10-A"));

        let summaries = student_summaries(&students, &records);
        let lowest = lowest_attendance(&summaries, 2);

        assert_eq!(lowest.len(), 2);
        assert_eq!(lowest[0].student_id, "S2");
        assert!(lowest.iter().all(|s| s.student_id != "S4"));
    }
}
