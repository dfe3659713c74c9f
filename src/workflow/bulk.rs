//! Marking attendance for a whole class.
//!
//! Every student in the class gets exactly one outcome. Writes that
//! succeeded stay in place when others fail; the caller gets a summary
//! listing which students still need attention.

use crate::analysis::has_existing_record;
use crate::models::{AttendanceDate, AttendanceStatus, NewAttendanceRecord, Student};
use crate::store::RecordStore;
use crate::workflow::loader::Snapshot;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// What to mark for one class on one day.
#[derive(Debug, Clone)]
pub struct MarkClassRequest {
    pub class_id: String,
    pub date: AttendanceDate,
    /// Status for every student without an override.
    pub default_status: AttendanceStatus,
    /// Per-student statuses keyed by student id.
    pub overrides: HashMap<String, AttendanceStatus>,
}

/// Execution settings for a batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Maximum writes in flight.
    pub concurrency: usize,
    pub show_progress: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum MarkResult {
    /// Written. The id is missing when the store did not echo the record back.
    Created {
        #[serde(skip_serializing_if = "Option::is_none")]
        attendance_id: Option<String>,
    },
    Skipped { reason: String },
    Failed { message: String },
}

/// Outcome for one student of the class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkOutcome {
    pub student_id: String,
    pub name: String,
    pub status: AttendanceStatus,
    pub result: MarkResult,
}

/// Per-student results of marking a class, in roster order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub class_id: String,
    pub date: AttendanceDate,
    pub outcomes: Vec<MarkOutcome>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.count(|r| matches!(r, MarkResult::Created { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|r| matches!(r, MarkResult::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|r| matches!(r, MarkResult::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, MarkResult::Failed { .. }))
            .map(|o| o.student_id.as_str())
            .collect()
    }

    fn count(&self, pred: impl Fn(&MarkResult) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.result)).count()
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded(), self.failed())?;
        if self.has_failures() {
            write!(f, ": [{}]", self.failed_ids().join(", "))?;
        }
        let skipped = self.skipped();
        if skipped > 0 {
            write!(f, " ({} already marked)", skipped)?;
        }
        Ok(())
    }
}

/// Mark every student of `request.class_id` on `request.date`.
///
/// Students the snapshot already holds a record for are skipped without a
/// write. The duplicate check only sees the snapshot, so another client can
/// still race us to the same student and day.
pub async fn mark_class(
    store: &dyn RecordStore,
    snapshot: &Snapshot,
    request: &MarkClassRequest,
    options: BatchOptions,
) -> BatchSummary {
    let targets: Vec<&Student> = snapshot
        .students
        .iter()
        .filter(|s| s.class_id == request.class_id)
        .collect();

    for id in request.overrides.keys() {
        if !targets.iter().any(|s| &s.student_id == id) {
            warn!("Ignoring override for {}: not in class {}", id, request.class_id);
        }
    }

    info!(
        "Marking {} students of {} for {}",
        targets.len(),
        request.class_id,
        request.date
    );

    let mut slots: Vec<Option<MarkOutcome>> = (0..targets.len()).map(|_| None).collect();
    let mut pending = Vec::new();

    for (index, student) in targets.iter().enumerate() {
        let status = request
            .overrides
            .get(&student.student_id)
            .copied()
            .unwrap_or(request.default_status);

        if has_existing_record(&snapshot.records, &student.student_id, &request.date) {
            debug!("{} already marked for {}", student.student_id, request.date);
            slots[index] = Some(MarkOutcome {
                student_id: student.student_id.clone(),
                name: student.name.clone(),
                status,
                result: MarkResult::Skipped {
                    reason: format!("already marked for {}", request.date),
                },
            });
            continue;
        }

        pending.push((
            index,
            NewAttendanceRecord {
                student_id: student.student_id.clone(),
                date: request.date,
                status,
            },
        ));
    }

    let progress = options.show_progress.then(|| {
        let pb = ProgressBar::new(pending.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    });

    let results: Vec<_> = stream::iter(pending)
        .map(|(index, record)| async move {
            let result = store.create_attendance(&record).await;
            (index, record, result)
        })
        .buffer_unordered(options.concurrency.max(1))
        .inspect(|_| {
            if let Some(ref pb) = progress {
                pb.inc(1);
            }
        })
        .collect()
        .await;

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    for (index, record, result) in results {
        let student = targets[index];
        let result = match result {
            Ok(created) => MarkResult::Created {
                attendance_id: created.map(|r| r.attendance_id),
            },
            Err(e) => {
                warn!("Failed to mark {}: {}", student.student_id, e);
                MarkResult::Failed {
                    message: e.to_string(),
                }
            }
        };
        slots[index] = Some(MarkOutcome {
            student_id: student.student_id.clone(),
            name: student.name.clone(),
            status: record.status,
            result,
        });
    }

    BatchSummary {
        class_id: request.class_id.clone(),
        date: request.date,
        outcomes: slots.into_iter().flatten().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttendanceRecord;
    use crate::store::fake::FakeStore;

    fn student(id: &str, class_id: &str) -> Student {
        Student {
            student_id: id.to_string(),
            name: format!("Student {}", id),
            roll_no: id.to_string(),
            class_id: class_id.to_string(),
            parent_name: None,
            parent_phone: None,
        }
    }

    fn day() -> AttendanceDate {
        AttendanceDate::parse("2024-01-01").unwrap()
    }

    fn roster() -> Vec<Student> {
        vec![
            student("S1", "10-A"),
            student("S2", "10-A"),
            student("S3", "10-B"),
            student("S4", "10-A"),
        ]
    }

    fn request(overrides: &[(&str, AttendanceStatus)]) -> MarkClassRequest {
        MarkClassRequest {
            class_id: "10-A".to_string(),
            date: day(),
            default_status: AttendanceStatus::Present,
            overrides: overrides
                .iter()
                .map(|(id, status)| (id.to_string(), *status))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_marks_whole_class_in_roster_order() {
        let store = FakeStore::new(roster(), Vec::new());
        let snapshot = Snapshot::new(roster(), Vec::new());

        let summary = mark_class(
            &store,
            &snapshot,
            &request(&[("S2", AttendanceStatus::Absent)]),
            BatchOptions::default(),
        )
        .await;

        let ids: Vec<&str> = summary.outcomes.iter().map(|o| o.student_id.as_str()).collect();
        assert_eq!(ids, vec!["S1", "S2", "S4"]);
        assert_eq!(summary.succeeded(), 3);
        assert_eq!(summary.outcomes[1].status, AttendanceStatus::Absent);
        assert_eq!(summary.to_string(), "3 succeeded, 0 failed");

        let written = store.records();
        assert_eq!(written.len(), 3);
        assert!(written.iter().all(|r| r.student_id != "S3"));
    }

    #[tokio::test]
    async fn test_skips_existing_records_without_writing() {
        let existing = AttendanceRecord {
            attendance_id: "A0".to_string(),
            student_id: "S1".to_string(),
            date: day(),
            status: AttendanceStatus::Present,
            name: None,
            roll_no: None,
            class_id: None,
        };
        let store = FakeStore::new(roster(), vec![existing.clone()]);
        let snapshot = Snapshot::new(roster(), vec![existing]);

        let summary = mark_class(&store, &snapshot, &request(&[]), BatchOptions::default()).await;

        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.succeeded(), 2);
        assert!(matches!(summary.outcomes[0].result, MarkResult::Skipped { .. }));
        assert_eq!(store.attendance_writes(), 2);
        assert_eq!(summary.to_string(), "2 succeeded, 0 failed (1 already marked)");
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_successes() {
        let store = FakeStore::new(roster(), Vec::new());
        store.reject_marks_for("S2");
        let snapshot = Snapshot::new(roster(), Vec::new());

        let summary = mark_class(
            &store,
            &snapshot,
            &request(&[]),
            BatchOptions {
                concurrency: 1,
                show_progress: false,
            },
        )
        .await;

        assert!(summary.has_failures());
        assert_eq!(summary.failed_ids(), vec!["S2"]);
        assert_eq!(summary.to_string(), "2 succeeded, 1 failed: [S2]");
        assert_eq!(
            summary.outcomes[1].result,
            MarkResult::Failed {
                message: "cannot mark S2".to_string()
            }
        );
        assert_eq!(store.records().len(), 2);
    }

    #[tokio::test]
    async fn test_write_without_echo_counts_as_created() {
        let store = FakeStore::new(roster(), Vec::new());
        store.omit_created_data();
        let snapshot = Snapshot::new(roster(), Vec::new());

        let summary = mark_class(&store, &snapshot, &request(&[]), BatchOptions::default()).await;

        assert!(!summary.has_failures());
        assert_eq!(summary.succeeded(), 3);
        assert_eq!(
            summary.outcomes[0].result,
            MarkResult::Created {
                attendance_id: None
            }
        );
        assert_eq!(store.records().len(), 3);
        assert_eq!(summary.to_string(), "3 succeeded, 0 failed");
    }

    #[tokio::test]
    async fn test_empty_class() {
        let store = FakeStore::new(roster(), Vec::new());
        let snapshot = Snapshot::new(roster(), Vec::new());
        let mut req = request(&[("S9", AttendanceStatus::Absent)]);
        req.class_id = "12-Z".to_string();

        let summary = mark_class(&store, &snapshot, &req, BatchOptions::default()).await;

        assert!(summary.outcomes.is_empty());
        assert_eq!(store.attendance_writes(), 0);
        assert_eq!(summary.to_string(), "0 succeeded, 0 failed");
    }

    #[test]
    fn test_summary_serializes_results() {
        let summary = BatchSummary {
            class_id: "10-A".to_string(),
            date: day(),
            outcomes: vec![MarkOutcome {
                student_id: "S1".to_string(),
                name: "Ana".to_string(),
                status: AttendanceStatus::Present,
                result: MarkResult::Created {
                    attendance_id: Some("A1".to_string()),
                },
            }],
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["outcomes"][0]["result"]["result"], "created");
        assert_eq!(json["date"], "2024-01-01");
    }
}
