//! In-memory record store for tests.

use crate::models::{AttendanceFilter, AttendanceRecord, NewAttendanceRecord, NewStudent, Student};
use crate::store::{RecordStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Default)]
pub struct FakeStore {
    students: Mutex<Vec<Student>>,
    records: Mutex<Vec<AttendanceRecord>>,
    /// Students whose attendance writes are refused.
    reject_marks_for: Mutex<HashSet<String>>,
    fail_attendance_listing: Mutex<bool>,
    /// Accept creates without returning the created item.
    omit_created_data: Mutex<bool>,
    /// The next roster listing waits on this before reading.
    hold: Mutex<Option<Arc<Notify>>>,
    next_id: AtomicUsize,
    attendance_writes: AtomicUsize,
}

impl FakeStore {
    pub fn new(students: Vec<Student>, records: Vec<AttendanceRecord>) -> Self {
        Self {
            students: Mutex::new(students),
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub fn reject_marks_for(&self, student_id: &str) {
        self.reject_marks_for
            .lock()
            .unwrap()
            .insert(student_id.to_string());
    }

    pub fn fail_attendance_listing(&self) {
        *self.fail_attendance_listing.lock().unwrap() = true;
    }

    pub fn omit_created_data(&self) {
        *self.omit_created_data.lock().unwrap() = true;
    }

    pub fn hold_next_roster_listing(&self, gate: Arc<Notify>) {
        *self.hold.lock().unwrap() = Some(gate);
    }

    pub fn add_student(&self, student: Student) {
        self.students.lock().unwrap().push(student);
    }

    pub fn records(&self) -> Vec<AttendanceRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn attendance_writes(&self) -> usize {
        self.attendance_writes.load(Ordering::SeqCst)
    }

    fn echo<T>(&self, created: T) -> Option<T> {
        (!*self.omit_created_data.lock().unwrap()).then_some(created)
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl RecordStore for FakeStore {
    async fn list_students(&self) -> StoreResult<Vec<Student>> {
        let gate = self.hold.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.students.lock().unwrap().clone())
    }

    async fn create_student(&self, student: &NewStudent) -> StoreResult<Option<Student>> {
        let created = Student {
            student_id: self.next_id("S"),
            name: student.name.clone(),
            roll_no: student.roll_no.clone(),
            class_id: student.class_id.clone(),
            parent_name: student.parent_name.clone(),
            parent_phone: student.parent_phone.clone(),
        };
        self.students.lock().unwrap().push(created.clone());
        Ok(self.echo(created))
    }

    async fn delete_student(&self, student_id: &str) -> StoreResult<()> {
        self.students
            .lock()
            .unwrap()
            .retain(|s| s.student_id != student_id);
        Ok(())
    }

    async fn list_attendance(&self, filter: &AttendanceFilter) -> StoreResult<Vec<AttendanceRecord>> {
        if *self.fail_attendance_listing.lock().unwrap() {
            return Err(StoreError::Rejected {
                status: 500,
                message: "attendance table unavailable".to_string(),
            });
        }
        let students = self.students.lock().unwrap().clone();
        let class_of = |r: &AttendanceRecord| {
            r.class_id.clone().or_else(|| {
                students
                    .iter()
                    .find(|s| s.student_id == r.student_id)
                    .map(|s| s.class_id.clone())
            })
        };

        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.student_id.as_deref().map_or(true, |id| r.student_id == id))
            .filter(|r| filter.date.map_or(true, |d| r.date == d))
            .filter(|r| {
                filter
                    .class_id
                    .as_deref()
                    .map_or(true, |class| class_of(r).as_deref() == Some(class))
            })
            .cloned()
            .collect())
    }

    async fn create_attendance(
        &self,
        record: &NewAttendanceRecord,
    ) -> StoreResult<Option<AttendanceRecord>> {
        self.attendance_writes.fetch_add(1, Ordering::SeqCst);

        if self.reject_marks_for.lock().unwrap().contains(&record.student_id) {
            return Err(StoreError::Rejected {
                status: 400,
                message: format!("cannot mark {}", record.student_id),
            });
        }

        let created = AttendanceRecord {
            attendance_id: self.next_id("A"),
            student_id: record.student_id.clone(),
            date: record.date,
            status: record.status,
            name: None,
            roll_no: None,
            class_id: None,
        };
        self.records.lock().unwrap().push(created.clone());
        Ok(self.echo(created))
    }

    async fn delete_attendance(&self, attendance_id: &str) -> StoreResult<()> {
        self.records
            .lock()
            .unwrap()
            .retain(|r| r.attendance_id != attendance_id);
        Ok(())
    }
}
