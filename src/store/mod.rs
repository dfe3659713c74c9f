//! Record store access.
//!
//! Students and attendance records live behind a remote API. This module
//! defines the interface the rest of the application uses to reach it.

pub mod http;

#[cfg(test)]
pub mod fake;

pub use http::HttpRecordStore;

use crate::models::{AttendanceFilter, AttendanceRecord, NewAttendanceRecord, NewStudent, Student};
use async_trait::async_trait;
use thiserror::Error;

/// Message used when the store fails without saying why.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Failures talking to the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Cannot connect to record store at {url}")]
    Connect { url: String },

    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The store answered but refused the operation. `message` is the
    /// store's own explanation.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Failed to decode record store response: {0}")]
    Decode(String),

    #[error("Request failed: {0}")]
    Request(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Operations offered by the record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// List every student on the roster.
    async fn list_students(&self) -> StoreResult<Vec<Student>>;

    /// Create a student; the store assigns the id.
    ///
    /// `None` means the store accepted the student without echoing it back.
    async fn create_student(&self, student: &NewStudent) -> StoreResult<Option<Student>>;

    /// Delete a student. Their attendance records are left to the store.
    async fn delete_student(&self, student_id: &str) -> StoreResult<()>;

    /// List attendance records, narrowed by whichever filter fields are set.
    async fn list_attendance(&self, filter: &AttendanceFilter) -> StoreResult<Vec<AttendanceRecord>>;

    /// Record one student's attendance for one day.
    ///
    /// `None` means the store accepted the record without echoing it back.
    async fn create_attendance(
        &self,
        record: &NewAttendanceRecord,
    ) -> StoreResult<Option<AttendanceRecord>>;

    /// Delete a single attendance record.
    async fn delete_attendance(&self, attendance_id: &str) -> StoreResult<()>;
}
