//! Attendance reports: exported documents and AI narratives.

pub mod generator;
pub mod narrative;

pub use generator::{assemble_report, generate_json_report, generate_markdown_report, rate_line};
pub use narrative::NarrativeClient;
