//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::{check_concurrency, check_timeout, check_url, check_window_days};
use crate::models::{AttendanceDate, AttendanceStatus};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Rollcall - school attendance from the command line
///
/// Manage the student roster, mark daily attendance, and review
/// attendance statistics kept in a remote record store.
///
/// Examples:
///   rollcall students list --class 10-A
///   rollcall attendance mark --student S1 --status absent
///   rollcall attendance mark-class --class 10-A --set S4=absent --set S7=excused
///   rollcall stats --class 10-A --days 14
///   rollcall export --format json --output term1.json
///   rollcall narrative --student S1
///   rollcall --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Record store API base URL
    #[arg(long, global = true, value_name = "URL", env = "ROLLCALL_API_URL")]
    pub api_url: Option<String>,

    /// Bearer token for the record store
    #[arg(long, global = true, value_name = "TOKEN", env = "ROLLCALL_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .rollcall.toml in the current directory
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Record store request timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Number of attendance writes in flight when marking a class
    #[arg(long, global = true, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Ollama API endpoint URL for narrative reports
    #[arg(long, global = true, value_name = "URL", env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Ollama model for narrative reports
    #[arg(long, global = true, value_name = "MODEL", env = "ROLLCALL_MODEL")]
    pub model: Option<String>,

    /// Treat this date as today (YYYY-MM-DD)
    ///
    /// Anchors today's counts and the trailing daily series.
    #[arg(long, global = true, value_name = "DATE")]
    pub today: Option<AttendanceDate>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Generate a default .rollcall.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Manage the student roster
    #[command(subcommand)]
    Students(StudentsCommand),

    /// List the classes on the roster
    Classes,

    /// Record and browse attendance
    #[command(subcommand)]
    Attendance(AttendanceCommand),

    /// Show attendance statistics
    Stats {
        /// Also show statistics for this class
        #[arg(long, value_name = "CLASS")]
        class: Option<String>,

        /// Length of the daily series (default: from config, 7)
        #[arg(long, value_name = "DAYS")]
        days: Option<usize>,
    },

    /// Export an attendance report
    Export {
        /// Restrict the report to one class
        #[arg(long, value_name = "CLASS")]
        class: Option<String>,

        /// Output format (markdown, json)
        #[arg(long, default_value = "markdown", value_name = "FORMAT")]
        format: OutputFormat,

        /// Output file path (default: from config)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Length of the daily series (default: from config, 7)
        #[arg(long, value_name = "DAYS")]
        days: Option<usize>,
    },

    /// Write an AI narrative about one student's attendance
    Narrative {
        /// Student id
        #[arg(long, value_name = "ID")]
        student: String,

        /// Write the narrative to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum StudentsCommand {
    /// List students
    List {
        /// Case-insensitive match on name or roll number
        #[arg(long, value_name = "QUERY")]
        search: Option<String>,

        /// Only students in this class
        #[arg(long, value_name = "CLASS")]
        class: Option<String>,
    },

    /// Add a student
    Add {
        #[arg(long)]
        name: String,

        #[arg(long, value_name = "ROLL")]
        roll_no: String,

        #[arg(long, value_name = "CLASS")]
        class: String,

        #[arg(long)]
        parent_name: Option<String>,

        #[arg(long, value_name = "PHONE")]
        parent_phone: Option<String>,
    },

    /// Remove a student (attendance records are left in place)
    Remove {
        /// Student id
        id: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum AttendanceCommand {
    /// List attendance records
    List {
        #[arg(long, value_name = "ID")]
        student: Option<String>,

        #[arg(long, value_name = "DATE")]
        date: Option<AttendanceDate>,

        #[arg(long, value_name = "CLASS")]
        class: Option<String>,
    },

    /// Mark one student's attendance
    Mark {
        #[arg(long, value_name = "ID")]
        student: String,

        #[arg(long, value_name = "STATUS")]
        status: StatusArg,

        /// Day to mark (default: today)
        #[arg(long, value_name = "DATE")]
        date: Option<AttendanceDate>,
    },

    /// Mark a whole class at once
    MarkClass {
        #[arg(long, value_name = "CLASS")]
        class: String,

        /// Status for every student without an override
        #[arg(long, default_value = "present", value_name = "STATUS")]
        status: StatusArg,

        /// Per-student override, e.g. --set S4=absent (repeatable)
        #[arg(long = "set", value_name = "ID=STATUS", value_parser = parse_override)]
        overrides: Vec<(String, AttendanceStatus)>,

        /// Day to mark (default: today)
        #[arg(long, value_name = "DATE")]
        date: Option<AttendanceDate>,
    },

    /// Delete an attendance record
    Remove {
        /// Attendance record id
        id: String,
    },
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Attendance status as typed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StatusArg {
    Present,
    Absent,
    Excused,
    HalfDay,
}

impl From<StatusArg> for AttendanceStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Present => AttendanceStatus::Present,
            StatusArg::Absent => AttendanceStatus::Absent,
            StatusArg::Excused => AttendanceStatus::Excused,
            StatusArg::HalfDay => AttendanceStatus::HalfDay,
        }
    }
}

/// Parse a `STUDENT_ID=STATUS` override.
fn parse_override(raw: &str) -> Result<(String, AttendanceStatus), String> {
    let (id, status) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=STATUS, got '{}'", raw))?;

    let id = id.trim();
    if id.is_empty() {
        return Err(format!("missing student id in '{}'", raw));
    }

    Ok((id.to_string(), status.parse()?))
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.command.is_none() {
            return Err("No command given. Run with --help to see the commands.".to_string());
        }

        if let Some(ref url) = self.api_url {
            check_url("API URL", url)?;
        }

        if let Some(ref url) = self.ollama_url {
            check_url("Ollama URL", url)?;
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            check_timeout(timeout)?;
        }

        if let Some(concurrency) = self.concurrency {
            check_concurrency(concurrency)?;
        }

        match self.command {
            Some(Command::Stats { days: Some(days), .. })
            | Some(Command::Export { days: Some(days), .. }) => {
                check_window_days(days)?;
            }
            Some(Command::Attendance(AttendanceCommand::MarkClass { ref class, .. }))
                if class.trim().is_empty() =>
            {
                return Err("Class must not be empty".to_string());
            }
            _ => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
