//! AI-written attendance narratives.
//!
//! Sends one student's attendance history to an Ollama model and returns
//! the short report it writes back.

use crate::analysis::student_summary;
use crate::config::NarrativeConfig;
use crate::models::{AttendanceRecord, Student, StudentSummary};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// How many of the newest records are listed in the prompt.
const PROMPT_RECORD_LIMIT: usize = 30;

/// Message in the chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Client that asks an Ollama model for attendance narratives.
pub struct NarrativeClient {
    config: NarrativeConfig,
    http_client: reqwest::Client,
}

impl NarrativeClient {
    pub fn new(config: NarrativeConfig) -> Result<Self> {
        info!("Using model {} at {} for narratives", config.model, config.ollama_url);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Write a narrative for `student` from their records in `records`.
    pub async fn generate(&self, student: &Student, records: &[AttendanceRecord]) -> Result<String> {
        let summary = student_summary(student, records);
        let prompt = build_prompt(student, &summary, records);

        debug!("Narrative prompt is {} characters", prompt.len());

        let narrative = self.send_prompt(&prompt).await?;
        let narrative = narrative.trim();
        if narrative.is_empty() {
            anyhow::bail!("Model returned an empty narrative");
        }

        Ok(narrative.to_string())
    }

    async fn send_prompt(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.config.ollama_url.trim_end_matches('/'));

        let request = OllamaChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!("Request timed out after {}s", self.config.timeout_seconds)
                } else if e.is_connect() {
                    anyhow::anyhow!(
                        "Cannot connect to Ollama at {}. Is Ollama running?",
                        self.config.ollama_url
                    )
                } else {
                    anyhow::anyhow!("Failed to send request: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Ollama API error {}: {}", status, body));
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(chat_response.message.content)
    }
}

/// Build the user prompt describing one student's attendance.
pub fn build_prompt(student: &Student, summary: &StudentSummary, records: &[AttendanceRecord]) -> String {
    let mut prompt = String::new();

    prompt.push_str("Write a short attendance report for the student below.\n\n");
    prompt.push_str(&format!("Student: {} (roll no. {})\n", student.name, student.roll_no));
    prompt.push_str(&format!("Class: {}\n", student.class_id));

    if summary.total == 0 {
        prompt.push_str("\nNo attendance has been recorded for this student yet.\n");
        return prompt;
    }

    prompt.push_str(&format!(
        "\nRecorded days: {}\nPresent: {}\nHalf days: {}\nAbsent: {}\nExcused: {}\nAttendance rate: {}\n",
        summary.total,
        summary.present,
        summary.half_day,
        summary.absent,
        summary.excused,
        summary.rate_display()
    ));

    if let (Some(first), Some(last)) = (summary.first_date, summary.last_date) {
        prompt.push_str(&format!("Period: {} to {}\n", first, last));
    }

    if !summary.recent_absences.is_empty() {
        let dates: Vec<String> = summary.recent_absences.iter().map(|d| d.to_string()).collect();
        prompt.push_str(&format!("Most recent absences: {}\n", dates.join(", ")));
    }

    let mut own: Vec<&AttendanceRecord> = records
        .iter()
        .filter(|r| r.student_id == student.student_id)
        .collect();
    own.sort_by(|a, b| b.date.cmp(&a.date));

    prompt.push_str("\nLatest records (newest first):\n");
    for record in own.iter().take(PROMPT_RECORD_LIMIT) {
        prompt.push_str(&format!("- {}: {}\n", record.date, record.status));
    }

    prompt
}

/// System prompt for narrative generation
const SYSTEM_PROMPT: &str = r#"You are a school administrator writing attendance notes for teachers and parents.
Summarize the student's attendance in one or two short paragraphs.
Mention the attendance rate, any pattern in the absences, and one practical suggestion.
Use plain language. Do not invent facts that are not in the data."#;
