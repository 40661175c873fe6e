use serde::{Deserialize, Serialize};

use crate::{
    domain::{ExamId, QuestionId},
    error::ErrorBody,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExamSummary {
    pub id: ExamId,
    pub name: String,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub questions: u32,
    #[serde(default)]
    pub points: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExamConfig {
    pub exam_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_id: Option<ExamId>,
    pub duration: u32,
    pub warning_time: u32,
    pub total_questions: u32,
    pub total_points: u32,
    pub passing_percentage: u32,
}

impl Default for ExamConfig {
    fn default() -> Self {
        Self {
            exam_name: String::new(),
            exam_id: None,
            duration: 120,
            warning_time: 15,
            total_questions: 22,
            total_points: 113,
            passing_percentage: 66,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: QuestionId,
    pub topic: String,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub resources: String,
    #[serde(default)]
    pub files: String,
    #[serde(default)]
    pub content: String,
}

fn default_start_question() -> i64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimerState {
    #[serde(default)]
    pub remaining_seconds: u64,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub exam_id: Option<ExamId>,
    #[serde(default = "default_start_question")]
    pub start_question: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartTimerRequest {
    pub exam_id: ExamId,
}

/// Generic acknowledgement for start/cleanup/shutdown; servers vary in
/// what they put in it, so every field is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Acknowledgement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Acknowledgement {
    /// Only an explicit `success: false` counts as a refusal.
    pub fn is_refusal(&self) -> bool {
        self.success == Some(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagRequest {
    pub question_id: QuestionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagResponse {
    pub flagged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionScore {
    pub id: QuestionId,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub max_score: f64,
    #[serde(default)]
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ScoreResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub percentage: f64,
    pub total_score: f64,
    pub max_score: f64,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_formatted: Option<String>,
    pub solutions_available: bool,
    pub questions: Vec<QuestionScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_id: Option<ExamId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Solution {
    pub id: QuestionId,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SolutionsResponse {
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub solutions: Option<Vec<Solution>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SolutionLookup {
    Found(Solution),
    Missing(ErrorBody),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct TerminalStatus {
    pub enabled: bool,
    pub running: bool,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}
