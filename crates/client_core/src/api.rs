//! Remote exam server API.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{ExamId, QuestionId},
    error::ApiException,
    protocol::{
        Acknowledgement, ExamConfig, ExamSummary, FlagRequest, FlagResponse, Question,
        ScoreResponse, Solution, SolutionLookup, SolutionsResponse, StartTimerRequest,
        TerminalStatus, TimerState,
    },
};
use tracing::debug;
use url::Url;

#[async_trait]
pub trait ExamApi: Send + Sync {
    async fn list_exams(&self) -> Result<Vec<ExamSummary>>;
    async fn exam_config(&self, exam_id: &ExamId) -> Result<ExamConfig>;
    async fn questions(&self, exam_id: &ExamId) -> Result<Vec<Question>>;
    async fn timer(&self) -> Result<TimerState>;
    async fn start_timer(&self, exam_id: &ExamId) -> Result<()>;
    /// Toggles the remote pause flag and returns the resulting timer state.
    async fn toggle_pause(&self) -> Result<TimerState>;
    /// Returns the server's flagged state for the question after the toggle.
    async fn toggle_flag(&self, question_id: &QuestionId) -> Result<bool>;
    async fn flags(&self) -> Result<Vec<QuestionId>>;
    async fn compute_score(&self) -> Result<ScoreResponse>;
    async fn solutions(&self, exam_id: &ExamId) -> Result<SolutionsResponse>;
    async fn solution(
        &self,
        exam_id: &ExamId,
        question_id: &QuestionId,
    ) -> Result<Option<Solution>>;
    async fn terminal_status(&self) -> Result<TerminalStatus>;
    async fn cleanup(&self) -> Result<()>;
    async fn shutdown(&self) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct EmptyBody {}

/// `ExamApi` over plain JSON/HTTP.
pub struct HttpExamApi {
    http: Client,
    server_url: String,
}

impl HttpExamApi {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), server_url)
    }

    pub fn with_client(http: Client, server_url: impl Into<String>) -> Self {
        let server_url = server_url.into();
        Self {
            http,
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(format!("{}{path}", self.server_url))
            .send()
            .await
            .with_context(|| format!("GET {path} failed"))?;
        decode(path, response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .http
            .post(format!("{}{path}", self.server_url))
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {path} failed"))?;
        decode(path, response).await
    }

    async fn post_lifecycle(&self, path: &str) -> Result<()> {
        let response: Acknowledgement = self.post_json(path, &EmptyBody {}).await?;
        if response.is_refusal() {
            return Err(anyhow!(
                "{path} reported failure: {}",
                response
                    .error
                    .unwrap_or_else(|| "no error message".to_string())
            ));
        }
        debug!(path, status = ?response.status, "api: lifecycle call acknowledged");
        Ok(())
    }
}

/// Absolute request path with every segment percent-encoded.
pub(crate) fn encoded_path(segments: &[&str]) -> Result<String> {
    let mut url = Url::parse("http://localhost/").context("invalid path base")?;
    url.path_segments_mut()
        .map_err(|()| anyhow!("path base cannot take segments"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url.path().to_string())
}

async fn decode<T: DeserializeOwned>(endpoint: &str, response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiException::new(endpoint, status.as_u16(), body.trim()).into());
    }
    response
        .json::<T>()
        .await
        .with_context(|| format!("invalid response body from {endpoint}"))
}

#[async_trait]
impl ExamApi for HttpExamApi {
    async fn list_exams(&self) -> Result<Vec<ExamSummary>> {
        self.get_json("/api/exams").await
    }

    async fn exam_config(&self, exam_id: &ExamId) -> Result<ExamConfig> {
        self.get_json(&encoded_path(&["api", "exam", exam_id.as_str(), "config"])?)
            .await
    }

    async fn questions(&self, exam_id: &ExamId) -> Result<Vec<Question>> {
        self.get_json(&encoded_path(&["api", "exam", exam_id.as_str(), "questions"])?)
            .await
    }

    async fn timer(&self) -> Result<TimerState> {
        self.get_json("/api/timer").await
    }

    async fn start_timer(&self, exam_id: &ExamId) -> Result<()> {
        let _: serde_json::Value = self
            .post_json(
                "/api/timer/start",
                &StartTimerRequest {
                    exam_id: exam_id.clone(),
                },
            )
            .await?;
        Ok(())
    }

    async fn toggle_pause(&self) -> Result<TimerState> {
        self.post_json("/api/timer/pause", &EmptyBody {}).await
    }

    async fn toggle_flag(&self, question_id: &QuestionId) -> Result<bool> {
        let response: FlagResponse = self
            .post_json(
                "/api/flag",
                &FlagRequest {
                    question_id: question_id.clone(),
                },
            )
            .await?;
        Ok(response.flagged)
    }

    async fn flags(&self) -> Result<Vec<QuestionId>> {
        self.get_json("/api/flags").await
    }

    async fn compute_score(&self) -> Result<ScoreResponse> {
        self.post_json("/api/score", &EmptyBody {}).await
    }

    async fn solutions(&self, exam_id: &ExamId) -> Result<SolutionsResponse> {
        self.get_json(&encoded_path(&["api", "exam", exam_id.as_str(), "solutions"])?)
            .await
    }

    async fn solution(
        &self,
        exam_id: &ExamId,
        question_id: &QuestionId,
    ) -> Result<Option<Solution>> {
        let path = encoded_path(&[
            "api",
            "exam",
            exam_id.as_str(),
            "solutions",
            question_id.as_str(),
        ])?;
        match self.get_json::<SolutionLookup>(&path).await {
            Ok(SolutionLookup::Found(solution)) => Ok(Some(solution)),
            Ok(SolutionLookup::Missing(body)) => {
                debug!(%exam_id, %question_id, error = %body.error, "api: solution missing");
                Ok(None)
            }
            Err(err) => match err.downcast_ref::<ApiException>() {
                Some(api_err) if api_err.is_not_found() => Ok(None),
                _ => Err(err),
            },
        }
    }

    async fn terminal_status(&self) -> Result<TerminalStatus> {
        self.get_json("/api/terminal/status").await
    }

    async fn cleanup(&self) -> Result<()> {
        self.post_lifecycle("/api/cleanup").await
    }

    async fn shutdown(&self) -> Result<()> {
        self.post_lifecycle("/api/shutdown").await
    }
}
