//! Post-interview evaluation. The model scores the transcript against the
//! job context and returns an `AnalysisResult`.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::errors::AppError;
use crate::interview::prompts::{evaluation_prompt, EVALUATION_SYSTEM};
use crate::llm_client::prompts::JSON_ONLY_INSTRUCTION;
use crate::llm_client::LlmClient;
use crate::models::context::InterviewContext;
use crate::models::session::{AnalysisResult, Message};

#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        transcript: &[Message],
        context: &InterviewContext,
    ) -> Result<AnalysisResult, AppError>;
}

/// Raw evaluator output. Every field is optional so a sparse reply still
/// produces a result; the score is clamped on conversion.
#[derive(Debug, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
    #[serde(default)]
    improvements: Vec<String>,
}

impl RawAnalysis {
    fn into_result(self) -> Result<AnalysisResult, AppError> {
        let score = self.score.ok_or_else(|| {
            AppError::MalformedResponse("Evaluation is missing a score".to_string())
        })?;
        Ok(AnalysisResult {
            score: score.round().clamp(0.0, 100.0) as u8,
            summary: self.summary.unwrap_or_default(),
            strengths: self.strengths,
            weaknesses: self.weaknesses,
            improvements: self.improvements,
        })
    }
}

#[async_trait]
impl Evaluator for LlmClient {
    async fn evaluate(
        &self,
        transcript: &[Message],
        context: &InterviewContext,
    ) -> Result<AnalysisResult, AppError> {
        if transcript.is_empty() {
            return Err(AppError::Validation(
                "Cannot evaluate an empty transcript".to_string(),
            ));
        }

        let system = format!("{EVALUATION_SYSTEM}\n\n{JSON_ONLY_INSTRUCTION}");
        let prompt = evaluation_prompt(context, transcript);
        let raw: RawAnalysis = self.call_json(&system, &prompt).await?;
        let result = raw.into_result()?;

        info!(
            "Evaluated transcript of {} messages: score={}",
            transcript.len(),
            result.score
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::tests::{chat_body, test_client};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transcript() -> Vec<Message> {
        vec![
            Message::interviewer("Walk me through your last project."),
            Message::candidate("I rebuilt the checkout flow."),
        ]
    }

    async fn server_replying(content: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(content)))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_evaluate_parses_analysis() {
        let server = server_replying(
            r#"{"score": 78, "summary": "Clear answers", "strengths": ["Structure"],
                "weaknesses": ["Metrics"], "improvements": ["Quantify impact"]}"#,
        )
        .await;

        let result = test_client(&server.uri())
            .evaluate(&transcript(), &InterviewContext::default())
            .await
            .unwrap();
        assert_eq!(result.score, 78);
        assert_eq!(result.improvements, vec!["Quantify impact"]);
    }

    #[tokio::test]
    async fn test_score_is_clamped() {
        let server = server_replying(r#"{"score": 140, "summary": "Too generous"}"#).await;
        let result = test_client(&server.uri())
            .evaluate(&transcript(), &InterviewContext::default())
            .await
            .unwrap();
        assert_eq!(result.score, 100);
        assert!(result.strengths.is_empty());
    }

    #[tokio::test]
    async fn test_missing_score_is_malformed() {
        let server = server_replying(r#"{"summary": "no score"}"#).await;
        let err = test_client(&server.uri())
            .evaluate(&transcript(), &InterviewContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_empty_transcript_is_rejected_without_a_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .evaluate(&[], &InterviewContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
