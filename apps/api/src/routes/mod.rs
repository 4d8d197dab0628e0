pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::documents::handlers as documents;
use crate::interview::handlers as interviews;
use crate::realtime::handlers as realtime;
use crate::roles::handlers as roles;
use crate::speech::handlers as speech;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Profile & roles
        .route(
            "/api/v1/profile",
            get(roles::handle_get_profile)
                .post(roles::handle_create_profile)
                .patch(roles::handle_update_profile),
        )
        .route(
            "/api/v1/roles",
            get(roles::handle_list_roles).post(roles::handle_create_role),
        )
        .route(
            "/api/v1/roles/:role_id",
            get(roles::handle_get_role)
                .patch(roles::handle_update_role)
                .delete(roles::handle_delete_role),
        )
        .route(
            "/api/v1/roles/:role_id/feedback",
            get(roles::handle_get_feedback),
        )
        .route(
            "/api/v1/roles/:role_id/stages/:stage_id/next",
            get(roles::handle_next_stage),
        )
        .route(
            "/api/v1/roles/:role_id/sessions/:session_id/transcript",
            get(roles::handle_export_transcript),
        )
        .route(
            "/api/v1/roles/:role_id/sessions/:session_id/analysis",
            post(roles::handle_analyze_session),
        )
        .route(
            "/api/v1/selection",
            get(roles::handle_get_selection).put(roles::handle_put_selection),
        )
        // Discrete-turn interviews
        .route("/api/v1/interviews", post(interviews::handle_start_interview))
        .route("/api/v1/interviews/:id", get(interviews::handle_get_interview))
        .route(
            "/api/v1/interviews/:id/turns",
            post(interviews::handle_send_turn),
        )
        .route(
            "/api/v1/interviews/:id/end",
            post(interviews::handle_end_interview),
        )
        // Realtime modality
        .route(
            "/api/v1/realtime/session",
            post(realtime::handle_create_session),
        )
        .route(
            "/api/v1/realtime/transcripts",
            post(realtime::handle_save_transcript),
        )
        // Speech
        .route(
            "/api/v1/speech/transcribe",
            post(speech::handle_transcribe),
        )
        .route(
            "/api/v1/speech/synthesize",
            post(speech::handle_synthesize),
        )
        // Documents
        .route(
            "/api/v1/documents/parse",
            post(documents::handle_parse_document),
        )
        .route(
            "/api/v1/documents/profile",
            post(documents::handle_extract_profile),
        )
        .route(
            "/api/v1/documents/role",
            post(documents::handle_extract_role),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::interview::engine::tests::{ManualClock, ScriptedReasoner};
    use crate::interview::evaluator::Evaluator;
    use crate::llm_client::tests::test_client;
    use crate::models::context::InterviewContext;
    use crate::models::session::{AnalysisResult, Message};
    use crate::realtime::channel::tests::FakeNegotiator;
    use crate::store::{MemoryStore, SessionStore};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct FixedEvaluator;

    #[async_trait]
    impl Evaluator for FixedEvaluator {
        async fn evaluate(
            &self,
            transcript: &[Message],
            context: &InterviewContext,
        ) -> Result<AnalysisResult, AppError> {
            assert!(!transcript.is_empty());
            assert!(context.role_title().is_some());
            Ok(AnalysisResult {
                score: 78,
                summary: "Clear and structured.".to_string(),
                strengths: vec!["Storytelling".to_string()],
                weaknesses: vec!["Metrics".to_string()],
                improvements: vec!["Quantify impact".to_string()],
            })
        }
    }

    fn app_with(reasoner: ScriptedReasoner, negotiator: FakeNegotiator) -> Router {
        let mut state = AppState::new(
            SessionStore::new(Arc::new(MemoryStore::new())),
            test_client("http://127.0.0.1:9"),
            None,
        );
        state.reasoning = Arc::new(reasoner);
        state.clock = Arc::new(ManualClock::new());
        state.evaluator = Arc::new(FixedEvaluator);
        state.negotiator = Arc::new(negotiator);
        build_router(state)
    }

    fn app() -> Router {
        app_with(
            ScriptedReasoner::new(vec![
                Some("Hi, I'm Sam. Tell me about yourself."),
                Some("Why this role?"),
            ]),
            FakeNegotiator::ok(),
        )
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    async fn create_role(app: &Router) -> String {
        let (status, role) = call(
            app,
            Method::POST,
            "/api/v1/roles",
            Some(json!({
                "role_name": "Wise - Senior Designer",
                "company_name": "Wise",
                "role_title": "Senior Designer"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(role["stages"].as_array().unwrap().len(), 3);
        role["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(&app(), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "rehearse-api");
    }

    #[tokio::test]
    async fn test_profile_lifecycle() {
        let app = app();
        let (status, body) = call(&app, Method::GET, "/api/v1/profile", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let (status, _) = call(
            &app,
            Method::PATCH,
            "/api/v1/profile",
            Some(json!({"name": "Jane"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/profile",
            Some(json!({"name": "Jane Doe", "strengths": ["Research"]})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, profile) = call(
            &app,
            Method::PATCH,
            "/api/v1/profile",
            Some(json!({"background": "Ten years in product design."})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["name"], "Jane Doe");
        assert_eq!(profile["background"], "Ten years in product design.");
    }

    #[tokio::test]
    async fn test_interview_flow_persists_session_once() {
        let app = app();
        let role_id = create_role(&app).await;

        let (status, view) = call(
            &app,
            Method::POST,
            "/api/v1/interviews",
            Some(json!({"role_id": role_id})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(view["state"], "active");
        assert_eq!(view["stage_id"], "screening");
        assert_eq!(view["messages"].as_array().unwrap().len(), 1);
        let id = view["id"].as_str().unwrap().to_string();

        let (status, turn) = call(
            &app,
            Method::POST,
            &format!("/api/v1/interviews/{id}/turns"),
            Some(json!({"text": "I design payment flows."})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(turn["reply"]["text"], "Why this role?");
        assert_eq!(turn["interview"]["messages"].as_array().unwrap().len(), 3);

        let end_uri = format!("/api/v1/interviews/{id}/end");
        let (status, first) = call(&app, Method::POST, &end_uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["transcript"].as_array().unwrap().len(), 3);

        // Ended interviews leave the live registry; the stored copy answers.
        let (status, _) = call(&app, Method::GET, &format!("/api/v1/interviews/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, second) = call(&app, Method::POST, &end_uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first, second);

        let (_, role) = call(&app, Method::GET, &format!("/api/v1/roles/{role_id}"), None).await;
        assert_eq!(role["sessions"].as_array().unwrap().len(), 1);

        let (_, selection) = call(&app, Method::GET, "/api/v1/selection", None).await;
        assert_eq!(selection["session_id"], id.as_str());

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/api/v1/interviews/{id}/turns"),
            Some(json!({"text": "One more thing"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "INVALID_STATE");
    }

    #[tokio::test]
    async fn test_failed_reply_keeps_candidate_turn() {
        let app = app_with(
            ScriptedReasoner::new(vec![Some("Welcome."), None]),
            FakeNegotiator::ok(),
        );
        let role_id = create_role(&app).await;
        let (_, view) = call(
            &app,
            Method::POST,
            "/api/v1/interviews",
            Some(json!({"role_id": role_id})),
        )
        .await;
        let id = view["id"].as_str().unwrap();

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/api/v1/interviews/{id}/turns"),
            Some(json!({"text": "My answer"})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (_, view) = call(&app, Method::GET, &format!("/api/v1/interviews/{id}"), None).await;
        let messages = view["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["role"], "candidate");
    }

    #[tokio::test]
    async fn test_unknown_role_and_interview_are_not_found() {
        let app = app();
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/interviews",
            Some(json!({"role_id": "missing"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, Method::GET, "/api/v1/interviews/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_realtime_transcript_then_analysis_and_export() {
        let app = app();
        let role_id = create_role(&app).await;

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/realtime/transcripts",
            Some(json!({
                "role_id": role_id,
                "stage_id": "screening",
                "started_at": "2026-03-02T09:00:00Z",
                "transcript": []
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, session) = call(
            &app,
            Method::POST,
            "/api/v1/realtime/transcripts",
            Some(json!({
                "role_id": role_id,
                "stage_id": "screening",
                "started_at": "2026-03-02T09:00:00Z",
                "ended_at": "2026-03-02T09:18:00Z",
                "transcript": [
                    {"role": "interviewer", "text": "Tell me about yourself."},
                    {"role": "candidate", "text": "I lead design at a fintech."}
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(session["stage_name"], "Screening");
        let session_id = session["id"].as_str().unwrap();

        let analysis_uri = format!("/api/v1/roles/{role_id}/sessions/{session_id}/analysis");
        let (status, analysed) = call(&app, Method::POST, &analysis_uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(analysed["analysis"]["score"], 78);

        let (status, _) = call(&app, Method::POST, &analysis_uri, None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, feedback) = call(
            &app,
            Method::GET,
            &format!("/api/v1/roles/{role_id}/feedback"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(feedback["feedback"]
            .as_str()
            .unwrap()
            .contains("Score: 78/100"));

        let (status, markdown) = call(
            &app,
            Method::GET,
            &format!("/api/v1/roles/{role_id}/sessions/{session_id}/transcript"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let markdown = markdown.as_str().unwrap();
        assert!(markdown.starts_with("# Interview Session Report"));
        assert!(markdown.contains("**Candidate:** I lead design at a fintech."));
        assert!(markdown.contains("### Overall Score: 78/100"));
    }

    #[tokio::test]
    async fn test_realtime_session_credential() {
        let app = app();
        let role_id = create_role(&app).await;
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/realtime/session",
            Some(json!({"role_id": role_id, "stage_id": "hiring-manager"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["client_secret"], "ek_test");
        assert_eq!(body["stage_id"], "hiring-manager");

        let app = app_with(
            ScriptedReasoner::always("unused"),
            FakeNegotiator {
                secret: None,
                ..FakeNegotiator::ok()
            },
        );
        let role_id = create_role(&app).await;
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/realtime/session",
            Some(json!({"role_id": role_id})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "MALFORMED_RESPONSE");
    }

    #[tokio::test]
    async fn test_next_stage_and_delete_cascade() {
        let app = app();
        let role_id = create_role(&app).await;

        let (_, next) = call(
            &app,
            Method::GET,
            &format!("/api/v1/roles/{role_id}/stages/screening/next"),
            None,
        )
        .await;
        assert_eq!(next["next_stage"]["id"], "hiring-manager");

        let (_, last) = call(
            &app,
            Method::GET,
            &format!("/api/v1/roles/{role_id}/stages/cultural-fit/next"),
            None,
        )
        .await;
        assert!(last["next_stage"].is_null());

        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/v1/selection",
            Some(json!({"role_id": role_id, "stage_id": "screening"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&app, Method::DELETE, &format!("/api/v1/roles/{role_id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, selection) = call(&app, Method::GET, "/api/v1/selection", None).await;
        assert!(selection["role_id"].is_null());
        assert!(selection["stage_id"].is_null());
    }

    #[tokio::test]
    async fn test_selection_requires_role_for_stage() {
        let (status, _) = call(
            &app(),
            Method::PUT,
            "/api/v1/selection",
            Some(json!({"stage_id": "screening"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_parse_plain_text_document() {
        let boundary = "rehearse-boundary";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"jd.txt\"\r\n\
             Content-Type: text/plain\r\n\r\n\
             Senior Designer at Wise\r\n\
             --{boundary}--\r\n"
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/documents/parse")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["file_name"], "jd.txt");
        assert_eq!(parsed["text"], "Senior Designer at Wise");
    }
}
