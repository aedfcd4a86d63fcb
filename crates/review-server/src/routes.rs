use crate::gemini::{GenerationRequest, ProviderError, TextGenerator};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::handler::HandlerWithoutStateExt;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use review_core::classify::{classify, FailureKind, PROMPT_BLOCKED_MESSAGE};
use review_core::config::{Environment, Settings, MAX_CHAR_COUNT, MIN_CHAR_COUNT};
use review_core::prompt::{build_prompt, sanitize_for_log, system_instruction};
use review_core::response::extract_text;
use review_core::validate::{validate_review_input, REQUIRED_FIELDS};
use review_core::{AppError, ErrorResponse, ReviewRequest, ReviewResponse, ReviewResult};
use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{debug, error, info, warn, Instrument};

pub struct AppState {
    pub settings: Settings,
    pub generator: Arc<dyn TextGenerator>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.settings.static_dir.clone();

    let api = Router::new()
        .route("/api/generate-review", post(generate_review).fallback(not_found))
        .route("/api/health", get(health).fallback(not_found))
        .with_state(state);

    let app = if Path::new(&static_dir).is_dir() {
        api.fallback_service(
            ServeDir::new(&static_dir)
                .append_index_html_on_directories(true)
                .call_fallback_on_method_not_allowed(true)
                .not_found_service(not_found.into_service()),
        )
    } else {
        api.fallback(not_found)
    };

    app.layer(CatchPanicLayer::custom(handle_panic))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
}

/// POST /api/generate-review
pub async fn generate_review(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ReviewRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Malformed review request");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("リクエストの形式が正しくありません。")),
            )
                .into_response();
        }
    };

    let span = tracing::info_span!("generate_review", request_id = %uuid::Uuid::new_v4());
    let result = write_review(&state, &request).instrument(span.clone()).await;

    match result {
        Ok(review) => (StatusCode::OK, Json(ReviewResponse::from(review))).into_response(),
        Err(e) => span.in_scope(|| error_response(&e, state.settings.environment)),
    }
}

async fn write_review(state: &AppState, request: &ReviewRequest) -> Result<ReviewResult, AppError> {
    let author = request.author();
    if let Some(errors) = validate_review_input(&request.title, author, &request.focus) {
        return Err(AppError::ValidationError(errors));
    }

    let title = request.title.trim();
    let focus = request.focus.trim();
    info!(title = %sanitize_for_log(title), "Generating review");

    let generation = GenerationRequest {
        prompt: build_prompt(title, author, focus),
        system_instruction: system_instruction(),
        sampling: state.settings.sampling,
        search_grounding: state.settings.search_grounding,
    };

    let raw = state.generator.generate(&generation).await?;

    if state.settings.environment.is_development() {
        debug!(response = %raw.to_json(), "Full provider response");
    }

    if let Some(feedback) = raw.prompt_feedback() {
        return Err(AppError::PromptBlocked(feedback.clone()));
    }

    let extracted = extract_text(&raw);
    if extracted.text.trim().is_empty() {
        if let Some(reason) = raw.blocking_finish_reason() {
            return Err(ProviderError::CandidateBlocked(reason.to_string()).into());
        }
        error!(response = %raw.to_json(), "Empty response from Gemini API");
        return Err(AppError::EmptyResponse);
    }

    let review = ReviewResult::new(
        &extracted.text,
        state.generator.model(),
        generation.search_grounding,
    );

    if !(MIN_CHAR_COUNT..=MAX_CHAR_COUNT).contains(&review.character_count) {
        warn!(
            characters = review.character_count,
            "Generated review outside target length"
        );
    }

    info!(
        characters = review.character_count,
        path = ?extracted.path,
        grounded = raw.is_grounded(),
        total_tokens = raw.usage().and_then(|u| u.total_token_count),
        "Review generated"
    );

    Ok(review)
}

/// Map a failed request to its HTTP response. Details beyond the category
/// message only reach the client in development.
fn error_response(e: &AppError, environment: Environment) -> Response {
    let (status, body) = match e {
        AppError::ValidationError(errors) => {
            warn!(errors = ?errors, "Review request rejected");
            let body = ErrorResponse {
                error: errors.first().cloned().unwrap_or_default(),
                details: Some(serde_json::json!(errors)),
                required: Some(REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect()),
                feedback: None,
            };
            (StatusCode::BAD_REQUEST, body)
        }
        AppError::PromptBlocked(feedback) => {
            warn!(feedback = %feedback, "Prompt blocked by safety filter");
            let body = ErrorResponse {
                feedback: Some(feedback.clone()),
                ..ErrorResponse::new(PROMPT_BLOCKED_MESSAGE)
            };
            (StatusCode::BAD_REQUEST, body)
        }
        other => {
            let message = match other {
                AppError::ProviderError(m) => m.clone(),
                _ => other.to_string(),
            };
            let kind = classify(&message);
            error!(kind = %kind, error = %message, "Review generation failed");

            let mut body = ErrorResponse::new(kind.user_message());
            if kind == FailureKind::Unknown && environment.is_development() {
                body.details = Some(serde_json::Value::String(message));
            }
            let status =
                StatusCode::from_u16(kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, body)
        }
    };

    (status, Json(body)).into_response()
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "geminiConfigured": !state.settings.api_key.is_empty(),
            "nodeEnv": state.settings.environment.as_str(),
        })),
    )
        .into_response()
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new("Not Found"))).into_response()
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(panic = %detail, "Unhandled error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Internal Server Error")),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use review_core::response::RawResponse;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tower::ServiceExt;

    enum Outcome {
        Respond(Value),
        Fail(String),
    }

    struct MockGenerator {
        outcome: Outcome,
        calls: AtomicUsize,
        last_request: Mutex<Option<GenerationRequest>>,
    }

    impl MockGenerator {
        fn new(outcome: Outcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for MockGenerator {
        fn model(&self) -> &str {
            "gemini-2.5-flash"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<RawResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            match &self.outcome {
                Outcome::Respond(v) => Ok(serde_json::from_value(v.clone()).unwrap()),
                Outcome::Fail(m) => Err(ProviderError::Transport(m.clone())),
            }
        }
    }

    fn settings(env: &str) -> Settings {
        let env = env.to_string();
        Settings::from_lookup(move |k| match k {
            "GEMINI_API_KEY" => Some("test-key".into()),
            "APP_ENV" => Some(env.clone()),
            "STATIC_DIR" => Some("/nonexistent/static".into()),
            _ => None,
        })
        .unwrap()
    }

    fn app_with(generator: Arc<MockGenerator>, env: &str) -> Router {
        router(Arc::new(AppState {
            settings: settings(env),
            generator,
        }))
    }

    fn text_response(text: &str) -> Value {
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}, "finishReason": "STOP"}]})
    }

    async fn post_review(app: Router, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/api/generate-review")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(app, req).await
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn generates_review_with_character_count() {
        let text = format!("{}\n\n{}\u{3000}{}", "あ".repeat(50), "い".repeat(280), "う".repeat(70));
        let mock = MockGenerator::new(Outcome::Respond(text_response(&text)));
        let app = app_with(mock.clone(), "production");

        let (status, body) = post_review(
            app,
            json!({"title": "Deep Work", "author": "Cal Newport", "focus": "集中力と生産性"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["metadata"]["characterCount"], 400);
        assert_eq!(body["metadata"]["model"], "gemini-2.5-flash");
        assert_eq!(body["metadata"]["searchUsed"], true);
        assert_eq!(body["text"], text.as_str());

        let sent = mock.last_request.lock().unwrap().clone().unwrap();
        assert!(sent.prompt.contains("著者: Cal Newport"));
        assert!(sent.prompt.contains("集中力と生産性"));
        assert!(sent.search_grounding);
        assert_eq!(sent.sampling.top_k, 40);
    }

    #[tokio::test]
    async fn empty_title_rejected_without_calling_provider() {
        let mock = MockGenerator::new(Outcome::Respond(text_response("unused")));
        let app = app_with(mock.clone(), "production");

        let (status, body) = post_review(app, json!({"title": "", "focus": "x"})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "タイトルと焦点は必須です。");
        assert_eq!(body["details"], json!(["タイトルと焦点は必須です。"]));
        assert_eq!(body["required"], json!(["title", "focus"]));
        assert_eq!(mock.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_fields_rejected() {
        let mock = MockGenerator::new(Outcome::Respond(text_response("unused")));
        let (status, body) = post_review(app_with(mock, "production"), json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["required"], json!(["title", "focus"]));
    }

    #[tokio::test]
    async fn overlong_fields_list_all_violations() {
        let mock = MockGenerator::new(Outcome::Respond(text_response("unused")));
        let (status, body) = post_review(
            app_with(mock, "production"),
            json!({"title": "t".repeat(201), "focus": "f".repeat(501)}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "タイトルは200文字以内である必要があります。");
        assert_eq!(body["details"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn null_fields_are_validation_errors() {
        let mock = MockGenerator::new(Outcome::Respond(text_response("unused")));
        let app = app_with(mock.clone(), "production");

        let (status, body) = post_review(app.clone(), json!({"title": null, "focus": "x"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "タイトルと焦点は必須です。");
        assert_eq!(body["details"], json!(["タイトルと焦点は必須です。"]));
        assert_eq!(body["required"], json!(["title", "focus"]));

        let (status, body) = post_review(app, json!({"title": "t", "focus": null})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["required"], json!(["title", "focus"]));
        assert_eq!(mock.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wrong_method_is_json_404() {
        let mock = MockGenerator::new(Outcome::Respond(text_response("unused")));
        let app = app_with(mock.clone(), "production");

        let req = Request::builder()
            .method("GET")
            .uri("/api/generate-review")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app.clone(), req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Not Found"}));

        let req = Request::builder()
            .method("POST")
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Not Found"}));
        assert_eq!(mock.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn safety_ratings_without_block_reason_still_succeed() {
        let mock = MockGenerator::new(Outcome::Respond(json!({
            "promptFeedback": {"safetyRatings": [{"category": "HARM_CATEGORY_HARASSMENT", "probability": "NEGLIGIBLE"}]},
            "candidates": [{"content": {"parts": [{"text": "感想文"}]}}]
        })));
        let (status, body) =
            post_review(app_with(mock, "production"), json!({"title": "t", "focus": "f"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "感想文");
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let mock = MockGenerator::new(Outcome::Respond(text_response("unused")));
        let req = Request::builder()
            .method("POST")
            .uri("/api/generate-review")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(app_with(mock.clone(), "production"), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        assert_eq!(mock.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rate_limit_maps_to_429() {
        let mock = MockGenerator::new(Outcome::Fail("rate limit exceeded".into()));
        let (status, body) =
            post_review(app_with(mock, "production"), json!({"title": "t", "focus": "f"})).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            body["error"],
            "リクエスト制限に達しました。しばらく待ってから再試行してください。"
        );
    }

    #[tokio::test]
    async fn api_key_failure_maps_to_401() {
        let mock = MockGenerator::new(Outcome::Fail("API key not valid".into()));
        let (status, _) =
            post_review(app_with(mock, "production"), json!({"title": "t", "focus": "f"})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn prompt_feedback_is_content_rejection() {
        let feedback = json!({"blockReason": "SAFETY", "safetyRatings": []});
        let mock = MockGenerator::new(Outcome::Respond(json!({
            "response": {"promptFeedback": feedback.clone(), "candidates": []}
        })));
        let (status, body) =
            post_review(app_with(mock, "production"), json!({"title": "t", "focus": "f"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], PROMPT_BLOCKED_MESSAGE);
        assert_eq!(body["feedback"], feedback);
    }

    #[tokio::test]
    async fn safety_finish_reason_is_content_rejection() {
        let mock = MockGenerator::new(Outcome::Respond(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        })));
        let (status, body) =
            post_review(app_with(mock, "production"), json!({"title": "t", "focus": "f"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("安全性フィルター"));
        assert!(body.get("feedback").is_none());
    }

    #[tokio::test]
    async fn empty_output_is_server_error_with_details_in_development() {
        let mock = MockGenerator::new(Outcome::Respond(json!({"candidates": []})));
        let (status, body) =
            post_review(app_with(mock, "development"), json!({"title": "t", "focus": "f"})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "感想文の生成中にエラーが発生しました。");
        assert!(body["details"].as_str().unwrap().contains("有効なテキスト"));
    }

    #[tokio::test]
    async fn server_error_details_hidden_in_production() {
        let mock = MockGenerator::new(Outcome::Fail("connection reset".into()));
        let (status, body) =
            post_review(app_with(mock, "production"), json!({"title": "t", "focus": "f"})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn health_reports_configuration() {
        let mock = MockGenerator::new(Outcome::Respond(text_response("unused")));
        let req = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app_with(mock, "development"), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["geminiConfigured"], true);
        assert_eq!(body["nodeEnv"], "development");
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let mock = MockGenerator::new(Outcome::Respond(text_response("unused")));
        let req = Request::builder()
            .uri("/api/nope")
            .body(Body::empty())
            .unwrap();
        let resp = app_with(mock, "production").oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            resp.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
            "nosniff"
        );
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"error": "Not Found"}));
    }

    #[tokio::test]
    async fn panics_become_internal_server_error() {
        async fn boom() -> Response {
            panic!("boom")
        }

        let app: Router = Router::new()
            .route("/boom", get(boom))
            .layer(CatchPanicLayer::custom(handle_panic));
        let req = Request::builder().uri("/boom").body(Body::empty()).unwrap();
        let (status, body) = send(app, req).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Internal Server Error"}));
    }
}
