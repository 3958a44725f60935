mod command;
mod config;
mod error;
mod gitlab;
mod slack;
mod types;

use axum::{
    extract::State,
    http::HeaderMap,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use command::parse_test_command;
use config::Config;
use error::{internal_error_response, AppError};
use gitlab::{GitLabClient, GitLabError};
use serde_json::{json, Value};
use slack::{is_timestamp_fresh, SlackWebClient};
use std::any::Any;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};
use types::{SlackEnvelope, SlackEvent, TestConfig};

#[derive(Clone)]
struct AppState {
    slack: Arc<SlackWebClient>,
    gitlab: Arc<GitLabClient>,
    signing_secret: String,
    max_request_age_secs: u64,
    dry_run: bool,
}

impl AppState {
    fn from_config(config: &Config) -> Self {
        Self {
            slack: Arc::new(SlackWebClient::new(
                config.bot_token.clone(),
                config.slack_api_url.clone(),
            )),
            gitlab: Arc::new(GitLabClient::new(
                config.gitlab_url.clone(),
                config.gitlab_project_id.clone(),
                config.gitlab_trigger_token.clone(),
            )),
            signing_secret: config.signing_secret.clone(),
            max_request_age_secs: config.max_request_age_secs,
            dry_run: config.dry_run,
        }
    }
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slack_ci_bridge=info,tower_http=info".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!(?config, "Configuration loaded");

    if config.dry_run {
        warn!("DRY_RUN mode enabled - pipelines will NOT be triggered");
    }
    if config.max_request_age_secs == 0 {
        warn!("SLACK_REQUEST_MAX_AGE_SECS is 0 - replayed requests will not be rejected");
    }

    let app = build_router(AppState::from_config(&config));

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    info!("Starting server on {}", addr);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server exited with error: {}", e);
        std::process::exit(1);
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/slack/events",
            post(slack_events_handler)
                .get(status_handler)
                .fallback(method_not_allowed),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn status_handler() -> Result<Json<Value>, AppError> {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(json!({
        "message": "Slack GitLab Bridge is working!",
        "timestamp": timestamp,
        "status": "ready",
    })))
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    };
    error!(panic = %message, "Request handler panicked");
    internal_error_response(&message)
}

fn success() -> Json<Value> {
    Json(json!({ "success": true }))
}

async fn slack_events_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<Value>, AppError> {
    debug!(body_len = body.len(), "Received request to /slack/events");

    let envelope: SlackEnvelope = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            warn!("Failed to parse Slack envelope: {}", e);
            return Ok(success());
        }
    };

    match envelope.event_type.as_str() {
        // The handshake carries no side effects, so it is answered unsigned.
        "url_verification" => {
            debug!("URL verification challenge, signature check skipped");
            let challenge = envelope
                .challenge
                .unwrap_or_else(|| Value::String(String::new()));
            Ok(Json(json!({ "challenge": challenge })))
        }
        "event_callback" => {
            authenticate(&state, &headers, &body)?;
            let Some(event) = envelope.event else {
                return Ok(success());
            };
            match serde_json::from_value::<SlackEvent>(event) {
                Ok(event) => handle_message_event(&state, event).await,
                Err(e) => warn!("Failed to parse Slack event: {}", e),
            }
            Ok(success())
        }
        other => {
            debug!(envelope_type = other, "Ignoring Slack envelope");
            Ok(success())
        }
    }
}

fn authenticate(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<(), AppError> {
    let header = |name: &str| headers.get(name).and_then(|h| h.to_str().ok());

    let (Some(timestamp), Some(signature)) = (
        header("X-Slack-Request-Timestamp"),
        header("X-Slack-Signature"),
    ) else {
        warn!("Missing Slack signature headers");
        return Err(AppError::Unauthorized);
    };

    if state.max_request_age_secs > 0 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AppError::Internal(e.to_string()))?
            .as_secs();
        if !is_timestamp_fresh(timestamp, state.max_request_age_secs, now) {
            warn!(timestamp, "Rejected Slack request outside the replay window");
            return Err(AppError::Unauthorized);
        }
    }

    if !SlackWebClient::verify_signature(&state.signing_secret, timestamp, signature, body) {
        warn!("Slack signature verification failed");
        return Err(AppError::Unauthorized);
    }

    Ok(())
}

async fn handle_message_event(state: &AppState, event: SlackEvent) {
    if !event.is_actionable_message() {
        debug!(event_type = %event.event_type, "Ignoring event");
        return;
    }
    let (Some(text), Some(channel)) = (event.text.as_deref(), event.channel.as_deref()) else {
        return;
    };
    let user = event.user.as_deref().unwrap_or("unknown");

    let Some(test_config) = parse_test_command(text) else {
        debug!(user, channel, "Not a test command, ignoring");
        return;
    };

    info!(
        user,
        channel,
        suite = %test_config.test_suite,
        environment = %test_config.environment,
        branch = %test_config.branch,
        "Test command detected"
    );

    if state.dry_run {
        info!("[DRY RUN] Would trigger pipeline for {:?}", test_config);
        let message = format!(
            "[dry run] Would trigger {} tests on {} for branch {}",
            test_config.test_suite, test_config.environment, test_config.branch
        );
        notify(state, channel, &message).await;
        return;
    }

    let message = match state.gitlab.trigger_pipeline(&test_config, user, channel).await {
        Ok(pipeline) => {
            info!(pipeline_id = pipeline.id, url = %pipeline.web_url, "Pipeline triggered");
            confirmation_message(user, &test_config, &pipeline.web_url)
        }
        Err(e @ GitLabError::Parse(_)) => {
            warn!(error = %e, "GitLab accepted the trigger but the reply was unreadable");
            format!(
                "GitLab accepted the {} test trigger for branch {}, but its reply could not be read, so there is no pipeline link. Check the project's pipelines page.",
                test_config.test_suite, test_config.branch
            )
        }
        Err(e) => {
            error!(error = %e, "Failed to trigger tests");
            format!("Failed to trigger tests: {}", e)
        }
    };

    notify(state, channel, &message).await;
}

fn confirmation_message(user: &str, config: &TestConfig, pipeline_url: &str) -> String {
    format!(
        "Tests triggered by <@{}>!\n• *Suite:* {}\n• *Environment:* {}\n• *Branch:* {}\n• *Pipeline:* {}",
        user, config.test_suite, config.environment, config.branch, pipeline_url
    )
}

/// Best effort: delivery failures are logged and never reach the webhook response.
async fn notify(state: &AppState, channel: &str, text: &str) {
    if let Err(e) = state.slack.chat_post_message(channel, text).await {
        warn!(channel, error = %e, "Failed to send Slack message");
    }
}
