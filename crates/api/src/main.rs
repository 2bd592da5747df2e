mod config;
mod metrics;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use listing::flows::{CREATE_LISTING, DESCRIBE_IMAGE, EXTRACT_FROM_TEXT, PARSE_CHAT};
use listing::{DescribeImageOutput, ErrorPayload, FlowError, FlowSummary, ListingFlows};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, info, info_span, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use config::AppConfig;
use metrics::{Metrics, MetricsSnapshot, Outcome, TimedOperation};

const DESCRIBE_BATCH: &str = "describe-images";
const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

struct AppState {
    flows: ListingFlows,
    metrics: Arc<Metrics>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
}

#[derive(Deserialize)]
struct BatchRequest {
    items: Vec<Value>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum BatchItem<T> {
    Ok(T),
    Err { error: ErrorPayload },
}

#[derive(Serialize)]
struct BatchResponse<T> {
    results: Vec<BatchItem<T>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing(config.log_json);

    let flows = ListingFlows::new(config.model.build(), config.flows.clone());
    info!(model = flows.model_name(), "Listing flows ready");

    let state = Arc::new(AppState {
        flows,
        metrics: Metrics::new(&[DESCRIBE_IMAGE, DESCRIBE_BATCH, CREATE_LISTING, EXTRACT_FROM_TEXT, PARSE_CHAT]),
    });

    let app = router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr.as_str()).await?;
    info!("Server listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/flows", get(list_flows))
        .route("/flows/describe-image", post(describe_image))
        .route("/flows/describe-images", post(describe_images))
        .route("/flows/create-listing", post(create_listing))
        .route("/flows/extract-from-text", post(extract_from_text))
        .route("/flows/parse-chat", post(parse_chat))
        .with_state(state)
}

fn status_for(err: &FlowError) -> StatusCode {
    match err {
        FlowError::InputValidation { .. } => StatusCode::BAD_REQUEST,
        FlowError::ModelInvocation { .. } | FlowError::OutputValidation { .. } => StatusCode::BAD_GATEWAY,
        FlowError::Disabled { .. } => StatusCode::NOT_FOUND,
    }
}

fn error_response(status: StatusCode, payload: ErrorPayload) -> Response {
    (status, Json(payload)).into_response()
}

fn rejection_response(rejection: JsonRejection) -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        ErrorPayload {
            message: rejection.body_text(),
            field_errors: None,
        },
    )
}

/// Record metrics and turn a flow result into a response
fn respond<T: Serialize>(
    state: &AppState,
    flow: &'static str,
    timer: TimedOperation,
    result: Result<T, FlowError>,
    degraded: impl Fn(&T) -> bool,
) -> Response {
    match result {
        Ok(output) => {
            let outcome = if degraded(&output) { Outcome::Degraded } else { Outcome::Success };
            state.metrics.record(flow, outcome, timer.elapsed());
            info!(?outcome, elapsed_ms = timer.elapsed().as_millis() as u64, "Flow request served");
            (StatusCode::OK, Json(output)).into_response()
        }
        Err(err) => {
            state.metrics.record(flow, Outcome::Failed, timer.elapsed());
            warn!(kind = err.kind(), error = %err, "Flow request failed");
            error_response(status_for(&err), err.to_payload())
        }
    }
}

/// Run one flow request inside a span carrying its request id, which is
/// echoed back in the `x-request-id` header
async fn serve_flow<T, Fut>(
    state: &AppState,
    flow: &'static str,
    work: Fut,
    degraded: impl Fn(&T) -> bool,
) -> Response
where
    T: Serialize,
    Fut: Future<Output = Result<T, FlowError>>,
{
    let request_id = Uuid::new_v4();
    let span = info_span!("flow_request", %request_id, flow);

    let timer = TimedOperation::start();
    let result = work.instrument(span.clone()).await;
    let mut response = span.in_scope(|| respond(state, flow, timer, result, degraded));

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID, value);
    }
    response
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.flows.model_name().to_string(),
    })
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn list_flows(State(state): State<Arc<AppState>>) -> Json<Vec<FlowSummary>> {
    Json(state.flows.catalog())
}

async fn describe_image(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(input) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    serve_flow(&state, DESCRIBE_IMAGE, state.flows.describe_image(input), |out| out.is_failed()).await
}

async fn describe_images(
    State(state): State<Arc<AppState>>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Response {
    let Json(batch) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };

    let work = async {
        let results = state
            .flows
            .describe_images(batch.items)
            .await
            .into_iter()
            .map(|r| match r {
                Ok(output) => BatchItem::Ok(output),
                Err(err) => BatchItem::Err { error: err.to_payload() },
            })
            .collect();
        Ok::<_, FlowError>(BatchResponse { results })
    };

    serve_flow(&state, DESCRIBE_BATCH, work, |batch: &BatchResponse<DescribeImageOutput>| {
        batch.results.iter().any(|item| match item {
            BatchItem::Ok(output) => output.is_failed(),
            BatchItem::Err { .. } => true,
        })
    })
    .await
}

async fn create_listing(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(input) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    serve_flow(&state, CREATE_LISTING, state.flows.create_listing(input), |_| false).await
}

async fn extract_from_text(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(input) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    serve_flow(&state, EXTRACT_FROM_TEXT, state.flows.extract_from_text(input), |_| false).await
}

async fn parse_chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(input) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    serve_flow(&state, PARSE_CHAT, state.flows.parse_chat(input), |_| false).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use listing::{FlowConfig, GenerateRequest, GenerativeModel};
    use serde_json::json;
    use tower::ServiceExt;

    const PNG: &str = "data:image/png;base64,iVBORw0KGgo=";

    /// Answers every call with the same result
    struct StubModel {
        reply: Result<Value, String>,
    }

    #[async_trait]
    impl GenerativeModel for StubModel {
        async fn generate(&self, _request: &GenerateRequest) -> anyhow::Result<String> {
            match &self.reply {
                Ok(value) => Ok(value.to_string()),
                Err(message) => Err(anyhow::anyhow!(message.clone())),
            }
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn app(reply: Result<Value, String>) -> (Router, Arc<AppState>) {
        let state = Arc::new(AppState {
            flows: ListingFlows::new(Arc::new(StubModel { reply }), FlowConfig::default()),
            metrics: Metrics::new(&[DESCRIBE_IMAGE, DESCRIBE_BATCH, CREATE_LISTING, EXTRACT_FROM_TEXT, PARSE_CHAT]),
        });
        (router(state.clone()), state)
    }

    async fn send(app: Router, uri: &str, body: String) -> Response {
        app
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn post_json(app: Router, uri: &str, body: String) -> (StatusCode, Value) {
        let response = send(app, uri, body).await;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_create_listing_endpoint() {
        let (app, state) = app(Ok(json!({
            "title": "Brass Table Lamp",
            "description": "Hand-polished brass.",
            "category": "Home > Lighting",
            "price": 1
        })));
        let body = json!({"imageDataUris": [PNG], "description": "brass lamp", "cost": 499, "margin": 20});
        let (status, value) = post_json(app, "/flows/create-listing", body.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["price"], 599);
        assert_eq!(value["sizes"], json!([]));
        assert_eq!(state.metrics.snapshot().flows["create-listing"].successes, 1);
    }

    #[tokio::test]
    async fn test_input_errors_are_bad_requests() {
        let (app, _) = app(Ok(json!({})));
        let (status, value) = post_json(app, "/flows/extract-from-text", json!({"txt": "typo"}).to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["fieldErrors"]["text"], json!(["expected string, got nothing"]));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let (app, _) = app(Ok(json!({})));
        let (status, value) = post_json(app, "/flows/parse-chat", "{not json".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(value["message"].is_string());
        assert!(value.get("fieldErrors").is_none());
    }

    #[tokio::test]
    async fn test_model_failure_maps_to_bad_gateway() {
        let (app, _) = app(Err("upstream unavailable".to_string()));
        let (status, value) = post_json(app, "/flows/parse-chat", json!({"chatText": "hi"}).to_string()).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(value["message"].as_str().unwrap().contains("upstream unavailable"));
    }

    #[tokio::test]
    async fn test_describe_image_degraded_is_ok() {
        let (app, state) = app(Err("quota exceeded".to_string()));
        let (status, value) =
            post_json(app, "/flows/describe-image", json!({"imageDataUri": PNG}).to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["title"], "AI Generation Failed");
        assert_eq!(value["category"], "error");
        assert_eq!(state.metrics.snapshot().flows["describe-image"].degraded, 1);
    }

    #[tokio::test]
    async fn test_batch_endpoint_reports_items() {
        let (app, _) = app(Ok(json!({"title": "Mug", "description": "Stoneware", "category": "Home"})));
        let body = json!({"items": [{"imageDataUri": PNG}, {"imageDataUri": 7}]});
        let (status, value) = post_json(app, "/flows/describe-images", body.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["results"][0]["title"], "Mug");
        assert!(value["results"][1]["error"]["fieldErrors"]["imageDataUri"].is_array());
    }

    #[tokio::test]
    async fn test_flow_responses_carry_request_id() {
        let (app, _) = app(Err("upstream unavailable".to_string()));
        let response = send(app, "/flows/extract-from-text", json!({"text": "lamp"}).to_string()).await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let request_id = response.headers()[REQUEST_ID.as_str()].to_str().unwrap();
        assert!(Uuid::parse_str(request_id).is_ok());
    }

    #[test]
    fn test_status_mapping() {
        let disabled = FlowError::Disabled { flow: "parse-chat".to_string() };
        assert_eq!(status_for(&disabled), StatusCode::NOT_FOUND);

        let output = FlowError::OutputValidation {
            flow: "describe-image".to_string(),
            reason: "response is not valid JSON".to_string(),
            errors: Vec::new(),
        };
        assert_eq!(status_for(&output), StatusCode::BAD_GATEWAY);
    }
}
