//! REST API for the grouping service.
//!
//! Provides HTTP endpoints that accept item records as JSON and return
//! bundles and batches. Uses Axum as the web framework and supports CORS.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};

use crate::config::{ApiConfig, GroupingSettings};
use crate::model::{Batch, Bundle, Item, ItemUnit, ValidationError, expanded_unit_count};
use crate::optimizer::{
    GroupingConfig, GroupingError, GroupingResult, GroupingSummary, OversizePolicy,
    group_shipment, group_shipment_with_progress,
};
use crate::types::Weighted;

#[derive(Clone)]
struct ApiState {
    grouping: GroupingSettings,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>box-bundler API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

fn default_quantity() -> f64 {
    1.0
}

/// Single item record in a grouping request.
///
/// `dims` is (length, width, height); only width and height decide similarity.
#[derive(Deserialize, Clone, Debug, ToSchema)]
pub struct ItemRequest {
    pub name: String,
    #[schema(value_type = [f64; 3], example = json!([2.0, 70.0, 50.0]))]
    pub dims: (f64, f64, f64),
    pub weight: f64,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
}

impl ItemRequest {
    fn into_item(self) -> Result<Item, ValidationError> {
        Item::new(self.name, self.dims, self.weight, self.quantity)
    }
}

#[derive(Deserialize, Debug, ToSchema)]
#[schema(
    example = json!({
        "items": [
            { "name": "Box1", "dims": [2.0, 70.0, 50.0], "weight": 23.0, "quantity": 4 },
            { "name": "Box5", "dims": [1.0, 13.0, 13.0], "weight": 4.0, "quantity": 5 }
        ],
        "tolerance": 5.0,
        "bundle_weight_cap": 49.0
    })
)]
pub struct GroupRequest {
    pub items: Vec<ItemRequest>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub tolerance: Option<f64>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub bundle_weight_cap: Option<f64>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub batch_weight_cap: Option<f64>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub reject_oversized: Option<bool>,
}

#[derive(Debug)]
struct ValidatedGroupRequest {
    items: Vec<Item>,
    config: GroupingConfig,
}

#[derive(Debug)]
enum GroupRequestValidationError {
    InvalidItem { index: usize, err: ValidationError },
    InvalidConfiguration(ValidationError),
    TooManyUnits { units: usize, limit: usize },
}

impl GroupRequest {
    /// Applies request-level overrides to `base` and validates every item.
    ///
    /// Without an explicit `batch_weight_cap`, a bundle cap override also
    /// applies to batches as long as `base` uses one cap for both stages.
    fn into_validated(
        self,
        base: GroupingConfig,
    ) -> Result<ValidatedGroupRequest, GroupRequestValidationError> {
        let mut config = base;
        if let Some(tolerance) = self.tolerance {
            config.tolerance = tolerance;
        }
        if let Some(cap) = self.bundle_weight_cap {
            config.bundle_weight_cap = cap;
            if self.batch_weight_cap.is_none()
                && base.batch_weight_cap == base.bundle_weight_cap
            {
                config.batch_weight_cap = cap;
            }
        }
        if let Some(cap) = self.batch_weight_cap {
            config.batch_weight_cap = cap;
        }
        if let Some(reject) = self.reject_oversized {
            config.oversize_policy = if reject {
                OversizePolicy::Reject
            } else {
                OversizePolicy::Accept
            };
        }
        config
            .validate()
            .map_err(GroupRequestValidationError::InvalidConfiguration)?;

        let items = self
            .items
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                entry.into_item()
                    .map_err(|err| GroupRequestValidationError::InvalidItem { index, err })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let units = expanded_unit_count(&items);
        if units > config.max_units {
            return Err(GroupRequestValidationError::TooManyUnits {
                units,
                limit: config.max_units,
            });
        }

        Ok(ValidatedGroupRequest { items, config })
    }
}

/// Response structure with all batches and the summary.
#[derive(Serialize, ToSchema)]
pub struct GroupResponse {
    pub batches: Vec<BatchResponse>,
    pub summary: GroupingSummary,
}

/// Single batch with its bundles.
///
/// # Fields
/// * `id` - Batch number (1-based)
/// * `total_weight` - Sum of all bundle weights
/// * `exceeds_cap` - Set for a solitary bundle heavier than the batch cap
#[derive(Serialize, ToSchema)]
pub struct BatchResponse {
    pub id: usize,
    pub total_weight: f64,
    pub exceeds_cap: bool,
    pub bundles: Vec<BundleResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct BundleResponse {
    pub total_weight: f64,
    pub exceeds_cap: bool,
    pub items: Vec<UnitResponse>,
}

/// Single placed unit in the response.
///
/// # Fields
/// * `source` - Index of the originating item in the request
/// * `name` - Item name
/// * `dims` - Dimensions (length, width, height)
/// * `weight` - Weight in kg
#[derive(Serialize, ToSchema)]
pub struct UnitResponse {
    pub source: usize,
    pub name: String,
    #[schema(value_type = [f64; 3], example = json!([2.0, 70.0, 50.0]))]
    pub dims: (f64, f64, f64),
    pub weight: f64,
}

impl From<&ItemUnit> for UnitResponse {
    fn from(unit: &ItemUnit) -> Self {
        Self {
            source: unit.source(),
            name: unit.name().to_string(),
            dims: unit.dims(),
            weight: unit.weight(),
        }
    }
}

impl BundleResponse {
    fn from_bundle(bundle: &Bundle, config: &GroupingConfig) -> Self {
        Self {
            total_weight: bundle.total_weight(),
            exceeds_cap: bundle.exceeds(config.bundle_weight_cap),
            items: bundle.units().iter().map(UnitResponse::from).collect(),
        }
    }
}

impl BatchResponse {
    fn from_batch(id: usize, batch: &Batch, config: &GroupingConfig) -> Self {
        Self {
            id,
            total_weight: batch.total_weight(),
            exceeds_cap: batch.exceeds(config.batch_weight_cap),
            bundles: batch
                .bundles()
                .iter()
                .map(|bundle| BundleResponse::from_bundle(bundle, config))
                .collect(),
        }
    }
}

impl GroupResponse {
    /// Creates a GroupResponse from a GroupingResult.
    pub fn from_grouping_result(result: &GroupingResult, config: &GroupingConfig) -> Self {
        Self {
            batches: result
                .batches
                .iter()
                .enumerate()
                .map(|(i, batch)| BatchResponse::from_batch(i + 1, batch, config))
                .collect(),
            summary: result.summary.clone(),
        }
    }
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

/// Terminal event of a failed `/group_stream` run.
#[derive(Serialize)]
#[serde(tag = "type")]
enum StreamFailure {
    Error { code: String, message: String },
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn grouping_error_response(err: &GroupingError) -> Response {
    let error = match err {
        GroupingError::InvalidConfiguration(_) => "Invalid grouping configuration",
        GroupingError::OversizedUnit { .. } | GroupingError::OversizedBundle { .. } => {
            "Oversized entry rejected"
        }
        GroupingError::TooManyUnits { .. } => "Too many units",
    };
    error_response(StatusCode::UNPROCESSABLE_ENTITY, error, err.to_string())
}

fn parse_group_request(
    payload: Result<Json<GroupRequest>, JsonRejection>,
    base: GroupingConfig,
) -> Result<ValidatedGroupRequest, Response> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(err) => return Err(json_deserialize_error(err)),
    };

    match payload.into_validated(base) {
        Ok(validated) => Ok(validated),
        Err(GroupRequestValidationError::InvalidItem { index, err }) => Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Invalid input data",
            format!("Item {}: {}", index, err),
        )),
        Err(GroupRequestValidationError::InvalidConfiguration(err)) => Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Invalid grouping configuration",
            err.to_string(),
        )),
        Err(GroupRequestValidationError::TooManyUnits { units, limit }) => Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Too many units",
            format!(
                "Items expand to {} units, more than the limit of {}",
                units, limit
            ),
        )),
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_group, handle_group_stream),
    components(
        schemas(
            GroupRequest,
            ItemRequest,
            GroupResponse,
            BatchResponse,
            BundleResponse,
            UnitResponse,
            GroupingSummary,
            ErrorResponse
        )
    ),
    tags((name = "grouping", description = "Endpoints for bundle and batch grouping"))
)]
struct ApiDoc;

fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/group", post(handle_group))
        .route("/group_stream", post(handle_group_stream))
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server.
///
/// Blocks until the server is terminated.
pub async fn start_api_server(config: ApiConfig, grouping: GroupingSettings) {
    let app = router(ApiState { grouping });

    let addr = config.socket_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%addr, error = %err, "❌ Could not bind API server");
            return;
        }
    };

    info!(
        "🚀 Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        info!("💡 Local access: http://localhost:{}", config.port());
    }
    info!("📦 API endpoints: POST /group, POST /group_stream");
    info!("📑 Documentation: GET /docs, GET /docs/openapi.json");

    if let Err(err) = axum::serve(listener, app).await {
        error!(error = %err, "❌ API server terminated with an error");
    }
}

/// Handler for POST /group endpoint.
///
/// Groups the items into bundles and consolidates the bundles into batches.
#[utoipa::path(
    post,
    path = "/group",
    request_body = GroupRequest,
    responses(
        (status = 200, description = "Successfully grouped items", body = GroupResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request, configuration or rejected oversized entry",
            body = ErrorResponse
        )
    ),
    tag = "grouping"
)]
async fn handle_group(
    State(state): State<ApiState>,
    payload: Result<Json<GroupRequest>, JsonRejection>,
) -> Response {
    let request = match parse_group_request(payload, state.grouping.grouping_config()) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let ValidatedGroupRequest { items, config } = request;

    info!(items = items.len(), "📥 New group request");
    let result = match group_shipment(&items, &config) {
        Ok(result) => result,
        Err(err) => {
            warn!(code = err.code(), "{}", err);
            return grouping_error_response(&err);
        }
    };

    let summary = &result.summary;
    info!(
        bundles = summary.bundle_count,
        batches = summary.batch_count,
        total_weight = summary.total_weight,
        "📦 Grouping finished"
    );
    if summary.oversized_bundles > 0 || summary.oversized_batches > 0 {
        warn!(
            oversized_bundles = summary.oversized_bundles,
            oversized_batches = summary.oversized_batches,
            "Accepted entries above the weight cap"
        );
    }

    let response = GroupResponse::from_grouping_result(&result, &config);
    (StatusCode::OK, Json(response)).into_response()
}

/// Handler for POST /group_stream endpoint (SSE).
///
/// Streams grouping events in real-time as Server-Sent Events (text/event-stream).
/// A failed run ends with a single `Error` event.
#[utoipa::path(
    post,
    path = "/group_stream",
    request_body = GroupRequest,
    responses(
        (
            status = 200,
            description = "Streams grouping events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or configuration",
            body = ErrorResponse
        )
    ),
    tag = "grouping"
)]
async fn handle_group_stream(
    State(state): State<ApiState>,
    payload: Result<Json<GroupRequest>, JsonRejection>,
) -> Response {
    let request = match parse_group_request(payload, state.grouping.grouping_config()) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let ValidatedGroupRequest { items, config } = request;

    let (tx, rx) = mpsc::channel::<String>(32);

    tokio::task::spawn_blocking(move || {
        let outcome = group_shipment_with_progress(&items, &config, |evt| {
            if let Ok(json) = serde_json::to_string(evt) {
                // A closed receiver discards the remaining events.
                let _ = tx.blocking_send(json);
            }
        });

        if let Err(err) = outcome {
            warn!(code = err.code(), "{}", err);
            let failure = StreamFailure::Error {
                code: err.code().to_string(),
                message: err.to_string(),
            };
            if let Ok(json) = serde_json::to_string(&failure) {
                let _ = tx.blocking_send(json);
            }
        }
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}
