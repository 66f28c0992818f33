//! # API REST
//!
//! REST API implementation for rxcheck.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON bodies, status codes, CORS, API key on admin endpoints)
//!
//! Uses `api-shared` for wire types and `rxcheck-core` for every computation.

#![warn(rust_2018_idioms)]

use api_shared::{
    auth::validate_api_key, AgeBand, AlternativeDrug, AlternativeReason, AlternativeSuggestion,
    AlternativesSection, AnalysisReport, CheckInteractionsReq, CheckInteractionsRes,
    ComprehensiveAnalysisReq, Diagnostic, DiagnosticCode, DosageSection, DosageWarning,
    DosageWarningKind, DrugIdentity, DrugInput, DrugMention, ErrorRes, ExtractDrugsReq,
    ExtractDrugsRes, FindingKind, FindingsSection, HealthRes, HealthService, InteractionFinding,
    MatchKind, PatientProfile, ReferenceInfoRes, ResolveRes, ResolvedDrug, SectionStatus,
    UnresolvedMention,
};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use rxcheck_core::{
    fuzzy_max_distance_from_env_value, max_drugs_from_env_value, resolve_reference_dir,
    CoreConfig, DrugSafetyService, EngineError, EngineResult,
};
use serde::Deserialize;
use std::path::PathBuf;
use tower_http::cors::CorsLayer;
use utoipa::{IntoParams, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

/// Header carrying the admin API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Default listen address, matching the presentation layer's base URL.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:5000";

type ApiError = (StatusCode, Json<ErrorRes>);

/// Application state shared across REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: DrugSafetyService,
    /// When set, `POST /api/reference/reload` requires this key in `x-api-key`.
    pub api_key: Option<String>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        extract_drugs,
        check_interactions,
        comprehensive_analysis,
        resolve_drug,
        reference_info,
        reload_reference,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        ExtractDrugsReq,
        ExtractDrugsRes,
        CheckInteractionsReq,
        CheckInteractionsRes,
        ComprehensiveAnalysisReq,
        AnalysisReport,
        ResolveRes,
        DrugIdentity,
        ReferenceInfoRes,
        DrugMention,
        DrugInput,
        ResolvedDrug,
        UnresolvedMention,
        MatchKind,
        PatientProfile,
        InteractionFinding,
        FindingKind,
        FindingsSection,
        DosageSection,
        DosageWarning,
        DosageWarningKind,
        AgeBand,
        AlternativesSection,
        AlternativeSuggestion,
        AlternativeDrug,
        AlternativeReason,
        SectionStatus,
        Diagnostic,
        DiagnosticCode,
        rx_types::DrugId,
        rx_types::Route,
        rx_types::Severity,
    ))
)]
pub struct ApiDoc;

/// Build `CoreConfig` from `RXCHECK_*` environment variables.
///
/// Called once at startup; request handling never reads the environment.
///
/// # Errors
///
/// Returns an `EngineError` if the reference directory cannot be found or a numeric setting is
/// invalid.
pub fn core_config_from_env() -> EngineResult<CoreConfig> {
    let reference_dir = resolve_reference_dir(
        std::env::var("RXCHECK_REFERENCE_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from),
    )?;
    let fuzzy =
        fuzzy_max_distance_from_env_value(std::env::var("RXCHECK_FUZZY_MAX_DISTANCE").ok())?;
    let max_drugs = max_drugs_from_env_value(std::env::var("RXCHECK_MAX_DRUGS").ok())?;
    CoreConfig::new(reference_dir, fuzzy, max_drugs)
}

/// `RXCHECK_API_KEY`, if set and non-blank.
pub fn api_key_from_env() -> Option<String> {
    std::env::var("RXCHECK_API_KEY")
        .ok()
        .map(|k| k.trim().to_owned())
        .filter(|k| !k.is_empty())
}

/// The full REST router with OpenAPI docs and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/extract-drugs", post(extract_drugs))
        .route("/api/check-interactions", post(check_interactions))
        .route("/api/comprehensive-analysis", post(comprehensive_analysis))
        .route("/api/resolve", get(resolve_drug))
        .route("/api/reference", get(reference_info))
        .route("/api/reference/reload", post(reload_reference))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error(status: StatusCode, code: DiagnosticCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorRes {
            code,
            message: message.into(),
        }),
    )
}

fn engine_error(e: EngineError) -> ApiError {
    let status = match e {
        EngineError::InvalidProfile(_) | EngineError::InvalidInput(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => {
            tracing::error!("request failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error(status, e.code(), e.to_string())
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(req)| req)
        .map_err(|rejection| {
            error(
                rejection.status(),
                DiagnosticCode::InvalidInput,
                rejection.body_text(),
            )
        })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers.
async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/api/extract-drugs",
    request_body = ExtractDrugsReq,
    responses(
        (status = 200, description = "Mentions found in the text", body = ExtractDrugsRes),
        (status = 400, description = "Body is not valid JSON", body = ErrorRes)
    )
)]
/// Extract drug mentions from clinical free text.
///
/// Always succeeds for a well-formed body; unrecognised drugs come back with `UNKNOWN_DRUG`
/// diagnostics.
async fn extract_drugs(
    State(state): State<AppState>,
    payload: Result<Json<ExtractDrugsReq>, JsonRejection>,
) -> Result<Json<ExtractDrugsRes>, ApiError> {
    let req = body(payload)?;
    Ok(Json(state.service.extract_drugs(&req.text)))
}

#[utoipa::path(
    post,
    path = "/api/check-interactions",
    request_body = CheckInteractionsReq,
    responses(
        (status = 200, description = "Interaction findings", body = CheckInteractionsRes),
        (status = 422, description = "Invalid patient profile", body = ErrorRes)
    )
)]
/// Check drug-drug and, when a profile is given, drug-patient interactions.
///
/// # Errors
/// Returns `422 Unprocessable Entity` with `INVALID_PROFILE` if the patient profile is invalid.
async fn check_interactions(
    State(state): State<AppState>,
    payload: Result<Json<CheckInteractionsReq>, JsonRejection>,
) -> Result<Json<CheckInteractionsRes>, ApiError> {
    let req = body(payload)?;
    state
        .service
        .check_interactions(&req)
        .map(Json)
        .map_err(engine_error)
}

#[utoipa::path(
    post,
    path = "/api/comprehensive-analysis",
    request_body = ComprehensiveAnalysisReq,
    responses(
        (status = 200, description = "Analysis report", body = AnalysisReport),
        (status = 422, description = "Invalid patient profile", body = ErrorRes)
    )
)]
/// Full analysis: findings, dosage warnings and alternatives.
///
/// # Errors
/// Returns `422 Unprocessable Entity` with `INVALID_PROFILE` if the patient profile is invalid.
async fn comprehensive_analysis(
    State(state): State<AppState>,
    payload: Result<Json<ComprehensiveAnalysisReq>, JsonRejection>,
) -> Result<Json<AnalysisReport>, ApiError> {
    let req = body(payload)?;
    state
        .service
        .comprehensive_analysis(&req)
        .map(Json)
        .map_err(engine_error)
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
struct ResolveQuery {
    /// Drug name as written.
    name: String,
}

#[utoipa::path(
    get,
    path = "/api/resolve",
    params(ResolveQuery),
    responses(
        (status = 200, description = "Catalog identity, if any", body = ResolveRes)
    )
)]
async fn resolve_drug(
    State(state): State<AppState>,
    Query(query): Query<ResolveQuery>,
) -> Json<ResolveRes> {
    Json(state.service.resolve(&query.name))
}

#[utoipa::path(
    get,
    path = "/api/reference",
    responses(
        (status = 200, description = "Reference snapshot in use", body = ReferenceInfoRes)
    )
)]
async fn reference_info(State(state): State<AppState>) -> Json<ReferenceInfoRes> {
    Json(state.service.reference_info())
}

#[utoipa::path(
    post,
    path = "/api/reference/reload",
    responses(
        (status = 200, description = "New snapshot published", body = ReferenceInfoRes),
        (status = 401, description = "Missing or invalid API key", body = ErrorRes),
        (status = 500, description = "Reload failed; previous snapshot kept", body = ErrorRes)
    )
)]
/// Re-read the reference directory and swap in a new snapshot.
///
/// # Errors
/// - `401 Unauthorized` if an API key is configured and the request does not carry it.
/// - `500 Internal Server Error` with `REFERENCE_LOAD` (or `AMBIGUOUS_RULE`) if the new data
///   fails to load. The previous snapshot keeps serving requests.
async fn reload_reference(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ReferenceInfoRes>, ApiError> {
    if let Some(expected) = &state.api_key {
        let provided = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
        validate_api_key(provided, expected).map_err(|e| {
            error(
                StatusCode::UNAUTHORIZED,
                DiagnosticCode::Unauthorized,
                e.to_string(),
            )
        })?;
    }

    let service = state.service.clone();
    let reloaded = tokio::task::spawn_blocking(move || service.reload_reference())
        .await
        .map_err(|e| {
            tracing::error!("reload task failed: {e}");
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                DiagnosticCode::ReferenceLoad,
                "reload task failed",
            )
        })?;

    reloaded.map(Json).map_err(engine_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use rxcheck_core::ReferenceStore;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn bundled_reference_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../core/reference")
    }

    fn copy_reference(to: &Path) {
        for name in ["catalog.yaml", "interactions.yaml", "dosing.yaml"] {
            std::fs::copy(bundled_reference_dir().join(name), to.join(name)).unwrap();
        }
    }

    fn app_for(dir: &Path, api_key: Option<&str>) -> Router {
        let cfg = Arc::new(CoreConfig::with_reference_dir(dir.to_path_buf()));
        let store = Arc::new(ReferenceStore::open(dir.to_path_buf()).unwrap());
        router(AppState {
            service: DrugSafetyService::with_store(cfg, store),
            api_key: api_key.map(Into::into),
        })
    }

    fn app() -> Router {
        app_for(&bundled_reference_dir(), None)
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, json) = send(app(), Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], true);
    }

    #[tokio::test]
    async fn extract_drugs_returns_mentions() {
        let (status, json) = send(
            app(),
            post_json(
                "/api/extract-drugs",
                serde_json::json!({"text": "Aspirin 325mg twice daily and Warfarin 5mg once daily"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let drugs = json["drugs"].as_array().unwrap();
        assert_eq!(drugs.len(), 2);
        assert_eq!(drugs[0]["name"], "Aspirin");
        assert_eq!(drugs[0]["dosage"], "325mg");
        assert_eq!(drugs[1]["frequency"], "once daily");
        assert_eq!(drugs[1]["route"], "oral");
    }

    #[tokio::test]
    async fn check_interactions_accepts_ui_payload() {
        let (status, json) = send(
            app(),
            post_json(
                "/api/check-interactions",
                serde_json::json!({
                    "drugs": [
                        {"name": "Aspirin", "dosage": "325mg", "frequency": "", "route": "oral"},
                        {"name": "Warfarin", "dosage": "5mg", "frequency": "once daily", "route": "oral"}
                    ]
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let interactions = json["interactions"].as_array().unwrap();
        assert_eq!(interactions.len(), 1);
        assert_eq!(interactions[0]["severity"], "high");
        assert_eq!(interactions[0]["kind"], "drug_drug");
    }

    #[tokio::test]
    async fn invalid_profile_is_422() {
        let (status, json) = send(
            app(),
            post_json(
                "/api/comprehensive-analysis",
                serde_json::json!({
                    "drugs": [{"name": "Aspirin", "dosage": "325mg"}],
                    "patient": {"age": -1, "weight": 70, "conditions": [], "allergies": []}
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["code"], "INVALID_PROFILE");
    }

    #[tokio::test]
    async fn comprehensive_analysis_returns_sections() {
        let (status, json) = send(
            app(),
            post_json(
                "/api/comprehensive-analysis",
                serde_json::json!({
                    "drugs": [
                        {"name": "Aspirin", "dosage": "325mg", "frequency": "twice daily"},
                        {"name": "Warfarin", "dosage": "5mg", "frequency": "once daily"}
                    ],
                    "patient": {"age": 70, "weight": 65, "conditions": ["Peptic ulcer"], "allergies": []}
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["findings"]["status"], "ok");
        assert_eq!(json["dosage_warnings"]["status"], "ok");
        assert_eq!(json["findings"]["items"][0]["severity"], "high");
        assert!(json["alternatives"]["items"].as_array().unwrap().len() >= 1);
        assert_eq!(json["reference_version"], 1);
    }

    #[tokio::test]
    async fn malformed_body_is_reported_as_invalid_input() {
        let req = Request::post("/api/check-interactions")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, json) = send(app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "INVALID_INPUT");
    }

    #[tokio::test]
    async fn resolve_uses_query_string() {
        let (status, json) = send(
            app(),
            Request::get("/api/resolve?name=Coumadin").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["identity"]["drug_id"], "warfarin");
        assert_eq!(json["identity"]["match_kind"], "synonym");
    }

    #[tokio::test]
    async fn reload_requires_configured_key() {
        let temp = TempDir::new().unwrap();
        copy_reference(temp.path());
        let app = app_for(temp.path(), Some("s3cret"));

        let (status, json) = send(
            app.clone(),
            Request::post("/api/reference/reload").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["code"], "UNAUTHORIZED");

        let (status, json) = send(
            app.clone(),
            Request::post("/api/reference/reload")
                .header(API_KEY_HEADER, "s3cret")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["version"], 2);
    }

    #[tokio::test]
    async fn failed_reload_is_500_and_keeps_snapshot() {
        let temp = TempDir::new().unwrap();
        copy_reference(temp.path());
        let app = app_for(temp.path(), None);

        std::fs::write(temp.path().join("catalog.yaml"), "drugs: [not a drug]\n").unwrap();
        let (status, json) = send(
            app.clone(),
            Request::post("/api/reference/reload").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["code"], "REFERENCE_LOAD");

        let (_, json) = send(app, Request::get("/api/reference").body(Body::empty()).unwrap()).await;
        assert_eq!(json["version"], 1);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let (status, json) = send(
            app(),
            Request::get("/api-docs/openapi.json").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["paths"]["/api/comprehensive-analysis"].is_object());
    }
}
