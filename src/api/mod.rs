mod cli;

use axum::{
    Router,
    extract::{Json, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::core::{CalculationRequest, EngineConfig, EngineError, Horizon, PortfolioCalculator};

pub use cli::{CalculateArgs, Cli, Command, EngineArgs, ServeArgs, run_calculate};

const INDEX_HTML: &str = include_str!("../../web/index.html");
const STYLES_CSS: &str = include_str!("../../web/styles.css");
const APP_JS: &str = include_str!("../../web/app.js");

const MAX_SIMULATIONS_PER_REQUEST: u32 = 100_000;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CalculatePayload {
    #[serde(alias = "risk_profile")]
    risk_profile: Option<String>,
    amount: Option<f64>,
    /// Horizon in whole years.
    term: Option<u32>,
    #[serde(alias = "term_months")]
    term_months: Option<u32>,
    #[serde(alias = "monthly_contribution")]
    monthly_contribution: Option<f64>,
    #[serde(alias = "selected_funds")]
    selected_funds: Option<Vec<String>>,
    #[serde(alias = "targetDreamAmount", alias = "target_dream_amount")]
    dream_amount: Option<f64>,
    #[serde(alias = "targetPassiveIncome", alias = "target_passive_income")]
    passive_income: Option<f64>,
    seed: Option<u64>,
    simulations: Option<u32>,
}

#[derive(Debug)]
struct ApiRequest {
    request: CalculationRequest,
    config: EngineConfig,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Clone)]
struct AppState {
    calculator: PortfolioCalculator,
}

pub async fn run_http_server(port: u16, calculator: PortfolioCalculator) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = build_router(calculator);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "portfolio forecast API listening");
    info!("local access: http://127.0.0.1:{port}/");

    axum::serve(listener, app).await
}

fn build_router(calculator: PortfolioCalculator) -> Router {
    let api = Router::new()
        .route("/calculate", post(calculate_handler))
        .route("/funds", get(funds_handler))
        .route("/strategies", get(strategies_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    Router::new()
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/styles.css", get(styles_handler))
        .route("/app.js", get(app_js_handler))
        .nest("/api", api)
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { calculator })
}

async fn index_handler() -> impl IntoResponse {
    with_cache_control(Html(INDEX_HTML))
}

async fn styles_handler() -> impl IntoResponse {
    with_cache_control((
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        STYLES_CSS,
    ))
}

async fn app_js_handler() -> impl IntoResponse {
    with_cache_control((
        [(
            header::CONTENT_TYPE,
            "application/javascript; charset=utf-8",
        )],
        APP_JS,
    ))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn funds_handler(State(state): State<AppState>) -> Response {
    json_response(StatusCode::OK, state.calculator.catalog().assets())
}

async fn strategies_handler(State(state): State<AppState>) -> Response {
    json_response(StatusCode::OK, state.calculator.catalog().strategies())
}

async fn calculate_handler(
    State(state): State<AppState>,
    payload: Result<Json<CalculatePayload>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Invalid API JSON payload: {}", rejection.body_text()),
            );
        }
    };
    let ApiRequest { request, config } =
        match api_request_from_payload(payload, state.calculator.config()) {
            Ok(request) => request,
            Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
        };

    let calculator = state.calculator.clone();
    let outcome =
        tokio::task::spawn_blocking(move || calculator.calculate_with(&request, &config)).await;

    match outcome {
        Ok(Ok(result)) => json_response(StatusCode::OK, result),
        Ok(Err(err)) => {
            warn!(error = %err, "calculation rejected");
            error_response(status_for(&err), &err.to_string())
        }
        Err(err) => {
            error!(error = %err, "calculation task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        EngineError::UnknownStrategy(_) | EngineError::EmptyPortfolio => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    }
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str, defaults: &EngineConfig) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<CalculatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload, defaults)
}

fn api_request_from_payload(
    payload: CalculatePayload,
    defaults: &EngineConfig,
) -> Result<ApiRequest, String> {
    let risk_profile = payload
        .risk_profile
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| "riskProfile is required".to_string())?;
    let amount = payload
        .amount
        .ok_or_else(|| "amount is required".to_string())?;
    let horizon = match (payload.term_months, payload.term) {
        (Some(months), _) => Horizon::Months(months),
        (None, Some(years)) => Horizon::Years(years),
        (None, None) => return Err("termMonths or term is required".to_string()),
    };

    let mut config = defaults.clone();
    if let Some(seed) = payload.seed {
        config.seed = Some(seed);
    }
    if let Some(simulations) = payload.simulations {
        if simulations == 0 || simulations > MAX_SIMULATIONS_PER_REQUEST {
            return Err(format!(
                "simulations must be between 1 and {MAX_SIMULATIONS_PER_REQUEST}"
            ));
        }
        config.simulations = simulations;
    }

    Ok(ApiRequest {
        request: CalculationRequest {
            risk_profile: risk_profile.trim().to_string(),
            amount,
            horizon,
            monthly_contribution: payload.monthly_contribution.unwrap_or(0.0),
            selected_funds: payload.selected_funds,
            target_dream_amount: payload.dream_amount,
            target_passive_income: payload.passive_income,
        },
        config,
    })
}
