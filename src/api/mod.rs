use axum::{
    Router,
    extract::{Json, Query},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    AllocationPolicy, Asset, AssetWeightVector, CompoundingProjector, ContributionTiming,
    EngineError, ExpectedReturn, MAX_HORIZON_MONTHS, Projection, RiskTier, StaticReturns,
    TiltConfig, UNIVERSE, blend_expected_return,
};

const DEFAULT_AGE: u32 = 30;
const DEFAULT_RISK_TIER: &str = "balanced";
const DEFAULT_MONTHLY_CONTRIBUTION: f64 = 10_000.0;
const DEFAULT_HORIZON_MONTHS: u32 = 240;
const DEFAULT_PORT: u16 = 8080;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliContributionTiming {
    End,
    Begin,
}

impl From<CliContributionTiming> for ContributionTiming {
    fn from(value: CliContributionTiming) -> Self {
        match value {
            CliContributionTiming::End => ContributionTiming::EndOfPeriod,
            CliContributionTiming::Begin => ContributionTiming::BeginningOfPeriod,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiContributionTiming {
    #[serde(alias = "end", alias = "endOfPeriod", alias = "end_of_period")]
    EndOfPeriod,
    #[serde(
        alias = "begin",
        alias = "beginningOfPeriod",
        alias = "beginning_of_period"
    )]
    BeginningOfPeriod,
}

impl From<ApiContributionTiming> for CliContributionTiming {
    fn from(value: ApiContributionTiming) -> Self {
        match value {
            ApiContributionTiming::EndOfPeriod => CliContributionTiming::End,
            ApiContributionTiming::BeginningOfPeriod => CliContributionTiming::Begin,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ScenarioPayload {
    age: Option<u32>,
    risk_tier: Option<String>,
    monthly_contribution: Option<f64>,
    horizon_months: Option<u32>,
    horizon_years: Option<u32>,
    contribution_timing: Option<ApiContributionTiming>,
    expected_monthly_return: Option<f64>,
    asset_returns: Option<ApiAssetReturns>,
    tilt_pivot_age: Option<u32>,
    tilt_points_per_year: Option<f64>,
    equity_floor: Option<f64>,
    bond_cap: Option<f64>,
}

/// A JSON body carries a ticker map. A query string cannot, so it carries
/// `TICKER=PERCENT` pairs separated by commas instead.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiAssetReturns {
    Map(BTreeMap<String, f64>),
    Pairs(String),
}

impl ApiAssetReturns {
    fn into_pairs(self) -> Result<Vec<(String, f64)>, String> {
        match self {
            ApiAssetReturns::Map(map) => Ok(map.into_iter().collect()),
            ApiAssetReturns::Pairs(raw) => raw
                .split(',')
                .filter(|pair| !pair.trim().is_empty())
                .map(|pair| parse_asset_return(pair).map_err(|e| format!("assetReturns: {e}")))
                .collect(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "zenvest",
    about = "Risk-tier portfolio allocation and compounding contribution projections"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Allocate a risk tier and project monthly contributions, printing JSON
    Project(ProjectArgs),
    /// Serve the allocation and projection JSON API
    Serve {
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    #[arg(long, default_value_t = DEFAULT_AGE, help = "Investor age, 18 to 80")]
    age: u32,
    #[arg(
        long,
        default_value = DEFAULT_RISK_TIER,
        help = "conservative, moderate, balanced, growth or aggressive"
    )]
    risk_tier: String,
    #[arg(long, default_value_t = DEFAULT_MONTHLY_CONTRIBUTION)]
    monthly_contribution: f64,
    #[arg(long, default_value_t = DEFAULT_HORIZON_MONTHS)]
    horizon_months: u32,
    #[arg(
        long,
        value_enum,
        default_value_t = CliContributionTiming::End,
        help = "Add each contribution at the end or the beginning of the month"
    )]
    contribution_timing: CliContributionTiming,
    #[arg(
        long,
        allow_negative_numbers = true,
        help = "Blended expected monthly return in percent, e.g. 0.6; omit to use the fallback"
    )]
    expected_monthly_return: Option<f64>,
    #[arg(
        long = "asset-return",
        value_name = "TICKER=PERCENT",
        value_parser = parse_asset_return,
        allow_negative_numbers = true,
        help = "Historical mean monthly return per ticker in percent; repeatable"
    )]
    asset_returns: Vec<(String, f64)>,
    #[arg(long, default_value_t = 30, help = "Age after which the bond tilt starts")]
    tilt_pivot_age: u32,
    #[arg(
        long,
        default_value_t = 0.5,
        help = "Percentage points moved from equities to bonds per year past the pivot age"
    )]
    tilt_points_per_year: f64,
    #[arg(long, default_value_t = 10.0, help = "Minimum equity share in percent")]
    equity_floor: f64,
    #[arg(long, default_value_t = 80.0, help = "Maximum bond share in percent")]
    bond_cap: f64,
}

#[derive(Debug)]
enum ReturnInput {
    Blended(f64),
    PerAsset(StaticReturns),
    Unavailable,
}

#[derive(Debug)]
struct ScenarioRequest {
    tier: RiskTier,
    age: u32,
    monthly_contribution: f64,
    horizon_months: u32,
    timing: ContributionTiming,
    tilt: TiltConfig,
    returns: ReturnInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AllocateResponse {
    risk_tier: RiskTier,
    age: u32,
    equity_share: f64,
    bond_share: f64,
    weights: AssetWeightVector,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResponse {
    risk_tier: RiskTier,
    age: u32,
    #[serde(flatten)]
    projection: Projection,
}

#[derive(Debug, Serialize)]
struct TierProfile {
    tier: RiskTier,
    description: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UniverseResponse {
    assets: Vec<Asset>,
    tiers: Vec<TierProfile>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn parse_asset_return(raw: &str) -> Result<(String, f64), String> {
    let (ticker, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TICKER=PERCENT, got '{raw}'"))?;
    let ticker = ticker.trim();
    if ticker.is_empty() {
        return Err(format!("missing ticker in '{raw}'"));
    }
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid return for {ticker}: {e}"))?;
    Ok((ticker.to_string(), value))
}

fn build_request(args: ProjectArgs) -> Result<ScenarioRequest, String> {
    let tier = args
        .risk_tier
        .parse::<RiskTier>()
        .map_err(|e| format!("--risk-tier: {e}"))?;

    if !(1..=MAX_HORIZON_MONTHS).contains(&args.horizon_months) {
        return Err(format!(
            "--horizon-months must be between 1 and {MAX_HORIZON_MONTHS}, got {}",
            args.horizon_months
        ));
    }

    if args.expected_monthly_return.is_some() && !args.asset_returns.is_empty() {
        return Err(
            "--expected-monthly-return and --asset-return cannot be combined".to_string(),
        );
    }

    for (ticker, value) in &args.asset_returns {
        if !value.is_finite() {
            return Err(format!("--asset-return for {ticker} must be finite"));
        }
    }

    for (name, value) in [
        ("--tilt-points-per-year", args.tilt_points_per_year),
        ("--equity-floor", args.equity_floor),
        ("--bond-cap", args.bond_cap),
    ] {
        if !value.is_finite() {
            return Err(format!("{name} must be finite"));
        }
    }

    let returns = match args.expected_monthly_return {
        Some(percent) => ReturnInput::Blended(percent / 100.0),
        None if args.asset_returns.is_empty() => ReturnInput::Unavailable,
        None => ReturnInput::PerAsset(
            args.asset_returns
                .into_iter()
                .map(|(ticker, percent)| (ticker, percent / 100.0))
                .collect(),
        ),
    };

    Ok(ScenarioRequest {
        tier,
        age: args.age,
        monthly_contribution: args.monthly_contribution,
        horizon_months: args.horizon_months,
        timing: args.contribution_timing.into(),
        tilt: TiltConfig {
            pivot_age: args.tilt_pivot_age,
            points_per_year: args.tilt_points_per_year,
            equity_floor: args.equity_floor / 100.0,
            bond_cap: args.bond_cap / 100.0,
        },
        returns,
    })
}

fn run_allocation(request: &ScenarioRequest) -> Result<AllocateResponse, EngineError> {
    let policy = AllocationPolicy::new(request.tilt)?;
    let weights = policy.allocate(request.tier, request.age)?;
    Ok(AllocateResponse {
        risk_tier: request.tier,
        age: request.age,
        equity_share: weights.equity_share(),
        bond_share: weights.bond_share(),
        weights,
    })
}

fn run_projection(request: &ScenarioRequest) -> Result<ProjectResponse, EngineError> {
    let policy = AllocationPolicy::new(request.tilt)?;
    let weights = policy.allocate(request.tier, request.age)?;
    let expected = match &request.returns {
        ReturnInput::Blended(monthly) => ExpectedReturn::Provided(*monthly),
        ReturnInput::PerAsset(source) => blend_expected_return(&weights, source),
        ReturnInput::Unavailable => ExpectedReturn::Unavailable,
    };
    let projection = CompoundingProjector::new(request.timing).project(
        &weights,
        &expected,
        request.monthly_contribution,
        request.horizon_months,
    )?;

    Ok(ProjectResponse {
        risk_tier: request.tier,
        age: request.age,
        projection,
    })
}

pub fn run_cli_projection(args: ProjectArgs) -> Result<String, String> {
    let request = build_request(args)?;
    let response = run_projection(&request).map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&response).map_err(|e| format!("failed to serialize: {e}"))
}

pub fn router() -> Router {
    Router::new()
        .route("/api/universe", get(universe_handler))
        .route(
            "/api/allocate",
            get(allocate_get_handler).post(allocate_post_handler),
        )
        .route(
            "/api/project",
            get(project_get_handler).post(project_post_handler),
        )
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "zenvest HTTP API listening");
    info!("local access: http://127.0.0.1:{port}/api/project");

    axum::serve(listener, router()).await
}

async fn universe_handler() -> Response {
    json_response(
        StatusCode::OK,
        UniverseResponse {
            assets: UNIVERSE.to_vec(),
            tiers: RiskTier::ALL
                .into_iter()
                .map(|tier| TierProfile {
                    tier,
                    description: tier.description(),
                })
                .collect(),
        },
    )
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn allocate_get_handler(Query(payload): Query<ScenarioPayload>) -> Response {
    allocate_handler_impl(payload).await
}

async fn allocate_post_handler(Json(payload): Json<ScenarioPayload>) -> Response {
    allocate_handler_impl(payload).await
}

async fn project_get_handler(Query(payload): Query<ScenarioPayload>) -> Response {
    project_handler_impl(payload).await
}

async fn project_post_handler(Json(payload): Json<ScenarioPayload>) -> Response {
    project_handler_impl(payload).await
}

async fn allocate_handler_impl(payload: ScenarioPayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return reject(&msg),
    };

    match run_allocation(&request) {
        Ok(response) => {
            info!(tier = %request.tier, age = request.age, "allocation served");
            json_response(StatusCode::OK, response)
        }
        Err(e) => reject(&e.to_string()),
    }
}

async fn project_handler_impl(payload: ScenarioPayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return reject(&msg),
    };

    match run_projection(&request) {
        Ok(response) => {
            info!(
                tier = %request.tier,
                age = request.age,
                horizon_months = request.horizon_months,
                fallback_used = response.projection.fallback_used,
                "projection served"
            );
            json_response(StatusCode::OK, response)
        }
        Err(e) => reject(&e.to_string()),
    }
}

fn reject(msg: &str) -> Response {
    warn!(error = msg, "rejected scenario request");
    error_response(StatusCode::BAD_REQUEST, msg)
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
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
fn api_request_from_json(json: &str) -> Result<ScenarioRequest, String> {
    let payload = serde_json::from_str::<ScenarioPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: ScenarioPayload) -> Result<ScenarioRequest, String> {
    let mut args = default_args_for_api();

    if let Some(v) = payload.age {
        args.age = v;
    }
    if let Some(v) = payload.risk_tier {
        args.risk_tier = v;
    }
    if let Some(v) = payload.monthly_contribution {
        args.monthly_contribution = v;
    }

    match (payload.horizon_months, payload.horizon_years) {
        (Some(_), Some(_)) => {
            return Err("horizonMonths and horizonYears cannot be combined".to_string());
        }
        (Some(months), None) => args.horizon_months = months,
        (None, Some(years)) => {
            let max_years = MAX_HORIZON_MONTHS / 12;
            if years > max_years {
                return Err(format!("horizonYears must be at most {max_years}, got {years}"));
            }
            args.horizon_months = years * 12;
        }
        (None, None) => {}
    }

    if let Some(v) = payload.contribution_timing {
        args.contribution_timing = v.into();
    }
    if let Some(v) = payload.expected_monthly_return {
        args.expected_monthly_return = Some(v);
    }
    if let Some(v) = payload.asset_returns {
        args.asset_returns = v.into_pairs()?;
    }

    if let Some(v) = payload.tilt_pivot_age {
        args.tilt_pivot_age = v;
    }
    if let Some(v) = payload.tilt_points_per_year {
        args.tilt_points_per_year = v;
    }
    if let Some(v) = payload.equity_floor {
        args.equity_floor = v;
    }
    if let Some(v) = payload.bond_cap {
        args.bond_cap = v;
    }

    build_request(args)
}

fn default_args_for_api() -> ProjectArgs {
    let tilt = TiltConfig::default();
    ProjectArgs {
        age: DEFAULT_AGE,
        risk_tier: DEFAULT_RISK_TIER.to_string(),
        monthly_contribution: DEFAULT_MONTHLY_CONTRIBUTION,
        horizon_months: DEFAULT_HORIZON_MONTHS,
        contribution_timing: CliContributionTiming::End,
        expected_monthly_return: None,
        asset_returns: Vec::new(),
        tilt_pivot_age: tilt.pivot_age,
        tilt_points_per_year: tilt.points_per_year,
        equity_floor: tilt.equity_floor * 100.0,
        bond_cap: tilt.bond_cap * 100.0,
    }
}
