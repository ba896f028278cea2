use actix_cors::Cors;
use actix_web::http::StatusCode;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer, ResponseError, Result as ActixResult};
use geoauction_core::{
    AdId, Error, ErrorKind, NewAdvertisement, NewGeoZone, UserId, UserPreferenceEmbedding, Vector,
    ZoneId,
};
use geoauction_engine::{
    with_retry, AuctionEngine, AuctionRequest, AuctionResult, NoWinnerReason, RetryConfig,
};
use geoauction_storage::PooledStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

/// Per-request deadline override, in milliseconds
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout-ms";

/// Shared state of every handler
pub struct ApiState {
    pub engine: AuctionEngine<PooledStore>,
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

impl ApiState {
    pub fn new(engine: AuctionEngine<PooledStore>, retry: RetryConfig, request_timeout: Duration) -> Self {
        Self {
            engine,
            retry,
            request_timeout,
        }
    }

    #[inline]
    fn store(&self) -> &PooledStore {
        self.engine.store()
    }
}

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] Error);

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Deadline => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Invariant | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        HttpResponse::build(status).json(serde_json::json!({
            "error": self.0.to_string()
        }))
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Deserialize)]
struct AuctionBody {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    positive_keywords: String,
    #[serde(default)]
    negative_keywords: String,
    #[serde(default)]
    method: i64,
    requester_id: UserId,
    query_embedding: Option<Vec<f32>>,
}

impl From<AuctionBody> for AuctionRequest {
    fn from(body: AuctionBody) -> Self {
        let mut request = AuctionRequest::new(body.requester_id, body.latitude, body.longitude)
            .with_keywords(body.positive_keywords, body.negative_keywords)
            .with_method(body.method);
        if let Some(embedding) = body.query_embedding {
            request = request.with_query_embedding(Vector::new(embedding));
        }
        request
    }
}

#[derive(Serialize)]
struct AuctionResponse {
    ad_id: Option<u64>,
    runner_up_ad_id: Option<u64>,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<NoWinnerReason>,
}

impl From<AuctionResult> for AuctionResponse {
    fn from(result: AuctionResult) -> Self {
        match result {
            AuctionResult::Winner { ad_id, runner_up, .. } => Self {
                ad_id: Some(ad_id.0),
                runner_up_ad_id: runner_up.map(|id| id.0),
                outcome: "winner",
                reason: None,
            },
            AuctionResult::NoWinner(reason) => Self {
                ad_id: None,
                runner_up_ad_id: None,
                outcome: "no_winner",
                reason: Some(reason),
            },
        }
    }
}

#[derive(Deserialize)]
struct PreferenceBody {
    #[serde(default)]
    keywords: String,
    embedding: Vector,
}

pub struct RestApi;

impl RestApi {
    /// Register every route; shared by the server and tests
    pub fn configure(cfg: &mut web::ServiceConfig) {
        cfg.route("/ads_auction", web::get().to(run_auction))
            .route("/ads_auction", web::post().to(run_auction))
            .route("/ads", web::post().to(create_ad))
            .route("/ads/{id}", web::get().to(get_ad))
            .route("/ads/{id}", web::put().to(replace_ad))
            .route("/ads/{id}", web::delete().to(delete_ad))
            .route("/ads/{id}/zones", web::post().to(add_zone))
            .route("/ads/{id}/zones", web::get().to(list_zones))
            .route("/zones/{id}", web::delete().to(delete_zone))
            .route("/preferences/{user_id}", web::put().to(put_preference))
            .route("/preferences/{user_id}", web::get().to(get_preference))
            .route("/preferences/{user_id}", web::delete().to(delete_preference))
            .route("/healthz", web::get().to(health));
    }

    pub async fn start(state: Arc<ApiState>, port: u16) -> std::io::Result<()> {
        info!(port, "starting HTTP server");
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(cors)
                .app_data(web::Data::new(state.clone()))
                .app_data(web::JsonConfig::default().limit(1 << 20))
                .configure(RestApi::configure)
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await
    }
}

fn request_timeout(req: &HttpRequest, default: Duration) -> Duration {
    req.headers()
        .get(REQUEST_TIMEOUT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(default)
}

async fn run_auction(
    state: web::Data<Arc<ApiState>>,
    req: HttpRequest,
    body: web::Json<AuctionBody>,
) -> ApiResult<HttpResponse> {
    let request = AuctionRequest::from(body.into_inner());
    let deadline = Instant::now() + request_timeout(&req, state.request_timeout);

    let outcome = with_retry(&state.retry, || state.engine.resolve_until(&request, deadline)).await?;
    Ok(HttpResponse::Ok().json(AuctionResponse::from(outcome.result)))
}

async fn create_ad(
    state: web::Data<Arc<ApiState>>,
    body: web::Json<NewAdvertisement>,
) -> ApiResult<HttpResponse> {
    let id = state.store().catalog().create_advertisement(body.into_inner())?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "ad_id": id })))
}

async fn get_ad(
    state: web::Data<Arc<ApiState>>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let id = AdId(path.into_inner());
    let ad = state
        .store()
        .catalog()
        .get_advertisement(id)
        .ok_or(Error::AdvertisementNotFound(id))?;
    Ok(HttpResponse::Ok().json(ad))
}

async fn replace_ad(
    state: web::Data<Arc<ApiState>>,
    path: web::Path<u64>,
    body: web::Json<NewAdvertisement>,
) -> ApiResult<HttpResponse> {
    let ad = state
        .store()
        .catalog()
        .replace_advertisement(AdId(path.into_inner()), body.into_inner())?;
    Ok(HttpResponse::Ok().json(ad))
}

async fn delete_ad(
    state: web::Data<Arc<ApiState>>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let id = AdId(path.into_inner());
    if !state.store().catalog().delete_advertisement(id)? {
        return Err(Error::AdvertisementNotFound(id).into());
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "deleted": true })))
}

async fn add_zone(
    state: web::Data<Arc<ApiState>>,
    path: web::Path<u64>,
    body: web::Json<NewGeoZone>,
) -> ApiResult<HttpResponse> {
    let zone = state
        .store()
        .catalog()
        .add_zone(AdId(path.into_inner()), body.into_inner())?;
    Ok(HttpResponse::Created().json(zone))
}

async fn list_zones(
    state: web::Data<Arc<ApiState>>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let zones = state.store().catalog().zones_for(AdId(path.into_inner()))?;
    Ok(HttpResponse::Ok().json(zones))
}

async fn delete_zone(
    state: web::Data<Arc<ApiState>>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let id = ZoneId(path.into_inner());
    if !state.store().catalog().delete_zone(id) {
        return Err(Error::ZoneNotFound(id).into());
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "deleted": true })))
}

async fn put_preference(
    state: web::Data<Arc<ApiState>>,
    path: web::Path<String>,
    body: web::Json<PreferenceBody>,
) -> ApiResult<HttpResponse> {
    let body = body.into_inner();
    let preference = UserPreferenceEmbedding {
        user_id: UserId::new(path.into_inner()),
        keywords: body.keywords,
        embedding: body.embedding,
    };
    state.store().catalog().put_preference(preference.clone())?;
    Ok(HttpResponse::Ok().json(preference))
}

async fn get_preference(
    state: web::Data<Arc<ApiState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let user_id = UserId::new(path.into_inner());
    let preference = state
        .store()
        .catalog()
        .get_preference(&user_id)
        .ok_or_else(|| Error::PreferenceNotFound(user_id.to_string()))?;
    Ok(HttpResponse::Ok().json(preference))
}

async fn delete_preference(
    state: web::Data<Arc<ApiState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let user_id = UserId::new(path.into_inner());
    if !state.store().catalog().delete_preference(&user_id) {
        return Err(Error::PreferenceNotFound(user_id.to_string()).into());
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "deleted": true })))
}

async fn health(state: web::Data<Arc<ApiState>>) -> ActixResult<HttpResponse> {
    let store = state.store();
    let catalog = store.catalog();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "pool": store.pool_status(),
        "advertisements": catalog.ad_count(),
        "zones": catalog.zone_count(),
        "preferences": catalog.preference_count(),
    })))
}
