use actix_web::{HttpResponse, get, web};
use chrono::Duration;
use serde::Deserialize;
use vigil_service::service::VigilService;

use super::window_from_hours;
use crate::error::ApiError;

macros_utils::routes! {
    route sla_report,
    route monitor_uptime,
    route response_times,
    route mtta,
    route mttr,
    route health_score,
}

#[derive(Debug, Deserialize)]
pub struct HoursQuery {
    /// Trailing period in hours, configured default when absent
    hours: Option<i64>,
}

impl HoursQuery {
    fn window(&self) -> Result<Option<Duration>, ApiError> {
        window_from_hours(self.hours)
    }
}

#[get("/report")]
pub async fn sla_report(
    service: web::Data<VigilService>,
    query: web::Query<HoursQuery>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.sla_report(None, query.window()?).await?))
}

#[get("/monitors/{id}/uptime")]
pub async fn monitor_uptime(
    service: web::Data<VigilService>,
    id: web::Path<i64>,
    query: web::Query<HoursQuery>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.monitor_uptime(*id, query.window()?).await?))
}

#[get("/monitors/{id}/response-times")]
pub async fn response_times(
    service: web::Data<VigilService>,
    id: web::Path<i64>,
    query: web::Query<HoursQuery>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.response_times(*id, query.window()?).await?))
}

#[get("/incidents/mtta")]
pub async fn mtta(
    service: web::Data<VigilService>,
    query: web::Query<HoursQuery>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.mtta(query.window()?).await?))
}

#[get("/incidents/mttr")]
pub async fn mttr(
    service: web::Data<VigilService>,
    query: web::Query<HoursQuery>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.mttr(query.window()?).await?))
}

#[get("/health-score")]
pub async fn health_score(service: web::Data<VigilService>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.health_score().await?))
}
