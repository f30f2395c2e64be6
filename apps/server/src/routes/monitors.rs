use actix_web::{HttpResponse, delete, get, post, put, web};
use serde::Deserialize;
use vigil_service::database::models::{MonitorUpdate, NewMonitor};
use vigil_service::service::VigilService;

use super::ProjectQuery;
use crate::error::ApiError;

macros_utils::routes! {
    route list_monitors,
    route create_monitor,
    route get_monitor,
    route update_monitor,
    route delete_monitor,
    route check_monitor,
    route monitor_metrics,
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    100
}

#[get("")]
pub async fn list_monitors(
    service: web::Data<VigilService>,
    query: web::Query<ProjectQuery>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.list_monitors(query.project_id).await?))
}

#[post("")]
pub async fn create_monitor(
    service: web::Data<VigilService>,
    body: web::Json<NewMonitor>,
) -> Result<HttpResponse, ApiError> {
    let monitor = service.create_monitor(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(monitor))
}

#[get("/{id}")]
pub async fn get_monitor(
    service: web::Data<VigilService>,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.get_monitor(*id).await?))
}

#[put("/{id}")]
pub async fn update_monitor(
    service: web::Data<VigilService>,
    id: web::Path<i64>,
    body: web::Json<MonitorUpdate>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.update_monitor(*id, body.into_inner()).await?))
}

#[delete("/{id}")]
pub async fn delete_monitor(
    service: web::Data<VigilService>,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    service.delete_monitor(*id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Monitor deleted" })))
}

/// Probe now, outside the schedule
#[post("/{id}/check")]
pub async fn check_monitor(
    service: web::Data<VigilService>,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.check_monitor(*id).await?))
}

#[get("/{id}/metrics")]
pub async fn monitor_metrics(
    service: web::Data<VigilService>,
    id: web::Path<i64>,
    query: web::Query<MetricsQuery>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.probe_history(*id, query.limit).await?))
}
