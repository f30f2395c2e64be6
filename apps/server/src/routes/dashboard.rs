use actix_web::{HttpResponse, get, web};
use chrono::Duration;
use serde::Deserialize;
use vigil_service::service::VigilService;

use super::window_from_hours;
use crate::error::ApiError;

macros_utils::routes! {
    route dashboard,
    route task_stats,
    route monitoring_stats,
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    project_id: Option<i64>,
    /// Trailing window in hours, configured default when absent
    window_hours: Option<i64>,
}

impl WindowQuery {
    fn window(&self) -> Result<Option<Duration>, ApiError> {
        window_from_hours(self.window_hours)
    }
}

#[get("")]
pub async fn dashboard(
    service: web::Data<VigilService>,
    query: web::Query<WindowQuery>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.dashboard(query.project_id, query.window()?).await?))
}

#[get("/tasks")]
pub async fn task_stats(
    service: web::Data<VigilService>,
    query: web::Query<WindowQuery>,
) -> Result<HttpResponse, ApiError> {
    let rollup = service.dashboard(query.project_id, query.window()?).await?;
    Ok(HttpResponse::Ok().json(rollup.tasks))
}

#[get("/monitoring")]
pub async fn monitoring_stats(
    service: web::Data<VigilService>,
    query: web::Query<WindowQuery>,
) -> Result<HttpResponse, ApiError> {
    let rollup = service.monitoring_rollup(query.project_id, query.window()?).await?;
    Ok(HttpResponse::Ok().json(rollup))
}
