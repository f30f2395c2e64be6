use actix_web::{HttpResponse, get, web};
use serde::Deserialize;
use vigil_service::database::models::AuditFilter;
use vigil_service::service::VigilService;

use super::window_from_hours;
use crate::error::ApiError;

macros_utils::routes! {
    route list_audit_logs,
    route audit_stats,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    window_hours: Option<i64>,
}

#[get("")]
pub async fn list_audit_logs(
    service: web::Data<VigilService>,
    query: web::Query<AuditFilter>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.audit_log(query.into_inner()).await?))
}

#[get("/stats")]
pub async fn audit_stats(
    service: web::Data<VigilService>,
    query: web::Query<StatsQuery>,
) -> Result<HttpResponse, ApiError> {
    let window = window_from_hours(query.window_hours)?;
    Ok(HttpResponse::Ok().json(service.audit_stats(window).await?))
}
