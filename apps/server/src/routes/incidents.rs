use actix_web::{HttpResponse, get, post, web};
use serde::Deserialize;
use vigil_service::database::models::{IncidentFilter, NewIncident};
use vigil_service::incidents::IncidentStatus;
use vigil_service::service::VigilService;

use super::ProjectQuery;
use crate::error::ApiError;

// `/open` goes before `/{id}` so it isn't taken for an id.
macros_utils::routes! {
    route list_incidents,
    route list_open_incidents,
    route create_incident,
    route get_incident,
    route acknowledge_incident,
    route resolve_incident,
}

#[derive(Debug, Deserialize)]
pub struct IncidentQuery {
    status: Option<IncidentStatus>,
    project_id: Option<i64>,
}

#[get("")]
pub async fn list_incidents(
    service: web::Data<VigilService>,
    query: web::Query<IncidentQuery>,
) -> Result<HttpResponse, ApiError> {
    let filter = IncidentFilter {
        status: query.status,
        project_id: query.project_id,
        active_only: false,
    };
    Ok(HttpResponse::Ok().json(service.list_incidents(filter).await?))
}

#[get("/open")]
pub async fn list_open_incidents(
    service: web::Data<VigilService>,
    query: web::Query<ProjectQuery>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.list_active_incidents(query.project_id).await?))
}

#[post("")]
pub async fn create_incident(
    service: web::Data<VigilService>,
    body: web::Json<NewIncident>,
) -> Result<HttpResponse, ApiError> {
    let incident = service.create_incident(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(incident))
}

#[get("/{id}")]
pub async fn get_incident(
    service: web::Data<VigilService>,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.get_incident(*id).await?))
}

#[post("/{id}/acknowledge")]
pub async fn acknowledge_incident(
    service: web::Data<VigilService>,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.acknowledge_incident(*id).await?))
}

#[post("/{id}/resolve")]
pub async fn resolve_incident(
    service: web::Data<VigilService>,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.resolve_incident(*id).await?))
}
