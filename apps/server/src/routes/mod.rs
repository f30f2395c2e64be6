use chrono::Duration;
use serde::Deserialize;
use vigil_service::Error as ServiceError;

use crate::error::ApiError;

mod audit;
mod dashboard;
mod health;
mod incidents;
mod monitors;
mod sla;

macros_utils::routes! {
    load health on "/health",
    load monitors on "/monitors",
    load incidents on "/incidents",
    load dashboard on "/dashboard",
    load audit on "/audit",
    load sla on "/sla",
}

#[derive(Debug, Deserialize)]
pub struct ProjectQuery {
    project_id: Option<i64>,
}

fn window_from_hours(hours: Option<i64>) -> Result<Option<Duration>, ApiError> {
    hours
        .map(|hours| {
            Duration::try_hours(hours)
                .ok_or_else(|| ApiError::from(ServiceError::validation("window is out of range")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use actix_web::{App, http::StatusCode, test, web};
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use vigil_service::clock::SystemClock;
    use vigil_service::config::Config;
    use vigil_service::database::{Database, DatabaseImpl, initialize_database};
    use vigil_service::monitoring::HttpChecker;
    use vigil_service::orchestrator::{Engine, build_engine};
    use vigil_service::pool::open_pool;

    use crate::error::json_config;

    /// Engine over a scratch database; nothing is spawned, so no probe runs
    /// unless a test asks for one.
    async fn engine() -> (TempDir, Engine) {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(dir.path().join("vigil.db"), 2).await.unwrap();
        {
            let conn = pool.get().await.unwrap();
            initialize_database(&conn).await.unwrap();
        }

        let database: Arc<dyn Database> = Arc::new(DatabaseImpl::new_from_pool(pool));
        let checker = Arc::new(HttpChecker::new(StdDuration::from_secs(1)).unwrap());
        let engine = build_engine(&Config::default(), database, checker, Arc::new(SystemClock));
        (dir, engine)
    }

    macro_rules! app {
        ($engine:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($engine.service.clone()))
                    .app_data(json_config())
                    .configure(super::routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_health() {
        let (_dir, engine) = engine().await;
        let app = app!(engine);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_monitor_routes() {
        let (_dir, engine) = engine().await;
        let app = app!(engine);

        let req = test::TestRequest::post()
            .uri("/monitors")
            .set_json(json!({ "name": "API", "url": "https://api.test/health", "check_interval": 30 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: Value = test::read_body_json(resp).await;
        assert_eq!(created["last_status"], "unknown");
        assert_eq!(created["interval_seconds"], 30);
        let id = created["id"].as_i64().unwrap();

        let req = test::TestRequest::get().uri(&format!("/monitors/{id}")).to_request();
        let fetched: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(fetched, created);

        let req = test::TestRequest::put()
            .uri(&format!("/monitors/{id}"))
            .set_json(json!({ "name": "Public API" }))
            .to_request();
        let updated: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(updated["name"], "Public API");

        let req = test::TestRequest::delete().uri(&format!("/monitors/{id}")).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/monitors").to_request();
        let listed: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(listed, json!([]));

        let req = test::TestRequest::get().uri(&format!("/monitors/{id}")).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["detail"].as_str().unwrap().contains("not found"));
    }

    #[actix_web::test]
    async fn test_invalid_monitor_is_unprocessable() {
        let (_dir, engine) = engine().await;
        let app = app!(engine);

        let req = test::TestRequest::post()
            .uri("/monitors")
            .set_json(json!({ "name": "API", "target": "https://api.test", "interval_seconds": 0 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let req = test::TestRequest::post()
            .uri("/monitors")
            .set_json(json!({ "name": "API" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["detail"].is_string());
    }

    #[actix_web::test]
    async fn test_incident_lifecycle_routes() {
        let (_dir, engine) = engine().await;
        let app = app!(engine);

        let req = test::TestRequest::post()
            .uri("/incidents")
            .set_json(json!({ "title": "Database failover", "severity": "critical" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: Value = test::read_body_json(resp).await;
        assert_eq!(created["status"], "open");
        assert_eq!(created["monitor_id"], Value::Null);
        let id = created["id"].as_i64().unwrap();

        let req = test::TestRequest::get().uri("/incidents/open").to_request();
        let open: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(open.as_array().unwrap().len(), 1);

        let req = test::TestRequest::post().uri(&format!("/incidents/{id}/acknowledge")).to_request();
        let acknowledged: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(acknowledged["status"], "acknowledged");
        assert!(acknowledged["acknowledged_at"].is_string());

        let req = test::TestRequest::post().uri(&format!("/incidents/{id}/resolve")).to_request();
        let resolved: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resolved["status"], "resolved");
        assert_eq!(resolved["acknowledged_at"], acknowledged["acknowledged_at"]);

        let req = test::TestRequest::post().uri(&format!("/incidents/{id}/resolve")).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::get().uri("/incidents?status=resolved").to_request();
        let listed: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let req = test::TestRequest::get().uri("/incidents/open").to_request();
        let open: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(open, json!([]));

        let req = test::TestRequest::get()
            .uri(&format!("/audit?entity_type=incident&entity_id={id}"))
            .to_request();
        let audit: Value = test::call_and_read_body_json(&app, req).await;
        let actions: Vec<&str> =
            audit.as_array().unwrap().iter().map(|e| e["action"].as_str().unwrap()).collect();
        assert_eq!(actions, vec!["resolve", "acknowledge", "create"]);
    }

    #[actix_web::test]
    async fn test_dashboard_routes() {
        let (_dir, engine) = engine().await;
        let app = app!(engine);

        let req = test::TestRequest::get().uri("/dashboard").to_request();
        let rollup: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(rollup["tasks"]["completion_rate"], 0.0);
        assert_eq!(rollup["monitoring"]["uptime_24h"], 100.0);
        assert_eq!(rollup["activity"]["total_actions"], 0);

        let req = test::TestRequest::get().uri("/dashboard/monitoring?window_hours=1").to_request();
        let monitoring: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(monitoring["open_incidents"], 0);

        let req = test::TestRequest::get().uri("/dashboard?window_hours=0").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let req = test::TestRequest::get().uri("/audit/stats").to_request();
        let stats: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(stats["total_actions"], 0);
    }

    #[actix_web::test]
    async fn test_sla_routes() {
        let (_dir, engine) = engine().await;
        let app = app!(engine);

        let req = test::TestRequest::post()
            .uri("/monitors")
            .set_json(json!({ "name": "API", "target": "https://api.test", "interval_seconds": 60 }))
            .to_request();
        let created: Value = test::call_and_read_body_json(&app, req).await;
        let id = created["id"].as_i64().unwrap();

        let req = test::TestRequest::get().uri("/sla/report?hours=48").to_request();
        let report: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(report["period_hours"], 48);
        assert_eq!(report["monitors"][0]["name"], "API");
        assert_eq!(report["monitors"][0]["uptime"]["uptime_percentage"], 100.0);
        assert_eq!(report["incident_metrics"]["mtta"]["sla_met"], Value::Null);
        assert_eq!(report["overall_sla_compliance"], true);

        let req = test::TestRequest::get().uri(&format!("/sla/monitors/{id}/uptime")).to_request();
        let uptime: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(uptime["total_checks"], 0);
        assert_eq!(uptime["period_hours"], 24);

        let req = test::TestRequest::get()
            .uri(&format!("/sla/monitors/{id}/response-times?hours=1"))
            .to_request();
        let latency: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(latency["sample_count"], 0);
        assert_eq!(latency["p95_ms"], Value::Null);

        let req = test::TestRequest::get().uri("/sla/monitors/9999/uptime").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get().uri("/sla/incidents/mttr?hours=-1").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let req = test::TestRequest::get().uri("/sla/health-score").to_request();
        let health: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(health["score"], 100);
        assert_eq!(health["status"], "excellent");
    }
}
