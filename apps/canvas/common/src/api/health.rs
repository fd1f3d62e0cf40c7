use crate::config::ServiceConfig;
use crate::hub::Hub;
use crate::store::CanvasStore;
use actix_web::{HttpResponse, get, web};
use chrono::Utc;
use serde_json::json;
use tracing::error;

#[get("/healthz")]
pub async fn liveness() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": Utc::now()
    }))
}

#[get("/health")]
pub async fn health(store: web::Data<CanvasStore>) -> HttpResponse {
    match database_status(&store).await {
        Ok(session_count) => HttpResponse::Ok().json(json!({
            "status": "healthy",
            "database": "connected",
            "sessionCount": session_count,
            "timestamp": Utc::now()
        })),
        Err(message) => unhealthy(message),
    }
}

#[get("/health/detailed")]
pub async fn health_detailed(
    store: web::Data<CanvasStore>,
    hub: web::Data<Hub>,
    config: web::Data<ServiceConfig>,
) -> HttpResponse {
    match database_status(&store).await {
        Ok(session_count) => HttpResponse::Ok().json(json!({
            "status": "healthy",
            "database": "connected",
            "sessionCount": session_count,
            "hubConnections": hub.connection_count().await,
            "version": env!("CARGO_PKG_VERSION"),
            "environment": config.environment,
            "timestamp": Utc::now()
        })),
        Err(message) => unhealthy(message),
    }
}

async fn database_status(store: &CanvasStore) -> Result<u64, String> {
    if let Err(e) = store.connection().ping().await {
        error!("Health check database ping failed: {}", e);
        return Err("Database unreachable".to_string());
    }
    store.count_sessions().await.map_err(|e| {
        error!("Health check query failed: {}", e);
        "Database query failed".to_string()
    })
}

fn unhealthy(message: String) -> HttpResponse {
    HttpResponse::ServiceUnavailable().json(json!({
        "status": "unhealthy",
        "error": message,
        "timestamp": Utc::now()
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(liveness)
        .service(health)
        .service(health_detailed);
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{TestState, test_app};
    use actix_web::test;
    use serde_json::Value;

    #[actix_web::test]
    async fn test_health_endpoints() {
        let state = TestState::new().await;
        state.session(1).await;
        let (_connection, _rx) = state.hub.connect().await;
        let app = test_app!(state);

        let req = test::TestRequest::get().uri("/healthz").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["sessionCount"], 1);

        let req = test::TestRequest::get().uri("/health/detailed").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["hubConnections"], 1);
        assert_eq!(body["environment"], "Development");
    }
}
