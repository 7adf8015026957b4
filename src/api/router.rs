//! Patient records API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.
//!
//! Middleware stack (outermost → innermost):
//! 1. Principal extraction → 2. Access logger

use axum::routing::{delete, get, post};
use axum::Router;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;

/// Build the API router.
///
/// `/api/health` is open. Every other route requires an `X-Principal-Id`
/// header and sees only that principal's records.
pub fn api_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route(
            "/patients",
            get(endpoints::patients::list).post(endpoints::patients::create),
        )
        .route("/patients/statistics", get(endpoints::patients::statistics))
        .route("/patients/upcoming", get(endpoints::patients::upcoming))
        .route(
            "/patients/:id",
            get(endpoints::patients::detail)
                .patch(endpoints::patients::update)
                .delete(endpoints::archive::soft_delete),
        )
        .route("/patients/:id/permanent", delete(endpoints::archive::purge))
        .route("/patients/:id/audit", get(endpoints::archive::audit_trail))
        .route("/deleted-patients", get(endpoints::archive::deleted))
        .route(
            "/deleted-patients/:id/restore",
            post(endpoints::archive::restore),
        )
        .with_state(ctx)
        // Innermost first: access log sees the session injected above it.
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::principal::require_principal));

    let unprotected = Router::new().route("/health", get(endpoints::health::check));

    Router::new()
        .nest("/api", protected)
        .nest("/api", unprotected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::archive::{CascadeMode, NoopDocumentStorage};
    use crate::db::sqlite_store::SqliteRecordStore;
    use crate::db::RecordStore;

    fn test_ctx() -> ApiContext {
        let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::open_in_memory().unwrap());
        ApiContext::new(store, CascadeMode::Auto, Arc::new(NoopDocumentStorage))
    }

    fn make_request(method: &str, uri: &str, principal: Option<Uuid>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(p) = principal {
            builder = builder.header("X-Principal-Id", p.to_string());
        }
        match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: Response) -> Value {
        let body = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn create_patient(app: &Router, principal: Uuid, name: &str) -> Value {
        let req = make_request(
            "POST",
            "/api/patients",
            Some(principal),
            Some(json!({"name": name, "date_of_birth": "1980-05-01", "email": "p@example.com"})),
        );
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    #[tokio::test]
    async fn health_is_open() {
        let app = api_router(test_ctx());
        let response = app
            .oneshot(make_request("GET", "/api/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn patients_require_principal() {
        let app = api_router(test_ctx());
        let response = app
            .oneshot(make_request("GET", "/api/patients", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["code"], "PRINCIPAL_REQUIRED");
    }

    #[tokio::test]
    async fn malformed_id_returns_400() {
        let app = api_router(test_ctx());
        let response = app
            .oneshot(make_request("GET", "/api/patients/not-a-uuid", Some(Uuid::new_v4()), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_patient_returns_404() {
        let app = api_router(test_ctx());
        let uri = format!("/api/patients/{}", Uuid::new_v4());
        let response = app
            .oneshot(make_request("GET", &uri, Some(Uuid::new_v4()), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn zero_limit_returns_400() {
        let app = api_router(test_ctx());
        let response = app
            .oneshot(make_request("GET", "/api/patients?limit=0", Some(Uuid::new_v4()), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_page_returns_400() {
        let app = api_router(test_ctx());
        let response = app
            .oneshot(make_request(
                "GET",
                "/api/patients?limit=18446744073709551615&offset=1",
                Some(Uuid::new_v4()),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn create_then_search_by_name() {
        let app = api_router(test_ctx());
        let principal = Uuid::new_v4();
        create_patient(&app, principal, "Ada Lovelace").await;
        create_patient(&app, principal, "Grace Hopper").await;

        let response = app
            .clone()
            .oneshot(make_request("GET", "/api/patients?search=hopper", Some(principal), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["total_count"], 1);
        assert_eq!(json["has_more"], false);
        assert_eq!(json["patients"][0]["name"], "Grace Hopper");

        create_patient(&app, principal, "Émile Zola").await;
        let response = app
            .clone()
            .oneshot(make_request("GET", "/api/patients?search=%C3%A9mile", Some(principal), None))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["total_count"], 1);
        assert_eq!(json["patients"][0]["name"], "Émile Zola");

        // Another principal sees nothing.
        let response = app
            .oneshot(make_request("GET", "/api/patients", Some(Uuid::new_v4()), None))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["total_count"], 0);
    }

    #[tokio::test]
    async fn delete_restore_round_trip() {
        let app = api_router(test_ctx());
        let principal = Uuid::new_v4();
        let patient = create_patient(&app, principal, "Ada Lovelace").await;
        let patient_id = patient["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(make_request(
                "DELETE",
                &format!("/api/patients/{patient_id}"),
                Some(principal),
                Some(json!({"reason": "duplicate record"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let backup = body_json(response).await;
        assert_eq!(backup["deletion_reason"], "duplicate record");
        assert_eq!(backup["can_restore"], true);
        let backup_id = backup["id"].as_str().unwrap().to_string();

        // Deleted patients disappear from lookups and search.
        let response = app
            .clone()
            .oneshot(make_request("GET", &format!("/api/patients/{patient_id}"), Some(principal), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Second delete conflicts.
        let response = app
            .clone()
            .oneshot(make_request("DELETE", &format!("/api/patients/{patient_id}"), Some(principal), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(make_request("GET", "/api/deleted-patients", Some(principal), None))
            .await
            .unwrap();
        let listed = body_json(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let restore_uri = format!("/api/deleted-patients/{backup_id}/restore");
        let response = app
            .clone()
            .oneshot(make_request("POST", &restore_uri, Some(principal), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["name"], "Ada Lovelace");

        let response = app
            .clone()
            .oneshot(make_request("POST", &restore_uri, Some(principal), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(make_request(
                "GET",
                &format!("/api/patients/{patient_id}/audit"),
                Some(principal),
                None,
            ))
            .await
            .unwrap();
        let trail = body_json(response).await;
        let operations: Vec<&str> = trail
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["operation"].as_str().unwrap())
            .collect();
        assert_eq!(operations, vec!["RESTORE", "DELETE", "INSERT"]);
    }

    #[tokio::test]
    async fn purge_returns_204_and_removes_patient() {
        let app = api_router(test_ctx());
        let principal = Uuid::new_v4();
        let patient = create_patient(&app, principal, "Ada Lovelace").await;
        let uri = format!("/api/patients/{}/permanent", patient["id"].as_str().unwrap());

        let response = app
            .clone()
            .oneshot(make_request("DELETE", &uri, Some(principal), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(make_request("DELETE", &uri, Some(principal), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn statistics_count_live_patients() {
        let app = api_router(test_ctx());
        let principal = Uuid::new_v4();
        create_patient(&app, principal, "Ada Lovelace").await;

        let response = app
            .oneshot(make_request("GET", "/api/patients/statistics", Some(principal), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["total_patients"], 1);
        assert_eq!(json["new_this_month"], 1);
        assert_eq!(json["upcoming_appointments"], 0);
    }
}
