use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::api::handlers::{self, AppState};
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Projects
        .route("/projects", post(handlers::create_project::<S>))
        .route("/projects/:project_id", get(handlers::get_project::<S>))
        .route(
            "/projects/:project_id/members",
            put(handlers::upsert_project_member::<S>),
        )
        .route("/projects/:project_id/events", get(handlers::list_events::<S>))
        // Environments
        .route(
            "/projects/:project_id/environments",
            get(handlers::list_environments::<S>).post(handlers::create_environment::<S>),
        )
        .route(
            "/projects/:project_id/environments/order",
            put(handlers::reorder_environments::<S>),
        )
        .route(
            "/projects/:project_id/environments/:environment_id",
            delete(handlers::delete_environment::<S>),
        )
        // Configs
        .route(
            "/projects/:project_id/configs",
            get(handlers::list_configs::<S>).post(handlers::create_config::<S>),
        )
        .route(
            "/projects/:project_id/configs/:name/resolve",
            post(handlers::resolve_config::<S>),
        )
        .route(
            "/configs/:config_id",
            get(handlers::get_config::<S>)
                .patch(handlers::update_config::<S>)
                .delete(handlers::delete_config::<S>),
        )
        .route(
            "/configs/:config_id/variants/:variant_id/restore",
            post(handlers::restore_version::<S>),
        )
        .route(
            "/variants/:variant_id/revisions",
            get(handlers::list_revisions::<S>),
        )
        // Proposals
        .route(
            "/configs/:config_id/proposals",
            get(handlers::list_proposals::<S>).post(handlers::create_proposal::<S>),
        )
        .route("/proposals/:proposal_id", get(handlers::get_proposal::<S>))
        .route(
            "/proposals/:proposal_id/approve",
            post(handlers::approve_proposal::<S>),
        )
        .route(
            "/proposals/:proposal_id/reject",
            post(handlers::reject_proposal::<S>),
        )
        .route(
            "/variants/:variant_id/proposals/reject-pending",
            post(handlers::reject_all_pending::<S>),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;
    use crate::store::MemoryStore;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        create_router::<MemoryStore>().with_state(AppState::new(
            Arc::new(MemoryStore::new()),
            WorkflowConfig::default(),
        ))
    }

    fn owner_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-user-id", "owner")
            .header("x-user-email", "owner@acme.io")
            .header("x-workspace-role", "owner")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_identity() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_requests_without_user_are_unauthorized() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/projects/p1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_errors_map_to_status_and_kind() {
        let app = app();

        let missing = app
            .clone()
            .oneshot(owner_request("GET", "/configs/nope", Value::Null))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(missing).await["kind"], json!("not_found"));

        let created = app
            .clone()
            .oneshot(owner_request(
                "POST",
                "/projects",
                json!({"name": "Storefront", "environments": ["production"]}),
            ))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let project = body_json(created).await;
        let project_id = project["id"].as_str().unwrap().to_string();

        let bad_name = app
            .clone()
            .oneshot(owner_request(
                "POST",
                &format!("/projects/{}/configs", project_id),
                json!({"name": "not valid", "value": true}),
            ))
            .await
            .unwrap();
        assert_eq!(bad_name.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let config = json!({
            "name": "flag_x",
            "value": {"enabled": false},
            "schema": {"type": "object", "required": ["enabled"]}
        });
        let first = app
            .clone()
            .oneshot(owner_request(
                "POST",
                &format!("/projects/{}/configs", project_id),
                config.clone(),
            ))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);
        let details = body_json(first).await;

        let duplicate = app
            .clone()
            .oneshot(owner_request(
                "POST",
                &format!("/projects/{}/configs", project_id),
                config,
            ))
            .await
            .unwrap();
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(duplicate).await["kind"], json!("duplicate_name"));

        let variant_id = details["variants"][1]["id"].as_str().unwrap();
        let stale = app
            .clone()
            .oneshot(owner_request(
                "PATCH",
                &format!("/configs/{}", details["config"]["id"].as_str().unwrap()),
                json!({
                    "base_config_version": 1,
                    "variants": [{"variant_id": variant_id, "base_version": 7, "value": {"enabled": true}}]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(stale.status(), StatusCode::CONFLICT);
        let body = body_json(stale).await;
        assert_eq!(body["kind"], json!("version_conflict"));
        assert_eq!(body["retryable"], json!(true));
        assert_eq!(body["conflict"]["current"], json!(1));

        let stranger = app
            .oneshot(
                Request::builder()
                    .uri(format!("/projects/{}/configs", project_id))
                    .header("x-user-id", "stranger")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(stranger.status(), StatusCode::FORBIDDEN);
    }
}
