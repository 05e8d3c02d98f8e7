pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

pub fn build_api_router(state: ApiState) -> Router<ApiState> {
    // The pipeline authenticates render requests itself.
    let render_routes = Router::new().route(
        "/api/v1/tenants/{tenant}/workspaces/{workspace}/documents/{document_type}/render",
        post(handlers::render_document),
    );

    let admin_routes = Router::new()
        .route(
            "/api/v1/templates",
            get(handlers::list_templates).post(handlers::publish_template),
        )
        .route(
            "/api/v1/templates/{id}/activation",
            post(handlers::set_template_activation),
        )
        .route("/api/v1/templates/reload", post(handlers::reload_templates))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::api_rate_limit,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::api_auth,
        ));

    render_routes
        .layer(axum_middleware::from_fn_with_state(
            state,
            middleware::api_rate_limit,
        ))
        .merge(admin_routes)
}
