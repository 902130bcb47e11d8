mod config;
mod database;
mod error;
mod extract;
mod handlers;
mod ledger;
mod middleware;
mod models;
mod state;
mod utils;

use anyhow::Context;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use dotenvy::dotenv;
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use config::Config;
use database::{create_database_pool, run_migrations, seed_defaults};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env()?;

    let db = create_database_pool(&config)
        .await
        .context("failed to connect to database")?;
    run_migrations(&db).await.context("failed to run migrations")?;
    seed_defaults(&db, &config).await?;

    let addr = config.bind_addr();
    let app = create_router(AppState::new(db, config));

    log::info!("stockledger listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn create_router(state: AppState) -> Router {
    Router::new()
        // Session
        .route("/login", post(handlers::auth::login))
        .route("/logout", get(handlers::auth::logout).post(handlers::auth::logout))
        .route("/api/check-session", get(handlers::auth::check_session))

        // Movements
        .route("/api/incoming", post(handlers::movements::incoming))
        .route("/api/outgoing", post(handlers::movements::outgoing))

        // Records
        .route("/api/records", get(handlers::records::list_records))
        .route("/api/records/update", post(handlers::records::update_record))
        .route("/api/records/:id", delete(handlers::records::delete_record))

        // Stock
        .route("/api/stock", get(handlers::stock::list_stock))
        .route("/api/all-merchants-stock", get(handlers::stock::all_merchants_stock))
        .route("/api/locations", get(handlers::stock::list_locations))
        .route("/api/stock/update", post(handlers::stock::update_stock_fields))
        .route("/api/stock/relocate", post(handlers::stock::relocate))

        // Shenzhen site
        .route("/api/shenzhen/stock", get(handlers::shenzhen::shenzhen_stock))
        .route("/api/shenzhen/records", get(handlers::shenzhen::shenzhen_records))
        .route("/api/shenzhen/incoming", post(handlers::shenzhen::shenzhen_incoming))
        .route("/api/shenzhen/outgoing", post(handlers::shenzhen::shenzhen_outgoing))

        // Catalog and tenancy
        .route(
            "/api/merchants",
            get(handlers::merchants::list_merchants).post(handlers::merchants::create_merchant),
        )
        .route("/api/merchants/switch", post(handlers::merchants::switch_merchant))
        .route("/api/merchants/current", get(handlers::merchants::current_merchant))
        .route("/api/merchants/:id", delete(handlers::merchants::delete_merchant))
        .route(
            "/api/products",
            get(handlers::products::list_products).post(handlers::products::create_product),
        )
        .route(
            "/api/products/:id",
            put(handlers::products::update_product).delete(handlers::products::delete_product),
        )
        .route("/api/dashboard", get(handlers::dashboard::dashboard))

        // Users and permissions
        .route("/api/users/current", get(handlers::users::current_user))
        .route(
            "/api/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route("/api/users/:id", delete(handlers::users::delete_user))
        .route("/api/users/:id/permissions", put(handlers::users::update_user_permissions))
        .route("/api/permissions", get(handlers::users::list_permissions))

        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CookieManagerLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::Value;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use uuid::Uuid;

    const SECRET: &str = "test-secret";

    // The pool never connects: these requests are all rejected before a query runs.
    fn test_app() -> Router {
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://localhost/stockledger_test".to_string()),
            "JWT_SECRET" => Some(SECRET.to_string()),
            _ => None,
        })
        .unwrap();
        let db = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        create_router(AppState::new(db, config))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn api_requires_a_session_cookie() {
        let response = test_app()
            .oneshot(Request::get("/api/stock").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], true);
        assert!(body.get("expired").is_none());
    }

    #[tokio::test]
    async fn expired_token_reports_expiry() {
        let token = utils::create_token(SECRET, 1, Uuid::new_v4(), -60).unwrap();
        let response = test_app()
            .oneshot(
                Request::get("/api/check-session")
                    .header(header::COOKIE, format!("{}={}", middleware::AUTH_COOKIE, token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["expired"], true);
    }

    #[tokio::test]
    async fn forged_token_is_unauthorized() {
        let token = utils::create_token("another-secret", 1, Uuid::new_v4(), 3600).unwrap();
        let response = test_app()
            .oneshot(
                Request::post("/api/incoming")
                    .header(header::COOKIE, format!("{}={}", middleware::AUTH_COOKIE, token))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_routes_get_a_json_404() {
        let response = test_app()
            .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["success"], false);
    }

    fn login_request(body: &'static str) -> Request<Body> {
        Request::post("/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn malformed_body_gets_the_error_envelope() {
        let response = test_app().oneshot(login_request("not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], true);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn missing_body_field_is_named_in_the_envelope() {
        let response = test_app()
            .oneshot(login_request(r#"{"username":"admin"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], true);
        assert!(body["message"].as_str().unwrap().contains("password"));
    }
}
