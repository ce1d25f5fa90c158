use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use lancer_api::auth::{self, AppState, AppStateInner};
use lancer_api::middleware::require_auth;
use lancer_api::{chats, files, messages, users};
use lancer_gateway::connection;
use lancer_gateway::dispatcher::Dispatcher;
use lancer_gateway::registry::ConnectionRegistry;
use lancer_types::api::Claims;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lancer=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("LANCER_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("LANCER_DB_PATH").unwrap_or_else(|_| "lancer.db".into());
    let host = std::env::var("LANCER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("LANCER_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(lancer_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let dispatcher = Dispatcher::new(ConnectionRegistry::new(), db.clone());
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: jwt_secret.clone(),
    });

    let ws_state = ServerState {
        dispatcher,
        jwt_secret,
    };

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/users/{user_id}", get(users::get_user))
        .route("/chats", get(chats::list_chats))
        .route("/chats/private", post(chats::create_private_chat))
        .route("/chats/group", post(chats::create_group_chat))
        .route(
            "/chats/{chat_id}",
            get(chats::get_chat).delete(chats::delete_chat),
        )
        .route("/chats/{chat_id}/participants", post(chats::add_participant))
        .route("/chats/{chat_id}/leave", post(chats::leave_chat))
        .route("/chats/{chat_id}/read", post(chats::mark_read))
        .route("/chats/{chat_id}/messages", get(messages::get_messages))
        .route(
            "/chats/{chat_id}/messages/{message_id}",
            patch(messages::edit_message).delete(messages::delete_message),
        )
        .route("/files/{file_id}", get(files::download_file))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(ws_state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Lancer server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: String,
}

/// GET /gateway?token=<jwt> — the bearer token is validated here, before
/// the upgrade, so a bad token never reaches the registry.
async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let token_data = decode::<Claims>(
        &query.token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let claims = token_data.claims;
    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, claims.sub, claims.username)
    }))
}
