// ./api/src/main.rs
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json as JsonResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// Application layer: the lead use cases and error/DTO types
use application::{ApplicationError, CreateLeadResponse, ErrorResponse, LeadService};
// Infrastructure layer: connection lifecycle and the store adapter
use infrastructure::{ConnectionManager, DocumentStore};

/// Shared handler state.
#[derive(Clone)]
struct AppState {
    lead_service: Arc<LeadService>,
}

const DEFAULT_PORT: u16 = 3000;

// Application entry point
#[tokio::main]
async fn main() {
    let port = match env::var("PORT") {
        Ok(port_str) => match u16::from_str(&port_str) {
            Ok(port_num) => {
                info!("Using port {} from environment variable PORT.", port_num);
                port_num
            }
            Err(_) => {
                warn!(
                    "Invalid PORT value '{}' in environment variable. Using default port {}.",
                    port_str, DEFAULT_PORT
                );
                DEFAULT_PORT
            }
        },
        Err(_) => {
            info!(
                "PORT environment variable not set. Using default port {}.",
                DEFAULT_PORT
            );
            DEFAULT_PORT
        }
    };

    // --- Logger Initialization ---
    let filter: EnvFilter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
    info!("API starting up");

    // --- Dependency Injection ---
    // 1. Connection lifecycle: a failed initialization is logged and leaves
    //    the process serving errors rather than refusing to start.
    let connection_manager = Arc::new(ConnectionManager::from_env());
    if connection_manager.is_connected() {
        info!("Document store connection established.");
    } else {
        warn!("Document store is not connected; lead requests will fail until credentials are fixed.");
    }

    // 2. Store adapter and lead service
    let document_store = Arc::new(DocumentStore::new(connection_manager));
    let lead_service = Arc::new(LeadService::new(document_store));
    info!("Lead service initialized.");

    // 3. Create the application state
    let app_state = AppState { lead_service };

    // --- API Router Definition ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/v1/leads/create_lead", post(create_lead_handler))
        .route("/api/v1/leads/list_leads/", get(list_leads_handler))
        .layer(cors)
        .with_state(app_state);

    info!("API routes configured.");

    // --- Server Startup ---
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Server starting on {}", addr);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("Server listening on {}", addr);
            listener
        }
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
    info!("API shutting down");
}

// --- API Handlers ---

async fn root_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        JsonResponse(json!({
            "message": "SME CRM API",
            "documentation": "/docs",
        })),
    )
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, JsonResponse(json!({"message": "Healthy"})))
}

/// Handler for creating a lead (POST /api/v1/leads/create_lead).
///
/// The body is taken as a raw JSON object; validation happens in the domain
/// layer so that the error names the offending field.
async fn create_lead_handler(
    State(state): State<AppState>,
    Json(payload): Json<Map<String, Value>>,
) -> Response {
    info!("Received request to create lead");
    match state.lead_service.create_lead(payload).await {
        Ok(lead_id) => {
            info!(lead_id = %lead_id, "Lead created successfully via handler");
            (
                StatusCode::OK,
                JsonResponse(CreateLeadResponse {
                    message: "Lead created successfully".to_string(),
                    lead_id,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to create lead via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

#[derive(Deserialize, Debug)]
struct ListLeadsQuery {
    business_type: Option<String>,
}

/// Handler for listing leads (GET /api/v1/leads/list_leads/?business_type=...).
async fn list_leads_handler(
    State(state): State<AppState>,
    Query(query): Query<ListLeadsQuery>,
) -> Response {
    info!(business_type = ?query.business_type, "Received request to list leads");
    match state
        .lead_service
        .list_leads(query.business_type.as_deref())
        .await
    {
        Ok(leads) => (StatusCode::OK, JsonResponse(leads)).into_response(),
        Err(e) => {
            error!("Failed to list leads via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

/// Maps any core failure to a generic server-error response carrying the
/// stringified cause. All error kinds get the same status; only the log
/// level distinguishes them.
fn map_application_error_to_response(err: ApplicationError) -> Response {
    match &err {
        ApplicationError::Validation(_) => warn!("Request rejected by validation: {}", err),
        ApplicationError::NotConnected(_) => error!("Store unavailable: {}", err),
        ApplicationError::Store { .. } | ApplicationError::Timeout { .. } => {
            error!("Store operation failed: {}", err)
        }
    }
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        JsonResponse(ErrorResponse {
            detail: err.to_string(),
        }),
    )
        .into_response()
}
