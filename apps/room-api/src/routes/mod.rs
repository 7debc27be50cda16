pub mod health;
pub mod rooms;

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest("/api", rooms::router())
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Rooms
        rooms::create_room,
        rooms::list_rooms,
        rooms::get_room,
        rooms::join_room,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Models
            crate::models::room::Room,
            crate::models::room::RoomResponse,
            crate::gateway::presence::Participant,
            // Route request/response types
            health::HealthResponse,
            rooms::CreateRoomRequest,
            rooms::JoinRoomRequest,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Rooms", description = "Room directory"),
    )
)]
pub struct ApiDoc;
