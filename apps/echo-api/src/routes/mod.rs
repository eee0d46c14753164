pub mod chat;
pub mod health;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .merge(chat::router())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Chat history
        chat::world_history,
        chat::stream_history,
        chat::grotto_history,
        // Message actions
        chat::add_reaction,
        chat::remove_reaction,
        chat::delete_message,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Models
            crate::models::message::PublicChatMessage,
            crate::models::message::ChannelKind,
            crate::models::message::Reaction,
            crate::models::message::SystemMessageType,
            crate::models::identity::PublicProfile,
            // Route request/response types
            health::HealthResponse,
            chat::ChatHistoryResponse,
            chat::ReactionRequest,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Chat", description = "Chat history and message actions"),
    )
)]
pub struct ApiDoc;
