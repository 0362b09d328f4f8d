use crate::controller::{bot_controller, callback_controller, health_check_controller};
use crate::{params, sse, AppState};
use axum::{
    routing::{delete, get, post, put},
    Router,
};

use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Bot Manager API"
        ),
        paths(
            bot_controller::create,
            bot_controller::status,
            bot_controller::read,
            bot_controller::reconfigure,
            bot_controller::delete,
            callback_controller::status_change,
            callback_controller::joining,
            callback_controller::awaiting_admission,
            callback_controller::started,
            callback_controller::exited,
            health_check_controller::health_check,
        ),
        components(
            schemas(
                domain::meetings::Model,
                params::bot::RequestBotParams,
                params::bot::ReconfigureParams,
                params::callback::StatusChangeParams,
                params::callback::ProgressParams,
                params::callback::ExitedParams,
            )
        ),
        modifiers(&SecurityAddon),
        tags(
            (name = "bot_manager", description = "Meeting bot lifecycle API")
        )
    )]
struct ApiDoc;

struct SecurityAddon;

// The gateway in front of this service authenticates users and forwards their id in a header.
impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "user_id",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    crate::extractors::caller::USER_ID_HEADER,
                    "Id of the authenticated user, set by the API gateway",
                ))),
            )
        }
    }
}

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(bot_routes(app_state.clone()))
        .merge(callback_routes(app_state.clone()))
        .merge(event_routes(app_state))
        .merge(health_routes())
        // **** FIXME: protect the OpenAPI web UI
        .merge(RapiDoc::with_openapi("/api-docs/openapi2.json", ApiDoc::openapi()).path("/rapidoc"))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn bot_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/bots", post(bot_controller::create))
        .route("/bots/status", get(bot_controller::status))
        .route(
            "/bots/{platform}/{native_meeting_id}",
            get(bot_controller::read),
        )
        .route(
            "/bots/{platform}/{native_meeting_id}",
            delete(bot_controller::delete),
        )
        .route(
            "/bots/{platform}/{native_meeting_id}/config",
            put(bot_controller::reconfigure),
        )
        .with_state(app_state)
}

/// Internal routes the bots call; not exposed through the gateway.
fn callback_routes(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/bots/internal/callback/status_change",
            post(callback_controller::status_change),
        )
        .route(
            "/bots/internal/callback/joining",
            post(callback_controller::joining),
        )
        .route(
            "/bots/internal/callback/awaiting_admission",
            post(callback_controller::awaiting_admission),
        )
        .route(
            "/bots/internal/callback/started",
            post(callback_controller::started),
        )
        .route(
            "/bots/internal/callback/exited",
            post(callback_controller::exited),
        )
        .route(
            "/bots/internal/commands/{meeting_id}",
            get(sse::handler::bot_commands),
        )
        .with_state(app_state)
}

fn event_routes(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/meetings/{meeting_id}/events",
            get(sse::handler::meeting_events),
        )
        .with_state(app_state)
}
