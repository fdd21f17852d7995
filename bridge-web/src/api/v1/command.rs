//! Command submission façade and command snapshots.
//!
//! Thin over the router: validation here, resolution there. Backpressure
//! surfaces as 429 and duplicate submissions return 202 with the id of the
//! command that already owns the idempotency key.

use crate::AppState;
use actix_web::{web, HttpResponse};
use actix_web_validator::{Json, Path};
use bridge_error::web::WebError;
use bridge_models::{
    domain::prelude::{CommandSnapshot, PathId, SubmitCommand, SubmitOutcome},
    web::WebResponse,
    CommandDispatch,
};
use bridge_repository::CommandRepository;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

pub(crate) fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/{id}/commands", web::post().to(submit))
        .route("/{id}/commands/{command_id}", web::get().to(get_by_id));
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmittedCommand {
    command_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CommandPath {
    #[validate(length(min = 1, max = 64))]
    pub id: String,
    #[validate(length(min = 1, max = 64))]
    pub command_id: String,
}

pub async fn submit(
    req: Path<PathId>,
    payload: Json<SubmitCommand>,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse, WebError> {
    let payload = payload.into_inner();
    let outcome = state
        .control_plane()
        .submit_command(&req.id, &payload.idempotency_key, &payload.command)
        .await
        .map_err(WebError::from)?;

    match outcome {
        SubmitOutcome::Accepted { command_id } => Ok(HttpResponse::Accepted()
            .json(WebResponse::ok(SubmittedCommand { command_id }))),
        SubmitOutcome::QueueFull => Err(WebError::TooManyRequests(
            "command queue is full, retry with the same idempotency key".into(),
        )),
    }
}

pub async fn get_by_id(
    req: Path<CommandPath>,
) -> Result<WebResponse<CommandSnapshot>, WebError> {
    let command = CommandRepository::find_by_id(&req.command_id, None::<&DatabaseConnection>)
        .await?
        // A command fetched through another device's path is not exposed.
        .filter(|c| c.device_id == req.id)
        .ok_or_else(|| WebError::NotFound(format!("command {}", req.command_id)))?;

    Ok(WebResponse::ok(command.into()))
}
