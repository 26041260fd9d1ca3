//! Persona listing endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde::Serialize;

use super::{ApiError, ApiState};
use crate::persona::{Imagery, Persona};

/// Build personas router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/personas", get(list_personas))
        .route("/personas/{id}", get(get_persona))
        .with_state(state)
}

/// Persona info for API responses
///
/// The prompt prefix stays server-side.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaInfo {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,
    pub voice_id: String,
    pub imagery: Imagery,
}

impl From<&Persona> for PersonaInfo {
    fn from(persona: &Persona) -> Self {
        Self {
            id: persona.id.clone(),
            name: persona.name.clone(),
            tagline: persona.tagline.clone(),
            voice_id: persona.voice_id.clone(),
            imagery: persona.imagery.clone(),
        }
    }
}

/// Response for listing all personas
#[derive(Debug, Serialize)]
pub struct PersonaListResponse {
    pub personas: Vec<PersonaInfo>,
    pub total: usize,
}

/// List all available personas in registry order
async fn list_personas(State(state): State<Arc<ApiState>>) -> Json<PersonaListResponse> {
    let personas: Vec<PersonaInfo> = state.personas.iter().map(PersonaInfo::from).collect();
    let total = personas.len();
    Json(PersonaListResponse { personas, total })
}

/// Get one persona by id
async fn get_persona(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<PersonaInfo>, ApiError> {
    state
        .personas
        .lookup(&id)
        .map(|p| Json(PersonaInfo::from(p)))
        .ok_or_else(|| ApiError::NotFound(format!("persona not found: {id}")))
}
