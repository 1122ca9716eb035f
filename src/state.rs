use std::sync::Arc;

use crate::rag::RagPipeline;

/// Immutable context handed to every command. Built once at startup.
pub struct AppState {
    pub pipeline: Arc<RagPipeline>,
}

pub type Context<'a> = poise::Context<'a, AppState, anyhow::Error>;
