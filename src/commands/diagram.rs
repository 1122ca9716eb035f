use tracing::info;

use super::send_diagram;
use crate::state::Context;

/// Draw a diagram of any text
#[poise::command(slash_command, guild_only)]
pub async fn diagram(
    ctx: Context<'_>,
    #[description = "Text to illustrate"] text: String,
) -> Result<(), anyhow::Error> {
    if text.trim().is_empty() {
        ctx.say("Give me some text to draw.").await?;
        return Ok(());
    }
    ctx.defer().await?;

    match ctx.data().pipeline.diagram(&text).await {
        Ok(diagram) => {
            info!(graph_len = diagram.graph.len(), "Diagram rendered");
            send_diagram(&ctx, &diagram).await?;
        }
        Err(e) => {
            info!(error = %e, "Diagram failed");
            ctx.say(format!("_No diagram: {}_", e)).await?;
        }
    }
    Ok(())
}
