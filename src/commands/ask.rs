use tracing::info;

use super::{send_chunked, send_diagram};
use crate::error::RagError;
use crate::rag::citations::Verification;
use crate::rag::{DiagramOutcome, Interaction};
use crate::state::Context;

/// Ask a question about the corpus
#[poise::command(slash_command, guild_only)]
pub async fn ask(
    ctx: Context<'_>,
    #[description = "Your question"] question: String,
    #[description = "Projects to search, comma-separated (default: all)"]
    #[autocomplete = "autocomplete_projects"]
    projects: Option<String>,
) -> Result<(), anyhow::Error> {
    ctx.defer().await?;

    let projects = parse_projects(projects.as_deref());
    info!(
        user = ctx.author().name,
        question,
        projects = ?projects,
        "Question received"
    );

    let interaction = match ctx.data().pipeline.ask(&question, &projects).await {
        Ok(interaction) => interaction,
        Err(e) => {
            info!(error = %e, "Question failed");
            ctx.say(user_message(&e)).await?;
            return Ok(());
        }
    };

    info!(
        sources = interaction.sources.len(),
        citations = interaction.answer.citations.len(),
        dropped = interaction.answer.issues.len(),
        "Answer ready"
    );

    send_chunked(&ctx, &format_answer(&interaction, &projects)).await?;

    match &interaction.diagram {
        DiagramOutcome::Rendered(diagram) => send_diagram(&ctx, diagram).await?,
        DiagramOutcome::Failed(e) => {
            ctx.say(format!("_No diagram: {}_", e)).await?;
        }
        DiagramOutcome::Skipped => {}
    }

    Ok(())
}

/// Split a comma-separated project list, dropping blanks and duplicates.
pub fn parse_projects(raw: Option<&str>) -> Vec<String> {
    let mut projects: Vec<String> = Vec::new();
    for name in raw.unwrap_or_default().split(',').map(str::trim) {
        if !name.is_empty() && !projects.iter().any(|p| p == name) {
            projects.push(name.to_string());
        }
    }
    projects
}

/// Render the answer, its verified citations and a verification note.
pub fn format_answer(interaction: &Interaction, projects: &[String]) -> String {
    let scope = if projects.is_empty() {
        "all".to_string()
    } else {
        projects.join(", ")
    };
    let mut out = format!(
        "**Q:** {}\n**Projects:** {} | **Sources searched:** {}\n\n**A:** {}",
        interaction.query.as_str(),
        scope,
        interaction.sources.len(),
        interaction.answer.text
    );

    if !interaction.answer.citations.is_empty() {
        out.push_str("\n\n**Citations:**\n");
        for (n, citation) in interaction.answer.citations.iter().enumerate() {
            let label = interaction
                .sources
                .get(citation.source_id)
                .map(|s| s.document.label())
                .unwrap_or_default();
            out.push_str(&format!("[{}] {}: \"{}\"\n", n + 1, label, citation.quote));
        }
    }

    if interaction.answer.verification() == Verification::Unverified {
        out.push_str(&format!(
            "\n_Unverified: {} citation(s) did not match the sources and were removed._\n",
            interaction.answer.issues.len()
        ));
    }

    out
}

/// Short explanation for a failed question.
pub fn user_message(err: &RagError) -> String {
    match err {
        RagError::EmptyQuery => "Please ask a question.".to_string(),
        RagError::UnknownProject(name) => format!(
            "Unknown project `{}`. Use `/socioscope projects` to see what's available.",
            name
        ),
        RagError::MissingCredential | RagError::Unauthorized => {
            "The model service rejected the configured API key.".to_string()
        }
        RagError::RateLimited => "The model service is rate limiting requests. Try again shortly.".to_string(),
        RagError::Schema(detail) => format!("The model's answer could not be read: {}", detail),
        other => format!("Something went wrong: {}", other),
    }
}

/// Longest autocomplete choice value Discord accepts.
const AUTOCOMPLETE_VALUE_LIMIT: usize = 100;

/// Complete the last entry of a comma-separated project list.
pub fn complete_project_list(partial: &str, projects: &[String]) -> Vec<String> {
    let (done, last) = match partial.rfind(',') {
        Some(i) => (&partial[..=i], partial[i + 1..].trim()),
        None => ("", partial.trim()),
    };
    let chosen = parse_projects(Some(done));
    let needle = last.to_lowercase();
    let prefix = if done.is_empty() {
        String::new()
    } else {
        format!("{} ", done.trim_end())
    };

    projects
        .iter()
        .filter(|p| !chosen.contains(p))
        .filter(|p| p.to_lowercase().contains(&needle))
        .map(|p| format!("{}{}", prefix, p))
        .filter(|choice| choice.chars().count() <= AUTOCOMPLETE_VALUE_LIMIT)
        .take(25)
        .collect()
}

async fn autocomplete_projects(ctx: Context<'_>, partial: &str) -> Vec<String> {
    let projects: Vec<String> = ctx
        .data()
        .pipeline
        .corpus()
        .projects()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    complete_project_list(partial, &projects)
}
