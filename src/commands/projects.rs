use super::send_chunked;
use crate::state::Context;

/// List the projects in the corpus
#[poise::command(slash_command, guild_only)]
pub async fn projects(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let corpus = ctx.data().pipeline.corpus();
    let projects = corpus.projects();

    if projects.is_empty() {
        ctx.say("The corpus is empty.").await?;
        return Ok(());
    }

    send_chunked(&ctx, &format_projects(&projects, corpus.len())).await
}

pub fn format_projects(projects: &[(String, usize)], total: usize) -> String {
    let mut output = format!(
        "**Projects** ({} projects, {} documents)\n\n",
        projects.len(),
        total
    );
    for (name, count) in projects {
        output.push_str(&format!("- **{}** ({} documents)\n", name, count));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_projects() {
        let text = format_projects(&[("EDEN".to_string(), 2), ("SOLAR".to_string(), 1)], 3);
        assert!(text.starts_with("**Projects** (2 projects, 3 documents)"));
        assert!(text.contains("- **EDEN** (2 documents)\n- **SOLAR** (1 documents)"));
    }
}
