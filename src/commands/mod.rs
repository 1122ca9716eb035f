mod ask;
mod diagram;
mod projects;

use poise::serenity_prelude as serenity;
use tracing::info;

use crate::rag::diagram::Diagram;
use crate::state::Context;

/// Discord's message limit is 2000; leave room for formatting.
const CHUNK_LIMIT: usize = 1990;

/// Longest URL Discord accepts in an embed.
const EMBED_URL_LIMIT: usize = 2048;

/// Socioscope - ask cited questions about the project corpus
#[poise::command(
    slash_command,
    subcommands("ask::ask", "projects::projects", "diagram::diagram")
)]
pub async fn socioscope(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

/// Split `text` into pieces of at most `limit` bytes, preferring to break
/// after a newline, then after a space.
pub fn split_chunks(text: &str, limit: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        if remaining.len() <= limit {
            chunks.push(remaining);
            break;
        }
        let mut end = limit;
        while !remaining.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = remaining.chars().next().map_or(1, char::len_utf8);
        }
        let split_at = remaining[..end]
            .rfind('\n')
            .or_else(|| remaining[..end].rfind(' '))
            .map(|i| i + 1)
            .unwrap_or(end);
        chunks.push(&remaining[..split_at]);
        remaining = &remaining[split_at..];
    }
    chunks
}

/// Send `text` as consecutive replies. Follow-ups go through the interaction
/// webhook, so no Send Messages channel permission is needed.
pub async fn send_chunked(ctx: &Context<'_>, text: &str) -> Result<(), anyhow::Error> {
    for chunk in split_chunks(text, CHUNK_LIMIT) {
        ctx.say(chunk).await?;
    }
    Ok(())
}

/// Whether the diagram's image and link URLs both fit in an embed.
pub fn diagram_fits_embed(diagram: &Diagram) -> bool {
    diagram.url.len() <= EMBED_URL_LIMIT && diagram.webp_url().len() <= EMBED_URL_LIMIT
}

/// Post a rendered diagram as an embedded image, or a short note when its
/// URL is too long for Discord to accept.
pub async fn send_diagram(ctx: &Context<'_>, diagram: &Diagram) -> Result<(), anyhow::Error> {
    if !diagram_fits_embed(diagram) {
        info!(url_len = diagram.webp_url().len(), "Diagram URL too long to embed");
        ctx.say(format!(
            "_No diagram: the graph is too large to embed ({} characters of mermaid)._",
            diagram.graph.chars().count()
        ))
        .await?;
        return Ok(());
    }

    ctx.send(
        poise::CreateReply::default().embed(
            serenity::CreateEmbed::new()
                .title("Graphical representation")
                .url(diagram.url.clone())
                .image(diagram.webp_url()),
        ),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::diagram::mermaid_url;

    fn diagram_of(graph: &str) -> Diagram {
        Diagram {
            graph: graph.to_string(),
            url: mermaid_url("https://mermaid.ink/img/", graph),
        }
    }

    #[test]
    fn test_small_diagram_fits_embed() {
        assert!(diagram_fits_embed(&diagram_of("graph TD; EDEN-->Maps")));
    }

    #[test]
    fn test_large_diagram_does_not_fit_embed() {
        let graph = format!("graph TD; {}", "A-->B; ".repeat(250));
        let diagram = diagram_of(&graph);
        assert!(diagram.webp_url().len() > EMBED_URL_LIMIT);
        assert!(!diagram_fits_embed(&diagram));
    }

    #[test]
    fn test_limit_counts_the_webp_suffix() {
        let base = "https://mermaid.ink/img/";
        let diagram = Diagram {
            graph: String::new(),
            url: format!("{}{}", base, "x".repeat(EMBED_URL_LIMIT - base.len())),
        };
        assert_eq!(diagram.url.len(), EMBED_URL_LIMIT);
        assert!(!diagram_fits_embed(&diagram));
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(split_chunks("hello", 10), vec!["hello"]);
        assert!(split_chunks("", 10).is_empty());
    }

    #[test]
    fn test_prefers_newline_then_space() {
        assert_eq!(split_chunks("aaa\nbbb ccc", 8), vec!["aaa\n", "bbb ccc"]);
        assert_eq!(split_chunks("aaa bbb ccc", 8), vec!["aaa bbb ", "ccc"]);
    }

    #[test]
    fn test_hard_split_without_breaks() {
        assert_eq!(split_chunks("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_never_splits_inside_a_char() {
        let text = "ééééé"; // 2 bytes each
        let chunks = split_chunks(text, 3);
        assert!(chunks.iter().all(|c| c.len() <= 3));
        assert_eq!(chunks.concat(), text);
    }
}
