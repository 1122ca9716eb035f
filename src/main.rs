mod commands;
mod config;
mod corpus;
mod error;
mod llm;
mod rag;
mod state;

use std::sync::Arc;

use poise::serenity_prelude as serenity;
use poise::{Framework, FrameworkOptions};
use tracing::{error, info};

use config::AppConfig;
use corpus::index::EmbeddingCache;
use corpus::Corpus;
use llm::{Embedder, OpenAiClient};
use rag::RagPipeline;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load env
    let _ = dotenv::dotenv();
    let config = AppConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    // Init LLM client (fails before any network call without a credential)
    let client = Arc::new(OpenAiClient::new(&config.llm)?);
    info!(model = %config.llm.model, embedding_model = client.model_name(), "LLM client initialized");

    // Load corpus and its vectors
    let cache = EmbeddingCache::open(&config.index_dir).await?;
    info!(
        dir = ?config.index_dir,
        cached = cache.count(client.model_name()).await,
        "Embedding cache opened"
    );
    let corpus = Arc::new(Corpus::open(&config.corpus_path, client.as_ref(), &cache).await?);
    info!(
        documents = corpus.len(),
        projects = corpus.projects().len(),
        "Corpus ready"
    );

    let pipeline = Arc::new(RagPipeline::new(
        corpus,
        client.clone(),
        client,
        config.pipeline.clone(),
    ));
    let app_state = AppState { pipeline };

    let guild_id = config.guild_id.map(serenity::GuildId::new);
    let intents = serenity::GatewayIntents::GUILDS;

    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: vec![commands::socioscope()],
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot connected as: {} ({})", ready.user.name, ready.user.id);

                let commands = &framework.options().commands;
                for cmd in commands {
                    for sub in &cmd.subcommands {
                        info!("  /{} {}", cmd.name, sub.name);
                    }
                }

                if let Some(gid) = guild_id {
                    info!("Registering to guild {} (instant)", gid);
                    poise::builtins::register_in_guild(ctx, commands, gid).await?;
                } else {
                    info!("Registering globally (up to 1 hour delay)");
                    poise::builtins::register_globally(ctx, commands).await?;
                }

                Ok(app_state)
            })
        })
        .build();

    info!("Starting Socioscope Discord bot...");

    let mut client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    if let Err(e) = client.start().await {
        error!("Client error: {}", e);
    }

    Ok(())
}
