pub mod citations;
pub mod diagram;
pub mod prompts;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::PipelineSettings;
use crate::corpus::types::Document;
use crate::corpus::Corpus;
use crate::error::{RagError, Result};
use crate::llm::{ChatModel, Embedder, Message};

use citations::{QuotedAnswer, VerifiedAnswer};
use diagram::{Diagram, ToolCalls};

/// A validated, non-empty user question.
#[derive(Debug, Clone, PartialEq)]
pub struct Query(String);

impl Query {
    pub fn new(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RagError::EmptyQuery);
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One retrieval hit. Its index in the result list is its Source ID.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    /// Position in the corpus.
    pub position: usize,
    pub score: f32,
    pub document: Document,
}

#[derive(Debug)]
pub enum DiagramOutcome {
    Rendered(Diagram),
    /// Diagrams disabled, or nothing to illustrate.
    Skipped,
    Failed(RagError),
}

/// Everything produced for one question.
#[derive(Debug)]
pub struct Interaction {
    pub query: Query,
    pub sources: Vec<RetrievedDocument>,
    pub answer: VerifiedAnswer,
    pub diagram: DiagramOutcome,
}

/// Retrieve → answer → diagram, over a shared read-only corpus.
pub struct RagPipeline {
    corpus: Arc<Corpus>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn ChatModel>,
    settings: PipelineSettings,
}

impl RagPipeline {
    pub fn new(
        corpus: Arc<Corpus>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn ChatModel>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            corpus,
            embedder,
            llm,
            settings,
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    /// Top-K documents most similar to `query`, restricted to `projects` when
    /// any are given. Unknown projects are rejected before the embedding call.
    pub async fn retrieve(&self, query: &Query, projects: &[String]) -> Result<Vec<RetrievedDocument>> {
        if let Some(unknown) = projects.iter().find(|p| !self.corpus.has_project(p)) {
            return Err(RagError::UnknownProject(unknown.clone()));
        }

        let candidates = (!projects.is_empty()).then(|| self.corpus.filter_by_projects(projects));
        if self.corpus.is_empty() || candidates.as_ref().is_some_and(|c| c.is_empty()) {
            info!("No documents in scope; skipping retrieval");
            return Ok(vec![]);
        }

        let vector = self.embedder.embed(query.as_str()).await?;
        let ranked = self
            .corpus
            .nearest(&vector, self.settings.top_k, candidates.as_deref());

        let results: Vec<RetrievedDocument> = ranked
            .into_iter()
            .filter_map(|(position, score)| {
                self.corpus.get(position).map(|doc| RetrievedDocument {
                    position,
                    score,
                    document: doc.clone(),
                })
            })
            .collect();

        info!(
            query = query.as_str(),
            scope = projects.len(),
            hits = results.len(),
            top_score = ?results.first().map(|r| r.score),
            "Retrieved documents"
        );
        debug!(
            positions = ?results.iter().map(|r| r.position).collect::<Vec<_>>(),
            "Retrieved corpus positions"
        );
        Ok(results)
    }

    /// Ask the model for a cited answer over `docs`, then keep only the
    /// citations that resolve to a verbatim quote.
    pub async fn generate(&self, query: &Query, docs: &[RetrievedDocument]) -> Result<VerifiedAnswer> {
        if docs.is_empty() {
            return Ok(VerifiedAnswer::unsupported(prompts::NO_DOCUMENTS_ANSWER));
        }

        let messages = vec![
            Message::system(format!(
                "{}{}",
                prompts::ANSWER_SYSTEM_PROMPT,
                prompts::format_docs_with_id(docs)
            )),
            Message::user(query.as_str()),
        ];

        let value = self
            .llm
            .complete_json(&messages, &prompts::quoted_answer_schema())
            .await?;
        let answer: QuotedAnswer =
            serde_json::from_value(value).map_err(|e| RagError::Schema(e.to_string()))?;
        debug!(
            answer_len = answer.answer.len(),
            citations = answer.citations.len(),
            "Model answer parsed"
        );

        let verified = citations::verify(answer, docs);
        if !verified.issues.is_empty() {
            warn!(
                kept = verified.citations.len(),
                dropped = verified.issues.len(),
                "Answer has unverifiable citations"
            );
        }
        Ok(verified)
    }

    /// Have the model encode `answer_text` as a mermaid graph via the
    /// diagram tool, and build its image URL.
    pub async fn diagram(&self, answer_text: &str) -> Result<Diagram> {
        let messages = vec![
            Message::system(prompts::DIAGRAM_SYSTEM_PROMPT),
            Message::user(answer_text),
        ];
        let calls = self
            .llm
            .complete_with_tools(&messages, &[prompts::diagram_tool()])
            .await?;
        debug!(tool_calls = calls.len(), "Diagram response received");

        let graph = diagram::extract_graph(ToolCalls::from(calls))?;
        let url = diagram::mermaid_url(&self.settings.mermaid_base_url, &graph);
        Ok(Diagram { graph, url })
    }

    /// Full interaction. Retrieval and answer failures abort; a diagram
    /// failure is reported next to the answer.
    pub async fn ask(&self, question: &str, projects: &[String]) -> Result<Interaction> {
        let query = Query::new(question)?;
        let sources = self.retrieve(&query, projects).await?;
        let answer = self.generate(&query, &sources).await?;

        let diagram = if !self.settings.diagrams || sources.is_empty() {
            DiagramOutcome::Skipped
        } else {
            match self.diagram(&answer.text).await {
                Ok(d) => DiagramOutcome::Rendered(d),
                Err(e) => {
                    warn!(error = %e, "Diagram generation failed");
                    DiagramOutcome::Failed(e)
                }
            }
        };

        Ok(Interaction {
            query,
            sources,
            answer,
            diagram,
        })
    }
}
