use serde_json::{json, Value};

use super::RetrievedDocument;
use crate::llm::JsonSchema;

pub const ANSWER_SYSTEM_PROMPT: &str = "You are a helpful academic research assistant. \
Answer the user's question using only the project documents below, and cite the sources \
that justify your answer. Every citation must give the integer Source ID of one document \
and a VERBATIM quote copied exactly from that document. \
If none of the documents answer the question, say that you don't know.\n\n\
Project documents:";

pub const DIAGRAM_SYSTEM_PROMPT: &str = "1. Encode the user's text as a mermaid graph.\n\
2. Call the 'mermaid_url' tool with that graph. Do not reply with the graph as text.";

pub const DIAGRAM_TOOL_NAME: &str = "mermaid_url";

/// Answer used when retrieval found nothing to ground a reply on.
pub const NO_DOCUMENTS_ANSWER: &str = "No supporting documents were found for this question.";

/// Render retrieved documents as a numbered source list. The position in
/// `docs` is the Source ID a citation must refer back to.
pub fn format_docs_with_id(docs: &[RetrievedDocument]) -> String {
    let formatted: Vec<String> = docs
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let meta = &d.document.metadata;
            let mut entry = format!("Source ID: {}\nProject: {}\n", i, meta.project_label());
            if let Some(file) = &meta.file_name {
                entry.push_str(&format!("File: {}\n", file));
            }
            entry.push_str(&format!("Snippet: {}", d.document.content));
            entry
        })
        .collect();
    format!("\n\n{}", formatted.join("\n\n"))
}

/// Schema for a cited answer; matches `citations::QuotedAnswer`.
pub fn quoted_answer_schema() -> JsonSchema {
    JsonSchema {
        name: "quoted_answer",
        schema: json!({
            "type": "object",
            "properties": {
                "answer": {
                    "type": "string",
                    "description": "The answer to the user question, based only on the given sources."
                },
                "citations": {
                    "type": "array",
                    "description": "Citations from the given sources that justify the answer.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "source_id": {
                                "type": "integer",
                                "description": "The integer ID of a SPECIFIC source which justifies the answer."
                            },
                            "quote": {
                                "type": "string",
                                "description": "The VERBATIM quote from the specified source that justifies the answer."
                            }
                        },
                        "required": ["source_id", "quote"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["answer", "citations"],
            "additionalProperties": false
        }),
    }
}

/// Function-tool definition the diagram step offers the model.
pub fn diagram_tool() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": DIAGRAM_TOOL_NAME,
            "description": "Get the image URL of a mermaid graph. Call this whenever you need to display a mermaid graph.",
            "parameters": {
                "type": "object",
                "properties": {
                    "graph": {
                        "type": "string",
                        "description": "The mermaid graph"
                    }
                },
                "required": ["graph"],
                "additionalProperties": false
            }
        }
    })
}
