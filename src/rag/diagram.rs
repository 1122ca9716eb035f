use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use serde::Deserialize;
use tracing::warn;

use super::prompts::DIAGRAM_TOOL_NAME;
use crate::error::{RagError, Result};
use crate::llm::ToolInvocation;

/// Format suffix the presentation layer appends to request a raster image.
pub const WEBP_SUFFIX: &str = "?type=webp";

/// The tool invocations found in one model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCalls {
    None,
    One(ToolInvocation),
    Many(Vec<ToolInvocation>),
}

impl From<Vec<ToolInvocation>> for ToolCalls {
    fn from(mut calls: Vec<ToolInvocation>) -> Self {
        match calls.len() {
            0 => ToolCalls::None,
            1 => ToolCalls::One(calls.remove(0)),
            _ => ToolCalls::Many(calls),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DiagramArguments {
    graph: String,
}

/// A rendered diagram: the mermaid source and the image URL built from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagram {
    pub graph: String,
    pub url: String,
}

impl Diagram {
    pub fn webp_url(&self) -> String {
        format!("{}{}", self.url, WEBP_SUFFIX)
    }
}

/// Pull the `graph` argument out of the model's tool calls.
///
/// No call is `NoDiagram`. With several calls the first diagram call wins;
/// if none of them is a diagram call the first one is reported as unexpected.
pub fn extract_graph(calls: ToolCalls) -> Result<String> {
    let call = match calls {
        ToolCalls::None => return Err(RagError::NoDiagram),
        ToolCalls::One(call) => call,
        ToolCalls::Many(mut calls) => {
            let total = calls.len();
            let pos = calls
                .iter()
                .position(|c| c.name == DIAGRAM_TOOL_NAME)
                .unwrap_or(0);
            let call = calls.swap_remove(pos);
            warn!(total, used = %call.id, "Model made several tool calls; using the first diagram call");
            call
        }
    };

    if call.name != DIAGRAM_TOOL_NAME {
        return Err(RagError::UnexpectedTool(call.name));
    }

    let args: DiagramArguments = serde_json::from_str(&call.arguments)
        .map_err(|e| RagError::InvalidToolArguments(e.to_string()))?;
    if args.graph.trim().is_empty() {
        return Err(RagError::InvalidToolArguments("graph is empty".to_string()));
    }
    Ok(args.graph)
}

/// Image URL for a mermaid graph: `base_url` followed by the URL-safe base64
/// of the graph's UTF-8 bytes. Nothing is fetched.
pub fn mermaid_url(base_url: &str, graph: &str) -> String {
    format!("{}{}", base_url, URL_SAFE.encode(graph.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BASE: &str = "https://mermaid.ink/img/";

    fn call(name: &str, arguments: &str) -> ToolInvocation {
        ToolInvocation {
            id: format!("call_{}", name),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[test]
    fn test_tool_calls_from_vec() {
        assert_eq!(ToolCalls::from(vec![]), ToolCalls::None);
        assert!(matches!(
            ToolCalls::from(vec![call("mermaid_url", "{}")]),
            ToolCalls::One(_)
        ));
        assert!(matches!(
            ToolCalls::from(vec![call("a", "{}"), call("b", "{}")]),
            ToolCalls::Many(ref v) if v.len() == 2
        ));
    }

    #[test]
    fn test_extract_graph_none_is_no_diagram() {
        assert!(matches!(extract_graph(ToolCalls::None), Err(RagError::NoDiagram)));
    }

    #[test]
    fn test_extract_graph_one() {
        let graph = extract_graph(ToolCalls::One(call(
            "mermaid_url",
            r#"{"graph":"graph TD; EDEN-->Maps"}"#,
        )))
        .unwrap();
        assert_eq!(graph, "graph TD; EDEN-->Maps");
    }

    #[test]
    fn test_extract_graph_many_uses_first_diagram_call() {
        let graph = extract_graph(ToolCalls::Many(vec![
            call("lookup", "{}"),
            call("mermaid_url", r#"{"graph":"first"}"#),
            call("mermaid_url", r#"{"graph":"second"}"#),
        ]))
        .unwrap();
        assert_eq!(graph, "first");
    }

    #[test]
    fn test_extract_graph_many_without_diagram_call() {
        match extract_graph(ToolCalls::Many(vec![call("a", "{}"), call("b", "{}")])) {
            Err(RagError::UnexpectedTool(name)) => assert_eq!(name, "a"),
            other => panic!("expected UnexpectedTool, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_graph_wrong_tool() {
        match extract_graph(ToolCalls::One(call("weather", r#"{"graph":"x"}"#))) {
            Err(RagError::UnexpectedTool(name)) => assert_eq!(name, "weather"),
            other => panic!("expected UnexpectedTool, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_graph_bad_arguments() {
        for args in ["not json", r#"{"diagram":"x"}"#, r#"{"graph":42}"#, r#"{"graph":"  "}"#] {
            assert!(
                matches!(
                    extract_graph(ToolCalls::One(call("mermaid_url", args))),
                    Err(RagError::InvalidToolArguments(_))
                ),
                "arguments {:?} should be rejected",
                args
            );
        }
    }

    #[test]
    fn test_mermaid_url_known_value() {
        // "graph TD" -> Z3JhcGggVEQ=
        assert_eq!(mermaid_url(BASE, "graph TD"), "https://mermaid.ink/img/Z3JhcGggVEQ=");
        assert_eq!(mermaid_url(BASE, ""), "https://mermaid.ink/img/");
    }

    #[test]
    fn test_mermaid_url_is_url_safe() {
        // U+FBFF is EF AF BF, which is "76+/" in standard base64
        let url = mermaid_url(BASE, "\u{fbff}");
        let encoded = url.strip_prefix(BASE).unwrap();
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
    }

    #[test]
    fn test_webp_url() {
        let diagram = Diagram {
            graph: "graph TD".to_string(),
            url: mermaid_url(BASE, "graph TD"),
        };
        assert_eq!(diagram.webp_url(), "https://mermaid.ink/img/Z3JhcGggVEQ=?type=webp");
    }

    proptest! {
        #[test]
        fn mermaid_url_round_trips(graph in any::<String>()) {
            let url = mermaid_url(BASE, &graph);
            let encoded = url.strip_prefix(BASE).unwrap();
            let decoded = URL_SAFE.decode(encoded).unwrap();
            prop_assert_eq!(decoded, graph.as_bytes().to_vec());
        }

        #[test]
        fn mermaid_url_is_deterministic(graph in any::<String>()) {
            prop_assert_eq!(mermaid_url(BASE, &graph), mermaid_url(BASE, &graph));
        }
    }
}
