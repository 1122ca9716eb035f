use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::RetrievedDocument;

/// A citation as the model produced it. `source_id` is signed so that
/// out-of-range values survive parsing and can be reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub source_id: i64,
    pub quote: String,
}

/// Structured answer returned by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotedAnswer {
    pub answer: String,
    pub citations: Vec<Citation>,
}

/// A citation that passed the referential checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCitation {
    /// Index into the retrieval result the answer was generated from.
    pub source_id: usize,
    pub quote: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CitationIssue {
    OutOfRange { source_id: i64, available: usize },
    EmptyQuote { source_id: usize },
    QuoteNotFound { source_id: usize, quote: String },
}

impl fmt::Display for CitationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CitationIssue::OutOfRange {
                source_id,
                available,
            } => write!(
                f,
                "source {} does not exist ({} sources available)",
                source_id, available
            ),
            CitationIssue::EmptyQuote { source_id } => {
                write!(f, "citation of source {} has an empty quote", source_id)
            }
            CitationIssue::QuoteNotFound { source_id, quote } => {
                write!(f, "quote not found in source {}: \"{}\"", source_id, quote)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Every citation resolved to a verbatim quote.
    Verified,
    /// At least one citation was dropped.
    Unverified,
}

/// Answer text plus only the citations that hold up against the sources.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedAnswer {
    pub text: String,
    pub citations: Vec<ResolvedCitation>,
    pub issues: Vec<CitationIssue>,
}

impl VerifiedAnswer {
    /// Answer with no sources to cite.
    pub fn unsupported(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            citations: vec![],
            issues: vec![],
        }
    }

    pub fn verification(&self) -> Verification {
        if self.issues.is_empty() {
            Verification::Verified
        } else {
            Verification::Unverified
        }
    }
}

/// Check one citation against the source contents, indexed by source id.
pub fn check_citation(
    citation: &Citation,
    contents: &[&str],
) -> Result<ResolvedCitation, CitationIssue> {
    let source_id = usize::try_from(citation.source_id)
        .ok()
        .filter(|&i| i < contents.len())
        .ok_or(CitationIssue::OutOfRange {
            source_id: citation.source_id,
            available: contents.len(),
        })?;

    let quote = citation.quote.trim();
    if quote.is_empty() {
        return Err(CitationIssue::EmptyQuote { source_id });
    }
    if !contents[source_id].contains(quote) {
        return Err(CitationIssue::QuoteNotFound {
            source_id,
            quote: quote.to_string(),
        });
    }

    Ok(ResolvedCitation {
        source_id,
        quote: quote.to_string(),
    })
}

/// Validate every citation against `contents`, dropping the ones that fail.
pub fn verify_against(answer: QuotedAnswer, contents: &[&str]) -> VerifiedAnswer {
    let mut citations = Vec::new();
    let mut issues = Vec::new();

    for citation in &answer.citations {
        match check_citation(citation, contents) {
            Ok(resolved) => citations.push(resolved),
            Err(issue) => {
                warn!(%issue, "Dropping citation");
                issues.push(issue);
            }
        }
    }

    VerifiedAnswer {
        text: answer.answer,
        citations,
        issues,
    }
}

pub fn verify(answer: QuotedAnswer, docs: &[RetrievedDocument]) -> VerifiedAnswer {
    let contents: Vec<&str> = docs.iter().map(|d| d.document.content.as_str()).collect();
    verify_against(answer, &contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn answer(citations: Vec<(i64, &str)>) -> QuotedAnswer {
        QuotedAnswer {
            answer: "EDEN maps informal settlements.".to_string(),
            citations: citations
                .into_iter()
                .map(|(source_id, quote)| Citation {
                    source_id,
                    quote: quote.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_valid_citation_resolves() {
        let verified = verify_against(
            answer(vec![(0, "a mapping project")]),
            &["EDEN is a mapping project."],
        );
        assert_eq!(verified.verification(), Verification::Verified);
        assert_eq!(
            verified.citations,
            vec![ResolvedCitation {
                source_id: 0,
                quote: "a mapping project".to_string()
            }]
        );
    }

    #[test]
    fn test_out_of_range_dropped() {
        let verified = verify_against(answer(vec![(3, "x"), (-1, "x")]), &["x"]);
        assert!(verified.citations.is_empty());
        assert_eq!(verified.verification(), Verification::Unverified);
        assert_eq!(
            verified.issues[0],
            CitationIssue::OutOfRange {
                source_id: 3,
                available: 1
            }
        );
        assert_eq!(
            verified.issues[1],
            CitationIssue::OutOfRange {
                source_id: -1,
                available: 1
            }
        );
    }

    #[test]
    fn test_paraphrased_quote_dropped() {
        let verified = verify_against(
            answer(vec![(0, "EDEN maps places"), (0, "mapping project")]),
            &["EDEN is a mapping project."],
        );
        assert_eq!(verified.citations.len(), 1);
        assert!(matches!(
            verified.issues[0],
            CitationIssue::QuoteNotFound { source_id: 0, .. }
        ));
    }

    #[test]
    fn test_empty_quote_dropped() {
        let verified = verify_against(answer(vec![(0, "   ")]), &["anything"]);
        assert_eq!(verified.issues, vec![CitationIssue::EmptyQuote { source_id: 0 }]);
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        let verified = verify_against(answer(vec![(0, "  mapping project\n")]), &["a mapping project"]);
        assert_eq!(verified.verification(), Verification::Verified);
        assert_eq!(verified.citations[0].quote, "mapping project");
    }

    #[test]
    fn test_no_sources_rejects_every_citation() {
        let verified = verify_against(answer(vec![(0, "x")]), &[]);
        assert!(verified.citations.is_empty());
        assert_eq!(verified.issues.len(), 1);
    }

    #[test]
    fn test_issue_display() {
        let issue = CitationIssue::OutOfRange {
            source_id: 7,
            available: 2,
        };
        assert_eq!(issue.to_string(), "source 7 does not exist (2 sources available)");
    }

    #[test]
    fn test_quoted_answer_parses_model_json() {
        let parsed: QuotedAnswer = serde_json::from_str(
            r#"{"answer":"EDEN is a mapping project.","citations":[{"source_id":0,"quote":"mapping"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.citations[0].source_id, 0);
    }

    proptest! {
        #[test]
        fn kept_citations_are_always_in_range(
            n in 0usize..8,
            ids in proptest::collection::vec(-5i64..15, 0..12),
        ) {
            let contents: Vec<String> = (0..n).map(|i| format!("source {} text", i)).collect();
            let refs: Vec<&str> = contents.iter().map(|s| s.as_str()).collect();
            let citations: Vec<Citation> = ids
                .iter()
                .map(|&id| Citation { source_id: id, quote: "text".to_string() })
                .collect();
            let expected_kept = ids.iter().filter(|&&id| id >= 0 && (id as usize) < n).count();

            let verified = verify_against(
                QuotedAnswer { answer: "a".to_string(), citations },
                &refs,
            );

            prop_assert_eq!(verified.citations.len(), expected_kept);
            prop_assert_eq!(verified.issues.len(), ids.len() - expected_kept);
            for c in &verified.citations {
                prop_assert!(c.source_id < n);
            }
            for issue in &verified.issues {
                let is_out_of_range = matches!(issue, CitationIssue::OutOfRange { .. });
                prop_assert!(is_out_of_range);
            }
        }

        #[test]
        fn substrings_of_source_always_verify(
            content in "[a-zA-Z ]{1,40}",
            start in 0usize..40,
            len in 1usize..40,
        ) {
            let start = start.min(content.len() - 1);
            let end = (start + len).min(content.len());
            let quote = &content[start..end];
            prop_assume!(!quote.trim().is_empty());

            let verified = verify_against(
                QuotedAnswer {
                    answer: "a".to_string(),
                    citations: vec![Citation { source_id: 0, quote: quote.to_string() }],
                },
                &[content.as_str()],
            );
            prop_assert_eq!(verified.verification(), Verification::Verified);
        }
    }
}
