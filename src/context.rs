//! Rendering ranked results into a character-budgeted context string
//!
//! Downstream prompt assembly relies on the hard budget: for a non-empty
//! result list the output never exceeds `max_chars` characters, separators
//! included. The empty-list sentinel is exempt and returned verbatim.

use crate::store::SearchResult;

/// Returned when there is nothing to ground on; exempt from the budget.
pub const NO_CONTEXT_SENTINEL: &str = "No relevant context found.";

const ELLIPSIS: &str = "...";

/// Character budget knobs for [`format_context`]
#[derive(Debug, Clone)]
pub struct ContextBudget {
    /// Hard ceiling on output length, in chars
    pub max_chars: usize,
    /// Stop formatting entirely once an entry's content budget drops to
    /// this or below; a tail of near-empty entries is worse than none
    pub min_entry_budget: usize,
    /// Extra margin reserved per entry on top of its header and newlines
    pub entry_overhead: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            max_chars: 4000,
            min_entry_budget: 100,
            entry_overhead: 10,
        }
    }
}

impl ContextBudget {
    pub fn with_max_chars(max_chars: usize) -> Self {
        Self {
            max_chars,
            ..Default::default()
        }
    }
}

/// Render results in rank order as `[rank. source_type] (score: x.xx)`
/// headers followed by content, blank-line separated, truncating with an
/// ellipsis where content outgrows its slice of the budget.
///
/// All accounting is in Unicode scalar counts, so multi-byte content cannot
/// split mid-character or blow the budget.
pub fn format_context(results: &[SearchResult], budget: &ContextBudget) -> String {
    if results.is_empty() {
        return NO_CONTEXT_SENTINEL.to_string();
    }

    let ellipsis_len = ELLIPSIS.chars().count();
    let mut parts: Vec<String> = Vec::new();
    let mut used = 0usize;

    for (idx, result) in results.iter().enumerate() {
        let header = format!(
            "[{}. {}] (score: {:.2})",
            idx + 1,
            result.source_type,
            result.final_score
        );
        let header_len = header.chars().count();
        let separator = usize::from(!parts.is_empty());

        // Two newlines per entry: after the header and after the content
        let reserved = used + separator + header_len + 2 + budget.entry_overhead;
        let available = budget.max_chars.saturating_sub(reserved);
        if available <= budget.min_entry_budget {
            break;
        }

        let content_len = result.content.chars().count();
        let content = if content_len > available {
            if available <= ellipsis_len {
                break;
            }
            let kept: String = result.content.chars().take(available - ellipsis_len).collect();
            format!("{kept}{ELLIPSIS}")
        } else {
            result.content.clone()
        };

        let entry = format!("{header}\n{content}\n");
        used += separator + entry.chars().count();
        parts.push(entry);
    }

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Metadata;

    fn result(id: i64, source_type: &str, content: &str, final_score: f32) -> SearchResult {
        SearchResult {
            id,
            content: content.to_string(),
            source_type: source_type.to_string(),
            source_id: format!("doc{id}.md"),
            metadata: Metadata::new(),
            bm25_score: 0.0,
            semantic_score: 0.0,
            final_score,
        }
    }

    #[test]
    fn test_empty_results_sentinel() {
        let results = vec![];
        assert_eq!(
            format_context(&results, &ContextBudget::default()),
            NO_CONTEXT_SENTINEL
        );
        // Sentinel is exempt from the budget, even a zero one
        assert_eq!(
            format_context(&results, &ContextBudget::with_max_chars(0)),
            NO_CONTEXT_SENTINEL
        );
    }

    #[test]
    fn test_entry_layout() {
        let results = vec![result(1, "business_doc", "Alpha content.", 0.875)];
        let out = format_context(&results, &ContextBudget::default());

        assert_eq!(out, "[1. business_doc] (score: 0.88)\nAlpha content.\n");
    }

    #[test]
    fn test_rank_order_and_separation() {
        let results = vec![
            result(1, "business_doc", "First.", 0.9),
            result(2, "business_doc", "Second.", 0.5),
        ];
        let out = format_context(&results, &ContextBudget::default());

        let first = out.find("[1. business_doc]").unwrap();
        let second = out.find("[2. business_doc]").unwrap();
        assert!(first < second);
        assert!(out.contains(".\n\n[2."));
    }

    #[test]
    fn test_truncation_with_ellipsis() {
        let long = "x".repeat(500);
        let results = vec![result(1, "doc", &long, 1.0)];
        let budget = ContextBudget {
            max_chars: 300,
            min_entry_budget: 100,
            entry_overhead: 10,
        };
        let out = format_context(&results, &budget);

        assert!(out.chars().count() <= 300);
        assert!(out.contains("..."));
        assert!(out.starts_with("[1. doc]"));
    }

    #[test]
    fn test_stops_when_budget_runs_dry() {
        let results = vec![
            result(1, "doc", &"a".repeat(200), 1.0),
            result(2, "doc", &"b".repeat(200), 0.9),
            result(3, "doc", &"c".repeat(200), 0.8),
        ];
        let budget = ContextBudget {
            max_chars: 280,
            min_entry_budget: 100,
            entry_overhead: 10,
        };
        let out = format_context(&results, &budget);

        // Second entry would get under min_entry_budget chars: dropped, and
        // nothing after it is attempted either
        assert!(out.contains("[1. doc]"));
        assert!(!out.contains("[2. doc]"));
        assert!(!out.contains("[3. doc]"));
    }

    #[test]
    fn test_never_exceeds_max_chars() {
        let results: Vec<SearchResult> = (0..12)
            .map(|i| result(i, "business_doc", &"word ".repeat(80), 1.0 - i as f32 * 0.05))
            .collect();

        for max_chars in [0, 1, 50, 120, 200, 500, 1000, 4000, 100_000] {
            let budget = ContextBudget {
                max_chars,
                min_entry_budget: 20,
                entry_overhead: 10,
            };
            let out = format_context(&results, &budget);
            assert!(
                out.chars().count() <= max_chars,
                "len {} > max_chars {}",
                out.chars().count(),
                max_chars
            );
        }
    }

    #[test]
    fn test_multibyte_content_respects_budget() {
        let results = vec![result(1, "doc", &"héllo wörld ünïcode ".repeat(30), 1.0)];
        let budget = ContextBudget {
            max_chars: 150,
            min_entry_budget: 50,
            entry_overhead: 10,
        };
        let out = format_context(&results, &budget);
        assert!(out.chars().count() <= 150);
        assert!(out.contains("..."));
    }

    #[test]
    fn test_min_entry_budget_is_configurable() {
        let results = vec![result(1, "doc", "short", 1.0)];
        let tight = ContextBudget {
            max_chars: 60,
            min_entry_budget: 200,
            entry_overhead: 10,
        };
        // Threshold larger than anything available: no entries at all
        assert_eq!(format_context(&results, &tight), "");
    }
}
