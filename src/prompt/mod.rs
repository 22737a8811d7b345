//! Prompt Assembler: turns retrieved chunks, recent conversation history
//! and the current query into the completion request sent to the
//! Completion Client.
//!
//! Mirrors the teacher's `agent::prompt::PromptSet::load` template
//! resolution (explicit path -> environment variable -> compiled-in
//! default) for the system preamble, and its `build_primary_prompt`
//! fenced-context-block layout for retrieved passages, generalized from a
//! single subcall's context list to ranked, citation-tagged chunks plus
//! conversation history.

use std::path::{Path, PathBuf};

use crate::core::{Conversation, Role, ScoredChunk, Turn};

/// Environment variable naming a directory that may override the
/// compiled-in system preamble template.
pub const PROMPT_DIR_ENV: &str = "FUND_RAG_PROMPT_DIR";

/// Compiled-in default system preamble.
pub const DEFAULT_SYSTEM_PREAMBLE: &str = include_str!("system_preamble.txt");

/// Default number of most-recent conversation turns included in a prompt.
pub const DEFAULT_HISTORY_TURNS: usize = 6;

/// Default prompt token budget, used when a model-specific override is not
/// configured.
pub const DEFAULT_MAX_PROMPT_TOKENS: usize = 6000;

/// Estimates a token count as `ceil(character_count / 4)`, the
/// budget-enforcement heuristic used throughout this crate. Not used for
/// billing.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// The system preamble template, loaded once at startup.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    system_preamble: String,
}

impl PromptTemplate {
    /// Loads the system preamble, preferring `explicit_dir/system_preamble.txt`,
    /// then `$FUND_RAG_PROMPT_DIR/system_preamble.txt`, then the compiled-in
    /// default.
    #[must_use]
    pub fn load(explicit_dir: Option<&Path>) -> Self {
        let system_preamble = Self::resolve(explicit_dir).unwrap_or_else(|| DEFAULT_SYSTEM_PREAMBLE.to_string());
        Self { system_preamble }
    }

    /// The compiled-in default template, skipping filesystem resolution.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            system_preamble: DEFAULT_SYSTEM_PREAMBLE.to_string(),
        }
    }

    fn resolve(explicit_dir: Option<&Path>) -> Option<String> {
        if let Some(dir) = explicit_dir {
            let path = dir.join("system_preamble.txt");
            if let Ok(text) = std::fs::read_to_string(&path) {
                return Some(text);
            }
        }
        if let Ok(dir) = std::env::var(PROMPT_DIR_ENV) {
            let path = PathBuf::from(dir).join("system_preamble.txt");
            if let Ok(text) = std::fs::read_to_string(&path) {
                return Some(text);
            }
        }
        None
    }
}

/// Tunable parameters for assembly.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Most-recent conversation turns to include before truncation.
    pub history_turns: usize,
    /// Token budget the assembled prompt must fit within.
    pub max_prompt_tokens: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            history_turns: DEFAULT_HISTORY_TURNS,
            max_prompt_tokens: DEFAULT_MAX_PROMPT_TOKENS,
        }
    }
}

/// The assembled prompt, ready to send to the Completion Client, plus a
/// record of what (if anything) had to be dropped to fit the token budget.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssembledPrompt {
    /// Full prompt text (system preamble + chunk context + history + query).
    pub text: String,
    /// Number of chunks actually included, in rank order (may be fewer
    /// than were retrieved if the budget forced truncation).
    pub chunks_included: usize,
    /// Number of history turns actually included.
    pub history_turns_included: usize,
    /// Whether the system preamble itself had to be truncated (last
    /// resort; should be rare in practice).
    pub preamble_truncated: bool,
}

/// Assembles a prompt from retrieved chunks, conversation history and the
/// current query.
///
/// Truncation order when the estimated token count exceeds
/// `config.max_prompt_tokens`: drop chunks from the end of the ranked list
/// (lowest rank first), then truncate the oldest conversation turns, and
/// only as a last resort truncate the system preamble. Deterministic given
/// its inputs and configuration (P7).
#[must_use]
pub fn assemble(
    template: &PromptTemplate,
    query: &str,
    chunks: &[ScoredChunk],
    conversation: Option<&Conversation>,
    config: &AssemblerConfig,
) -> AssembledPrompt {
    let mut chunks_included = chunks.len();
    let mut history: Vec<&Turn> = conversation
        .map(|c| c.recent(config.history_turns).iter().collect())
        .unwrap_or_default();

    loop {
        let rendered = render(
            &template.system_preamble,
            query,
            &chunks[..chunks_included],
            &history,
        );

        if estimate_tokens(&rendered) <= config.max_prompt_tokens {
            return AssembledPrompt {
                text: rendered,
                chunks_included,
                history_turns_included: history.len(),
                preamble_truncated: false,
            };
        }

        if chunks_included > 0 {
            chunks_included -= 1;
        } else if !history.is_empty() {
            history.remove(0);
        } else {
            break;
        }
    }

    // Last resort: the preamble itself still doesn't fit with zero chunks
    // and zero history. Truncate it to the remaining budget.
    let budget_chars = config.max_prompt_tokens.saturating_mul(4);
    let truncated_preamble: String = template.system_preamble.chars().take(budget_chars).collect();
    let rendered = render(&truncated_preamble, query, &[], &[]);

    AssembledPrompt {
        text: rendered,
        chunks_included: 0,
        history_turns_included: 0,
        preamble_truncated: true,
    }
}

fn render(preamble: &str, query: &str, chunks: &[ScoredChunk], history: &[&Turn]) -> String {
    let mut out = String::new();
    out.push_str(preamble.trim_end());
    out.push_str("\n\n");

    for scored in chunks {
        let chunk = &scored.chunk;
        let section_path = chunk.section_path.join(" > ");
        out.push_str(&format!(
            "[chunk {}] source=\"{}\" page={} section=\"{}\"\n{}\n\n",
            scored.rank,
            chunk.display_title(),
            chunk.page_number.map_or_else(|| "unknown".to_string(), |p| p.to_string()),
            section_path,
            chunk.content,
        ));
    }

    if !history.is_empty() {
        out.push_str("Conversation history:\n");
        for turn in history {
            out.push_str(&format!("{}: {}\n", turn.role, turn.text));
        }
        out.push('\n');
    }

    out.push_str("User query: ");
    out.push_str(query);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ComponentScores, StrategyTag};
    use crate::core::Chunk;

    fn sample_chunk(rank: usize, content: &str) -> ScoredChunk {
        let chunk = Chunk::new(1, rank, content.to_string())
            .with_headings(Some("Overview".to_string()), None, vec!["Fund Creation Guide".to_string()])
            .with_page_number(3);
        ScoredChunk {
            chunk,
            score: 0.9,
            rank,
            strategy: StrategyTag::Hybrid,
            component_scores: ComponentScores::default(),
        }
    }

    #[test]
    fn test_assemble_includes_query_and_chunks() {
        let template = PromptTemplate::defaults();
        let chunks = vec![sample_chunk(1, "To create a fund, submit form FC-1.")];
        let config = AssemblerConfig::default();
        let assembled = assemble(&template, "How do I create a fund?", &chunks, None, &config);

        assert!(assembled.text.contains("[chunk 1]"));
        assert!(assembled.text.contains("Fund Creation Guide"));
        assert!(assembled.text.contains("How do I create a fund?"));
        assert_eq!(assembled.chunks_included, 1);
        assert!(!assembled.preamble_truncated);
    }

    #[test]
    fn test_assemble_includes_recent_history() {
        let template = PromptTemplate::defaults();
        let mut conversation = Conversation::new("s1".to_string());
        conversation.push(Turn::new(Role::User, "What is a fund?".to_string()));
        conversation.push(Turn::new(Role::Assistant, "A fund is a pooled investment vehicle.".to_string()));
        let config = AssemblerConfig::default();
        let assembled = assemble(&template, "How do I create one?", &[], Some(&conversation), &config);

        assert!(assembled.text.contains("user: What is a fund?"));
        assert_eq!(assembled.history_turns_included, 2);
    }

    #[test]
    fn test_budget_drops_lowest_ranked_chunk_first() {
        let template = PromptTemplate::defaults();
        let long_content = "word ".repeat(2000);
        let chunks = vec![
            sample_chunk(1, "high priority content"),
            sample_chunk(2, &long_content),
        ];
        let config = AssemblerConfig {
            max_prompt_tokens: 50,
            ..AssemblerConfig::default()
        };
        let assembled = assemble(&template, "query", &chunks, None, &config);
        assert!(assembled.chunks_included < 2);
    }

    #[test]
    fn test_determinism() {
        let template = PromptTemplate::defaults();
        let chunks = vec![sample_chunk(1, "content")];
        let config = AssemblerConfig::default();
        let a = assemble(&template, "q", &chunks, None, &config);
        let b = assemble(&template, "q", &chunks, None, &config);
        assert_eq!(a, b);
    }

    #[test]
    fn test_token_estimate() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(""), 0);
    }
}
