use std::collections::HashSet;

use crate::lexicon;
use crate::types::{Intent, IssueType, UrgencyLevel};

/// Confidence below this floor forces escalation (see classifier).
pub const ESCALATION_CONFIDENCE_FLOOR: f64 = 0.7;

/// Minimum best-category score for an issue type to be reported at all.
const ISSUE_TYPE_FLOOR: f64 = 0.5;

/// Near-match credit awarded when a token is within typo tolerance of
/// a keyword but the keyword never appears verbatim.
const NEAR_MATCH_CREDIT: f64 = 0.5;
const NEAR_MATCH_SIMILARITY: f64 = 0.9;

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Counts keyword occurrences in `text` with partial credit for small
/// typos. Exact (substring) hits score 1.0 each and accumulate across
/// repeats; a single-token keyword with no exact hit scores 0.5 when
/// some message token is within Jaro-Winkler 0.9 of it. The result is
/// uncapped.
pub fn fuzzy_match(text: &str, keywords: &[&str]) -> f64 {
    let lower = text.to_lowercase();
    let tokens = tokenize(&lower);
    let mut score = 0.0;
    for keyword in keywords {
        let exact = lower.matches(keyword).count();
        if exact > 0 {
            score += exact as f64;
            continue;
        }
        if keyword.contains(' ') {
            continue;
        }
        let near = tokens
            .iter()
            .any(|token| strsim::jaro_winkler(token, keyword) >= NEAR_MATCH_SIMILARITY);
        if near {
            score += NEAR_MATCH_CREDIT;
        }
    }
    score
}

/// Lexical overlap between a message and retrieved context: 0.6 x the
/// share of message words found in the context plus 0.4 x the Jaccard
/// common-word fraction. Returns 0 when either side is empty.
pub fn calculate_context_match(message: &str, context: &str) -> f64 {
    let message_words: HashSet<String> = tokenize(message).into_iter().collect();
    let context_words: HashSet<String> = tokenize(context).into_iter().collect();
    if message_words.is_empty() || context_words.is_empty() {
        return 0.0;
    }

    let common = message_words.intersection(&context_words).count() as f64;
    let coverage = common / message_words.len() as f64;
    let union = message_words.union(&context_words).count() as f64;
    let jaccard = common / union;

    (0.6 * coverage + 0.4 * jaccard).clamp(0.0, 1.0)
}

fn message_complexity(message: &str) -> f64 {
    let words: Vec<&str> = message.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let total: usize = words.iter().map(|w| w.chars().count()).sum();
    let average = total as f64 / words.len() as f64;
    (average / 10.0).min(1.0)
}

fn word_count(message: &str) -> usize {
    message.split_whitespace().count()
}

fn has_issue_keyword(lower: &str) -> bool {
    lexicon::ALL_ISSUE_TYPES
        .iter()
        .any(|issue| fuzzy_match(lower, lexicon::issue_type_keywords(*issue)) > 0.0)
}

/// Confidence that `message` carries `intent`, in [0,1].
///
/// Weighted mean over the factors that are actually available: keyword
/// match (0.4) and message complexity (0.15) always; context relevance
/// (0.3) only when context was supplied; history (0.15) only when
/// prior messages exist. Dividing by the present weight keeps a clean
/// no-context query from being starved of the unreachable 0.45.
/// Complexity is pinned at 1.0 once the keyword component saturates,
/// so extra matching keywords never lower the total.
/// Post-adjustments: +0.3 for a human-agent keyword under
/// HUMAN_AGENT_REQUEST, x0.7 under three words, +0.1 when any
/// issue-type keyword is present.
pub fn calculate_confidence(
    message: &str,
    intent: Intent,
    context_match: Option<f64>,
    previous_messages: &[String],
) -> f64 {
    let keywords = lexicon::intent_keywords(intent);
    let keyword_component = (fuzzy_match(message, keywords) / 2.0).min(1.0);

    // Appending a short matching keyword dilutes the average word
    // length; pinning keeps confidence non-decreasing in matches.
    let complexity = if keyword_component >= 1.0 {
        1.0
    } else {
        message_complexity(message)
    };

    let mut weighted = 0.4 * keyword_component + 0.15 * complexity;
    let mut total_weight = 0.55;

    if let Some(relevance) = context_match {
        weighted += 0.3 * relevance.clamp(0.0, 1.0);
        total_weight += 0.3;
    }

    if !previous_messages.is_empty() {
        let hits = previous_messages
            .iter()
            .filter(|m| fuzzy_match(m, keywords) > 0.0)
            .count();
        weighted += 0.15 * hits as f64 / previous_messages.len() as f64;
        total_weight += 0.15;
    }

    let mut confidence = weighted / total_weight;

    let lower = message.to_lowercase();
    if intent == Intent::HumanAgentRequest
        && lexicon::HUMAN_AGENT_KEYWORDS
            .iter()
            .any(|k| lower.contains(k))
    {
        confidence += 0.3;
    }
    if word_count(message) < 3 {
        confidence *= 0.7;
    }
    if has_issue_keyword(&lower) {
        confidence += 0.1;
    }

    confidence.clamp(0.0, 1.0)
}

/// High/medium require more than one keyword-equivalent signal; a lone
/// weak hit stays below the threshold.
pub fn detect_urgency_level(message: &str) -> UrgencyLevel {
    if fuzzy_match(message, lexicon::URGENCY_HIGH_KEYWORDS) > 1.0 {
        return UrgencyLevel::High;
    }
    if fuzzy_match(message, lexicon::URGENCY_MEDIUM_KEYWORDS) > 1.0 {
        return UrgencyLevel::Medium;
    }
    UrgencyLevel::Low
}

/// Best-scoring issue category, or None when even the best score is
/// weak or ambiguous.
pub fn detect_issue_type(message: &str) -> Option<IssueType> {
    let mut best: Option<(IssueType, f64)> = None;
    for issue in lexicon::ALL_ISSUE_TYPES {
        let score = fuzzy_match(message, lexicon::issue_type_keywords(*issue));
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((*issue, score)),
        }
    }
    best.filter(|(_, score)| *score > ISSUE_TYPE_FLOOR)
        .map(|(issue, _)| issue)
}
