use serde_json::Value;

use crate::analyzer::{
    calculate_confidence, calculate_context_match, detect_issue_type, detect_urgency_level,
    fuzzy_match, ESCALATION_CONFIDENCE_FLOOR,
};
use crate::lexicon;
use crate::types::{DetectedEntities, Intent, IntentAnalysis, IssueType, UrgencyLevel};

/// Keyword match on an explicit human-agent request is treated as
/// unambiguous evidence, bypassing the scored path.
pub const HUMAN_AGENT_CONFIDENCE: f64 = 0.95;

/// Candidate intents in trial order. Ties keep the earlier winner, so
/// the order matters for reproducibility.
const TRIAL_ORDER: [Intent; 3] = [
    Intent::SupportRequest,
    Intent::OrderPlacement,
    Intent::GeneralQuery,
];

pub fn contains_human_agent_keyword(message: &str) -> bool {
    let lower = message.to_lowercase();
    lexicon::HUMAN_AGENT_KEYWORDS
        .iter()
        .any(|k| lower.contains(k))
}

/// Escalation clauses in reason priority order: low confidence, high
/// urgency, support complexity, then the generic fallback.
fn escalation_reason(intent: Intent, confidence: f64, urgency: UrgencyLevel) -> Option<String> {
    let low_confidence = confidence < ESCALATION_CONFIDENCE_FLOOR;
    let high_urgency = urgency == UrgencyLevel::High;
    let support_complexity = intent == Intent::SupportRequest && urgency != UrgencyLevel::Low;
    if !(low_confidence || high_urgency || support_complexity) {
        return None;
    }

    let reason = if low_confidence {
        "Low confidence in automated classification"
    } else if high_urgency {
        "High urgency issue detected"
    } else if support_complexity {
        "Support request requires human attention"
    } else {
        "Requires verification"
    };
    Some(reason.to_string())
}

/// Classifies one inbound message. Pure: identical inputs always yield
/// identical output, and a syntactically valid string never errors.
pub fn analyze_intent(
    message: &str,
    kb_context: Option<&str>,
    previous_messages: &[String],
) -> IntentAnalysis {
    if contains_human_agent_keyword(message) {
        return IntentAnalysis {
            intent: Intent::HumanAgentRequest,
            confidence: HUMAN_AGENT_CONFIDENCE,
            requires_escalation: true,
            escalation_reason: Some("explicit human agent request".to_string()),
            detected_entities: DetectedEntities {
                product_mentions: Vec::new(),
                issue_type: detect_issue_type(message),
                urgency_level: UrgencyLevel::High,
                order_info: None,
            },
            response: None,
        };
    }

    let context_match = kb_context
        .filter(|c| !c.trim().is_empty())
        .map(|c| calculate_context_match(message, c));

    let mut winner = Intent::GeneralQuery;
    let mut best_confidence = 0.0_f64;
    let mut any_keyword_evidence = false;
    let mut first = true;
    for intent in TRIAL_ORDER {
        if fuzzy_match(message, lexicon::intent_keywords(intent)) > 0.0 {
            any_keyword_evidence = true;
        }
        let confidence = calculate_confidence(message, intent, context_match, previous_messages);
        if first || confidence > best_confidence {
            winner = intent;
            best_confidence = confidence;
            first = false;
        }
    }
    // No lexical evidence anywhere reads as a general query, not as
    // whichever candidate happened to be tried first.
    if !any_keyword_evidence {
        winner = Intent::GeneralQuery;
        best_confidence =
            calculate_confidence(message, Intent::GeneralQuery, context_match, previous_messages);
    }

    let urgency = detect_urgency_level(message);
    let issue_type = detect_issue_type(message);
    let reason = escalation_reason(winner, best_confidence, urgency);

    IntentAnalysis {
        intent: winner,
        confidence: best_confidence,
        requires_escalation: reason.is_some(),
        escalation_reason: reason,
        detected_entities: DetectedEntities {
            product_mentions: Vec::new(),
            issue_type,
            urgency_level: urgency,
            order_info: None,
        },
        response: None,
    }
}

/// Fixed substitute when a delegated model returns a payload that
/// fails validation. The user must always get some reply.
pub fn default_analysis() -> IntentAnalysis {
    IntentAnalysis {
        intent: Intent::GeneralQuery,
        confidence: 0.5,
        requires_escalation: false,
        escalation_reason: None,
        detected_entities: DetectedEntities::default(),
        response: None,
    }
}

fn field<'a>(value: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    value.get(camel).or_else(|| value.get(snake))
}

/// Field-by-field validation of a model-supplied analysis. Returns
/// None when any required field is missing or outside its closed set;
/// the caller substitutes `default_analysis`.
pub fn validate_intent_analysis(value: &Value) -> Option<IntentAnalysis> {
    let obj = value.as_object()?;

    let intent = Intent::parse(obj.get("intent")?.as_str()?)?;
    let confidence = obj.get("confidence")?.as_f64()?;
    if !confidence.is_finite() {
        return None;
    }
    let confidence = confidence.clamp(0.0, 1.0);
    let mut requires_escalation =
        field(value, "requiresEscalation", "requires_escalation")?.as_bool()?;

    let mut product_mentions = Vec::new();
    let mut issue_type = None;
    let mut urgency_level = UrgencyLevel::Low;
    let mut order_info = None;
    if let Some(entities) = field(value, "detectedEntities", "detected_entities") {
        if !entities.is_object() {
            return None;
        }
        if let Some(mentions) = field(entities, "productMentions", "product_mentions") {
            let items = mentions.as_array()?;
            for item in items {
                product_mentions.push(item.as_str()?.to_string());
            }
        }
        if let Some(raw) = field(entities, "issueType", "issue_type") {
            if !raw.is_null() {
                issue_type = Some(IssueType::parse(raw.as_str()?)?);
            }
        }
        if let Some(raw) = field(entities, "urgencyLevel", "urgency_level") {
            urgency_level = UrgencyLevel::parse(raw.as_str()?)?;
        }
        if let Some(raw) = field(entities, "orderInfo", "order_info") {
            if !raw.is_null() {
                order_info = Some(serde_json::from_value(raw.clone()).ok()?);
            }
        }
    }

    // The flag is derived, not model-chosen: an explicit agent request,
    // high urgency, or a non-trivial support request escalates no
    // matter what the payload claimed.
    if intent == Intent::HumanAgentRequest
        || urgency_level == UrgencyLevel::High
        || (intent == Intent::SupportRequest && urgency_level != UrgencyLevel::Low)
    {
        requires_escalation = true;
    }

    // The reason rides with the flag: dropped when escalation is off,
    // synthesized when the flag is on without one.
    let escalation_reason = if requires_escalation {
        field(value, "escalationReason", "escalation_reason")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                if intent == Intent::HumanAgentRequest {
                    Some("explicit human agent request".to_string())
                } else {
                    escalation_reason(intent, confidence, urgency_level)
                }
            })
            .or_else(|| Some("Requires verification".to_string()))
    } else {
        None
    };

    let response = obj
        .get("response")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    Some(IntentAnalysis {
        intent,
        confidence,
        requires_escalation,
        escalation_reason,
        detected_entities: DetectedEntities {
            product_mentions,
            issue_type,
            urgency_level,
            order_info,
        },
        response,
    })
}

/// Pulls an analysis out of raw model text, tolerating code fences and
/// surrounding prose around the JSON object.
pub fn parse_intent_analysis_from_text(raw: &str) -> Option<IntentAnalysis> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut candidates = Vec::<String>::new();
    candidates.push(trimmed.to_string());

    if trimmed.starts_with("```") {
        let stripped = trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
            .to_string();
        if !stripped.is_empty() {
            candidates.push(stripped);
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            candidates.push(trimmed[start..=end].to_string());
        }
    }

    for candidate in candidates {
        let Ok(parsed) = serde_json::from_str::<Value>(&candidate) else {
            continue;
        };
        if let Some(analysis) = validate_intent_analysis(&parsed) {
            return Some(analysis);
        }
    }

    None
}
