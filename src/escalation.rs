use crate::types::{Intent, IntentAnalysis, TicketIntentType, TicketPriority, UrgencyLevel};

/// Pure decision: does this analysis warrant a ticket. Reproducible
/// from the analysis alone, no hidden state.
pub fn should_create_ticket(analysis: &IntentAnalysis) -> bool {
    analysis.requires_escalation
        || analysis.intent == Intent::HumanAgentRequest
        || (analysis.intent == Intent::SupportRequest
            && analysis.detected_entities.urgency_level == UrgencyLevel::High)
}

pub fn ticket_priority(analysis: &IntentAnalysis) -> TicketPriority {
    if analysis.intent == Intent::HumanAgentRequest
        || analysis.detected_entities.urgency_level == UrgencyLevel::High
    {
        TicketPriority::High
    } else if analysis.detected_entities.urgency_level == UrgencyLevel::Medium {
        TicketPriority::Medium
    } else {
        TicketPriority::Low
    }
}

pub fn ticket_type(analysis: &IntentAnalysis) -> TicketIntentType {
    match analysis.intent {
        Intent::OrderPlacement => TicketIntentType::Order,
        Intent::HumanAgentRequest => TicketIntentType::Request,
        _ => TicketIntentType::Support,
    }
}

pub fn ticket_title(analysis: &IntentAnalysis) -> String {
    if analysis.intent == Intent::HumanAgentRequest {
        return "Human Agent Request".to_string();
    }
    match analysis.detected_entities.issue_type {
        Some(issue) => {
            let name = issue.as_str();
            let mut chars = name.chars();
            let capitalized = match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            };
            format!("{capitalized} Support Request")
        }
        None => "Support Request".to_string(),
    }
}

/// Advisory checklist for the human agent picking the ticket up. Text
/// only; nothing here is executed by the system.
pub fn required_actions(analysis: &IntentAnalysis, has_kb_context: bool) -> Vec<String> {
    let mut actions = Vec::new();
    if analysis.requires_escalation || analysis.intent == Intent::HumanAgentRequest {
        actions.push("Escalate to human agent".to_string());
    }
    if analysis.intent == Intent::OrderPlacement {
        actions.push("Verify order details".to_string());
        actions.push("Check inventory availability".to_string());
    }
    if has_kb_context {
        actions.push("Review related knowledge base articles".to_string());
    }
    if let Some(issue) = analysis.detected_entities.issue_type {
        actions.push(format!("Check {} documentation", issue.as_str()));
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DetectedEntities, IssueType};

    fn analysis(intent: Intent, urgency: UrgencyLevel, escalate: bool) -> IntentAnalysis {
        IntentAnalysis {
            intent,
            confidence: 0.8,
            requires_escalation: escalate,
            escalation_reason: escalate.then(|| "test".to_string()),
            detected_entities: DetectedEntities {
                urgency_level: urgency,
                ..DetectedEntities::default()
            },
            response: None,
        }
    }

    #[test]
    fn human_agent_request_always_gets_a_ticket() {
        let a = analysis(Intent::HumanAgentRequest, UrgencyLevel::High, true);
        assert!(should_create_ticket(&a));
        assert_eq!(ticket_priority(&a), TicketPriority::High);
        assert_eq!(ticket_type(&a), TicketIntentType::Request);
        assert_eq!(ticket_title(&a), "Human Agent Request");
    }

    #[test]
    fn high_urgency_support_gets_a_ticket_even_without_the_flag() {
        let a = analysis(Intent::SupportRequest, UrgencyLevel::High, false);
        assert!(should_create_ticket(&a));
        assert_eq!(ticket_priority(&a), TicketPriority::High);
        assert_eq!(ticket_type(&a), TicketIntentType::Support);
    }

    #[test]
    fn calm_general_query_gets_no_ticket() {
        let a = analysis(Intent::GeneralQuery, UrgencyLevel::Low, false);
        assert!(!should_create_ticket(&a));
        assert_eq!(ticket_priority(&a), TicketPriority::Low);
    }

    #[test]
    fn medium_urgency_maps_to_medium_priority() {
        let a = analysis(Intent::SupportRequest, UrgencyLevel::Medium, true);
        assert_eq!(ticket_priority(&a), TicketPriority::Medium);
    }

    #[test]
    fn title_includes_detected_issue_type() {
        let mut a = analysis(Intent::SupportRequest, UrgencyLevel::Medium, true);
        a.detected_entities.issue_type = Some(IssueType::Billing);
        assert_eq!(ticket_title(&a), "Billing Support Request");

        a.detected_entities.issue_type = None;
        assert_eq!(ticket_title(&a), "Support Request");
    }

    #[test]
    fn decisions_are_deterministic() {
        let a = analysis(Intent::SupportRequest, UrgencyLevel::High, true);
        for _ in 0..3 {
            assert_eq!(should_create_ticket(&a), should_create_ticket(&a));
            assert_eq!(ticket_priority(&a), ticket_priority(&a));
            assert_eq!(ticket_type(&a), ticket_type(&a));
            assert_eq!(ticket_title(&a), ticket_title(&a));
        }
    }

    #[test]
    fn required_actions_cover_order_and_issue_context() {
        let mut a = analysis(Intent::OrderPlacement, UrgencyLevel::Low, true);
        a.detected_entities.issue_type = Some(IssueType::Product);
        let actions = required_actions(&a, true);
        assert_eq!(
            actions,
            vec![
                "Escalate to human agent",
                "Verify order details",
                "Check inventory availability",
                "Review related knowledge base articles",
                "Check product documentation",
            ]
        );
    }
}
