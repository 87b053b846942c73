use crate::classifier;
use crate::escalation;
use crate::orders::{self, OrderAdvance};
use crate::tickets::{materialize_ticket, TicketStore};
use crate::types::{
    now_iso, Intent, IntentAnalysis, OrderInfo, TicketCreationInfo, TicketDraft,
    TicketHistoryEntry, TicketStatus,
};

const CONTEXT_SNIPPET_MAX_CHARS: usize = 600;

/// Where the message came from, for ticket back-references.
pub struct InboundContext<'a> {
    pub conversation_id: &'a str,
    pub message_id: &'a str,
    pub platform: &'a str,
    pub customer_name: &'a str,
}

pub struct PipelineOutcome {
    pub analysis: IntentAnalysis,
    pub ticket_id: Option<i64>,
    pub ticket_info: Option<TicketCreationInfo>,
    pub reply: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrderEvent {
    ReadyToConfirm,
    Confirmed,
}

/// One webhook call = one run of this function. Pure decision logic
/// over `analysis` plus the persisted conversation/order/ticket rows;
/// safe to retry because every store write is keyed.
///
/// `delegated` carries a model-supplied analysis when classification
/// was handed to the LLM collaborator; otherwise the local heuristic
/// path runs.
pub async fn process_inbound_message<S: TicketStore>(
    store: &S,
    ctx: &InboundContext<'_>,
    text: &str,
    kb_context: Option<&str>,
    previous_messages: &[String],
    delegated: Option<IntentAnalysis>,
) -> Result<PipelineOutcome, String> {
    let mut analysis = delegated
        .unwrap_or_else(|| classifier::analyze_intent(text, kb_context, previous_messages));

    let mut ticket_id = None;
    let mut ticket_info = None;
    let mut order_event = None;

    // The order sub-flow runs whenever a session is already open for
    // this conversation (a bare "yes" never classifies as an order),
    // or when this message itself opens one.
    let mut order = match store.active_order_session(ctx.conversation_id).await? {
        Some(existing) => Some(existing),
        None if analysis.intent == Intent::OrderPlacement => Some(OrderInfo::new()),
        None => None,
    };

    if let Some(order) = order.as_mut() {
        match orders::advance_order(order, text) {
            OrderAdvance::ReadyToConfirm => {
                let draft = order_ticket_draft(ctx, text, &analysis, order);
                let id = materialize_ticket(store, &draft).await?;
                order.pending_order_id = Some(id);
                store.save_order_session(ctx.conversation_id, order).await?;
                ticket_id = Some(id);
                ticket_info = Some(creation_info(ctx, &analysis, kb_context, previous_messages, text));
                order_event = Some(OrderEvent::ReadyToConfirm);
            }
            OrderAdvance::Confirmed => {
                // advance_order only reports Confirmed with a pending id on file.
                if let Some(pending_id) = order.pending_order_id {
                    let previous_status =
                        store.update_order_status(pending_id, "confirmed").await?;
                    let entry = TicketHistoryEntry {
                        ticket_id: pending_id,
                        action: "Order Confirmed".to_string(),
                        previous_value: Some("pending".to_string()),
                        new_value: Some("confirmed".to_string()),
                        actor: "System".to_string(),
                        created_at: now_iso(),
                    };
                    if let Err(err) = store.append_history(&entry).await {
                        eprintln!(
                            "[pipeline] history append failed for ticket {pending_id}: {err}"
                        );
                    }
                    // The update also moves the ticket to InProgress;
                    // every status change gets its paired audit row.
                    if previous_status != TicketStatus::InProgress.as_str() {
                        let status_entry = TicketHistoryEntry {
                            ticket_id: pending_id,
                            action: "Status Changed".to_string(),
                            previous_value: Some(previous_status),
                            new_value: Some(TicketStatus::InProgress.as_str().to_string()),
                            actor: "System".to_string(),
                            created_at: now_iso(),
                        };
                        if let Err(err) = store.append_history(&status_entry).await {
                            eprintln!(
                                "[pipeline] history append failed for ticket {pending_id}: {err}"
                            );
                        }
                    }
                    orders::complete_order(order);
                    store.save_order_session(ctx.conversation_id, order).await?;
                    order_event = Some(OrderEvent::Confirmed);
                }
            }
            OrderAdvance::Unchanged => {
                // Keep a freshly opened session alive across turns.
                if order.pending_order_id.is_none() {
                    store.save_order_session(ctx.conversation_id, order).await?;
                }
            }
        }
        analysis.detected_entities.order_info = Some(order.clone());
    }

    // A turn the order flow consumed, and a bare confirmation token,
    // never double as an escalation ticket. Anything else arriving
    // while a session is open is still ticketed on its own merits.
    if ticket_id.is_none()
        && order_event.is_none()
        && !orders::is_confirmation(text)
        && escalation::should_create_ticket(&analysis)
    {
        let draft = escalation_ticket_draft(ctx, text, &analysis, previous_messages);
        let id = materialize_ticket(store, &draft).await?;
        ticket_id = Some(id);
        ticket_info = Some(creation_info(ctx, &analysis, kb_context, previous_messages, text));
    }

    let reply = analysis
        .response
        .clone()
        .unwrap_or_else(|| fallback_reply(&analysis, order_event, ticket_id.is_some()));

    Ok(PipelineOutcome {
        analysis,
        ticket_id,
        ticket_info,
        reply,
    })
}

fn context_snippet(previous_messages: &[String], text: &str) -> String {
    let mut lines: Vec<&str> = previous_messages
        .iter()
        .rev()
        .take(5)
        .map(String::as_str)
        .collect();
    lines.reverse();
    lines.push(text);
    let joined = lines.join("\n");
    joined.chars().take(CONTEXT_SNIPPET_MAX_CHARS).collect()
}

fn creation_info(
    ctx: &InboundContext<'_>,
    analysis: &IntentAnalysis,
    kb_context: Option<&str>,
    previous_messages: &[String],
    text: &str,
) -> TicketCreationInfo {
    let has_kb = kb_context.map(|c| !c.trim().is_empty()).unwrap_or(false);
    TicketCreationInfo {
        ticket_type: escalation::ticket_type(analysis),
        priority: escalation::ticket_priority(analysis),
        context: context_snippet(previous_messages, text),
        message_id: ctx.message_id.to_string(),
        required_actions: escalation::required_actions(analysis, has_kb),
    }
}

fn order_ticket_draft(
    ctx: &InboundContext<'_>,
    text: &str,
    analysis: &IntentAnalysis,
    order: &OrderInfo,
) -> TicketDraft {
    let product = order.product.as_deref().unwrap_or("unspecified product");
    TicketDraft {
        title: format!("Order: {product}"),
        customer_name: ctx.customer_name.to_string(),
        platform: ctx.platform.to_string(),
        ticket_type: "Order".to_string(),
        status: TicketStatus::New,
        priority: escalation::ticket_priority(analysis),
        body: format!("{} x {product}\n\n{text}", order.quantity),
        intent_type: Some(escalation::ticket_type(analysis)),
        confidence_score: Some(analysis.confidence),
        escalation_reason: analysis.escalation_reason.clone(),
        context: None,
        conversation_id: Some(ctx.conversation_id.to_string()),
        message_id: Some(ctx.message_id.to_string()),
        order_status: Some("pending".to_string()),
    }
}

fn escalation_ticket_draft(
    ctx: &InboundContext<'_>,
    text: &str,
    analysis: &IntentAnalysis,
    previous_messages: &[String],
) -> TicketDraft {
    TicketDraft {
        title: escalation::ticket_title(analysis),
        customer_name: ctx.customer_name.to_string(),
        platform: ctx.platform.to_string(),
        ticket_type: "Support".to_string(),
        status: TicketStatus::New,
        priority: escalation::ticket_priority(analysis),
        body: text.to_string(),
        intent_type: Some(escalation::ticket_type(analysis)),
        confidence_score: Some(analysis.confidence),
        escalation_reason: analysis.escalation_reason.clone(),
        context: Some(context_snippet(previous_messages, text)),
        conversation_id: Some(ctx.conversation_id.to_string()),
        message_id: Some(ctx.message_id.to_string()),
        order_status: None,
    }
}

fn fallback_reply(
    analysis: &IntentAnalysis,
    order_event: Option<OrderEvent>,
    ticket_created: bool,
) -> String {
    if let Some(event) = order_event {
        let order = analysis.detected_entities.order_info.as_ref();
        let product = order
            .and_then(|o| o.product.as_deref())
            .unwrap_or("your order");
        let quantity = order.map(|o| o.quantity).unwrap_or(1);
        return match event {
            OrderEvent::ReadyToConfirm => format!(
                "You'd like {quantity} x {product}. Reply \"yes\" to confirm the order."
            ),
            OrderEvent::Confirmed => format!(
                "Your order for {quantity} x {product} is confirmed. We'll start processing it right away."
            ),
        };
    }

    match analysis.intent {
        Intent::HumanAgentRequest => {
            "I've escalated this conversation to a human agent. Someone from our team will be with you shortly.".to_string()
        }
        Intent::SupportRequest if ticket_created => {
            "Thanks for the details. I've raised a support ticket and our team will follow up soon.".to_string()
        }
        Intent::SupportRequest => {
            "Thanks for reaching out. Could you share a few more details so I can help?".to_string()
        }
        Intent::OrderPlacement => {
            "Happy to help with an order. Which product would you like?".to_string()
        }
        Intent::GeneralQuery if ticket_created => {
            "Thanks for your message. I've passed this along to our team and they'll follow up shortly.".to_string()
        }
        Intent::GeneralQuery => {
            "Thanks for your message! Is there anything else I can help you with?".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tickets::testing::MemoryStore;
    use crate::types::{DetectedEntities, OrderState, TicketIntentType, TicketPriority, UrgencyLevel};

    fn ctx<'a>(message_id: &'a str) -> InboundContext<'a> {
        InboundContext {
            conversation_id: "conv-1",
            message_id,
            platform: "whatsapp",
            customer_name: "Amara",
        }
    }

    #[tokio::test]
    async fn human_agent_request_creates_high_priority_request_ticket() {
        let store = MemoryStore::default();
        let outcome = process_inbound_message(
            &store,
            &ctx("m1"),
            "I need to speak to a human agent right now",
            None,
            &[],
            None,
        )
        .await
        .unwrap();

        assert_eq!(outcome.analysis.intent, Intent::HumanAgentRequest);
        assert_eq!(outcome.analysis.detected_entities.urgency_level, UrgencyLevel::High);
        let info = outcome.ticket_info.expect("ticket info expected");
        assert_eq!(info.ticket_type, TicketIntentType::Request);
        assert_eq!(info.priority, TicketPriority::High);
        assert!(info.required_actions.contains(&"Escalate to human agent".to_string()));

        let tickets = store.tickets.lock().unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].draft.title, "Human Agent Request");
        assert_eq!(tickets[0].draft.priority, TicketPriority::High);
    }

    #[tokio::test]
    async fn calm_general_query_creates_no_ticket() {
        let store = MemoryStore::default();
        let outcome = process_inbound_message(
            &store,
            &ctx("m1"),
            "what are your opening hours",
            None,
            &[],
            None,
        )
        .await
        .unwrap();

        assert!(outcome.ticket_id.is_none());
        assert!(outcome.ticket_info.is_none());
        assert!(store.tickets.lock().unwrap().is_empty());
        assert!(!outcome.reply.is_empty());
    }

    #[tokio::test]
    async fn order_flow_runs_pending_then_confirmed_across_turns() {
        let store = MemoryStore::default();

        let first = process_inbound_message(
            &store,
            &ctx("m1"),
            "I want to order the Pro plan",
            None,
            &[],
            None,
        )
        .await
        .unwrap();

        let order = first
            .analysis
            .detected_entities
            .order_info
            .as_ref()
            .expect("order info expected");
        assert_eq!(order.state, OrderState::Confirming);
        assert_eq!(order.product.as_deref(), Some("Pro plan"));
        assert_eq!(order.quantity, 1);
        assert!(!order.confirmed);
        let pending_id = order.pending_order_id.expect("pending ticket expected");
        assert_eq!(first.ticket_id, Some(pending_id));
        {
            let tickets = store.tickets.lock().unwrap();
            assert_eq!(tickets[0].draft.ticket_type, "Order");
            assert_eq!(tickets[0].order_status.as_deref(), Some("pending"));
        }
        assert!(first.reply.contains("yes"));

        let second = process_inbound_message(&store, &ctx("m2"), "yes", None, &[], None)
            .await
            .unwrap();

        let order = second
            .analysis
            .detected_entities
            .order_info
            .as_ref()
            .expect("order info expected");
        assert!(order.confirmed);
        assert_eq!(order.state, OrderState::Completed);
        {
            let tickets = store.tickets.lock().unwrap();
            assert_eq!(tickets[0].order_status.as_deref(), Some("confirmed"));
        }
        let history = store.history.lock().unwrap();
        assert!(history.iter().any(|h| h.action == "Order Confirmed"
            && h.previous_value.as_deref() == Some("pending")
            && h.new_value.as_deref() == Some("confirmed")));
        // The confirmation moved the ticket to InProgress, with its
        // own paired audit row.
        assert!(history.iter().any(|h| h.action == "Status Changed"
            && h.previous_value.as_deref() == Some("New")
            && h.new_value.as_deref() == Some("InProgress")));

        // The session closed; nothing is active any more.
        assert!(store
            .active_order_session("conv-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn confirmation_with_no_open_order_is_a_no_op() {
        let store = MemoryStore::default();
        let outcome = process_inbound_message(&store, &ctx("m1"), "yes", None, &[], None)
            .await
            .unwrap();

        assert!(outcome.ticket_id.is_none());
        assert!(store.tickets.lock().unwrap().is_empty());
        assert!(store.sessions.lock().unwrap().is_empty());
        assert!(!outcome.reply.is_empty());
    }

    #[tokio::test]
    async fn non_confirmation_while_confirming_changes_nothing() {
        let store = MemoryStore::default();
        process_inbound_message(
            &store,
            &ctx("m1"),
            "I want to order the Pro plan",
            None,
            &[],
            None,
        )
        .await
        .unwrap();

        process_inbound_message(
            &store,
            &ctx("m2"),
            "what are your opening hours",
            None,
            &[],
            None,
        )
        .await
        .unwrap();

        let session = store
            .active_order_session("conv-1")
            .await
            .unwrap()
            .expect("session should stay open");
        assert_eq!(session.state, OrderState::Confirming);
        assert!(!session.confirmed);
        assert_eq!(store.tickets.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn human_agent_request_mid_order_still_opens_a_ticket() {
        let store = MemoryStore::default();
        process_inbound_message(
            &store,
            &ctx("m1"),
            "I want to order the Pro plan",
            None,
            &[],
            None,
        )
        .await
        .unwrap();

        let outcome = process_inbound_message(
            &store,
            &ctx("m2"),
            "I need to speak to a human agent right now",
            None,
            &[],
            None,
        )
        .await
        .unwrap();

        assert_eq!(outcome.analysis.intent, Intent::HumanAgentRequest);
        let agent_ticket = outcome.ticket_id.expect("escalation ticket expected");
        {
            let tickets = store.tickets.lock().unwrap();
            assert_eq!(tickets.len(), 2);
            assert_eq!(tickets[1].id, agent_ticket);
            assert_eq!(tickets[1].draft.title, "Human Agent Request");
        }

        // The pending order session is untouched by the interruption.
        let session = store
            .active_order_session("conv-1")
            .await
            .unwrap()
            .expect("session should stay open");
        assert_eq!(session.state, OrderState::Confirming);
        assert!(session.pending_order_id.is_some());
        assert_ne!(session.pending_order_id, Some(agent_ticket));
    }

    #[tokio::test]
    async fn delegated_analysis_drives_the_decision() {
        let store = MemoryStore::default();
        let delegated = IntentAnalysis {
            intent: Intent::SupportRequest,
            confidence: 0.9,
            requires_escalation: true,
            escalation_reason: Some("model says so".to_string()),
            detected_entities: DetectedEntities {
                urgency_level: UrgencyLevel::Medium,
                ..DetectedEntities::default()
            },
            response: Some("Let me loop in our billing team.".to_string()),
        };

        let outcome = process_inbound_message(
            &store,
            &ctx("m1"),
            "something about my bill",
            None,
            &[],
            Some(delegated),
        )
        .await
        .unwrap();

        assert_eq!(outcome.reply, "Let me loop in our billing team.");
        let tickets = store.tickets.lock().unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(
            tickets[0].draft.escalation_reason.as_deref(),
            Some("model says so")
        );
        assert_eq!(tickets[0].draft.priority, TicketPriority::Medium);
    }

    #[tokio::test]
    async fn urgent_billing_failure_gets_a_high_priority_ticket() {
        let store = MemoryStore::default();
        let outcome = process_inbound_message(
            &store,
            &ctx("m1"),
            "my payment failed, this is urgent",
            None,
            &[],
            None,
        )
        .await
        .unwrap();

        assert!(outcome.analysis.requires_escalation);
        let info = outcome.ticket_info.expect("ticket info expected");
        assert_eq!(info.priority, TicketPriority::High);
        assert!(info
            .required_actions
            .contains(&"Check billing documentation".to_string()));
    }
}
