use sqlx::{PgPool, Row};

use crate::types::{now_iso, OrderInfo, OrderState, TicketDraft, TicketHistoryEntry};

/// Persistence seam for the pipeline. Handlers hand in the live
/// `PgPool`; tests substitute an in-memory fake.
#[allow(async_fn_in_trait)]
pub trait TicketStore {
    async fn create_ticket(&self, draft: &TicketDraft) -> Result<i64, String>;
    async fn append_history(&self, entry: &TicketHistoryEntry) -> Result<(), String>;
    async fn active_order_session(&self, conversation_id: &str)
        -> Result<Option<OrderInfo>, String>;
    async fn save_order_session(
        &self,
        conversation_id: &str,
        order: &OrderInfo,
    ) -> Result<(), String>;
    /// Returns the ticket's status before the update so the caller can
    /// write the paired status-change audit row.
    async fn update_order_status(&self, ticket_id: i64, order_status: &str)
        -> Result<String, String>;
}

/// Persists a ticket and its "Ticket Created" audit row. A failed
/// ticket insert aborts (no orphan history); a failed history append
/// after a successful insert is reported but the ticket stands.
pub async fn materialize_ticket<S: TicketStore>(
    store: &S,
    draft: &TicketDraft,
) -> Result<i64, String> {
    let ticket_id = store.create_ticket(draft).await?;

    let entry = TicketHistoryEntry {
        ticket_id,
        action: "Ticket Created".to_string(),
        previous_value: None,
        new_value: Some(draft.status.as_str().to_string()),
        actor: "System".to_string(),
        created_at: now_iso(),
    };
    if let Err(err) = store.append_history(&entry).await {
        eprintln!("[tickets] history append failed for ticket {ticket_id}: {err}");
    }

    Ok(ticket_id)
}

impl TicketStore for PgPool {
    async fn create_ticket(&self, draft: &TicketDraft) -> Result<i64, String> {
        let created_at = now_iso();
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO tickets (
                title, customer_name, platform, type, status, priority, body,
                intent_type, confidence_score, escalation_reason, context,
                conversation_id, message_id, order_status, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$15)
            RETURNING id
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.customer_name)
        .bind(&draft.platform)
        .bind(&draft.ticket_type)
        .bind(draft.status.as_str())
        .bind(draft.priority.as_str())
        .bind(&draft.body)
        .bind(draft.intent_type.map(|t| t.as_str()))
        .bind(draft.confidence_score)
        .bind(&draft.escalation_reason)
        .bind(&draft.context)
        .bind(&draft.conversation_id)
        .bind(&draft.message_id)
        .bind(&draft.order_status)
        .bind(&created_at)
        .fetch_one(self)
        .await
        .map_err(|err| format!("ticket insert failed: {err}"))
    }

    async fn append_history(&self, entry: &TicketHistoryEntry) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO ticket_history (ticket_id, action, previous_value, new_value, actor, created_at)
            VALUES ($1,$2,$3,$4,$5,$6)
            "#,
        )
        .bind(entry.ticket_id)
        .bind(&entry.action)
        .bind(&entry.previous_value)
        .bind(&entry.new_value)
        .bind(&entry.actor)
        .bind(&entry.created_at)
        .execute(self)
        .await
        .map_err(|err| format!("history insert failed: {err}"))?;
        Ok(())
    }

    async fn active_order_session(
        &self,
        conversation_id: &str,
    ) -> Result<Option<OrderInfo>, String> {
        let row = sqlx::query(
            "SELECT product, quantity, state, confirmed, pending_order_id \
             FROM order_sessions WHERE conversation_id = $1 AND state != 'COMPLETED'",
        )
        .bind(conversation_id)
        .fetch_optional(self)
        .await
        .map_err(|err| format!("order session lookup failed: {err}"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let state_raw: String = row.get("state");
        let state = OrderState::parse(&state_raw)
            .ok_or_else(|| format!("unknown order state in store: {state_raw}"))?;
        Ok(Some(OrderInfo {
            product: row.get("product"),
            quantity: row.get::<i32, _>("quantity").max(1) as u32,
            state,
            confirmed: row.get("confirmed"),
            pending_order_id: row.get("pending_order_id"),
        }))
    }

    async fn save_order_session(
        &self,
        conversation_id: &str,
        order: &OrderInfo,
    ) -> Result<(), String> {
        let now = now_iso();
        let completed_at = (order.state == OrderState::Completed).then(|| now.clone());
        sqlx::query(
            r#"
            INSERT INTO order_sessions (
                conversation_id, product, quantity, state, confirmed,
                pending_order_id, created_at, updated_at, completed_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$7,$8)
            ON CONFLICT (conversation_id) DO UPDATE SET
                product = EXCLUDED.product,
                quantity = EXCLUDED.quantity,
                state = EXCLUDED.state,
                confirmed = EXCLUDED.confirmed,
                pending_order_id = EXCLUDED.pending_order_id,
                updated_at = EXCLUDED.updated_at,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(conversation_id)
        .bind(&order.product)
        .bind(order.quantity as i32)
        .bind(order.state.as_str())
        .bind(order.confirmed)
        .bind(order.pending_order_id)
        .bind(&now)
        .bind(&completed_at)
        .execute(self)
        .await
        .map_err(|err| format!("order session upsert failed: {err}"))?;
        Ok(())
    }

    async fn update_order_status(
        &self,
        ticket_id: i64,
        order_status: &str,
    ) -> Result<String, String> {
        let previous = sqlx::query_scalar::<_, String>("SELECT status FROM tickets WHERE id = $1")
            .bind(ticket_id)
            .fetch_one(self)
            .await
            .map_err(|err| format!("order status lookup failed: {err}"))?;
        sqlx::query(
            "UPDATE tickets SET order_status = $1, status = 'InProgress', updated_at = $2 WHERE id = $3",
        )
        .bind(order_status)
        .bind(now_iso())
        .bind(ticket_id)
        .execute(self)
        .await
        .map_err(|err| format!("order status update failed: {err}"))?;
        Ok(previous)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::TicketStore;
    use crate::types::{OrderInfo, OrderState, TicketDraft, TicketHistoryEntry};

    #[derive(Debug, Clone)]
    pub struct StoredTicket {
        pub id: i64,
        pub draft: TicketDraft,
        pub status: String,
        pub order_status: Option<String>,
    }

    /// In-memory TicketStore fake for pipeline tests.
    #[derive(Default)]
    pub struct MemoryStore {
        pub tickets: Mutex<Vec<StoredTicket>>,
        pub history: Mutex<Vec<TicketHistoryEntry>>,
        pub sessions: Mutex<HashMap<String, OrderInfo>>,
        pub fail_create: bool,
        pub fail_history: bool,
    }

    impl TicketStore for MemoryStore {
        async fn create_ticket(&self, draft: &TicketDraft) -> Result<i64, String> {
            if self.fail_create {
                return Err("simulated create failure".to_string());
            }
            let mut tickets = self.tickets.lock().unwrap();
            let id = tickets.len() as i64 + 1;
            tickets.push(StoredTicket {
                id,
                draft: draft.clone(),
                status: draft.status.as_str().to_string(),
                order_status: draft.order_status.clone(),
            });
            Ok(id)
        }

        async fn append_history(&self, entry: &TicketHistoryEntry) -> Result<(), String> {
            if self.fail_history {
                return Err("simulated history failure".to_string());
            }
            self.history.lock().unwrap().push(entry.clone());
            Ok(())
        }

        async fn active_order_session(
            &self,
            conversation_id: &str,
        ) -> Result<Option<OrderInfo>, String> {
            Ok(self
                .sessions
                .lock()
                .unwrap()
                .get(conversation_id)
                .filter(|order| order.state != OrderState::Completed)
                .cloned())
        }

        async fn save_order_session(
            &self,
            conversation_id: &str,
            order: &OrderInfo,
        ) -> Result<(), String> {
            self.sessions
                .lock()
                .unwrap()
                .insert(conversation_id.to_string(), order.clone());
            Ok(())
        }

        async fn update_order_status(
            &self,
            ticket_id: i64,
            order_status: &str,
        ) -> Result<String, String> {
            let mut tickets = self.tickets.lock().unwrap();
            match tickets.iter_mut().find(|t| t.id == ticket_id) {
                Some(ticket) => {
                    let previous = ticket.status.clone();
                    ticket.status = "InProgress".to_string();
                    ticket.order_status = Some(order_status.to_string());
                    Ok(previous)
                }
                None => Err(format!("no ticket {ticket_id}")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MemoryStore;
    use super::*;
    use crate::types::{TicketPriority, TicketStatus};

    fn draft() -> TicketDraft {
        TicketDraft {
            title: "Support Request".to_string(),
            customer_name: "Amara".to_string(),
            platform: "whatsapp".to_string(),
            ticket_type: "Support".to_string(),
            status: TicketStatus::New,
            priority: TicketPriority::Medium,
            body: "my payment failed".to_string(),
            intent_type: None,
            confidence_score: Some(0.6),
            escalation_reason: None,
            context: None,
            conversation_id: Some("conv-1".to_string()),
            message_id: Some("msg-1".to_string()),
            order_status: None,
        }
    }

    #[tokio::test]
    async fn materialize_writes_ticket_then_created_history() {
        let store = MemoryStore::default();
        let id = materialize_ticket(&store, &draft()).await.unwrap();
        assert_eq!(id, 1);

        let history = store.history.lock().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].ticket_id, id);
        assert_eq!(history[0].action, "Ticket Created");
        assert_eq!(history[0].new_value.as_deref(), Some("New"));
        assert_eq!(history[0].actor, "System");
        assert!(history[0].previous_value.is_none());
    }

    #[tokio::test]
    async fn create_failure_leaves_no_history_behind() {
        let store = MemoryStore {
            fail_create: true,
            ..MemoryStore::default()
        };
        assert!(materialize_ticket(&store, &draft()).await.is_err());
        assert!(store.tickets.lock().unwrap().is_empty());
        assert!(store.history.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_failure_does_not_roll_back_the_ticket() {
        let store = MemoryStore {
            fail_history: true,
            ..MemoryStore::default()
        };
        let id = materialize_ticket(&store, &draft()).await.unwrap();
        assert_eq!(store.tickets.lock().unwrap().len(), 1);
        assert_eq!(store.tickets.lock().unwrap()[0].id, id);
        assert!(store.history.lock().unwrap().is_empty());
    }
}
