use std::{collections::HashMap, env, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::classifier::{default_analysis, parse_intent_analysis_from_text};
use crate::pipeline::{process_inbound_message, InboundContext};
use crate::prompting::{
    render_classification_system_prompt, render_classification_user_content,
    ClassificationPromptContext, ClassificationUserContext,
};
use crate::types::{now_iso, AppState, IntentAnalysis, Ticket, TicketHistoryEntry};

const PLATFORMS: &[&str] = &["whatsapp", "facebook", "instagram"];

fn resolve_database_url() -> String {
    if let Ok(url) = env::var("DATABASE_URL") {
        if !url.trim().is_empty() {
            return url;
        }
    }
    let host = env::var("POSTGRES_HOST")
        .or_else(|_| env::var("PGHOST"))
        .unwrap_or_else(|_| "localhost".to_string());
    let port = env::var("POSTGRES_PORT")
        .or_else(|_| env::var("PGPORT"))
        .unwrap_or_else(|_| "5432".to_string());
    let user = env::var("POSTGRES_USER")
        .or_else(|_| env::var("PGUSER"))
        .unwrap_or_else(|_| "postgres".to_string());
    let password = env::var("POSTGRES_PASSWORD")
        .or_else(|_| env::var("PGPASSWORD"))
        .unwrap_or_else(|_| "postgres".to_string());
    let db = env::var("POSTGRES_DB")
        .or_else(|_| env::var("PGDATABASE"))
        .unwrap_or_else(|_| "support_console".to_string());
    format!("postgres://{user}:{password}@{host}:{port}/{db}")
}

fn is_supported_platform(platform: &str) -> bool {
    PLATFORMS.contains(&platform)
}

fn platform_env(platform: &str, suffix: &str) -> String {
    let key = format!("{}_{suffix}", platform.to_uppercase());
    env::var(key).unwrap_or_default()
}

fn platform_app_secret(platform: &str) -> String {
    platform_env(platform, "APP_SECRET")
}

fn platform_verify_token(platform: &str) -> String {
    platform_env(platform, "VERIFY_TOKEN")
}

fn verify_meta_signature(app_secret: &str, signature_header: Option<&str>, body: &[u8]) -> bool {
    if app_secret.is_empty() {
        return true;
    }
    let signature = signature_header.unwrap_or("").trim();
    let signature = signature
        .strip_prefix("sha256=")
        .unwrap_or(signature)
        .trim();
    if signature.is_empty() {
        return false;
    }
    let Ok(signature_bytes) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature_bytes).is_ok()
}

#[derive(Debug, Clone)]
struct PlatformInbound {
    sender_id: String,
    sender_name: String,
    message_id: String,
    text: String,
}

/// WhatsApp Cloud payloads: entry[].changes[].value.messages[] with
/// profile names under value.contacts[].
fn whatsapp_inbound_messages(payload: &Value) -> Vec<PlatformInbound> {
    let mut inbound = Vec::new();
    let entries = payload
        .get("entry")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for entry in entries {
        let changes = entry
            .get("changes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for change in changes {
            let value = change.get("value").cloned().unwrap_or_else(|| json!({}));
            let mut profile_names = HashMap::new();
            if let Some(contacts) = value.get("contacts").and_then(Value::as_array) {
                for contact in contacts {
                    let wa_id = contact.get("wa_id").and_then(Value::as_str).unwrap_or("");
                    let name = contact
                        .get("profile")
                        .and_then(|p| p.get("name"))
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    if !wa_id.is_empty() && !name.is_empty() {
                        profile_names.insert(wa_id.to_string(), name.to_string());
                    }
                }
            }
            let messages = value
                .get("messages")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for message in messages {
                let from = message.get("from").and_then(Value::as_str).unwrap_or("");
                let text = message
                    .get("text")
                    .and_then(|t| t.get("body"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                if from.is_empty() || text.trim().is_empty() {
                    continue;
                }
                let message_id = message
                    .get("id")
                    .and_then(Value::as_str)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                inbound.push(PlatformInbound {
                    sender_id: from.to_string(),
                    sender_name: profile_names.get(from).cloned().unwrap_or_default(),
                    message_id,
                    text: text.to_string(),
                });
            }
        }
    }
    inbound
}

/// Messenger/Instagram payloads: entry[].messaging[] with sender.id
/// and message.mid/message.text.
fn messenger_inbound_messages(payload: &Value) -> Vec<PlatformInbound> {
    let mut inbound = Vec::new();
    let entries = payload
        .get("entry")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for entry in entries {
        let events = entry
            .get("messaging")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for event in events {
            let sender_id = event
                .get("sender")
                .and_then(|s| s.get("id"))
                .and_then(Value::as_str)
                .unwrap_or("");
            let message = event.get("message").cloned().unwrap_or_else(|| json!({}));
            // Skip delivery/read receipts and our own echoes.
            if message
                .get("is_echo")
                .and_then(Value::as_bool)
                .unwrap_or(false)
            {
                continue;
            }
            let text = message.get("text").and_then(Value::as_str).unwrap_or("");
            if sender_id.is_empty() || text.trim().is_empty() {
                continue;
            }
            let message_id = message
                .get("mid")
                .and_then(Value::as_str)
                .map(|s| s.to_string())
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            inbound.push(PlatformInbound {
                sender_id: sender_id.to_string(),
                sender_name: String::new(),
                message_id,
                text: text.to_string(),
            });
        }
    }
    inbound
}

async fn find_or_create_conversation(
    pool: &PgPool,
    platform: &str,
    external_user_id: &str,
    customer_name: &str,
) -> Result<String, String> {
    let existing = sqlx::query_scalar::<_, String>(
        "SELECT id FROM conversations WHERE platform = $1 AND external_user_id = $2",
    )
    .bind(platform)
    .bind(external_user_id)
    .fetch_optional(pool)
    .await
    .map_err(|err| format!("conversation lookup failed: {err}"))?;

    if let Some(id) = existing {
        if !customer_name.trim().is_empty() {
            let _ = sqlx::query(
                "UPDATE conversations SET customer_name = $1, updated_at = $2 WHERE id = $3",
            )
            .bind(customer_name)
            .bind(now_iso())
            .bind(&id)
            .execute(pool)
            .await;
        }
        return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    let now = now_iso();
    sqlx::query(
        "INSERT INTO conversations (id, platform, external_user_id, customer_name, created_at, updated_at) \
         VALUES ($1,$2,$3,$4,$5,$5)",
    )
    .bind(&id)
    .bind(platform)
    .bind(external_user_id)
    .bind(customer_name)
    .bind(&now)
    .execute(pool)
    .await
    .map_err(|err| format!("conversation insert failed: {err}"))?;
    Ok(id)
}

async fn persist_message(
    pool: &PgPool,
    conversation_id: &str,
    message_id: &str,
    sender: &str,
    text: &str,
) {
    let _ = sqlx::query(
        "INSERT INTO messages (id, conversation_id, sender, text, created_at) \
         VALUES ($1,$2,$3,$4,$5) ON CONFLICT (id) DO NOTHING",
    )
    .bind(message_id)
    .bind(conversation_id)
    .bind(sender)
    .bind(text)
    .bind(now_iso())
    .execute(pool)
    .await;
}

/// Customer-sent texts before the current message, oldest first.
async fn previous_customer_texts(
    pool: &PgPool,
    conversation_id: &str,
    exclude_message_id: &str,
    limit: i64,
) -> Vec<String> {
    let rows = sqlx::query_scalar::<_, String>(
        "SELECT text FROM messages \
         WHERE conversation_id = $1 AND sender = 'customer' AND id != $2 \
         ORDER BY created_at DESC LIMIT $3",
    )
    .bind(conversation_id)
    .bind(exclude_message_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .unwrap_or_default();
    rows.into_iter().rev().collect()
}

async fn recent_transcript(pool: &PgPool, conversation_id: &str, limit: i64) -> String {
    let rows = sqlx::query(
        "SELECT sender, text FROM messages WHERE conversation_id = $1 \
         ORDER BY created_at DESC LIMIT $2",
    )
    .bind(conversation_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .unwrap_or_default();
    rows.into_iter()
        .rev()
        .map(|row| {
            format!(
                "{}: {}",
                row.get::<String, _>("sender"),
                row.get::<String, _>("text")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// External KB-search collaborator. Returns ranked context text, or
/// None when unconfigured or unreachable (classification proceeds
/// without context).
async fn fetch_kb_context(state: &Arc<AppState>, query_text: &str) -> Option<String> {
    let url = env::var("KB_SEARCH_URL").unwrap_or_default();
    if url.trim().is_empty() {
        return None;
    }
    let response = state
        .ai_client
        .post(url.trim())
        .json(&json!({ "query": query_text }))
        .send()
        .await;
    let response = match response {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            eprintln!("[kb] search returned {}", response.status());
            return None;
        }
        Err(err) => {
            eprintln!("[kb] search request failed: {err}");
            return None;
        }
    };
    let payload = response.json::<Value>().await.ok()?;
    payload
        .get("context")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

async fn openai_chat_completion_text(
    state: &Arc<AppState>,
    model: &str,
    system: &str,
    user: &str,
) -> Result<String, String> {
    let api_key = env::var("OPENAI_API_KEY").unwrap_or_default();
    if api_key.trim().is_empty() {
        return Err("OPENAI_API_KEY not configured".to_string());
    }
    let response = state
        .ai_client
        .post("https://api.openai.com/v1/chat/completions")
        .bearer_auth(api_key)
        .json(&json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
            "temperature": 0.1
        }))
        .send()
        .await
        .map_err(|err| format!("openai request failed: {err}"))?;
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(format!("openai returned {status}: {body}"));
    }
    let payload = response
        .json::<Value>()
        .await
        .map_err(|err| format!("openai parse failed: {err}"))?;
    let text = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("")
        .to_string();
    if text.is_empty() {
        return Err("openai response had empty content".to_string());
    }
    Ok(text)
}

/// Delegated classification path. Some(analysis) when the model
/// answered (a malformed payload becomes the fixed default analysis);
/// None when delegation is off or the call failed, in which case the
/// local heuristic classifier takes over.
async fn delegated_classification(
    state: &Arc<AppState>,
    platform: &str,
    customer_name: &str,
    conversation_id: &str,
    kb_context: Option<&str>,
    visitor_text: &str,
) -> Option<IntentAnalysis> {
    if env::var("OPENAI_API_KEY").unwrap_or_default().trim().is_empty() {
        return None;
    }

    let transcript = recent_transcript(&state.db, conversation_id, 14).await;
    let system = render_classification_system_prompt(&ClassificationPromptContext {
        platform,
        customer_name,
    });
    let user = render_classification_user_content(&ClassificationUserContext {
        kb_context: kb_context.unwrap_or(""),
        transcript: &transcript,
        visitor_text,
    });
    let model = env::var("OPENAI_CHAT_MODEL").unwrap_or_else(|_| "gpt-4.1".to_string());

    match openai_chat_completion_text(state, &model, &system, &user).await {
        Ok(raw) => match parse_intent_analysis_from_text(&raw) {
            Some(analysis) => Some(analysis),
            None => {
                eprintln!("[classify] model payload failed validation, using default analysis");
                Some(default_analysis())
            }
        },
        Err(err) => {
            eprintln!("[classify] delegated classification failed: {err}");
            None
        }
    }
}

async fn webhook_verify(
    Path(platform): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if !is_supported_platform(&platform) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown platform" })),
        )
            .into_response();
    }

    let mode = params.get("hub.mode").cloned().unwrap_or_default();
    let verify_token = params.get("hub.verify_token").cloned().unwrap_or_default();
    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();
    let expected_verify_token = platform_verify_token(&platform);

    if mode == "subscribe"
        && !challenge.is_empty()
        && !expected_verify_token.is_empty()
        && verify_token == expected_verify_token
    {
        return (StatusCode::OK, challenge).into_response();
    }

    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "invalid webhook verification token" })),
    )
        .into_response()
}

async fn webhook_event(
    Path(platform): Path<String>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if !is_supported_platform(&platform) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown platform" })),
        )
            .into_response();
    }

    let app_secret = platform_app_secret(&platform);
    let signature_header = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok());
    if !verify_meta_signature(&app_secret, signature_header, &body) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid webhook signature" })),
        )
            .into_response();
    }

    let payload = serde_json::from_slice::<Value>(&body).unwrap_or_else(|_| json!({}));
    let inbound = if platform == "whatsapp" {
        whatsapp_inbound_messages(&payload)
    } else {
        messenger_inbound_messages(&payload)
    };

    let mut processed = 0usize;
    let mut replies = Vec::new();
    for message in inbound {
        let conversation_id = match find_or_create_conversation(
            &state.db,
            &platform,
            &message.sender_id,
            &message.sender_name,
        )
        .await
        {
            Ok(id) => id,
            Err(err) => {
                eprintln!("[webhook] {err}");
                continue;
            }
        };

        let previous =
            previous_customer_texts(&state.db, &conversation_id, &message.message_id, 10).await;
        persist_message(
            &state.db,
            &conversation_id,
            &message.message_id,
            "customer",
            &message.text,
        )
        .await;

        let kb_context = fetch_kb_context(&state, &message.text).await;
        let delegated = delegated_classification(
            &state,
            &platform,
            &message.sender_name,
            &conversation_id,
            kb_context.as_deref(),
            &message.text,
        )
        .await;

        let ctx = InboundContext {
            conversation_id: &conversation_id,
            message_id: &message.message_id,
            platform: &platform,
            customer_name: &message.sender_name,
        };
        let outcome = match process_inbound_message(
            &state.db,
            &ctx,
            &message.text,
            kb_context.as_deref(),
            &previous,
            delegated,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                eprintln!("[webhook] pipeline failed for {conversation_id}: {err}");
                continue;
            }
        };

        let reply_id = Uuid::new_v4().to_string();
        persist_message(&state.db, &conversation_id, &reply_id, "bot", &outcome.reply).await;

        replies.push(json!({
            "conversationId": conversation_id,
            "messageId": message.message_id,
            "analysis": outcome.analysis,
            "ticketId": outcome.ticket_id,
            "ticket": outcome.ticket_info,
            "reply": outcome.reply,
        }));
        processed += 1;
    }

    (
        StatusCode::OK,
        Json(json!({ "processed": processed, "results": replies })),
    )
        .into_response()
}

fn parse_ticket_row(row: sqlx::postgres::PgRow) -> Ticket {
    Ticket {
        id: row.get("id"),
        title: row.get("title"),
        customer_name: row.get("customer_name"),
        platform: row.get("platform"),
        ticket_type: row.get("type"),
        status: row.get("status"),
        priority: row.get("priority"),
        body: row.get("body"),
        intent_type: row.get("intent_type"),
        confidence_score: row.get("confidence_score"),
        escalation_reason: row.get("escalation_reason"),
        context: row.get("context"),
        conversation_id: row.get("conversation_id"),
        message_id: row.get("message_id"),
        assignee: row.get("assignee"),
        order_status: row.get("order_status"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let status = params.get("status").cloned().unwrap_or_default();
    let platform = params.get("platform").cloned().unwrap_or_default();
    let rows = sqlx::query(
        "SELECT * FROM tickets \
         WHERE ($1 = '' OR status = $1) AND ($2 = '' OR platform = $2) \
         ORDER BY created_at DESC LIMIT 200",
    )
    .bind(&status)
    .bind(&platform)
    .fetch_all(&state.db)
    .await;

    match rows {
        Ok(rows) => {
            let tickets: Vec<Ticket> = rows.into_iter().map(parse_ticket_row).collect();
            Json(json!({ "tickets": tickets })).into_response()
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("ticket query failed: {err}") })),
        )
            .into_response(),
    }
}

async fn get_ticket(
    Path(ticket_id): Path<i64>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let row = sqlx::query("SELECT * FROM tickets WHERE id = $1")
        .bind(ticket_id)
        .fetch_optional(&state.db)
        .await
        .ok()
        .flatten();
    let Some(row) = row else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "ticket not found" })),
        )
            .into_response();
    };
    let ticket = parse_ticket_row(row);

    let history_rows = sqlx::query(
        "SELECT ticket_id, action, previous_value, new_value, actor, created_at \
         FROM ticket_history WHERE ticket_id = $1 ORDER BY created_at ASC",
    )
    .bind(ticket_id)
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();
    let history: Vec<TicketHistoryEntry> = history_rows
        .into_iter()
        .map(|row| TicketHistoryEntry {
            ticket_id: row.get("ticket_id"),
            action: row.get("action"),
            previous_value: row.get("previous_value"),
            new_value: row.get("new_value"),
            actor: row.get("actor"),
            created_at: row.get("created_at"),
        })
        .collect();

    Json(json!({ "ticket": ticket, "history": history })).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TicketPatchBody {
    value: String,
    #[serde(default)]
    actor: Option<String>,
}

/// Shared body of the three PATCH endpoints: update one ticket column
/// and append the paired audit row with the old and new values. The
/// audit row is part of the contract, not optional logging.
async fn patch_ticket_field(
    state: &Arc<AppState>,
    ticket_id: i64,
    column: &str,
    action: &str,
    body: &TicketPatchBody,
) -> axum::response::Response {
    let previous = sqlx::query_scalar::<_, Option<String>>(&format!(
        "SELECT {column} FROM tickets WHERE id = $1"
    ))
    .bind(ticket_id)
    .fetch_optional(&state.db)
    .await;
    let previous = match previous {
        Ok(Some(previous)) => previous,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "ticket not found" })),
            )
                .into_response();
        }
        Err(err) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("ticket lookup failed: {err}") })),
            )
                .into_response();
        }
    };

    let updated = sqlx::query(&format!(
        "UPDATE tickets SET {column} = $1, updated_at = $2 WHERE id = $3"
    ))
    .bind(&body.value)
    .bind(now_iso())
    .bind(ticket_id)
    .execute(&state.db)
    .await;
    if let Err(err) = updated {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("ticket update failed: {err}") })),
        )
            .into_response();
    }

    let entry = TicketHistoryEntry {
        ticket_id,
        action: action.to_string(),
        previous_value: previous,
        new_value: Some(body.value.clone()),
        actor: body.actor.clone().unwrap_or_else(|| "Agent".to_string()),
        created_at: now_iso(),
    };
    let history = sqlx::query(
        "INSERT INTO ticket_history (ticket_id, action, previous_value, new_value, actor, created_at) \
         VALUES ($1,$2,$3,$4,$5,$6)",
    )
    .bind(entry.ticket_id)
    .bind(&entry.action)
    .bind(&entry.previous_value)
    .bind(&entry.new_value)
    .bind(&entry.actor)
    .bind(&entry.created_at)
    .execute(&state.db)
    .await;
    if let Err(err) = history {
        eprintln!("[tickets] history append failed for ticket {ticket_id}: {err}");
    }

    Json(json!({ "ok": true, "ticketId": ticket_id })).into_response()
}

async fn patch_ticket_status(
    Path(ticket_id): Path<i64>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<TicketPatchBody>,
) -> impl IntoResponse {
    if crate::types::TicketStatus::parse(&body.value).is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid status" })),
        )
            .into_response();
    }
    patch_ticket_field(&state, ticket_id, "status", "Status Changed", &body).await
}

async fn patch_ticket_priority(
    Path(ticket_id): Path<i64>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<TicketPatchBody>,
) -> impl IntoResponse {
    if crate::types::TicketPriority::parse(&body.value).is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid priority" })),
        )
            .into_response();
    }
    patch_ticket_field(&state, ticket_id, "priority", "Priority Changed", &body).await
}

async fn patch_ticket_assignee(
    Path(ticket_id): Path<i64>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<TicketPatchBody>,
) -> impl IntoResponse {
    patch_ticket_field(&state, ticket_id, "assignee", "Assignee Changed", &body).await
}

async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

pub async fn run() {
    let _ = dotenvy::dotenv();

    let port = env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(4000);
    let database_url = resolve_database_url();

    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("failed to connect to postgres (set DATABASE_URL or POSTGRES_* env vars)");

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .expect("failed to run sqlx migrations");

    let state = Arc::new(AppState {
        db,
        ai_client: reqwest::Client::new(),
    });

    let app = Router::new()
        .route("/health", get(health))
        .route(
            "/api/webhooks/{platform}",
            get(webhook_verify).post(webhook_event),
        )
        .route("/api/tickets", get(list_tickets))
        .route("/api/tickets/{ticket_id}", get(get_ticket))
        .route("/api/tickets/{ticket_id}/status", patch(patch_ticket_status))
        .route(
            "/api/tickets/{ticket_id}/priority",
            patch(patch_ticket_priority),
        )
        .route(
            "/api/tickets/{ticket_id}/assignee",
            patch(patch_ticket_assignee),
        )
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind TCP listener");

    println!("support console server running at http://localhost:{port}");
    axum::serve(listener, app)
        .await
        .expect("server runtime failure");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_check_accepts_a_valid_hmac() {
        let secret = "top-secret";
        let body = br#"{"entry":[]}"#;
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));
        assert!(verify_meta_signature(secret, Some(&sig), body));
    }

    #[test]
    fn signature_check_rejects_bad_or_missing_signatures() {
        let secret = "top-secret";
        let body = br#"{"entry":[]}"#;
        assert!(!verify_meta_signature(secret, Some("sha256=deadbeef"), body));
        assert!(!verify_meta_signature(secret, None, body));
        // No secret configured means verification is disabled.
        assert!(verify_meta_signature("", None, body));
    }

    #[test]
    fn parses_whatsapp_webhook_payload() {
        let payload = serde_json::json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "contacts": [{ "wa_id": "15551234567", "profile": { "name": "Amara" } }],
                        "messages": [{
                            "from": "15551234567",
                            "id": "wamid.1",
                            "text": { "body": "my payment failed, this is urgent" }
                        }]
                    }
                }]
            }]
        });
        let inbound = whatsapp_inbound_messages(&payload);
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].sender_id, "15551234567");
        assert_eq!(inbound[0].sender_name, "Amara");
        assert_eq!(inbound[0].message_id, "wamid.1");
        assert_eq!(inbound[0].text, "my payment failed, this is urgent");
    }

    #[test]
    fn parses_messenger_webhook_payload_and_skips_echoes() {
        let payload = serde_json::json!({
            "entry": [{
                "messaging": [
                    {
                        "sender": { "id": "99001122" },
                        "message": { "mid": "m.1", "text": "what are your opening hours" }
                    },
                    {
                        "sender": { "id": "page" },
                        "message": { "mid": "m.2", "text": "echo", "is_echo": true }
                    },
                    {
                        "sender": { "id": "99001122" },
                        "delivery": { "mids": ["m.1"] }
                    }
                ]
            }]
        });
        let inbound = messenger_inbound_messages(&payload);
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].sender_id, "99001122");
        assert_eq!(inbound[0].message_id, "m.1");
    }

    #[test]
    fn unsupported_platforms_are_rejected() {
        assert!(is_supported_platform("whatsapp"));
        assert!(is_supported_platform("facebook"));
        assert!(is_supported_platform("instagram"));
        assert!(!is_supported_platform("telegram"));
    }
}
