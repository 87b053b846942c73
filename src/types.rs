use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    HumanAgentRequest,
    SupportRequest,
    OrderPlacement,
    GeneralQuery,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::HumanAgentRequest => "HUMAN_AGENT_REQUEST",
            Intent::SupportRequest => "SUPPORT_REQUEST",
            Intent::OrderPlacement => "ORDER_PLACEMENT",
            Intent::GeneralQuery => "GENERAL_QUERY",
        }
    }

    pub fn parse(value: &str) -> Option<Intent> {
        match value {
            "HUMAN_AGENT_REQUEST" => Some(Intent::HumanAgentRequest),
            "SUPPORT_REQUEST" => Some(Intent::SupportRequest),
            "ORDER_PLACEMENT" => Some(Intent::OrderPlacement),
            "GENERAL_QUERY" => Some(Intent::GeneralQuery),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
}

impl UrgencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Low => "low",
            UrgencyLevel::Medium => "medium",
            UrgencyLevel::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<UrgencyLevel> {
        match value {
            "low" => Some(UrgencyLevel::Low),
            "medium" => Some(UrgencyLevel::Medium),
            "high" => Some(UrgencyLevel::High),
            _ => None,
        }
    }
}

impl Default for UrgencyLevel {
    fn default() -> UrgencyLevel {
        UrgencyLevel::Low
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Technical,
    Billing,
    Account,
    Product,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Technical => "technical",
            IssueType::Billing => "billing",
            IssueType::Account => "account",
            IssueType::Product => "product",
        }
    }

    pub fn parse(value: &str) -> Option<IssueType> {
        match value {
            "technical" => Some(IssueType::Technical),
            "billing" => Some(IssueType::Billing),
            "account" => Some(IssueType::Account),
            "product" => Some(IssueType::Product),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    CollectingInfo,
    Confirming,
    Processing,
    Completed,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::CollectingInfo => "COLLECTING_INFO",
            OrderState::Confirming => "CONFIRMING",
            OrderState::Processing => "PROCESSING",
            OrderState::Completed => "COMPLETED",
        }
    }

    pub fn parse(value: &str) -> Option<OrderState> {
        match value {
            "COLLECTING_INFO" => Some(OrderState::CollectingInfo),
            "CONFIRMING" => Some(OrderState::Confirming),
            "PROCESSING" => Some(OrderState::Processing),
            "COMPLETED" => Some(OrderState::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "LOW",
            TicketPriority::Medium => "MEDIUM",
            TicketPriority::High => "HIGH",
        }
    }

    pub fn parse(value: &str) -> Option<TicketPriority> {
        match value {
            "LOW" => Some(TicketPriority::Low),
            "MEDIUM" => Some(TicketPriority::Medium),
            "HIGH" => Some(TicketPriority::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    New,
    InProgress,
    Escalated,
    Completed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::New => "New",
            TicketStatus::InProgress => "InProgress",
            TicketStatus::Escalated => "Escalated",
            TicketStatus::Completed => "Completed",
        }
    }

    pub fn parse(value: &str) -> Option<TicketStatus> {
        match value {
            "New" => Some(TicketStatus::New),
            "InProgress" => Some(TicketStatus::InProgress),
            "Escalated" => Some(TicketStatus::Escalated),
            "Completed" => Some(TicketStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketIntentType {
    Support,
    Request,
    Order,
}

impl TicketIntentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketIntentType::Support => "SUPPORT",
            TicketIntentType::Request => "REQUEST",
            TicketIntentType::Order => "ORDER",
        }
    }
}

/// Pending order state for one conversation. One active record per
/// conversation; the conversation id is the owning key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderInfo {
    pub product: Option<String>,
    pub quantity: u32,
    pub state: OrderState,
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_order_id: Option<i64>,
}

impl OrderInfo {
    pub fn new() -> OrderInfo {
        OrderInfo {
            product: None,
            quantity: 1,
            state: OrderState::CollectingInfo,
            confirmed: false,
            pending_order_id: None,
        }
    }
}

impl Default for OrderInfo {
    fn default() -> OrderInfo {
        OrderInfo::new()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedEntities {
    #[serde(default)]
    pub product_mentions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<IssueType>,
    #[serde(default)]
    pub urgency_level: UrgencyLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_info: Option<OrderInfo>,
}

/// One classification result per inbound message. `requires_escalation`
/// is derived, never independently set; `escalation_reason` is present
/// iff it is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentAnalysis {
    pub intent: Intent,
    pub confidence: f64,
    pub requires_escalation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
    pub detected_entities: DetectedEntities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: i64,
    pub title: String,
    pub customer_name: String,
    pub platform: String,
    #[serde(rename = "type")]
    pub ticket_type: String,
    pub status: String,
    pub priority: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_status: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Insert shape for a new ticket; the store assigns the integer id.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketDraft {
    pub title: String,
    pub customer_name: String,
    pub platform: String,
    pub ticket_type: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub body: String,
    pub intent_type: Option<TicketIntentType>,
    pub confidence_score: Option<f64>,
    pub escalation_reason: Option<String>,
    pub context: Option<String>,
    pub conversation_id: Option<String>,
    pub message_id: Option<String>,
    pub order_status: Option<String>,
}

/// Append-only audit record. Never updated after insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketHistoryEntry {
    pub ticket_id: i64,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    pub actor: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketCreationInfo {
    pub ticket_type: TicketIntentType,
    pub priority: TicketPriority,
    pub context: String,
    pub message_id: String,
    pub required_actions: Vec<String>,
}

pub struct AppState {
    pub db: PgPool,
    pub ai_client: reqwest::Client,
}
