use crate::types::{Intent, IssueType, UrgencyLevel};

/// Any of these phrases short-circuits classification to
/// HUMAN_AGENT_REQUEST. Matching is a case-insensitive substring check
/// over the lowercased message.
pub const HUMAN_AGENT_KEYWORDS: &[&str] = &[
    "human agent",
    "speak to a human",
    "talk to a human",
    "speak to an agent",
    "talk to an agent",
    "real person",
    "live agent",
    "representative",
    "customer service",
    "speak to someone",
    "human",
];

pub const URGENCY_HIGH_KEYWORDS: &[&str] = &[
    "urgent",
    "emergency",
    "immediately",
    "asap",
    "right now",
    "critical",
    "failed",
    "not working",
    "broken",
    "down",
    "unusable",
];

pub const URGENCY_MEDIUM_KEYWORDS: &[&str] = &[
    "soon",
    "today",
    "quickly",
    "important",
    "problem",
    "issue",
    "waiting",
];

pub const TECHNICAL_KEYWORDS: &[&str] = &[
    "error", "bug", "crash", "not working", "broken", "glitch", "install", "update", "freezes",
];

pub const BILLING_KEYWORDS: &[&str] = &[
    "payment", "bill", "billing", "invoice", "charge", "charged", "refund", "subscription", "price",
];

pub const ACCOUNT_KEYWORDS: &[&str] = &[
    "account", "login", "log in", "password", "sign in", "locked out", "profile", "email",
];

pub const PRODUCT_KEYWORDS: &[&str] = &[
    "product",
    "item",
    "delivery",
    "shipping",
    "warranty",
    "stock",
    "availability",
    "defective",
];

pub const SUPPORT_INTENT_KEYWORDS: &[&str] = &[
    "help",
    "support",
    "problem",
    "issue",
    "error",
    "broken",
    "not working",
    "failed",
    "fix",
    "trouble",
    "complaint",
    "cannot",
    "can't",
    "stopped working",
];

pub const ORDER_INTENT_KEYWORDS: &[&str] = &[
    "order",
    "buy",
    "purchase",
    "place an order",
    "want to order",
    "checkout",
    "subscribe",
    "plan",
    "pricing",
];

pub const GENERAL_INTENT_KEYWORDS: &[&str] = &[
    "what",
    "when",
    "where",
    "how",
    "who",
    "why",
    "hours",
    "open",
    "location",
    "address",
    "info",
    "information",
    "question",
    "tell me",
];

/// Keyword set for one urgency level. Low has no keywords; it is the
/// default when nothing stronger matches.
pub fn urgency_keywords(level: UrgencyLevel) -> &'static [&'static str] {
    match level {
        UrgencyLevel::High => URGENCY_HIGH_KEYWORDS,
        UrgencyLevel::Medium => URGENCY_MEDIUM_KEYWORDS,
        UrgencyLevel::Low => &[],
    }
}

pub fn issue_type_keywords(issue: IssueType) -> &'static [&'static str] {
    match issue {
        IssueType::Technical => TECHNICAL_KEYWORDS,
        IssueType::Billing => BILLING_KEYWORDS,
        IssueType::Account => ACCOUNT_KEYWORDS,
        IssueType::Product => PRODUCT_KEYWORDS,
    }
}

pub fn intent_keywords(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::HumanAgentRequest => HUMAN_AGENT_KEYWORDS,
        Intent::SupportRequest => SUPPORT_INTENT_KEYWORDS,
        Intent::OrderPlacement => ORDER_INTENT_KEYWORDS,
        Intent::GeneralQuery => GENERAL_INTENT_KEYWORDS,
    }
}

pub const ALL_ISSUE_TYPES: &[IssueType] = &[
    IssueType::Technical,
    IssueType::Billing,
    IssueType::Account,
    IssueType::Product,
];
