use regex::Regex;

use crate::types::{OrderInfo, OrderState};

/// Exact-token confirmation words, matched case-insensitively after
/// trimming. "ow" / "ඔව්" are the Sinhala yes.
pub const CONFIRMATION_WORDS: &[&str] = &["yes", "ow", "ඔව්"];

pub fn is_confirmation(message: &str) -> bool {
    let token = message.trim().to_lowercase();
    CONFIRMATION_WORDS.contains(&token.as_str())
}

/// What one turn did to the order, so the caller knows which side
/// effect (pending-ticket create, order-status update) is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAdvance {
    Unchanged,
    ReadyToConfirm,
    Confirmed,
}

/// Product phrase following an order verb, e.g. "I want to order the
/// Pro plan" -> "Pro plan". Case of the product text is preserved.
pub fn extract_product(message: &str) -> Option<String> {
    let re = Regex::new(r"(?i)\b(?:order|buy|purchase|get)\s+(?:the\s+|a\s+|an\s+|some\s+)?(.+)$")
        .ok()?;
    let captured = re.captures(message)?.get(1)?.as_str();

    let mut product = captured.trim().trim_end_matches(['.', '!', '?', ',']).trim();
    if let Some(stripped) = strip_suffix_word(product, "please") {
        product = stripped;
    }
    // A leading explicit quantity belongs to `quantity`, not the name.
    let product = Regex::new(r"^\d+\s*x?\s*")
        .map(|qty| qty.replace(product, "").into_owned())
        .unwrap_or_else(|_| product.to_string());

    let product = product.trim().to_string();
    if product.is_empty() {
        None
    } else {
        Some(product)
    }
}

fn strip_suffix_word<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    let trimmed = text.trim_end();
    if trimmed.to_lowercase().ends_with(word) {
        Some(trimmed[..trimmed.len() - word.len()].trim_end())
    } else {
        None
    }
}

/// Explicit quantity when the user stated one; 1 otherwise. Nothing is
/// inferred from ambiguous phrasing.
pub fn extract_quantity(message: &str) -> u32 {
    Regex::new(r"\b(\d+)\b")
        .ok()
        .and_then(|re| re.captures(message))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|qty| *qty > 0)
        .unwrap_or(1)
}

/// Advances the strict forward walk COLLECTING_INFO -> CONFIRMING ->
/// PROCESSING (-> COMPLETED via `complete_order`). Never regresses.
/// A CONFIRMING-state message that is not a recognized confirmation
/// word, or a confirmation with no pending ticket on file, leaves the
/// order unchanged.
pub fn advance_order(order: &mut OrderInfo, message: &str) -> OrderAdvance {
    match order.state {
        OrderState::CollectingInfo => {
            let Some(product) = extract_product(message) else {
                return OrderAdvance::Unchanged;
            };
            order.product = Some(product);
            order.quantity = extract_quantity(message);
            order.confirmed = false;
            order.state = OrderState::Confirming;
            OrderAdvance::ReadyToConfirm
        }
        OrderState::Confirming => {
            if !is_confirmation(message) || order.pending_order_id.is_none() {
                return OrderAdvance::Unchanged;
            }
            order.confirmed = true;
            order.state = OrderState::Processing;
            OrderAdvance::Confirmed
        }
        OrderState::Processing | OrderState::Completed => OrderAdvance::Unchanged,
    }
}

/// Final transition after the pending ticket was updated successfully.
pub fn complete_order(order: &mut OrderInfo) {
    if order.state == OrderState::Processing {
        order.state = OrderState::Completed;
    }
}
