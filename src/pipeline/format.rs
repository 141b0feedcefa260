//! Outbound message templates.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::pipeline::types::{LineItem, ProcessedTransaction};

/// Render a decimal amount as dollars with two places.
fn money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("${rounded:.2}")
}

/// Confirmation sent after a receipt is saved.
pub fn format_receipt_confirmation(
    merchant_name: &str,
    total: Decimal,
    category: Option<&str>,
    items: &[LineItem],
    payment_method: Option<&str>,
) -> String {
    let category = category.filter(|c| !c.is_empty()).unwrap_or("Other");
    let mut msg = format!(
        "✅ Receipt processed!\n\nMerchant: {merchant_name}\nTotal: {}\nCategory: {category}",
        money(total)
    );

    if let Some(payment) = payment_method.filter(|p| !p.is_empty()) {
        msg.push_str(&format!("\nPayment: {payment}"));
    }

    if !items.is_empty() {
        let lines: Vec<String> = items
            .iter()
            .map(|item| format!("- {}: {}", item.description, money(item.price)))
            .collect();
        msg.push_str(&format!("\n\nItems ({}):\n{}", items.len(), lines.join("\n")));
    }

    msg
}

/// Confirmation for a saved transaction.
pub fn confirmation_for(txn: &ProcessedTransaction) -> String {
    format_receipt_confirmation(
        &txn.merchant.name,
        txn.transaction.total,
        txn.merchant.category.as_deref(),
        &txn.items,
        txn.transaction.payment_method.as_deref(),
    )
}
