//! Refund requests raised against an order's items.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{OrderId, ProductId, RefundId};
use super::order::OrderItem;
use super::status::RefundStatus;

/// Minimum number of characters in a refund reason.
pub const MIN_REFUND_REASON_CHARS: usize = 10;

/// A refund request. References its order by ID only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub id: RefundId,
    pub order_id: OrderId,
    pub reason: String,
    /// Σ price × quantity over `items`.
    pub amount: Decimal,
    pub status: RefundStatus,
    pub request_date: DateTime<Utc>,
    #[serde(default)]
    pub response_date: Option<DateTime<Utc>>,
    pub items: Vec<OrderItem>,
}

impl RefundRequest {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == RefundStatus::Pending
    }

    #[must_use]
    pub fn product_ids(&self) -> BTreeSet<ProductId> {
        self.items.iter().map(|item| item.product_id).collect()
    }
}
