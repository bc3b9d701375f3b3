//! Refund workflow.
//!
//! Submission and resolution are both split into a `prepare` step that
//! validates and builds the new record without touching state, and an
//! `apply`/`commit` step that stores it. The session calls the refund
//! gateway between the two so a failed remote call creates nothing.
//!
//! Approval coverage is cumulative: an order becomes `refunded` once the
//! approved requests together cover every one of its items, and
//! `partially_refunded` before that.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use marketstall_core::{
    MIN_REFUND_REASON_CHARS, Order, OrderId, OrderItem, OrderStatus, ProductId, RefundId,
    RefundRequest, RefundStatus, StatusTransitionError, items_total,
};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::{CommerceError, EntityKind, Result, ValidationError};
use crate::orders::{Eligibility, refund_eligibility};

/// The outcome of resolving a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub request: RefundRequest,
    /// The order with its refund status applied, when the request was approved.
    pub order: Option<Order>,
}

/// Items picked for a refund on one order, before submission.
///
/// Holds product IDs only; amounts are read from the order's frozen items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundSelection {
    order_id: OrderId,
    selected: BTreeSet<ProductId>,
}

impl RefundSelection {
    #[must_use]
    pub const fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            selected: BTreeSet::new(),
        }
    }

    #[must_use]
    pub const fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Flip one product in or out. Returns whether it is now selected.
    pub fn toggle(&mut self, product_id: ProductId) -> bool {
        if self.selected.remove(&product_id) {
            false
        } else {
            self.selected.insert(product_id);
            true
        }
    }

    pub fn select_all(&mut self, order: &Order) {
        self.selected = order.items.iter().map(|i| i.product_id).collect();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    #[must_use]
    pub fn is_selected(&self, product_id: ProductId) -> bool {
        self.selected.contains(&product_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    #[must_use]
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.selected.iter().copied().collect()
    }

    /// The order's items that are currently selected.
    #[must_use]
    pub fn selected_items<'a>(&self, order: &'a Order) -> Vec<&'a OrderItem> {
        order
            .items
            .iter()
            .filter(|i| self.selected.contains(&i.product_id))
            .collect()
    }

    /// Preview of the amount a submission would request.
    #[must_use]
    pub fn selected_amount(&self, order: &Order) -> Decimal {
        items_total(self.selected_items(order))
    }
}

/// Refund requests for the signed-in user's orders.
#[derive(Debug)]
pub struct RefundWorkflow {
    requests: Vec<RefundRequest>,
    /// Provisional ID for the next request; `None` once exhausted.
    next_id: Option<i32>,
    selection: Option<RefundSelection>,
}

impl Default for RefundWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl RefundWorkflow {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            requests: Vec::new(),
            next_id: Some(1),
            selection: None,
        }
    }

    /// Replace the known requests with a fresh listing.
    pub fn replace_all(&mut self, requests: Vec<RefundRequest>) {
        self.next_id = requests
            .iter()
            .map(|r| r.id.as_i32())
            .max()
            .map_or(Some(1), |max| max.checked_add(1));
        self.requests = requests;
        debug!(count = self.requests.len(), "Refund requests replaced");
    }

    #[must_use]
    pub fn requests(&self) -> &[RefundRequest] {
        &self.requests
    }

    #[must_use]
    pub fn get(&self, id: RefundId) -> Option<&RefundRequest> {
        self.requests.iter().find(|r| r.id == id)
    }

    /// Requests raised against `order_id`, oldest first.
    pub fn requests_for(&self, order_id: OrderId) -> impl Iterator<Item = &RefundRequest> {
        self.requests.iter().filter(move |r| r.order_id == order_id)
    }

    #[must_use]
    pub fn eligibility(&self, order: &Order) -> Eligibility {
        refund_eligibility(order, self.requests_for(order.id))
    }

    /// Products of `order_id` already covered by an approved request.
    #[must_use]
    pub fn refunded_products(&self, order_id: OrderId) -> BTreeSet<ProductId> {
        self.requests_for(order_id)
            .filter(|r| r.status == RefundStatus::Approved)
            .flat_map(|r| r.items.iter().map(|i| i.product_id))
            .collect()
    }

    /// The refund status the approved requests imply for `order`, when the
    /// order's own status lags behind them.
    ///
    /// Returns `None` for orders outside `delivered`/`partially_refunded` and
    /// for orders whose status already matches.
    #[must_use]
    pub fn lagging_refund_status(&self, order: &Order) -> Option<OrderStatus> {
        if !matches!(
            order.status,
            OrderStatus::Delivered | OrderStatus::PartiallyRefunded
        ) {
            return None;
        }
        let covered = self.refunded_products(order.id);
        if covered.is_empty() {
            return None;
        }
        let target = coverage_status(order, &covered);
        (target != order.status).then_some(target)
    }

    // -------------------------------------------------------------------------
    // Submission
    // -------------------------------------------------------------------------

    /// Validate a request and build it with a provisional ID.
    ///
    /// # Errors
    ///
    /// Returns `Validation` naming the first failed check, in order:
    /// eligibility, empty selection, duplicate product, product not in the
    /// order, product already refunded, reason length. Returns
    /// `IdsExhausted` if no provisional ID is left.
    pub fn prepare(
        &self,
        order: &Order,
        selected: &[ProductId],
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<RefundRequest> {
        if let Eligibility::Ineligible(reason) = self.eligibility(order) {
            return Err(ValidationError::NotEligible {
                order_id: order.id,
                reason,
            }
            .into());
        }
        if selected.is_empty() {
            return Err(ValidationError::NoItemsSelected.into());
        }

        let refunded = self.refunded_products(order.id);
        let mut seen = HashSet::with_capacity(selected.len());
        let mut items = Vec::with_capacity(selected.len());
        for &product_id in selected {
            if !seen.insert(product_id) {
                return Err(ValidationError::DuplicateItem(product_id).into());
            }
            let item = order.item(product_id).ok_or(ValidationError::ItemNotInOrder {
                order_id: order.id,
                product_id,
            })?;
            if refunded.contains(&product_id) {
                return Err(ValidationError::ItemAlreadyRefunded(product_id).into());
            }
            items.push(item.clone());
        }

        let reason = reason.trim();
        let actual = reason.chars().count();
        if actual < MIN_REFUND_REASON_CHARS {
            return Err(ValidationError::ReasonTooShort {
                min: MIN_REFUND_REASON_CHARS,
                actual,
            }
            .into());
        }

        let id = self
            .next_id
            .ok_or(CommerceError::IdsExhausted {
                kind: EntityKind::Refund,
            })?;
        Ok(RefundRequest {
            id: RefundId::new(id),
            order_id: order.id,
            reason: reason.to_string(),
            amount: items_total(&items),
            status: RefundStatus::Pending,
            request_date: at,
            response_date: None,
            items,
        })
    }

    /// Store a prepared (and possibly gateway-renumbered) request.
    ///
    /// Resets the item selection if it was for the same order.
    pub fn commit(&mut self, request: RefundRequest) -> RefundRequest {
        self.next_id = request
            .id
            .as_i32()
            .checked_add(1)
            .and_then(|after| self.next_id.map(|next| next.max(after)));
        if self
            .selection
            .as_ref()
            .is_some_and(|s| s.order_id == request.order_id)
        {
            self.selection = None;
        }

        info!(
            refund_id = %request.id,
            order_id = %request.order_id,
            amount = %request.amount,
            items = request.items.len(),
            "Refund request recorded"
        );

        let stored = request.clone();
        match self.requests.iter_mut().find(|r| r.id == request.id) {
            Some(existing) => *existing = request,
            None => self.requests.push(request),
        }
        stored
    }

    /// [`RefundWorkflow::prepare`] followed by [`RefundWorkflow::commit`].
    ///
    /// # Errors
    ///
    /// Same as [`RefundWorkflow::prepare`].
    pub fn submit(
        &mut self,
        order: &Order,
        selected: &[ProductId],
        reason: &str,
    ) -> Result<RefundRequest> {
        let request = self.prepare(order, selected, reason, Utc::now())?;
        Ok(self.commit(request))
    }

    // -------------------------------------------------------------------------
    // Selection
    // -------------------------------------------------------------------------

    /// Start a fresh selection for `order_id`, discarding any other.
    pub fn begin_selection(&mut self, order_id: OrderId) -> &mut RefundSelection {
        self.selection.insert(RefundSelection::new(order_id))
    }

    #[must_use]
    pub const fn selection(&self) -> Option<&RefundSelection> {
        self.selection.as_ref()
    }

    pub const fn selection_mut(&mut self) -> Option<&mut RefundSelection> {
        self.selection.as_mut()
    }

    /// [`RefundWorkflow::prepare`] using the current selection.
    ///
    /// # Errors
    ///
    /// `Validation(NoItemsSelected)` if there is no selection for this order,
    /// otherwise the same as [`RefundWorkflow::prepare`].
    pub fn prepare_selection(
        &self,
        order: &Order,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<RefundRequest> {
        let selected = self
            .selection
            .as_ref()
            .filter(|s| s.order_id == order.id)
            .map(RefundSelection::product_ids)
            .unwrap_or_default();
        self.prepare(order, &selected, reason, at)
    }

    // -------------------------------------------------------------------------
    // Resolution
    // -------------------------------------------------------------------------

    /// Build the resolved request and, on approval, the order with its new
    /// refund status. Nothing is stored.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `request_id` is unknown
    /// - `RefundAlreadyResolved` if the request is not pending
    /// - `InvalidTransition` if approving and the order is not delivered or
    ///   partially refunded
    pub fn prepare_resolution(
        &self,
        request_id: RefundId,
        approved: bool,
        order: &Order,
        at: DateTime<Utc>,
    ) -> Result<Resolution> {
        let mut request = self
            .get(request_id)
            .cloned()
            .ok_or_else(|| CommerceError::not_found(EntityKind::Refund, request_id))?;
        if request.status.is_resolved() {
            return Err(CommerceError::RefundAlreadyResolved {
                id: request.id,
                status: request.status,
            });
        }
        if request.order_id != order.id {
            return Err(CommerceError::not_found(EntityKind::Order, request.order_id));
        }

        let order = if approved {
            let mut covered = self.refunded_products(order.id);
            covered.extend(request.product_ids());
            let target = coverage_status(order, &covered);
            if !matches!(
                order.status,
                OrderStatus::Delivered | OrderStatus::PartiallyRefunded
            ) {
                return Err(StatusTransitionError {
                    from: order.status,
                    to: target,
                }
                .into());
            }
            let mut order = order.clone();
            order.transition_to(target, at)?;
            Some(order)
        } else {
            None
        };

        request.status = if approved {
            RefundStatus::Approved
        } else {
            RefundStatus::Rejected
        };
        request.response_date = Some(at);
        Ok(Resolution { request, order })
    }

    /// Store a resolved request. Returns the updated order, if any, for the
    /// caller to record.
    pub fn apply_resolution(&mut self, resolution: Resolution) -> Option<Order> {
        let Resolution { request, order } = resolution;
        info!(
            refund_id = %request.id,
            status = %request.status,
            order_status = order.as_ref().map(|o| o.status.as_str()),
            "Refund request resolved"
        );
        if let Some(stored) = self.requests.iter_mut().find(|r| r.id == request.id) {
            *stored = request;
        }
        order
    }

    /// [`RefundWorkflow::prepare_resolution`] followed by
    /// [`RefundWorkflow::apply_resolution`].
    ///
    /// # Errors
    ///
    /// Same as [`RefundWorkflow::prepare_resolution`].
    pub fn resolve(
        &mut self,
        request_id: RefundId,
        approved: bool,
        order: &Order,
    ) -> Result<Option<Order>> {
        let resolution = self.prepare_resolution(request_id, approved, order, Utc::now())?;
        Ok(self.apply_resolution(resolution))
    }
}

/// `refunded` once `covered` spans every item of `order`, else
/// `partially_refunded`.
fn coverage_status(order: &Order, covered: &BTreeSet<ProductId>) -> OrderStatus {
    if order.items.iter().all(|i| covered.contains(&i.product_id)) {
        OrderStatus::Refunded
    } else {
        OrderStatus::PartiallyRefunded
    }
}
