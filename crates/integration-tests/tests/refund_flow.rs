//! Fulfillment and refunds, end to end over the slot-backed collaborators.

#![allow(clippy::unwrap_used)]

use marketstall_core::{Order, OrderStatus, ProductId, RefundStatus};
use marketstall_engine::{
    CheckoutSelection, CommerceError, Eligibility, Ineligibility, PersistencePolicy,
    RefundGateway, ValidationError,
};
use marketstall_integration_tests::{
    FailingRefundGateway, Harness, TestSession, address, admin, card, customer, default_products,
    deliver,
};
use rust_decimal::Decimal;

const REASON: &str = "Arrived damaged in transit";

/// Order product 1 (x1, $10) and product 2 (x2, $5 each).
async fn place_order<R: RefundGateway>(session: &mut TestSession<R>) -> Order {
    {
        let profile = session.profile_mut().unwrap();
        profile.addresses_mut().add(address("Home", true)).unwrap();
        profile.payment_methods_mut().add(card("4242")).unwrap();
    }
    session.add_to_cart(ProductId::new(1), 1).await.unwrap();
    session.add_to_cart(ProductId::new(2), 2).await.unwrap();
    session.checkout(CheckoutSelection::default()).await.unwrap()
}

#[tokio::test]
async fn test_partial_then_full_refund() {
    let harness = Harness::new(default_products());
    let mut session = harness.open(customer(1)).await.unwrap();
    let order = place_order(&mut session).await;
    deliver(&mut session, order.id).await.unwrap();

    let request = session
        .request_refund(order.id, &[ProductId::new(2)], REASON)
        .await
        .unwrap();
    assert_eq!(request.status, RefundStatus::Pending);
    assert_eq!(request.amount, Decimal::from(10));
    assert_eq!(
        session.refund_eligibility(order.id).unwrap(),
        Eligibility::Ineligible(Ineligibility::PendingRequest(request.id))
    );
    assert!(matches!(
        session
            .request_refund(order.id, &[ProductId::new(1)], REASON)
            .await,
        Err(CommerceError::Validation(ValidationError::NotEligible { .. }))
    ));
    drop(session);

    // Resolved by a different user holding the admin role
    let mut admin_session = harness.open(admin(99)).await.unwrap();
    assert!(admin_session.orders().unwrap().get(order.id).is_some());
    let approved = admin_session.resolve_refund(request.id, true).await.unwrap();
    assert_eq!(approved.status, RefundStatus::Approved);
    assert!(approved.response_date.is_some());
    drop(admin_session);

    let mut session = harness.open(customer(1)).await.unwrap();
    assert_eq!(
        session.orders().unwrap().require(order.id).unwrap().status,
        OrderStatus::PartiallyRefunded
    );
    assert!(matches!(
        session
            .request_refund(order.id, &[ProductId::new(2)], REASON)
            .await,
        Err(CommerceError::Validation(ValidationError::ItemAlreadyRefunded(_)))
    ));

    let rest = session
        .request_refund(order.id, &[ProductId::new(1)], REASON)
        .await
        .unwrap();
    assert_eq!(rest.amount, Decimal::from(10));
    session.resolve_refund(rest.id, true).await.unwrap();

    assert_eq!(
        session.orders().unwrap().require(order.id).unwrap().status,
        OrderStatus::Refunded
    );
    assert_eq!(
        session.refund_eligibility(order.id).unwrap(),
        Eligibility::Ineligible(Ineligibility::Refunded)
    );
}

#[tokio::test]
async fn test_rejection_keeps_order_and_allows_resubmission() {
    let harness = Harness::new(default_products());
    let mut session = harness.open(customer(1)).await.unwrap();
    let order = place_order(&mut session).await;
    deliver(&mut session, order.id).await.unwrap();

    let request = session
        .request_refund(order.id, &[ProductId::new(1), ProductId::new(2)], REASON)
        .await
        .unwrap();
    assert_eq!(request.amount, Decimal::from(20));

    let rejected = session.resolve_refund(request.id, false).await.unwrap();
    assert_eq!(rejected.status, RefundStatus::Rejected);
    assert_eq!(
        session.orders().unwrap().require(order.id).unwrap().status,
        OrderStatus::Delivered
    );
    assert!(matches!(
        session.resolve_refund(request.id, true).await,
        Err(CommerceError::RefundAlreadyResolved {
            status: RefundStatus::Rejected,
            ..
        })
    ));

    assert!(session.refund_eligibility(order.id).unwrap().is_eligible());
    session
        .request_refund(order.id, &[ProductId::new(1)], REASON)
        .await
        .unwrap();
    assert_eq!(session.refunds().unwrap().requests_for(order.id).count(), 2);
}

#[tokio::test]
async fn test_selection_flow() {
    let harness = Harness::new(default_products());
    let mut session = harness.open(customer(1)).await.unwrap();
    let order = place_order(&mut session).await;
    deliver(&mut session, order.id).await.unwrap();

    {
        let selection = session.refunds_mut().unwrap().begin_selection(order.id);
        assert!(selection.toggle(ProductId::new(1)));
        assert!(selection.toggle(ProductId::new(2)));
        assert!(!selection.toggle(ProductId::new(1)));
        assert_eq!(selection.selected_amount(&order), Decimal::from(10));
    }

    let request = session
        .request_refund_for_selection(order.id, REASON)
        .await
        .unwrap();
    assert_eq!(request.items.len(), 1);
    assert_eq!(request.items[0].product_id, ProductId::new(2));
    assert!(session.refunds().unwrap().selection().is_none());
}

#[tokio::test]
async fn test_refund_preconditions() {
    let harness = Harness::new(default_products());
    let mut session = harness.open(customer(1)).await.unwrap();
    let order = place_order(&mut session).await;
    deliver(&mut session, order.id).await.unwrap();

    assert!(matches!(
        session.request_refund(order.id, &[], REASON).await,
        Err(CommerceError::Validation(ValidationError::NoItemsSelected))
    ));
    assert!(matches!(
        session
            .request_refund(order.id, &[ProductId::new(3)], REASON)
            .await,
        Err(CommerceError::Validation(ValidationError::ItemNotInOrder { .. }))
    ));
    assert!(matches!(
        session
            .request_refund(order.id, &[ProductId::new(1)], "  too short  ")
            .await,
        Err(CommerceError::Validation(ValidationError::ReasonTooShort {
            min: 10,
            actual: 9
        }))
    ));
    assert!(session.refunds().unwrap().requests().is_empty());
}

#[tokio::test]
async fn test_canceled_order_is_not_refundable() {
    let harness = Harness::new(default_products());
    let mut session = harness.open(customer(1)).await.unwrap();
    let order = place_order(&mut session).await;

    session
        .apply_fulfillment_update(order.id, OrderStatus::Canceled, None)
        .await
        .unwrap();
    assert!(matches!(
        session
            .apply_fulfillment_update(order.id, OrderStatus::Processing, None)
            .await,
        Err(CommerceError::InvalidTransition(_))
    ));
    assert_eq!(
        session.refund_eligibility(order.id).unwrap(),
        Eligibility::Ineligible(Ineligibility::Canceled)
    );
}

#[tokio::test]
async fn test_gateway_failure_leaves_state_unchanged() {
    let harness = Harness::new(default_products());
    let mut session = harness
        .open_with(customer(1), FailingRefundGateway, PersistencePolicy::BestEffort)
        .await
        .unwrap();
    let order = place_order(&mut session).await;
    deliver(&mut session, order.id).await.unwrap();

    let err = session
        .request_refund(order.id, &[ProductId::new(1)], REASON)
        .await
        .unwrap_err();
    assert!(err.is_remote());
    assert!(session.refunds().unwrap().requests().is_empty());
    assert!(session.refund_eligibility(order.id).unwrap().is_eligible());
}
