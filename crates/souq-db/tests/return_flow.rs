//! Return flow integration tests: the window boundary, approval bookkeeping
//! (wallet credit + point deduction), rejection un-restocking, and the
//! one-shot resolution guarantee.

mod common;

use common::*;
use souq_core::{CoreError, ErrorKind, LoyaltyTxType, OrderStatus, ReturnStatus};
use souq_db::repository::loyalty;
use souq_db::service::Actor;
use souq_db::{CreateReturnRequest, ReturnItemRequest};

fn return_request(order_id: i64, items: Vec<(&str, i64)>) -> CreateReturnRequest {
    CreateReturnRequest {
        order_id,
        reason: "damaged on arrival".to_string(),
        items: items
            .into_iter()
            .map(|(product_id, quantity)| ReturnItemRequest {
                product_id: product_id.to_string(),
                quantity,
            })
            .collect(),
    }
}

/// Creates, delivers and backdates an order; returns its id.
async fn delivered_order(ctx: &TestCtx, total: i64, days_ago: i64, hours_ago: i64) -> i64 {
    let snapshot = ctx
        .orders
        .create_order(
            &Actor::customer("u1"),
            order_request(vec![item("p1", 2, total / 2)], total),
        )
        .await
        .unwrap();
    deliver(ctx, snapshot.order.id).await;
    backdate_delivery(ctx, snapshot.order.id, days_ago, hours_ago).await;
    snapshot.order.id
}

#[tokio::test]
async fn window_boundary_is_inclusive() {
    let ctx = setup().await;
    seed_user(&ctx, "u1", 0).await;
    seed_stock(&ctx, "b1", "p1", 100).await;
    let customer = Actor::customer("u1");

    // 6 days 23 hours after delivery: accepted.
    let inside = delivered_order(&ctx, 20000, 6, 23).await;
    let snapshot = ctx
        .returns
        .create_return(&customer, return_request(inside, vec![("p1", 2)]))
        .await
        .unwrap();
    assert_eq!(snapshot.request.status, ReturnStatus::Pending);
    assert!(snapshot.request.code.starts_with("RET-"));

    // 8 days after delivery: rejected with the delivery timestamp.
    let outside = delivered_order(&ctx, 20000, 8, 0).await;
    let err = ctx
        .returns
        .create_return(&customer, return_request(outside, vec![("p1", 2)]))
        .await
        .unwrap_err();
    match err {
        CoreError::ReturnWindowElapsed { window_days, .. } => assert_eq!(window_days, 7),
        other => panic!("expected ReturnWindowElapsed, got {other:?}"),
    }
}

#[tokio::test]
async fn only_delivered_orders_are_returnable() {
    let ctx = setup().await;
    seed_user(&ctx, "u1", 0).await;
    seed_stock(&ctx, "b1", "p1", 100).await;

    let snapshot = ctx
        .orders
        .create_order(&Actor::customer("u1"), order_request(vec![item("p1", 1, 500)], 500))
        .await
        .unwrap();

    let err = ctx
        .returns
        .create_return(
            &Actor::customer("u1"),
            return_request(snapshot.order.id, vec![("p1", 1)]),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::NotReturnable {
            status: OrderStatus::Pending
        }
    ));
}

#[tokio::test]
async fn returned_items_must_match_the_order() {
    let ctx = setup().await;
    seed_user(&ctx, "u1", 0).await;
    seed_stock(&ctx, "b1", "p1", 100).await;
    let order_id = delivered_order(&ctx, 20000, 1, 0).await;
    let customer = Actor::customer("u1");

    // More than ordered, unknown product, empty list.
    for items in [vec![("p1", 5)], vec![("p9", 1)], vec![]] {
        let err = ctx
            .returns
            .create_return(&customer, return_request(order_id, items))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

#[tokio::test]
async fn approve_credits_wallet_and_deducts_points() {
    let ctx = setup().await;
    seed_user(&ctx, "u1", 0).await;
    seed_stock(&ctx, "b1", "p1", 100).await;

    // EGP 123.75 order: 123 points earned at delivery.
    let snapshot = ctx
        .orders
        .create_order(&Actor::customer("u1"), order_request(vec![item("p1", 1, 12375)], 12375))
        .await
        .unwrap();
    deliver(&ctx, snapshot.order.id).await;
    assert_eq!(points_balance(&ctx, "u1").await, 123);
    let (on_hand, _) = stock_levels(&ctx, "b1", "p1").await;

    let created = ctx
        .returns
        .create_return(
            &Actor::customer("u1"),
            return_request(snapshot.order.id, vec![("p1", 1)]),
        )
        .await
        .unwrap();

    // Item back on the shelf at request time, order parked for resolution.
    assert_eq!(stock_levels(&ctx, "b1", "p1").await.0, on_hand + 1);
    let parked = ctx
        .orders
        .get_order(&Actor::customer("u1"), snapshot.order.id)
        .await
        .unwrap();
    assert_eq!(parked.order.status, OrderStatus::ReturnRequested);

    // refund = 12375 - 1500 border fee - 0 shipping.
    assert_eq!(created.request.refund_piastres, 10875);
    assert_eq!(created.request.points_to_deduct, 123);

    let resolved = ctx
        .returns
        .update_return_status(
            &Actor::admin("a1"),
            created.request.id,
            ReturnStatus::Approved,
            Some("verified damage"),
        )
        .await
        .unwrap();
    assert_eq!(resolved.request.status, ReturnStatus::Approved);
    assert_eq!(resolved.request.admin_notes.as_deref(), Some("verified damage"));

    assert_eq!(wallet_balance(&ctx, "u1").await, 10875);
    assert_eq!(points_balance(&ctx, "u1").await, 0);
    assert_ledger_consistent(&ctx, "u1").await;

    let closed = ctx
        .orders
        .get_order(&Actor::customer("u1"), snapshot.order.id)
        .await
        .unwrap();
    assert_eq!(closed.order.status, OrderStatus::Returned);
}

#[tokio::test]
async fn approval_deduction_clamps_balance_but_ledgers_full_amount() {
    let ctx = setup().await;
    seed_user(&ctx, "u1", 0).await;
    seed_stock(&ctx, "b1", "p1", 100).await;
    seed_stock(&ctx, "b1", "p2", 100).await;
    let customer = Actor::customer("u1");

    // EGP 123.75 order earns 123 points at delivery.
    let first = ctx
        .orders
        .create_order(&customer, order_request(vec![item("p1", 1, 12375)], 12375))
        .await
        .unwrap();
    deliver(&ctx, first.order.id).await;
    assert_eq!(points_balance(&ctx, "u1").await, 123);

    // Spend every point on a second order, leaving the balance at zero.
    let mut req = order_request(vec![item("p2", 1, 5000)], 5000);
    req.loyalty_points_to_spend = Some(123);
    ctx.orders.create_order(&customer, req).await.unwrap();
    assert_eq!(points_balance(&ctx, "u1").await, 0);

    // Returning the first order still reverses its 123 earned points.
    let created = ctx
        .returns
        .create_return(&customer, return_request(first.order.id, vec![("p1", 1)]))
        .await
        .unwrap();
    ctx.returns
        .update_return_status(&Actor::admin("a1"), created.request.id, ReturnStatus::Approved, None)
        .await
        .unwrap();

    // The balance clamps at zero; it never goes negative.
    assert_eq!(points_balance(&ctx, "u1").await, 0);

    // The ledger entry records the full -123 anyway, so the reversal
    // stays auditable. This is the one path where balance != sum(ledger):
    // +123 earned - 123 spent - 123 deducted = -123 in the ledger.
    let mut conn = ctx.db.pool().acquire().await.unwrap();
    let entries = loyalty::history(&mut conn, "u1", 10).await.unwrap();
    let deduction = entries
        .iter()
        .find(|e| e.tx_type == LoyaltyTxType::Deduct)
        .expect("deduct entry missing from ledger");
    assert_eq!(deduction.amount, -123);
    assert_eq!(deduction.order_id, Some(first.order.id));
    assert_eq!(loyalty::ledger_sum(&mut conn, "u1").await.unwrap(), -123);
}

#[tokio::test]
async fn shipping_fee_reduces_the_refund() {
    let ctx = setup().await;
    seed_user(&ctx, "u1", 0).await;
    seed_stock(&ctx, "b1", "p1", 100).await;

    let mut req = order_request(vec![item("p1", 1, 20000)], 20000);
    req.shipping_piastres = 2500;
    let snapshot = ctx
        .orders
        .create_order(&Actor::customer("u1"), req)
        .await
        .unwrap();
    deliver(&ctx, snapshot.order.id).await;

    let created = ctx
        .returns
        .create_return(
            &Actor::customer("u1"),
            return_request(snapshot.order.id, vec![("p1", 1)]),
        )
        .await
        .unwrap();

    // 20000 - 1500 border - 2500 shipping.
    assert_eq!(created.request.refund_piastres, 16000);
}

#[tokio::test]
async fn reject_unrestocks_and_revives_the_order() {
    let ctx = setup().await;
    seed_user(&ctx, "u1", 0).await;
    seed_stock(&ctx, "b1", "p1", 100).await;
    let order_id = delivered_order(&ctx, 20000, 1, 0).await;

    let before = ctx
        .orders
        .get_order(&Actor::customer("u1"), order_id)
        .await
        .unwrap();
    let delivered_at = before.order.delivered_at;
    let (on_hand_before, _) = stock_levels(&ctx, "b1", "p1").await;

    let created = ctx
        .returns
        .create_return(
            &Actor::customer("u1"),
            return_request(order_id, vec![("p1", 2)]),
        )
        .await
        .unwrap();
    assert_eq!(stock_levels(&ctx, "b1", "p1").await.0, on_hand_before + 2);

    ctx.returns
        .update_return_status(&Actor::admin("a1"), created.request.id, ReturnStatus::Rejected, None)
        .await
        .unwrap();

    // Shelf and order both back the way they were; no points re-earned.
    assert_eq!(stock_levels(&ctx, "b1", "p1").await.0, on_hand_before);
    let after = ctx
        .orders
        .get_order(&Actor::customer("u1"), order_id)
        .await
        .unwrap();
    assert_eq!(after.order.status, OrderStatus::Delivered);
    assert_eq!(after.order.delivered_at, delivered_at);
    assert_eq!(points_balance(&ctx, "u1").await, 200);
    assert_ledger_consistent(&ctx, "u1").await;
    assert_eq!(wallet_balance(&ctx, "u1").await, 0);
}

#[tokio::test]
async fn resolution_is_one_shot_and_staff_only() {
    let ctx = setup().await;
    seed_user(&ctx, "u1", 0).await;
    seed_stock(&ctx, "b1", "p1", 100).await;
    let order_id = delivered_order(&ctx, 20000, 1, 0).await;

    let created = ctx
        .returns
        .create_return(
            &Actor::customer("u1"),
            return_request(order_id, vec![("p1", 1)]),
        )
        .await
        .unwrap();

    // Customers cannot resolve.
    let err = ctx
        .returns
        .update_return_status(
            &Actor::customer("u1"),
            created.request.id,
            ReturnStatus::Approved,
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    // Resolving to pending is not a resolution.
    let err = ctx
        .returns
        .update_return_status(&Actor::admin("a1"), created.request.id, ReturnStatus::Pending, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    ctx.returns
        .update_return_status(&Actor::admin("a1"), created.request.id, ReturnStatus::Approved, None)
        .await
        .unwrap();

    // Second resolution reports the state it found.
    let err = ctx
        .returns
        .update_return_status(&Actor::admin("a1"), created.request.id, ReturnStatus::Rejected, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::ReturnAlreadyResolved {
            status: ReturnStatus::Approved
        }
    ));

    // The wallet was credited exactly once.
    assert_eq!(wallet_balance(&ctx, "u1").await, 18500);
}
