//! Concurrency tests: competing requests must resolve to exactly one
//! winner per contended row (last stock unit, single-use token, last slot
//! place), with the loser reporting the blocking fact.

mod common;

use common::*;
use souq_core::CoreError;
use souq_db::service::Actor;

#[tokio::test(flavor = "multi_thread")]
async fn last_stock_unit_has_one_winner() {
    let ctx = setup().await;
    seed_user(&ctx, "u1", 0).await;
    seed_user(&ctx, "u2", 0).await;
    seed_stock(&ctx, "b1", "p1", 1).await;

    let mut handles = Vec::new();
    for user in ["u1", "u2"] {
        let orders = ctx.orders.clone();
        let actor = Actor::customer(user);
        handles.push(tokio::spawn(async move {
            orders
                .create_order(&actor, order_request(vec![item("p1", 1, 500)], 500))
                .await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(CoreError::InsufficientStock {
                available,
                requested,
                ..
            }) => {
                assert_eq!(available, 0);
                assert_eq!(requested, 1);
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(stock_levels(&ctx, "b1", "p1").await, (1, 1));
}

#[tokio::test(flavor = "multi_thread")]
async fn single_use_token_has_one_winner() {
    let ctx = setup().await;
    seed_user(&ctx, "owner", 2000).await;
    seed_user(&ctx, "u1", 0).await;
    seed_user(&ctx, "u2", 0).await;
    seed_stock(&ctx, "b1", "p1", 10).await;

    let token = ctx
        .tokens
        .create(&Actor::customer("owner"), 2000)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for user in ["u1", "u2"] {
        let orders = ctx.orders.clone();
        let actor = Actor::customer(user);
        let code = token.code.clone();
        handles.push(tokio::spawn(async move {
            let mut req = order_request(vec![item("p1", 1, 10000)], 3000);
            req.token_code = Some(code);
            orders.create_order(&actor, req).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(CoreError::TokenAlreadyUsed { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(winners, 1);

    // Exactly one audit marker on the owner's ledger.
    let mut conn = ctx.db.pool().acquire().await.unwrap();
    let history = souq_db::repository::loyalty::history(&mut conn, "owner", 50)
        .await
        .unwrap();
    let markers = history
        .iter()
        .filter(|t| t.tx_type == souq_core::LoyaltyTxType::BarcodeUsed)
        .count();
    assert_eq!(markers, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn last_slot_place_has_one_winner() {
    let ctx = setup().await;
    seed_user(&ctx, "u1", 0).await;
    seed_user(&ctx, "u2", 0).await;
    seed_stock(&ctx, "b1", "p1", 10).await;
    seed_slot(&ctx, "noon", 1).await;

    let mut handles = Vec::new();
    for user in ["u1", "u2"] {
        let orders = ctx.orders.clone();
        let actor = Actor::customer(user);
        handles.push(tokio::spawn(async move {
            let mut req = order_request(vec![item("p1", 1, 500)], 500);
            req.delivery_slot_id = Some("noon".to_string());
            orders.create_order(&actor, req).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(CoreError::SlotFull { max_orders, .. }) => assert_eq!(max_orders, 1),
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(winners, 1);

    // The loser's aborted transaction left no reservation behind.
    assert_eq!(stock_levels(&ctx, "b1", "p1").await, (10, 1));
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_cancellations_refund_once() {
    let ctx = setup().await;
    seed_user(&ctx, "u1", 500).await;
    seed_stock(&ctx, "b1", "p1", 10).await;

    let mut req = order_request(vec![item("p1", 1, 500)], 500);
    req.loyalty_points_to_spend = Some(200);
    let snapshot = ctx
        .orders
        .create_order(&Actor::customer("u1"), req)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let orders = ctx.orders.clone();
        let actor = Actor::customer("u1");
        let order_id = snapshot.order.id;
        handles.push(tokio::spawn(
            async move { orders.cancel_order(&actor, order_id).await },
        ));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) => {
                winners += 1;
                assert_eq!(outcome.points_refunded, 200);
            }
            Err(CoreError::NotCancellable { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(winners, 1);
    // Refunded exactly once: back to the seeded 500.
    assert_eq!(points_balance(&ctx, "u1").await, 500);
    assert_ledger_consistent(&ctx, "u1").await;
}
