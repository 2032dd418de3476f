//! Redemption-token integration tests: minting, single use, cancellation
//! refunds, expiry, and the read-only validate preview.

mod common;

use common::*;
use souq_core::{CoreError, ErrorKind, TokenStatus};
use souq_db::service::Actor;

#[tokio::test]
async fn create_token_debits_points_and_prices_blocks() {
    let ctx = setup().await;
    seed_user(&ctx, "u1", 5000).await;

    // 2000 points = 2 blocks = EGP 70.
    let token = ctx
        .tokens
        .create(&Actor::customer("u1"), 2000)
        .await
        .unwrap();

    assert!(token.code.starts_with("BRC-"));
    assert_eq!(token.points_value, 2000);
    assert_eq!(token.monetary_piastres, 7000);
    assert_eq!(token.status, TokenStatus::Active);
    assert_eq!(points_balance(&ctx, "u1").await, 3000);
    assert_ledger_consistent(&ctx, "u1").await;
}

#[tokio::test]
async fn token_denomination_rules() {
    let ctx = setup().await;
    seed_user(&ctx, "u1", 5000).await;
    let customer = Actor::customer("u1");

    // Below a block, not a multiple, negative: all validation errors.
    for points in [500, 1500, -1000, 0] {
        let err = ctx.tokens.create(&customer, points).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "points={points}");
    }

    // More than the balance: conflict carrying the balance.
    let err = ctx.tokens.create(&customer, 6000).await.unwrap_err();
    match err {
        CoreError::InsufficientPoints { balance, requested } => {
            assert_eq!(balance, 5000);
            assert_eq!(requested, 6000);
        }
        other => panic!("expected InsufficientPoints, got {other:?}"),
    }
    // The failed mint left the balance untouched.
    assert_eq!(points_balance(&ctx, "u1").await, 5000);
}

#[tokio::test]
async fn guests_cannot_mint_tokens() {
    let ctx = setup().await;
    let err = ctx.tokens.create(&Actor::guest(), 1000).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn token_is_single_use() {
    let ctx = setup().await;
    seed_user(&ctx, "u1", 2000).await;
    seed_user(&ctx, "u2", 0).await;
    seed_stock(&ctx, "b1", "p1", 10).await;

    let token = ctx
        .tokens
        .create(&Actor::customer("u1"), 2000)
        .await
        .unwrap();

    // Another user spends it against their order (discount already applied
    // upstream to the total).
    let mut req = order_request(vec![item("p1", 1, 10000)], 3000);
    req.token_code = Some(token.code.clone());
    let snapshot = ctx
        .orders
        .create_order(&Actor::customer("u2"), req)
        .await
        .unwrap();

    // Second use fails with the consumption timestamp.
    let mut retry = order_request(vec![item("p1", 1, 10000)], 3000);
    retry.token_code = Some(token.code.clone());
    let err = ctx
        .orders
        .create_order(&Actor::customer("u2"), retry)
        .await
        .unwrap_err();
    match err {
        CoreError::TokenAlreadyUsed { used_at, .. } => assert!(used_at.is_some()),
        other => panic!("expected TokenAlreadyUsed, got {other:?}"),
    }

    // The owner's ledger carries the zero-point audit marker.
    assert_eq!(points_balance(&ctx, "u1").await, 0);
    assert_ledger_consistent(&ctx, "u1").await;

    let used = ctx.tokens.validate(&token.code).await.unwrap();
    assert!(!used.valid);
    assert_eq!(used.reason.as_deref(), Some("already used"));
    assert_eq!(used.token.unwrap().order_id, Some(snapshot.order.id));
}

#[tokio::test]
async fn cancel_refunds_exactly_the_minted_points() {
    let ctx = setup().await;
    seed_user(&ctx, "u1", 2000).await;

    let token = ctx
        .tokens
        .create(&Actor::customer("u1"), 2000)
        .await
        .unwrap();
    assert_eq!(points_balance(&ctx, "u1").await, 0);

    let cancelled = ctx
        .tokens
        .cancel(&Actor::customer("u1"), &token.code)
        .await
        .unwrap();
    assert_eq!(cancelled.status, TokenStatus::Cancelled);
    assert_eq!(points_balance(&ctx, "u1").await, 2000);
    assert_ledger_consistent(&ctx, "u1").await;

    // Cancelled is terminal: neither a second cancel nor a use goes through.
    let err = ctx
        .tokens
        .cancel(&Actor::customer("u1"), &token.code)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::TokenCancelled { .. }));
}

#[tokio::test]
async fn only_the_owner_cancels() {
    let ctx = setup().await;
    seed_user(&ctx, "u1", 1000).await;
    seed_user(&ctx, "u2", 0).await;

    let token = ctx
        .tokens
        .create(&Actor::customer("u1"), 1000)
        .await
        .unwrap();
    let err = ctx
        .tokens
        .cancel(&Actor::customer("u2"), &token.code)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn expired_tokens_cannot_be_used() {
    let ctx = setup().await;
    seed_user(&ctx, "u1", 1000).await;
    seed_stock(&ctx, "b1", "p1", 10).await;

    let token = ctx
        .tokens
        .create(&Actor::customer("u1"), 1000)
        .await
        .unwrap();

    // Push the expiry into the past.
    sqlx::query("UPDATE redemption_tokens SET expires_at = ? WHERE code = ?")
        .bind(chrono::Utc::now() - chrono::Duration::days(1))
        .bind(&token.code)
        .execute(ctx.db.pool())
        .await
        .unwrap();

    let mut req = order_request(vec![item("p1", 1, 5000)], 1500);
    req.token_code = Some(token.code.clone());
    let err = ctx
        .orders
        .create_order(&Actor::customer("u1"), req)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::TokenExpired { .. }));

    let preview = ctx.tokens.validate(&token.code).await.unwrap();
    assert!(!preview.valid);
    assert_eq!(preview.reason.as_deref(), Some("expired"));
}

#[tokio::test]
async fn validate_never_mutates() {
    let ctx = setup().await;
    seed_user(&ctx, "u1", 1000).await;

    let token = ctx
        .tokens
        .create(&Actor::customer("u1"), 1000)
        .await
        .unwrap();

    for _ in 0..3 {
        let preview = ctx.tokens.validate(&token.code).await.unwrap();
        assert!(preview.valid);
        assert_eq!(preview.token.as_ref().unwrap().status, TokenStatus::Active);
    }

    let missing = ctx.tokens.validate("BRC-NOPE").await.unwrap();
    assert!(!missing.valid);
    assert_eq!(missing.reason.as_deref(), Some("not found"));
}

#[tokio::test]
async fn unknown_token_on_order_fails_not_found() {
    let ctx = setup().await;
    seed_user(&ctx, "u1", 0).await;
    seed_stock(&ctx, "b1", "p1", 10).await;

    let mut req = order_request(vec![item("p1", 1, 500)], 500);
    req.token_code = Some("BRC-MISSING".to_string());
    let err = ctx
        .orders
        .create_order(&Actor::customer("u1"), req)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // The reservation taken before the token check was rolled back.
    assert_eq!(stock_levels(&ctx, "b1", "p1").await, (10, 0));
}
