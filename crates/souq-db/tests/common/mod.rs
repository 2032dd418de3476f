//! Shared harness for integration tests: in-memory database, services with
//! a recording notifier, and seed helpers.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::sync::Arc;

use souq_core::{OrderStatus, Policies};
use souq_db::repository::{account, loyalty, slot, stock};
use souq_db::service::Actor;
use souq_db::{
    CreateOrderItem, CreateOrderRequest, Database, DbConfig, OrderService, RecordingNotifier,
    ReturnService, TokenService,
};

pub struct TestCtx {
    pub db: Database,
    pub orders: OrderService,
    pub tokens: TokenService,
    pub returns: ReturnService,
    pub notifier: Arc<RecordingNotifier>,
}

pub async fn setup() -> TestCtx {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let notifier = Arc::new(RecordingNotifier::new());
    let policies = Policies::default();

    TestCtx {
        orders: OrderService::new(db.clone(), policies, notifier.clone()),
        tokens: TokenService::new(db.clone(), policies, notifier.clone()),
        returns: ReturnService::new(db.clone(), policies, notifier.clone()),
        db,
        notifier,
    }
}

/// Creates a user and credits `points` through the ledger, so the
/// balance == sum(ledger) invariant holds from the start.
pub async fn seed_user(ctx: &TestCtx, user_id: &str, points: i64) {
    let mut conn = ctx.db.pool().acquire().await.unwrap();
    account::create(&mut conn, user_id).await.unwrap();
    if points > 0 {
        loyalty::earn(&mut conn, user_id, points, "Promotional points", None)
            .await
            .unwrap();
    }
}

pub async fn seed_stock(ctx: &TestCtx, branch_id: &str, product_id: &str, quantity: i64) {
    let mut conn = ctx.db.pool().acquire().await.unwrap();
    stock::upsert(&mut conn, branch_id, product_id, quantity)
        .await
        .unwrap();
}

pub async fn seed_slot(ctx: &TestCtx, slot_id: &str, max_orders: i64) {
    let mut conn = ctx.db.pool().acquire().await.unwrap();
    slot::upsert(&mut conn, slot_id, max_orders).await.unwrap();
}

pub fn item(product_id: &str, quantity: i64, unit_price_piastres: i64) -> CreateOrderItem {
    CreateOrderItem {
        product_id: product_id.to_string(),
        quantity,
        unit_price_piastres,
    }
}

/// A plain cash order at branch `b1`.
pub fn order_request(items: Vec<CreateOrderItem>, total_piastres: i64) -> CreateOrderRequest {
    CreateOrderRequest {
        branch_id: Some("b1".to_string()),
        items,
        total_piastres,
        shipping_piastres: 0,
        payment_method: "cash_on_delivery".to_string(),
        token_code: None,
        coupon_ref: None,
        delivery_slot_id: None,
        loyalty_points_to_spend: None,
    }
}

/// Walks an order through fulfillment to `delivered` as staff.
pub async fn deliver(ctx: &TestCtx, order_id: i64) {
    let staff = Actor::staff("s1");
    for to in [
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
    ] {
        ctx.orders
            .transition_status(&staff, order_id, to)
            .await
            .unwrap();
    }
}

/// Moves `delivered_at` back in time to exercise the return window.
pub async fn backdate_delivery(ctx: &TestCtx, order_id: i64, days: i64, hours: i64) {
    let backdated = chrono::Utc::now() - chrono::Duration::days(days) - chrono::Duration::hours(hours);
    sqlx::query("UPDATE orders SET delivered_at = ? WHERE id = ?")
        .bind(backdated)
        .bind(order_id)
        .execute(ctx.db.pool())
        .await
        .unwrap();
}

pub async fn stock_levels(ctx: &TestCtx, branch_id: &str, product_id: &str) -> (i64, i64) {
    let mut conn = ctx.db.pool().acquire().await.unwrap();
    let row = stock::get(&mut conn, branch_id, product_id)
        .await
        .unwrap()
        .unwrap();
    (row.stock_quantity, row.reserved_quantity)
}

pub async fn points_balance(ctx: &TestCtx, user_id: &str) -> i64 {
    let mut conn = ctx.db.pool().acquire().await.unwrap();
    loyalty::balance(&mut conn, user_id).await.unwrap().unwrap()
}

/// Asserts the denormalized balance equals the ledger sum.
pub async fn assert_ledger_consistent(ctx: &TestCtx, user_id: &str) {
    let mut conn = ctx.db.pool().acquire().await.unwrap();
    let balance = loyalty::balance(&mut conn, user_id).await.unwrap().unwrap();
    let sum = loyalty::ledger_sum(&mut conn, user_id).await.unwrap();
    assert_eq!(balance, sum, "balance diverged from ledger for {user_id}");
}

pub async fn wallet_balance(ctx: &TestCtx, user_id: &str) -> i64 {
    let mut conn = ctx.db.pool().acquire().await.unwrap();
    account::require(&mut conn, user_id).await.unwrap().wallet_piastres
}
