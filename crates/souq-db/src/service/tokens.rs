//! # Token Service
//!
//! Redemption-token lifecycle: mint by debiting loyalty points, spend once,
//! peek without mutating, cancel for a refund.
//!
//! ## Single-Use Guarantee
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Two requests present the same code at the same moment:                │
//! │                                                                         │
//! │    UPDATE redemption_tokens SET status='used', ...                     │
//! │    WHERE code = ? AND status = 'active'                                │
//! │                                                                         │
//! │  The row serializes the race; one UPDATE affects a row, the other      │
//! │  affects none and reports TokenAlreadyUsed with the winner's           │
//! │  timestamp. `validate` never arbitrates this race - it is a read-only  │
//! │  preview and says so.                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use souq_core::{
    codes, validation, CoreError, CoreResult, Policies, RedemptionToken, TokenStatus,
};

use crate::notify::{Notifier, NotifyEvent};
use crate::pool::Database;
use crate::repository::{account, loyalty, token};
use crate::service::Actor;

// =============================================================================
// DTOs
// =============================================================================

/// Read-only answer of [`TokenService::validate`].
///
/// Advisory only: the authoritative check is the guarded consume inside the
/// using transaction, and a token valid at preview time can be gone a
/// moment later.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenValidation {
    pub valid: bool,
    /// Why the token is not usable, when `valid` is false.
    pub reason: Option<String>,
    pub token: Option<RedemptionToken>,
}

// =============================================================================
// Service
// =============================================================================

/// Redemption-token orchestration.
#[derive(Clone)]
pub struct TokenService {
    db: Database,
    policies: Policies,
    notifier: Arc<dyn Notifier>,
}

impl TokenService {
    pub fn new(db: Database, policies: Policies, notifier: Arc<dyn Notifier>) -> Self {
        TokenService {
            db,
            policies,
            notifier,
        }
    }

    /// Mints a token by debiting the owner's loyalty points.
    ///
    /// Points must be at least one block and a whole multiple of the block
    /// size; the debit is guarded so the balance can never go negative.
    pub async fn create(&self, actor: &Actor, points: i64) -> CoreResult<RedemptionToken> {
        let user_id = actor.registered_user_id("loyalty account")?.to_string();
        let tokens = self.policies.tokens;
        validation::validate_redeem_points(points, &tokens)?;

        let now = Utc::now();
        let mut tx = self.db.begin().await.map_err(CoreError::from)?;

        let user = account::require(&mut tx, &user_id).await?;
        if user.is_blocked {
            return Err(CoreError::AccountBlocked { user_id });
        }

        // Bounded collision retry; candidates from different seconds are
        // disjoint by construction, so this only races within one second.
        let mut code = None;
        for _ in 0..tokens.code_attempts {
            let candidate = codes::generate_token_code(now);
            if !token::code_exists(&mut tx, &candidate).await? {
                code = Some(candidate);
                break;
            }
        }
        let code = code.ok_or_else(|| {
            CoreError::Internal("token code generation exhausted its attempts".to_string())
        })?;

        let minted = RedemptionToken {
            code: code.clone(),
            user_id: user_id.clone(),
            points_value: points,
            monetary_piastres: tokens.monetary_value(points).piastres(),
            status: TokenStatus::Active,
            expires_at: tokens.expiry(now),
            used_by_user_id: None,
            used_at: None,
            order_id: None,
            created_at: now,
        };

        token::insert(&mut tx, &minted).await?;
        loyalty::debit_for_token(&mut tx, &user_id, points, &code).await?;

        tx.commit().await.map_err(crate::error::DbError::from)?;

        info!(code = %minted.code, points, "Redemption token created");
        self.notifier.notify(&NotifyEvent::TokenCreated {
            code: minted.code.clone(),
            user_id,
            points_value: points,
        });

        Ok(minted)
    }

    /// Applies a token to an existing order: the guarded single-winner
    /// consume plus the owner's zero-point audit entry.
    pub async fn use_token(
        &self,
        actor: &Actor,
        code: &str,
        order_id: i64,
    ) -> CoreResult<RedemptionToken> {
        let now = Utc::now();
        let mut tx = self.db.begin().await.map_err(CoreError::from)?;

        let tok = token::get(&mut tx, code)
            .await?
            .ok_or_else(|| CoreError::TokenNotFound(code.to_string()))?;

        match tok.status {
            TokenStatus::Used => {
                return Err(CoreError::TokenAlreadyUsed {
                    code: code.to_string(),
                    used_at: tok.used_at,
                })
            }
            TokenStatus::Cancelled => {
                return Err(CoreError::TokenCancelled {
                    code: code.to_string(),
                })
            }
            TokenStatus::Active => {}
        }
        if tok.is_expired(now) {
            return Err(CoreError::TokenExpired {
                code: code.to_string(),
                expired_at: tok.expires_at,
            });
        }

        let won = token::consume(&mut tx, code, actor.user_id.as_deref(), order_id, now).await?;
        if !won {
            let current = token::get(&mut tx, code)
                .await?
                .ok_or_else(|| CoreError::TokenNotFound(code.to_string()))?;
            return Err(match current.status {
                TokenStatus::Cancelled => CoreError::TokenCancelled {
                    code: code.to_string(),
                },
                _ => CoreError::TokenAlreadyUsed {
                    code: code.to_string(),
                    used_at: current.used_at,
                },
            });
        }

        loyalty::log_token_use(&mut tx, &tok.user_id, code, Some(order_id)).await?;

        let used = token::get(&mut tx, code)
            .await?
            .ok_or_else(|| CoreError::TokenNotFound(code.to_string()))?;
        tx.commit().await.map_err(crate::error::DbError::from)?;

        info!(code, order_id, "Redemption token used");
        self.notifier.notify(&NotifyEvent::TokenUsed {
            code: code.to_string(),
            order_id,
        });

        Ok(used)
    }

    /// Read-only preview of a token's usability. Never mutates, never
    /// authoritative.
    pub async fn validate(&self, code: &str) -> CoreResult<TokenValidation> {
        let now = Utc::now();
        let mut conn = self
            .db
            .pool()
            .acquire()
            .await
            .map_err(crate::error::DbError::from)?;

        let Some(tok) = token::get(&mut conn, code).await? else {
            return Ok(TokenValidation {
                valid: false,
                reason: Some("not found".to_string()),
                token: None,
            });
        };

        let reason = match tok.status {
            TokenStatus::Used => Some("already used".to_string()),
            TokenStatus::Cancelled => Some("cancelled".to_string()),
            TokenStatus::Active if tok.is_expired(now) => Some("expired".to_string()),
            TokenStatus::Active => None,
        };

        Ok(TokenValidation {
            valid: reason.is_none(),
            reason,
            token: Some(tok),
        })
    }

    /// Cancels an unused token and refunds its points to the owner.
    ///
    /// Only the owner may cancel; the guarded flip means a token being used
    /// and cancelled at the same moment resolves to exactly one outcome.
    pub async fn cancel(&self, actor: &Actor, code: &str) -> CoreResult<RedemptionToken> {
        let mut tx = self.db.begin().await.map_err(CoreError::from)?;

        let tok = token::get(&mut tx, code)
            .await?
            .ok_or_else(|| CoreError::TokenNotFound(code.to_string()))?;

        if !actor.role.is_staff() && actor.user_id.as_deref() != Some(tok.user_id.as_str()) {
            return Err(CoreError::NotOwner { resource: "token" });
        }

        let flipped = token::cancel(&mut tx, code).await?;
        if !flipped {
            let current = token::get(&mut tx, code)
                .await?
                .ok_or_else(|| CoreError::TokenNotFound(code.to_string()))?;
            return Err(match current.status {
                TokenStatus::Used => CoreError::TokenAlreadyUsed {
                    code: code.to_string(),
                    used_at: current.used_at,
                },
                _ => CoreError::TokenCancelled {
                    code: code.to_string(),
                },
            });
        }

        loyalty::refund(
            &mut tx,
            &tok.user_id,
            tok.points_value,
            "Token cancelled, points refunded",
            None,
            Some(code),
        )
        .await?;

        let cancelled = token::get(&mut tx, code)
            .await?
            .ok_or_else(|| CoreError::TokenNotFound(code.to_string()))?;
        tx.commit().await.map_err(crate::error::DbError::from)?;

        info!(code, points = tok.points_value, "Redemption token cancelled");
        self.notifier.notify(&NotifyEvent::TokenCancelled {
            code: code.to_string(),
            points_refunded: tok.points_value,
        });

        Ok(cancelled)
    }

    /// Active tokens of the calling user, soonest-expiring first.
    pub async fn list_active(&self, actor: &Actor) -> CoreResult<Vec<RedemptionToken>> {
        let user_id = actor.registered_user_id("loyalty account")?.to_string();
        let mut conn = self
            .db
            .pool()
            .acquire()
            .await
            .map_err(crate::error::DbError::from)?;
        token::list_active_for_user(&mut conn, &user_id).await
    }
}
