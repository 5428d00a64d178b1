//! Credit gate: the three responsibilities the schedulers and enrich worker
//! depend on. Subscription/invite-code management that feeds the balance
//! itself lives outside this core; this is consumed purely as a yes/no gate
//! and an atomic withdraw.

use std::collections::HashSet;

use chrono::Utc;

use crate::error::CoreResult;
use crate::model::new_id;
use crate::store::Store;

#[derive(Clone)]
pub struct CreditGate {
    store: Store,
}

impl CreditGate {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn has_balance(&self, user_id: &str) -> CoreResult<bool> {
        self.store.has_balance(user_id).await
    }

    pub async fn users_with_balance(&self) -> CoreResult<HashSet<String>> {
        self.store.users_with_balance().await
    }

    /// Atomic, transactional: decrements one credit and inserts a ledger row,
    /// or does nothing and returns false if the user has no balance left.
    pub async fn withdraw(&self, user_id: &str) -> CoreResult<bool> {
        let mut tx = self.store.pool().begin().await?;
        let withdrew = withdraw_credit_tx(&mut tx, user_id).await?;
        if withdrew {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }
        Ok(withdrew)
    }

    /// Used inside the enrich worker transaction: withdraws one credit and
    /// commits the item's summary/tags/score together, atomically.
    pub async fn complete_enrichment(
        &self,
        item_id: &str,
        user_id: &str,
        summary: &str,
        tags_json: &str,
        score: i64,
        score_reasoning: &str,
    ) -> CoreResult<bool> {
        self.store
            .complete_enrichment(item_id, user_id, summary, tags_json, score, score_reasoning)
            .await
    }
}

/// Shared CAS withdrawal SQL, usable both standalone (`CreditGate::withdraw`)
/// and as part of a larger transaction (`Store::complete_enrichment`).
pub(crate) async fn withdraw_credit_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: &str,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "UPDATE users SET credit_balance = credit_balance - 1 WHERE id = ? AND credit_balance > 0",
    )
    .bind(user_id)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    sqlx::query("INSERT INTO credit_ledger (id, user_id, amount, used_at) VALUES (?, ?, 1, ?)")
        .bind(new_id())
        .bind(user_id)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;

    Ok(true)
}
