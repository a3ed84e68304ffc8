//! crates/coaching_core/src/credits.rs
//!
//! The credit ledger client. It caches the balances fetched from the server and
//! routes every decrement through the server, which is the only authority on
//! whether a balance is sufficient.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{CreditBalance, CreditKind, DeductionOutcome, DeductionRequest};
use crate::ports::{CreditStore, PortError};

#[derive(Debug, Clone, thiserror::Error)]
pub enum CreditError {
    #[error("Insufficient credits: need {needed}, have {available}")]
    Insufficient { needed: u32, available: u32 },
    #[error("Insufficient health score credits: need {needed}, have {available}")]
    InsufficientHealthScore { needed: u32, available: u32 },
    #[error("Credit service unavailable: {0}")]
    Remote(#[from] PortError),
}

impl CreditError {
    fn insufficient(kind: CreditKind, needed: u32, available: u32) -> Self {
        match kind {
            CreditKind::General => CreditError::Insufficient { needed, available },
            CreditKind::HealthScore => CreditError::InsufficientHealthScore { needed, available },
        }
    }

    /// True for the expected, user-facing "not enough credits" outcome.
    pub fn is_insufficient(&self) -> bool {
        matches!(
            self,
            CreditError::Insufficient { .. } | CreditError::InsufficientHealthScore { .. }
        )
    }
}

pub type CreditResult<T> = Result<T, CreditError>;

/// Proof of a committed deduction, needed to refund it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Charge {
    pub request_id: Uuid,
    pub kind: CreditKind,
    pub amount: u32,
    pub balance_after: CreditBalance,
}

/// Per-user view of the credit balances.
pub struct CreditLedger {
    store: Arc<dyn CreditStore>,
    user_id: Uuid,
    cached: Mutex<Option<CreditBalance>>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn CreditStore>, user_id: Uuid) -> Self {
        Self {
            store,
            user_id,
            cached: Mutex::new(None),
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// The last balance fetched from the server, if any.
    pub fn balance(&self) -> Option<CreditBalance> {
        *self.cached.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn store_cache(&self, balance: CreditBalance) {
        *self.cached.lock().unwrap_or_else(|e| e.into_inner()) = Some(balance);
    }

    /// Fetches both balances from the server and replaces the cache.
    pub async fn refresh(&self) -> CreditResult<CreditBalance> {
        let balance = self.store.fetch_balance(self.user_id).await?;
        self.store_cache(balance);
        Ok(balance)
    }

    /// Fetches the balances unless they were already fetched this session.
    pub async fn ensure_loaded(&self) -> CreditResult<CreditBalance> {
        match self.balance() {
            Some(balance) => Ok(balance),
            None => self.refresh().await,
        }
    }

    /// Advisory check against the cached general balance. Never touches the network;
    /// answers `false` until a balance has been fetched.
    pub fn check_credits(&self, amount: u32) -> bool {
        self.check(CreditKind::General, amount)
    }

    pub fn check_health_score_credits(&self, amount: u32) -> bool {
        self.check(CreditKind::HealthScore, amount)
    }

    fn check(&self, kind: CreditKind, amount: u32) -> bool {
        self.balance().is_some_and(|b| b.of(kind) >= amount)
    }

    /// Like the `check_*` methods, but reports the shortfall.
    pub fn require(&self, kind: CreditKind, amount: u32) -> CreditResult<()> {
        let available = self.balance().map(|b| b.of(kind)).unwrap_or(0);
        if available >= amount {
            Ok(())
        } else {
            Err(CreditError::insufficient(kind, amount, available))
        }
    }

    pub async fn deduct_credits(
        &self,
        amount: u32,
        reason: &str,
        category: &str,
    ) -> CreditResult<Charge> {
        self.deduct(DeductionRequest {
            request_id: Uuid::new_v4(),
            kind: CreditKind::General,
            amount,
            reason: reason.to_string(),
            category: category.to_string(),
        })
        .await
    }

    pub async fn deduct_health_score_credits(
        &self,
        amount: u32,
        reason: &str,
    ) -> CreditResult<Charge> {
        self.deduct(DeductionRequest {
            request_id: Uuid::new_v4(),
            kind: CreditKind::HealthScore,
            amount,
            reason: reason.to_string(),
            category: CreditKind::HealthScore.as_str().to_string(),
        })
        .await
    }

    /// Asks the server to commit `request`. Retrying with the same request
    /// after a transport failure is safe.
    ///
    /// The cache only moves to a balance the server reported; on a transport
    /// failure it stays as it was.
    pub async fn deduct(&self, request: DeductionRequest) -> CreditResult<Charge> {
        debug!(
            user_id = %self.user_id,
            kind = request.kind.as_str(),
            amount = request.amount,
            category = %request.category,
            "Requesting credit deduction"
        );

        let outcome = self.store.deduct(self.user_id, &request).await.map_err(|e| {
            warn!(user_id = %self.user_id, error = %e, "Credit deduction failed in transport");
            CreditError::Remote(e)
        })?;

        match outcome {
            DeductionOutcome::Applied(balance) => {
                self.store_cache(balance);
                info!(
                    user_id = %self.user_id,
                    kind = request.kind.as_str(),
                    amount = request.amount,
                    reason = %request.reason,
                    "Credits deducted"
                );
                Ok(Charge {
                    request_id: request.request_id,
                    kind: request.kind,
                    amount: request.amount,
                    balance_after: balance,
                })
            }
            DeductionOutcome::Insufficient(balance) => {
                self.store_cache(balance);
                Err(CreditError::insufficient(
                    request.kind,
                    request.amount,
                    balance.of(request.kind),
                ))
            }
        }
    }

    /// Gives back a charge whose paid artifact could not be requested.
    pub async fn refund(&self, charge: &Charge, reason: &str) -> CreditResult<CreditBalance> {
        let balance = self
            .store
            .refund(self.user_id, charge.request_id, charge.kind, charge.amount, reason)
            .await?;
        self.store_cache(balance);
        info!(user_id = %self.user_id, amount = charge.amount, reason, "Credits refunded");
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_message_names_both_amounts() {
        let err = CreditError::insufficient(CreditKind::General, 10, 8);
        assert_eq!(err.to_string(), "Insufficient credits: need 10, have 8");
        assert!(err.is_insufficient());

        let err = CreditError::insufficient(CreditKind::HealthScore, 1, 0);
        assert_eq!(err.to_string(), "Insufficient health score credits: need 1, have 0");
    }

    #[test]
    fn remote_errors_are_not_insufficient() {
        let err = CreditError::Remote(PortError::Unexpected("timeout".into()));
        assert!(!err.is_insufficient());
    }
}
