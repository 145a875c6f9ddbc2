//! Invariant checks run before any write

use crate::{types::Customer, Error, Result};
use serde::{Deserialize, Serialize};

/// What the validator does with balances that would go negative
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancePolicy {
    /// Negative balances are allowed
    #[default]
    Permissive,
    /// Seeds and moves may not produce a negative balance
    NonNegative,
}

/// Invariant validator
#[derive(Debug, Clone, Default)]
pub struct InvariantValidator {
    policy: BalancePolicy,
}

impl InvariantValidator {
    /// Create new validator
    pub fn new(policy: BalancePolicy) -> Self {
        Self { policy }
    }

    /// Active balance policy
    pub fn policy(&self) -> BalancePolicy {
        self.policy
    }

    /// National ID and tax ID must match between the stored and proposed record
    pub fn check_immutable(&self, key: &str, stored: &Customer, proposed: &Customer) -> Result<()> {
        let mut changed = Vec::new();
        if stored.national_id != proposed.national_id {
            changed.push("aadhar_no");
        }
        if stored.tax_id != proposed.tax_id {
            changed.push("pan_no");
        }

        if changed.is_empty() {
            Ok(())
        } else {
            Err(Error::ImmutableFieldViolation {
                key: key.to_string(),
                fields: changed.join(", "),
            })
        }
    }

    /// Compute post-transfer balances
    ///
    /// `from + to` is the same before and after. Overflow in either direction
    /// is reported as [`Error::InvalidAmount`].
    pub fn check_transfer(
        &self,
        from: (&str, i64),
        to: (&str, i64),
        amount: i64,
    ) -> Result<(i64, i64)> {
        let new_from = from.1.checked_sub(amount).ok_or_else(|| {
            Error::InvalidAmount(format!("debiting {} by {} overflows", from.0, amount))
        })?;
        let new_to = to.1.checked_add(amount).ok_or_else(|| {
            Error::InvalidAmount(format!("crediting {} by {} overflows", to.0, amount))
        })?;

        self.check_balance(from.0, new_from)?;
        self.check_balance(to.0, new_to)?;

        Ok((new_from, new_to))
    }

    /// Check a single balance against the policy
    pub fn check_balance(&self, entity: &str, balance: i64) -> Result<()> {
        if self.policy == BalancePolicy::NonNegative && balance < 0 {
            return Err(Error::NegativeBalance {
                entity: entity.to_string(),
                balance,
            });
        }
        Ok(())
    }
}
