//! Catalogue of wallet actions a virtual user can perform.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Request shapes issued against the wallet API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// `GET /wallet/balance`
    CheckBalance,
    /// `GET /transactions`
    ListTransactions,
    /// Balance then transactions, reported as one outcome.
    CheckBalanceAndTransactions,
    /// `POST /transactions` to another identity in the pool.
    Transfer,
    /// `POST /wallet/deposit` into the user's own wallet.
    Deposit,
    /// `POST /wallet/debin` (inbound debit request).
    Debin,
}

impl ActionKind {
    /// Every action kind, in declaration order.
    pub const ALL: [ActionKind; 6] = [
        Self::CheckBalance,
        Self::ListTransactions,
        Self::CheckBalanceAndTransactions,
        Self::Transfer,
        Self::Deposit,
        Self::Debin,
    ];

    /// Name used in outcomes, metrics labels and reports.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CheckBalance => "check_balance",
            Self::ListTransactions => "list_transactions",
            Self::CheckBalanceAndTransactions => "check_balance_and_transactions",
            Self::Transfer => "transfer",
            Self::Deposit => "deposit",
            Self::Debin => "debin",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of the configured action mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionWeight {
    pub action: ActionKind,
    pub weight: u32,
}

impl ActionWeight {
    #[must_use]
    pub const fn new(action: ActionKind, weight: u32) -> Self {
        Self { action, weight }
    }
}

/// Read-heavy wallet mix: status check 3, transfer 2, deposit 1, debin 1.
#[must_use]
pub fn wallet_mix() -> Vec<ActionWeight> {
    vec![
        ActionWeight::new(ActionKind::CheckBalanceAndTransactions, 3),
        ActionWeight::new(ActionKind::Transfer, 2),
        ActionWeight::new(ActionKind::Deposit, 1),
        ActionWeight::new(ActionKind::Debin, 1),
    ]
}

/// Browsing mix with separate balance and history reads.
#[must_use]
pub fn browse_mix() -> Vec<ActionWeight> {
    vec![
        ActionWeight::new(ActionKind::CheckBalance, 3),
        ActionWeight::new(ActionKind::ListTransactions, 2),
        ActionWeight::new(ActionKind::Transfer, 1),
        ActionWeight::new(ActionKind::Deposit, 1),
        ActionWeight::new(ActionKind::Debin, 1),
    ]
}
