//! Action registry and request planning
//!
//! The registry is built once per run from the configured mix and shared
//! read-only by every virtual user. Planning turns a picked action into the
//! concrete requests for one cycle.

use kobra_core::action::{browse_mix, wallet_mix};
use kobra_core::{
    ActionKind, ActionWeight, AmountRange, CoreResult, SessionCredentials, VirtualUserIdentity,
};
use rand::Rng;
use serde_json::json;

use crate::selector::WeightedSelector;
use crate::session::PlannedRequest;

/// Name used for the optional post-login funding deposit.
pub const SEED_DEPOSIT_ACTION: &str = "seed_deposit";

/// A registered action and its relative weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSpec {
    pub kind: ActionKind,
    pub weight: u32,
}

impl ActionSpec {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// Ordered, immutable set of weighted actions.
#[derive(Debug, Clone)]
pub struct ActionRegistry {
    actions: Vec<ActionSpec>,
    selector: WeightedSelector,
}

impl ActionRegistry {
    /// Builds the registry and its selection distribution.
    pub fn new(mix: &[ActionWeight]) -> CoreResult<Self> {
        let actions: Vec<ActionSpec> = mix
            .iter()
            .map(|entry| ActionSpec {
                kind: entry.action,
                weight: entry.weight,
            })
            .collect();
        let selector = WeightedSelector::new(actions.iter().map(|a| a.weight))?;

        Ok(Self { actions, selector })
    }

    pub fn wallet() -> CoreResult<Self> {
        Self::new(&wallet_mix())
    }

    pub fn browse() -> CoreResult<Self> {
        Self::new(&browse_mix())
    }

    /// Picks the next action according to the weights.
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> &ActionSpec {
        &self.actions[self.selector.pick(rng)]
    }

    pub fn actions(&self) -> &[ActionSpec] {
        &self.actions
    }

    pub fn selector(&self) -> &WeightedSelector {
        &self.selector
    }
}

/// Requests for one action attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionPlan {
    pub name: &'static str,
    pub requests: Vec<PlannedRequest>,
}

/// What a virtual user knows when planning a cycle.
pub struct ActionContext<'a> {
    pub identity: &'a VirtualUserIdentity,
    pub credentials: &'a SessionCredentials,
    pub pool_ceiling: u64,
    pub email_domain: &'a str,
    pub transfer_amount: AmountRange,
    pub deposit_amount: AmountRange,
}

impl ActionSpec {
    /// Builds the requests for this action.
    ///
    /// Returns `None` when the cycle is a no-op: a transfer whose drawn
    /// recipient is the sender.
    pub fn plan<R: Rng + ?Sized>(
        &self,
        ctx: &ActionContext<'_>,
        rng: &mut R,
    ) -> Option<ActionPlan> {
        let requests = match self.kind {
            ActionKind::CheckBalance => vec![PlannedRequest::get("/wallet/balance")],
            ActionKind::ListTransactions => vec![PlannedRequest::get("/transactions")],
            ActionKind::CheckBalanceAndTransactions => vec![
                PlannedRequest::get("/wallet/balance"),
                PlannedRequest::get("/transactions"),
            ],
            ActionKind::Transfer => {
                let recipient =
                    pick_recipient(ctx.identity.sequence_number, ctx.pool_ceiling, rng)?;
                let recipient = VirtualUserIdentity::from_sequence(recipient);
                vec![PlannedRequest::post(
                    "/transactions",
                    json!({
                        "recipientEmail": recipient.email(ctx.email_domain),
                        "amount": draw_amount(ctx.transfer_amount, rng),
                    }),
                )]
            }
            ActionKind::Deposit => vec![PlannedRequest::post(
                "/wallet/deposit",
                json!({
                    "walletId": ctx.credentials.wallet_id,
                    "amount": draw_amount(ctx.deposit_amount, rng),
                }),
            )],
            ActionKind::Debin => vec![PlannedRequest::post(
                "/wallet/debin",
                json!({
                    "walletId": ctx.credentials.wallet_id,
                    "amount": draw_amount(ctx.deposit_amount, rng),
                }),
            )],
        };

        Some(ActionPlan {
            name: self.name(),
            requests,
        })
    }
}

/// Funding deposit addressed by email, issued once after login.
pub fn seed_deposit_plan<R: Rng + ?Sized>(ctx: &ActionContext<'_>, rng: &mut R) -> ActionPlan {
    ActionPlan {
        name: SEED_DEPOSIT_ACTION,
        requests: vec![PlannedRequest::post(
            "/wallet/deposit",
            json!({
                "email": ctx.identity.email(ctx.email_domain),
                "amount": draw_amount(ctx.deposit_amount, rng),
            }),
        )],
    }
}

/// Draws a transfer recipient from `[1, ceiling]`; `None` if it is the sender.
pub fn pick_recipient<R: Rng + ?Sized>(sender: u64, ceiling: u64, rng: &mut R) -> Option<u64> {
    let recipient = rng.gen_range(1..=ceiling.max(1));
    (recipient != sender).then_some(recipient)
}

fn draw_amount<R: Rng + ?Sized>(range: AmountRange, rng: &mut R) -> u64 {
    rng.gen_range(range.min..=range.max)
}
