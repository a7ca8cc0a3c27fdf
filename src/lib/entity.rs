use std::fmt;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::amount::decimal;

pub const USER_COUNTERS_ID: &str = "user-counters";
pub const SALE_STATUS_ID: &str = "sale";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    InvestorSummary,
    ClaimTotals,
    RefundTotals,
    InvestmentTotals,
    UserCounters,
    SaleStatus,
    TokenClaim,
    Refund,
    Investment,
    SaleLifecycle,
}

impl EntityKind {
    pub fn prefix(self) -> &'static str {
        match self {
            EntityKind::InvestorSummary => "summary",
            EntityKind::ClaimTotals => "totals-claim",
            EntityKind::RefundTotals => "totals-refund",
            EntityKind::InvestmentTotals => "totals-investment",
            EntityKind::UserCounters => "counters",
            EntityKind::SaleStatus => "sale",
            EntityKind::TokenClaim => "record-claim",
            EntityKind::Refund => "record-refund",
            EntityKind::Investment => "record-investment",
            EntityKind::SaleLifecycle => "record-lifecycle",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Anything persisted in the entity store.
pub trait Entity: Serialize + DeserializeOwned {
    fn kind(&self) -> EntityKind;
    fn id(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Claim,
    Refund,
    Investment,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Claim, Action::Refund, Action::Investment];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Claim => "claim",
            Action::Refund => "refund",
            Action::Investment => "investment",
        }
    }

    pub fn totals_id(self) -> &'static str {
        match self {
            Action::Claim => "claim-totals",
            Action::Refund => "refund-totals",
            Action::Investment => "investment-totals",
        }
    }

    pub fn totals_kind(self) -> EntityKind {
        match self {
            Action::Claim => EntityKind::ClaimTotals,
            Action::Refund => EntityKind::RefundTotals,
            Action::Investment => EntityKind::InvestmentTotals,
        }
    }

    pub fn record_kind(self) -> EntityKind {
        match self {
            Action::Claim => EntityKind::TokenClaim,
            Action::Refund => EntityKind::Refund,
            Action::Investment => EntityKind::Investment,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-address rollup of claims, refunds, and investments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestorSummary {
    pub id: String,
    #[serde(with = "decimal")]
    pub total_claimed: U256,
    #[serde(with = "decimal")]
    pub total_refunded: U256,
    #[serde(with = "decimal")]
    pub total_invested: U256,
    pub claim_count: u64,
    pub refund_count: u64,
    pub investment_count: u64,
    pub last_claimed: u64,
    pub last_refunded: u64,
    pub last_invested: u64,
    pub first_activity: u64,
    pub last_activity: u64,
}

impl InvestorSummary {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            total_claimed: U256::ZERO,
            total_refunded: U256::ZERO,
            total_invested: U256::ZERO,
            claim_count: 0,
            refund_count: 0,
            investment_count: 0,
            last_claimed: 0,
            last_refunded: 0,
            last_invested: 0,
            first_activity: 0,
            last_activity: 0,
        }
    }

    pub fn total(&self, action: Action) -> U256 {
        match action {
            Action::Claim => self.total_claimed,
            Action::Refund => self.total_refunded,
            Action::Investment => self.total_invested,
        }
    }

    pub fn count(&self, action: Action) -> u64 {
        match action {
            Action::Claim => self.claim_count,
            Action::Refund => self.refund_count,
            Action::Investment => self.investment_count,
        }
    }

    pub fn last(&self, action: Action) -> u64 {
        match action {
            Action::Claim => self.last_claimed,
            Action::Refund => self.last_refunded,
            Action::Investment => self.last_invested,
        }
    }

    /// Mutable (total, count, last) triple for one action.
    pub(crate) fn action_fields_mut(&mut self, action: Action) -> (&mut U256, &mut u64, &mut u64) {
        match action {
            Action::Claim => (
                &mut self.total_claimed,
                &mut self.claim_count,
                &mut self.last_claimed,
            ),
            Action::Refund => (
                &mut self.total_refunded,
                &mut self.refund_count,
                &mut self.last_refunded,
            ),
            Action::Investment => (
                &mut self.total_invested,
                &mut self.investment_count,
                &mut self.last_invested,
            ),
        }
    }

    pub fn has_activity(&self) -> bool {
        Action::ALL.iter().any(|action| self.count(*action) > 0)
    }
}

impl Entity for InvestorSummary {
    fn kind(&self) -> EntityKind {
        EntityKind::InvestorSummary
    }

    fn id(&self) -> &str {
        &self.id
    }
}

/// Global totals for one action; the claim, refund, and investment singletons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionTotals {
    pub action: Action,
    #[serde(with = "decimal")]
    pub total_amount: U256,
    pub event_count: u64,
    pub unique_addresses: u64,
    pub last_updated: u64,
}

impl ActionTotals {
    pub fn empty(action: Action) -> Self {
        Self {
            action,
            total_amount: U256::ZERO,
            event_count: 0,
            unique_addresses: 0,
            last_updated: 0,
        }
    }
}

impl Entity for ActionTotals {
    fn kind(&self) -> EntityKind {
        self.action.totals_kind()
    }

    fn id(&self) -> &str {
        self.action.totals_id()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCounters {
    pub total_investment_users: u64,
    pub total_refund_users: u64,
    pub total_claim_users: u64,
    pub last_updated: u64,
}

impl UserCounters {
    pub fn users(&self, action: Action) -> u64 {
        match action {
            Action::Claim => self.total_claim_users,
            Action::Refund => self.total_refund_users,
            Action::Investment => self.total_investment_users,
        }
    }

    pub(crate) fn users_mut(&mut self, action: Action) -> &mut u64 {
        match action {
            Action::Claim => &mut self.total_claim_users,
            Action::Refund => &mut self.total_refund_users,
            Action::Investment => &mut self.total_investment_users,
        }
    }
}

impl Entity for UserCounters {
    fn kind(&self) -> EntityKind {
        EntityKind::UserCounters
    }

    fn id(&self) -> &str {
        USER_COUNTERS_ID
    }
}

/// Sale lifecycle flags and published figures. Written only by lifecycle
/// events; each event overwrites just the fields it carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleStatus {
    #[serde(with = "decimal")]
    pub total_capital_invested: U256,
    #[serde(with = "decimal")]
    pub total_capital_raised: U256,
    #[serde(with = "decimal")]
    pub total_capital_withdrawn: U256,
    #[serde(with = "decimal")]
    pub total_tokens_allocated: U256,
    pub claim_tokens_merkle_root: Option<String>,
    pub is_canceled: bool,
    pub capital_withdrawn: bool,
    pub has_ended: bool,
    pub end_time: Option<u64>,
    pub refund_end_time: Option<u64>,
    pub lockup_end_time: Option<u64>,
    pub vesting_start_time: Option<u64>,
    pub ask_token: Option<String>,
    pub last_updated: u64,
}

impl Entity for SaleStatus {
    fn kind(&self) -> EntityKind {
        EntityKind::SaleStatus
    }

    fn id(&self) -> &str {
        SALE_STATUS_ID
    }
}

/// Immutable per-event record (TokenClaim, Refund, or Investment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: String,
    pub action: Action,
    pub investor: String,
    #[serde(with = "decimal")]
    pub amount: U256,
    pub block_number: u64,
    pub transaction_hash: String,
    pub timestamp: u64,
    #[serde(with = "decimal")]
    pub gas_price: U256,
}

impl Entity for ActivityRecord {
    fn kind(&self) -> EntityKind {
        self.action.record_kind()
    }

    fn id(&self) -> &str {
        &self.id
    }
}

/// Marker for an applied lifecycle event, keyed like the activity records so a
/// redelivered lifecycle event can be told apart from one that never landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRecord {
    pub id: String,
    pub event: String,
    pub block_number: u64,
    pub transaction_hash: String,
    pub timestamp: u64,
}

impl Entity for LifecycleRecord {
    fn kind(&self) -> EntityKind {
        EntityKind::SaleLifecycle
    }

    fn id(&self) -> &str {
        &self.id
    }
}
