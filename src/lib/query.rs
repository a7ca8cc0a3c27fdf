use std::{cmp::Ordering as StdOrdering, str::FromStr, sync::Arc};

use crate::{
    entity::{
        Action, ActionTotals, ActivityRecord, EntityKind, InvestorSummary, SALE_STATUS_ID,
        SaleStatus, USER_COUNTERS_ID, UserCounters,
    },
    error::{IndexError, Result},
    event::EventPosition,
    store::EntityStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummarySortField {
    Id,
    TotalClaimed,
    TotalRefunded,
    #[default]
    TotalInvested,
    ClaimCount,
    RefundCount,
    InvestmentCount,
    LastClaimed,
    LastRefunded,
    LastInvested,
    FirstActivity,
    LastActivity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordSortField {
    Id,
    Investor,
    Amount,
    BlockNumber,
    #[default]
    Timestamp,
    GasPrice,
}

/// One page of a listing. `first: None` falls back to the configured list
/// page size; anything above the page limit is clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageRequest<F> {
    pub first: Option<usize>,
    pub skip: usize,
    pub order_by: F,
    pub direction: SortDirection,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    fn apply(self, ordering: StdOrdering) -> StdOrdering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

impl SummarySortField {
    pub fn as_str(self) -> &'static str {
        match self {
            SummarySortField::Id => "id",
            SummarySortField::TotalClaimed => "totalClaimed",
            SummarySortField::TotalRefunded => "totalRefunded",
            SummarySortField::TotalInvested => "totalInvested",
            SummarySortField::ClaimCount => "claimCount",
            SummarySortField::RefundCount => "refundCount",
            SummarySortField::InvestmentCount => "investmentCount",
            SummarySortField::LastClaimed => "lastClaimed",
            SummarySortField::LastRefunded => "lastRefunded",
            SummarySortField::LastInvested => "lastInvested",
            SummarySortField::FirstActivity => "firstActivity",
            SummarySortField::LastActivity => "lastActivity",
        }
    }

    pub fn compare(self, lhs: &InvestorSummary, rhs: &InvestorSummary) -> StdOrdering {
        match self {
            SummarySortField::Id => lhs.id.cmp(&rhs.id),
            SummarySortField::TotalClaimed => lhs.total_claimed.cmp(&rhs.total_claimed),
            SummarySortField::TotalRefunded => lhs.total_refunded.cmp(&rhs.total_refunded),
            SummarySortField::TotalInvested => lhs.total_invested.cmp(&rhs.total_invested),
            SummarySortField::ClaimCount => lhs.claim_count.cmp(&rhs.claim_count),
            SummarySortField::RefundCount => lhs.refund_count.cmp(&rhs.refund_count),
            SummarySortField::InvestmentCount => lhs.investment_count.cmp(&rhs.investment_count),
            SummarySortField::LastClaimed => lhs.last_claimed.cmp(&rhs.last_claimed),
            SummarySortField::LastRefunded => lhs.last_refunded.cmp(&rhs.last_refunded),
            SummarySortField::LastInvested => lhs.last_invested.cmp(&rhs.last_invested),
            SummarySortField::FirstActivity => lhs.first_activity.cmp(&rhs.first_activity),
            SummarySortField::LastActivity => lhs.last_activity.cmp(&rhs.last_activity),
        }
    }
}

impl RecordSortField {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordSortField::Id => "id",
            RecordSortField::Investor => "investor",
            RecordSortField::Amount => "amount",
            RecordSortField::BlockNumber => "blockNumber",
            RecordSortField::Timestamp => "timestamp",
            RecordSortField::GasPrice => "gasPrice",
        }
    }

    pub fn compare(self, lhs: &ActivityRecord, rhs: &ActivityRecord) -> StdOrdering {
        match self {
            RecordSortField::Id => lhs.id.cmp(&rhs.id),
            RecordSortField::Investor => lhs.investor.cmp(&rhs.investor),
            RecordSortField::Amount => lhs.amount.cmp(&rhs.amount),
            RecordSortField::BlockNumber => lhs.block_number.cmp(&rhs.block_number),
            RecordSortField::Timestamp => lhs.timestamp.cmp(&rhs.timestamp),
            RecordSortField::GasPrice => lhs.gas_price.cmp(&rhs.gas_price),
        }
    }
}

fn normalize(value: &str) -> String {
    value.trim().replace('_', "").to_ascii_lowercase()
}

impl FromStr for SortDirection {
    type Err = IndexError;

    fn from_str(value: &str) -> Result<Self> {
        match normalize(value).as_str() {
            "asc" | "ascending" => Ok(SortDirection::Asc),
            "desc" | "descending" => Ok(SortDirection::Desc),
            _ => Err(IndexError::InvalidQuery(format!(
                "unsupported order direction '{value}'"
            ))),
        }
    }
}

impl FromStr for SummarySortField {
    type Err = IndexError;

    fn from_str(value: &str) -> Result<Self> {
        match normalize(value).as_str() {
            "id" | "address" | "investor" => Ok(SummarySortField::Id),
            "totalclaimed" => Ok(SummarySortField::TotalClaimed),
            "totalrefunded" => Ok(SummarySortField::TotalRefunded),
            "totalinvested" => Ok(SummarySortField::TotalInvested),
            "claimcount" => Ok(SummarySortField::ClaimCount),
            "refundcount" => Ok(SummarySortField::RefundCount),
            "investmentcount" => Ok(SummarySortField::InvestmentCount),
            "lastclaimed" => Ok(SummarySortField::LastClaimed),
            "lastrefunded" => Ok(SummarySortField::LastRefunded),
            "lastinvested" => Ok(SummarySortField::LastInvested),
            "firstactivity" => Ok(SummarySortField::FirstActivity),
            "lastactivity" => Ok(SummarySortField::LastActivity),
            _ => Err(IndexError::InvalidQuery(format!(
                "unsupported investor summary sort field '{value}'"
            ))),
        }
    }
}

impl FromStr for RecordSortField {
    type Err = IndexError;

    fn from_str(value: &str) -> Result<Self> {
        match normalize(value).as_str() {
            "id" => Ok(RecordSortField::Id),
            "investor" | "address" => Ok(RecordSortField::Investor),
            "amount" => Ok(RecordSortField::Amount),
            "blocknumber" | "block" => Ok(RecordSortField::BlockNumber),
            "timestamp" => Ok(RecordSortField::Timestamp),
            "gasprice" => Ok(RecordSortField::GasPrice),
            _ => Err(IndexError::InvalidQuery(format!(
                "unsupported record sort field '{value}'"
            ))),
        }
    }
}

/// Read-only view over the entity store used by the GraphQL surface and the CLI.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<EntityStore>,
    list_page_size: usize,
    page_limit: usize,
}

impl QueryService {
    pub fn new(store: Arc<EntityStore>, list_page_size: usize, page_limit: usize) -> Self {
        Self {
            store,
            list_page_size,
            page_limit,
        }
    }

    pub fn page_limit(&self) -> usize {
        self.page_limit
    }

    pub fn cursor(&self) -> Result<Option<EventPosition>> {
        self.store.cursor()
    }

    pub fn investor_summary(&self, id: &str) -> Result<Option<InvestorSummary>> {
        self.store
            .load(EntityKind::InvestorSummary, &id.trim().to_ascii_lowercase())
    }

    pub fn investor_summaries(
        &self,
        page: &PageRequest<SummarySortField>,
    ) -> Result<Vec<InvestorSummary>> {
        let take = self.take(page.first);
        if take == 0 {
            return Ok(Vec::new());
        }
        let mut summaries: Vec<InvestorSummary> = self.store.list(EntityKind::InvestorSummary)?;
        summaries.sort_by(|lhs, rhs| {
            page.direction
                .apply(page.order_by.compare(lhs, rhs))
                .then_with(|| lhs.id.cmp(&rhs.id))
        });
        Ok(summaries.into_iter().skip(page.skip).take(take).collect())
    }

    pub fn activity_records(
        &self,
        action: Action,
        page: &PageRequest<RecordSortField>,
    ) -> Result<Vec<ActivityRecord>> {
        let take = self.take(page.first);
        if take == 0 {
            return Ok(Vec::new());
        }
        let mut records: Vec<ActivityRecord> = self.store.list(action.record_kind())?;
        records.sort_by(|lhs, rhs| {
            page.direction
                .apply(page.order_by.compare(lhs, rhs))
                .then_with(|| lhs.id.cmp(&rhs.id))
        });
        Ok(records.into_iter().skip(page.skip).take(take).collect())
    }

    pub fn activity_record(&self, action: Action, id: &str) -> Result<Option<ActivityRecord>> {
        self.store
            .load(action.record_kind(), &id.trim().to_ascii_lowercase())
    }

    pub fn totals(&self, action: Action) -> Result<ActionTotals> {
        Ok(self
            .store
            .load(action.totals_kind(), action.totals_id())?
            .unwrap_or_else(|| ActionTotals::empty(action)))
    }

    pub fn user_counters(&self) -> Result<UserCounters> {
        Ok(self
            .store
            .load(EntityKind::UserCounters, USER_COUNTERS_ID)?
            .unwrap_or_default())
    }

    pub fn sale_status(&self) -> Result<SaleStatus> {
        Ok(self
            .store
            .load(EntityKind::SaleStatus, SALE_STATUS_ID)?
            .unwrap_or_default())
    }

    fn take(&self, first: Option<usize>) -> usize {
        first.unwrap_or(self.list_page_size).min(self.page_limit)
    }
}
