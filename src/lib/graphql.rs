use async_graphql::Result as GqlResult;
use async_graphql::{Context, EmptyMutation, EmptySubscription, Object, Schema, SimpleObject};

use crate::{
    entity::{
        Action, ActionTotals, ActivityRecord, InvestorSummary, SALE_STATUS_ID, SaleStatus,
        USER_COUNTERS_ID, UserCounters,
    },
    query::{PageRequest, QueryService, RecordSortField, SortDirection, SummarySortField},
};

pub type SaleSchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

pub fn build_schema(queries: QueryService) -> SaleSchema {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(queries)
        .finish()
}

#[derive(Default)]
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn investor_summaries(
        &self,
        ctx: &Context<'_>,
        first: Option<usize>,
        skip: Option<usize>,
        order_by: Option<String>,
        order_direction: Option<String>,
    ) -> GqlResult<Vec<InvestorSummaryObject>> {
        let queries = ctx.data::<QueryService>()?;
        let page = page_request(first, skip, order_by, order_direction)?;
        let summaries = queries.investor_summaries(&page)?;
        Ok(summaries.into_iter().map(Into::into).collect())
    }

    async fn investor_summary(
        &self,
        ctx: &Context<'_>,
        id: String,
    ) -> GqlResult<Option<InvestorSummaryObject>> {
        let queries = ctx.data::<QueryService>()?;
        Ok(queries.investor_summary(&id)?.map(Into::into))
    }

    async fn token_claims(
        &self,
        ctx: &Context<'_>,
        first: Option<usize>,
        skip: Option<usize>,
        order_by: Option<String>,
        order_direction: Option<String>,
    ) -> GqlResult<Vec<ActivityRecordObject>> {
        list_records(ctx, Action::Claim, first, skip, order_by, order_direction)
    }

    async fn token_claim(
        &self,
        ctx: &Context<'_>,
        id: String,
    ) -> GqlResult<Option<ActivityRecordObject>> {
        find_record(ctx, Action::Claim, &id)
    }

    async fn refunds(
        &self,
        ctx: &Context<'_>,
        first: Option<usize>,
        skip: Option<usize>,
        order_by: Option<String>,
        order_direction: Option<String>,
    ) -> GqlResult<Vec<ActivityRecordObject>> {
        list_records(ctx, Action::Refund, first, skip, order_by, order_direction)
    }

    async fn refund(&self, ctx: &Context<'_>, id: String) -> GqlResult<Option<ActivityRecordObject>> {
        find_record(ctx, Action::Refund, &id)
    }

    async fn investments(
        &self,
        ctx: &Context<'_>,
        first: Option<usize>,
        skip: Option<usize>,
        order_by: Option<String>,
        order_direction: Option<String>,
    ) -> GqlResult<Vec<ActivityRecordObject>> {
        list_records(ctx, Action::Investment, first, skip, order_by, order_direction)
    }

    async fn investment(
        &self,
        ctx: &Context<'_>,
        id: String,
    ) -> GqlResult<Option<ActivityRecordObject>> {
        find_record(ctx, Action::Investment, &id)
    }

    async fn claim_totals(
        &self,
        ctx: &Context<'_>,
        id: Option<String>,
    ) -> GqlResult<Option<ClaimTotalsObject>> {
        if !is_singleton(id.as_deref(), Action::Claim.totals_id()) {
            return Ok(None);
        }
        let queries = ctx.data::<QueryService>()?;
        Ok(Some(queries.totals(Action::Claim)?.into()))
    }

    async fn refund_totals(
        &self,
        ctx: &Context<'_>,
        id: Option<String>,
    ) -> GqlResult<Option<RefundTotalsObject>> {
        if !is_singleton(id.as_deref(), Action::Refund.totals_id()) {
            return Ok(None);
        }
        let queries = ctx.data::<QueryService>()?;
        Ok(Some(queries.totals(Action::Refund)?.into()))
    }

    async fn investment_totals(
        &self,
        ctx: &Context<'_>,
        id: Option<String>,
    ) -> GqlResult<Option<InvestmentTotalsObject>> {
        if !is_singleton(id.as_deref(), Action::Investment.totals_id()) {
            return Ok(None);
        }
        let queries = ctx.data::<QueryService>()?;
        Ok(Some(queries.totals(Action::Investment)?.into()))
    }

    async fn user_counters(
        &self,
        ctx: &Context<'_>,
        id: Option<String>,
    ) -> GqlResult<Option<UserCountersObject>> {
        if !is_singleton(id.as_deref(), USER_COUNTERS_ID) {
            return Ok(None);
        }
        let queries = ctx.data::<QueryService>()?;
        Ok(Some(queries.user_counters()?.into()))
    }

    async fn sale_status(
        &self,
        ctx: &Context<'_>,
        id: Option<String>,
    ) -> GqlResult<Option<SaleStatusObject>> {
        if !is_singleton(id.as_deref(), SALE_STATUS_ID) {
            return Ok(None);
        }
        let queries = ctx.data::<QueryService>()?;
        Ok(Some(queries.sale_status()?.into()))
    }
}

fn is_singleton(requested: Option<&str>, well_known: &str) -> bool {
    requested.is_none_or(|id| id == well_known)
}

fn page_request<F>(
    first: Option<usize>,
    skip: Option<usize>,
    order_by: Option<String>,
    order_direction: Option<String>,
) -> GqlResult<PageRequest<F>>
where
    F: std::str::FromStr<Err = crate::error::IndexError> + Default,
{
    let order_by = match order_by {
        Some(value) => value.parse::<F>()?,
        None => F::default(),
    };
    let direction = match order_direction {
        Some(value) => value.parse::<SortDirection>()?,
        None => SortDirection::default(),
    };
    Ok(PageRequest {
        first,
        skip: skip.unwrap_or(0),
        order_by,
        direction,
    })
}

fn list_records(
    ctx: &Context<'_>,
    action: Action,
    first: Option<usize>,
    skip: Option<usize>,
    order_by: Option<String>,
    order_direction: Option<String>,
) -> GqlResult<Vec<ActivityRecordObject>> {
    let queries = ctx.data::<QueryService>()?;
    let page = page_request::<RecordSortField>(first, skip, order_by, order_direction)?;
    let records = queries.activity_records(action, &page)?;
    Ok(records.into_iter().map(Into::into).collect())
}

fn find_record(
    ctx: &Context<'_>,
    action: Action,
    id: &str,
) -> GqlResult<Option<ActivityRecordObject>> {
    let queries = ctx.data::<QueryService>()?;
    Ok(queries.activity_record(action, id)?.map(Into::into))
}

fn optional_time(value: Option<u64>) -> Option<String> {
    value.map(|secs| secs.to_string())
}

#[derive(SimpleObject)]
#[graphql(name = "InvestorSummary")]
struct InvestorSummaryObject {
    id: String,
    address: String,
    total_claimed: String,
    total_refunded: String,
    total_invested: String,
    claim_count: String,
    refund_count: String,
    investment_count: String,
    last_claimed: String,
    last_refunded: String,
    last_invested: String,
    first_activity: String,
    last_activity: String,
}

impl From<InvestorSummary> for InvestorSummaryObject {
    fn from(value: InvestorSummary) -> Self {
        Self {
            address: value.id.clone(),
            id: value.id,
            total_claimed: value.total_claimed.to_string(),
            total_refunded: value.total_refunded.to_string(),
            total_invested: value.total_invested.to_string(),
            claim_count: value.claim_count.to_string(),
            refund_count: value.refund_count.to_string(),
            investment_count: value.investment_count.to_string(),
            last_claimed: value.last_claimed.to_string(),
            last_refunded: value.last_refunded.to_string(),
            last_invested: value.last_invested.to_string(),
            first_activity: value.first_activity.to_string(),
            last_activity: value.last_activity.to_string(),
        }
    }
}

#[derive(SimpleObject)]
#[graphql(name = "ActivityRecord")]
struct ActivityRecordObject {
    id: String,
    investor: String,
    amount: String,
    block_number: String,
    transaction_hash: String,
    timestamp: String,
    gas_price: String,
}

impl From<ActivityRecord> for ActivityRecordObject {
    fn from(value: ActivityRecord) -> Self {
        Self {
            id: value.id,
            investor: value.investor,
            amount: value.amount.to_string(),
            block_number: value.block_number.to_string(),
            transaction_hash: value.transaction_hash,
            timestamp: value.timestamp.to_string(),
            gas_price: value.gas_price.to_string(),
        }
    }
}

#[derive(SimpleObject)]
#[graphql(name = "ClaimTotals")]
struct ClaimTotalsObject {
    id: String,
    total_claimed: String,
    total_claim_count: String,
    unique_claimer_addresses: String,
    last_updated: String,
}

impl From<ActionTotals> for ClaimTotalsObject {
    fn from(value: ActionTotals) -> Self {
        Self {
            id: value.action.totals_id().to_string(),
            total_claimed: value.total_amount.to_string(),
            total_claim_count: value.event_count.to_string(),
            unique_claimer_addresses: value.unique_addresses.to_string(),
            last_updated: value.last_updated.to_string(),
        }
    }
}

#[derive(SimpleObject)]
#[graphql(name = "RefundTotals")]
struct RefundTotalsObject {
    id: String,
    total_refunded: String,
    total_refund_count: String,
    unique_refund_addresses: String,
    last_updated: String,
}

impl From<ActionTotals> for RefundTotalsObject {
    fn from(value: ActionTotals) -> Self {
        Self {
            id: value.action.totals_id().to_string(),
            total_refunded: value.total_amount.to_string(),
            total_refund_count: value.event_count.to_string(),
            unique_refund_addresses: value.unique_addresses.to_string(),
            last_updated: value.last_updated.to_string(),
        }
    }
}

#[derive(SimpleObject)]
#[graphql(name = "InvestmentTotals")]
struct InvestmentTotalsObject {
    id: String,
    total_invested: String,
    total_investment_count: String,
    unique_investor_addresses: String,
    last_updated: String,
}

impl From<ActionTotals> for InvestmentTotalsObject {
    fn from(value: ActionTotals) -> Self {
        Self {
            id: value.action.totals_id().to_string(),
            total_invested: value.total_amount.to_string(),
            total_investment_count: value.event_count.to_string(),
            unique_investor_addresses: value.unique_addresses.to_string(),
            last_updated: value.last_updated.to_string(),
        }
    }
}

#[derive(SimpleObject)]
#[graphql(name = "UserCounters")]
struct UserCountersObject {
    id: String,
    total_investment_users: String,
    total_refund_users: String,
    total_claim_users: String,
    last_updated: String,
}

impl From<UserCounters> for UserCountersObject {
    fn from(value: UserCounters) -> Self {
        Self {
            id: USER_COUNTERS_ID.to_string(),
            total_investment_users: value.total_investment_users.to_string(),
            total_refund_users: value.total_refund_users.to_string(),
            total_claim_users: value.total_claim_users.to_string(),
            last_updated: value.last_updated.to_string(),
        }
    }
}

#[derive(SimpleObject)]
#[graphql(name = "SaleStatus")]
struct SaleStatusObject {
    id: String,
    total_capital_invested: String,
    total_capital_raised: String,
    total_capital_withdrawn: String,
    total_tokens_allocated: String,
    claim_tokens_merkle_root: Option<String>,
    is_canceled: bool,
    capital_withdrawn: bool,
    has_ended: bool,
    end_time: Option<String>,
    refund_end_time: Option<String>,
    lockup_end_time: Option<String>,
    vesting_start_time: Option<String>,
    ask_token: Option<String>,
    last_updated: String,
}

impl From<SaleStatus> for SaleStatusObject {
    fn from(value: SaleStatus) -> Self {
        Self {
            id: SALE_STATUS_ID.to_string(),
            total_capital_invested: value.total_capital_invested.to_string(),
            total_capital_raised: value.total_capital_raised.to_string(),
            total_capital_withdrawn: value.total_capital_withdrawn.to_string(),
            total_tokens_allocated: value.total_tokens_allocated.to_string(),
            claim_tokens_merkle_root: value.claim_tokens_merkle_root,
            is_canceled: value.is_canceled,
            capital_withdrawn: value.capital_withdrawn,
            has_ended: value.has_ended,
            end_time: optional_time(value.end_time),
            refund_end_time: optional_time(value.refund_end_time),
            lockup_end_time: optional_time(value.lockup_end_time),
            vesting_start_time: optional_time(value.vesting_start_time),
            ask_token: value.ask_token,
            last_updated: value.last_updated.to_string(),
        }
    }
}
