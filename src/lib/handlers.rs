//! Pure event handlers. Each takes the event plus a snapshot of the entities it
//! touches and returns the entities to persist; nothing here reads or writes
//! the store.

use crate::{
    amount::{self, checked_sum},
    entity::{
        ActionTotals, ActivityRecord, InvestorSummary, LifecycleRecord, SaleStatus, UserCounters,
    },
    error::{IndexError, Result},
    event::{Activity, LoggedEvent, SaleEvent},
};

/// Entities an activity event reads, as they stood before the event.
#[derive(Debug, Clone, Default)]
pub struct ActivitySnapshot {
    pub summary: Option<InvestorSummary>,
    pub totals: Option<ActionTotals>,
    pub counters: Option<UserCounters>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityUpdate {
    pub record: ActivityRecord,
    pub summary: InvestorSummary,
    pub totals: ActionTotals,
    pub counters: UserCounters,
    /// Whether this was the investor's first event of this action.
    pub first_of_kind: bool,
}

pub fn apply_activity(
    event: &LoggedEvent,
    activity: &Activity,
    snapshot: ActivitySnapshot,
) -> Result<ActivityUpdate> {
    let action = activity.action;
    let investor = amount::address_id(&activity.investor);
    let timestamp = event.effective_timestamp();

    let mut summary = snapshot
        .summary
        .unwrap_or_else(|| InvestorSummary::new(investor.clone()));
    if summary.id != investor {
        return Err(IndexError::Storage(format!(
            "summary snapshot {} does not belong to {investor}",
            summary.id
        )));
    }

    // Read once, before any counter moves; both unique counters use this answer.
    let first_of_kind = summary.count(action) == 0;
    let had_activity = summary.has_activity();

    {
        let (total, count, last) = summary.action_fields_mut(action);
        *total = checked_sum(*total, activity.amount, &format!("{action} total of {investor}"))?;
        *count = increment(*count, &format!("{action} count of {investor}"))?;
        *last = timestamp;
    }
    if !had_activity {
        summary.first_activity = timestamp;
    }
    summary.last_activity = summary.last_activity.max(timestamp);

    let mut totals = snapshot
        .totals
        .unwrap_or_else(|| ActionTotals::empty(action));
    if totals.action != action {
        return Err(IndexError::Storage(format!(
            "{} snapshot supplied for a {action} event",
            totals.action.totals_id()
        )));
    }
    totals.total_amount = checked_sum(totals.total_amount, activity.amount, action.totals_id())?;
    totals.event_count = increment(totals.event_count, action.totals_id())?;
    if first_of_kind {
        totals.unique_addresses = increment(totals.unique_addresses, action.totals_id())?;
    }
    totals.last_updated = totals.last_updated.max(timestamp);

    let mut counters = snapshot.counters.unwrap_or_default();
    if first_of_kind {
        let users = counters.users_mut(action);
        *users = increment(*users, "user counters")?;
    }
    counters.last_updated = counters.last_updated.max(timestamp);

    let record = ActivityRecord {
        id: event.record_id(),
        action,
        investor,
        amount: activity.amount,
        block_number: event.block_number,
        transaction_hash: amount::hash_hex(&event.transaction_hash),
        timestamp,
        gas_price: event.gas_price,
    };

    Ok(ActivityUpdate {
        record,
        summary,
        totals,
        counters,
        first_of_kind,
    })
}

/// Overwrites only the fields carried by the lifecycle event.
pub fn apply_lifecycle(event: &LoggedEvent, current: Option<SaleStatus>) -> Result<SaleStatus> {
    let mut status = current.unwrap_or_default();
    match &event.event {
        SaleEvent::SaleEnded { end_time } => {
            status.has_ended = true;
            status.end_time = Some(*end_time);
        }
        SaleEvent::CapitalRaisedPublished { capital_raised } => {
            status.total_capital_raised = *capital_raised;
        }
        SaleEvent::SaleResultsPublished {
            claim_merkle_root,
            tokens_allocated,
            token_address,
            vesting_start_time,
        } => {
            status.claim_tokens_merkle_root = Some(amount::hash_hex(claim_merkle_root));
            status.total_tokens_allocated = *tokens_allocated;
            status.ask_token = Some(amount::address_id(token_address));
            status.vesting_start_time = Some(*vesting_start_time);
        }
        other => {
            return Err(IndexError::MalformedEvent(format!(
                "{} is not a sale lifecycle event",
                other.name()
            )));
        }
    }
    status.last_updated = status.last_updated.max(event.block_timestamp);
    Ok(status)
}

pub fn lifecycle_record(event: &LoggedEvent) -> LifecycleRecord {
    LifecycleRecord {
        id: event.record_id(),
        event: event.event.name().to_string(),
        block_number: event.block_number,
        transaction_hash: amount::hash_hex(&event.transaction_hash),
        timestamp: event.block_timestamp,
    }
}

fn increment(value: u64, what: &str) -> Result<u64> {
    value
        .checked_add(1)
        .ok_or_else(|| IndexError::Overflow(what.to_string()))
}
