use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
    time::Instant,
};

use alloy_primitives::U256;
use metrics::{counter, histogram};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::{
    amount::{self, checked_sum},
    entity::{
        Action, ActionTotals, ActivityRecord, EntityKind, InvestorSummary, LifecycleRecord,
        SALE_STATUS_ID, SaleStatus, USER_COUNTERS_ID, UserCounters,
    },
    error::{IndexError, Result},
    event::{EventPosition, LoggedEvent},
    handlers::{ActivitySnapshot, apply_activity, apply_lifecycle, lifecycle_record},
    store::EntityStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Re-delivery of an event whose effects are already committed.
    AlreadyApplied,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::AlreadyApplied => "already_applied",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub applied: u64,
    pub already_applied: u64,
    pub cursor: Option<EventPosition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditMismatch {
    pub entity: String,
    pub field: String,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for AuditMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}: expected {}, found {}",
            self.entity, self.field, self.expected, self.actual
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub summaries: usize,
    pub records: usize,
    pub mismatches: Vec<AuditMismatch>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }

    fn check<T: PartialEq + ToString>(&mut self, entity: &str, field: &str, expected: T, actual: T) {
        if expected != actual {
            self.mismatches.push(AuditMismatch {
                entity: entity.to_string(),
                field: field.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
    }
}

/// Sequential consumer of the sale event stream. Each event is applied in its
/// own store transaction together with the cursor; the first fault halts the
/// indexer for the lifetime of the process.
pub struct Indexer {
    store: Arc<EntityStore>,
    halted: Mutex<Option<String>>,
}

impl Indexer {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self {
            store,
            halted: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// The fault that stopped the indexer, if any.
    pub fn halted(&self) -> Option<String> {
        self.halted.lock().clone()
    }

    pub fn process(&self, event: &LoggedEvent) -> Result<Outcome> {
        if let Some(reason) = self.halted() {
            return Err(IndexError::Halted(reason));
        }

        let start = Instant::now();
        let name = event.event.name();
        match self.apply(event) {
            Ok(outcome) => {
                debug!(
                    event = name,
                    position = %event.position(),
                    outcome = outcome.as_str(),
                    "processed sale event"
                );
                record_event(name, outcome.as_str(), start);
                Ok(outcome)
            }
            Err(err) => {
                record_event(name, "fault", start);
                Err(self.halt(err))
            }
        }
    }

    pub fn ingest<I>(&self, events: I) -> Result<IngestReport>
    where
        I: IntoIterator<Item = Result<LoggedEvent>>,
    {
        let start = Instant::now();
        let mut report = IngestReport::default();
        for item in events {
            let event = match item {
                Ok(event) => event,
                Err(err) => return Err(self.halt(err)),
            };
            match self.process(&event)? {
                Outcome::Applied => report.applied += 1,
                Outcome::AlreadyApplied => report.already_applied += 1,
            }
        }
        report.cursor = self.store.cursor()?;
        info!(
            applied = report.applied,
            already_applied = report.already_applied,
            cursor = ?report.cursor,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ingest run complete"
        );
        Ok(report)
    }

    /// Re-derives every singleton from the investor summaries and from the raw
    /// records, and checks the per-summary invariants.
    pub fn audit(&self) -> Result<AuditReport> {
        let summaries: Vec<InvestorSummary> = self.store.list(EntityKind::InvestorSummary)?;
        let mut report = AuditReport {
            summaries: summaries.len(),
            ..Default::default()
        };

        for summary in &summaries {
            audit_summary(&mut report, summary);
        }

        let counters: UserCounters = self
            .store
            .load(EntityKind::UserCounters, USER_COUNTERS_ID)?
            .unwrap_or_default();

        for action in Action::ALL {
            let totals: ActionTotals = self
                .store
                .load(action.totals_kind(), action.totals_id())?
                .unwrap_or_else(|| ActionTotals::empty(action));
            let records: Vec<ActivityRecord> = self.store.list(action.record_kind())?;
            report.records += records.len();

            let mut summed = U256::ZERO;
            let mut events = 0u64;
            let mut unique = 0u64;
            for summary in &summaries {
                summed = checked_sum(summed, summary.total(action), action.totals_id())?;
                events += summary.count(action);
                if summary.count(action) > 0 {
                    unique += 1;
                }
            }
            let id = action.totals_id();
            report.check(id, "totalAmount", summed, totals.total_amount);
            report.check(id, "eventCount", events, totals.event_count);
            report.check(id, "uniqueAddresses", unique, totals.unique_addresses);
            report.check(USER_COUNTERS_ID, action.as_str(), unique, counters.users(action));

            let mut per_investor: BTreeMap<&str, (U256, u64)> = BTreeMap::new();
            let mut record_sum = U256::ZERO;
            for record in &records {
                record_sum = checked_sum(record_sum, record.amount, id)?;
                let entry = per_investor
                    .entry(record.investor.as_str())
                    .or_insert((U256::ZERO, 0));
                entry.0 = checked_sum(entry.0, record.amount, &record.investor)?;
                entry.1 += 1;
            }
            report.check(id, "recordAmount", record_sum, totals.total_amount);
            report.check(id, "recordCount", records.len() as u64, totals.event_count);

            let investors: BTreeSet<&str> = summaries
                .iter()
                .filter(|summary| summary.count(action) > 0)
                .map(|summary| summary.id.as_str())
                .chain(per_investor.keys().copied())
                .collect();
            for investor in investors {
                let (amount, count) = per_investor
                    .get(investor)
                    .copied()
                    .unwrap_or((U256::ZERO, 0));
                let summary = summaries.iter().find(|summary| summary.id == investor);
                let (total, summary_count) = summary
                    .map(|summary| (summary.total(action), summary.count(action)))
                    .unwrap_or((U256::ZERO, 0));
                report.check(investor, &format!("{action} records amount"), amount, total);
                report.check(investor, &format!("{action} records count"), count, summary_count);
            }
        }

        let sale: Option<SaleStatus> = self.store.load(EntityKind::SaleStatus, SALE_STATUS_ID)?;
        info!(
            summaries = report.summaries,
            records = report.records,
            mismatches = report.mismatches.len(),
            sale_status = sale.is_some(),
            "audit complete"
        );
        Ok(report)
    }

    fn apply(&self, event: &LoggedEvent) -> Result<Outcome> {
        event.validate()?;
        let position = event.position();
        let mut tx = self.store.transaction()?;
        // another caller may have halted while this one waited for the write lock
        if let Some(reason) = self.halted() {
            return Err(IndexError::Halted(reason));
        }
        let redelivered = tx.cursor()?.is_some_and(|cursor| position <= cursor);
        let record_id = event.record_id();

        match event.event.activity() {
            Some(activity) => {
                let action = activity.action;
                let existing: Option<ActivityRecord> = tx.load(action.record_kind(), &record_id)?;
                if let Some(outcome) =
                    redelivery(event, &record_id, redelivered, existing.is_some())?
                {
                    return Ok(outcome);
                }

                let investor = amount::address_id(&activity.investor);
                let snapshot = ActivitySnapshot {
                    summary: tx.load(EntityKind::InvestorSummary, &investor)?,
                    totals: tx.load(action.totals_kind(), action.totals_id())?,
                    counters: tx.load(EntityKind::UserCounters, USER_COUNTERS_ID)?,
                };
                let update = apply_activity(event, &activity, snapshot)?;
                tx.upsert(&update.record)?;
                tx.upsert(&update.summary)?;
                tx.upsert(&update.totals)?;
                tx.upsert(&update.counters)?;
            }
            None => {
                let existing: Option<LifecycleRecord> =
                    tx.load(EntityKind::SaleLifecycle, &record_id)?;
                if let Some(outcome) =
                    redelivery(event, &record_id, redelivered, existing.is_some())?
                {
                    return Ok(outcome);
                }
                let current = tx.load(EntityKind::SaleStatus, SALE_STATUS_ID)?;
                let status = apply_lifecycle(event, current)?;
                tx.upsert(&lifecycle_record(event))?;
                tx.upsert(&status)?;
            }
        }

        tx.set_cursor(position);
        tx.commit()?;
        Ok(Outcome::Applied)
    }

    fn halt(&self, err: IndexError) -> IndexError {
        if matches!(err, IndexError::Halted(_)) {
            return err;
        }
        let reason = err.to_string();
        error!(error = %reason, "indexer halted; replay or operator intervention required");
        let mut halted = self.halted.lock();
        if halted.is_none() {
            *halted = Some(reason);
        }
        err
    }
}

/// Decides what to do with an event given the cursor and whether its record
/// is already stored. `None` means apply it.
fn redelivery(
    event: &LoggedEvent,
    record_id: &str,
    redelivered: bool,
    recorded: bool,
) -> Result<Option<Outcome>> {
    match (redelivered, recorded) {
        (true, true) => Ok(Some(Outcome::AlreadyApplied)),
        (true, false) => Err(IndexError::OutOfOrder {
            id: record_id.to_string(),
            block_number: event.block_number,
            log_index: event.log_index,
        }),
        (false, true) => Err(IndexError::Storage(format!(
            "record {record_id} already exists ahead of the committed cursor"
        ))),
        (false, false) => Ok(None),
    }
}

fn audit_summary(report: &mut AuditReport, summary: &InvestorSummary) {
    let id = summary.id.as_str();
    for action in Action::ALL {
        let count = summary.count(action);
        report.check(
            id,
            &format!("{action} total is zero"),
            count == 0,
            summary.total(action).is_zero(),
        );
        report.check(
            id,
            &format!("{action} last is zero"),
            count == 0,
            summary.last(action) == 0,
        );
    }
    if summary.has_activity() && summary.first_activity > summary.last_activity {
        report.check(
            id,
            "firstActivity",
            format!("<= {}", summary.last_activity),
            summary.first_activity.to_string(),
        );
    }
}

fn record_event(event: &'static str, outcome: &'static str, start: Instant) {
    counter!("salegraph_events_total", "event" => event, "outcome" => outcome).increment(1);
    histogram!("salegraph_event_duration_seconds", "event" => event)
        .record(start.elapsed().as_secs_f64());
}
