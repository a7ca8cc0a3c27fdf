use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use salegraph::{
    IndexError, Indexer, Outcome,
    amount::address_id,
    entity::{Action, ActionTotals, InvestorSummary, UserCounters},
    event::{EventLog, LoggedEvent, SaleEvent},
    query::{PageRequest, QueryService, SortDirection, SummarySortField},
    store::EntityStore,
};

type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

struct Harness {
    indexer: Indexer,
    queries: QueryService,
    next_block: u64,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(EntityStore::in_memory());
        Self {
            indexer: Indexer::new(Arc::clone(&store)),
            queries: QueryService::new(store, 100, 1000),
            next_block: 1,
        }
    }

    fn push(&mut self, block_timestamp: u64, event: SaleEvent) -> salegraph::Result<Outcome> {
        let logged = logged(self.next_block, block_timestamp, event);
        self.next_block += 1;
        self.indexer.process(&logged)
    }

    fn invest(&mut self, investor: Address, amount: u64, at: u64) -> salegraph::Result<Outcome> {
        self.push(
            at,
            SaleEvent::CapitalInvested {
                investor,
                amount: U256::from(amount),
                invest_timestamp: 0,
            },
        )
    }

    fn claim(&mut self, investor: Address, amount: u64, at: u64) -> salegraph::Result<Outcome> {
        self.push(
            at,
            SaleEvent::TokenAllocationClaimed {
                investor,
                amount: U256::from(amount),
            },
        )
    }

    fn refund(&mut self, investor: Address, amount: u64, at: u64) -> salegraph::Result<Outcome> {
        self.push(
            at,
            SaleEvent::CapitalRefunded {
                investor,
                amount: U256::from(amount),
            },
        )
    }

    fn summary(&self, investor: Address) -> InvestorSummary {
        self.queries
            .investor_summary(&address_id(&investor))
            .expect("summary lookup should succeed")
            .expect("summary should exist")
    }

    fn totals(&self, action: Action) -> ActionTotals {
        self.queries.totals(action).expect("totals lookup should succeed")
    }

    fn counters(&self) -> UserCounters {
        self.queries
            .user_counters()
            .expect("counter lookup should succeed")
    }
}

fn logged(block_number: u64, block_timestamp: u64, event: SaleEvent) -> LoggedEvent {
    LoggedEvent {
        block_number,
        block_timestamp,
        transaction_hash: B256::left_padding_from(&block_number.to_be_bytes()),
        log_index: 0,
        gas_price: U256::from(1_000_000_000u64),
        event,
    }
}

fn investor(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

#[test]
fn invest_twice_then_claim_scenario() -> TestResult<()> {
    let mut harness = Harness::new();
    let a = investor(0x0A);

    harness.invest(a, 100, 10)?;
    harness.invest(a, 50, 20)?;
    harness.claim(a, 30, 30)?;

    let summary = harness.summary(a);
    assert_eq!(summary.total_invested, U256::from(150u64));
    assert_eq!(summary.investment_count, 2);
    assert_eq!(summary.last_invested, 20);
    assert_eq!(summary.total_claimed, U256::from(30u64));
    assert_eq!(summary.claim_count, 1);
    assert_eq!(summary.last_claimed, 30);
    assert_eq!(summary.first_activity, 10);
    assert_eq!(summary.last_activity, 30);
    assert_eq!(summary.refund_count, 0);
    assert!(summary.total_refunded.is_zero());

    assert_eq!(harness.totals(Action::Investment).unique_addresses, 1);
    assert_eq!(harness.totals(Action::Investment).event_count, 2);
    assert_eq!(harness.counters().total_claim_users, 1);
    assert_eq!(harness.counters().total_investment_users, 1);
    assert_eq!(harness.counters().total_refund_users, 0);
    Ok(())
}

#[test]
fn two_addresses_each_invest_once() -> TestResult<()> {
    let mut harness = Harness::new();
    harness.invest(investor(0x01), 5, 100)?;
    harness.invest(investor(0x02), 7, 101)?;

    let totals = harness.totals(Action::Investment);
    assert_eq!(totals.event_count, 2);
    assert_eq!(totals.unique_addresses, 2);
    assert_eq!(totals.total_amount, U256::from(12u64));
    assert_eq!(totals.last_updated, 101);
    Ok(())
}

#[test]
fn zero_invest_timestamp_falls_back_to_block_time() -> TestResult<()> {
    let mut harness = Harness::new();
    let a = investor(0x0B);
    harness.invest(a, 1, 500)?;
    assert_eq!(harness.summary(a).last_invested, 500);

    let b = investor(0x0C);
    harness.push(
        600,
        SaleEvent::CapitalInvested {
            investor: b,
            amount: U256::from(1u64),
            invest_timestamp: 450,
        },
    )?;
    let summary = harness.summary(b);
    assert_eq!(summary.last_invested, 450);
    assert_eq!(summary.first_activity, 450);
    Ok(())
}

#[test]
fn unique_counters_move_once_per_address() -> TestResult<()> {
    let mut harness = Harness::new();
    let a = investor(0x0D);

    harness.claim(a, 1, 10)?;
    assert_eq!(harness.totals(Action::Claim).unique_addresses, 1);
    assert_eq!(harness.counters().total_claim_users, 1);

    harness.claim(a, 2, 11)?;
    assert_eq!(harness.totals(Action::Claim).unique_addresses, 1);
    assert_eq!(harness.totals(Action::Claim).event_count, 2);
    assert_eq!(harness.counters().total_claim_users, 1);

    // a claim does not make the address a first-time refunder
    harness.refund(a, 3, 12)?;
    assert_eq!(harness.totals(Action::Refund).unique_addresses, 1);
    assert_eq!(harness.counters().total_refund_users, 1);
    Ok(())
}

#[test]
fn summaries_hold_invariants_after_every_event() -> TestResult<()> {
    let mut harness = Harness::new();
    let addresses = [investor(0x11), investor(0x22), investor(0x33)];
    let mut first_seen: [Option<u64>; 3] = [None; 3];
    let mut expected_invested = [0u64; 3];
    let mut expected_claimed = [0u64; 3];

    for step in 0..30u64 {
        let slot = (step % 3) as usize;
        let address = addresses[slot];
        let at = 1_000 + step * 7;
        let amount = step + 1;
        match step % 4 {
            0 | 1 => {
                harness.invest(address, amount, at)?;
                expected_invested[slot] += amount;
            }
            2 => {
                harness.claim(address, amount, at)?;
                expected_claimed[slot] += amount;
            }
            _ => {
                harness.refund(address, amount, at)?;
            }
        }

        let summary = harness.summary(address);
        let first = *first_seen[slot].get_or_insert(summary.first_activity);
        assert_eq!(summary.first_activity, first, "firstActivity must never move");
        assert!(summary.first_activity <= summary.last_activity);
        for action in Action::ALL {
            assert_eq!(
                summary.count(action) == 0,
                summary.total(action).is_zero(),
                "count/total mismatch for {action} at step {step}"
            );
        }
    }

    for (slot, address) in addresses.iter().enumerate() {
        let summary = harness.summary(*address);
        assert_eq!(summary.total_invested, U256::from(expected_invested[slot]));
        assert_eq!(summary.total_claimed, U256::from(expected_claimed[slot]));
    }

    let report = harness.indexer.audit()?;
    assert!(report.is_consistent(), "audit mismatches: {:?}", report.mismatches);
    assert_eq!(report.summaries, 3);
    assert_eq!(report.records, 30);
    Ok(())
}

#[test]
fn totals_equal_sum_over_summaries() -> TestResult<()> {
    let mut harness = Harness::new();
    harness.invest(investor(0x01), 10, 1)?;
    harness.invest(investor(0x02), 20, 2)?;
    harness.refund(investor(0x02), 5, 3)?;
    harness.claim(investor(0x03), 40, 4)?;

    let page = PageRequest {
        first: None,
        skip: 0,
        order_by: SummarySortField::TotalInvested,
        direction: SortDirection::Desc,
    };
    let summaries = harness.queries.investor_summaries(&page)?;
    assert_eq!(summaries.len(), 3);
    assert_eq!(summaries[0].id, address_id(&investor(0x02)));

    for action in Action::ALL {
        let summed = summaries
            .iter()
            .fold(U256::ZERO, |acc, summary| acc + summary.total(action));
        let count: u64 = summaries.iter().map(|summary| summary.count(action)).sum();
        let totals = harness.totals(action);
        assert_eq!(totals.total_amount, summed, "{action} amount");
        assert_eq!(totals.event_count, count, "{action} count");
    }
    Ok(())
}

#[test]
fn amounts_beyond_u128_keep_full_precision() -> TestResult<()> {
    let mut harness = Harness::new();
    let a = investor(0x44);
    let large = U256::from(10u64).pow(U256::from(40u64));
    for at in [10, 20] {
        harness.push(
            at,
            SaleEvent::TokenAllocationClaimed {
                investor: a,
                amount: large,
            },
        )?;
    }
    assert_eq!(harness.summary(a).total_claimed, large * U256::from(2u64));
    assert_eq!(
        harness.totals(Action::Claim).total_amount.to_string(),
        "20000000000000000000000000000000000000000"
    );
    Ok(())
}

#[test]
fn redelivered_event_is_acknowledged_without_double_counting() -> TestResult<()> {
    let mut harness = Harness::new();
    let a = investor(0x55);
    let event = logged(
        7,
        70,
        SaleEvent::CapitalInvested {
            investor: a,
            amount: U256::from(9u64),
            invest_timestamp: 0,
        },
    );
    assert_eq!(harness.indexer.process(&event)?, Outcome::Applied);
    assert_eq!(harness.indexer.process(&event)?, Outcome::AlreadyApplied);
    assert_eq!(harness.summary(a).investment_count, 1);
    assert_eq!(harness.totals(Action::Investment).event_count, 1);
    assert!(harness.indexer.halted().is_none());
    Ok(())
}

#[test]
fn unseen_event_behind_cursor_halts_indexer() -> TestResult<()> {
    let mut harness = Harness::new();
    harness.indexer.process(&logged(
        10,
        100,
        SaleEvent::CapitalRefunded {
            investor: investor(0x66),
            amount: U256::from(1u64),
        },
    ))?;

    let late = logged(
        4,
        40,
        SaleEvent::CapitalRefunded {
            investor: investor(0x67),
            amount: U256::from(1u64),
        },
    );
    let err = harness
        .indexer
        .process(&late)
        .expect_err("late event must be rejected");
    assert!(matches!(err, IndexError::OutOfOrder { .. }), "got {err:?}");
    assert!(harness.indexer.halted().is_some());

    let next = harness.claim(investor(0x68), 1, 200);
    assert!(matches!(next, Err(IndexError::Halted(_))));
    assert_eq!(harness.totals(Action::Refund).event_count, 1);
    Ok(())
}

#[test]
fn unseen_lifecycle_event_behind_cursor_halts_indexer() -> TestResult<()> {
    let harness = Harness::new();
    harness.indexer.process(&logged(
        5,
        50,
        SaleEvent::CapitalInvested {
            investor: investor(0x69),
            amount: U256::from(1u64),
            invest_timestamp: 0,
        },
    ))?;

    let err = harness
        .indexer
        .process(&logged(4, 40, SaleEvent::SaleEnded { end_time: 40 }))
        .expect_err("late lifecycle event must be rejected");
    assert!(matches!(err, IndexError::OutOfOrder { .. }), "got {err:?}");
    assert!(harness.indexer.halted().is_some());
    assert!(!harness.queries.sale_status()?.has_ended);
    Ok(())
}

#[test]
fn malformed_event_leaves_store_untouched() -> TestResult<()> {
    let mut harness = Harness::new();
    let err = harness
        .invest(investor(0x77), 0, 10)
        .expect_err("zero amount must be rejected");
    assert!(matches!(err, IndexError::MalformedEvent(_)), "got {err:?}");

    assert_eq!(harness.totals(Action::Investment).event_count, 0);
    assert!(
        harness
            .queries
            .investor_summary(&address_id(&investor(0x77)))?
            .is_none()
    );
    assert!(harness.queries.cursor()?.is_none());
    Ok(())
}

#[test]
fn lifecycle_events_update_sale_status_only() -> TestResult<()> {
    let mut harness = Harness::new();
    harness.invest(investor(0x01), 10, 5)?;
    harness.push(50, SaleEvent::SaleEnded { end_time: 49 })?;
    harness.push(
        60,
        SaleEvent::CapitalRaisedPublished {
            capital_raised: U256::from(10u64),
        },
    )?;

    let status = harness.queries.sale_status()?;
    assert!(status.has_ended);
    assert_eq!(status.end_time, Some(49));
    assert_eq!(status.total_capital_raised, U256::from(10u64));
    assert_eq!(status.last_updated, 60);
    assert_eq!(harness.totals(Action::Investment).event_count, 1);
    Ok(())
}

#[test]
fn ndjson_log_ingests_in_order() -> TestResult<()> {
    let investor = "0x00000000000000000000000000000000000000aa";
    let log = format!(
        r#"{{"blockNumber":1,"blockTimestamp":10,"transactionHash":"0x{hash1}","logIndex":0,"event":{{"type":"CapitalInvested","investor":"{investor}","amount":"100","investTimestamp":0}}}}

{{"blockNumber":2,"blockTimestamp":20,"transactionHash":"0x{hash2}","logIndex":3,"event":{{"type":"TokenAllocationClaimed","investor":"{investor}","amount":"30"}}}}
"#,
        hash1 = "11".repeat(32),
        hash2 = "22".repeat(32),
    );

    let harness = Harness::new();
    let report = harness
        .indexer
        .ingest(EventLog::from_reader(log.as_bytes(), "inline"))?;
    assert_eq!(report.applied, 2);
    assert_eq!(report.already_applied, 0);
    let cursor = report.cursor.expect("cursor should be committed");
    assert_eq!((cursor.block_number, cursor.log_index), (2, 3));

    let summary = harness
        .queries
        .investor_summary(&investor.to_uppercase().replacen("0X", "0x", 1))?
        .expect("summary should exist");
    assert_eq!(summary.total_invested, U256::from(100u64));
    assert_eq!(summary.total_claimed, U256::from(30u64));

    let replay = harness
        .indexer
        .ingest(EventLog::from_reader(log.as_bytes(), "inline"))?;
    assert_eq!(replay.applied, 0);
    assert_eq!(replay.already_applied, 2);
    Ok(())
}

#[test]
fn undecodable_log_line_halts_ingest() {
    let harness = Harness::new();
    let log = "{\"blockNumber\":1}\n";
    let err = harness
        .indexer
        .ingest(EventLog::from_reader(log.as_bytes(), "broken.ndjson"))
        .expect_err("truncated line must fail");
    assert!(err.to_string().contains("broken.ndjson:1"), "got {err}");
    assert!(harness.indexer.halted().is_some());
}
