//! Sale contract events as delivered by the upstream source, and the NDJSON
//! log reader used to feed them to the indexer.

use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader, Lines, Read},
    path::Path,
};

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{
    amount::{self, decimal},
    entity::Action,
    error::{IndexError, Result},
};

/// Delivery order of an event: ascending block, then ascending log index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPosition {
    pub block_number: u64,
    pub log_index: u64,
}

impl EventPosition {
    pub fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

impl fmt::Display for EventPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedEvent {
    pub block_number: u64,
    pub block_timestamp: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
    #[serde(with = "decimal", default)]
    pub gas_price: U256,
    pub event: SaleEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum SaleEvent {
    TokenAllocationClaimed {
        investor: Address,
        #[serde(with = "decimal")]
        amount: U256,
    },
    CapitalRefunded {
        investor: Address,
        #[serde(with = "decimal")]
        amount: U256,
    },
    CapitalInvested {
        investor: Address,
        #[serde(with = "decimal")]
        amount: U256,
        /// Off-chain signed investment time; zero means "use the block time".
        #[serde(default)]
        invest_timestamp: u64,
    },
    SaleEnded {
        end_time: u64,
    },
    CapitalRaisedPublished {
        #[serde(with = "decimal")]
        capital_raised: U256,
    },
    SaleResultsPublished {
        claim_merkle_root: B256,
        #[serde(with = "decimal")]
        tokens_allocated: U256,
        token_address: Address,
        vesting_start_time: u64,
    },
}

/// The per-investor part of a claim, refund, or investment event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activity {
    pub action: Action,
    pub investor: Address,
    pub amount: U256,
    pub backdated_to: Option<u64>,
}

impl SaleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SaleEvent::TokenAllocationClaimed { .. } => "TokenAllocationClaimed",
            SaleEvent::CapitalRefunded { .. } => "CapitalRefunded",
            SaleEvent::CapitalInvested { .. } => "CapitalInvested",
            SaleEvent::SaleEnded { .. } => "SaleEnded",
            SaleEvent::CapitalRaisedPublished { .. } => "CapitalRaisedPublished",
            SaleEvent::SaleResultsPublished { .. } => "SaleResultsPublished",
        }
    }

    pub fn activity(&self) -> Option<Activity> {
        match *self {
            SaleEvent::TokenAllocationClaimed { investor, amount } => Some(Activity {
                action: Action::Claim,
                investor,
                amount,
                backdated_to: None,
            }),
            SaleEvent::CapitalRefunded { investor, amount } => Some(Activity {
                action: Action::Refund,
                investor,
                amount,
                backdated_to: None,
            }),
            SaleEvent::CapitalInvested {
                investor,
                amount,
                invest_timestamp,
            } => Some(Activity {
                action: Action::Investment,
                investor,
                amount,
                backdated_to: (invest_timestamp > 0).then_some(invest_timestamp),
            }),
            SaleEvent::SaleEnded { .. }
            | SaleEvent::CapitalRaisedPublished { .. }
            | SaleEvent::SaleResultsPublished { .. } => None,
        }
    }
}

impl LoggedEvent {
    pub fn position(&self) -> EventPosition {
        EventPosition::new(self.block_number, self.log_index)
    }

    /// `<tx hash>-<log index>`; unique even for several logs in one transaction.
    pub fn record_id(&self) -> String {
        format!("{}-{}", amount::hash_hex(&self.transaction_hash), self.log_index)
    }

    pub fn effective_timestamp(&self) -> u64 {
        self.event
            .activity()
            .and_then(|activity| activity.backdated_to)
            .unwrap_or(self.block_timestamp)
    }

    pub fn validate(&self) -> Result<()> {
        let name = self.event.name();
        if self.block_timestamp == 0 {
            return Err(IndexError::MalformedEvent(format!(
                "{name} at {} has a zero block timestamp",
                self.position()
            )));
        }
        if let Some(activity) = self.event.activity() {
            if activity.investor == Address::ZERO {
                return Err(IndexError::MalformedEvent(format!(
                    "{name} at {} has a zero investor address",
                    self.position()
                )));
            }
            if activity.amount.is_zero() {
                return Err(IndexError::MalformedEvent(format!(
                    "{name} at {} has a zero amount",
                    self.position()
                )));
            }
        }
        Ok(())
    }
}

/// Newline-delimited JSON event log. Blank lines are ignored; any other line
/// that fails to decode is reported with its line number.
pub struct EventLog<R> {
    lines: Lines<BufReader<R>>,
    line: usize,
    source: String,
}

impl EventLog<File> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|err| {
            IndexError::Config(format!("unable to open event log {}: {err}", path.display()))
        })?;
        Ok(Self::from_reader(file, path.display().to_string()))
    }
}

impl<R: Read> EventLog<R> {
    pub fn from_reader(reader: R, source: impl Into<String>) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            line: 0,
            source: source.into(),
        }
    }
}

impl<R: Read> Iterator for EventLog<R> {
    type Item = Result<LoggedEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line += 1;
            let line = match line {
                Ok(line) => line,
                Err(err) => return Some(Err(IndexError::Io(err))),
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Some(serde_json::from_str(trimmed).map_err(|err| {
                IndexError::MalformedEvent(format!("{}:{}: {err}", self.source, self.line))
            }));
        }
    }
}
