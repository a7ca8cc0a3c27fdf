//! Read-side client for a salegraph (or compatible subgraph) GraphQL endpoint.
//!
//! A failed fetch is always [`IndexError::Unavailable`]; a singleton that the
//! endpoint reports as `null` is the zero-valued default. Callers can therefore
//! tell "no data yet" apart from "could not ask".

use std::time::Duration;

use alloy_primitives::U256;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    amount::decimal,
    entity::{Action, ActionTotals, InvestorSummary, SaleStatus, UserCounters},
    error::{IndexError, Result},
    query::{PageRequest, SummarySortField},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const GET_ALL_TOTALS: &str = r#"
query GetAllTotals {
  userCounters(id: "user-counters") { totalInvestmentUsers totalRefundUsers totalClaimUsers lastUpdated }
  investmentTotals(id: "investment-totals") { totalInvested totalInvestmentCount uniqueInvestorAddresses lastUpdated }
  refundTotals(id: "refund-totals") { totalRefunded totalRefundCount uniqueRefundAddresses lastUpdated }
  claimTotals(id: "claim-totals") { totalClaimed totalClaimCount uniqueClaimerAddresses lastUpdated }
}
"#;

const GET_INVESTOR_SUMMARIES: &str = r#"
query GetInvestorSummaries($first: Int, $skip: Int, $orderBy: String, $orderDirection: String) {
  investorSummaries(first: $first, skip: $skip, orderBy: $orderBy, orderDirection: $orderDirection) {
    id totalClaimed totalRefunded totalInvested claimCount refundCount investmentCount
    lastClaimed lastRefunded lastInvested firstActivity lastActivity
  }
}
"#;

const GET_SALE_STATUS: &str = r#"
query GetSaleStatus {
  saleStatus(id: "sale") {
    totalCapitalInvested totalCapitalRaised totalCapitalWithdrawn totalTokensAllocated
    claimTokensMerkleRoot isCanceled capitalWithdrawn hasEnded endTime refundEndTime
    lockupEndTime vestingStartTime askToken lastUpdated
  }
}
"#;

/// The dashboard's summary cards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardTotals {
    pub claims: ActionTotals,
    pub refunds: ActionTotals,
    pub investments: ActionTotals,
    pub users: UserCounters,
}

impl DashboardTotals {
    pub fn totals(&self, action: Action) -> &ActionTotals {
        match action {
            Action::Claim => &self.claims,
            Action::Refund => &self.refunds,
            Action::Investment => &self.investments,
        }
    }
}

#[derive(Clone)]
pub struct SubgraphClient {
    http: reqwest::Client,
    endpoint: String,
}

impl SubgraphClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(IndexError::Config("GraphQL endpoint must not be empty".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| IndexError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn dashboard_totals(&self) -> Result<DashboardTotals> {
        let data: AllTotalsData = self.query(GET_ALL_TOTALS, json!({})).await?;
        Ok(data.into())
    }

    pub async fn investor_summaries(
        &self,
        page: &PageRequest<SummarySortField>,
    ) -> Result<Vec<InvestorSummary>> {
        let variables = json!({
            "first": page.first,
            "skip": page.skip,
            "orderBy": page.order_by.as_str(),
            "orderDirection": page.direction.as_str(),
        });
        let data: SummariesData = self.query(GET_INVESTOR_SUMMARIES, variables).await?;
        Ok(data
            .investor_summaries
            .into_iter()
            .map(Into::into)
            .collect())
    }

    pub async fn sale_status(&self) -> Result<SaleStatus> {
        let data: SaleStatusData = self.query(GET_SALE_STATUS, json!({})).await?;
        Ok(data.sale_status.map(Into::into).unwrap_or_default())
    }

    async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        debug!(endpoint = %self.endpoint, "posting GraphQL query");
        let response = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|err| IndexError::Unavailable(format!("{}: {err}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexError::Unavailable(format!(
                "{} responded with {status}",
                self.endpoint
            )));
        }

        let body: GraphQlResponse<T> = response.json().await.map_err(|err| {
            IndexError::Unavailable(format!("invalid response from {}: {err}", self.endpoint))
        })?;
        body.into_data()
    }
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

impl<T> GraphQlResponse<T> {
    fn into_data(self) -> Result<T> {
        if !self.errors.is_empty() {
            let messages: Vec<_> = self.errors.into_iter().map(|err| err.message).collect();
            return Err(IndexError::Unavailable(messages.join("; ")));
        }
        self.data
            .ok_or_else(|| IndexError::Unavailable("response carried no data".into()))
    }
}

/// GraphQL BigInt-style integers arrive as strings; plain numbers are accepted too.
mod numeric {
    use serde::{Deserialize, Deserializer, de::Error as _};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(u64),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Text(raw) => raw.trim().parse().map_err(D::Error::custom),
            Repr::Number(value) => Ok(value),
        }
    }

    pub mod option {
        use serde::{Deserialize, Deserializer};

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
        where
            D: Deserializer<'de>,
        {
            #[derive(Deserialize)]
            struct Wrapper(#[serde(deserialize_with = "super::deserialize")] u64);

            Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(value)| value))
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllTotalsData {
    user_counters: Option<UserCountersWire>,
    investment_totals: Option<InvestmentTotalsWire>,
    refund_totals: Option<RefundTotalsWire>,
    claim_totals: Option<ClaimTotalsWire>,
}

impl From<AllTotalsData> for DashboardTotals {
    fn from(value: AllTotalsData) -> Self {
        Self {
            claims: value
                .claim_totals
                .map(Into::into)
                .unwrap_or_else(|| ActionTotals::empty(Action::Claim)),
            refunds: value
                .refund_totals
                .map(Into::into)
                .unwrap_or_else(|| ActionTotals::empty(Action::Refund)),
            investments: value
                .investment_totals
                .map(Into::into)
                .unwrap_or_else(|| ActionTotals::empty(Action::Investment)),
            users: value.user_counters.map(Into::into).unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserCountersWire {
    #[serde(with = "numeric")]
    total_investment_users: u64,
    #[serde(with = "numeric")]
    total_refund_users: u64,
    #[serde(with = "numeric")]
    total_claim_users: u64,
    #[serde(default, with = "numeric")]
    last_updated: u64,
}

impl From<UserCountersWire> for UserCounters {
    fn from(value: UserCountersWire) -> Self {
        Self {
            total_investment_users: value.total_investment_users,
            total_refund_users: value.total_refund_users,
            total_claim_users: value.total_claim_users,
            last_updated: value.last_updated,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClaimTotalsWire {
    #[serde(with = "decimal")]
    total_claimed: U256,
    #[serde(with = "numeric")]
    total_claim_count: u64,
    #[serde(with = "numeric")]
    unique_claimer_addresses: u64,
    #[serde(default, with = "numeric")]
    last_updated: u64,
}

impl From<ClaimTotalsWire> for ActionTotals {
    fn from(value: ClaimTotalsWire) -> Self {
        Self {
            action: Action::Claim,
            total_amount: value.total_claimed,
            event_count: value.total_claim_count,
            unique_addresses: value.unique_claimer_addresses,
            last_updated: value.last_updated,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefundTotalsWire {
    #[serde(with = "decimal")]
    total_refunded: U256,
    #[serde(with = "numeric")]
    total_refund_count: u64,
    #[serde(with = "numeric")]
    unique_refund_addresses: u64,
    #[serde(default, with = "numeric")]
    last_updated: u64,
}

impl From<RefundTotalsWire> for ActionTotals {
    fn from(value: RefundTotalsWire) -> Self {
        Self {
            action: Action::Refund,
            total_amount: value.total_refunded,
            event_count: value.total_refund_count,
            unique_addresses: value.unique_refund_addresses,
            last_updated: value.last_updated,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvestmentTotalsWire {
    #[serde(with = "decimal")]
    total_invested: U256,
    #[serde(with = "numeric")]
    total_investment_count: u64,
    #[serde(with = "numeric")]
    unique_investor_addresses: u64,
    #[serde(default, with = "numeric")]
    last_updated: u64,
}

impl From<InvestmentTotalsWire> for ActionTotals {
    fn from(value: InvestmentTotalsWire) -> Self {
        Self {
            action: Action::Investment,
            total_amount: value.total_invested,
            event_count: value.total_investment_count,
            unique_addresses: value.unique_investor_addresses,
            last_updated: value.last_updated,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummariesData {
    investor_summaries: Vec<InvestorSummaryWire>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvestorSummaryWire {
    id: String,
    #[serde(with = "decimal")]
    total_claimed: U256,
    #[serde(with = "decimal")]
    total_refunded: U256,
    #[serde(with = "decimal")]
    total_invested: U256,
    #[serde(with = "numeric")]
    claim_count: u64,
    #[serde(with = "numeric")]
    refund_count: u64,
    #[serde(with = "numeric")]
    investment_count: u64,
    #[serde(default, with = "numeric::option")]
    last_claimed: Option<u64>,
    #[serde(default, with = "numeric::option")]
    last_refunded: Option<u64>,
    #[serde(default, with = "numeric::option")]
    last_invested: Option<u64>,
    #[serde(default, with = "numeric::option")]
    first_activity: Option<u64>,
    #[serde(default, with = "numeric::option")]
    last_activity: Option<u64>,
}

impl From<InvestorSummaryWire> for InvestorSummary {
    fn from(value: InvestorSummaryWire) -> Self {
        Self {
            id: value.id.to_ascii_lowercase(),
            total_claimed: value.total_claimed,
            total_refunded: value.total_refunded,
            total_invested: value.total_invested,
            claim_count: value.claim_count,
            refund_count: value.refund_count,
            investment_count: value.investment_count,
            last_claimed: value.last_claimed.unwrap_or(0),
            last_refunded: value.last_refunded.unwrap_or(0),
            last_invested: value.last_invested.unwrap_or(0),
            first_activity: value.first_activity.unwrap_or(0),
            last_activity: value.last_activity.unwrap_or(0),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaleStatusData {
    sale_status: Option<SaleStatusWire>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaleStatusWire {
    #[serde(with = "decimal")]
    total_capital_invested: U256,
    #[serde(with = "decimal")]
    total_capital_raised: U256,
    #[serde(with = "decimal")]
    total_capital_withdrawn: U256,
    #[serde(with = "decimal")]
    total_tokens_allocated: U256,
    claim_tokens_merkle_root: Option<String>,
    is_canceled: bool,
    capital_withdrawn: bool,
    has_ended: bool,
    #[serde(default, with = "numeric::option")]
    end_time: Option<u64>,
    #[serde(default, with = "numeric::option")]
    refund_end_time: Option<u64>,
    #[serde(default, with = "numeric::option")]
    lockup_end_time: Option<u64>,
    #[serde(default, with = "numeric::option")]
    vesting_start_time: Option<u64>,
    ask_token: Option<String>,
    #[serde(default, with = "numeric")]
    last_updated: u64,
}

impl From<SaleStatusWire> for SaleStatus {
    fn from(value: SaleStatusWire) -> Self {
        Self {
            total_capital_invested: value.total_capital_invested,
            total_capital_raised: value.total_capital_raised,
            total_capital_withdrawn: value.total_capital_withdrawn,
            total_tokens_allocated: value.total_tokens_allocated,
            claim_tokens_merkle_root: value.claim_tokens_merkle_root,
            is_canceled: value.is_canceled,
            capital_withdrawn: value.capital_withdrawn,
            has_ended: value.has_ended,
            end_time: value.end_time,
            refund_end_time: value.refund_end_time,
            lockup_end_time: value.lockup_end_time,
            vesting_start_time: value.vesting_start_time,
            ask_token: value.ask_token,
            last_updated: value.last_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_singletons_become_empty_totals() {
        let body: GraphQlResponse<AllTotalsData> = serde_json::from_str(
            r#"{"data":{"userCounters":null,"investmentTotals":{"totalInvested":"1500000","totalInvestmentCount":"2","uniqueInvestorAddresses":"1"},"refundTotals":null,"claimTotals":null}}"#,
        )
        .unwrap();
        let totals: DashboardTotals = body.into_data().unwrap().into();
        assert_eq!(totals.users, UserCounters::default());
        assert_eq!(totals.claims, ActionTotals::empty(Action::Claim));
        assert_eq!(totals.investments.total_amount, U256::from(1_500_000u64));
        assert_eq!(totals.investments.event_count, 2);
        assert_eq!(totals.totals(Action::Investment).unique_addresses, 1);
    }

    #[test]
    fn graphql_errors_are_unavailable_not_empty() {
        let body: GraphQlResponse<AllTotalsData> = serde_json::from_str(
            r#"{"data":null,"errors":[{"message":"indexer not synced"},{"message":"try later"}]}"#,
        )
        .unwrap();
        match body.into_data() {
            Err(IndexError::Unavailable(message)) => {
                assert_eq!(message, "indexer not synced; try later")
            }
            _ => panic!("expected unavailable error"),
        }
    }

    #[test]
    fn summaries_accept_null_timestamps() {
        let data: SummariesData = serde_json::from_str(
            r#"{"investorSummaries":[{"id":"0xAB","totalClaimed":"0","totalRefunded":"0","totalInvested":"10","claimCount":0,"refundCount":0,"investmentCount":1,"lastClaimed":null,"lastRefunded":"0","lastInvested":"12","firstActivity":"12","lastActivity":"12"}]}"#,
        )
        .unwrap();
        let summary: InvestorSummary = data.investor_summaries.into_iter().next().unwrap().into();
        assert_eq!(summary.id, "0xab");
        assert_eq!(summary.last_claimed, 0);
        assert_eq!(summary.last_invested, 12);
        assert_eq!(summary.investment_count, 1);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let client = SubgraphClient::new("http://127.0.0.1:9/graphql").unwrap();
        let err = client.dashboard_totals().await.unwrap_err();
        assert!(matches!(err, IndexError::Unavailable(_)));
    }

    #[test]
    fn empty_endpoint_is_rejected() {
        assert!(matches!(
            SubgraphClient::new("  "),
            Err(IndexError::Config(_))
        ));
    }
}
