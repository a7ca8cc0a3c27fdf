use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use salegraph::{
    client::{DashboardTotals, SubgraphClient},
    config::DisplayConfig,
    entity::Action,
    format::{format_address, format_grouped, format_timestamp, format_units},
    query::{PageRequest, SortDirection, SummarySortField},
};

use crate::logging;

#[derive(Args)]
pub struct ReportArgs {
    /// GraphQL endpoint; defaults to the configured `endpoint`
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Investor summary field to rank by (e.g. totalInvested, totalClaimed, lastActivity)
    #[arg(long, default_value = "totalInvested")]
    pub order_by: SummarySortField,

    /// Sort direction (asc or desc)
    #[arg(long, default_value = "desc")]
    pub order_direction: SortDirection,

    /// Number of investors to list
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

pub async fn execute(config_path: Option<PathBuf>, args: ReportArgs) -> Result<()> {
    logging::init_stderr("warn");
    let (config, _) = super::load_config(config_path)?;
    let endpoint = args.endpoint.unwrap_or_else(|| config.endpoint.clone());
    let client = SubgraphClient::new(endpoint)?;

    let totals = client
        .dashboard_totals()
        .await
        .with_context(|| format!("failed to fetch totals from {}", client.endpoint()))?;
    let page = PageRequest {
        first: Some(args.limit),
        skip: 0,
        order_by: args.order_by,
        direction: args.order_direction,
    };
    let investors = client
        .investor_summaries(&page)
        .await
        .with_context(|| format!("failed to fetch investors from {}", client.endpoint()))?;

    print_totals(&totals, &config.display);
    println!();
    println!(
        "Top {} investors by {} ({})",
        investors.len(),
        args.order_by.as_str(),
        args.order_direction.as_str()
    );
    println!(
        "{:<14} {:>18} {:>18} {:>22} {:>18}",
        "address", "invested", "refunded", "claimed", "last activity"
    );
    for summary in &investors {
        println!(
            "{:<14} {:>18} {:>18} {:>22} {:>18}",
            format_address(&summary.id),
            amount(summary.total_invested, config.display.capital_decimals),
            amount(summary.total_refunded, config.display.capital_decimals),
            amount(summary.total_claimed, config.display.token_decimals),
            format_timestamp(summary.last_activity)
        );
    }
    Ok(())
}

fn print_totals(totals: &DashboardTotals, display: &DisplayConfig) {
    for action in [Action::Investment, Action::Refund, Action::Claim] {
        let entry = totals.totals(action);
        let decimals = match action {
            Action::Claim => display.token_decimals,
            Action::Refund | Action::Investment => display.capital_decimals,
        };
        println!(
            "{:<11} total {:>22}  events {:>6}  unique addresses {:>6}  users {:>6}",
            action.as_str(),
            amount(entry.total_amount, decimals),
            entry.event_count,
            entry.unique_addresses,
            totals.users.users(action)
        );
    }
}

fn amount(value: alloy_primitives::U256, decimals: u8) -> String {
    format_grouped(&format_units(value, decimals), 2)
}
