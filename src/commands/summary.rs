use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Args;

use salegraph::{
    entity::{Action, InvestorSummary},
    format::{format_grouped, format_timestamp, format_units},
    query::QueryService,
};

use crate::logging;

#[derive(Args)]
pub struct SummaryArgs {
    /// Investor address (any case)
    pub address: String,

    /// Emit the raw summary as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

pub fn execute(config_path: Option<PathBuf>, args: SummaryArgs) -> Result<()> {
    logging::init_stderr("warn");
    let (config, _) = super::load_config(config_path)?;
    let queries = QueryService::new(
        super::open_store(&config)?,
        config.list_page_size,
        config.page_limit,
    );

    let summary = queries
        .investor_summary(&args.address)?
        .ok_or_else(|| anyhow!("no activity recorded for {}", args.address))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}", summary.id);
    for action in Action::ALL {
        let decimals = match action {
            Action::Claim => config.display.token_decimals,
            Action::Refund | Action::Investment => config.display.capital_decimals,
        };
        print_action(&summary, action, decimals);
    }
    println!("  first activity  {}", format_timestamp(summary.first_activity));
    println!("  last activity   {}", format_timestamp(summary.last_activity));
    Ok(())
}

fn print_action(summary: &InvestorSummary, action: Action, decimals: u8) {
    println!(
        "  {:<11} {:>20}  x{:<4} last {}",
        action.as_str(),
        format_grouped(&format_units(summary.total(action), decimals), 2),
        summary.count(action),
        format_timestamp(summary.last(action))
    );
}
