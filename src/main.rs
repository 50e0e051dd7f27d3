use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use settle_eng::csv::{read_expenses, write_balances, write_plan};
use settle_eng::{Amount, InMemoryStore, ParseMode, SettlementConfig, Settler};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Compute balances and a transfer plan for a group's unsettled expenses.
#[derive(Debug, Parser)]
#[command(author, version, long_about = None)]
struct Args {
    /// Expenses csv, one row per split.
    input: PathBuf,
    /// Group to settle. Defaults to the group of the first expense read.
    #[arg(long, value_name = "GROUP_ID")]
    group: Option<String>,
    /// Skip invalid expenses and read missing amounts as zero instead of failing.
    #[arg(long, env = "SETTLE_LENIENT")]
    lenient: bool,
    /// Balances within this amount of zero count as settled.
    #[arg(long, value_name = "AMOUNT", default_value_t = 0.0)]
    dust: f64,
    /// Commit the settlement and print the stored snapshot as json.
    #[arg(long, requires_all = ["settled_by", "settled_by_name"])]
    execute: bool,
    /// Id of the member confirming the settlement.
    #[arg(long, value_name = "USER_ID")]
    settled_by: Option<String>,
    /// Display name of the member confirming the settlement.
    #[arg(long, value_name = "NAME")]
    settled_by_name: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = SettlementConfig {
        mode: if args.lenient {
            ParseMode::Lenient
        } else {
            ParseMode::Strict
        },
        dust: Amount::try_from_float(args.dust)?,
    };

    if args.input.extension().is_none_or(|ext| ext != "csv") {
        warn!(path = %args.input.display(), "input file seems to not be a csv file");
    }

    let rows = read_expenses(&args.input, config.mode)?;
    let store = Arc::new(InMemoryStore::new());
    let (tx_sender, tx_receiver) = tokio::sync::mpsc::channel(16);

    let mode = config.mode;
    let reader = tokio::spawn(async move {
        let mut first_group = None;
        for result in rows {
            match (result, mode) {
                (Ok(expense), _) => {
                    first_group.get_or_insert_with(|| expense.group_id.clone());
                    if tx_sender.send(expense).await.is_err() {
                        break;
                    }
                }
                // dropping the sender ends the import
                (Err(e), ParseMode::Strict) => return Err(e),
                (Err(e), ParseMode::Lenient) => warn!("{e}"),
            }
        }
        Ok(first_group)
    });

    store.import(ReceiverStream::new(tx_receiver)).await;
    let first_group = reader.await??;

    let Some(group_id) = args.group.or(first_group) else {
        return Err("no expenses read".into());
    };

    let settler = Settler::with_config(store, config);
    let stdout = io::stdout();

    if args.execute {
        let settled_by = args.settled_by.unwrap_or_default();
        let settled_by_name = args.settled_by_name.unwrap_or_default();
        let committed = settler
            .execute(&group_id, &settled_by, &settled_by_name)
            .await?;
        let mut out = stdout.lock();
        serde_json::to_writer_pretty(&mut out, &committed.snapshot)?;
        writeln!(out)?;
    } else {
        let preview = settler.preview(&group_id).await?;
        let mut out = stdout.lock();
        write_balances(&mut out, &preview.balances)?;
        writeln!(out)?;
        write_plan(&mut out, &preview.transfer_plan)?;
    }

    Ok(())
}
