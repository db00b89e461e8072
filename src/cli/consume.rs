use anyhow::{Context, Result};
use clap::Args;
use quota_gate::QuotaError;
use serde::Serialize;
use tracing::info;

use super::context::CliContext;
use super::output::{render, StateView};

#[derive(Args, Clone, Debug)]
pub struct ConsumeArgs {
    /// Units taken per attempt
    #[arg(long, default_value_t = 1)]
    pub amount: u64,

    /// Number of attempts
    #[arg(long, default_value_t = 1)]
    pub times: u32,
}

#[derive(Debug, Serialize)]
struct Outcome {
    attempt: u32,
    accepted: bool,
    #[serde(flatten)]
    state: StateView,
}

pub async fn cmd_consume(args: ConsumeArgs, ctx: &CliContext) -> Result<()> {
    let opened = ctx.open_bucket().await?;
    let bucket = opened.shared();

    let mut outcomes = Vec::with_capacity(args.times as usize);
    for attempt in 1..=args.times {
        let (accepted, state) = match bucket.consume(args.amount).await {
            Ok(state) => (true, state),
            Err(QuotaError::QuotaExceeded(state)) => (false, state),
            Err(err) => {
                return Err(err).with_context(|| format!("Consume attempt {attempt} failed"))
            }
        };
        outcomes.push(Outcome {
            attempt,
            accepted,
            state: StateView::from(&state),
        });
    }

    let stats = opened.stats();
    info!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        overflows = stats.overflows,
        "consume finished"
    );

    println!(
        "{}",
        render(ctx.output(), &outcomes, |outcomes| {
            outcomes
                .iter()
                .map(|o| {
                    let verdict = if o.accepted { "accepted" } else { "rejected" };
                    format!("#{} {verdict} {}", o.attempt, o.state.human())
                })
                .collect::<Vec<_>>()
                .join("\n")
        })?
    );
    Ok(())
}
