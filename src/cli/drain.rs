use anyhow::Result;

use super::context::CliContext;
use super::output::{render, StateView};

pub async fn cmd_drain(ctx: &CliContext) -> Result<()> {
    let bucket = ctx.open_bucket().await?;
    let state = bucket.drain().await;
    let view = StateView::from(&state);
    println!("{}", render(ctx.output(), &view, StateView::human)?);
    Ok(())
}
