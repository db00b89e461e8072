use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use quota_gate::headers;
use quota_gate::prelude::*;
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::context::CliContext;
use super::output::render;

#[derive(Args, Clone, Debug)]
pub struct FetchArgs {
    /// Target URL
    pub url: Url,

    /// Number of requests to send
    #[arg(long, default_value_t = 1)]
    pub count: u32,
}

#[derive(Debug, Serialize)]
struct FetchLine {
    request: u32,
    status: u16,
    capacity: Option<u64>,
    remaining: Option<u64>,
    reset_secs: Option<u64>,
    bytes: usize,
    elapsed_ms: u128,
}

fn show(value: Option<u64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub async fn cmd_fetch(args: FetchArgs, ctx: &CliContext) -> Result<()> {
    let opened = ctx.open_bucket().await?;
    let executor = ReqwestExecutor::new().context("Failed to build HTTP client")?;
    let transport = AdmissionTransport::new(opened.shared(), Arc::new(executor));
    let settings = &ctx.config().fetch;
    let user_agent = http::HeaderValue::from_str(&settings.user_agent)
        .context("Invalid user agent in configuration")?;

    let mut lines = Vec::with_capacity(args.count as usize);
    for n in 1..=args.count {
        let mut request = OutboundRequest::get(args.url.clone()).with_timeout(settings.timeout);
        request
            .headers
            .insert(http::header::USER_AGENT, user_agent.clone());

        let response = transport
            .execute(request)
            .await
            .with_context(|| format!("Request {n} to {} failed", args.url))?;
        debug!(status = %response.status, "fetch response");

        lines.push(FetchLine {
            request: n,
            status: response.status.as_u16(),
            capacity: headers::read(&response.headers, RATE_LIMIT_CAPACITY),
            remaining: headers::read(&response.headers, RATE_LIMIT_REMAINING),
            reset_secs: headers::read(&response.headers, RATE_LIMIT_RESET),
            bytes: response.body.len(),
            elapsed_ms: response.elapsed.as_millis(),
        });
    }

    println!(
        "{}",
        render(ctx.output(), &lines, |lines| {
            lines
                .iter()
                .map(|l| {
                    format!(
                        "#{} {} capacity={} remaining={} reset={}s {}B {}ms",
                        l.request,
                        l.status,
                        show(l.capacity),
                        show(l.remaining),
                        show(l.reset_secs),
                        l.bytes,
                        l.elapsed_ms
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        })?
    );
    Ok(())
}
