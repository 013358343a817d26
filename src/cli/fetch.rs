//! Fetch command: route one request through the offline layer

use std::collections::BTreeMap;
use std::io::Write;

use clap::Args;
use colored::Colorize;
use serde::Serialize;

use frcpm_offline::error::Result;
use frcpm_offline::net::{Request, Response};
use frcpm_offline::router::{Strategy, classify};

use crate::cli::args::GlobalOptions;
use crate::cli::{CommandContext, HeaderArg, OutputFormat, parse_method, parse_strategy};
use crate::output;

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// URL or origin-relative path
    pub url: String,

    /// HTTP method
    #[arg(long, short = 'X', default_value = "GET")]
    pub method: String,

    /// Request header as 'Name: value'
    #[arg(long = "header", short = 'H')]
    pub headers: Vec<HeaderArg>,

    /// Request body
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Shorthand for an Accept header
    #[arg(long)]
    pub accept: Option<String>,

    /// Force a strategy instead of classifying the request
    #[arg(long, value_parser = parse_strategy)]
    pub strategy: Option<Strategy>,

    /// Print status and headers before the body
    #[arg(long, short = 'i')]
    pub include: bool,
}

#[derive(Serialize)]
struct FetchOutput {
    url: String,
    intercepted: bool,
    strategy: Option<Strategy>,
    status: u16,
    headers: BTreeMap<String, String>,
    body: String,
}

pub async fn run(opts: &GlobalOptions, args: FetchArgs) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let router = &ctx.offline.router;

    let method = parse_method(&args.method)?;
    let mut request = Request::new(method, router.resolve(&args.url)?);
    for header in &args.headers {
        request = request.with_header(&header.name, &header.value);
    }
    if let Some(accept) = &args.accept {
        request = request.with_header("accept", accept);
    }
    if let Some(data) = args.data {
        request = request.with_body(data);
    }

    let intercepted = router.intercepts(&request);
    let (strategy, response) = if intercepted {
        let strategy = args.strategy.unwrap_or_else(|| classify(&request));
        (Some(strategy), router.respond(&request, strategy).await)
    } else {
        log::debug!("{} is not intercepted, going to the network", request.url);
        (None, ctx.offline.network.fetch(&request).await?)
    };

    match ctx.format {
        OutputFormat::Json => output::print_json(&FetchOutput {
            url: request.url.to_string(),
            intercepted,
            strategy,
            status: response.status,
            headers: response.headers.clone(),
            body: response.body_text(),
        })?,
        _ => print_response(&response, strategy, args.include)?,
    }
    Ok(())
}

fn print_response(response: &Response, strategy: Option<Strategy>, include: bool) -> Result<()> {
    if include {
        let status = format!("HTTP {}", response.status);
        let status = if response.is_success() {
            status.green()
        } else {
            status.red()
        };
        match strategy {
            Some(s) => eprintln!("{} {}", status, format!("({})", s).dimmed()),
            None => eprintln!("{} {}", status, "(passthrough)".dimmed()),
        }
        for (name, value) in &response.headers {
            eprintln!("{}: {}", name.cyan(), value);
        }
        eprintln!();
    }

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&response.body)?;
    if !response.body.ends_with(b"\n") {
        writeln!(stdout)?;
    }
    Ok(())
}
