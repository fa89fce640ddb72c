mod cli;
mod crawl;

use anyhow::Result;
use clap::{CommandFactory, Parser};

use sitemapper_core::{Cookie, CrawlConfig, DEFAULT_USER_AGENT};

use crate::cli::Cli;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<()> {
    // Frozen-executable support: a "browsers" directory next to the
    // binary must be announced BEFORE the browser library is touched.
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let browsers = dir.join("browsers");
            if browsers.is_dir() {
                std::env::set_var("CHROME_PATH", &browsers);
            }
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut cookies = Vec::new();
    for cookie_str in &cli.cookie {
        let Some((name, value)) = cookie_str.split_once('=') else {
            eprintln!("Ungueltig: --cookie {cookie_str} (Format: NAME=VALUE)");
            std::process::exit(1);
        };
        cookies.push(Cookie {
            name: name.trim().to_string(),
            value: value.trim().to_string(),
        });
    }

    let Some(url) = cli.url.clone() else {
        // Without a URL there is nothing to crawl; the interactive UI is
        // a separate frontend.
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = CrawlConfig {
        start_url: url,
        max_depth: cli.max_depth,
        concurrency: cli.concurrency,
        timeout_secs: cli.timeout,
        render: cli.render,
        headless: !cli.no_headless,
        respect_robots: !cli.ignore_robots,
        cookies,
        user_agent: if cli.user_agent.is_empty() {
            DEFAULT_USER_AGENT.to_string()
        } else {
            cli.user_agent.clone()
        },
        max_retries: 2,
    };

    crawl::run(config, &cli.output).await
}
