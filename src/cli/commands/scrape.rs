//! Scrape command: one run, or the scheduler loop in daemon mode.

use std::sync::Arc;

use anyhow::Context;
use console::style;

use crate::config::Settings;
use crate::scrapers::{build_fetcher, FetchEngine};
use crate::services::{RunSummary, Scheduler, TenderPipeline};

/// Command-line overrides for a scrape.
#[derive(Debug, Default)]
pub struct ScrapeArgs {
    pub days_back: Option<u32>,
    pub max_pages: Option<u32>,
    pub page_size: Option<u32>,
    pub cpv_code: Option<String>,
    pub engine: Option<FetchEngine>,
    pub daemon: bool,
    pub interval: Option<u64>,
}

impl ScrapeArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(n) = self.days_back {
            settings.days_back = n;
        }
        if let Some(n) = self.max_pages {
            settings.max_pages = n;
        }
        if let Some(n) = self.page_size {
            settings.page_size = n;
        }
        if let Some(ref cpv) = self.cpv_code {
            settings.cpv_code = Some(cpv.clone());
        }
        if let Some(engine) = self.engine {
            settings.engine = engine;
        }
        if let Some(secs) = self.interval {
            settings.schedule_interval = secs;
        }
    }
}

/// Fetch recent tenders and store them.
pub async fn cmd_scrape(settings: &Settings, args: ScrapeArgs) -> anyhow::Result<()> {
    let mut settings = settings.clone();
    args.apply(&mut settings);

    settings.ensure_directories()?;
    let ctx = settings.create_db_context();
    ctx.init_schema()
        .await
        .context("Failed to initialize database schema")?;

    let pipeline = TenderPipeline::new(
        build_fetcher(&settings),
        Arc::new(ctx.tenders()),
        settings.gate(),
        settings.normalizer(),
        settings.pipeline_config(),
    )
    .with_context(|| format!("Invalid API base URL: {}", settings.api_base_url))?;

    let scheduler = Arc::new(Scheduler::new(
        Arc::new(pipeline),
        settings.schedule_config(),
    ));

    println!(
        "{} Fetching tenders from the last {} days via {} engine",
        style("→").cyan(),
        settings.days_back,
        settings.engine
    );

    if !args.daemon {
        let summary = scheduler.run_once().await;
        print_summary(&summary);
        return Ok(());
    }

    let handle = scheduler.handle();
    let worker = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run().await }
    });

    println!(
        "{} Running every {}s, press Ctrl-C to stop",
        style("→").dim(),
        settings.schedule_interval
    );

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut hangup = signal(SignalKind::hangup()).context("Failed to listen for SIGHUP")?;
        let trigger = handle.clone();
        tokio::spawn(async move {
            while hangup.recv().await.is_some() {
                println!("{} SIGHUP received, starting a run", style("↻").cyan());
                trigger.trigger();
            }
        });
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut last_seen = 0;
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl-C")?;
                println!("\n{} Stopping...", style("!").yellow());
                handle.shutdown();
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {
                let runs = scheduler.runs_completed();
                if runs != last_seen {
                    last_seen = runs;
                    if let Some(summary) = scheduler.last_summary() {
                        print_summary(&summary);
                    }
                }
            }
        }
    }

    worker.await.context("Scheduler task failed")?;
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let reason = summary
        .stop_reason
        .map(|r| r.as_str())
        .unwrap_or("unknown");
    println!(
        "{} Run finished ({}): {} fetched, {} stored ({} new), {} skipped, {} failed, {} pages",
        style("✓").green(),
        reason,
        summary.fetched,
        summary.processed,
        summary.created,
        summary.skipped,
        summary.failed,
        summary.pages
    );
    if summary.failed > 0 {
        println!(
            "  {} {} records were rejected, rerun with -v for details",
            style("!").yellow(),
            summary.failed
        );
    }
}
