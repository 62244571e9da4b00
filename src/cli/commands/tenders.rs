//! Commands that read stored tenders.

use anyhow::Context;
use console::style;

use crate::config::Settings;
use crate::models::{TenderOrdering, TenderQuery};
use crate::repository::DieselDbContext;

/// Output format for listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

async fn open_db(settings: &Settings) -> anyhow::Result<Option<DieselDbContext>> {
    if !settings.database_exists() {
        println!(
            "{} No database at {}. Run 'tenderscout init' first.",
            style("!").yellow(),
            settings.database_path().display()
        );
        return Ok(None);
    }
    Ok(Some(settings.create_db_context()))
}

/// List stored tenders.
pub async fn cmd_ls(
    settings: &Settings,
    search: Option<String>,
    order: &str,
    limit: i64,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let ordering = TenderOrdering::parse(order).with_context(|| {
        format!(
            "Unknown ordering '{}' (use publication_date, submission_deadline or created_at, optionally prefixed with -)",
            order
        )
    })?;
    let Some(ctx) = open_db(settings).await? else {
        return Ok(());
    };

    let query = TenderQuery {
        search,
        ordering,
        limit,
    };
    let tenders = ctx.tenders().list(&query).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&tenders)?);
        return Ok(());
    }

    if tenders.is_empty() {
        println!("{} No tenders found", style("!").yellow());
        return Ok(());
    }

    println!("\n{}", style("Tenders").bold());
    println!("{}", "-".repeat(100));
    println!(
        "{:<28} {:<10} {:<10} {:<24} Order",
        "ID", "Published", "Deadline", "Authority"
    );
    println!("{}", "-".repeat(100));

    for tender in &tenders {
        let f = &tender.fields;
        let deadline = f
            .submission_deadline
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<28} {:<10} {:<10} {:<24} {}",
            truncate(&f.tender_id, 28),
            f.publication_date,
            deadline,
            truncate(&f.contracting_authority, 23),
            truncate(&f.order_name, 40)
        );
    }
    println!("\n{} tenders shown", tenders.len());

    Ok(())
}

/// Print one stored tender as JSON.
pub async fn cmd_show(settings: &Settings, tender_id: &str) -> anyhow::Result<()> {
    let Some(ctx) = open_db(settings).await? else {
        return Ok(());
    };

    match ctx.tenders().get_by_tender_id(tender_id).await? {
        Some(tender) => println!("{}", serde_json::to_string_pretty(&tender)?),
        None => println!("{} Tender '{}' not found", style("✗").red(), tender_id),
    }
    Ok(())
}

/// Show stored tender count and database location.
pub async fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    println!("\n{}", style("tenderscout status").bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "Database:", settings.database_path().display());
    println!("{:<20} {}", "API:", settings.api_base_url);
    println!("{:<20} {}", "Engine:", settings.engine);

    let Some(ctx) = open_db(settings).await? else {
        return Ok(());
    };
    let repo = ctx.tenders();
    let count = repo.count().await?;
    let latest = repo
        .latest_publication_date()
        .await?
        .map(|d| d.to_string())
        .unwrap_or_else(|| "never".to_string());

    println!("{:<20} {}", "Tenders:", count);
    println!("{:<20} {}", "Latest published:", latest);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Gmina Wrocław zakup", 10), "Gmina W...");
    }
}
