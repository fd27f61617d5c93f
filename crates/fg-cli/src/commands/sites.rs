//! Sites command for managing the block list stored in the database.
//!
//! Only active sites are written to the hosts file when a session starts.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use fg_db::{DbError, SiteEntry};

use super::open_database;
use super::util::normalize_url;
use crate::{Config, SitesAction};

/// Format sites for human-readable output.
pub fn format_sites(entries: &[SiteEntry]) -> String {
    let mut output = String::new();

    if entries.is_empty() {
        writeln!(output, "No sites on the block list.").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "Hint: Run 'fg sites add <url>' to block a site.").unwrap();
        return output;
    }

    writeln!(
        output,
        "{:>4}  {:<28}  {:<10}  {:<6}  Added",
        "ID", "URL", "Category", "Active"
    )
    .unwrap();
    writeln!(
        output,
        "────  ────────────────────────────  ──────────  ──────  ──────────"
    )
    .unwrap();

    for entry in entries {
        writeln!(
            output,
            "{:>4}  {:<28}  {:<10}  {:<6}  {}",
            entry.id,
            entry.url,
            entry.category,
            if entry.active { "yes" } else { "no" },
            entry.added_at.format("%Y-%m-%d").to_string()
        )
        .unwrap();
    }

    output
}

pub fn run<W: Write>(writer: &mut W, action: &SitesAction, config: &Config) -> Result<()> {
    let db = open_database(config)?;

    match action {
        SitesAction::List { json } => {
            let entries = db.list_sites().context("failed to list sites")?;
            if *json {
                writeln!(writer, "{}", serde_json::to_string_pretty(&entries)?)?;
            } else {
                write!(writer, "{}", format_sites(&entries))?;
            }
        }
        SitesAction::Add { url, category } => {
            let url = normalize_url(url)?;
            let entry = match db.add_site(&url, category.trim()) {
                Ok(entry) => entry,
                Err(DbError::DuplicateSite(url)) => {
                    anyhow::bail!("{url} is already on the block list")
                }
                Err(err) => return Err(err).context("failed to add site"),
            };
            writeln!(
                writer,
                "Added {} ({}) with ID {}",
                entry.url, entry.category, entry.id
            )?;
        }
        SitesAction::Remove { id } => {
            db.remove_site(*id)
                .with_context(|| format!("failed to remove site {id}"))?;
            writeln!(writer, "Removed site {id}")?;
        }
        SitesAction::Enable { id } => {
            db.set_site_active(*id, true)
                .with_context(|| format!("failed to enable site {id}"))?;
            writeln!(writer, "Enabled site {id}")?;
        }
        SitesAction::Disable { id } => {
            db.set_site_active(*id, false)
                .with_context(|| format!("failed to disable site {id}"))?;
            writeln!(writer, "Disabled site {id}")?;
        }
    }

    Ok(())
}
