//! Attempt command for recording visits to blocked sites.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::Utc;
use fg_core::BlockList;

use super::open_database;
use super::util::normalize_url;
use crate::Config;

pub fn run<W: Write>(writer: &mut W, url: &str, config: &Config) -> Result<()> {
    let url = normalize_url(url)?;
    // A missing or unreadable hosts file only affects the flag, not the record.
    let during_session = BlockList::new(&config.hosts_path)
        .blocked_sites()
        .is_ok_and(|sites| sites.contains(&url));

    let db = open_database(config)?;
    db.insert_block_attempt(&url, during_session, Utc::now())
        .context("failed to record block attempt")?;
    tracing::debug!(url = %url, during_session, "block attempt recorded");

    if during_session {
        writeln!(writer, "Recorded blocked attempt: {url}")?;
    } else {
        writeln!(writer, "Recorded attempt: {url} (not currently blocked)")?;
    }
    Ok(())
}
