//! Unblock command for removing a leftover block region.
//!
//! A session interrupted before cleanup (killed process, power loss) leaves
//! its region in the hosts file. This restores the file without starting a
//! session.

use std::io::Write;

use anyhow::{Context, Result};
use fg_core::BlockList;

use crate::Config;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let block_list = BlockList::new(&config.hosts_path);
    if !block_list.is_blocking().context("failed to read block list")? {
        writeln!(writer, "Nothing to unblock.")?;
        return Ok(());
    }

    block_list.clear().context("failed to clear block list")?;
    writeln!(
        writer,
        "Removed block list from {}",
        config.hosts_path.display()
    )?;
    Ok(())
}
