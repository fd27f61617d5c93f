//! Status command for showing what the hosts file currently blocks.

use std::io::Write;

use anyhow::{Context, Result};
use fg_core::BlockList;

use crate::Config;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let region = BlockList::new(&config.hosts_path)
        .region_sites()
        .context("failed to read block list")?;

    writeln!(writer, "FocusGuard status")?;
    writeln!(writer, "Hosts file: {}", config.hosts_path.display())?;

    let Some(sites) = region else {
        writeln!(writer, "Not blocking any sites.")?;
        return Ok(());
    };

    writeln!(writer, "Blocking {} site(s):", sites.len())?;
    for site in sites {
        writeln!(writer, "- {site}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    fn config_for(hosts_path: std::path::PathBuf) -> Config {
        Config {
            hosts_path,
            ..Config::default()
        }
    }

    #[test]
    fn status_reports_blocked_sites() {
        let temp = tempfile::tempdir().unwrap();
        let hosts_path = temp.path().join("hosts");
        std::fs::write(&hosts_path, "127.0.0.1 localhost\n").unwrap();
        BlockList::new(&hosts_path)
            .apply(&["reddit.com", "x.com"])
            .unwrap();

        let mut output = Vec::new();
        run(&mut output, &config_for(hosts_path.clone())).unwrap();

        let output = String::from_utf8(output).unwrap();
        let output = output.replace(&hosts_path.display().to_string(), "[TEMP]/hosts");
        assert_snapshot!(output, @r"
        FocusGuard status
        Hosts file: [TEMP]/hosts
        Blocking 2 site(s):
        - reddit.com
        - x.com
        ");
    }

    #[test]
    fn status_reports_idle_hosts_file() {
        let temp = tempfile::tempdir().unwrap();
        let hosts_path = temp.path().join("hosts");
        std::fs::write(&hosts_path, "127.0.0.1 localhost\n").unwrap();

        let mut output = Vec::new();
        run(&mut output, &config_for(hosts_path)).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.ends_with("Not blocking any sites.\n"));
    }

    #[test]
    fn status_reports_region_without_entries() {
        let temp = tempfile::tempdir().unwrap();
        let hosts_path = temp.path().join("hosts");
        std::fs::write(
            &hosts_path,
            "127.0.0.1 localhost\n# FocusGuard START\n# FocusGuard END\n",
        )
        .unwrap();

        let mut output = Vec::new();
        run(&mut output, &config_for(hosts_path)).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.ends_with("Blocking 0 site(s):\n"), "{output}");
    }

    #[test]
    fn status_fails_on_missing_hosts_file() {
        let temp = tempfile::tempdir().unwrap();
        let mut output = Vec::new();
        let err = run(&mut output, &config_for(temp.path().join("missing"))).unwrap_err();
        assert!(err.to_string().contains("failed to read block list"));
    }
}
