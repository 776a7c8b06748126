use chrono::Utc;

use crate::config::Config;
use crate::driver::StorageDriver;
use crate::error::Result;
use crate::policy::filter_snapshots;

/// Names authored by this tool always begin with this prefix. Snapshots lacking it are invisible
/// to the retention engine -- never counted, never destroyed.
pub const RESERVED_PREFIX: &str = "shadow_copy";

/// Runs one full snapshot-and-garbage-collect round.
///
/// All creations complete before any destruction begins: a failed creation must never cause a
/// destruction that relied on the presence of a fresher retention target.
pub fn run_snapshot_round(driver: &dyn StorageDriver, config: &Config, dry_run: bool) -> Result<()> {
    let pools = driver.list_pools()?;

    for pool in &pools {
        let section = config.resolve(pool);
        if section.ignore {
            log::info!("skipping ignored pool \"{pool}\"");
            continue;
        }

        let name = Utc::now().format(&format!("{RESERVED_PREFIX}-%Y.%m.%d-%H.%M.%S")).to_string();
        log::info!("processing pool \"{pool}\"");
        match driver.create_snapshot(pool, &name, section.recursive, dry_run) {
            Ok(snapshot) => log::info!("created snapshot {}", snapshot.qualified_name()),
            Err(e) => log::error!("failed to create snapshot for pool \"{pool}\": {e}"),
        }
    }

    let filesystems = driver.list_filesystems(None)?;
    for filesystem in &filesystems {
        let section = config.resolve(filesystem);
        if section.ignore {
            log::info!("skipping ignored filesystem \"{filesystem}\"");
            continue;
        }

        let snapshots: Vec<_> = driver
            .list_snapshots(filesystem)?
            .into_iter()
            .filter(|s| s.has_prefix(RESERVED_PREFIX))
            .collect();

        let decision = filter_snapshots(&snapshots, Utc::now(), &section.policy);

        for snapshot in &decision.delete {
            if let Err(e) = driver.destroy_snapshot(filesystem, snapshot, false, dry_run, RESERVED_PREFIX) {
                log::error!("failed to destroy {}: {e}", snapshot.qualified_name());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::snapshot::Snapshot;
    use chrono::DateTime;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// An in-memory fake for orchestrator-level tests: no subprocess is ever spawned.
    struct FakeDriver {
        pools: Vec<String>,
        filesystems: Vec<String>,
        snapshots: RefCell<HashMap<String, Vec<Snapshot>>>,
        created: RefCell<Vec<(String, String)>>,
        destroyed: RefCell<Vec<(String, String)>>,
    }

    impl StorageDriver for FakeDriver {
        fn list_pools(&self) -> Result<Vec<String>> {
            Ok(self.pools.clone())
        }

        fn list_filesystems(&self, _root: Option<&str>) -> Result<Vec<String>> {
            Ok(self.filesystems.clone())
        }

        fn list_snapshots(&self, path: &str) -> Result<Vec<Snapshot>> {
            Ok(self.snapshots.borrow().get(path).cloned().unwrap_or_default())
        }

        fn get_snapshot(&self, path: &str, name: &str) -> Result<Option<Snapshot>> {
            Ok(self
                .snapshots
                .borrow()
                .get(path)
                .and_then(|v| v.iter().find(|s| s.name == name).cloned()))
        }

        fn create_snapshot(&self, path: &str, name: &str, _recursive: bool, _dry_run: bool) -> Result<Snapshot> {
            self.created.borrow_mut().push((path.to_string(), name.to_string()));
            let snapshot = Snapshot::new(path, name, Utc::now());
            self.snapshots
                .borrow_mut()
                .entry(path.to_string())
                .or_default()
                .push(snapshot.clone());
            Ok(snapshot)
        }

        fn destroy_snapshot(
            &self,
            path: &str,
            snapshot: &Snapshot,
            _recursive: bool,
            _dry_run: bool,
            prefix: &str,
        ) -> Result<()> {
            if snapshot.path != path || !snapshot.has_prefix(prefix) {
                return Err(Error::State(format!(
                    "refusing to destroy {}",
                    snapshot.qualified_name()
                )));
            }
            self.destroyed
                .borrow_mut()
                .push((snapshot.path.clone(), snapshot.name.clone()));
            Ok(())
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn ignored_filesystem_has_zero_create_or_destroy_calls() {
        let driver = FakeDriver {
            pools: vec!["tank".to_string()],
            filesystems: vec!["tank/vm".to_string()],
            snapshots: RefCell::new(HashMap::from([(
                "tank/vm".to_string(),
                vec![Snapshot::new("tank/vm", "shadow_copy-old", ts(0))],
            )])),
            created: RefCell::new(Vec::new()),
            destroyed: RefCell::new(Vec::new()),
        };

        let config =
            crate::config::parse("[tank]\nignore = true\n[\"tank/vm\"]\nignore = true\n").unwrap();

        run_snapshot_round(&driver, &config, false).unwrap();

        assert!(driver.created.borrow().is_empty());
        assert!(driver.destroyed.borrow().is_empty());
    }

    #[test]
    fn non_ignored_pool_gets_one_creation() {
        let driver = FakeDriver {
            pools: vec!["tank".to_string()],
            filesystems: vec![],
            snapshots: RefCell::new(HashMap::new()),
            created: RefCell::new(Vec::new()),
            destroyed: RefCell::new(Vec::new()),
        };
        let config = crate::config::parse("").unwrap();
        run_snapshot_round(&driver, &config, false).unwrap();
        assert_eq!(driver.created.borrow().len(), 1);
    }

    #[test]
    fn destruction_only_touches_snapshots_with_reserved_prefix() {
        let driver = FakeDriver {
            pools: vec![],
            filesystems: vec!["tank".to_string()],
            snapshots: RefCell::new(HashMap::from([(
                "tank".to_string(),
                vec![
                    Snapshot::new("tank", "shadow_copy-2000.01.01-00.00.00", ts(0)),
                    Snapshot::new("tank", "manual-keep-forever", ts(0)),
                ],
            )])),
            created: RefCell::new(Vec::new()),
            destroyed: RefCell::new(Vec::new()),
        };
        let config = crate::config::parse("[tank]\nyearly = \"unlimited\"\n").unwrap();
        run_snapshot_round(&driver, &config, false).unwrap();
        // Both snapshots land in the Yearly bucket for year 1970, but only one of them was ever
        // a candidate (has the reserved prefix); the un-prefixed one is never even considered.
        assert!(driver
            .destroyed
            .borrow()
            .iter()
            .all(|(_, name)| name.starts_with(RESERVED_PREFIX)));
    }
}
