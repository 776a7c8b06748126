use chrono::{DateTime, Utc};

use crate::driver::StorageDriver;
use crate::error::Result;

/// The replication command an external `zfs send | zfs recv` pipeline should run. The selector
/// only decides *what* to replicate; it never executes the pipeline itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationPlan {
    Full {
        source: String,
        target_path: String,
    },
    Incremental {
        base: String,
        source: String,
        target_path: String,
    },
}

impl ReplicationPlan {
    /// Render the shell pipeline an external replicator is expected to run.
    pub fn command_line(&self) -> String {
        match self {
            ReplicationPlan::Full { source, target_path } => {
                format!("zfs send {source} | zfs recv -Fuv {target_path}")
            }
            ReplicationPlan::Incremental {
                base,
                source,
                target_path,
            } => {
                format!("zfs send -i {base} {source} | zfs recv -Fuv {target_path}")
            }
        }
    }
}

fn target_path_for(filesystem: &str, target_pool: &str) -> String {
    format!("{target_pool}/{}", filesystem.replace('/', "_"))
}

/// Reuse or create today's backup snapshot on `filesystem`, then decide full vs. incremental
/// replication to `target_pool` based on what is already present there.
pub fn select_replication(
    driver: &dyn StorageDriver,
    filesystem: &str,
    target_pool: &str,
    backup_prefix: &str,
    now: DateTime<Utc>,
    dry_run: bool,
) -> Result<ReplicationPlan> {
    let candidate_name = format!("{backup_prefix}{}", now.format("%Y-%m-%d"));

    let snapshot = match driver.get_snapshot(filesystem, &candidate_name)? {
        Some(existing) => existing,
        None => driver.create_snapshot(filesystem, &candidate_name, false, dry_run)?,
    };

    let target_path = target_path_for(filesystem, target_pool);
    let target_snapshots = driver
        .list_snapshots(&target_path)?
        .into_iter()
        .filter(|s| s.has_prefix(backup_prefix))
        .collect::<Vec<_>>();

    let source = snapshot.qualified_name();

    Ok(match target_snapshots.iter().max_by_key(|s| s.timestamp) {
        Some(base) => ReplicationPlan::Incremental {
            base: base.qualified_name(),
            source,
            target_path,
        },
        None => ReplicationPlan::Full { source, target_path },
    })
}
