use chrono::{DateTime, Utc};
use subprocess::{Exec, Redirection};

use crate::error::{Error, Result};
use crate::snapshot::Snapshot;

/// Abstracts the external copy-on-write storage manager. Everything above this trait is pure;
/// this is the only place that spawns child processes or touches the storage manager's
/// namespace.
///
/// Implementations must not cache snapshot listings across calls within a round -- the
/// orchestrator relies on every `list_snapshots` call reflecting the namespace as of that call.
pub trait StorageDriver {
    fn list_pools(&self) -> Result<Vec<String>>;
    fn list_filesystems(&self, root: Option<&str>) -> Result<Vec<String>>;
    fn list_snapshots(&self, path: &str) -> Result<Vec<Snapshot>>;
    fn get_snapshot(&self, path: &str, name: &str) -> Result<Option<Snapshot>>;
    fn create_snapshot(&self, path: &str, name: &str, recursive: bool, dry_run: bool) -> Result<Snapshot>;

    /// Destroy `snapshot`, refusing (logging and no-op'ing) unless `snapshot.path == path` and
    /// `snapshot.name` starts with `prefix`. This safety net exists independent of whether the
    /// caller (the policy engine) is trusted: even a buggy caller cannot make this destroy
    /// anything outside the reserved namespace.
    fn destroy_snapshot(
        &self,
        path: &str,
        snapshot: &Snapshot,
        recursive: bool,
        dry_run: bool,
        prefix: &str,
    ) -> Result<()>;
}

/// The real driver: shells out to the `zfs`/`zpool` command-line tools, in the manner of the
/// upstream tool's `_call_read`/`_call_do` helpers.
pub struct ZfsDriver;

impl ZfsDriver {
    pub fn new() -> Self {
        ZfsDriver
    }

    fn call_read(&self, binary: &str, action: &str, args: &[&str]) -> Result<Vec<Vec<String>>> {
        let capture = Exec::cmd(binary)
            .arg(action)
            .arg("-H")
            .args(args)
            .stdout(Redirection::Pipe)
            .capture()
            .map_err(|e| Error::Fatal(format!("could not invoke {binary}: {e}")))?;

        if !capture.success() {
            return Err(Error::Storage {
                path: args.join(" "),
                command: format!("{binary} {action}"),
                reason: "command exited non-zero".to_string(),
            });
        }

        Ok(capture
            .stdout_str()
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| line.split('\t').map(str::to_string).collect())
            .collect())
    }

    fn call_do(&self, binary: &str, action: &str, args: &[&str]) -> Result<()> {
        let status = Exec::cmd(binary)
            .arg(action)
            .args(args)
            .join()
            .map_err(|e| Error::Fatal(format!("could not invoke {binary}: {e}")))?;

        if status.success() {
            log::info!("{binary} {action} {}", args.join(" "));
            Ok(())
        } else {
            Err(Error::Storage {
                path: args.join(" "),
                command: format!("{binary} {action}"),
                reason: "command exited non-zero".to_string(),
            })
        }
    }

    fn parse_snapshot_line(path: &str, line: &[String]) -> Option<Snapshot> {
        let [full_name, created] = line else {
            return None;
        };
        let (snap_path, name) = full_name.split_once('@')?;
        if snap_path != path {
            return None;
        }
        let epoch: i64 = created.trim().parse().ok()?;
        let timestamp = DateTime::<Utc>::from_timestamp(epoch, 0)?;
        Some(Snapshot::new(snap_path, name, timestamp))
    }
}

impl Default for ZfsDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageDriver for ZfsDriver {
    fn list_pools(&self) -> Result<Vec<String>> {
        Ok(self
            .call_read("zpool", "list", &["-o", "name"])?
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect())
    }

    fn list_filesystems(&self, root: Option<&str>) -> Result<Vec<String>> {
        let mut args = vec!["-t", "filesystem", "-o", "name"];
        if let Some(root) = root {
            args.push(root);
        }
        Ok(self
            .call_read("zfs", "list", &args)?
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect())
    }

    fn list_snapshots(&self, path: &str) -> Result<Vec<Snapshot>> {
        // `-p` gives exact (parseable) numeric timestamps rather than a locale-formatted string.
        Ok(self
            .call_read("zfs", "list", &["-t", "snapshot", "-p", "-o", "name,creation", path])?
            .iter()
            .filter_map(|line| Self::parse_snapshot_line(path, line))
            .collect())
    }

    fn get_snapshot(&self, path: &str, name: &str) -> Result<Option<Snapshot>> {
        let qualified = format!("{path}@{name}");
        match self.call_read("zfs", "list", &["-t", "snapshot", "-p", "-o", "name,creation", &qualified]) {
            Ok(rows) => Ok(rows.iter().find_map(|line| Self::parse_snapshot_line(path, line))),
            Err(Error::Storage { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create_snapshot(&self, path: &str, name: &str, recursive: bool, dry_run: bool) -> Result<Snapshot> {
        let qualified = format!("{path}@{name}");
        let now = Utc::now();

        if dry_run {
            let flag = if recursive { " -r" } else { "" };
            println!("zfs snapshot{flag} {qualified}");
            return Ok(Snapshot::new(path, name, now));
        }

        let mut args = Vec::new();
        if recursive {
            args.push("-r");
        }
        args.push(qualified.as_str());
        self.call_do("zfs", "snapshot", &args)?;
        Ok(Snapshot::new(path, name, now))
    }

    fn destroy_snapshot(
        &self,
        path: &str,
        snapshot: &Snapshot,
        recursive: bool,
        dry_run: bool,
        prefix: &str,
    ) -> Result<()> {
        if snapshot.path != path || !snapshot.has_prefix(prefix) {
            log::warn!(
                "refusing to destroy {} (expected path {path}, prefix {prefix})",
                snapshot.qualified_name()
            );
            return Ok(());
        }

        let qualified = snapshot.qualified_name();

        if dry_run {
            let flag = if recursive { " -r" } else { "" };
            println!("zfs destroy{flag} {qualified}");
            return Ok(());
        }

        let mut args = Vec::new();
        if recursive {
            args.push("-r");
        }
        args.push(qualified.as_str());
        self.call_do("zfs", "destroy", &args)
    }
}
