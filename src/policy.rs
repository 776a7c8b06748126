use chrono::{DateTime, Duration, Utc};

use crate::filter::Filter;
use crate::snapshot::Snapshot;

/// A duration bound on how far back a filter reaches, or the sentinel meaning "forever".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cutoff {
    Days(u32),
    Unbounded,
}

impl Cutoff {
    /// Whether `age` (elapsed time since a snapshot's creation) falls within this cutoff.
    fn contains(self, age: Duration) -> bool {
        match self {
            Cutoff::Unbounded => true,
            Cutoff::Days(days) => age <= Duration::days(i64::from(days)),
        }
    }
}

/// An ordered, canonicalized sequence of `(filter, cutoff)` pairs for a filesystem.
///
/// Construction always canonicalizes: entries are sorted by [`Filter::granularity`] ascending so
/// that finer-grained filters consume fresher snapshots first. At most one entry per filter
/// variant is expected from the configuration loader; the engine itself does not enforce that,
/// it simply processes entries in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    entries: Vec<(Filter, Cutoff)>,
}

impl Policy {
    pub fn new(mut entries: Vec<(Filter, Cutoff)>) -> Self {
        entries.sort_by_key(|(filter, _)| filter.granularity());
        Policy { entries }
    }

    pub fn entries(&self) -> &[(Filter, Cutoff)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The built-in default policy, used whenever a configuration omits `[_default]`.
pub fn default_policy() -> Policy {
    Policy::new(vec![
        (Filter::Passthrough, Cutoff::Days(2)),
        (Filter::Hourly, Cutoff::Days(7)),
        (Filter::Daily, Cutoff::Days(30)),
        (Filter::Weekly, Cutoff::Days(90)),
        (Filter::Monthly, Cutoff::Days(365)),
        (Filter::Yearly, Cutoff::Unbounded),
    ])
}

/// The result of running the policy engine over a snapshot list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Unordered set of snapshots to retain.
    pub keep: Vec<Snapshot>,
    /// Snapshots to destroy, sorted strictly by timestamp descending (newest first).
    pub delete: Vec<Snapshot>,
}

/// The policy engine: partitions `snapshots` into a keep set and a delete set given `now` and an
/// already-canonicalized `policy`.
///
/// Walks the policy in granularity order, carving off the snapshots that fall within each
/// filter's cutoff band and keeping that filter's representatives; anything older than every
/// cutoff is kept unconditionally, never deleted.
pub fn filter_snapshots(snapshots: &[Snapshot], now: DateTime<Utc>, policy: &Policy) -> Decision {
    use std::collections::HashSet;

    if snapshots.is_empty() {
        return Decision {
            keep: Vec::new(),
            delete: Vec::new(),
        };
    }

    let mut keep: HashSet<Snapshot> = HashSet::new();
    let mut remaining: Vec<Snapshot> = snapshots.to_vec();

    for (filter, cutoff) in policy.entries() {
        if remaining.is_empty() {
            break;
        }
        let (current, rest): (Vec<Snapshot>, Vec<Snapshot>) = remaining
            .into_iter()
            .partition(|s| cutoff.contains(now.signed_duration_since(s.timestamp)));
        remaining = rest;
        keep.extend(filter.apply(&current));
    }

    // Anything left has aged past every cutoff in the policy: it is kept, not deleted.
    keep.extend(remaining);

    let mut delete: Vec<Snapshot> = snapshots
        .iter()
        .filter(|s| !keep.contains(s))
        .cloned()
        .collect();
    delete.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    Decision {
        keep: keep.into_iter().collect(),
        delete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dt(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
    }

    fn snap(path: &str, name: &str, ts: DateTime<Utc>) -> Snapshot {
        Snapshot::new(path, name, ts)
    }

    #[test]
    fn empty_snapshots_yields_empty_decision() {
        let d = filter_snapshots(&[], dt(2001, 1, 1, 0, 0), &default_policy());
        assert!(d.keep.is_empty());
        assert!(d.delete.is_empty());
    }

    #[test]
    fn empty_policy_keeps_everything() {
        let snapshots = vec![
            snap("tank", "a", dt(2000, 1, 1, 0, 0)),
            snap("tank", "b", dt(2000, 6, 1, 0, 0)),
        ];
        let d = filter_snapshots(&snapshots, dt(2001, 1, 1, 0, 0), &Policy::new(vec![]));
        assert_eq!(d.keep.len(), 2);
        assert!(d.delete.is_empty());
    }

    #[test]
    fn yearly_collapse_keeps_only_the_newest_snapshot_of_the_year() {
        let snapshots: Vec<_> = (1..=12)
            .map(|m| snap("tank/shadow_copy", &format!("s{m}"), dt(2000, m, 1, 12, 0)))
            .collect();
        let policy = Policy::new(vec![(Filter::Yearly, Cutoff::Unbounded)]);
        let d = filter_snapshots(&snapshots, dt(2001, 1, 1, 0, 0), &policy);
        assert_eq!(d.keep.len(), 1);
        assert_eq!(d.keep[0].timestamp, dt(2000, 12, 1, 12, 0));
    }

    #[test]
    fn snapshots_older_than_every_cutoff_are_retained_not_deleted() {
        let snapshots = vec![
            snap("tank", "a", dt(1998, 1, 1, 12, 0)),
            snap("tank", "b", dt(1999, 1, 1, 12, 0)),
            snap("tank", "c", dt(2000, 1, 1, 12, 0)),
            snap("tank", "d", dt(2000, 12, 1, 12, 0)),
        ];
        let policy = Policy::new(vec![(Filter::Yearly, Cutoff::Days(367))]);
        let d = filter_snapshots(&snapshots, dt(2001, 1, 1, 0, 0), &policy);
        assert_eq!(d.keep.len(), 3);
        assert_eq!(d.delete.len(), 1);
        assert_eq!(d.delete[0].name, "c");
    }

    // A weekly-stepped run of snapshots, where only the ones inside the Weekly cutoff band
    // survive individually and everything older collapses to one representative per calendar
    // month.
    #[test]
    fn weekly_band_and_monthly_collapse_compose_correctly() {
        let mut snapshots = Vec::new();
        let mut day = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        for i in 0..11 {
            snapshots.push(snap("tank", &format!("w{i}"), day));
            day += Duration::days(7);
        }
        let policy = Policy::new(vec![
            (Filter::Weekly, Cutoff::Days(30)),
            (Filter::Monthly, Cutoff::Unbounded),
        ]);
        let now = dt(2000, 4, 1, 0, 0);
        let d = filter_snapshots(&snapshots, now, &policy);
        // Weekly band (within 30 days of `now`) keeps its 2 distinct weeks (w9, w10) verbatim;
        // Monthly collapses the remaining January run to 1 and the February run to 1.
        assert_eq!(d.keep.len(), 4);
        assert_eq!(d.delete.len(), 7);
        assert_eq!(d.delete.first().unwrap().timestamp, snapshots[7].timestamp);
        assert_eq!(d.delete.last().unwrap().timestamp, snapshots[0].timestamp);
    }

    #[test]
    fn delete_ordering_is_newest_first() {
        // Four snapshots hours apart but all within the same calendar day: Daily collapses
        // them to one survivor and the other three land in `delete`, forcing a real sort.
        let snapshots = vec![
            snap("tank", "a", dt(2000, 1, 1, 1, 0)),
            snap("tank", "b", dt(2000, 1, 1, 9, 0)),
            snap("tank", "c", dt(2000, 1, 1, 15, 0)),
            snap("tank", "d", dt(2000, 1, 1, 23, 0)),
        ];
        let policy = Policy::new(vec![(Filter::Daily, Cutoff::Unbounded)]);
        let d = filter_snapshots(&snapshots, dt(2000, 6, 1, 0, 0), &policy);
        assert_eq!(d.delete.len(), 3);
        let timestamps: Vec<_> = d.delete.iter().map(|s| s.timestamp).collect();
        let mut sorted = timestamps.clone();
        sorted.sort();
        sorted.reverse();
        assert_eq!(timestamps, sorted);
    }

    #[test]
    fn partition_completeness_and_idempotence() {
        let snapshots = vec![
            snap("tank", "a", dt(2000, 1, 1, 0, 0)),
            snap("tank", "b", dt(2000, 3, 1, 0, 0)),
            snap("tank", "c", dt(2000, 6, 1, 0, 0)),
        ];
        let policy = default_policy();
        let now = dt(2000, 12, 31, 0, 0);
        let d = filter_snapshots(&snapshots, now, &policy);

        let mut all: Vec<_> = d.keep.iter().chain(d.delete.iter()).cloned().collect();
        all.sort_by_key(|s| s.timestamp);
        let mut expected = snapshots.clone();
        expected.sort_by_key(|s| s.timestamp);
        assert_eq!(all, expected);

        let keep_again = filter_snapshots(&d.keep, now, &policy);
        assert!(keep_again.delete.is_empty());
        let mut k1 = keep_again.keep.clone();
        let mut k2 = d.keep.clone();
        k1.sort_by_key(|s| s.timestamp);
        k2.sort_by_key(|s| s.timestamp);
        assert_eq!(k1, k2);
    }

    #[test]
    fn newest_snapshot_always_kept_under_default_policy() {
        let snapshots = vec![
            snap("tank", "a", dt(1990, 1, 1, 0, 0)),
            snap("tank", "b", dt(2000, 1, 1, 0, 0)),
        ];
        let d = filter_snapshots(&snapshots, dt(2000, 1, 1, 1, 0), &default_policy());
        assert!(d.keep.iter().any(|s| s.name == "b"));
    }

    use proptest::prelude::*;

    proptest! {
        // Property-based version of partition_completeness_and_idempotence over arbitrary
        // timestamp offsets: every snapshot lands in keep or delete exactly once, and
        // re-running the engine over the kept set deletes nothing further.
        #[test]
        fn partition_is_complete_and_idempotent_for_arbitrary_snapshots(
            offsets_days in proptest::collection::vec(0i64..900, 1..20),
        ) {
            let now = dt(2005, 1, 1, 0, 0);
            let snapshots: Vec<Snapshot> = offsets_days
                .into_iter()
                .enumerate()
                .map(|(i, days)| snap("tank", &format!("s{i}"), now - Duration::days(days)))
                .collect();
            let policy = default_policy();
            let d = filter_snapshots(&snapshots, now, &policy);

            let mut all: Vec<_> = d.keep.iter().chain(d.delete.iter()).cloned().collect();
            all.sort_by_key(|s| s.timestamp);
            let mut expected = snapshots.clone();
            expected.sort_by_key(|s| s.timestamp);
            prop_assert_eq!(all, expected);

            let again = filter_snapshots(&d.keep, now, &policy);
            prop_assert!(again.delete.is_empty());
        }
    }
}
