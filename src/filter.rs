use chrono::{DateTime, Datelike, Utc};

use crate::snapshot::Snapshot;

/// The bucket key a [`Filter`] assigns a snapshot's timestamp to. Only equality matters; the
/// concrete field shapes exist to keep bucketing allocation-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BucketKey {
    Hourly(i32, u32, u32, u32),
    Daily(i32, u32, u32),
    Weekly(i32, u32),
    Monthly(i32, u32),
    Yearly(i32),
}

/// A closed set of snapshot classifiers. Deliberately a tagged enum rather than an open trait
/// hierarchy: the variant set is fixed by the retention policy grammar and will never grow at
/// runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Passthrough,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Filter {
    /// Fixed rank used solely to canonicalize policy ordering (finer filters run first). These
    /// numbers are not durations, even though some happen to look like hour counts.
    pub fn granularity(self) -> u32 {
        match self {
            Filter::Passthrough => 0,
            Filter::Hourly => 1,
            Filter::Daily => 24,
            Filter::Weekly => 168,
            Filter::Monthly => 720,
            Filter::Yearly => 8760,
        }
    }

    fn bucket_key(self, timestamp: DateTime<Utc>) -> Option<BucketKey> {
        match self {
            Filter::Passthrough => None,
            Filter::Hourly => Some(BucketKey::Hourly(
                timestamp.year(),
                timestamp.month(),
                timestamp.day(),
                timestamp.hour(),
            )),
            Filter::Daily => Some(BucketKey::Daily(
                timestamp.year(),
                timestamp.month(),
                timestamp.day(),
            )),
            Filter::Weekly => {
                let iso = timestamp.iso_week();
                Some(BucketKey::Weekly(iso.year(), iso.week()))
            }
            Filter::Monthly => Some(BucketKey::Monthly(timestamp.year(), timestamp.month())),
            Filter::Yearly => Some(BucketKey::Yearly(timestamp.year())),
        }
    }

    /// Reduce `snapshots` to the representative set for this filter.
    ///
    /// `Passthrough` returns the input verbatim. The bucketing variants group by
    /// [`Filter::bucket_key`] and keep the newest snapshot per bucket, breaking ties
    /// deterministically on `(path, name)` rather than input order.
    pub fn apply(self, snapshots: &[Snapshot]) -> Vec<Snapshot> {
        if matches!(self, Filter::Passthrough) {
            return snapshots.to_vec();
        }

        use std::collections::HashMap;
        let mut buckets: HashMap<BucketKey, Vec<&Snapshot>> = HashMap::new();
        for snapshot in snapshots {
            let key = self
                .bucket_key(snapshot.timestamp)
                .expect("non-Passthrough filter always produces a bucket key");
            buckets.entry(key).or_default().push(snapshot);
        }

        buckets
            .into_values()
            .map(|mut bucket| {
                bucket.sort_by_key(|s| (s.timestamp, s.path.clone(), s.name.clone()));
                (*bucket.last().unwrap()).clone()
            })
            .collect()
    }
}
