use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tracing::warn;

use crate::{persist, FieldKey, Fields, Sample, Time};

pub const HOUR: Duration = Duration::from_secs(60 * 60);
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);
pub const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const MONTH: Duration = Duration::from_secs(4 * 7 * 24 * 60 * 60);
pub const DEFAULT_RETENTION: Duration = MONTH;

/// Averaged fields of all samples that fell into `[start, start + width)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub start: Time,
    pub count: usize,
    pub fields: Fields,
}

/// Samples ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct TimeBuffer {
    samples: Vec<Sample>,
}
impl TimeBuffer {
    pub fn new() -> Self {
        Self { samples: vec![] }
    }

    /// Takes samples in any order.
    pub fn from_samples(mut samples: Vec<Sample>) -> Self {
        samples.sort_by(|a, b| b.time.cmp(&a.time));
        Self { samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Union of the field names across all samples.
    pub fn field_keys(&self) -> BTreeSet<FieldKey> {
        self.samples
            .iter()
            .flat_map(|sample| sample.fields.keys().cloned())
            .collect()
    }

    /// Inserts a sample, stamped with the current time if `time` is `None`.
    pub fn insert(&mut self, time: Option<Time>, mut fields: Fields) {
        let time = time.unwrap_or_else(crate::now);
        fields.retain(|key, value| {
            let finite = value.is_finite();
            if !finite {
                warn!(time, key = %key, value = %value, "dropping non-finite value");
            }
            finite
        });
        if let Some(newest) = self.samples.first() {
            if !newest.fields.keys().eq(fields.keys()) {
                warn!(
                    time,
                    expected = ?newest.fields.keys().collect::<Vec<_>>(),
                    got = ?fields.keys().collect::<Vec<_>>(),
                    "sample field set differs from the newest sample"
                );
            }
        }
        // Equal timestamps go behind the ones already present.
        let pos = self.samples.partition_point(|sample| time <= sample.time);
        self.samples.insert(pos, Sample::new(time, fields));
    }

    /// Drops every sample strictly older than `now - retention`.
    ///
    /// Returns how many samples were removed.
    pub fn truncate(&mut self, now: Time, retention: Duration) -> usize {
        let cutoff = now.saturating_sub(retention.as_secs());
        let keep = self.samples.partition_point(|sample| cutoff <= sample.time);
        let removed = self.samples.len() - keep;
        self.samples.truncate(keep);
        removed
    }

    /// Samples within `[now - span, now]`, newest first.
    pub fn window(&self, now: Time, span: Duration) -> &[Sample] {
        let lower = now.saturating_sub(span.as_secs());
        let start = self.samples.partition_point(|sample| now < sample.time);
        let end = self.samples.partition_point(|sample| lower <= sample.time);
        &self.samples[start..end]
    }

    /// Averages `window(now, span)` into buckets of width `bucket`.
    ///
    /// Buckets are laid out from the start of the window and returned newest first. Buckets
    /// without samples are left out. A field missing from some samples of a bucket is averaged
    /// over the samples that carry it.
    pub fn resample(&self, now: Time, span: Duration, bucket: Duration) -> Vec<Bucket> {
        let lower = now.saturating_sub(span.as_secs());
        let width = bucket.as_secs().max(1);
        let mut buckets = vec![];
        let mut acc: Option<Accumulator> = None;
        for sample in self.window(now, span) {
            let start = lower + (sample.time - lower) / width * width;
            match &mut acc {
                Some(acc) if acc.start == start => acc.add(sample),
                _ => {
                    if let Some(done) = acc.take() {
                        buckets.push(done.finish());
                    }
                    let mut next = Accumulator::new(start);
                    next.add(sample);
                    acc = Some(next);
                }
            }
        }
        if let Some(done) = acc {
            buckets.push(done.finish());
        }
        buckets
    }

    pub fn daily(&self, now: Time) -> &[Sample] {
        self.window(now, DAY)
    }
    pub fn weekly(&self, now: Time) -> Vec<Bucket> {
        self.resample(now, WEEK, HOUR)
    }
    pub fn monthly(&self, now: Time) -> Vec<Bucket> {
        self.resample(now, MONTH, 3 * HOUR)
    }
}

#[derive(Debug)]
struct Accumulator {
    start: Time,
    count: usize,
    sums: BTreeMap<FieldKey, (f64, usize)>,
}
impl Accumulator {
    fn new(start: Time) -> Self {
        Self {
            start,
            count: 0,
            sums: BTreeMap::new(),
        }
    }

    fn add(&mut self, sample: &Sample) {
        self.count += 1;
        for (key, value) in &sample.fields {
            let (sum, n) = self.sums.entry(key.clone()).or_insert((0.0, 0));
            *sum += value;
            *n += 1;
        }
    }

    fn finish(self) -> Bucket {
        let fields = self
            .sums
            .into_iter()
            .map(|(key, (sum, n))| (key, sum / n as f64))
            .collect();
        Bucket {
            start: self.start,
            count: self.count,
            fields,
        }
    }
}

/// A [`TimeBuffer`] behind one lock, shared by the collector and the web handlers.
///
/// Every call holds the lock for its whole duration, including [`SharedBuffer::save`].
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<TimeBuffer>>,
}
impl SharedBuffer {
    pub fn new(buffer: TimeBuffer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(buffer)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimeBuffer> {
        // Every mutation completes before the guard drops, so a poisoned buffer is still whole.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, time: Option<Time>, fields: Fields) {
        self.lock().insert(time, fields);
    }
    pub fn truncate(&self, now: Time, retention: Duration) -> usize {
        self.lock().truncate(now, retention)
    }
    pub fn window(&self, now: Time, span: Duration) -> Vec<Sample> {
        self.lock().window(now, span).to_vec()
    }
    pub fn resample(&self, now: Time, span: Duration, bucket: Duration) -> Vec<Bucket> {
        self.lock().resample(now, span, bucket)
    }
    pub fn daily(&self, now: Time) -> Vec<Sample> {
        self.lock().daily(now).to_vec()
    }
    pub fn weekly(&self, now: Time) -> Vec<Bucket> {
        self.lock().weekly(now)
    }
    pub fn monthly(&self, now: Time) -> Vec<Bucket> {
        self.lock().monthly(now)
    }
    pub fn len(&self) -> usize {
        self.lock().len()
    }
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
    pub fn snapshot(&self) -> TimeBuffer {
        self.lock().clone()
    }

    pub fn save(&self, path: &Path) -> crate::Result<()> {
        persist::save(&self.lock(), path)
    }
}
