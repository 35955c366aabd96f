use std::{path::PathBuf, time::Duration};

use sysinfo::System;
use tokio::{sync::watch, time::MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{
    buffer::{SharedBuffer, DEFAULT_RETENTION},
    Error, Fields, Result, MEMORY_FREE, MEMORY_USED,
};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Source of host memory readings.
pub trait MemoryProbe: Send {
    fn sample(&mut self) -> Result<Fields>;
}

#[derive(Debug)]
pub struct SysinfoProbe {
    sys: System,
}
impl SysinfoProbe {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}
impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}
impl MemoryProbe for SysinfoProbe {
    fn sample(&mut self) -> Result<Fields> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(Error::Sampling("platform not supported".into()));
        }
        self.sys.refresh_memory();
        if self.sys.total_memory() == 0 {
            return Err(Error::Sampling("total memory reported as zero".into()));
        }
        Ok(Fields::from([
            (MEMORY_FREE.into(), self.sys.free_memory() as f64),
            (MEMORY_USED.into(), self.sys.used_memory() as f64),
        ]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Persisted,
    SamplingFailed,
    PersistFailed,
}

/// Samples the probe into the buffer and writes the buffer out, once per interval.
#[derive(Debug)]
pub struct Collector<P> {
    buffer: SharedBuffer,
    probe: P,
    path: PathBuf,
    interval: Duration,
    retention: Duration,
}
impl<P> Collector<P>
where
    P: MemoryProbe,
{
    pub fn new(buffer: SharedBuffer, probe: P, path: PathBuf) -> Self {
        Self {
            buffer,
            probe,
            path,
            interval: DEFAULT_INTERVAL,
            retention: DEFAULT_RETENTION,
        }
    }
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn cycle(&mut self) -> CycleOutcome {
        let fields = match self.probe.sample() {
            Ok(fields) => fields,
            Err(e) => {
                warn!(error = %e, "skipping cycle");
                return CycleOutcome::SamplingFailed;
            }
        };
        let now = crate::now();
        debug!(now, ?fields, "sampled");
        self.buffer.insert(Some(now), fields);
        let removed = self.buffer.truncate(now, self.retention);
        if removed != 0 {
            debug!(removed, "dropped samples past retention");
        }
        match self.buffer.save(&self.path) {
            Ok(()) => {
                info!(samples = self.buffer.len(), path = %self.path.display(), "persisted");
                CycleOutcome::Persisted
            }
            Err(e) => {
                warn!(error = %e, "keeping samples in memory until the next cycle");
                CycleOutcome::PersistFailed
            }
        }
    }

    /// Runs a cycle every interval, starting immediately, until `shutdown` changes or its
    /// sender is dropped. Cycles and the final save run on the blocking pool.
    pub async fn run(self, mut shutdown: watch::Receiver<()>)
    where
        P: 'static,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut collector = self;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let cycle = tokio::task::spawn_blocking(move || {
                        collector.cycle();
                        collector
                    });
                    collector = match cycle.await {
                        Ok(collector) => collector,
                        Err(e) => {
                            error!(error = %e, "collector cycle panicked, stopping");
                            return;
                        }
                    };
                }
                _ = shutdown.changed() => break,
            }
        }
        let buffer = collector.buffer;
        let path = collector.path;
        let saved = tokio::task::spawn_blocking(move || buffer.save(&path).map(|()| path)).await;
        match saved {
            Ok(Ok(path)) => info!(path = %path.display(), "final save"),
            Ok(Err(e)) => warn!(error = %e, "final save failed"),
            Err(e) => error!(error = %e, "final save panicked"),
        }
    }
}
