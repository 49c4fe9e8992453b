//! In-process metrics snapshot.

use eyre::Result;
use metrics_util::{
    MetricKind,
    debugging::{DebugValue, DebuggingRecorder, Snapshotter},
};

/// One counter reading.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CounterValue {
    pub name: String,
    pub value: u64,
}

/// Handle to read counters recorded since [`MetricsSnapshot::install`].
#[derive(Debug)]
pub struct MetricsSnapshot {
    snapshotter: Snapshotter,
}

impl MetricsSnapshot {
    /// Install a debugging recorder as the global `metrics` recorder.
    ///
    /// Handles registered before this call keep writing to the previous
    /// recorder, so install it first.
    pub fn install() -> Result<Self> {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        recorder
            .install()
            .map_err(|err| eyre::eyre!("failed to install metrics recorder: {err}"))?;
        Ok(Self { snapshotter })
    }

    /// Current counters sorted by name. Series with the same name are
    /// summed.
    pub fn counters(&self) -> Vec<CounterValue> {
        let mut counters: Vec<CounterValue> = Vec::new();
        for (key, _, _, value) in self.snapshotter.snapshot().into_vec() {
            if key.kind() != MetricKind::Counter {
                continue;
            }
            let DebugValue::Counter(value) = value else {
                continue;
            };
            let name = key.key().name();
            match counters.iter_mut().find(|c| c.name == name) {
                Some(existing) => existing.value += value,
                None => counters.push(CounterValue {
                    name: name.to_string(),
                    value,
                }),
            }
        }
        counters.sort();
        counters
    }
}
