//! Append-only latency samples and their summary statistics.
//!
//! Two independent sample vectors (VM-init duration, function-exec
//! duration), each behind its own mutex so a reader of one never blocks a
//! writer of the other. `summarize` computes N, mean, population stddev,
//! p95 (by truncating index, not interpolating), and max — matching the
//! source's `computeLenAvgStd95thMax` exactly, including its choice of
//! `floor(N * 0.95)` as the p95 index.

use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SampleSummary {
    pub count: u16,
    pub avg_nanos: i64,
    pub std_nanos: f64,
    pub p95_nanos: i64,
    pub max_nanos: i64,
}

impl SampleSummary {
    /// The source's sentinel for "no samples yet": all fields -1.
    fn empty() -> Self {
        Self {
            count: 0,
            avg_nanos: -1,
            std_nanos: -1.0,
            p95_nanos: -1,
            max_nanos: -1,
        }
    }
}

fn summarize(samples: &[i64]) -> SampleSummary {
    let count = samples.len();
    if count == 0 {
        return SampleSummary::empty();
    }

    let sum: i64 = samples.iter().sum();
    let avg = sum / count as i64;

    let variance: f64 = samples
        .iter()
        .map(|&v| {
            let diff = v as f64 - avg as f64;
            diff * diff
        })
        .sum::<f64>()
        / count as f64;
    let std = variance.sqrt();

    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let p95_index = ((count as f64) * 0.95) as usize;
    let p95 = sorted[p95_index.min(count - 1)];
    let max = sorted[count - 1];

    SampleSummary {
        count: count as u16,
        avg_nanos: avg,
        std_nanos: std,
        p95_nanos: p95,
        max_nanos: max,
    }
}

#[derive(Debug, Default)]
pub struct StatsCollector {
    vm_init: Mutex<Vec<i64>>,
    func_exec: Mutex<Vec<i64>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_vm_init(&self, nanos: i64) {
        self.vm_init.lock().expect("vm_init stats lock poisoned").push(nanos);
    }

    pub fn record_func_exec(&self, nanos: i64) {
        self.func_exec
            .lock()
            .expect("func_exec stats lock poisoned")
            .push(nanos);
    }

    pub fn summary(&self) -> StatsSummary {
        let vm_init = summarize(&self.vm_init.lock().expect("vm_init stats lock poisoned"));
        let func_exec = summarize(&self.func_exec.lock().expect("func_exec stats lock poisoned"));
        StatsSummary {
            numb_init_vms: vm_init.count,
            vm_init_time_nano_avg: vm_init.avg_nanos,
            vm_init_time_nano_std: vm_init.std_nanos,
            vm_init_time_nano_95: vm_init.p95_nanos,
            vm_init_time_nano_max: vm_init.max_nanos,
            func_exec_time_nano_avg: func_exec.avg_nanos,
            func_exec_time_nano_std: func_exec.std_nanos,
            func_exec_time_nano_95: func_exec.p95_nanos,
            func_exec_time_nano_max: func_exec.max_nanos,
        }
    }
}

/// JSON shape served by `GET /stats`, matching the literal field names the
/// external contract specifies.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatsSummary {
    #[serde(rename = "NumbInitVms")]
    pub numb_init_vms: u16,
    #[serde(rename = "VmInitTimeNanoAvg")]
    pub vm_init_time_nano_avg: i64,
    #[serde(rename = "VmInitTimeNanoStd")]
    pub vm_init_time_nano_std: f64,
    #[serde(rename = "VmInitTimeNano95")]
    pub vm_init_time_nano_95: i64,
    #[serde(rename = "VmInitTimeNanoMax")]
    pub vm_init_time_nano_max: i64,
    #[serde(rename = "FuncExecTimeNanoAvg")]
    pub func_exec_time_nano_avg: i64,
    #[serde(rename = "FuncExecTimeNanoStd")]
    pub func_exec_time_nano_std: f64,
    #[serde(rename = "FuncExecTimeNano95")]
    pub func_exec_time_nano_95: i64,
    #[serde(rename = "FuncExecTimeNanoMax")]
    pub func_exec_time_nano_max: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_matches_the_worked_example() {
        let summary = summarize(&[1, 2, 3, 4, 5]);
        assert_eq!(summary.count, 5);
        assert_eq!(summary.avg_nanos, 3);
        assert!((summary.std_nanos - std::f64::consts::SQRT_2).abs() < 1e-9);
        assert_eq!(summary.p95_nanos, 5);
        assert_eq!(summary.max_nanos, 5);
    }

    #[test]
    fn summarize_empty_returns_sentinel() {
        let summary = summarize(&[]);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.avg_nanos, -1);
        assert_eq!(summary.std_nanos, -1.0);
        assert_eq!(summary.p95_nanos, -1);
        assert_eq!(summary.max_nanos, -1);
    }

    #[test]
    fn collector_tracks_vm_init_and_func_exec_independently() {
        let collector = StatsCollector::new();
        collector.record_vm_init(100);
        collector.record_vm_init(200);
        collector.record_func_exec(50);

        let summary = collector.summary();
        assert_eq!(summary.numb_init_vms, 2);
        assert_eq!(summary.func_exec_time_nano_avg, 50);
    }
}
