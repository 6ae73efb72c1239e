// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Row types emitted by the orchestrator and the sinks that collect them.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

pub const GLOBAL_COLUMNS: [&str; 11] = [
    "t",
    "action",
    "mean_v",
    "low_occ",
    "mismatch",
    "energy",
    "plv",
    "global_v_offset",
    "domain_low_fraction",
    "reserved",
    "coupling",
];

pub const DOMAIN_COLUMNS: [&str; 9] = [
    "t",
    "domain_id",
    "action",
    "mean_v",
    "low_occ",
    "mismatch",
    "energy",
    "low_fraction",
    "controller_health",
];

/// One logged step at grid scope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalRecord {
    pub t: f64,
    /// Highest action code across domains.
    pub action: u8,
    pub mean_v: f64,
    pub low_occ: f64,
    pub mismatch: f64,
    pub energy: f64,
    pub plv: Option<f64>,
    pub global_v_offset: f64,
    pub domain_low_fraction: f64,
    /// Always `0.0`; keeps the column layout stable for downstream readers.
    pub reserved: f64,
    pub coupling: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub t: f64,
    pub domain_id: usize,
    pub action: u8,
    pub mean_v: f64,
    pub low_occ: f64,
    pub mismatch: f64,
    pub energy: f64,
    pub low_fraction: f64,
    pub controller_health: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub recovery_step: Option<usize>,
    pub flicker_rate: f64,
    pub plv_retention: Option<f64>,
    pub final_mean_v: f64,
    pub final_mean_energy: f64,
    pub final_low_occ: f64,
    pub domain_count: usize,
    pub tile: (usize, usize),
    pub dropout_fraction: f64,
}

/// Destination for logged rows. Hosts implement this to stream rows to disk.
pub trait RecordSink {
    fn global(&mut self, record: &GlobalRecord);
    fn domain(&mut self, record: &DomainRecord);
}

/// Discards every row.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl RecordSink for NullSink {
    fn global(&mut self, _record: &GlobalRecord) {}
    fn domain(&mut self, _record: &DomainRecord) {}
}

/// In-memory sink. With a capacity it keeps only the most recent logged
/// steps: every domain row of a retained step is kept, however many domains
/// report per step.
#[derive(Clone, Debug, Default)]
pub struct RunLog {
    capacity: Option<usize>,
    globals: VecDeque<GlobalRecord>,
    domains: VecDeque<DomainRecord>,
    /// Distinct step times currently held in `domains`.
    domain_steps: usize,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity: Some(capacity),
            globals: VecDeque::with_capacity(capacity),
            domains: VecDeque::new(),
            domain_steps: 0,
        }
    }

    pub fn globals(&self) -> impl Iterator<Item = &GlobalRecord> {
        self.globals.iter()
    }

    pub fn domains(&self) -> impl Iterator<Item = &DomainRecord> {
        self.domains.iter()
    }

    pub fn global_len(&self) -> usize {
        self.globals.len()
    }

    pub fn domain_len(&self) -> usize {
        self.domains.len()
    }

    /// Serialises both tables as a JSON object `{ "global": [...], "domains": [...] }`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&serde_json::json!({
            "global": self.globals,
            "domains": self.domains,
        }))
    }

    pub fn drain(&mut self) -> (Vec<GlobalRecord>, Vec<DomainRecord>) {
        self.domain_steps = 0;
        (self.globals.drain(..).collect(), self.domains.drain(..).collect())
    }

    /// Drops every row of the oldest step held in the domain table.
    fn evict_oldest_domain_step(&mut self) {
        let Some(oldest) = self.domains.front().map(|row| row.t) else {
            return;
        };
        while self.domains.front().map_or(false, |row| row.t == oldest) {
            self.domains.pop_front();
        }
        self.domain_steps = self.domain_steps.saturating_sub(1);
    }
}

impl RecordSink for RunLog {
    fn global(&mut self, record: &GlobalRecord) {
        if let Some(capacity) = self.capacity {
            if self.globals.len() == capacity {
                self.globals.pop_front();
            }
        }
        self.globals.push_back(record.clone());
    }

    fn domain(&mut self, record: &DomainRecord) {
        if self.domains.back().map_or(true, |row| row.t != record.t) {
            self.domain_steps += 1;
        }
        self.domains.push_back(record.clone());
        if let Some(capacity) = self.capacity {
            while self.domain_steps > capacity {
                self.evict_oldest_domain_step();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(t: f64) -> GlobalRecord {
        GlobalRecord {
            t,
            action: 1,
            mean_v: -10.0,
            low_occ: 0.2,
            mismatch: 0.1,
            energy: 0.8,
            plv: None,
            global_v_offset: 5.0,
            domain_low_fraction: 0.3,
            reserved: 0.0,
            coupling: Some(0.7),
        }
    }

    #[test]
    fn bounded_log_keeps_latest_rows() {
        let mut log = RunLog::with_capacity(2);
        for t in 0..4 {
            log.global(&global(t as f64));
        }
        let ts: Vec<f64> = log.globals().map(|row| row.t).collect();
        assert_eq!(ts, vec![2.0, 3.0]);
        let (globals, domains) = log.drain();
        assert_eq!(globals.len(), 2);
        assert!(domains.is_empty());
        assert_eq!(log.global_len(), 0);
    }

    fn domain(t: f64, domain_id: usize) -> DomainRecord {
        DomainRecord {
            t,
            domain_id,
            action: 0,
            mean_v: -5.0,
            low_occ: 0.0,
            mismatch: 0.0,
            energy: 0.8,
            low_fraction: 0.0,
            controller_health: 1.0,
        }
    }

    #[test]
    fn capacity_counts_steps_not_domain_rows() {
        let mut log = RunLog::with_capacity(2);
        for step in 0..5 {
            let t = step as f64;
            log.global(&global(t));
            for id in 0..4 {
                log.domain(&domain(t, id));
            }
        }
        let global_ts: Vec<f64> = log.globals().map(|row| row.t).collect();
        assert_eq!(global_ts, vec![3.0, 4.0]);
        assert_eq!(log.domain_len(), 8);
        let rows: Vec<(f64, usize)> = log.domains().map(|row| (row.t, row.domain_id)).collect();
        let expected: Vec<(f64, usize)> = [3.0, 4.0]
            .iter()
            .flat_map(|&t| (0..4).map(move |id| (t, id)))
            .collect();
        assert_eq!(rows, expected);

        log.drain();
        log.domain(&domain(9.0, 0));
        log.domain(&domain(10.0, 0));
        log.domain(&domain(11.0, 0));
        let ts: Vec<f64> = log.domains().map(|row| row.t).collect();
        assert_eq!(ts, vec![10.0, 11.0]);
    }

    #[test]
    fn json_leaves_undefined_plv_blank() {
        let mut log = RunLog::new();
        log.global(&global(0.0));
        let json = log.to_json().unwrap();
        assert!(json.contains("\"plv\":null"));
        assert!(json.contains("\"coupling\":0.7"));
        assert_eq!(GLOBAL_COLUMNS.len(), 11);
    }
}
