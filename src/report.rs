//! Run results: per-request records, per-edge statistics and summaries.

use crate::edge::EdgeStatsSnapshot;
use crate::error::Result;
use crate::session::RequestRecord;
use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;
use tabled::{settings::Style as TableStyle, Table, Tabled};

/// Everything a simulation run produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub records: Vec<RequestRecord>,
    pub edges: Vec<EdgeStatsSnapshot>,
    /// Real duration of the run
    pub wall_time: Duration,
}

/// Aggregate figures over all records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub requests: usize,
    pub served: usize,
    pub failed: usize,
    pub cache_hits: usize,
    pub hit_ratio: f64,
    pub avg_latency_ms: f64,
    /// Average latency a user would have seen going straight to the origin
    pub avg_origin_baseline_ms: f64,
    /// Average load-induced delay of served requests
    pub avg_load_delay_ms: f64,
    pub avg_distance_to_edge_km: f64,
    pub avg_distance_to_origin_km: f64,
    /// Share of the user-to-origin distance saved by going to an edge
    pub distance_reduction: f64,
    pub recommendations: u64,
    /// Requests that followed at least one recommendation
    pub redirected_requests: usize,
}

impl RunReport {
    pub fn new(
        records: Vec<RequestRecord>,
        edges: Vec<EdgeStatsSnapshot>,
        wall_time: Duration,
    ) -> Self {
        Self {
            records,
            edges,
            wall_time,
        }
    }

    /// Computes the run summary. Latency averages cover served requests only.
    pub fn summary(&self) -> RunSummary {
        let served: Vec<_> = self.records.iter().filter(|r| r.is_served()).collect();
        let cache_hits = served.iter().filter(|r| r.cache_hit).count();
        let avg_distance_to_edge_km = mean(self.records.iter().map(|r| r.distance_to_edge_km));
        let avg_distance_to_origin_km = mean(self.records.iter().map(|r| r.distance_to_origin_km));

        RunSummary {
            requests: self.records.len(),
            served: served.len(),
            failed: self.records.len() - served.len(),
            cache_hits,
            hit_ratio: ratio(cache_hits, served.len()),
            avg_latency_ms: mean(served.iter().map(|r| r.latency_ms)),
            avg_origin_baseline_ms: mean(served.iter().map(|r| r.origin_baseline_ms)),
            avg_load_delay_ms: mean(served.iter().map(|r| r.load_delay_ms)),
            avg_distance_to_edge_km,
            avg_distance_to_origin_km,
            distance_reduction: if avg_distance_to_origin_km > 0.0 {
                1.0 - avg_distance_to_edge_km / avg_distance_to_origin_km
            } else {
                0.0
            },
            recommendations: self.records.iter().map(|r| r.recommendations as u64).sum(),
            redirected_requests: self.records.iter().filter(|r| r.recommendations > 0).count(),
        }
    }

    /// Writes one JSON object per record, one per line.
    pub fn write_json_lines(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        for record in &self.records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Renders per-user, per-edge and overall tables.
    pub fn summary_table(&self) -> String {
        let users = Table::new(self.user_rows())
            .with(TableStyle::rounded())
            .to_string();
        let edges = Table::new(self.edges.iter().map(EdgeRow::from))
            .with(TableStyle::rounded())
            .to_string();

        let summary = self.summary();
        format!(
            "{}\n{}\nRequests: {} served, {} failed | hit ratio {:.1}% | avg latency {:.2} ms (origin direct {:.2} ms, load {:.2} ms) | distance reduction {:.1}% | {} recommendations | {:.1}s wall",
            users,
            edges,
            summary.served,
            summary.failed,
            summary.hit_ratio * 100.0,
            summary.avg_latency_ms,
            summary.avg_origin_baseline_ms,
            summary.avg_load_delay_ms,
            summary.distance_reduction * 100.0,
            summary.recommendations,
            self.wall_time.as_secs_f64(),
        )
    }

    fn user_rows(&self) -> Vec<UserRow> {
        let mut by_user: BTreeMap<UserId, Vec<&RequestRecord>> = BTreeMap::new();
        for record in &self.records {
            by_user.entry(record.user_id).or_default().push(record);
        }

        by_user
            .into_iter()
            .map(|(user_id, records)| {
                let served: Vec<_> = records.iter().filter(|r| r.is_served()).collect();
                let hits = served.iter().filter(|r| r.cache_hit).count();
                UserRow {
                    user: user_id,
                    city: records.first().map(|r| r.city.clone()).unwrap_or_default(),
                    requests: records.len(),
                    hit_ratio: format_percent(ratio(hits, served.len())),
                    avg_latency: format!("{:.2} ms", mean(served.iter().map(|r| r.latency_ms))),
                    load_delay: format!(
                        "{:.1} ms",
                        served.iter().map(|r| r.load_delay_ms).sum::<f64>()
                    ),
                    edge_distance: format!(
                        "{:.1} km",
                        records.last().map(|r| r.distance_to_edge_km).unwrap_or_default()
                    ),
                    recommendations: records.iter().map(|r| r.recommendations).sum(),
                    failed: records.len() - served.len(),
                }
            })
            .collect()
    }
}

#[derive(Debug, Tabled)]
struct UserRow {
    #[tabled(rename = "User")]
    user: UserId,
    #[tabled(rename = "City")]
    city: String,
    #[tabled(rename = "Requests")]
    requests: usize,
    #[tabled(rename = "Hit ratio")]
    hit_ratio: String,
    #[tabled(rename = "Avg latency")]
    avg_latency: String,
    #[tabled(rename = "Load delay")]
    load_delay: String,
    #[tabled(rename = "Edge distance")]
    edge_distance: String,
    #[tabled(rename = "Recs")]
    recommendations: u32,
    #[tabled(rename = "Failed")]
    failed: usize,
}

#[derive(Debug, Tabled)]
struct EdgeRow {
    #[tabled(rename = "Edge")]
    name: String,
    #[tabled(rename = "Requests")]
    requests: u64,
    #[tabled(rename = "Served")]
    served: u64,
    #[tabled(rename = "Forced")]
    forced: u64,
    #[tabled(rename = "Recommended")]
    recommended: u64,
    #[tabled(rename = "Failed")]
    failed: u64,
    #[tabled(rename = "Hit ratio")]
    hit_ratio: String,
    #[tabled(rename = "Cached")]
    cached: String,
    #[tabled(rename = "p")]
    target_t1: usize,
}

impl From<&EdgeStatsSnapshot> for EdgeRow {
    fn from(s: &EdgeStatsSnapshot) -> Self {
        Self {
            name: format!("{} ({})", s.name, s.edge_id),
            requests: s.requests,
            served: s.served,
            forced: s.forced,
            recommended: s.recommended,
            failed: s.failed,
            hit_ratio: format_percent(s.hit_ratio()),
            cached: format!("{}/{}", s.cache.entries, s.cache.capacity),
            target_t1: s.cache.target_t1,
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn format_percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}
