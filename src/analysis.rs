use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;
use std::time::Instant;

use regex::Regex;

use serde::Serialize;
use tracing::info;

use crate::models::{HotSearchEntry, Snapshot};

pub const DEFAULT_TOP_TERMS: usize = 20;
const TREND_LIST_LIMIT: usize = 10;
const UNCATEGORIZED: &str = "other";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HeatStats {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub median: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankChange {
    pub term: String,
    pub previous_rank: u32,
    pub current_rank: u32,
}

impl RankChange {
    /// Positive when the term climbed.
    pub fn delta(&self) -> i64 {
        i64::from(self.previous_rank) - i64::from(self.current_rank)
    }
}

/// Differences between this run and an earlier snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrendSummary {
    pub previous_snapshot_id: String,
    pub new_count: usize,
    pub removed_count: usize,
    pub new_terms: Vec<String>,
    pub removed_terms: Vec<String>,
    pub rank_changes: Vec<RankChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSummary {
    pub snapshot_id: String,
    pub total_entries: usize,
    pub heat: HeatStats,
    pub categories: BTreeMap<String, usize>,
    pub avg_term_length: f64,
    pub top_terms: Vec<(String, usize)>,
    pub trend: Option<TrendSummary>,
}

impl AnalysisSummary {
    pub fn with_trend(mut self, trend: TrendSummary) -> Self {
        self.trend = Some(trend);
        self
    }
}

pub fn analyze(snapshot: &Snapshot) -> AnalysisSummary {
    analyze_with(snapshot, DEFAULT_TOP_TERMS)
}

pub fn analyze_with(snapshot: &Snapshot, top_terms: usize) -> AnalysisSummary {
    let start_time = Instant::now();
    let entries = snapshot.entries();

    // Zero heat means the source did not report one.
    let heats: Vec<u64> = entries.iter().map(|e| e.heat()).filter(|h| *h > 0).collect();
    let heat = heat_stats(&heats);

    let mut categories = BTreeMap::new();
    for category in entries.iter().filter_map(|e| e.category()) {
        *categories.entry(category.to_string()).or_insert(0) += 1;
    }

    let avg_term_length = if entries.is_empty() {
        0.0
    } else {
        entries.iter().map(|e| e.term().chars().count()).sum::<usize>() as f64 / entries.len() as f64
    };

    let summary = AnalysisSummary {
        snapshot_id: snapshot.id(),
        total_entries: entries.len(),
        heat,
        categories,
        avg_term_length,
        top_terms: term_frequencies(entries, top_terms),
        trend: None,
    };

    info!(
        action = "complete",
        component = "analyzer",
        total_entries = summary.total_entries,
        max_heat = summary.heat.max,
        mean_heat = summary.heat.mean,
        category_count = summary.categories.len(),
        duration_ms = start_time.elapsed().as_millis(),
        "Snapshot analyzed"
    );

    summary
}

fn heat_stats(heats: &[u64]) -> HeatStats {
    if heats.is_empty() {
        return HeatStats::default();
    }

    let mut sorted = heats.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    let median = if n % 2 == 1 {
        sorted[n / 2] as f64
    } else {
        (sorted[n / 2 - 1] as f64 + sorted[n / 2] as f64) / 2.0
    };

    HeatStats {
        min: sorted[0],
        max: sorted[n - 1],
        mean: sorted.iter().map(|h| *h as f64).sum::<f64>() / n as f64,
        median,
    }
}

/// Naive tokenizer: split on whitespace and punctuation, keep tokens of two or more chars.
pub fn tokenize(term: &str) -> impl Iterator<Item = &str> {
    token_separator()
        .split(term)
        .filter(|token| token.chars().count() >= 2)
}

fn token_separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r"[\s\p{P}]+").expect("token separator pattern is valid"))
}

fn term_frequencies(entries: &[HotSearchEntry], limit: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for entry in entries {
        for token in tokenize(entry.term()) {
            *counts.entry(token).or_insert(0) += 1;
        }
    }

    let mut sorted: Vec<(&str, usize)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    sorted
        .into_iter()
        .take(limit)
        .map(|(token, count)| (token.to_string(), count))
        .collect()
}

/// Groups entries by category; uncategorised entries go under `"other"`.
pub fn group_by_category(snapshot: &Snapshot) -> BTreeMap<String, Vec<&HotSearchEntry>> {
    let mut groups: BTreeMap<String, Vec<&HotSearchEntry>> = BTreeMap::new();
    for entry in snapshot.entries() {
        let key = entry.category().unwrap_or(UNCATEGORIZED).to_string();
        groups.entry(key).or_default().push(entry);
    }
    groups
}

/// Distinct keywords across all terms, sorted.
pub fn extract_keywords(snapshot: &Snapshot) -> Vec<String> {
    snapshot
        .entries()
        .iter()
        .flat_map(|e| tokenize(e.term()))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Compares two snapshots term by term.
pub fn compare(current: &Snapshot, previous: &Snapshot) -> TrendSummary {
    let previous_ranks: HashMap<&str, u32> = previous
        .entries()
        .iter()
        .map(|e| (e.term(), e.rank()))
        .collect();
    let current_terms: BTreeSet<&str> = current.entries().iter().map(|e| e.term()).collect();

    let mut new_terms = Vec::new();
    let mut rank_changes = Vec::new();
    for entry in current.entries() {
        match previous_ranks.get(entry.term()) {
            None => new_terms.push(entry.term().to_string()),
            Some(&previous_rank) if previous_rank != entry.rank() => rank_changes.push(RankChange {
                term: entry.term().to_string(),
                previous_rank,
                current_rank: entry.rank(),
            }),
            Some(_) => {}
        }
    }

    let removed_terms: Vec<String> = previous
        .entries()
        .iter()
        .filter(|e| !current_terms.contains(e.term()))
        .map(|e| e.term().to_string())
        .collect();

    TrendSummary {
        previous_snapshot_id: previous.id(),
        new_count: new_terms.len(),
        removed_count: removed_terms.len(),
        new_terms: new_terms.into_iter().take(TREND_LIST_LIMIT).collect(),
        removed_terms: removed_terms.into_iter().take(TREND_LIST_LIMIT).collect(),
        rank_changes,
    }
}
