use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("rank must be at least 1")]
    ZeroRank,

    #[error("term must not be empty")]
    EmptyTerm,

    #[error("rank {rank} does not follow rank {previous}")]
    RankOrder { previous: u32, rank: u32 },
}

/// One ranked term of a hot search list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EntryRecord")]
pub struct HotSearchEntry {
    rank: u32,
    term: String,
    heat: u64,
    category: Option<String>,
    url: String,
    captured_at: DateTime<Local>,
}

/// Unchecked shape of an entry as read from disk.
#[derive(Deserialize)]
struct EntryRecord {
    rank: u32,
    term: String,
    heat: u64,
    category: Option<String>,
    #[serde(default)]
    url: String,
    captured_at: DateTime<Local>,
}

impl TryFrom<EntryRecord> for HotSearchEntry {
    type Error = ValidationError;

    fn try_from(record: EntryRecord) -> Result<Self, Self::Error> {
        HotSearchEntry::new(
            record.rank,
            record.term,
            record.heat,
            record.category,
            record.url,
            record.captured_at,
        )
    }
}

impl HotSearchEntry {
    pub fn new(
        rank: u32,
        term: impl Into<String>,
        heat: u64,
        category: Option<String>,
        url: impl Into<String>,
        captured_at: DateTime<Local>,
    ) -> Result<Self, ValidationError> {
        if rank == 0 {
            return Err(ValidationError::ZeroRank);
        }

        let term = term.into().trim().to_string();
        if term.is_empty() {
            return Err(ValidationError::EmptyTerm);
        }

        let category = category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Ok(Self {
            rank,
            term,
            heat,
            category,
            url: url.into(),
            captured_at,
        })
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn heat(&self) -> u64 {
        self.heat
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }
}

/// The full ordered result of one fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    source: String,
    fetched_at: DateTime<Local>,
    entries: Vec<HotSearchEntry>,
}

impl Snapshot {
    /// Ranks must be strictly increasing, which also makes them unique.
    pub fn new(
        source: impl Into<String>,
        fetched_at: DateTime<Local>,
        entries: Vec<HotSearchEntry>,
    ) -> Result<Self, ValidationError> {
        for pair in entries.windows(2) {
            if pair[1].rank <= pair[0].rank {
                return Err(ValidationError::RankOrder {
                    previous: pair[0].rank,
                    rank: pair[1].rank,
                });
            }
        }

        Ok(Self {
            source: source.into(),
            fetched_at,
            entries,
        })
    }

    pub fn empty(source: impl Into<String>, fetched_at: DateTime<Local>) -> Self {
        Self {
            source: source.into(),
            fetched_at,
            entries: Vec::new(),
        }
    }

    /// Identifier shared with every summary derived from this snapshot.
    pub fn id(&self) -> String {
        format!("{}-{}", self.source, self.fetched_at.format("%Y%m%dT%H%M%S"))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn fetched_at(&self) -> DateTime<Local> {
        self.fetched_at
    }

    pub fn entries(&self) -> &[HotSearchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn top(&self, n: usize) -> &[HotSearchEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn by_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a HotSearchEntry> {
        self.entries
            .iter()
            .filter(move |e| e.category() == Some(category))
    }
}

/// Parses heat values such as `"1100.9w"`, `"1100.9万"`, `"3.2k"` or `"12,345"`.
///
/// Unparsable input yields 0.
pub fn parse_heat(raw: &str) -> u64 {
    let cleaned: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();

    if cleaned.is_empty() {
        return 0;
    }

    let (number, multiplier) = if let Some(n) = cleaned
        .strip_suffix('w')
        .or_else(|| cleaned.strip_suffix('万'))
    {
        (n, 10_000.0)
    } else if let Some(n) = cleaned
        .strip_suffix('k')
        .or_else(|| cleaned.strip_suffix('千'))
    {
        (n, 1_000.0)
    } else {
        (cleaned.as_str(), 1.0)
    };

    match number.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => (value * multiplier).round() as u64,
        _ => {
            warn!(action = "parse", component = "heat_value", raw = raw, "Unparsable heat value");
            0
        }
    }
}
