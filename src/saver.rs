use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Local};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::CrawlError;
use crate::models::{HotSearchEntry, Snapshot};

pub const CRAWL_DATA_DIR: &str = "crawl_data";

/// Where one run's files ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPaths {
    pub session_dir: PathBuf,
    pub json_path: PathBuf,
    pub csv_path: PathBuf,
}

/// `<output_dir>/<YYYYMMDD>/<HHMM>` for the moment the snapshot was fetched.
pub fn session_dir(output_dir: &Path, fetched_at: DateTime<Local>) -> PathBuf {
    output_dir
        .join(fetched_at.format("%Y%m%d").to_string())
        .join(fetched_at.format("%H%M").to_string())
}

pub fn save(snapshot: &Snapshot, output_dir: &Path) -> Result<SavedPaths, CrawlError> {
    let start_time = Instant::now();
    info!(action = "start", component = "data_saver", output_dir = ?output_dir, "Saving snapshot");

    let session_dir = session_dir(output_dir, snapshot.fetched_at());
    let data_dir = session_dir.join(CRAWL_DATA_DIR);
    fs::create_dir_all(&data_dir).map_err(|e| CrawlError::io(&data_dir, e))?;

    let stem = format!("hot_search_{}", snapshot.fetched_at().format("%Y-%m-%d"));
    let json_path = data_dir.join(format!("{}.json", stem));
    let csv_path = data_dir.join(format!("{}.csv", stem));

    write_json(snapshot, &json_path)?;
    write_csv(snapshot, &csv_path)?;

    info!(
        action = "complete",
        component = "data_saver",
        entry_count = snapshot.len(),
        json_path = ?json_path,
        csv_path = ?csv_path,
        duration_ms = start_time.elapsed().as_millis(),
        "Snapshot saved"
    );

    Ok(SavedPaths {
        session_dir,
        json_path,
        csv_path,
    })
}

fn write_json(snapshot: &Snapshot, path: &Path) -> Result<(), CrawlError> {
    let file = File::create(path).map_err(|e| CrawlError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, snapshot.entries())
        .map_err(|e| CrawlError::io(path, e.into()))?;
    writer.flush().map_err(|e| CrawlError::io(path, e))
}

fn write_csv(snapshot: &Snapshot, path: &Path) -> Result<(), CrawlError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_to_io(path, e))?;
    for entry in snapshot.entries() {
        writer.serialize(entry).map_err(|e| csv_to_io(path, e))?;
    }
    writer.flush().map_err(|e| CrawlError::io(path, e))
}

fn csv_to_io(path: &Path, err: csv::Error) -> CrawlError {
    CrawlError::io(path, err.into())
}

/// Reads a record file written by [`save`] back into a snapshot.
pub fn load_json(path: &Path, source: &str) -> Result<Snapshot, CrawlError> {
    let file = File::open(path).map_err(|e| CrawlError::io(path, e))?;
    let entries: Vec<HotSearchEntry> = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| CrawlError::io(path, e.into()))?;
    rebuild(path, source, entries)
}

/// Reads a tabular file written by [`save`] back into a snapshot.
pub fn load_csv(path: &Path, source: &str) -> Result<Snapshot, CrawlError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_to_io(path, e))?;
    let entries = reader
        .deserialize::<HotSearchEntry>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| csv_to_io(path, e))?;
    rebuild(path, source, entries)
}

fn rebuild(path: &Path, source: &str, entries: Vec<HotSearchEntry>) -> Result<Snapshot, CrawlError> {
    let fetched_at = entries
        .iter()
        .map(|e| e.captured_at())
        .min()
        .unwrap_or_else(Local::now);

    Snapshot::new(source, fetched_at, entries).map_err(|e| {
        CrawlError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
        )
    })
}

/// Finds the newest record file under `output_dir` other than `exclude`.
///
/// Session directories are named `YYYYMMDD/HHMM`, so path order is time order.
pub fn find_previous(output_dir: &Path, exclude: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = WalkDir::new(output_dir)
        .max_depth(4)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension().is_some_and(|ext| ext == "json")
                && p.parent()
                    .and_then(|d| d.file_name())
                    .is_some_and(|name| name == CRAWL_DATA_DIR)
                && p.as_path() < exclude
        })
        .collect();

    candidates.sort();
    let previous = candidates.pop();
    if previous.is_none() {
        warn!(action = "lookup", component = "previous_snapshot", output_dir = ?output_dir, "No earlier snapshot found");
    }
    previous
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample(fetched_at: DateTime<Local>) -> Snapshot {
        let entries = vec![
            HotSearchEntry::new(1, "spring, outfits", 1_200, Some("hot".into()), "https://example.com/a", fetched_at).unwrap(),
            HotSearchEntry::new(2, "\"quoted\" term", 0, None, "", fetched_at).unwrap(),
            HotSearchEntry::new(5, "city walk", 30, Some("new".into()), "", fetched_at).unwrap(),
        ];
        Snapshot::new("api", fetched_at, entries).unwrap()
    }

    fn key(snapshot: &Snapshot) -> Vec<(u32, String, u64, Option<String>)> {
        snapshot
            .entries()
            .iter()
            .map(|e| (e.rank(), e.term().to_string(), e.heat(), e.category().map(str::to_string)))
            .collect()
    }

    #[test]
    fn test_save_uses_partitioned_layout() {
        let dir = TempDir::new().unwrap();
        let fetched_at = Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let paths = save(&sample(fetched_at), dir.path()).unwrap();

        assert_eq!(paths.session_dir, dir.path().join("20240501").join("0930"));
        assert_eq!(
            paths.json_path,
            paths.session_dir.join("crawl_data").join("hot_search_2024-05-01.json")
        );
        assert!(paths.csv_path.exists());
    }

    #[test]
    fn test_csv_round_trip_preserves_entries() {
        let dir = TempDir::new().unwrap();
        let snapshot = sample(Local::now());
        let paths = save(&snapshot, dir.path()).unwrap();

        let loaded = load_csv(&paths.csv_path, "api").unwrap();
        assert_eq!(key(&loaded), key(&snapshot));
    }

    #[test]
    fn test_csv_has_header_row() {
        let dir = TempDir::new().unwrap();
        let paths = save(&sample(Local::now()), dir.path()).unwrap();
        let text = fs::read_to_string(&paths.csv_path).unwrap();
        assert!(text.starts_with("rank,term,heat,category,url,captured_at\n"));
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_json_is_array_of_entries() {
        let dir = TempDir::new().unwrap();
        let snapshot = sample(Local::now());
        let paths = save(&snapshot, dir.path()).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&paths.json_path).unwrap()).unwrap();
        assert_eq!(value.as_array().map(|a| a.len()), Some(3));

        let loaded = load_json(&paths.json_path, "api").unwrap();
        assert_eq!(key(&loaded), key(&snapshot));
    }

    #[test]
    fn test_save_into_unwritable_location_is_io_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let err = save(&sample(Local::now()), &blocker).unwrap_err();
        assert_eq!(err.kind(), "IOError");
    }

    #[test]
    fn test_find_previous_picks_latest_other_snapshot() {
        let dir = TempDir::new().unwrap();
        let older = save(&sample(Local.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()), dir.path()).unwrap();
        let newer = save(&sample(Local.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap()), dir.path()).unwrap();
        let current = save(&sample(Local.with_ymd_and_hms(2024, 5, 3, 8, 0, 0).unwrap()), dir.path()).unwrap();

        assert_eq!(find_previous(dir.path(), &current.json_path), Some(newer.json_path.clone()));
        assert_ne!(find_previous(dir.path(), &current.json_path), Some(older.json_path));
    }

    #[test]
    fn test_find_previous_ignores_later_sessions() {
        let dir = TempDir::new().unwrap();
        let earlier = save(&sample(Local.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()), dir.path()).unwrap();
        save(&sample(Local.with_ymd_and_hms(2024, 5, 9, 8, 0, 0).unwrap()), dir.path()).unwrap();
        let backdated = save(&sample(Local.with_ymd_and_hms(2024, 5, 3, 8, 0, 0).unwrap()), dir.path()).unwrap();

        assert_eq!(find_previous(dir.path(), &backdated.json_path), Some(earlier.json_path.clone()));
        assert_eq!(find_previous(dir.path(), &earlier.json_path), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_full_disk_is_io_error() {
        let snapshot = sample(Local::now());
        let err = write_json(&snapshot, Path::new("/dev/full")).unwrap_err();
        assert_eq!(err.kind(), "IOError");
        let err = write_csv(&snapshot, Path::new("/dev/full")).unwrap_err();
        assert_eq!(err.kind(), "IOError");
    }

    #[test]
    fn test_find_previous_on_empty_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(find_previous(dir.path(), Path::new("nothing.json")), None);
    }
}
