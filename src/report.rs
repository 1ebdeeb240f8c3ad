//! HTML digest rendering
//!
//! Produces one self-contained static page per run. Everything is plain
//! `format!` templating with inline CSS; no scripts, no external assets.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::analysis::{AnalysisSummary, TrendSummary};
use crate::error::CrawlError;
use crate::models::{HotSearchEntry, Snapshot};
use crate::utils::format_number;

pub const REPORT_FILE_NAME: &str = "report.html";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    /// How many entries to list.
    pub top_n: usize,
    /// Whether to include the narrative analysis section.
    pub include_deep_analysis: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            top_n: 20,
            include_deep_analysis: true,
        }
    }
}

/// Renders the digest for `snapshot`.
///
/// Fails with a template error when `summary` was not derived from this
/// snapshot, or when `options.top_n` is zero.
pub fn render(
    snapshot: &Snapshot,
    summary: &AnalysisSummary,
    options: &ReportOptions,
) -> Result<String, CrawlError> {
    if summary.snapshot_id != snapshot.id() {
        return Err(CrawlError::Template(format!(
            "summary for '{}' has no figures for snapshot '{}'",
            summary.snapshot_id,
            snapshot.id()
        )));
    }
    if summary.total_entries != snapshot.len() {
        return Err(CrawlError::Template(format!(
            "summary counts {} entries, snapshot holds {}",
            summary.total_entries,
            snapshot.len()
        )));
    }
    if options.top_n == 0 {
        return Err(CrawlError::Template("top_n must be at least 1".to_string()));
    }

    let fetched = snapshot.fetched_at();
    let deep = if options.include_deep_analysis && !snapshot.is_empty() {
        render_analysis(summary)
    } else {
        String::new()
    };

    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Hot Search Digest - {date}</title>
    <style>{css}</style>
</head>
<body>
    <div class="container">
        <header>
            <h1>Hot Search Digest</h1>
            <p class="meta">{when} &middot; source: {source}</p>
        </header>
        {cards}
        {list}
        {deep}
        <footer>
            <p>Snapshot {id}</p>
        </footer>
    </div>
</body>
</html>
"#,
        date = fetched.format("%Y-%m-%d"),
        when = fetched.format("%Y-%m-%d %H:%M"),
        source = html_escape(snapshot.source()),
        css = inline_css(),
        cards = render_cards(summary),
        list = render_entries(snapshot, options.top_n),
        deep = deep,
        id = html_escape(&snapshot.id()),
    ))
}

/// Writes `report.html` into the session directory.
pub fn write_report(session_dir: &Path, html: &str) -> Result<PathBuf, CrawlError> {
    fs::create_dir_all(session_dir).map_err(|e| CrawlError::io(session_dir, e))?;
    let path = session_dir.join(REPORT_FILE_NAME);
    fs::write(&path, html).map_err(|e| CrawlError::io(&path, e))?;
    info!(action = "write", component = "report", path = ?path, bytes = html.len(), "Report written");
    Ok(path)
}

fn render_cards(summary: &AnalysisSummary) -> String {
    format!(
        r#"<section class="cards">
            <div class="card"><h3>{total}</h3><p>Entries</p></div>
            <div class="card"><h3>{max}</h3><p>Peak heat</p></div>
            <div class="card"><h3>{mean}</h3><p>Average heat</p></div>
            <div class="card"><h3>{categories}</h3><p>Categories</p></div>
        </section>"#,
        total = summary.total_entries,
        max = format_number(summary.heat.max),
        mean = format_number(summary.heat.mean.round() as u64),
        categories = summary.categories.len(),
    )
}

fn render_entries(snapshot: &Snapshot, top_n: usize) -> String {
    if snapshot.is_empty() {
        return r#"<section class="section">
            <h2>Today's list</h2>
            <p class="no-data">No data: the source returned no hot search entries.</p>
        </section>"#
            .to_string();
    }

    let shown = snapshot.top(top_n);
    let items: String = shown.iter().map(render_entry).collect();
    format!(
        r#"<section class="section">
            <h2>Top {count}</h2>
            <ol class="hot-list">{items}</ol>
        </section>"#,
        count = shown.len(),
        items = items,
    )
}

fn render_entry(entry: &HotSearchEntry) -> String {
    let term = html_escape(entry.term());
    let title = if entry.url().is_empty() {
        term
    } else {
        format!(r#"<a href="{}">{}</a>"#, html_escape(entry.url()), term)
    };
    let tag = entry
        .category()
        .map(|c| format!(r#"<span class="tag">{}</span>"#, html_escape(c)))
        .unwrap_or_default();
    let heat = if entry.heat() > 0 {
        format!(r#"<span class="heat">heat {}</span>"#, format_number(entry.heat()))
    } else {
        String::new()
    };

    format!(
        r#"
                <li class="hot-item"><span class="rank">{rank}</span><span class="term">{title}</span>{tag}{heat}</li>"#,
        rank = entry.rank(),
        title = title,
        tag = tag,
        heat = heat,
    )
}

fn render_analysis(summary: &AnalysisSummary) -> String {
    let categories: String = summary
        .categories
        .iter()
        .map(|(name, count)| format!("<li>{}: {}</li>", html_escape(name), count))
        .collect();
    let terms: String = summary
        .top_terms
        .iter()
        .map(|(term, count)| format!("<li>{} ({})</li>", html_escape(term), count))
        .collect();

    format!(
        r#"<section class="section">
            <h2>Analysis</h2>
            <div class="panel">
                <h3>Heat</h3>
                <ul>
                    <li>Average: {mean}</li>
                    <li>Highest: {max}</li>
                    <li>Lowest: {min}</li>
                    <li>Median: {median}</li>
                </ul>
            </div>
            <div class="panel">
                <h3>Categories</h3>
                <ul>{categories}</ul>
            </div>
            <div class="panel">
                <h3>Frequent terms</h3>
                <ul>{terms}</ul>
                <p>Average term length: {avg_len:.1} characters</p>
            </div>
            {trend}
        </section>"#,
        mean = format_number(summary.heat.mean.round() as u64),
        max = format_number(summary.heat.max),
        min = format_number(summary.heat.min),
        median = format_number(summary.heat.median.round() as u64),
        categories = or_none(categories),
        terms = or_none(terms),
        avg_len = summary.avg_term_length,
        trend = summary.trend.as_ref().map(render_trend).unwrap_or_default(),
    )
}

fn render_trend(trend: &TrendSummary) -> String {
    let list = |terms: &[String]| -> String {
        or_none(terms.iter().map(|t| format!("<li>{}</li>", html_escape(t))).collect())
    };
    let moves: String = trend
        .rank_changes
        .iter()
        .take(10)
        .map(|c| {
            format!(
                "<li>{}: {} &rarr; {} ({:+})</li>",
                html_escape(&c.term),
                c.previous_rank,
                c.current_rank,
                c.delta()
            )
        })
        .collect();

    format!(
        r#"<div class="panel">
                <h3>Since {previous}</h3>
                <p>{new_count} new, {removed_count} dropped</p>
                <h4>New</h4><ul>{new}</ul>
                <h4>Dropped</h4><ul>{removed}</ul>
                <h4>Moved</h4><ul>{moves}</ul>
            </div>"#,
        previous = html_escape(&trend.previous_snapshot_id),
        new_count = trend.new_count,
        removed_count = trend.removed_count,
        new = list(trend.new_terms.as_slice()),
        removed = list(trend.removed_terms.as_slice()),
        moves = or_none(moves),
    )
}

fn or_none(items: String) -> String {
    if items.is_empty() {
        "<li>none</li>".to_string()
    } else {
        items
    }
}

fn inline_css() -> &'static str {
    r#"
* { box-sizing: border-box; margin: 0; padding: 0; }
body { font-family: system-ui, -apple-system, 'Segoe UI', 'Microsoft YaHei', sans-serif; line-height: 1.6; color: #2d3436; background: #f5f6fa; }
.container { max-width: 1100px; margin: 2rem auto; padding: 2rem; background: #fff; border-radius: 12px; }
header { text-align: center; padding: 1.5rem 0; margin-bottom: 2rem; background: #ff6b6b; color: #fff; border-radius: 12px; }
header .meta { opacity: 0.9; }
.cards { display: grid; grid-template-columns: repeat(auto-fit, minmax(200px, 1fr)); gap: 1rem; margin-bottom: 2rem; }
.card { background: #0984e3; color: #fff; padding: 1.25rem; border-radius: 12px; text-align: center; }
.section { margin-bottom: 2rem; padding: 1.5rem; background: #f8f9fa; border-left: 5px solid #ff6b6b; border-radius: 12px; }
.section h2 { margin-bottom: 1rem; }
.hot-list { list-style: none; display: grid; gap: 0.75rem; }
.hot-item { background: #fff; padding: 0.75rem 1rem; border-radius: 8px; }
.rank { display: inline-block; width: 2rem; height: 2rem; line-height: 2rem; margin-right: 0.75rem; text-align: center; border-radius: 50%; background: #ff6b6b; color: #fff; font-weight: bold; }
.term { font-weight: bold; }
.term a { color: inherit; text-decoration: none; }
.tag { margin-left: 0.75rem; padding: 0.1rem 0.6rem; border-radius: 1rem; background: #74b9ff; color: #fff; font-size: 0.8em; }
.heat { margin-left: 0.75rem; color: #e17055; }
.panel { background: #fff; padding: 1rem; margin: 1rem 0; border-radius: 8px; }
.panel ul { margin-left: 1.25rem; }
.no-data { color: #636e72; font-style: italic; }
footer { text-align: center; color: #636e72; font-size: 0.85em; }
"#
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{analyze, compare};
    use chrono::Local;

    fn snapshot(terms: &[&str]) -> Snapshot {
        let now = Local::now();
        let entries = terms
            .iter()
            .enumerate()
            .map(|(i, t)| {
                HotSearchEntry::new(i as u32 + 1, *t, (i as u64 + 1) * 1000, Some("hot".into()), "https://example.com/?q=1&r=2", now).unwrap()
            })
            .collect();
        Snapshot::new("api", now, entries).unwrap()
    }

    #[test]
    fn test_render_empty_snapshot_shows_no_data() {
        let empty = Snapshot::empty("api", Local::now());
        let html = render(&empty, &analyze(&empty), &ReportOptions::default()).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains(r#"class="no-data""#));
        assert!(html.trim_end().ends_with("</html>"));
    }

    #[test]
    fn test_render_lists_top_n_and_escapes() {
        let snap = snapshot(&["<b>bold</b>", "second", "third"]);
        let options = ReportOptions {
            top_n: 2,
            include_deep_analysis: false,
        };
        let html = render(&snap, &analyze(&snap), &options).unwrap();

        assert!(html.contains("&lt;b&gt;bold&lt;/b&gt;"));
        assert!(html.contains("second"));
        assert!(!html.contains("third"));
        assert!(html.contains("q=1&amp;r=2"));
        assert!(!html.contains("<h2>Analysis</h2>"));
    }

    #[test]
    fn test_render_deep_analysis_includes_trend() {
        let previous = snapshot(&["alpha", "beta"]);
        let current = snapshot(&["beta", "gamma"]);
        let summary = analyze(&current).with_trend(compare(&current, &previous));

        let html = render(&current, &summary, &ReportOptions::default()).unwrap();
        assert!(html.contains("<h2>Analysis</h2>"));
        assert!(html.contains("1 new, 1 dropped"));
        assert!(html.contains("Median: 1,500"));
    }

    #[test]
    fn test_render_rejects_summary_of_other_snapshot() {
        let snap = snapshot(&["one"]);
        let mut summary = analyze(&snap);
        summary.snapshot_id = "api-19700101T000000".to_string();
        let err = render(&snap, &summary, &ReportOptions::default()).unwrap_err();
        assert_eq!(err.kind(), "TemplateError");
    }

    #[test]
    fn test_render_rejects_zero_top_n() {
        let snap = snapshot(&["one"]);
        let options = ReportOptions {
            top_n: 0,
            include_deep_analysis: true,
        };
        assert!(render(&snap, &analyze(&snap), &options).is_err());
    }

    #[test]
    fn test_write_report_creates_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_report(&dir.path().join("20240501").join("0930"), "<html></html>").unwrap();
        assert!(path.ends_with("report.html"));
        assert_eq!(fs::read_to_string(path).unwrap(), "<html></html>");
    }
}
