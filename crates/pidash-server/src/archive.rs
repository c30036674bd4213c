use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use glob::glob;
use serde::Serialize;

/// One downloadable weekly CSV.
#[derive(Clone, Debug, Serialize)]
pub struct ArchiveFile {
    pub name: String,
    pub size: u64,
}

/// All files for one production week.
#[derive(Clone, Debug, Serialize)]
pub struct ArchiveGroup {
    pub year: i32,
    pub week: u32,
    pub files: Vec<ArchiveFile>,
}

/// Response body of the archive listing endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct ArchiveListing {
    pub archives: Vec<ArchiveGroup>,
}

/// Extract (year, week) from a weekly CSV name like
/// `testergebnisse_2026_KW35.csv`. The year is any 2000-2099 token, the
/// week a `KW`/`W`-prefixed or bare 1-53 token.
fn parse_week(name: &str) -> Option<(i32, u32)> {
    let stem = name.strip_suffix(".csv").unwrap_or(name);
    let mut year: Option<i32> = None;
    let mut week: Option<u32> = None;

    for token in stem.split(|c: char| !c.is_ascii_alphanumeric()) {
        let digits = token.trim_start_matches(|c: char| c.is_ascii_alphabetic());
        let prefixed = digits.len() < token.len();
        if let Ok(n) = digits.parse::<u32>() {
            if !prefixed && (2000..2100).contains(&n) {
                year.get_or_insert(n as i32);
            } else if (1..=53).contains(&n) {
                let upper = token.to_ascii_uppercase();
                if upper.starts_with("KW") || upper.starts_with('W') || !prefixed {
                    week.get_or_insert(n);
                }
            }
        }
    }

    Some((year?, week?))
}

fn week_from_mtime(path: &Path) -> Option<(i32, u32)> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let dt: DateTime<Utc> = modified.into();
    let iso = dt.iso_week();
    Some((iso.year(), iso.week()))
}

/// Scan the archive directory for `*.csv` and group files by production
/// week, newest week first. Files that encode no week in their name fall
/// back to the week of their modification time.
pub fn list_archives(dir: &Path) -> ArchiveListing {
    let pattern = dir.join("*.csv");
    let mut groups: Vec<ArchiveGroup> = Vec::new();

    let paths = match glob(&pattern.to_string_lossy()) {
        Ok(paths) => paths,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "bad archive glob");
            return ArchiveListing {
                archives: Vec::new(),
            };
        }
    };

    for path in paths.flatten() {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let Some((year, week)) = parse_week(&name).or_else(|| week_from_mtime(&path)) else {
            continue;
        };

        let file = ArchiveFile { name, size };
        match groups
            .iter_mut()
            .find(|g| g.year == year && g.week == week)
        {
            Some(group) => group.files.push(file),
            None => groups.push(ArchiveGroup {
                year,
                week,
                files: vec![file],
            }),
        }
    }

    for group in &mut groups {
        group.files.sort_by(|a, b| a.name.cmp(&b.name));
    }
    groups.sort_by(|a, b| (b.year, b.week).cmp(&(a.year, a.week)));

    ArchiveListing { archives: groups }
}

/// Resolve a requested file name inside the archive directory. Rejects
/// anything that could escape the directory or is not a CSV.
pub fn resolve_archive(dir: &Path, name: &str) -> Option<PathBuf> {
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return None;
    }
    if !name.ends_with(".csv") {
        return None;
    }
    let path = dir.join(name);
    path.is_file().then_some(path)
}
