//! Destination naming and file placement.
//!
//! Turns a download unit into a path using a template such as
//! `{artist_name}/{album_name}/{track_number} - {track_title}`, promotes a
//! finished `.part` file into place, and writes M3U playlist files.
//!
//! Template variables: `{artist_name}`, `{album_name}`, `{album_year}`,
//! `{track_number}`, `{disc_number}`, `{track_title}`, `{explicit}`.
//! Unknown or empty variables are removed.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::model::DownloadUnit;

/// Longest file name component kept after sanitizing.
const MAX_COMPONENT_LEN: usize = 250;

/// Suffix of in-progress files.
pub const PART_SUFFIX: &str = "part";

/// Make a string safe to use as a single path component.
///
/// Replaces `<>:"/\|?*` with `_`, drops control characters, trims spaces
/// and dots from both ends, and caps the length (keeping a short extension).
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }
    truncate_component(trimmed)
}

fn truncate_component(name: &str) -> String {
    if name.chars().count() <= MAX_COMPONENT_LEN {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() && ext.chars().count() <= 10 => {
            let keep = MAX_COMPONENT_LEN - ext.chars().count() - 1;
            format!("{}.{}", stem.chars().take(keep).collect::<String>(), ext)
        }
        _ => name.chars().take(MAX_COMPONENT_LEN).collect(),
    }
}

/// Substitute `{key}` placeholders, sanitizing every value.
///
/// Leftover placeholders are dropped, repeated separators collapse, and
/// empty components disappear. The result is relative.
pub fn format_path(template: &str, vars: &[(&str, Option<String>)]) -> PathBuf {
    let mut formatted = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("{{{key}}}");
        if !formatted.contains(&placeholder) {
            continue;
        }
        let value = value
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(sanitize_filename)
            .unwrap_or_default();
        formatted = formatted.replace(&placeholder, &value);
    }

    let formatted = strip_placeholders(&formatted);
    formatted
        .split(['/', '\\'])
        .map(|part| part.trim_matches(|c| c == ' ' || c == '.'))
        .filter(|part| !part.is_empty())
        .collect()
}

fn strip_placeholders(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(open) = rest.find('{') {
        match rest[open..].find('}') {
            Some(close) if !rest[open + 1..open + close].contains('{') => {
                out.push_str(&rest[..open]);
                rest = &rest[open + close + 1..];
            }
            _ => {
                out.push_str(&rest[..=open]);
                rest = &rest[open + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Destination of a unit without extension (the codec decides it later).
pub fn track_stem(root: &Path, template: &str, unit: &DownloadUnit) -> PathBuf {
    let track = &unit.track;
    let track_number = if track.track_number > 0 {
        format!("{:02}", track.track_number)
    } else {
        "00".to_string()
    };
    let vars = [
        ("artist_name", Some(unit.context.artist_name.clone())),
        ("album_name", Some(unit.context.album_title.clone())),
        ("album_year", unit.context.release_year.map(|y| y.to_string())),
        ("track_number", Some(track_number)),
        ("disc_number", Some(track.disc_number.to_string())),
        ("track_title", Some(track.formatted_title())),
        ("explicit", track.explicit.then(|| "[E]".to_string())),
    ];
    let relative = format_path(template, &vars);
    if relative.as_os_str().is_empty() {
        root.join(sanitize_filename(&track.id))
    } else {
        root.join(relative)
    }
}

/// Append `.{ext}` to a path without touching dots already in its name.
pub fn with_appended_extension(path: &Path, ext: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

/// In-progress path for a stem.
pub fn part_path(stem: &Path) -> PathBuf {
    with_appended_extension(stem, PART_SUFFIX)
}

/// Move a finished temp file to its final path.
///
/// Renames when possible. Across devices, copies into `<final>.part` next to
/// the destination and renames that, so the final path never holds a
/// partial file.
pub fn promote(temp: &Path, destination: &Path) -> io::Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::rename(temp, destination).is_ok() {
        return Ok(());
    }

    let staging = with_appended_extension(destination, PART_SUFFIX);
    fs::copy(temp, &staging)?;
    fs::File::open(&staging)?.sync_all()?;
    fs::rename(&staging, destination)?;
    let _ = fs::remove_file(temp);
    Ok(())
}

/// Remove a leftover temp file, ignoring a missing one.
pub fn discard(temp: &Path) {
    match fs::remove_file(temp) {
        Ok(()) => tracing::debug!(path = %temp.display(), "Removed partial file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %temp.display(), error = %e, "Failed to remove partial file"),
    }
}

/// One line of an M3U playlist.
#[derive(Debug, Clone)]
pub struct M3uEntry {
    pub duration_secs: u32,
    pub artist: String,
    pub title: String,
    pub path: PathBuf,
}

/// Write an extended M3U file atomically.
///
/// Entry paths are written relative to `root` when they live under it.
pub fn write_m3u(file: &Path, root: &Path, entries: &[M3uEntry]) -> io::Result<()> {
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp = with_appended_extension(file, "tmp");
    {
        let mut out = io::BufWriter::new(fs::File::create(&temp)?);
        writeln!(out, "#EXTM3U")?;
        for entry in entries {
            let rel = entry.path.strip_prefix(root).unwrap_or(&entry.path);
            writeln!(out, "#EXTINF:{},{} - {}", entry.duration_secs, entry.artist, entry.title)?;
            writeln!(out, "{}", rel.display())?;
        }
        out.flush()?;
        out.get_ref().sync_all()?;
    }
    fs::rename(&temp, file)
}
