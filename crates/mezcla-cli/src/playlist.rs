//! Playlist expansion.
//!
//! Filenames ending in `.m3u` or `.pls` stand for lists of inputs and are
//! expanded recursively. Entries inherit the file options that preceded the
//! playlist on the command line. Relative entries resolve against the
//! playlist's own directory; absolute paths and URIs pass through.

use crate::opts::FileSpec;
use std::path::Path;

/// True for filenames that name a playlist rather than audio.
pub fn is_playlist(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".m3u") || lower.ends_with(".pls")
}

/// True for entries that look like URIs and must not be resolved against
/// the playlist directory.
fn is_uri(name: &str) -> bool {
    match name.split_once("://") {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "+.-".contains(c))
        }
        None => false,
    }
}

/// Expand the playlist at `path` into `out`, copying `template`'s file
/// options onto every entry. Nested playlists expand recursively.
pub fn expand(template: &FileSpec, path: &str, out: &mut Vec<FileSpec>) -> Result<(), String> {
    let is_pls = path.to_ascii_lowercase().ends_with(".pls");
    let comment_char = if is_pls { ';' } else { '#' };

    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("can't open playlist file `{path}': {e}"))?;
    let dirname = Path::new(path)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    for line in text.lines() {
        let line = match line.find(comment_char) {
            Some(pos) => &line[..pos],
            None => line,
        };
        let mut entry = line.trim();
        if entry.is_empty() {
            continue;
        }
        if is_pls {
            // Only `FileN=PATH` lines carry entries.
            let lower = entry.to_ascii_lowercase();
            if !lower.starts_with("file") {
                continue;
            }
            let digits_end = entry[4..]
                .find(|c: char| !c.is_ascii_digit())
                .map(|p| 4 + p);
            match digits_end {
                Some(pos) if entry[4..pos].chars().any(|c| c.is_ascii_digit())
                    && entry.as_bytes().get(pos) == Some(&b'=') =>
                {
                    entry = entry[pos + 1..].trim();
                }
                _ => continue,
            }
            if entry.is_empty() {
                continue;
            }
        }

        let resolved = if dirname.is_empty()
            || is_uri(entry)
            || entry.starts_with('/')
        {
            entry.to_string()
        } else {
            format!("{dirname}/{entry}")
        };

        if is_playlist(&resolved) {
            expand(template, &resolved, out)?;
        } else {
            let mut f = template.clone();
            f.path = resolved;
            out.push(f);
        }
    }
    Ok(())
}
