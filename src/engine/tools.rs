//! Path, glob and input-file helpers

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::FatalError;

/// Simple glob pattern matching (supports * and ?)
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let mut pattern_chars = pattern.chars().peekable();
    let mut text_chars = text.chars().peekable();

    while let Some(&p) = pattern_chars.peek() {
        match p {
            '*' => {
                pattern_chars.next();
                if pattern_chars.peek().is_none() {
                    return true;
                }
                let rest: String = pattern_chars.clone().collect();
                loop {
                    if glob_match(&rest, &text_chars.clone().collect::<String>()) {
                        return true;
                    }
                    if text_chars.next().is_none() {
                        return false;
                    }
                }
            }
            '?' => {
                pattern_chars.next();
                if text_chars.next().is_none() {
                    return false;
                }
            }
            _ => {
                pattern_chars.next();
                if text_chars.next() != Some(p) {
                    return false;
                }
            }
        }
    }

    text_chars.peek().is_none()
}

/// Files directly in `dir` whose name matches `pattern`, sorted by name.
pub fn list_matching(dir: &Path, pattern: &str) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| glob_match(pattern, &e.file_name().to_string_lossy()))
        .map(|e| e.into_path())
        .collect();
    out.sort();
    out
}

/// Expand an observation path or glob (wildcards in the file name only).
pub fn expand_observation_glob(pattern: &str) -> Result<Vec<PathBuf>, FatalError> {
    let path = Path::new(pattern);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !name.contains(['*', '?']) {
        return Ok(vec![path.to_path_buf()]);
    }
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let files = list_matching(dir, &name);
    if files.is_empty() {
        return Err(FatalError::NoInputs(pattern.to_string()));
    }
    Ok(files)
}

/// Input must exist and be non-empty.
pub fn check_input_file(path: &Path) -> Result<(), FatalError> {
    match std::fs::metadata(path) {
        Err(_) => Err(FatalError::MissingInput(path.to_path_buf())),
        Ok(m) if m.len() == 0 => Err(FatalError::EmptyInput(path.to_path_buf())),
        Ok(_) => Ok(()),
    }
}
