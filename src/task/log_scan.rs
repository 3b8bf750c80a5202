//! Per-task log file: append-only, header and footer around the child's output.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Duration;

use crate::error::TaskError;

const RULE: &str = "****************************************************************";

/// Open `path` for appending, creating parent directories.
pub fn open_log(path: &Path) -> Result<File, TaskError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| TaskError::io(path, e))
}

pub fn write_header(log: &mut File, command: &str, workdir: &Path) -> std::io::Result<()> {
    writeln!(log, "{RULE}")?;
    writeln!(log, "START DATE: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(log, "COMMAND: {command}")?;
    writeln!(log, "WORKING DIR: {}", workdir.display())?;
    writeln!(log, "{RULE}")?;
    log.flush()
}

pub fn write_footer(log: &mut File, elapsed: Duration, exit: &str) -> std::io::Result<()> {
    writeln!(log, "{RULE}")?;
    writeln!(log, "END DATE: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(log, "EXIT: {exit}")?;
    writeln!(log, "ELAPSED: {:.1} s", elapsed.as_secs_f64())?;
    writeln!(log, "{RULE}")?;
    log.flush()
}

/// First of `phrases` appearing in the log after byte `from`, if any. Used for tools that
/// report some failures only in their output, not their exit status.
pub fn find_failure_phrase(
    path: &Path,
    phrases: &[String],
    from: u64,
) -> Result<Option<String>, TaskError> {
    if phrases.is_empty() {
        return Ok(None);
    }
    let mut file = File::open(path).map_err(|e| TaskError::io(path, e))?;
    file.seek(SeekFrom::Start(from))
        .map_err(|e| TaskError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| TaskError::io(path, e))?;
        if n == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&buf);
        if let Some(p) = phrases.iter().find(|p| line.contains(p.as_str())) {
            return Ok(Some(p.clone()));
        }
    }
}
