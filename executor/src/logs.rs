//! Captured-output helpers

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Read the last `n` lines of a capture file
///
/// Missing files read as empty: a workload that produced no output has
/// no capture file yet.
pub fn tail_lines(path: &Path, n: usize) -> io::Result<Vec<String>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut tail: VecDeque<String> = VecDeque::with_capacity(n);
    for line in BufReader::new(file).lines() {
        let line = line?;
        if tail.len() == n {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    Ok(tail.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_tail_returns_last_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.log");
        let mut file = File::create(&path).unwrap();
        for i in 0..10 {
            writeln!(file, "line-{}", i).unwrap();
        }

        let tail = tail_lines(&path, 3).unwrap();
        assert_eq!(tail, vec!["line-7", "line-8", "line-9"]);
    }

    #[test]
    fn test_tail_of_short_file_returns_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.log");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "only").unwrap();

        assert_eq!(tail_lines(&path, 100).unwrap(), vec!["only"]);
    }

    #[test]
    fn test_tail_of_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tail = tail_lines(&dir.path().join("absent.log"), 5).unwrap();
        assert!(tail.is_empty());
    }
}
