//! Utilities shared by the drivers: input lists, JSON
//! output and removal of unfinished outputs.

use anyhow::Context;
use cwchunk::Result;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

pub fn print_json<T: Serialize>(json: &T) -> Result<()> {
    let writer = std::io::BufWriter::new(std::io::stdout());
    serde_json::to_writer_pretty(writer, json)?;
    println!();
    Ok(())
}

/// Input file names, one per line, from a reader. Blank
/// lines are skipped.
pub fn parse_input_list<R: Read>(reader: R) -> Result<Vec<PathBuf>> {
    let mut inputs = vec![];
    for line in BufReader::new(reader).lines() {
        let line = line?;
        let name = line.trim();
        if !name.is_empty() {
            inputs.push(PathBuf::from(name));
        }
    }
    Ok(inputs)
}

/// Read an input list from a file, or from standard input if
/// the name is `-`.
pub fn read_input_list(name: &str) -> Result<Vec<PathBuf>> {
    if name == "-" {
        parse_input_list(std::io::stdin().lock()).context("reading input list from standard input")
    } else {
        let file = File::open(name).with_context(|| format!("opening input list {}", name))?;
        parse_input_list(file).with_context(|| format!("reading input list {}", name))
    }
}

/// The command line, for dataset histories.
pub fn command_line() -> String {
    std::env::args().collect::<Vec<_>>().join(" ")
}

/// Deletes the files it holds when dropped, unless disarmed
/// first. Drivers schedule their outputs at the start of a
/// run and disarm once it has fully succeeded.
#[derive(Debug, Default)]
pub struct CleanupGuard {
    paths: Vec<PathBuf>,
}

impl CleanupGuard {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn schedule(&mut self, path: &Path) {
        self.paths.push(path.into());
    }

    pub fn disarm(mut self) {
        self.paths.clear();
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            if path.exists() {
                tracing::debug!("removing unfinished output {}", path.display());
                if let Err(e) = std::fs::remove_file(&path) {
                    eprintln!("Warning: couldn't remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn input_lists() {
        let text = "a.cw\n  b.cw \n\n/data/c.cw\n";
        let inputs = parse_input_list(text.as_bytes()).unwrap();
        assert_eq!(inputs, vec![PathBuf::from("a.cw"), "b.cw".into(), "/data/c.cw".into()]);
    }

    #[test]
    fn cleanup_unless_disarmed() {
        let tmp_dir = TempDir::new("cw_tools_test").unwrap();
        let (a, b) = (tmp_dir.path().join("a.cw"), tmp_dir.path().join("b.cw"));
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        {
            let mut guard = CleanupGuard::new();
            guard.schedule(&a);
            guard.schedule(&tmp_dir.path().join("never_written.cw"));
        }
        assert!(!a.exists());

        let mut guard = CleanupGuard::new();
        guard.schedule(&b);
        guard.disarm();
        assert!(b.exists());
    }
}
