//! Input/output for GUGA-CI.
//!
//! The only file format the core owns is the line-delimited CSF list: one
//! step-vector digit string per line, blank lines ignored. Everything else
//! (integral files, basis sets) belongs to the surrounding application.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{self, format_err};
use indexmap::IndexMap;

use crate::csf::{occupation_of_step_vector, parse_step_vector};

pub(crate) mod format;

/// Reads a line-delimited CSF file and groups the step vectors by their
/// underlying occupation-number vectors, preserving the order of first
/// appearance of each configuration.
///
/// # Errors
///
/// Errors when the file cannot be read or a line contains a malformed step
/// vector.
pub fn read_csfs_file(path: impl AsRef<Path>) -> Result<Vec<(Vec<u8>, Vec<Vec<u8>>)>, anyhow::Error> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|err| format_err!("Unable to open the CSF file `{}`: {err}", path.display()))?;
    let lines = BufReader::new(file)
        .lines()
        .collect::<Result<Vec<String>, _>>()
        .map_err(|err| format_err!("Unable to read the CSF file `{}`: {err}", path.display()))?;
    group_csf_lines(&lines)
}

/// Groups CSF digit strings by their underlying occupation-number vectors,
/// preserving the order of first appearance of each configuration and dropping
/// duplicate step vectors.
pub fn group_csf_lines(lines: &[String]) -> Result<Vec<(Vec<u8>, Vec<Vec<u8>>)>, anyhow::Error> {
    let mut grouped: IndexMap<Vec<u8>, Vec<Vec<u8>>> = IndexMap::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let csf = parse_step_vector(trimmed)?;
        let occ = occupation_of_step_vector(&csf);
        let csfs = grouped.entry(occ).or_default();
        if !csfs.contains(&csf) {
            csfs.push(csf);
        }
    }
    Ok(grouped.into_iter().collect())
}
