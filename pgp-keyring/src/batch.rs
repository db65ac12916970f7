//! Batch import of multi-keyring streams.

use crate::armor;
use crate::canonicalize::{canonicalize_with, CanonicalizeOptions};
use crate::error::Result;
use crate::keyring::{CanonicalizedKeyRing, KeyRingIterator, RawKeyRing};
use crate::oplog::{LogType, OperationLog};
use crate::{log_debug, log_info, log_warn};
use pgp_common::compact_ids::short_key_label;
use pgp_common::logging::Component;
use std::io::Read;

/// Receives `(done, total)` after each keyring of a batch.
pub trait Progress {
    fn progress(&mut self, done: usize, total: usize);
}

impl<F: FnMut(usize, usize)> Progress for F {
    fn progress(&mut self, done: usize, total: usize) {
        self(done, total)
    }
}

/// Read a whole keyring stream from `reader`.
pub fn read_all(mut reader: impl Read) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Merge two copies of one keyring, logging the outcome.
pub fn merge(ours: &RawKeyRing, theirs: &RawKeyRing, log: &mut OperationLog) -> Option<RawKeyRing> {
    match ours.merge(theirs) {
        Ok(merged) => {
            let label = merged
                .fingerprint()
                .map(|f| short_key_label(f.as_bytes()))
                .unwrap_or_default();
            log.add_with(LogType::MergeSuccess, label);
            Some(merged)
        }
        Err(err) => {
            log.add_with(LogType::MergeFingerprintMismatch, err.to_string());
            None
        }
    }
}

/// Canonicalize every keyring in a binary or armored stream with default
/// options.
///
/// See [`canonicalize_all_with`].
pub fn canonicalize_all(
    bytes: &[u8],
    progress: &mut dyn Progress,
    log: &mut OperationLog,
) -> Result<(Vec<CanonicalizedKeyRing>, usize)> {
    canonicalize_all_with(bytes, &CanonicalizeOptions::default(), progress, log)
}

/// Canonicalize every keyring in a binary or armored stream.
///
/// Copies of the same keyring are merged first. Rings that fail to
/// canonicalize are logged and counted; the rest are returned in stream
/// order. Only an undecodable stream is an error.
pub fn canonicalize_all_with(
    bytes: &[u8],
    options: &CanonicalizeOptions,
    progress: &mut dyn Progress,
    log: &mut OperationLog,
) -> Result<(Vec<CanonicalizedKeyRing>, usize)> {
    let logger = log.component_logger(Component::Batch, "import");
    let binary = armor::dearmor_if_needed(bytes)?;

    let mut raws: Vec<RawKeyRing> = Vec::new();
    for ring in KeyRingIterator::new(&binary) {
        let ring = ring?;
        let existing = raws
            .iter()
            .position(|r| r.fingerprint().is_some() && r.fingerprint() == ring.fingerprint());
        match existing {
            Some(i) => {
                if let Some(merged) = merge(&raws[i], &ring, log) {
                    raws[i] = merged;
                }
            }
            None => raws.push(ring),
        }
    }

    let total = raws.len();
    log.add_with(LogType::BatchStart, total.to_string());
    log_info!(logger, "importing {total} keyrings");

    let mut rings = Vec::with_capacity(total);
    let mut failed = 0;
    for (i, raw) in raws.iter().enumerate() {
        let label = raw
            .fingerprint()
            .map(|f| short_key_label(f.as_bytes()))
            .unwrap_or_else(|| format!("#{i}"));
        let mut ring_log = OperationLog::new();
        match canonicalize_with(raw, options, &mut ring_log) {
            Ok(ring) => {
                log_debug!(logger, "{label}: {} packets", ring.packets().len());
                rings.push(ring);
            }
            Err(err) => {
                log_warn!(logger, "{label}: {err}");
                log.add_with(LogType::BatchRingFailed, label);
                failed += 1;
            }
        }
        progress.progress(i + 1, total);
    }

    log.add_with(LogType::BatchSuccess, format!("{} ok, {failed} failed", rings.len()));
    Ok((rings, failed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_all_collects_reader() {
        let bytes = read_all(Cursor::new(vec![1u8, 2, 3])).unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_stream_imports_nothing() {
        let mut reports = Vec::new();
        let mut log = OperationLog::new();
        let (rings, failed) = canonicalize_all(
            &[],
            &mut |done: usize, total: usize| reports.push((done, total)),
            &mut log,
        )
        .unwrap();
        assert!(rings.is_empty());
        assert_eq!(failed, 0);
        assert!(reports.is_empty());
        assert!(log.contains(LogType::BatchSuccess));
    }
}
