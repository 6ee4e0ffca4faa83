//! Transaction log: an append-only, persisted journal of one `link` run,
//! replayable in reverse to undo partial effects on failure or after a
//! crash.

use std::fs;
use std::path::{Path, PathBuf};

use tanmi_schema::{CoreError, Operation, TransactionRecord};

/// A single in-flight transaction, backed by a JSON file under
/// `<configDir>/.tx/<random-id>.json`.
#[derive(Debug)]
pub struct Transaction {
    path: PathBuf,
    records: Vec<TransactionRecord>,
}

impl Transaction {
    /// Open a new transaction, writing its (initially empty) record array
    /// to disk so an orphan check can find it even before the first
    /// append.
    pub fn open(tx_dir: &Path) -> Result<Self, CoreError> {
        fs::create_dir_all(tx_dir)?;
        let id = random_id();
        let path = tx_dir.join(format!("{id}.json"));
        let tx = Self { path, records: Vec::new() };
        tx.persist()?;
        tracing::debug!(path = %tx.path.display(), "opened transaction");
        Ok(tx)
    }

    /// Append a record and persist the full log immediately (fsync-class
    /// write), bounding the in-flight work visible for crash recovery.
    pub fn append(&mut self, record: TransactionRecord) -> Result<(), CoreError> {
        self.records.push(record);
        self.persist()
    }

    fn persist(&self) -> Result<(), CoreError> {
        let json = serde_json::to_vec(&self.records)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json)?;
        fs::rename(&tmp, &self.path)?;
        if let Ok(file) = fs::File::open(&self.path) {
            let _ = file.sync_all();
        }
        Ok(())
    }

    /// Commit: remove the log file. Called after every effect has also been
    /// durably reflected in the registry.
    pub fn commit(self) -> Result<(), CoreError> {
        tracing::debug!(path = %self.path.display(), "committing transaction");
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// Roll back: replay every record in strict reverse order, applying
    /// each one's inverse best-effort, then remove the log file. Returns
    /// `Ok(())` even if individual inverse steps failed — those are logged
    /// as warnings; the caller is responsible for surfacing that the
    /// rollback was not fully clean via the returned `bool`.
    pub fn rollback(self) -> Result<bool, CoreError> {
        tracing::warn!(path = %self.path.display(), steps = self.records.len(), "rolling back transaction");
        let clean = replay_reverse(&self.records);
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(clean)
    }
}

fn replay_reverse(records: &[TransactionRecord]) -> bool {
    let mut clean = true;
    for record in records.iter().rev() {
        let inverse = record.inverse();
        if let Err(e) = apply_inverse(&inverse) {
            clean = false;
            tracing::warn!(error = %e, "failed to apply inverse transaction step");
        }
    }
    clean
}

fn apply_inverse(record: &TransactionRecord) -> Result<(), CoreError> {
    let source = Path::new(&record.source);
    let target = Path::new(&record.target);
    match record.operation {
        Operation::Unlink => {
            if crate::linker::is_symlink(source) {
                if source.is_dir() {
                    fs::remove_dir(source)?;
                } else {
                    fs::remove_file(source)?;
                }
            }
            Ok(())
        }
        Operation::Link => {
            if crate::linker::is_symlink(source) || source.exists() {
                Ok(())
            } else {
                crate::linker::link(target, source)
            }
        }
        Operation::Replace => {
            if crate::linker::is_symlink(source) {
                if source.is_dir() {
                    fs::remove_dir(source)?;
                } else {
                    fs::remove_file(source)?;
                }
            }
            Ok(())
        }
        Operation::Absorb => {
            if source.exists() && !target.exists() {
                fs::rename(source, target).or_else(|_| {
                    fs_extra::dir::move_dir(source, target, &fs_extra::dir::CopyOptions::new())
                        .map(|_| ())
                        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
                })?;
            }
            Ok(())
        }
    }
}

/// Scan `tx_dir` for an orphan transaction file (left behind by a killed
/// process) and roll it back before a new run begins. There should be at
/// most one, since the process-global lock prevents concurrent runs in
/// normal operation; if more than one is found (e.g. from manual
/// tampering), each is rolled back in file-name order.
pub fn recover_orphans(tx_dir: &Path) -> Result<Vec<bool>, CoreError> {
    if !tx_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<PathBuf> = fs::read_dir(tx_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    paths.sort();

    let mut outcomes = Vec::new();
    for path in paths {
        let raw = fs::read_to_string(&path)?;
        let records: Vec<TransactionRecord> = serde_json::from_str(&raw)?;
        tracing::warn!(path = %path.display(), steps = records.len(), "recovering orphan transaction");
        let clean = replay_reverse(&records);
        fs::remove_file(&path)?;
        outcomes.push(clean);
    }
    Ok(outcomes)
}

fn random_id() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    (0..16).map(|_| format!("{:x}", rng.random_range(0..16))).collect()
}
