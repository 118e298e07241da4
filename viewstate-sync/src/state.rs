//! Run history: every applied sync is recorded with file hashes and a copy of the
//! original source so it can be listed and reverted later.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

pub const STATE_DIR_ENV: &str = "VIEWSTATE_SYNC_STATE_DIR";
pub const LOCAL_STATE_DIR: &str = ".viewstate-sync";

/// Short unique run ID (7 hex characters, like git).
pub fn generate_run_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let hash = blake3::hash(&timestamp.to_le_bytes());
    hash.to_hex().as_str()[..7].to_string()
}

/// Resolves the state directory.
///
/// Priority order:
/// 1. `VIEWSTATE_SYNC_STATE_DIR`
/// 2. `--local-state` (uses `./.viewstate-sync`)
/// 3. The per-user data directory
pub fn get_state_dir(local: bool) -> Result<PathBuf> {
    if let Ok(custom_dir) = std::env::var(STATE_DIR_ENV) {
        return Ok(PathBuf::from(custom_dir));
    }

    if local {
        let current_dir = std::env::current_dir()?;
        Ok(current_dir.join(LOCAL_STATE_DIR))
    } else {
        let proj_dirs = ProjectDirs::from("com", "viewstate-sync", "viewstate-sync")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }
}

/// blake3 hash of a file's contents.
pub fn hash_file(path: &Path) -> Result<String> {
    let content = fs::read(path)
        .with_context(|| format!("Failed to read file for hashing: {}", path.display()))?;
    Ok(hash_content(&content))
}

pub fn hash_content(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// A member added to the proxy object by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertedMember {
    pub property: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileModification {
    pub path: PathBuf,
    pub hash_before: String,
    pub hash_after: String,
    /// Copy of the original source, relative to the run's backup directory.
    pub backup_file: PathBuf,
    pub inserted: Vec<InsertedMember>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Applied,
    Reverted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub operation: String,
    pub files_modified: Vec<FileModification>,
    pub status: RunStatus,
    pub can_revert: bool,
}

impl RunMetadata {
    pub fn new(command: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            run_id: generate_run_id(),
            timestamp: Utc::now(),
            command: command.into(),
            operation: operation.into(),
            files_modified: Vec::new(),
            status: RunStatus::Applied,
            can_revert: true,
        }
    }

    pub fn inserted_count(&self) -> usize {
        self.files_modified.iter().map(|f| f.inserted.len()).sum()
    }
}

/// Index of all runs, kept in `runs.json`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunsIndex {
    pub runs: HashMap<String, RunMetadata>,
}

impl RunsIndex {
    pub fn load(state_dir: &Path) -> Result<Self> {
        let index_path = state_dir.join("runs.json");
        if !index_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&index_path).context("Failed to read runs index")?;
        let index: RunsIndex = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse runs index: {}", e))?;
        Ok(index)
    }

    /// Loads the index, starting over when the file is from an incompatible version.
    pub fn load_or_reset(state_dir: &Path) -> Result<Self> {
        match Self::load(state_dir) {
            Ok(index) => Ok(index),
            Err(e) if e.to_string().contains("missing field") => {
                warn!(
                    "Incompatible state format in {}; resetting",
                    state_dir.display()
                );
                if state_dir.exists() {
                    fs::remove_dir_all(state_dir).context("Failed to remove old state directory")?;
                }
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, state_dir: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        write_atomic(state_dir, "runs.json", &content)
    }

    pub fn add_run(&mut self, run: RunMetadata) {
        self.runs.insert(run.run_id.clone(), run);
    }

    pub fn get_run(&self, run_id: &str) -> Option<&RunMetadata> {
        self.runs.get(run_id)
    }

    /// Newest first.
    pub fn get_sorted_runs(&self) -> Vec<&RunMetadata> {
        let mut runs: Vec<_> = self.runs.values().collect();
        runs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        runs
    }
}

fn write_atomic(dir: &Path, file_name: &str, content: &str) -> Result<()> {
    fs::create_dir_all(dir)?;
    let temp_path = dir.join(format!("{}.tmp", file_name));
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    drop(file);

    fs::rename(temp_path, dir.join(file_name))?;
    Ok(())
}

/// Flattens a path into a single file name: `src/a/B.kt` becomes `src_a_B.kt`.
fn backup_name(file_path: &Path) -> String {
    file_path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// Stores the original content of `file_path` under the run's backup directory and
/// returns the backup's name relative to that directory.
pub fn save_backup(
    file_path: &Path,
    original: &str,
    run_id: &str,
    state_dir: &Path,
) -> Result<PathBuf> {
    let backup_dir = state_dir.join(run_id);
    fs::create_dir_all(&backup_dir)?;

    let name = PathBuf::from(format!("{}.orig", backup_name(file_path)));
    fs::write(backup_dir.join(&name), original)
        .with_context(|| format!("Failed to back up {}", file_path.display()))?;
    debug!("Backed up {} as {}", file_path.display(), name.display());
    Ok(name)
}

/// Records a file rewritten by `run`: backs up `original` and hashes both versions.
pub fn record_modification(
    run: &mut RunMetadata,
    file_path: &Path,
    original: &str,
    modified: &str,
    inserted: Vec<InsertedMember>,
    state_dir: &Path,
) -> Result<()> {
    let backup_file = save_backup(file_path, original, &run.run_id, state_dir)?;
    run.files_modified.push(FileModification {
        path: file_path.to_path_buf(),
        hash_before: hash_content(original.as_bytes()),
        hash_after: hash_content(modified.as_bytes()),
        backup_file,
        inserted,
    });
    Ok(())
}

pub fn save_run_metadata(run: &RunMetadata, state_dir: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(run)?;
    write_atomic(state_dir, &format!("{}.json", run.run_id), &content)?;

    let mut index = RunsIndex::load(state_dir)?;
    index.add_run(run.clone());
    index.save(state_dir)?;

    Ok(())
}

pub fn load_run_metadata(run_id: &str, state_dir: &Path) -> Result<RunMetadata> {
    let metadata_path = state_dir.join(format!("{}.json", run_id));

    if !metadata_path.exists() {
        bail!("Run {} not found", run_id);
    }

    let content = fs::read_to_string(&metadata_path).context("Failed to read run metadata")?;
    let metadata: RunMetadata =
        serde_json::from_str(&content).context("Failed to parse run metadata")?;
    Ok(metadata)
}

/// Restores every file of a run from its backup.
///
/// Unless `force` is set, refuses when a file changed after the run.
pub fn revert_run(run_id: &str, force: bool, state_dir: &Path) -> Result<()> {
    let mut run = load_run_metadata(run_id, state_dir)?;

    if run.status == RunStatus::Reverted {
        bail!("Run {} has already been reverted", run_id);
    }
    if !run.can_revert {
        bail!("Run {} cannot be reverted", run_id);
    }

    if !force {
        for file in &run.files_modified {
            if !file.path.exists() {
                bail!("File {} no longer exists (use --force to ignore)", file.path.display());
            }

            let current_hash = hash_file(&file.path)?;
            if current_hash != file.hash_after {
                bail!(
                    "File {} has changed since run {} (use --force to ignore)\nExpected hash: {}\nCurrent hash: {}",
                    file.path.display(),
                    run_id,
                    file.hash_after,
                    current_hash
                );
            }
        }
    }

    println!("Reverting {} file(s)...", run.files_modified.len());
    let backup_dir = state_dir.join(run_id);
    for file in &run.files_modified {
        let backup_path = backup_dir.join(&file.backup_file);
        let original = fs::read_to_string(&backup_path)
            .with_context(|| format!("Missing backup {}", backup_path.display()))?;
        fs::write(&file.path, original)
            .with_context(|| format!("Failed to write restored file: {}", file.path.display()))?;
        println!("  ✓ Restored: {}", file.path.display());
    }

    run.status = RunStatus::Reverted;
    run.can_revert = false;
    save_run_metadata(&run, state_dir)?;

    println!("✓ Run {} reverted successfully", run_id);
    Ok(())
}

pub fn show_history(limit: usize, state_dir: &Path) -> Result<()> {
    let index = RunsIndex::load_or_reset(state_dir)?;
    let runs = index.get_sorted_runs();

    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    println!("Recent runs (showing up to {}):\n", limit);

    for run in runs.iter().take(limit) {
        let status_str = match run.status {
            RunStatus::Applied if run.can_revert => "[can revert]",
            RunStatus::Applied => "[applied]",
            RunStatus::Reverted => "[reverted]",
        };

        let files_str = if run.files_modified.len() == 1 {
            "1 file".to_string()
        } else {
            format!("{} files", run.files_modified.len())
        };

        println!(
            "{}  {}  {:20}  {:10}  {:3} added  {}",
            run.run_id,
            run.timestamp.format("%Y-%m-%d %H:%M"),
            truncate_str(&run.operation, 20),
            files_str,
            run.inserted_count(),
            status_str
        );
    }

    Ok(())
}

/// Deletes runs older than `keep_days` together with their backups.
/// Returns the number of runs removed.
pub fn clean_old_state(keep_days: u32, state_dir: &Path) -> Result<usize> {
    let index = RunsIndex::load_or_reset(state_dir)?;
    let cutoff = Utc::now() - Duration::days(i64::from(keep_days));

    let mut cleaned = 0;
    let mut new_index = RunsIndex::default();

    for run in index.runs.into_values() {
        if run.timestamp < cutoff {
            let backup_dir = state_dir.join(&run.run_id);
            if backup_dir.exists() {
                fs::remove_dir_all(&backup_dir)?;
            }

            let metadata_path = state_dir.join(format!("{}.json", run.run_id));
            if metadata_path.exists() {
                fs::remove_file(&metadata_path)?;
            }

            cleaned += 1;
        } else {
            new_index.add_run(run);
        }
    }

    new_index.save(state_dir)?;
    Ok(cleaned)
}

fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_run_id() {
        let id1 = generate_run_id();
        let id2 = generate_run_id();

        assert_eq!(id1.len(), 7);
        assert_eq!(id2.len(), 7);
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_hash_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let file_path = temp_dir.path().join("State.kt");

        fs::write(&file_path, "class State")?;
        let hash1 = hash_file(&file_path)?;
        assert_eq!(hash1, hash_content(b"class State"));

        fs::write(&file_path, "class State {}")?;
        assert_ne!(hash1, hash_file(&file_path)?);

        Ok(())
    }

    #[test]
    fn test_backup_name() {
        assert_eq!(backup_name(Path::new("src/feed/FeedContract.kt")), "src_feed_FeedContract.kt");
        assert_eq!(backup_name(Path::new("/abs/A.kt")), "abs_A.kt");
    }

    #[test]
    fn test_runs_index() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let state_dir = temp_dir.path().join("state");

        let mut run = RunMetadata::new("sync --all", "sync-all");
        run.run_id = "abc1234".to_string();
        save_run_metadata(&run, &state_dir)?;

        let loaded = load_run_metadata("abc1234", &state_dir)?;
        assert_eq!(loaded.operation, "sync-all");
        assert_eq!(loaded.status, RunStatus::Applied);

        let index = RunsIndex::load(&state_dir)?;
        assert_eq!(index.runs.len(), 1);
        assert!(index.get_run("abc1234").is_some());
        assert!(load_run_metadata("missing", &state_dir).is_err());

        Ok(())
    }

    #[test]
    fn test_revert_restores_original() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let state_dir = temp_dir.path().join("state");
        let file_path = temp_dir.path().join("FeedContract.kt");

        let original = "class FeedPresenter {\n}\n";
        let modified = "class FeedPresenter {\n    val a = 1\n}\n";
        fs::write(&file_path, modified)?;

        let mut run = RunMetadata::new("sync", "sync a");
        let inserted = vec![InsertedMember {
            property: "a".to_string(),
            line: 2,
            column: 5,
        }];
        record_modification(&mut run, &file_path, original, modified, inserted, &state_dir)?;
        save_run_metadata(&run, &state_dir)?;
        assert_eq!(run.inserted_count(), 1);

        revert_run(&run.run_id, false, &state_dir)?;
        assert_eq!(fs::read_to_string(&file_path)?, original);

        let reverted = load_run_metadata(&run.run_id, &state_dir)?;
        assert_eq!(reverted.status, RunStatus::Reverted);
        assert!(!reverted.can_revert);
        assert!(revert_run(&run.run_id, false, &state_dir).is_err());

        Ok(())
    }

    #[test]
    fn test_revert_refuses_changed_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let state_dir = temp_dir.path().join("state");
        let file_path = temp_dir.path().join("A.kt");

        let mut run = RunMetadata::new("sync", "sync a");
        record_modification(&mut run, &file_path, "old\n", "new\n", vec![], &state_dir)?;
        save_run_metadata(&run, &state_dir)?;

        fs::write(&file_path, "edited by hand\n")?;
        assert!(revert_run(&run.run_id, false, &state_dir).is_err());

        revert_run(&run.run_id, true, &state_dir)?;
        assert_eq!(fs::read_to_string(&file_path)?, "old\n");

        Ok(())
    }

    #[test]
    fn test_clean_old_state() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let state_dir = temp_dir.path().join("state");

        let mut old = RunMetadata::new("sync", "old");
        old.run_id = "0000001".to_string();
        old.timestamp = Utc::now() - Duration::days(40);
        save_backup(Path::new("A.kt"), "x", &old.run_id, &state_dir)?;
        save_run_metadata(&old, &state_dir)?;

        let mut recent = RunMetadata::new("sync", "recent");
        recent.run_id = "0000002".to_string();
        save_run_metadata(&recent, &state_dir)?;

        assert_eq!(clean_old_state(30, &state_dir)?, 1);
        assert!(!state_dir.join("0000001").exists());
        assert!(!state_dir.join("0000001.json").exists());

        let index = RunsIndex::load(&state_dir)?;
        assert!(index.get_run("0000002").is_some());
        assert!(index.get_run("0000001").is_none());

        Ok(())
    }

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("short", 20), "short");
        assert_eq!(truncate_str("sync loading items error", 10), "sync lo...");
    }
}
