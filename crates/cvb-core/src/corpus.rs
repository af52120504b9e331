//! Corpus store: the set of named line-bag sources backing `<name>.txt`
//! files in one directory.
//!
//! Mutations of the name->source map serialize through one async mutex;
//! sources themselves are immutable snapshots (`Arc<Source>`) so searches
//! and merges read without holding the lock.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tokio::sync::Mutex;

use crate::{errors::Error, Result};

/// One named, ordered bag of raw lines backing a file on disk.
#[derive(Clone, Debug)]
pub struct Source {
    pub name: String,
    pub path: PathBuf,
    pub lines: Vec<String>,
}

/// Outcome of a multi-source merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The union was written as a new source; `lines` is the count written.
    Merged { name: String, lines: usize },
    /// Every contributing source was empty. Not an error: the caller should
    /// tell the operator instead of writing a zero-byte file.
    AllEmpty,
}

pub struct CorpusStore {
    dir: PathBuf,
    sources: Mutex<HashMap<String, Arc<Source>>>,
}

impl CorpusStore {
    /// Open a store over `dir`, ingesting any `.txt` files already present.
    pub async fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let store = Self {
            dir: dir.to_path_buf(),
            sources: Mutex::new(HashMap::new()),
        };

        for ent in std::fs::read_dir(dir)?.flatten() {
            let path = ent.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            store.ingest(name, &path).await?;
        }

        Ok(store)
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.txt"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read a file fully into memory as a source. Re-ingesting a name
    /// replaces the prior in-memory copy, it does not duplicate it.
    ///
    /// Decoding is lossy: these files routinely carry broken encodings and a
    /// bad byte should not reject the whole source.
    pub async fn ingest(&self, name: &str, path: &Path) -> Result<Arc<Source>> {
        let bytes = std::fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();

        let source = Arc::new(Source {
            name: name.to_string(),
            path: path.to_path_buf(),
            lines,
        });

        self.sources
            .lock()
            .await
            .insert(name.to_string(), source.clone());
        Ok(source)
    }

    pub async fn get(&self, name: &str) -> Result<Arc<Source>> {
        self.sources
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Union the line-sets of the named sources and write the result as the
    /// source `merged_name`.
    ///
    /// Contributing sources are processed concurrently (they are read-only
    /// snapshots and the union is commutative); only the final write is
    /// serialized.
    pub async fn merge_all(&self, names: &[String], merged_name: &str) -> Result<MergeOutcome> {
        let snapshots: Vec<Arc<Source>> = {
            let map = self.sources.lock().await;
            names
                .iter()
                .map(|n| {
                    map.get(n)
                        .cloned()
                        .ok_or_else(|| Error::NotFound(n.clone()))
                })
                .collect::<Result<_>>()?
        };

        let mut tasks = Vec::with_capacity(snapshots.len());
        for src in snapshots {
            tasks.push(tokio::spawn(async move {
                src.lines
                    .iter()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect::<HashSet<String>>()
            }));
        }

        let mut combined: HashSet<String> = HashSet::new();
        for task in tasks {
            let part = task
                .await
                .map_err(|e| Error::External(format!("merge task failed: {e}")))?;
            combined.extend(part);
        }

        if combined.is_empty() {
            return Ok(MergeOutcome::AllEmpty);
        }

        let path = self.path_for(merged_name);
        let mut body = String::new();
        for line in &combined {
            body.push_str(line);
            body.push('\n');
        }
        std::fs::write(&path, body)?;

        let lines: Vec<String> = combined.into_iter().collect();
        let count = lines.len();
        let source = Arc::new(Source {
            name: merged_name.to_string(),
            path,
            lines,
        });
        self.sources
            .lock()
            .await
            .insert(merged_name.to_string(), source);

        Ok(MergeOutcome::Merged {
            name: merged_name.to_string(),
            lines: count,
        })
    }

    /// Remove a source and its backing file.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let source = self
            .sources
            .lock()
            .await
            .remove(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        match std::fs::remove_file(&source.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Rename a source. Fails with `Conflict` before touching the filesystem
    /// if the new name is taken.
    pub async fn rename(&self, name: &str, new_name: &str) -> Result<()> {
        let mut map = self.sources.lock().await;
        if map.contains_key(new_name) || self.path_for(new_name).exists() {
            return Err(Error::Conflict(new_name.to_string()));
        }
        let source = map
            .remove(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        let new_path = self.path_for(new_name);
        std::fs::rename(&source.path, &new_path)?;

        map.insert(
            new_name.to_string(),
            Arc::new(Source {
                name: new_name.to_string(),
                path: new_path,
                lines: source.lines.clone(),
            }),
        );
        Ok(())
    }

    /// Rename every source to `prefix{n}`, incrementing `n` past any name or
    /// file that already exists so nothing is ever overwritten. Returns the
    /// (old, new) pairs in the order they were applied.
    pub async fn rename_all_sequenced(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let mut map = self.sources.lock().await;
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();

        let mut n = 1usize;
        let mut renamed = Vec::new();
        for name in names {
            let mut candidate = format!("{prefix}{n}");
            while map.contains_key(&candidate) || self.path_for(&candidate).exists() {
                n += 1;
                candidate = format!("{prefix}{n}");
            }

            let source = map
                .remove(&name)
                .ok_or_else(|| Error::NotFound(name.clone()))?;
            let new_path = self.path_for(&candidate);
            std::fs::rename(&source.path, &new_path)?;

            map.insert(
                candidate.clone(),
                Arc::new(Source {
                    name: candidate.clone(),
                    path: new_path,
                    lines: source.lines.clone(),
                }),
            );
            renamed.push((name, candidate));
            n += 1;
        }

        Ok(renamed)
    }
}

/// Promote a completed job's temp output to its canonical name, retrying
/// while the target is still held open by another process. Any other rename
/// failure is fatal immediately; exhausting the retries reports
/// `StillLocked` rather than a generic failure.
pub async fn rename_with_retry(
    from: &Path,
    to: &Path,
    attempts: u32,
    delay: Duration,
) -> Result<()> {
    retry_while_locked(from, attempts, delay, || std::fs::rename(from, to)).await
}

pub(crate) async fn retry_while_locked(
    path: &Path,
    attempts: u32,
    delay: Duration,
    mut op: impl FnMut() -> std::io::Result<()>,
) -> Result<()> {
    for attempt in 1..=attempts {
        match op() {
            Ok(()) => return Ok(()),
            Err(e) if is_locked(&e) => {
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Err(Error::StillLocked {
        path: path.to_path_buf(),
        attempts,
    })
}

fn is_locked(e: &std::io::Error) -> bool {
    let msg = e.to_string();
    msg.contains("used by another process") || msg.contains("resource busy")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn write_source(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(format!("{name}.txt"));
        std::fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    fn line_set(path: &Path) -> BTreeSet<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    #[tokio::test]
    async fn ingest_is_idempotent_replace() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_source(tmp.path(), "a", &["one", "two"]);
        let store = CorpusStore::open(tmp.path()).await.unwrap();

        std::fs::write(&path, "three").unwrap();
        store.ingest("a", &path).await.unwrap();

        let src = store.get("a").await.unwrap();
        assert_eq!(src.lines, vec!["three".to_string()]);
        assert_eq!(store.list().await, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn merge_dedups_across_sources() {
        let tmp = tempfile::tempdir().unwrap();
        write_source(tmp.path(), "a", &["a", "b"]);
        write_source(tmp.path(), "b", &["b", "c"]);
        let store = CorpusStore::open(tmp.path()).await.unwrap();

        let outcome = store
            .merge_all(&["a".to_string(), "b".to_string()], "result")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            MergeOutcome::Merged {
                name: "result".to_string(),
                lines: 3
            }
        );

        let expected: BTreeSet<String> =
            ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(line_set(&store.path_for("result")), expected);
    }

    #[tokio::test]
    async fn merge_is_idempotent_as_a_set() {
        let tmp = tempfile::tempdir().unwrap();
        write_source(tmp.path(), "a", &["x", "y"]);
        write_source(tmp.path(), "b", &["y", "z"]);
        let store = CorpusStore::open(tmp.path()).await.unwrap();
        let names = vec!["a".to_string(), "b".to_string()];

        store.merge_all(&names, "result").await.unwrap();
        let first = line_set(&store.path_for("result"));
        store.merge_all(&names, "result").await.unwrap();
        let second = line_set(&store.path_for("result"));

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn merge_of_empty_sources_reports_all_empty() {
        let tmp = tempfile::tempdir().unwrap();
        write_source(tmp.path(), "a", &[]);
        write_source(tmp.path(), "b", &["", "   "]);
        let store = CorpusStore::open(tmp.path()).await.unwrap();

        let outcome = store
            .merge_all(&["a".to_string(), "b".to_string()], "result")
            .await
            .unwrap();
        assert_eq!(outcome, MergeOutcome::AllEmpty);
        assert!(!store.path_for("result").exists());
    }

    #[tokio::test]
    async fn delete_missing_source_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CorpusStore::open(tmp.path()).await.unwrap();
        let err = store.delete("nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn rename_rejects_collisions_and_missing_names() {
        let tmp = tempfile::tempdir().unwrap();
        write_source(tmp.path(), "a", &["1"]);
        write_source(tmp.path(), "b", &["2"]);
        let store = CorpusStore::open(tmp.path()).await.unwrap();

        assert!(matches!(
            store.rename("a", "b").await.unwrap_err(),
            Error::Conflict(_)
        ));
        assert!(matches!(
            store.rename("nope", "c").await.unwrap_err(),
            Error::NotFound(_)
        ));

        store.rename("a", "c").await.unwrap();
        assert!(store.path_for("c").exists());
        assert!(!store.path_for("a").exists());
    }

    #[tokio::test]
    async fn rename_all_assigns_sequence_without_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        write_source(tmp.path(), "first", &["1"]);
        write_source(tmp.path(), "second", &["2"]);
        let store = CorpusStore::open(tmp.path()).await.unwrap();

        let renamed = store.rename_all_sequenced("combo").await.unwrap();
        assert_eq!(renamed.len(), 2);

        let names = store.list().await;
        assert_eq!(names, vec!["combo1".to_string(), "combo2".to_string()]);
        assert!(store.path_for("combo1").exists());
        assert!(store.path_for("combo2").exists());
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_lock() {
        let mut calls = 0u32;
        let res = retry_while_locked(
            Path::new("/tmp/x"),
            5,
            Duration::from_millis(1),
            || {
                calls += 1;
                if calls <= 2 {
                    Err(std::io::Error::other("resource busy"))
                } else {
                    Ok(())
                }
            },
        )
        .await;

        assert!(res.is_ok());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn retry_exhaustion_reports_still_locked() {
        let mut calls = 0u32;
        let res = retry_while_locked(
            Path::new("/tmp/x"),
            5,
            Duration::from_millis(1),
            || {
                calls += 1;
                Err(std::io::Error::other("file used by another process"))
            },
        )
        .await;

        assert_eq!(calls, 5);
        assert!(matches!(
            res.unwrap_err(),
            Error::StillLocked { attempts: 5, .. }
        ));
    }

    #[tokio::test]
    async fn retry_bails_on_unrelated_errors() {
        let mut calls = 0u32;
        let res = retry_while_locked(
            Path::new("/tmp/x"),
            5,
            Duration::from_millis(1),
            || {
                calls += 1;
                Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "denied",
                ))
            },
        )
        .await;

        assert_eq!(calls, 1);
        assert!(matches!(res.unwrap_err(), Error::Io(_)));
    }
}
