use crate::error::WriterError;
use crate::index::types::*;
use crate::unit::{FileRecord, RepositoryUnit, UnitKey};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Local artifacts for one unit, flushed and closed, ready to publish
#[derive(Debug)]
pub struct StagedArtifacts {
    unit: UnitKey,
    dir: PathBuf,
    records: usize,
}

impl StagedArtifacts {
    pub fn unit(&self) -> &UnitKey {
        &self.unit
    }

    /// Unit-private staging directory holding all five files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: IndexKind) -> PathBuf {
        self.dir.join(kind.staging_file_name())
    }

    /// Number of records appended to each artifact
    pub fn records(&self) -> usize {
        self.records
    }
}

/// Fans a unit's files out into the five staging streams
pub struct UnitIndexWriter {
    staging_root: PathBuf,
    language: String,
}

impl UnitIndexWriter {
    pub fn new(staging_root: &Path, language: &str) -> Self {
        Self {
            staging_root: staging_root.to_path_buf(),
            language: language.to_string(),
        }
    }

    /// Staging directory for a unit, namespaced by its key
    pub fn staging_dir(&self, unit: &UnitKey) -> PathBuf {
        self.staging_root.join(unit.to_string())
    }

    /// Write every file of `unit` to its five staging artifacts.
    ///
    /// Each record is dropped as soon as its five lines are written. On any
    /// I/O failure the handles are closed, the staging directory is removed
    /// and nothing is returned for publishing.
    pub fn write(&self, unit: RepositoryUnit) -> Result<StagedArtifacts, WriterError> {
        self.write_with(unit, |path| File::create(path).map(BufWriter::new))
    }

    /// [`UnitIndexWriter::write`] with a custom way of opening each sink
    pub(crate) fn write_with<W, F>(
        &self,
        unit: RepositoryUnit,
        open: F,
    ) -> Result<StagedArtifacts, WriterError>
    where
        W: Write,
        F: Fn(&Path) -> io::Result<W>,
    {
        let key = unit.key();
        let dir = self.staging_dir(&key);

        if unit.files.is_empty() {
            warn!(unit = %key, "Unit has no files, staging empty artifacts");
        }

        match self.stage(&key, &dir, unit.files, open) {
            Ok(records) => {
                debug!(unit = %key, records, dir = %dir.display(), "Staged artifacts");
                Ok(StagedArtifacts {
                    unit: key,
                    dir,
                    records,
                })
            }
            Err(e) => {
                discard_staging(&dir);
                Err(e)
            }
        }
    }

    /// Open the five sinks, append all records, flush. Sinks are closed when
    /// this returns, whatever the outcome.
    fn stage<W, F>(
        &self,
        key: &UnitKey,
        dir: &Path,
        files: Vec<FileRecord>,
        open: F,
    ) -> Result<usize, WriterError>
    where
        W: Write,
        F: Fn(&Path) -> io::Result<W>,
    {
        fs::create_dir_all(dir).map_err(|source| WriterError::Stage {
            unit: key.clone(),
            kind: IndexKind::ALL[0],
            path: dir.to_path_buf(),
            source,
        })?;

        let mut sinks = Vec::with_capacity(IndexKind::ALL.len());
        for kind in IndexKind::ALL {
            let path = dir.join(kind.staging_file_name());
            let sink = open(&path).map_err(|source| WriterError::Stage {
                unit: key.clone(),
                kind,
                path,
                source,
            })?;
            sinks.push(sink);
        }

        let records = append_records(&mut sinks, &self.language, key, files)?;
        flush_all(&mut sinks, key)?;

        Ok(records)
    }
}

/// Append one line per file to each sink, consuming the records in order.
///
/// `sinks` is indexed by [`IndexKind::index`].
pub fn append_records<W: Write>(
    sinks: &mut [W],
    language: &str,
    unit: &UnitKey,
    files: Vec<FileRecord>,
) -> Result<usize, WriterError> {
    let mut written = 0;
    let mut line = Vec::new();

    for (index, file) in files.into_iter().enumerate() {
        for kind in IndexKind::ALL {
            line.clear();
            encode_line(&mut line, kind, language, unit, &file)
                .and_then(|()| sinks[kind.index()].write_all(&line))
                .map_err(|source| WriterError::Append {
                    unit: unit.clone(),
                    kind,
                    index,
                    source,
                })?;
        }
        written += 1;
        // Record fully routed; release its payloads before the next one.
        drop(file);
    }

    Ok(written)
}

/// Encode one newline-terminated JSON line for `kind` into `line`
fn encode_line(
    line: &mut Vec<u8>,
    kind: IndexKind,
    language: &str,
    unit: &UnitKey,
    file: &FileRecord,
) -> io::Result<()> {
    let location = file.file_location.as_deref();

    match kind {
        IndexKind::Tokens => serde_json::to_writer(
            &mut *line,
            &RecordEnvelope {
                index_kind: language,
                record_kind: kind,
                payload: &file.searchable_refs,
                file_location: location,
            },
        )?,
        IndexKind::Meta => serde_json::to_writer(
            &mut *line,
            &RecordEnvelope {
                index_kind: language,
                record_kind: kind,
                payload: &file.file_meta_data,
                file_location: location,
            },
        )?,
        IndexKind::Sources => serde_json::to_writer(
            &mut *line,
            &RecordEnvelope {
                index_kind: language,
                record_kind: kind,
                payload: SourceRecord {
                    owner_login: &unit.owner_login,
                    repo_name: &unit.repo_name,
                    file_location: location,
                    content: &file.source_content,
                },
                file_location: location,
            },
        )?,
        IndexKind::Comments => serde_json::to_writer(
            &mut *line,
            &RecordEnvelope {
                index_kind: language,
                record_kind: kind,
                payload: CommentsRecord {
                    file_location: location,
                    comments: &file.doc_comments,
                },
                file_location: location,
            },
        )?,
        IndexKind::Typesinfo => serde_json::to_writer(&mut *line, &file.type_facts)?,
    }

    line.push(b'\n');
    Ok(())
}

fn flush_all<W: Write>(sinks: &mut [W], unit: &UnitKey) -> Result<(), WriterError> {
    for kind in IndexKind::ALL {
        sinks[kind.index()]
            .flush()
            .map_err(|source| WriterError::Flush {
                unit: unit.clone(),
                kind,
                source,
            })?;
    }
    Ok(())
}

fn discard_staging(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(dir = %dir.display(), error = %e, "Failed to discard partial staging artifacts");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn record(i: usize) -> FileRecord {
        FileRecord {
            file_location: Some(format!("src/File{}.java", i)),
            searchable_refs: json!([format!("Ref{}", i)]),
            file_meta_data: json!({"index": i}),
            source_content: format!("class File{} {{}}", i),
            doc_comments: json!([format!("doc {}", i)]),
            type_facts: json!({"types": [format!("File{}", i)]}),
        }
    }

    fn read_lines(path: &Path) -> Vec<Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    /// Writer that fails once `remaining` successful writes are used up
    struct FailAfter<W> {
        inner: W,
        remaining: usize,
    }

    impl<W: Write> Write for FailAfter<W> {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::other("disk full"));
            }
            self.remaining -= 1;
            self.inner.write_all(data)?;
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    #[test]
    fn test_write_k_records_per_artifact_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = UnitIndexWriter::new(tmp.path(), "java");
        let unit = RepositoryUnit::new("alice", "demo").with_files((0..3).map(record).collect());

        let staged = writer.write(unit).unwrap();
        assert_eq!(staged.records(), 3);
        assert_eq!(staged.dir(), tmp.path().join("alice~demo"));

        for kind in IndexKind::ALL {
            let lines = read_lines(&staged.path(kind));
            assert_eq!(lines.len(), 3, "{} should have one line per file", kind);
        }

        let meta = read_lines(&staged.path(IndexKind::Meta));
        let order: Vec<_> = meta.iter().map(|l| l["payload"]["index"].as_u64().unwrap()).collect();
        assert_eq!(order, vec![0, 1, 2]);

        let types = read_lines(&staged.path(IndexKind::Typesinfo));
        assert_eq!(types[2], json!({"types": ["File2"]}));
    }

    #[test]
    fn test_record_shapes() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = UnitIndexWriter::new(tmp.path(), "java");
        let unit = RepositoryUnit::new("alice", "demo").with_files(vec![record(7)]);
        let staged = writer.write(unit).unwrap();

        let tokens = &read_lines(&staged.path(IndexKind::Tokens))[0];
        assert_eq!(tokens["indexKind"], "java");
        assert_eq!(tokens["recordKind"], "tokens");
        assert_eq!(tokens["payload"], json!(["Ref7"]));
        assert_eq!(tokens["fileLocation"], "src/File7.java");

        let sources = &read_lines(&staged.path(IndexKind::Sources))[0];
        assert_eq!(sources["recordKind"], "sources");
        assert_eq!(sources["payload"]["ownerLogin"], "alice");
        assert_eq!(sources["payload"]["repoName"], "demo");
        assert_eq!(sources["payload"]["content"], "class File7 {}");

        let comments = &read_lines(&staged.path(IndexKind::Comments))[0];
        assert_eq!(comments["recordKind"], "comments");
        assert_eq!(comments["payload"]["comments"], json!(["doc 7"]));

        let types = &read_lines(&staged.path(IndexKind::Typesinfo))[0];
        assert!(types.get("recordKind").is_none());
    }

    #[test]
    fn test_empty_unit_creates_empty_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = UnitIndexWriter::new(tmp.path(), "java");
        let staged = writer.write(RepositoryUnit::new("alice", "empty")).unwrap();

        assert_eq!(staged.records(), 0);
        for kind in IndexKind::ALL {
            let path = staged.path(kind);
            assert!(path.exists());
            assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        }
    }

    #[test]
    fn test_stage_failure_is_writer_error() {
        let tmp = tempfile::tempdir().unwrap();
        // A plain file where the staging root should be makes directory creation fail
        let blocker = tmp.path().join("root");
        fs::write(&blocker, b"").unwrap();

        let writer = UnitIndexWriter::new(&blocker, "java");
        let err = writer
            .write(RepositoryUnit::new("alice", "demo").with_files(vec![record(0)]))
            .unwrap_err();

        assert!(matches!(err, WriterError::Stage { .. }));
    }

    #[test]
    fn test_append_failure_stops_at_failing_file() {
        // One write per line: every sink accepts file 0, then refuses file 1
        let mut sinks: Vec<FailAfter<Vec<u8>>> = IndexKind::ALL
            .iter()
            .map(|_| FailAfter {
                inner: Vec::new(),
                remaining: 1,
            })
            .collect();

        let key = UnitKey::new("alice", "demo");
        let err = append_records(&mut sinks, "java", &key, (0..4).map(record).collect()).unwrap_err();

        match err {
            WriterError::Append { index, kind, .. } => {
                assert_eq!(index, 1);
                assert_eq!(kind, IndexKind::Tokens);
            }
            other => panic!("unexpected error: {}", other),
        }

        // Only the first file's lines reached the sinks
        for sink in &sinks {
            let text = String::from_utf8(sink.inner.clone()).unwrap();
            assert_eq!(text.lines().count(), 1);
        }
    }

    #[test]
    fn test_mid_unit_failure_discards_partial_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = UnitIndexWriter::new(tmp.path(), "java");
        let dir = writer.staging_dir(&UnitKey::new("alice", "demo"));
        let unit = RepositoryUnit::new("alice", "demo").with_files((0..3).map(record).collect());

        // Each staging file takes two lines, then the disk fills up on file 2
        let err = writer
            .write_with(unit, |path| {
                assert!(path.starts_with(&dir));
                Ok(FailAfter {
                    inner: File::create(path)?,
                    remaining: 2,
                })
            })
            .unwrap_err();

        match err {
            WriterError::Append { index, kind, .. } => {
                assert_eq!(index, 2);
                assert_eq!(kind, IndexKind::Tokens);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!dir.exists());
        assert!(tmp.path().read_dir().unwrap().next().is_none());
    }
}
