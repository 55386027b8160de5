use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::Corpus;
use crate::config::StorageFormat;
use crate::error::{MedannError, Result};
use crate::types::{Embedding, LabelCode};

const FILE_SUFFIX: &str = "_embeddings";

/// Per-class embedding files under one directory.
///
/// Layout: `<dir>/<label>_embeddings.<json|csv>`, one vector per entry
/// (JSON array of arrays) or per row (headerless CSV).
#[derive(Debug, Clone)]
pub struct CorpusStore {
    dir: PathBuf,
}

/// A class file that could not be read back. The rest of the directory is
/// still loaded.
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: MedannError,
}

#[derive(Debug)]
pub struct LoadReport {
    pub corpus: Corpus,
    pub files_loaded: Vec<PathBuf>,
    pub failures: Vec<LoadFailure>,
}

impl CorpusStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn class_path(&self, label: &str, format: StorageFormat) -> PathBuf {
        self.dir
            .join(format!("{label}{FILE_SUFFIX}.{}", format.extension()))
    }

    /// Write every embedding of one class, replacing any previous file.
    ///
    /// A file for the same class in the other format is removed afterwards,
    /// so each class has exactly one file on disk.
    pub fn save_class(
        &self,
        label: &str,
        embeddings: &[Embedding],
        format: StorageFormat,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.class_path(label, format);
        match format {
            StorageFormat::Json => {
                let mut writer = BufWriter::new(File::create(&path)?);
                serde_json::to_writer(&mut writer, embeddings)?;
                writer.flush()?;
            }
            StorageFormat::Csv => {
                let mut writer = csv::WriterBuilder::new()
                    .has_headers(false)
                    .from_path(&path)
                    .map_err(|e| corpus_error(&path, e))?;
                for embedding in embeddings {
                    writer
                        .write_record(embedding.as_slice().iter().map(|v| v.to_string()))
                        .map_err(|e| corpus_error(&path, e))?;
                }
                writer.flush()?;
            }
        }
        for other in [StorageFormat::Json, StorageFormat::Csv] {
            if other == format {
                continue;
            }
            let stale = self.class_path(label, other);
            if stale.is_file() {
                std::fs::remove_file(&stale)?;
                tracing::info!(path = %stale.display(), "Removed stale class file");
            }
        }
        tracing::info!(
            label,
            count = embeddings.len(),
            path = %path.display(),
            "Saved class embeddings"
        );
        Ok(path)
    }

    /// Read one class file.
    pub fn load_file(path: &Path) -> Result<Vec<Embedding>> {
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(StorageFormat::from_extension)
            .ok_or_else(|| corpus_error(path, "unsupported file extension"))?;

        let vectors: Vec<Vec<f32>> = match format {
            StorageFormat::Json => {
                let reader = BufReader::new(File::open(path)?);
                serde_json::from_reader(reader).map_err(|e| corpus_error(path, e))?
            }
            StorageFormat::Csv => {
                let mut reader = csv::ReaderBuilder::new()
                    .has_headers(false)
                    .from_path(path)
                    .map_err(|e| corpus_error(path, e))?;
                let mut rows = Vec::new();
                for record in reader.records() {
                    let record = record.map_err(|e| corpus_error(path, e))?;
                    let row = record
                        .iter()
                        .map(|field| field.trim().parse::<f32>())
                        .collect::<std::result::Result<Vec<f32>, _>>()
                        .map_err(|e| corpus_error(path, e))?;
                    rows.push(row);
                }
                rows
            }
        };

        if let Some(first) = vectors.first() {
            if let Some(bad) = vectors.iter().find(|v| v.len() != first.len()) {
                return Err(corpus_error(
                    path,
                    format!("mixed vector lengths {} and {}", first.len(), bad.len()),
                ));
            }
        }
        Ok(vectors.into_iter().map(Embedding::new).collect())
    }

    /// Load every class file in the directory into one corpus.
    ///
    /// Files are visited in file-name order, so sample ids are stable for a
    /// given directory. A file that fails to parse, or whose vectors disagree
    /// in length with the files already loaded, is recorded in
    /// `failures` and skipped. So is a second file for a label that has
    /// already been loaded (`Normal_embeddings.csv` and `.json` side by side).
    pub fn load_dir(&self) -> Result<LoadReport> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)
            .map_err(|e| MedannError::Io(format!("{}: {}", self.dir.display(), e)))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && class_label(p).is_some())
            .collect();
        paths.sort();

        let mut corpus = Corpus::new();
        let mut files_loaded: Vec<PathBuf> = Vec::new();
        let mut failures = Vec::new();
        let mut loaded_from: HashMap<LabelCode, usize> = HashMap::new();
        for path in paths {
            let Some(label) = class_label(&path) else {
                continue;
            };
            if let Some(&first) = loaded_from.get(&label) {
                let error = corpus_error(
                    &path,
                    format!(
                        "duplicate file for class {label}, already loaded from {}",
                        files_loaded[first].display()
                    ),
                );
                tracing::warn!(path = %path.display(), %error, "Skipping corpus file");
                failures.push(LoadFailure { path, error });
                continue;
            }
            match Self::load_file(&path).and_then(|vectors| {
                check_dimensions(&path, corpus.dimensions(), &vectors)?;
                Ok(vectors)
            }) {
                Ok(vectors) => {
                    tracing::info!(
                        label = %label,
                        count = vectors.len(),
                        path = %path.display(),
                        "Loaded class embeddings"
                    );
                    corpus.extend_class(&label, vectors);
                    loaded_from.insert(label, files_loaded.len());
                    files_loaded.push(path);
                }
                Err(error) => {
                    tracing::error!(path = %path.display(), %error, "Skipping corpus file");
                    failures.push(LoadFailure { path, error });
                }
            }
        }

        Ok(LoadReport {
            corpus,
            files_loaded,
            failures,
        })
    }
}

/// Class code for a corpus file name, or `None` if the name does not follow
/// `<label>_embeddings.<json|csv>`. The label is everything before the first
/// underscore, so `Lung_Opacity_embeddings.csv` yields `Lung`.
pub fn class_label(path: &Path) -> Option<LabelCode> {
    let ext = path.extension()?.to_str()?;
    StorageFormat::from_extension(ext)?;
    let stem = path.file_stem()?.to_str()?;
    if !stem.ends_with(FILE_SUFFIX) {
        return None;
    }
    let label = stem.split('_').next()?;
    (!label.is_empty()).then(|| label.to_string())
}

fn check_dimensions(path: &Path, expected: Option<usize>, vectors: &[Embedding]) -> Result<()> {
    match (expected, vectors.first()) {
        (Some(expected), Some(v)) if v.dimensions() != expected => Err(corpus_error(
            path,
            format!(
                "vectors have {} dimensions, corpus has {}",
                v.dimensions(),
                expected
            ),
        )),
        _ => Ok(()),
    }
}

fn corpus_error(path: &Path, reason: impl std::fmt::Display) -> MedannError {
    MedannError::CorpusFormat {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}
