use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;

use super::CorpusStore;
use crate::config::IngestConfig;
use crate::error::{MedannError, Result};
use crate::types::{Embedding, LabelCode};
use crate::vision::FeatureExtractor;

/// One image that could not be embedded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestFailure {
    pub label: LabelCode,
    pub file: String,
    pub reason: String,
}

impl std::fmt::Display for IngestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Error processing file {} in {}: {}",
            self.file, self.label, self.reason
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Embedded image count per class, in directory order.
    pub classes: IndexMap<LabelCode, usize>,
    pub failures: Vec<IngestFailure>,
    /// Files ignored because their extension is not an image extension.
    pub skipped: usize,
    pub saved: Vec<PathBuf>,
}

impl IngestReport {
    pub fn embedded(&self) -> usize {
        self.classes.values().sum()
    }
}

/// Walks `<data_dir>/<label>/<image>` and writes one embedding file per
/// class into the output directory.
///
/// Per-image failures are recorded and the pass continues.
#[derive(Debug, Clone)]
pub struct Ingestor {
    extractor: FeatureExtractor,
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(extractor: FeatureExtractor, config: IngestConfig) -> Self {
        Self { extractor, config }
    }

    pub fn run(&self, data_dir: &Path, output_dir: &Path) -> Result<IngestReport> {
        std::fs::create_dir_all(output_dir)?;
        let store = CorpusStore::new(output_dir);
        let error_log = output_dir.join(&self.config.error_log);
        let mut report = IngestReport::default();

        for class_dir in self.class_dirs(data_dir)? {
            let Some(label) = class_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let label = label.to_string();
            let (embeddings, skipped) = self.embed_class(&class_dir, &label, &error_log, &mut report)?;
            report.skipped += skipped;

            let path = store.save_class(&label, &embeddings, self.config.format)?;
            report.classes.insert(label, embeddings.len());
            report.saved.push(path);
        }

        tracing::info!(
            classes = report.classes.len(),
            embedded = report.embedded(),
            failures = report.failures.len(),
            skipped = report.skipped,
            "Ingest complete"
        );
        Ok(report)
    }

    fn class_dirs(&self, data_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(data_dir)
            .map_err(|e| MedannError::Io(format!("{}: {}", data_dir.display(), e)))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .filter(|p| {
                let name = p.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                !self.config.skip_dirs.iter().any(|skip| skip == name)
            })
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    fn is_image(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.config
                    .extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    /// Embed every image of one class. Returns the embeddings and the number
    /// of non-image files passed over.
    fn embed_class(
        &self,
        class_dir: &Path,
        label: &str,
        error_log: &Path,
        report: &mut IngestReport,
    ) -> Result<(Vec<Embedding>, usize)> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(class_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        files.sort();

        let mut embeddings = Vec::with_capacity(files.len());
        let mut skipped = 0;
        for path in files {
            if !self.is_image(&path) {
                skipped += 1;
                continue;
            }
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match self.extractor.embed_path(&path) {
                Ok(embedding) => {
                    tracing::debug!(label, file = %file, dims = embedding.dimensions(), "Embedded image");
                    embeddings.push(embedding);
                }
                Err(e) => {
                    let failure = IngestFailure {
                        label: label.to_string(),
                        file,
                        reason: e.to_string(),
                    };
                    tracing::warn!(log = %error_log.display(), "{}", failure);
                    if let Err(log_err) = append_error_log(error_log, &failure) {
                        tracing::error!(
                            log = %error_log.display(),
                            error = %log_err,
                            "Failed to write error log"
                        );
                    }
                    report.failures.push(failure);
                }
            }
        }
        Ok((embeddings, skipped))
    }
}

fn append_error_log(path: &Path, failure: &IngestFailure) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{failure}")
}
