//! Dataset directory scanning and the deterministic train/validation split.
//!
//! Layout: `root/<class_name>/<image files>`. Class ids follow the sorted
//! subdirectory names; inside each class the files are sorted and the first
//! `floor(validation_split * n)` of them are held out for validation.

use std::path::{Path, PathBuf};

use dog_core::{DataSplit, Error, LabelSet, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "gif"];

/// A single labelled image on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    pub path: PathBuf,
    pub label: usize,
}

/// The result of scanning a dataset root
#[derive(Debug, Clone)]
pub struct ScannedDataset {
    pub labels: LabelSet,
    pub train: Vec<ImageSample>,
    pub validation: Vec<ImageSample>,
}

impl ScannedDataset {
    pub fn split(&self, split: DataSplit) -> &[ImageSample] {
        match split {
            DataSplit::Train => &self.train,
            DataSplit::Validation => &self.validation,
        }
    }

    /// Class ids of one split, in sample order.
    pub fn targets(&self, split: DataSplit) -> Vec<usize> {
        self.split(split).iter().map(|s| s.label).collect()
    }
}

/// Scans a class-per-directory dataset
#[derive(Debug, Clone)]
pub struct DatasetScanner {
    root: PathBuf,
    validation_split: f64,
}

impl DatasetScanner {
    pub fn new(root: impl Into<PathBuf>, validation_split: f64) -> Self {
        Self {
            root: root.into(),
            validation_split,
        }
    }

    pub fn scan(&self) -> Result<ScannedDataset> {
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(Error::InvalidArgument(format!(
                "validation split {} must lie in [0, 1)",
                self.validation_split
            )));
        }

        let labels = LabelSet::from_class_dirs(&self.root)?;
        let mut train = Vec::new();
        let mut validation = Vec::new();

        for (label, name) in labels.iter() {
            let files = scan_images(&self.root.join(name))?;
            if files.is_empty() {
                return Err(Error::Dataset(format!("class '{}' has no images", name)));
            }

            let n_val = (self.validation_split * files.len() as f64).floor() as usize;
            debug!(
                "Class {} '{}': {} images ({} validation)",
                label,
                name,
                files.len(),
                n_val
            );

            for (i, path) in files.into_iter().enumerate() {
                let sample = ImageSample { path, label };
                if i < n_val {
                    validation.push(sample);
                } else {
                    train.push(sample);
                }
            }
        }

        info!(
            "Scanned {}: {} classes, {} training / {} validation images",
            self.root.display(),
            labels.count(),
            train.len(),
            validation.len()
        );

        Ok(ScannedDataset {
            labels,
            train,
            validation,
        })
    }
}

/// All image files below `dir`, sorted by path.
pub fn scan_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::NotFound(format!("Directory not found: {}", dir.display())));
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Dataset(format!("Failed to walk {}: {e}", dir.display())))?;
        if entry.file_type().is_file() && is_image(entry.path()) {
            images.push(entry.into_path());
        }
    }

    Ok(images)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}
