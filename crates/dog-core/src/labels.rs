//! Label registry: the ordered class names that map classifier outputs to diagnoses.
//!
//! Index `i` of a [`LabelSet`] is the canonical class id for output neuron `i`.
//! The set travels inside every model artifact so training and serving can never
//! disagree about ordering.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Class names of the dog skin/eye disease dataset, in directory-sort order.
pub const DOG_DISEASE_CLASSES: [&str; 17] = [
    "Bacterial_Infection",
    "Conjunctival_Injection_or_Redness",
    "Demodicosis",
    "Dermatitis",
    "Fungal_Infection",
    "Healthy",
    "Hypersensitivity",
    "Keratosis",
    "Malassezia",
    "Nasal_Discharge",
    "Ocular_Discharge",
    "Pyoderma",
    "Skin_Lesions",
    "flea_allergy",
    "hotspot",
    "mange",
    "ringworm",
];

/// Immutable, ordered, duplicate-free list of class names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct LabelSet {
    names: Vec<String>,
}

impl LabelSet {
    /// Build a label set, rejecting empty lists and duplicate names.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();

        if names.is_empty() {
            return Err(Error::Config("label set must contain at least one class".into()));
        }

        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if name.trim().is_empty() {
                return Err(Error::Config("label names must not be blank".into()));
            }
            if !seen.insert(name.as_str()) {
                return Err(Error::Config(format!("duplicate label '{}'", name)));
            }
        }

        Ok(Self { names })
    }

    /// The 17 canonical dog disease classes.
    pub fn dog_diseases() -> Self {
        Self {
            names: DOG_DISEASE_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Derive the label set from the class subdirectories of a dataset root.
    ///
    /// Subdirectory names are sorted so the ordering matches the training loader.
    pub fn from_class_dirs(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::NotFound(format!(
                "dataset directory {}",
                root.display()
            )));
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                let name = entry.file_name().to_string_lossy().to_string();
                if !name.starts_with('.') {
                    names.push(name);
                }
            }
        }
        names.sort();

        Self::new(names)
    }

    /// Class name for an output index.
    pub fn label_for(&self, index: usize) -> Result<&str> {
        self.names
            .get(index)
            .map(String::as_str)
            .ok_or(Error::IndexOutOfRange {
                index,
                len: self.names.len(),
            })
    }

    /// Reverse lookup of a class id by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn count(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names.iter().enumerate().map(|(i, n)| (i, n.as_str()))
    }

    /// Fail unless the classifier output width equals the number of labels.
    pub fn ensure_matches_outputs(&self, outputs: usize) -> Result<()> {
        if outputs != self.count() {
            return Err(Error::LabelMismatch {
                labels: self.count(),
                outputs,
            });
        }
        Ok(())
    }
}

impl TryFrom<Vec<String>> for LabelSet {
    type Error = Error;

    fn try_from(names: Vec<String>) -> Result<Self> {
        Self::new(names)
    }
}

impl From<LabelSet> for Vec<String> {
    fn from(labels: LabelSet) -> Self {
        labels.names
    }
}
