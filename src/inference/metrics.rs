//! Evaluation metrics
//!
//! Confusion matrix and accuracy over host-side predictions.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::utils::error::{AssocError, Result};

/// Confusion Matrix for multi-class classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes
    pub num_classes: usize,

    /// Matrix data (row = actual, column = predicted)
    /// Stored as a flat vector in row-major order
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Add a single prediction to the matrix
    pub fn add(&mut self, actual: usize, predicted: usize) -> Result<()> {
        if actual >= self.num_classes || predicted >= self.num_classes {
            return Err(AssocError::InvalidLabel(format!(
                "pair ({}, {}) outside {} classes",
                actual, predicted, self.num_classes
            )));
        }
        self.matrix[actual * self.num_classes + predicted] += 1;
        Ok(())
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    /// Get the total count
    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Get the number of correct predictions (diagonal sum)
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    /// Get overall accuracy
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Fraction of every actual class predicted correctly; `None` for absent classes
    pub fn per_class_recall(&self) -> Vec<Option<f64>> {
        (0..self.num_classes)
            .map(|row| {
                let support: usize = (0..self.num_classes).map(|col| self.get(row, col)).sum();
                (support > 0).then(|| self.get(row, row) as f64 / support as f64)
            })
            .collect()
    }
}

/// Build a confusion matrix with rows indexed by `labels` and columns by `predictions`.
pub fn confusion_matrix(
    labels: &[usize],
    predictions: &[usize],
    num_labels: usize,
) -> Result<ConfusionMatrix> {
    if labels.len() != predictions.len() {
        return Err(AssocError::Shape(format!(
            "{} labels but {} predictions",
            labels.len(),
            predictions.len()
        )));
    }

    let mut cm = ConfusionMatrix::new(num_labels);
    for (&actual, &predicted) in labels.iter().zip(predictions) {
        cm.add(actual, predicted)?;
    }
    Ok(cm)
}

/// Row-wise argmax of a flat `[rows, width]` score buffer
pub fn argmax_rows(scores: &[f32], width: usize) -> Result<Vec<usize>> {
    if width == 0 || scores.len() % width != 0 {
        return Err(AssocError::Shape(format!(
            "{} scores do not split into rows of {}",
            scores.len(),
            width
        )));
    }

    Ok(scores
        .par_chunks(width)
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &score)| {
                    if score > best.1 {
                        (i, score)
                    } else {
                        best
                    }
                })
                .0
        })
        .collect())
}
