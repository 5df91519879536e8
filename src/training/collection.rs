//! Loss registry and loss histories
//!
//! [`LossCollection`] holds the loss tensors built for the current training
//! step until the train op sums and consumes them. [`LossHistory`] keeps the
//! scalar value of every walker, visit, and logit term for the whole session.

use std::fmt;

use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

/// Family of a registered loss term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LossKind {
    Walker,
    Visit,
    Logit,
    Regularization,
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LossKind::Walker => "walker",
            LossKind::Visit => "visit",
            LossKind::Logit => "logit",
            LossKind::Regularization => "regularization",
        };
        write!(f, "{}", name)
    }
}

/// Loss tensors registered for the pending training step
#[derive(Debug, Clone)]
pub struct LossCollection<B: Backend> {
    terms: Vec<(LossKind, Tensor<B, 1>)>,
}

impl<B: Backend> Default for LossCollection<B> {
    fn default() -> Self {
        Self { terms: Vec::new() }
    }
}

impl<B: Backend> LossCollection<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: LossKind, loss: Tensor<B, 1>) {
        self.terms.push((kind, loss));
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Number of registered terms of one family
    pub fn count(&self, kind: LossKind) -> usize {
        self.terms.iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn terms(&self) -> impl Iterator<Item = (LossKind, &Tensor<B, 1>)> {
        self.terms.iter().map(|(kind, loss)| (*kind, loss))
    }

    /// Sum of every registered term, `None` when empty
    pub fn total(&self) -> Option<Tensor<B, 1>> {
        self.terms
            .iter()
            .map(|(_, loss)| loss.clone())
            .reduce(|acc, loss| acc + loss)
    }

    /// Move the registered terms out, leaving the collection empty
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    pub fn clear(&mut self) {
        self.terms.clear();
    }
}

/// Scalar values of every loss term built during a session.
///
/// Values of a discarded step are retracted; everything else only grows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LossHistory {
    pub walker_losses: Vec<f64>,
    pub visit_losses: Vec<f64>,
    pub logit_losses: Vec<f64>,
    pub regularization_losses: Vec<f64>,
}

impl LossHistory {
    pub fn record(&mut self, kind: LossKind, value: f64) {
        match kind {
            LossKind::Walker => self.walker_losses.push(value),
            LossKind::Visit => self.visit_losses.push(value),
            LossKind::Logit => self.logit_losses.push(value),
            LossKind::Regularization => self.regularization_losses.push(value),
        }
    }

    /// Remove the latest value of `kind`
    pub fn retract(&mut self, kind: LossKind) -> Option<f64> {
        match kind {
            LossKind::Walker => self.walker_losses.pop(),
            LossKind::Visit => self.visit_losses.pop(),
            LossKind::Logit => self.logit_losses.pop(),
            LossKind::Regularization => self.regularization_losses.pop(),
        }
    }

    pub fn get(&self, kind: LossKind) -> &[f64] {
        match kind {
            LossKind::Walker => &self.walker_losses,
            LossKind::Visit => &self.visit_losses,
            LossKind::Logit => &self.logit_losses,
            LossKind::Regularization => &self.regularization_losses,
        }
    }
}
