//! Optimization step over the registered losses

use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::session::{SemisupModel, TRAIN_LOSS_AVERAGE};
use crate::model::{Embedder, SemisupNet};
use crate::utils::error::{AssocError, Result};
use crate::utils::tensor::to_scalar;

/// Outcome of one training step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainStep {
    /// Global step the losses were built at
    pub step: u64,
    /// Total training loss
    pub loss: f64,
    /// Moving average of the total training loss
    pub loss_average: f64,
    /// Number of loss terms summed
    pub terms: usize,
}

/// One optimizer bound to a session's network.
///
/// Each [`TrainOp::run`] sums the pending losses into `train_loss`,
/// back-propagates, applies one Adam update and advances the global step.
pub struct TrainOp<O> {
    optimizer: O,
    learning_rate: f64,
}

impl<O> TrainOp<O> {
    pub fn new(optimizer: O, learning_rate: f64) -> Self {
        Self {
            optimizer,
            learning_rate,
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Change the learning rate used by the following steps
    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    /// Run one optimization step on `session`.
    ///
    /// The pending loss registry is consumed even when the step fails.
    pub fn run<B, M>(&mut self, session: &mut SemisupModel<B, M>) -> Result<TrainStep>
    where
        B: AutodiffBackend,
        M: Embedder<B> + AutodiffModule<B>,
        M::InnerModule: Embedder<B::InnerBackend>,
        O: Optimizer<SemisupNet<B, M>, B>,
    {
        let pending = session.losses.take();
        let train_loss = pending.total().ok_or(AssocError::NoLosses)?;

        let step = session.step;
        let loss = to_scalar(train_loss.clone());
        let loss_average = session
            .averages
            .update_scalar(TRAIN_LOSS_AVERAGE, step, loss)?;

        session.summaries.scalar(step, "Learning_Rate", self.learning_rate);
        session.summaries.scalar(step, "Loss_Total", loss);
        session.summaries.scalar(step, "Loss_Total_Avg", loss_average);

        // Backward pass
        let grads = train_loss.backward();
        let grads = GradientsParams::from_grads(grads, &session.net);

        // Update parameters
        session.net = self
            .optimizer
            .step(self.learning_rate, session.net.clone(), grads);
        session.step += 1;

        debug!(
            "Step {}: loss = {:.4} (avg {:.4}) over {} terms",
            step,
            loss,
            loss_average,
            pending.len()
        );

        Ok(TrainStep {
            step,
            loss,
            loss_average,
            terms: pending.len(),
        })
    }
}
