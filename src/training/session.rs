//! Association training session
//!
//! [`SemisupModel`] owns everything that lives for a whole experiment: the
//! parameter-shared network, the global step, the moving averages, the loss
//! registry of the pending step, the lifetime loss histories, and the summary
//! scalars.
//!
//! ## Step anatomy
//!
//! 1. Embed the labeled and unlabeled batches with [`SemisupModel::image_to_embedding`]
//! 2. Register losses: `add_semisup_loss` / `add_tree_semisup_loss`,
//!    `add_logit_loss` / `add_tree_logit_loss` / `add_tree_multitask_logit_loss`
//! 3. Run the [`TrainOp`] created once by [`SemisupModel::create_train_op`]
//!
//! Evaluation ([`SemisupModel::calc_embedding`], [`SemisupModel::classify`])
//! runs the same parameters on the inner backend and is available right after
//! construction.

use std::sync::Arc;

use burn::{
    module::{AutodiffModule, Module},
    optim::{AdamConfig, Optimizer},
    tensor::{backend::AutodiffBackend, Int, Tensor},
};
use tracing::{debug, info};

use super::association::associate;
use super::averages::MovingAverages;
use super::collection::{LossCollection, LossHistory, LossKind};
use super::loss::{
    equality_matrix, sparse_softmax_cross_entropy, visit_loss, walk_statistics, walker_loss,
    WalkStatistics,
};
use super::train_op::TrainOp;
use super::tree_loss::{level_equality_matrices, tree_logit_losses, tree_multitask_logit_losses};
use crate::inference::{argmax_rows, batched_apply, confusion_matrix, ConfusionMatrix, Endpoint};
use crate::model::{Embedder, SemisupConfig, SemisupNet, TreeStructure};
use crate::utils::error::{ensure_dim, AssocError, Result};
use crate::utils::summary::SummaryWriter;
use crate::utils::tensor::{int_to_vec, to_scalar, to_vec};

/// Epsilon of the Adam optimizer
pub const ADAM_EPSILON: f32 = 1e-8;

/// Moving-average name of the total training loss
pub const TRAIN_LOSS_AVERAGE: &str = "train_loss";

/// Evaluation network type of a session
pub type EvalNet<B, M> =
    SemisupNet<<B as AutodiffBackend>::InnerBackend, <M as AutodiffModule<B>>::InnerModule>;

/// Evaluation backend of a session
pub type EvalBackend<B> = <B as AutodiffBackend>::InnerBackend;

/// Training-session state holder
pub struct SemisupModel<B, M>
where
    B: AutodiffBackend,
    M: Embedder<B> + AutodiffModule<B>,
    M::InnerModule: Embedder<B::InnerBackend>,
{
    config: SemisupConfig,
    pub(super) net: SemisupNet<B, M>,
    tree: Option<Arc<dyn TreeStructure>>,
    test_in: Option<Tensor<B::InnerBackend, 4>>,
    pub(super) step: u64,
    pub(super) averages: MovingAverages,
    pub(super) losses: LossCollection<B>,
    history: LossHistory,
    pub(super) summaries: SummaryWriter,
    device: B::Device,
}

impl<B, M> SemisupModel<B, M>
where
    B: AutodiffBackend,
    M: Embedder<B> + AutodiffModule<B>,
    M::InnerModule: Embedder<B::InnerBackend>,
{
    /// Create a session around `embedder`.
    ///
    /// With a label tree, `config.num_labels` must cover the tree's logit width.
    pub fn new(
        embedder: M,
        config: SemisupConfig,
        tree: Option<Arc<dyn TreeStructure>>,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate()?;

        if let Some(tree) = &tree {
            if tree.num_nodes() == 0 {
                return Err(AssocError::InvalidTree("tree has no classifier nodes".to_string()));
            }
            if config.num_labels < tree.logit_width() {
                return Err(AssocError::Config(format!(
                    "num_labels {} is smaller than the tree's logit width {}",
                    config.num_labels,
                    tree.logit_width()
                )));
            }
        }

        let net = SemisupNet::new(
            embedder,
            config.num_labels,
            config.virtual_embeddings,
            config.seed,
            device,
        );

        info!(
            "Created association session: {} labels, input {:?}, embedding size {}, {} parameters",
            config.num_labels,
            config.input_shape,
            net.embedding_size(),
            net.num_params()
        );
        if let Some(tree) = &tree {
            info!(
                "Hierarchical labels: {} nodes, depth {}, max depth {}",
                tree.num_nodes(),
                tree.depth(),
                config.max_depth
            );
        }

        Ok(Self {
            averages: MovingAverages::new(config.ema_decay),
            config,
            net,
            tree,
            test_in: None,
            step: 0,
            losses: LossCollection::new(),
            history: LossHistory::default(),
            summaries: SummaryWriter::new(),
            device: device.clone(),
        })
    }

    /// Attach a pre-supplied evaluation input
    pub fn with_test_input(mut self, images: Tensor<B::InnerBackend, 4>) -> Result<Self> {
        self.check_images(&images.dims())?;
        self.test_in = Some(images);
        Ok(self)
    }

    fn check_images(&self, dims: &[usize; 4]) -> Result<()> {
        if dims[0] == 0 {
            return Err(AssocError::EmptyInput("image batch is empty".to_string()));
        }
        if dims[1..] != self.config.input_shape {
            return Err(AssocError::Shape(format!(
                "images have shape {:?}, expected [batch, {}, {}, {}]",
                dims,
                self.config.input_shape[0],
                self.config.input_shape[1],
                self.config.input_shape[2]
            )));
        }
        Ok(())
    }

    fn require_tree(&self) -> Result<Arc<dyn TreeStructure>> {
        self.tree.clone().ok_or(AssocError::MissingTree)
    }

    /// Record a loss term in the pending registry, the history, and the summaries.
    fn register(&mut self, kind: LossKind, loss: Tensor<B, 1>, summary: &str) -> f64 {
        let value = to_scalar(loss.clone());
        debug!("step {}: {} = {:.6}", self.step, summary, value);

        self.history.record(kind, value);
        self.summaries.scalar(self.step, summary, value);
        self.losses.push(kind, loss);
        value
    }

    /// Drop everything registered at the current step without training on it.
    ///
    /// Pending loss terms leave the registry and the loss histories, summary
    /// scalars of the step are removed, and moving averages updated at this
    /// step return to their previous state. Use it to retry a step after one
    /// of its `add_*` calls failed. Returns the number of discarded terms.
    pub fn discard_pending_losses(&mut self) -> usize {
        let pending = self.losses.take();
        for (kind, _) in pending.terms() {
            self.history.retract(kind);
        }
        let summaries = self.summaries.discard_step(self.step);
        let averages = self.averages.rollback_step(self.step);

        debug!(
            "step {}: discarded {} loss terms, {} summaries, {} average updates",
            self.step,
            pending.len(),
            summaries,
            averages
        );
        pending.len()
    }

    // ---- Embedding and logit heads -------------------------------------------------

    /// Training-mode embedding `[batch, E]` of images `[batch, C, H, W]`
    pub fn image_to_embedding(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        self.check_images(&images.dims())?;
        Ok(self.net.embed(images))
    }

    /// Training-mode class scores of embeddings
    pub fn embedding_to_logit(&self, embedding: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        ensure_dim("embedding width", embedding.dims()[1], self.net.embedding_size())?;
        Ok(self.net.logits(embedding))
    }

    /// Evaluation-mode network holding the current parameters
    pub fn eval_net(&self) -> EvalNet<B, M> {
        self.net.valid()
    }

    /// Evaluation-mode embedding of a single batch
    pub fn test_embedding(
        &self,
        images: Tensor<EvalBackend<B>, 4>,
    ) -> Result<Tensor<EvalBackend<B>, 2>> {
        self.check_images(&images.dims())?;
        Ok(self.eval_net().embed(images))
    }

    /// Evaluation-mode class scores of a single batch
    pub fn test_logit(
        &self,
        images: Tensor<EvalBackend<B>, 4>,
    ) -> Result<Tensor<EvalBackend<B>, 2>> {
        self.check_images(&images.dims())?;
        let net = self.eval_net();
        Ok(net.logits(net.embed(images)))
    }

    /// Current virtual embeddings, if configured
    pub fn virtual_embeddings(&self) -> Option<Tensor<B, 2>> {
        self.net.virtual_embeddings()
    }

    // ---- Flat losses ---------------------------------------------------------------

    /// Walker and visit losses between labeled embeddings `a` and unlabeled embeddings `b`.
    pub fn add_semisup_loss(
        &mut self,
        a: Tensor<B, 2>,
        b: Tensor<B, 2>,
        labels: Tensor<B, 1, Int>,
        walker_weight: f64,
        visit_weight: f64,
    ) -> Result<()> {
        ensure_dim("labels", labels.dims()[0], a.dims()[0])?;

        let association = associate(a, b)?;
        let equality = equality_matrix(labels);

        self.create_walk_statistics(association.p_aba.clone(), equality.clone())?;

        let loss = walker_loss(association.p_aba, equality, walker_weight)?;
        self.register(LossKind::Walker, loss, "Loss_aba");

        self.add_visit_loss(association.p_ab, visit_weight)
    }

    /// Visit loss of the labeled-to-unlabeled transitions `p_ab`
    pub fn add_visit_loss(&mut self, p_ab: Tensor<B, 2>, weight: f64) -> Result<()> {
        let loss = visit_loss(p_ab, weight)?;
        self.register(LossKind::Visit, loss, "Loss_Visit");
        Ok(())
    }

    /// Sparse cross-entropy between `logits` and class indices `labels`, times `weight`.
    pub fn add_logit_loss(
        &mut self,
        logits: Tensor<B, 2>,
        labels: Tensor<B, 1, Int>,
        weight: f64,
    ) -> Result<()> {
        let [n, num_classes] = logits.dims();
        ensure_dim("labels", labels.dims()[0], n)?;

        let values = int_to_vec(labels.clone())?;
        if let Some(bad) = values.iter().find(|&&l| l < 0 || l as usize >= num_classes) {
            return Err(AssocError::InvalidLabel(format!(
                "label {} outside [0, {})",
                bad, num_classes
            )));
        }

        let weights = Tensor::full([n], weight, &self.device);
        let loss = sparse_softmax_cross_entropy(logits, labels, weights);
        self.register(LossKind::Logit, loss, "Loss_Logit");
        Ok(())
    }

    /// Extra loss (e.g. weight penalties) summed into the training loss
    pub fn add_regularization_loss(&mut self, loss: Tensor<B, 1>) {
        self.register(LossKind::Regularization, loss, "Loss_Regularization");
    }

    // ---- Hierarchical losses -------------------------------------------------------

    /// Walker loss per tree level and a single visit loss.
    ///
    /// `labels` holds one hierarchical label record per labeled sample.
    pub fn add_tree_semisup_loss(
        &mut self,
        a: Tensor<B, 2>,
        b: Tensor<B, 2>,
        labels: Tensor<B, 2, Int>,
        walker_weight: f64,
        visit_weight: f64,
    ) -> Result<()> {
        let tree = self.require_tree()?;
        let equalities = level_equality_matrices(&labels, tree.as_ref(), self.config.max_depth)?;
        ensure_dim("label records", labels.dims()[0], a.dims()[0])?;

        let association = associate(a, b)?;

        // p_ab does not depend on the level
        self.add_visit_loss(association.p_ab, visit_weight)?;

        for (level, equality) in equalities.into_iter().enumerate() {
            let stats = walk_statistics(association.p_aba.clone(), equality.clone());
            let p_aba = (level == 0).then(|| association.p_aba.clone());
            self.record_walk_statistics(p_aba, stats)?;

            let loss = walker_loss(association.p_aba.clone(), equality, walker_weight)?;
            self.register(LossKind::Walker, loss, &format!("Loss_aba{}", level));
        }

        Ok(())
    }

    /// Per-node masked cross-entropy over the tree's logit segments
    pub fn add_tree_logit_loss(
        &mut self,
        logits: Tensor<B, 2>,
        labels: Tensor<B, 2, Int>,
        weight: f64,
    ) -> Result<()> {
        let tree = self.require_tree()?;
        let max_depth = self.config.max_depth;
        let terms = tree_logit_losses(logits, &labels, tree.as_ref(), max_depth, weight)?;

        for term in terms {
            self.register(
                LossKind::Logit,
                term.loss,
                &format!("Loss_Logit_node{}", term.node),
            );
        }
        Ok(())
    }

    /// Per-level cross-entropy over the first two tree levels
    pub fn add_tree_multitask_logit_loss(
        &mut self,
        logits: Tensor<B, 2>,
        labels: Tensor<B, 2, Int>,
    ) -> Result<()> {
        let tree = self.require_tree()?;
        let terms = tree_multitask_logit_losses(logits, &labels, tree.as_ref())?;

        for term in terms {
            self.register(LossKind::Logit, term.loss, &format!("Loss_Logit_{}", term.level));
        }
        Ok(())
    }

    // ---- Statistics and averages ---------------------------------------------------

    /// Estimated round-trip error; feeds the `Stats_EstError` summary and the
    /// moving averages of the error and of `p_aba`. Returns the smoothed error.
    pub fn create_walk_statistics(
        &mut self,
        p_aba: Tensor<B, 2>,
        equality: Tensor<B, 2>,
    ) -> Result<f64> {
        let stats = walk_statistics(p_aba.clone(), equality);
        self.record_walk_statistics(Some(p_aba), stats)
    }

    fn record_walk_statistics(
        &mut self,
        p_aba: Option<Tensor<B, 2>>,
        stats: WalkStatistics<B>,
    ) -> Result<f64> {
        let estimate_error = to_scalar(stats.estimate_error);
        self.summaries.scalar(self.step, "Stats_EstError", estimate_error);

        let name = self.averages.unique_name("p_aba_esterr", self.step);
        let average = self.averages.update_scalar(&name, self.step, estimate_error)?;

        if let Some(p_aba) = p_aba {
            let name = self.averages.unique_name("p_aba", self.step);
            self.add_average(&name, p_aba)?;
        }

        Ok(average)
    }

    /// Fold `value` into the moving average `name` for the current step.
    ///
    /// Registering the same name twice within one step is rejected.
    pub fn add_average<const D: usize>(
        &mut self,
        name: &str,
        value: Tensor<B, D>,
    ) -> Result<Vec<f64>> {
        let values: Vec<f64> = to_vec(value.detach())?.into_iter().map(f64::from).collect();
        self.averages.update(name, self.step, &values)
    }

    /// Build the optimizer step over the summed loss registry.
    pub fn create_train_op(
        &self,
        learning_rate: f64,
    ) -> TrainOp<impl Optimizer<SemisupNet<B, M>, B>> {
        info!(
            "Trainable parameters: {} (learning rate {})",
            self.net.num_params(),
            learning_rate
        );

        let optimizer = AdamConfig::new()
            .with_epsilon(ADAM_EPSILON)
            .init::<B, SemisupNet<B, M>>();
        TrainOp::new(optimizer, learning_rate)
    }

    // ---- Evaluation ----------------------------------------------------------------

    /// Evaluate `endpoint` for all `images`, `test_batch_size` samples at a time.
    pub fn calc_embedding(
        &self,
        images: &Tensor<EvalBackend<B>, 4>,
        endpoint: Endpoint,
    ) -> Result<Tensor<EvalBackend<B>, 2>> {
        self.check_images(&images.dims())?;

        let net = self.eval_net();
        batched_apply(images, self.config.test_batch_size, |chunk| match endpoint {
            Endpoint::Embedding => net.embed(chunk),
            Endpoint::Logits => net.logits(net.embed(chunk)),
        })
    }

    /// Class scores for all `images`
    pub fn classify(
        &self,
        images: &Tensor<EvalBackend<B>, 4>,
    ) -> Result<Tensor<EvalBackend<B>, 2>> {
        self.calc_embedding(images, Endpoint::Logits)
    }

    /// Arg-max class of every image
    pub fn predict(&self, images: &Tensor<EvalBackend<B>, 4>) -> Result<Vec<usize>> {
        let scores = to_vec(self.classify(images)?)?;
        argmax_rows(&scores, self.config.num_labels)
    }

    /// Confusion matrix of the predictions for `images` against `labels`
    pub fn evaluate(
        &self,
        images: &Tensor<EvalBackend<B>, 4>,
        labels: &[usize],
    ) -> Result<ConfusionMatrix> {
        let predictions = self.predict(images)?;
        let cm = confusion_matrix(labels, &predictions, self.config.num_labels)?;
        info!(
            "Evaluated {} images: accuracy {:.2}%",
            cm.total(),
            cm.accuracy() * 100.0
        );
        Ok(cm)
    }

    /// Evaluate `endpoint` on the pre-supplied evaluation input
    pub fn eval_test_input(&self, endpoint: Endpoint) -> Result<Tensor<EvalBackend<B>, 2>> {
        let images = self
            .test_in
            .as_ref()
            .ok_or_else(|| AssocError::EmptyInput("no evaluation input attached".to_string()))?;
        self.calc_embedding(images, endpoint)
    }

    // ---- Accessors -----------------------------------------------------------------

    pub fn config(&self) -> &SemisupConfig {
        &self.config
    }

    pub fn net(&self) -> &SemisupNet<B, M> {
        &self.net
    }

    pub fn tree(&self) -> Option<&dyn TreeStructure> {
        self.tree.as_deref()
    }

    /// Global step, advanced by every train op run
    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn averages(&self) -> &MovingAverages {
        &self.averages
    }

    /// Loss terms registered for the pending step
    pub fn pending_losses(&self) -> &LossCollection<B> {
        &self.losses
    }

    pub fn history(&self) -> &LossHistory {
        &self.history
    }

    pub fn walker_losses(&self) -> &[f64] {
        &self.history.walker_losses
    }

    pub fn visit_losses(&self) -> &[f64] {
        &self.history.visit_losses
    }

    pub fn logit_losses(&self) -> &[f64] {
        &self.history.logit_losses
    }

    pub fn summaries(&self) -> &SummaryWriter {
        &self.summaries
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

#[cfg(all(test, feature = "ndarray"))]
mod tests {
    use super::*;
    use crate::model::tree::{LabelTree, TreeNodeSpec};
    use crate::model::{MlpEmbedder, MlpEmbedderConfig};
    use burn::backend::Autodiff;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray<f32>>;
    type Session = SemisupModel<TestBackend, MlpEmbedder<TestBackend>>;

    const INPUT_SHAPE: [usize; 3] = [1, 2, 2];

    fn session(num_labels: usize, tree: Option<Arc<dyn TreeStructure>>) -> Session {
        let device = Default::default();
        let embedder = MlpEmbedderConfig::new(4)
            .with_hidden_size(16)
            .with_embedding_size(8)
            .init(&device);
        let config = SemisupConfig::new(num_labels, INPUT_SHAPE);
        SemisupModel::new(embedder, config, tree, &device).unwrap()
    }

    /// One image per class id: a single bright pixel at the class position
    fn class_images<BK: burn::tensor::backend::Backend>(classes: &[usize]) -> Tensor<BK, 4> {
        let mut data = vec![0.0f32; classes.len() * 4];
        for (i, &class) in classes.iter().enumerate() {
            data[i * 4 + class % 4] = 1.0;
            data[i * 4 + (class + 1) % 4] = 0.5;
        }
        Tensor::from_data(TensorData::new(data, [classes.len(), 1, 2, 2]), &Default::default())
    }

    fn labels(values: &[i64]) -> Tensor<TestBackend, 1, Int> {
        Tensor::from_data(TensorData::new(values.to_vec(), [values.len()]), &Default::default())
    }

    fn chain_label_tree() -> LabelTree {
        let spec = TreeNodeSpec::node(
            "root",
            vec![TreeNodeSpec::node(
                "mid",
                vec![
                    TreeNodeSpec::leaf("a"),
                    TreeNodeSpec::leaf("b"),
                    TreeNodeSpec::leaf("c"),
                ],
            )],
        );
        LabelTree::new(&spec).unwrap()
    }

    fn chain_tree() -> Arc<dyn TreeStructure> {
        Arc::new(chain_label_tree())
    }

    #[test]
    fn test_train_step() {
        let mut model = session(3, None);
        let sup = [0usize, 0, 1, 1, 2, 2];
        let a = model.image_to_embedding(class_images(&sup)).unwrap();
        let b = model
            .image_to_embedding(class_images(&[0, 1, 2, 0, 1, 2, 0, 1]))
            .unwrap();
        let label_tensor = labels(&[0, 0, 1, 1, 2, 2]);

        model
            .add_semisup_loss(a.clone(), b, label_tensor.clone(), 1.0, 1.0)
            .unwrap();
        let logits = model.embedding_to_logit(a).unwrap();
        model.add_logit_loss(logits, label_tensor, 1.0).unwrap();
        assert_eq!(model.pending_losses().len(), 3);

        let mut train_op = model.create_train_op(1e-3);
        let report = train_op.run(&mut model).unwrap();

        assert_eq!(report.step, 0);
        assert_eq!(model.step(), 1);
        assert!(report.loss.is_finite());
        assert!((report.loss_average - report.loss).abs() < 1e-9);
        assert!(model.pending_losses().is_empty());

        assert_eq!(model.walker_losses().len(), 1);
        assert_eq!(model.visit_losses().len(), 1);
        assert_eq!(model.logit_losses().len(), 1);

        let scalars = model.summaries().at_step(0);
        for name in [
            "Loss_aba",
            "Loss_Visit",
            "Loss_Logit",
            "Stats_EstError",
            "Learning_Rate",
            "Loss_Total",
            "Loss_Total_Avg",
        ] {
            assert!(scalars.contains_key(name), "missing summary {}", name);
        }
        assert!(model.averages().get("p_aba").is_some());
        assert!(model.averages().get("p_aba_esterr").is_some());
    }

    #[test]
    fn test_empty_registry_is_an_error() {
        let mut model = session(3, None);
        let mut train_op = model.create_train_op(1e-3);
        assert!(matches!(train_op.run(&mut model), Err(AssocError::NoLosses)));
        assert_eq!(model.step(), 0);
    }

    #[test]
    fn test_loss_decreases() {
        let mut model = session(4, None);
        let mut train_op = model.create_train_op(1e-2);
        let sup = [0usize, 1, 2, 3, 0, 1, 2, 3];
        let unsup = [3usize, 2, 1, 0, 0, 1, 2, 3];
        let label_values = [0i64, 1, 2, 3, 0, 1, 2, 3];

        let mut totals = Vec::new();
        for _ in 0..30 {
            let a = model.image_to_embedding(class_images(&sup)).unwrap();
            let b = model.image_to_embedding(class_images(&unsup)).unwrap();
            model
                .add_semisup_loss(a.clone(), b, labels(&label_values), 1.0, 1.0)
                .unwrap();
            let logits = model.embedding_to_logit(a).unwrap();
            model.add_logit_loss(logits, labels(&label_values), 1.0).unwrap();

            totals.push(train_op.run(&mut model).unwrap().loss);
        }

        assert_eq!(model.step(), 30);
        assert_eq!(model.walker_losses().len(), 30);
        let first = totals[0];
        let last = totals[totals.len() - 1];
        assert!(last < first, "loss went from {} to {}", first, last);
    }

    #[test]
    fn test_calc_embedding_sample_counts() {
        let model = session(3, None);
        for count in [1usize, 100, 101, 250] {
            let classes: Vec<usize> = (0..count).map(|i| i % 4).collect();
            let images = class_images(&classes);

            let embeddings = model.calc_embedding(&images, Endpoint::Embedding).unwrap();
            assert_eq!(embeddings.dims(), [count, 8]);

            let scores = model.classify(&images).unwrap();
            assert_eq!(scores.dims(), [count, 3]);
            assert_eq!(model.predict(&images).unwrap().len(), count);
        }
    }

    #[test]
    fn test_eval_path_matches_training_path() {
        let model = session(3, None);
        let classes = [0usize, 1, 2];

        let train_scores = to_vec(
            model
                .embedding_to_logit(model.image_to_embedding(class_images(&classes)).unwrap())
                .unwrap(),
        )
        .unwrap();
        let eval_scores = to_vec(model.test_logit(class_images(&classes)).unwrap()).unwrap();

        for (train, eval) in train_scores.iter().zip(&eval_scores) {
            assert!((train - eval).abs() < 1e-6);
        }
    }

    #[test]
    fn test_test_input() {
        let model = session(3, None);
        assert!(model.eval_test_input(Endpoint::Logits).is_err());

        let model = model.with_test_input(class_images(&[0, 1, 2, 3, 0])).unwrap();
        assert_eq!(model.eval_test_input(Endpoint::Logits).unwrap().dims(), [5, 3]);
    }

    #[test]
    fn test_input_validation() {
        let mut model = session(3, None);

        let wrong_shape = Tensor::<TestBackend, 4>::zeros([2, 3, 2, 2], &Default::default());
        assert!(matches!(
            model.image_to_embedding(wrong_shape),
            Err(AssocError::Shape(_))
        ));

        let a = model.image_to_embedding(class_images(&[0, 1])).unwrap();
        let logits = model.embedding_to_logit(a).unwrap();
        assert!(matches!(
            model.add_logit_loss(logits, labels(&[0, 3]), 1.0),
            Err(AssocError::InvalidLabel(_))
        ));
        assert!(model.pending_losses().is_empty());
    }

    #[test]
    fn test_retry_after_failed_loss() {
        let mut model = session(3, None);
        let sup = [0usize, 1, 2];
        let unsup = [2usize, 1, 0, 1];

        let a = model.image_to_embedding(class_images(&sup)).unwrap();
        let b = model.image_to_embedding(class_images(&unsup)).unwrap();
        model
            .add_semisup_loss(a.clone(), b, labels(&[0, 1, 2]), 1.0, 1.0)
            .unwrap();
        let logits = model.embedding_to_logit(a).unwrap();
        assert!(model.add_logit_loss(logits, labels(&[0, 1, 5]), 1.0).is_err());

        assert_eq!(model.discard_pending_losses(), 2);
        assert!(model.pending_losses().is_empty());
        assert!(model.walker_losses().is_empty());
        assert!(model.visit_losses().is_empty());
        assert!(model.averages().get("p_aba_esterr").is_none());
        assert!(model.summaries().at_step(0).is_empty());

        let a = model.image_to_embedding(class_images(&sup)).unwrap();
        let b = model.image_to_embedding(class_images(&unsup)).unwrap();
        model
            .add_semisup_loss(a.clone(), b, labels(&[0, 1, 2]), 1.0, 1.0)
            .unwrap();
        let logits = model.embedding_to_logit(a).unwrap();
        model.add_logit_loss(logits, labels(&[0, 1, 2]), 1.0).unwrap();

        let mut train_op = model.create_train_op(1e-3);
        let report = train_op.run(&mut model).unwrap();
        assert_eq!(report.terms, 3);
        assert_eq!(model.walker_losses().len(), 1);
        assert!(model.averages().get("p_aba_esterr_1").is_none());
        assert_eq!(model.averages().get("p_aba_esterr").unwrap().updates(), 1);
    }

    #[test]
    fn test_duplicate_average_rejected() {
        let mut model = session(3, None);
        let value = Tensor::<TestBackend, 1>::from_floats([0.5], &Default::default());

        model.add_average("custom", value.clone()).unwrap();
        assert!(matches!(
            model.add_average("custom", value),
            Err(AssocError::DuplicateAverage { .. })
        ));
        assert_eq!(model.averages().len(), 1);
    }

    #[test]
    fn test_tree_losses() {
        let label_tree = chain_label_tree();
        let records: Vec<i64> = [[0usize, 0], [0, 1], [0, 2], [0, 0]]
            .iter()
            .flat_map(|path| label_tree.encode_path(path).unwrap())
            .collect();
        let label_records: Tensor<TestBackend, 2, Int> = Tensor::from_data(
            TensorData::new(records, [4, label_tree.label_width()]),
            &Default::default(),
        );

        let tree: Arc<dyn TreeStructure> = Arc::new(label_tree);
        let mut model = session(tree.logit_width(), Some(tree.clone()));
        let a = model.image_to_embedding(class_images(&[0, 1, 2, 0])).unwrap();
        let b = model.image_to_embedding(class_images(&[0, 1, 2, 3, 1])).unwrap();

        model
            .add_tree_semisup_loss(a.clone(), b, label_records.clone(), 1.0, 1.0)
            .unwrap();
        assert_eq!(model.walker_losses().len(), 2);
        assert_eq!(model.visit_losses().len(), 1);
        assert!(model.averages().get("p_aba").is_some());
        assert!(model.averages().get("p_aba_1").is_none());
        assert!(model.averages().get("p_aba_esterr_1").is_some());

        let logits = model.embedding_to_logit(a).unwrap();
        model
            .add_tree_logit_loss(logits.clone(), label_records.clone(), 1.0)
            .unwrap();
        model
            .add_tree_multitask_logit_loss(logits, label_records)
            .unwrap();
        assert_eq!(model.logit_losses().len(), 4);

        let mut train_op = model.create_train_op(1e-3);
        assert!(train_op.run(&mut model).unwrap().loss.is_finite());
    }

    #[test]
    fn test_tree_loss_without_tree() {
        let mut model = session(4, None);
        let a = model.image_to_embedding(class_images(&[0, 1])).unwrap();
        let logits = model.embedding_to_logit(a).unwrap();
        let records: Tensor<TestBackend, 2, Int> = Tensor::zeros([2, 6], &Default::default());

        assert!(matches!(
            model.add_tree_logit_loss(logits, records, 1.0),
            Err(AssocError::MissingTree)
        ));
    }

    #[test]
    fn test_tree_width_must_fit_labels() {
        let device = Default::default();
        let embedder = MlpEmbedderConfig::new(4).init::<TestBackend>(&device);
        let config = SemisupConfig::new(2, INPUT_SHAPE);
        assert!(matches!(
            Session::new(embedder, config, Some(chain_tree()), &device),
            Err(AssocError::Config(_))
        ));
    }
}
