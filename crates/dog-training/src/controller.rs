//! Epoch-level training controller.
//!
//! Each epoch runs, in order: fit, evaluate, weighted F1, checkpoint policy,
//! learning-rate policy, early-stopping policy. The run always ends with the
//! best-by-validation-accuracy snapshot restored into the engine.

use dog_core::{weighted_f1, EpochMetrics, Error, Result, TrainingConfig, TrainingHistory};
use dog_dataset::ClassWeightTable;
use tracing::{debug, info, warn};

use crate::checkpoint::{CheckpointPolicy, CheckpointSink, CheckpointState};
use crate::early_stopping::EarlyStopping;
use crate::engine::{NumericEngine, ValidationPass};
use crate::lr_schedule::{PlateauConfig, ReduceLrOnPlateau};

/// Epoch budget, initial rate and policy settings for one run
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub epochs: usize,
    pub initial_lr: f64,
    pub plateau: PlateauConfig,
    pub early_stopping_patience: usize,
    pub early_stopping_min_delta: f64,
}

impl From<&TrainingConfig> for ControllerConfig {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            epochs: config.training.epochs,
            initial_lr: config.training.learning_rate,
            plateau: PlateauConfig::from(&config.policies),
            early_stopping_patience: config.policies.early_stopping_patience,
            early_stopping_min_delta: config.policies.early_stopping_min_delta,
        }
    }
}

/// Controller transitions. Epochs are zero-based.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControllerState {
    Running { epoch: usize },
    ImprovedCheckpoint { epoch: usize },
    PlateauLr { epoch: usize, new_lr: f64 },
    EarlyStopped { epoch: usize },
    Completed { epochs: usize },
}

impl ControllerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::EarlyStopped { .. } | Self::Completed { .. })
    }
}

/// What a finished run hands back
pub struct TrainingOutcome<E: NumericEngine> {
    /// Engine holding the restored best snapshot
    pub engine: E,
    pub best: CheckpointState<E::Snapshot>,
    pub history: TrainingHistory,
    pub terminal: ControllerState,
    pub transitions: Vec<ControllerState>,
    pub final_lr: f64,
}

type EpochObserver = Box<dyn FnMut(&EpochMetrics)>;

/// Drives a [`NumericEngine`] through one training run.
pub struct TrainingController<E: NumericEngine> {
    engine: E,
    config: ControllerConfig,
    class_weights: ClassWeightTable,
    checkpoint: CheckpointPolicy<E::Snapshot>,
    lr_policy: ReduceLrOnPlateau,
    early_stopping: EarlyStopping,
    history: TrainingHistory,
    transitions: Vec<ControllerState>,
    sink: Option<Box<dyn CheckpointSink<E::Snapshot>>>,
    observer: Option<EpochObserver>,
}

impl<E: NumericEngine> TrainingController<E> {
    pub fn new(engine: E, config: ControllerConfig, class_weights: ClassWeightTable) -> Self {
        let lr_policy = ReduceLrOnPlateau::new(config.plateau.clone(), config.initial_lr);
        let early_stopping =
            EarlyStopping::new(config.early_stopping_patience, config.early_stopping_min_delta);
        Self {
            engine,
            config,
            class_weights,
            checkpoint: CheckpointPolicy::new(),
            lr_policy,
            early_stopping,
            history: TrainingHistory::new(),
            transitions: Vec::new(),
            sink: None,
            observer: None,
        }
    }

    /// Persist every promoted checkpoint through `sink`.
    pub fn with_sink(mut self, sink: impl CheckpointSink<E::Snapshot> + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Call `observer` after each completed epoch.
    pub fn on_epoch(mut self, observer: impl FnMut(&EpochMetrics) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    fn transition(&mut self, state: ControllerState) {
        debug!("Controller state: {:?}", state);
        self.transitions.push(state);
    }

    /// Run until early stopping fires or the epoch budget is spent.
    pub fn run(mut self) -> Result<TrainingOutcome<E>> {
        info!(
            "Starting training: {} epochs, initial learning rate {:.3e}",
            self.config.epochs, self.config.initial_lr
        );

        let mut terminal = None;
        for epoch in 0..self.config.epochs {
            if self.run_epoch(epoch)? {
                terminal = Some(ControllerState::EarlyStopped { epoch });
                break;
            }
        }
        let terminal = terminal.unwrap_or(ControllerState::Completed {
            epochs: self.config.epochs,
        });
        self.transition(terminal);

        let best = self.checkpoint.into_best().ok_or(Error::NoCheckpoint)?;
        self.engine.restore(best.snapshot.clone());
        info!(
            "Training finished ({:?}); restored best model from epoch {} with validation accuracy {:.2}%",
            terminal,
            best.epoch + 1,
            best.val_accuracy * 100.0
        );

        Ok(TrainingOutcome {
            engine: self.engine,
            best,
            history: self.history,
            terminal,
            transitions: self.transitions,
            final_lr: self.lr_policy.current_lr(),
        })
    }

    /// One epoch. Returns `true` when early stopping fired.
    fn run_epoch(&mut self, epoch: usize) -> Result<bool> {
        self.transition(ControllerState::Running { epoch });
        let learning_rate = self.lr_policy.current_lr();

        let fit = self
            .engine
            .fit_epoch(learning_rate, &self.class_weights)
            .map_err(|e| divergence(epoch, e.to_string()))?;
        if !fit.loss.is_finite() {
            return Err(divergence(epoch, format!("non-finite training loss {}", fit.loss)));
        }

        let pass = self
            .engine
            .evaluate()
            .map_err(|e| divergence(epoch, format!("evaluation failed: {e}")))?;

        let metrics = EpochMetrics {
            epoch,
            train_loss: fit.loss,
            train_accuracy: fit.accuracy,
            val_loss: pass.loss,
            val_accuracy: pass.accuracy,
            weighted_f1: self.epoch_f1(&pass),
            learning_rate,
        };
        info!(
            "Epoch {}/{}: train_loss={:.4}, train_acc={:.2}%, val_loss={:.4}, val_acc={:.2}%, weighted_f1={:.4}, lr={:.3e}",
            epoch + 1,
            self.config.epochs,
            metrics.train_loss,
            metrics.train_accuracy * 100.0,
            metrics.val_loss,
            metrics.val_accuracy * 100.0,
            metrics.weighted_f1,
            learning_rate
        );
        self.history.push(metrics.clone());
        if let Some(observer) = self.observer.as_mut() {
            observer(&metrics);
        }

        if self.checkpoint.improves(metrics.val_accuracy) {
            let state = self.checkpoint.promote(CheckpointState {
                snapshot: self.engine.snapshot(),
                val_accuracy: metrics.val_accuracy,
                epoch,
            });
            if let Some(sink) = self.sink.as_mut() {
                sink.persist(state)?;
            }
            self.transition(ControllerState::ImprovedCheckpoint { epoch });
        }

        if let Some(new_lr) = self.lr_policy.step(metrics.val_loss) {
            self.transition(ControllerState::PlateauLr { epoch, new_lr });
        }

        Ok(self.early_stopping.step(metrics.val_accuracy))
    }

    fn epoch_f1(&self, pass: &ValidationPass) -> f64 {
        let predictions: Option<Vec<usize>> = pass
            .probabilities
            .iter()
            .map(|probs| dog_core::argmax(probs))
            .collect();

        let result = match predictions {
            Some(predictions) => weighted_f1(
                &predictions,
                &pass.targets,
                self.class_weights.num_classes(),
            ),
            None => Err(Error::Training("probability row without a finite maximum".into())),
        };
        result.unwrap_or_else(|e| {
            warn!("Weighted F1 unavailable: {e}");
            f64::NAN
        })
    }
}

fn divergence(epoch: usize, cause: String) -> Error {
    Error::TrainingDivergence { epoch, cause }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::engine::EpochFit;

    #[derive(Debug, Clone, Copy)]
    struct Step {
        train_loss: f64,
        val_loss: f64,
        val_accuracy: f64,
        fail: bool,
    }

    fn step(val_loss: f64, val_accuracy: f64) -> Step {
        Step {
            train_loss: 0.5,
            val_loss,
            val_accuracy,
            fail: false,
        }
    }

    /// Replays one scripted step per epoch. The snapshot is the number of fit
    /// passes that produced the current weights.
    struct ScriptedEngine {
        steps: Vec<Step>,
        fitted: usize,
        weights: usize,
        learning_rates: Vec<f64>,
        probabilities: Vec<Vec<f32>>,
    }

    impl ScriptedEngine {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps,
                fitted: 0,
                weights: 0,
                learning_rates: Vec::new(),
                probabilities: vec![vec![0.9, 0.1], vec![0.2, 0.8]],
            }
        }
    }

    impl NumericEngine for ScriptedEngine {
        type Snapshot = usize;

        fn fit_epoch(&mut self, learning_rate: f64, _weights: &ClassWeightTable) -> Result<EpochFit> {
            let step = self.steps[self.fitted];
            self.fitted += 1;
            self.learning_rates.push(learning_rate);
            if step.fail {
                return Err(Error::Training("device lost".into()));
            }
            self.weights = self.fitted;
            Ok(EpochFit {
                loss: step.train_loss,
                accuracy: 0.5,
            })
        }

        fn evaluate(&mut self) -> Result<ValidationPass> {
            let step = self.steps[self.fitted - 1];
            Ok(ValidationPass {
                loss: step.val_loss,
                accuracy: step.val_accuracy,
                probabilities: self.probabilities.clone(),
                targets: vec![0, 1],
            })
        }

        fn snapshot(&self) -> usize {
            self.weights
        }

        fn restore(&mut self, snapshot: usize) {
            self.weights = snapshot;
        }
    }

    fn config(epochs: usize, es_patience: usize) -> ControllerConfig {
        ControllerConfig {
            epochs,
            initial_lr: 1e-3,
            plateau: PlateauConfig::default(),
            early_stopping_patience: es_patience,
            early_stopping_min_delta: 0.0,
        }
    }

    fn controller(steps: Vec<Step>, epochs: usize, es_patience: usize) -> TrainingController<ScriptedEngine> {
        TrainingController::new(
            ScriptedEngine::new(steps),
            config(epochs, es_patience),
            ClassWeightTable::uniform(2),
        )
    }

    /// Loss keeps improving so only the accuracy sequence matters.
    fn accuracy_steps(accuracies: &[f64]) -> Vec<Step> {
        accuracies
            .iter()
            .enumerate()
            .map(|(i, &acc)| step(1.0 - 0.01 * i as f64, acc))
            .collect()
    }

    #[test]
    fn completed_run_restores_best_snapshot() {
        let outcome = controller(accuracy_steps(&[0.5, 0.7, 0.6, 0.7, 0.65]), 5, 10)
            .run()
            .unwrap();

        assert_eq!(outcome.terminal, ControllerState::Completed { epochs: 5 });
        assert_eq!(outcome.best.epoch, 1);
        assert_eq!(outcome.best.val_accuracy, 0.7);
        // weights after the second fit pass
        assert_eq!(outcome.engine.weights, 2);
        assert_eq!(outcome.history.len(), 5);

        let improved: Vec<_> = outcome
            .transitions
            .iter()
            .filter_map(|s| match s {
                ControllerState::ImprovedCheckpoint { epoch } => Some(*epoch),
                _ => None,
            })
            .collect();
        assert_eq!(improved, vec![0, 1]);
    }

    #[test]
    fn early_stopped_run_restores_best_snapshot() {
        let outcome = controller(accuracy_steps(&[0.5, 0.6, 0.55, 0.55, 0.55, 0.9]), 6, 3)
            .run()
            .unwrap();

        assert_eq!(outcome.terminal, ControllerState::EarlyStopped { epoch: 4 });
        assert_eq!(outcome.transitions.last(), Some(&ControllerState::EarlyStopped { epoch: 4 }));
        assert_eq!(outcome.history.len(), 5);
        assert_eq!(outcome.best.epoch, 1);
        assert_eq!(outcome.engine.weights, 2);
    }

    #[test]
    fn best_snapshot_matches_history_maximum() {
        let accuracies = [0.31, 0.45, 0.45, 0.62, 0.2, 0.61, 0.62, 0.5];
        let outcome = controller(accuracy_steps(&accuracies), accuracies.len(), 100)
            .run()
            .unwrap();

        let best = outcome.history.best_by_val_accuracy().unwrap();
        assert_eq!(best.epoch, 3);
        assert_eq!(outcome.best.epoch, 3);
        assert_eq!(outcome.engine.weights, 4);
    }

    #[test]
    fn accuracy_improving_every_third_epoch_never_stops_early() {
        let accuracies: Vec<f64> = (0..30).map(|i| 0.1 + 0.01 * (i / 3) as f64).collect();
        let outcome = controller(accuracy_steps(&accuracies), 30, 5).run().unwrap();

        assert_eq!(outcome.terminal, ControllerState::Completed { epochs: 30 });
        assert_eq!(outcome.history.len(), 30);
    }

    #[test]
    fn stagnant_loss_halves_learning_rate_once() {
        let steps = vec![step(1.0, 0.5), step(1.0, 0.6), step(1.0, 0.7), step(1.0, 0.8)];
        let outcome = controller(steps, 4, 10).run().unwrap();

        let plateaus: Vec<_> = outcome
            .transitions
            .iter()
            .filter(|s| matches!(s, ControllerState::PlateauLr { .. }))
            .collect();
        assert_eq!(
            plateaus,
            vec![&ControllerState::PlateauLr {
                epoch: 2,
                new_lr: 5e-4
            }]
        );
        assert_eq!(outcome.final_lr, 5e-4);

        let recorded: Vec<f64> = outcome.history.epochs.iter().map(|m| m.learning_rate).collect();
        assert_eq!(recorded, vec![1e-3, 1e-3, 1e-3, 5e-4]);
        assert_eq!(outcome.engine.learning_rates, recorded);
    }

    #[test]
    fn plateau_and_early_stop_can_fire_together() {
        let steps = vec![step(1.0, 0.5), step(1.0, 0.5), step(1.0, 0.5)];
        let outcome = controller(steps, 3, 2).run().unwrap();

        let tail = &outcome.transitions[outcome.transitions.len() - 2..];
        assert_eq!(
            tail,
            [
                ControllerState::PlateauLr {
                    epoch: 2,
                    new_lr: 5e-4
                },
                ControllerState::EarlyStopped { epoch: 2 },
            ]
        );
    }

    #[test]
    fn nan_metrics_count_as_no_improvement() {
        let steps = vec![
            step(f64::NAN, f64::NAN),
            step(0.8, 0.4),
            step(f64::NAN, f64::NAN),
            step(0.9, 0.3),
        ];
        let outcome = controller(steps, 4, 10).run().unwrap();

        assert_eq!(outcome.best.epoch, 1);
        assert_eq!(outcome.engine.weights, 2);
        assert!(outcome.history.epochs[0].val_accuracy.is_nan());
    }

    #[test]
    fn run_without_finite_accuracy_has_no_checkpoint() {
        let steps = vec![step(1.0, f64::NAN), step(1.0, f64::NAN)];
        let err = controller(steps, 2, 10).run().err().unwrap();
        assert!(matches!(err, Error::NoCheckpoint));
    }

    #[test]
    fn engine_error_is_training_divergence() {
        let mut steps = accuracy_steps(&[0.5, 0.6, 0.7]);
        steps[2].fail = true;
        let err = controller(steps, 3, 10).run().err().unwrap();

        match err {
            Error::TrainingDivergence { epoch, cause } => {
                assert_eq!(epoch, 2);
                assert!(cause.contains("device lost"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_finite_training_loss_is_training_divergence() {
        let mut steps = accuracy_steps(&[0.5, 0.6]);
        steps[1].train_loss = f64::INFINITY;
        let err = controller(steps, 2, 10).run().err().unwrap();
        assert!(matches!(err, Error::TrainingDivergence { epoch: 1, .. }));
    }

    #[test]
    fn weighted_f1_is_recorded_per_epoch() {
        let outcome = controller(accuracy_steps(&[1.0]), 1, 10).run().unwrap();
        assert!((outcome.history.epochs[0].weighted_f1 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unusable_probabilities_give_nan_f1() {
        let mut engine = ScriptedEngine::new(accuracy_steps(&[0.5]));
        engine.probabilities = vec![vec![f32::NAN, f32::NAN], vec![0.2, 0.8]];
        let outcome = TrainingController::new(engine, config(1, 10), ClassWeightTable::uniform(2))
            .run()
            .unwrap();
        assert!(outcome.history.epochs[0].weighted_f1.is_nan());
    }

    struct RecordingSink {
        persisted: Rc<RefCell<Vec<usize>>>,
        fail_at_epoch: Option<usize>,
    }

    impl CheckpointSink<usize> for RecordingSink {
        fn persist(&mut self, state: &CheckpointState<usize>) -> Result<()> {
            if self.fail_at_epoch == Some(state.epoch) {
                return Err(Error::Io(std::io::Error::other("disk full")));
            }
            self.persisted.borrow_mut().push(state.epoch);
            Ok(())
        }
    }

    #[test]
    fn sink_receives_every_promoted_checkpoint() {
        let persisted = Rc::new(RefCell::new(Vec::new()));
        let sink = RecordingSink {
            persisted: Rc::clone(&persisted),
            fail_at_epoch: None,
        };

        controller(accuracy_steps(&[0.5, 0.4, 0.6, 0.6]), 4, 10)
            .with_sink(sink)
            .run()
            .unwrap();
        assert_eq!(*persisted.borrow(), vec![0, 2]);
    }

    #[test]
    fn sink_failure_is_fatal() {
        let sink = RecordingSink {
            persisted: Rc::new(RefCell::new(Vec::new())),
            fail_at_epoch: Some(1),
        };
        let err = controller(accuracy_steps(&[0.5, 0.6, 0.7]), 3, 10)
            .with_sink(sink)
            .run()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn observer_sees_each_epoch() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let recorder = Rc::clone(&seen);

        controller(accuracy_steps(&[0.5, 0.6, 0.7]), 3, 10)
            .on_epoch(move |m| recorder.borrow_mut().push(m.epoch))
            .run()
            .unwrap();
        assert_eq!(*seen.borrow(), vec![0, 1, 2]);
    }
}
