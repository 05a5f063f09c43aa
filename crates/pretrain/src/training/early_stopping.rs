//! Patience-based early stopping on relative loss change.

/// Best monitored value seen so far and the current patience count.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BestMetricState {
    /// `None` until the first epoch has been evaluated.
    pub value: Option<f64>,
    pub patience_counter: usize,
}

/// Outcome of feeding one epoch's loss to [`EarlyStopping::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlyStopDecision {
    /// First epoch; the best value was initialised.
    Initialized,
    /// Loss improved (or stayed within tolerance); counter reset.
    Improved,
    /// No improvement; training continues.
    NotImproved { patience_counter: usize },
    /// Patience exhausted.
    Stop,
}

impl EarlyStopDecision {
    pub fn should_stop(self) -> bool {
        matches!(self, Self::Stop)
    }
}

/// Tracks the monitored loss across epochs.
///
/// For a current loss `c` and best loss `b`, the relative change is
/// `(c - b) / c`. A change strictly greater than `tolerance` counts as no
/// improvement; anything else, including a change exactly equal to
/// `tolerance`, replaces the best value and resets the counter.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    tolerance: f64,
    patience: usize,
    state: BestMetricState,
}

impl EarlyStopping {
    pub fn new(tolerance: f64, patience: usize) -> Self {
        Self {
            tolerance,
            patience,
            state: BestMetricState::default(),
        }
    }

    pub fn state(&self) -> BestMetricState {
        self.state
    }

    /// Feed one epoch's monitored loss.
    pub fn update(&mut self, current: f64) -> EarlyStopDecision {
        let Some(best) = self.state.value else {
            self.state.value = Some(current);
            return EarlyStopDecision::Initialized;
        };

        let change = if current == best {
            0.0
        } else {
            (current - best) / current
        };

        // A non-finite loss never counts as an improvement
        if !current.is_finite() || change > self.tolerance {
            self.state.patience_counter += 1;
            if self.state.patience_counter >= self.patience {
                return EarlyStopDecision::Stop;
            }
            EarlyStopDecision::NotImproved {
                patience_counter: self.state.patience_counter,
            }
        } else {
            self.state.value = Some(current);
            self.state.patience_counter = 0;
            EarlyStopDecision::Improved
        }
    }
}
