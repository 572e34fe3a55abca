//! Early-stopping state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the loop stands after an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoppingState {
    /// The last epoch set a new best validation loss
    Improving,
    /// `k` consecutive epochs without improvement, `k < patience`
    Plateau(usize),
    /// `patience` consecutive epochs without improvement (terminal)
    Stopped,
}

impl fmt::Display for StoppingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoppingState::Improving => write!(f, "IMPROVING"),
            StoppingState::Plateau(k) => write!(f, "PLATEAU({k})"),
            StoppingState::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Tracks the best validation loss and the plateau counter.
///
/// # Example
///
/// ```
/// use return_forecast::training::{EarlyStopping, StoppingState};
///
/// let mut es = EarlyStopping::new(2);
/// assert_eq!(es.observe(1, 0.5), StoppingState::Improving);
/// assert_eq!(es.observe(2, 0.6), StoppingState::Plateau(1));
/// assert_eq!(es.observe(3, 0.7), StoppingState::Stopped);
/// assert_eq!(es.best_epoch(), Some(1));
/// ```
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best_loss: f64,
    best_epoch: Option<usize>,
    counter: usize,
    state: StoppingState,
}

impl EarlyStopping {
    /// Start in `Improving` with best loss `+inf`.
    pub fn new(patience: usize) -> Self {
        Self {
            patience: patience.max(1),
            best_loss: f64::INFINITY,
            best_epoch: None,
            counter: 0,
            state: StoppingState::Improving,
        }
    }

    /// Record an epoch's validation loss and return the new state.
    ///
    /// Strict improvement only; NaN never improves. Observing after `Stopped`
    /// leaves the state unchanged.
    pub fn observe(&mut self, epoch: usize, val_loss: f64) -> StoppingState {
        if self.state == StoppingState::Stopped {
            return self.state;
        }

        if val_loss < self.best_loss {
            self.best_loss = val_loss;
            self.best_epoch = Some(epoch);
            self.counter = 0;
            self.state = StoppingState::Improving;
        } else {
            self.counter += 1;
            self.state = if self.counter >= self.patience {
                StoppingState::Stopped
            } else {
                StoppingState::Plateau(self.counter)
            };
        }
        self.state
    }

    /// Current state.
    pub fn state(&self) -> StoppingState {
        self.state
    }

    /// Whether the terminal state was reached.
    pub fn should_stop(&self) -> bool {
        self.state == StoppingState::Stopped
    }

    /// Lowest validation loss seen.
    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    /// Epoch of the lowest validation loss.
    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Configured patience.
    pub fn patience(&self) -> usize {
        self.patience
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(losses: &[f64], patience: usize) -> (EarlyStopping, Vec<StoppingState>) {
        let mut es = EarlyStopping::new(patience);
        let mut states = Vec::new();
        for (i, &loss) in losses.iter().enumerate() {
            let state = es.observe(i + 1, loss);
            states.push(state);
            if state == StoppingState::Stopped {
                break;
            }
        }
        (es, states)
    }

    #[test]
    fn test_plateau_counts_then_stops() {
        let (es, states) = run(&[0.5, 0.4, 0.41, 0.42, 0.43, 0.44, 0.45, 0.46], 5);
        assert_eq!(
            states,
            vec![
                StoppingState::Improving,
                StoppingState::Improving,
                StoppingState::Plateau(1),
                StoppingState::Plateau(2),
                StoppingState::Plateau(3),
                StoppingState::Plateau(4),
                StoppingState::Stopped,
            ]
        );
        assert_eq!(es.best_epoch(), Some(2));
        assert!((es.best_loss() - 0.4).abs() < 1e-15);
    }

    #[test]
    fn test_improvement_resets_counter() {
        let (es, states) = run(&[1.0, 1.1, 1.2, 0.9, 1.0], 3);
        assert_eq!(states[3], StoppingState::Improving);
        assert_eq!(states[4], StoppingState::Plateau(1));
        assert_eq!(es.best_epoch(), Some(4));
        assert!(!es.should_stop());
    }

    #[test]
    fn test_equal_loss_is_not_improvement() {
        let mut es = EarlyStopping::new(1);
        es.observe(1, 0.3);
        assert_eq!(es.observe(2, 0.3), StoppingState::Stopped);
        assert_eq!(es.best_epoch(), Some(1));
    }

    #[test]
    fn test_nan_never_improves() {
        let mut es = EarlyStopping::new(3);
        assert_eq!(es.observe(1, f64::NAN), StoppingState::Plateau(1));
        assert_eq!(es.best_epoch(), None);
    }

    #[test]
    fn test_stopped_is_terminal() {
        let mut es = EarlyStopping::new(1);
        es.observe(1, 0.5);
        es.observe(2, 0.6);
        assert_eq!(es.observe(3, 0.1), StoppingState::Stopped);
        assert_eq!(es.best_epoch(), Some(1));
    }

    #[test]
    fn test_display() {
        assert_eq!(StoppingState::Plateau(3).to_string(), "PLATEAU(3)");
        assert_eq!(StoppingState::Stopped.to_string(), "STOPPED");
    }
}
