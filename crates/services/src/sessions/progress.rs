use literacy_core::model::SessionPlan;

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionProgress {
    pub completed: usize,
    pub total: usize,
    /// `0.0..=100.0`; an empty plan reports 100.
    pub percentage: f64,
}

impl SessionProgress {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn of(plan: &SessionPlan) -> Self {
        let total = plan.steps().len();
        let completed = plan.current_step_index().min(total);
        let percentage = if total == 0 {
            100.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        Self {
            completed,
            total,
            percentage,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.total - self.completed
    }
}
