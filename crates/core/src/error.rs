use thiserror::Error;

use crate::mastery::ConfigError;
use crate::model::{SessionPlanError, ValueError};
use crate::scheduler::ScheduleConfigError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error(transparent)]
    MasteryConfig(#[from] ConfigError),
    #[error(transparent)]
    ScheduleConfig(#[from] ScheduleConfigError),
    #[error(transparent)]
    SessionPlan(#[from] SessionPlanError),
}
