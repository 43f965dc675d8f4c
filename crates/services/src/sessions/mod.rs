mod flow;
mod plan;
mod progress;
mod store;
mod timer;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use flow::{FlowState, SessionFlow};
pub use plan::{
    AutoFlowConfig, RecommendationPolicy, advance_step, create_auto_flow_session,
    create_menu_mode_session, get_next_step, get_recommended_mode, get_session_progress,
    is_session_complete,
};
pub use progress::SessionProgress;
pub use store::SessionStore;
pub use timer::{AdvanceTimer, DEFAULT_ADVANCE_DELAY};
