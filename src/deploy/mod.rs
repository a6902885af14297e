// ABOUTME: Deployment state machine, orchestration, and persistence.
// ABOUTME: Exports the orchestrator, rollout stages, and the state store.

mod error;
mod history;
mod intent;
mod lock;
mod machine;
mod orchestrator;
mod poll;
mod rollout;
mod stages;
mod state;
mod store;

pub use error::{TransitionError, TransitionErrorKind};
pub use history::{HistoryEntry, MAX_HISTORY, current_actor};
pub use intent::Intent;
pub use lock::{DeployLock, LockError, LockInfo, with_lock};
pub use orchestrator::Orchestrator;
pub use poll::{CancellationSignal, PollError, Progress, poll_until};
pub use rollout::{Rollout, RolloutPlan, TransitionResult};
pub use stages::{Completed, Flipped, Initialized, StandbyReady, StandbyScaling};
pub use state::{DeploymentState, Phase};
pub use store::{StateStore, StoreError};
