// ABOUTME: Domain identity types shared by every orchestrator component.
// ABOUTME: Fleet colors, phantom-typed IDs, and validated resource names.

mod color;
mod id;
mod name;

pub use color::{Color, ParseColorError, PerColor};
pub use id::{Id, InstanceId, LifecycleToken};
pub use name::{MAX_NAME_LEN, NameError, ResourceName};
