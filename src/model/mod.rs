pub mod common;
pub mod condition;
pub mod config_def;
pub mod event;
pub mod membership;
pub mod project;
pub mod proposal;
pub mod revision;
pub mod user_context;
pub mod variant;

pub use common::*;
pub use condition::*;
pub use config_def::*;
pub use event::*;
pub use membership::*;
pub use project::*;
pub use proposal::*;
pub use revision::*;
pub use user_context::*;
pub use variant::*;
