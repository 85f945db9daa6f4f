pub mod access;
pub mod change_plan;
pub mod condition_matcher;
pub mod config_ops;
pub mod environment_ops;
pub mod evaluate;
pub mod events;
pub mod permissions;
pub mod project_ops;
pub mod proposal_workflow;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_support;

pub use access::*;
pub use change_plan::*;
pub use condition_matcher::*;
pub use config_ops::*;
pub use environment_ops::*;
pub use evaluate::*;
pub use events::*;
pub use permissions::*;
pub use project_ops::*;
pub use proposal_workflow::*;
pub use validate::*;
