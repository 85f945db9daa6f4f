pub mod change_set;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use change_set::*;
pub use memory::*;
pub use postgres::*;
pub use traits::*;
