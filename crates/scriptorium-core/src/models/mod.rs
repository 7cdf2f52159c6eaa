pub mod agent;
pub mod context;
pub mod input;
pub mod result;

pub use agent::*;
pub use context::*;
pub use input::*;
pub use result::*;
