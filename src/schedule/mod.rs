pub mod builder;
pub mod expander;
pub mod resolver;

pub use builder::*;
pub use expander::*;
pub use resolver::*;
