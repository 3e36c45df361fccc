pub mod adherence;
pub mod alert;
pub mod enums;
pub mod prescription;

pub use adherence::*;
pub use alert::*;
pub use enums::*;
pub use prescription::*;
