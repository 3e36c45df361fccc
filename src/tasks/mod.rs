pub mod background;
pub mod low_adherence;
pub mod reminder;

pub use background::{spawn_periodic, TaskHandle};
