pub mod duration;
pub mod error;
pub mod layout;
pub mod loader;
pub mod render;
pub mod report;
pub mod trace;
