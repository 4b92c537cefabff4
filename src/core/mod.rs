// Core domain layer
pub mod graph;
pub mod interfaces;
pub mod models;
pub mod plugin;
pub mod services;

pub use graph::*;
pub use interfaces::*;
pub use models::*;
pub use plugin::*;
pub use services::*;
