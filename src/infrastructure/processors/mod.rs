// Processors module
pub mod commonjs;
pub mod css_processor;
pub mod js_scanner;
pub mod linker;
pub mod minifier;

pub use commonjs::{transform_commonjs, CommonJsOutput};
pub use css_processor::*;
pub use linker::{link, LinkModule, LinkedBundle, ModuleRef};
pub use minifier::*;
