pub mod attachment;
pub mod common;
pub mod document;

pub use attachment::*;
pub use common::*;
pub use document::*;
