pub mod diff;
pub mod path;
pub mod validate;

pub use diff::{difference, is_equal, stripped};
pub use path::{get, parse_path, set, PathError, Segment};
pub use validate::{apply_field_update, has_errors, FieldScope};
