pub mod error;
pub mod value;

pub use error::{AdminError, AdminErrorKind};
pub use value::{Opaque, Setting, SharedObject};
