pub mod error;

pub use error::{KeyError, Result};
