pub mod api;
pub mod error;
pub mod types;

pub use api::NewsApi;
pub use error::{Error, Result};
pub use types::*;
