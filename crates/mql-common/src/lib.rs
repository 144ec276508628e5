pub mod error;
pub mod types;
pub mod config;

pub use config::{PlaceholderStyle, QueryConfig};
pub use error::{MqlError, MqlResult};
pub use types::*;
