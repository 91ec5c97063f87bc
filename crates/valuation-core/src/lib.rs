pub mod error;
pub mod sector;
pub mod stats;
pub mod traits;
pub mod types;

pub use error::*;
pub use sector::*;
pub use traits::*;
pub use types::*;
