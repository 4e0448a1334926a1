//! The `utils` module holds the pieces shared by every component: the error
//! taxonomy and logging initialisation.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
