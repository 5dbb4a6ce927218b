pub mod error;

pub use error::ScreeningError;
