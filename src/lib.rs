pub mod error;
pub mod export;
pub mod loan;
pub mod prompt;
pub mod rate;

pub use error::{LoanError, Result};
