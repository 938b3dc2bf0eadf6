use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoanError {
    #[error("degenerate rate quote: {field} must be at least 1")]
    DegenerateRate { field: &'static str },

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("input closed before all loan terms were entered")]
    InputClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

pub type Result<T> = std::result::Result<T, LoanError>;
