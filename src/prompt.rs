//! Interactive collection of loan terms.
//!
//! Malformed numbers are reported and asked again, so parse failures never
//! leave this module.

use crate::error::{LoanError, Result};
use crate::loan::{ExtraPayments, RecomputePolicy};
use crate::rate::{QuoteBasis, RateQuote, RateTiming};
use log::{debug, warn};
use std::io::{BufRead, Write};

/// Everything the schedule generator needs, as entered by the user.
#[derive(Clone, PartialEq, Debug)]
pub struct LoanTerms {
    pub principal: f64,
    pub quote: RateQuote,
    pub total_periods: u32,
    pub extra_payments: ExtraPayments,
    pub policy: RecomputePolicy,
}

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_line(&mut self, message: &str) -> Result<String> {
        write!(self.output, "{}", message)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(LoanError::InputClosed);
        }
        Ok(line.trim().to_string())
    }

    /// Accepts either `.` or `,` as the decimal separator.
    pub fn ask_f64(&mut self, message: &str) -> Result<f64> {
        loop {
            let line = self.read_line(message)?;
            match line.replace(',', ".").parse::<f64>() {
                Ok(value) if value.is_finite() => return Ok(value),
                _ => {
                    warn!("rejected numeric input {:?}", line);
                    writeln!(
                        self.output,
                        "Invalid input. Use digits and a decimal point (e.g. 3.5). Try again."
                    )?;
                }
            }
        }
    }

    pub fn ask_u32(&mut self, message: &str) -> Result<u32> {
        loop {
            let line = self.read_line(message)?;
            match line.parse::<u32>() {
                Ok(value) => return Ok(value),
                Err(_) => {
                    warn!("rejected integer input {:?}", line);
                    writeln!(self.output, "Invalid input. Enter a whole number. Try again.")?;
                }
            }
        }
    }

    // counts the rate conversion and the installment formula divide by
    fn ask_count(&mut self, message: &str) -> Result<u32> {
        loop {
            let value = self.ask_u32(message)?;
            if value > 0 {
                return Ok(value);
            }
            writeln!(self.output, "The value must be at least 1. Try again.")?;
        }
    }

    /// Lower-cased, trimmed free text.
    pub fn ask_token(&mut self, message: &str) -> Result<String> {
        Ok(self.read_line(message)?.to_lowercase())
    }

    pub fn ask_yes_no(&mut self, message: &str) -> Result<bool> {
        let answer = self.ask_token(message)?;
        Ok(matches!(answer.as_str(), "s" | "si" | "y" | "yes"))
    }

    pub fn collect_terms(&mut self) -> Result<LoanTerms> {
        let principal = self.ask_f64("Loan amount ($): ")?;
        let rate_value = self.ask_f64("Interest rate (%): ")? / 100.;
        let basis = QuoteBasis::from_token(&self.ask_token("Rate basis (nominal/effective): ")?);
        let timing = RateTiming::from_token(&self.ask_token("Rate timing (arrears/advance): ")?);
        let compounding = self.ask_count("Compounding periods per year (e.g. 12 for monthly): ")?;
        let payments = self.ask_count("Payments per year (12 monthly, 4 quarterly, etc.): ")?;
        let total_periods = self.ask_count("Total term in periods: ")?;
        let quote = RateQuote::new(rate_value, basis, timing, compounding, payments)?;

        let mut extra_payments = ExtraPayments::new();
        if self.ask_yes_no("Add extra payments? (y/n): ")? {
            loop {
                let period = self.ask_u32("Extra payment period: ")?;
                let amount = self.ask_f64("Extra payment amount ($): ")?;
                extra_payments.insert(period, amount);
                if !self.ask_yes_no("Another extra payment? (y/n): ")? {
                    break;
                }
            }
        }

        // the policy only matters once an extra payment exists
        let policy = if extra_payments.is_empty() {
            RecomputePolicy::default()
        } else {
            RecomputePolicy::from_token(
                &self.ask_token("After an extra payment, shorten the term ('plazo') or keep the installment ('cuota')?: ")?,
            )
        };
        debug!(
            "collected terms: principal {}, {:?}, {} periods, {} extra payments, policy {}",
            principal,
            quote,
            total_periods,
            extra_payments.len(),
            policy
        );

        Ok(LoanTerms {
            principal,
            quote,
            total_periods,
            extra_payments,
            policy,
        })
    }
}
