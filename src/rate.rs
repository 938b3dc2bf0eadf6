use crate::error::{LoanError, Result};
use log::trace;
use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QuoteBasis {
    Nominal,
    Effective,
}

impl QuoteBasis {
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_lowercase().as_str() {
            "nominal" => QuoteBasis::Nominal,
            _ => QuoteBasis::Effective,
        }
    }
}

impl fmt::Display for QuoteBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuoteBasis::Nominal => write!(f, "nominal"),
            QuoteBasis::Effective => write!(f, "effective"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RateTiming {
    Arrears,
    Advance,
}

impl RateTiming {
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_lowercase().as_str() {
            "anticipada" | "advance" => RateTiming::Advance,
            _ => RateTiming::Arrears,
        }
    }
}

impl fmt::Display for RateTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateTiming::Arrears => write!(f, "arrears"),
            RateTiming::Advance => write!(f, "advance"),
        }
    }
}

/// Validated so that conversion to a period rate cannot divide by zero.
#[derive(Clone, Copy, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RateQuote {
    value: f64,
    basis: QuoteBasis,
    timing: RateTiming,
    compounding_per_year: u32,
    payments_per_year: u32,
}

impl RateQuote {
    /// `value` is a fraction (0.12 for 12%), not a percentage.
    pub fn new(
        value: f64,
        basis: QuoteBasis,
        timing: RateTiming,
        compounding_per_year: u32,
        payments_per_year: u32,
    ) -> Result<Self> {
        // an effective quote never divides by the compounding frequency
        if basis == QuoteBasis::Nominal && compounding_per_year == 0 {
            return Err(LoanError::DegenerateRate {
                field: "compounding_per_year",
            });
        }
        if payments_per_year == 0 {
            return Err(LoanError::DegenerateRate {
                field: "payments_per_year",
            });
        }
        Ok(Self {
            value,
            basis,
            timing,
            compounding_per_year,
            payments_per_year,
        })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn basis(&self) -> QuoteBasis {
        self.basis
    }

    pub fn timing(&self) -> RateTiming {
        self.timing
    }

    pub fn compounding_per_year(&self) -> u32 {
        self.compounding_per_year
    }

    pub fn payments_per_year(&self) -> u32 {
        self.payments_per_year
    }

    /// Effective rate for one payment period, due in arrears.
    ///
    /// The advance-to-arrears step runs after the annual rate has been brought
    /// down to the payment period, never before.
    pub fn period_rate(&self) -> f64 {
        let eff_annual = match self.basis {
            QuoteBasis::Nominal => {
                nominal_to_effective_annual(self.value, self.compounding_per_year)
            }
            QuoteBasis::Effective => self.value,
        };
        let mut rate = effective_annual_to_period_rate(eff_annual, self.payments_per_year);
        trace!(
            "{} quote {}, effective annual {}, period rate {}",
            self.basis,
            self.value,
            eff_annual,
            rate
        );

        if self.timing == RateTiming::Advance {
            rate = advance_to_arrears(rate);
            trace!("advance rate converted to arrears {}", rate);
        }
        rate
    }
}

pub fn nominal_to_effective_annual(nominal_rate: f64, comp_per_year: u32) -> f64 {
    let m = comp_per_year as f64;
    (1. + nominal_rate / m).powf(m) - 1.
}

pub fn effective_annual_to_period_rate(eff_annual: f64, payments_per_year: u32) -> f64 {
    (1. + eff_annual).powf(1. / payments_per_year as f64) - 1.
}

/// Equivalent due-in-arrears rate for a rate charged in advance.
pub fn advance_to_arrears(rate: f64) -> f64 {
    rate / (1. - rate)
}
