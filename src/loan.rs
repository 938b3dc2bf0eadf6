use chrono::{Days, NaiveDate};
use log::{debug, info, trace, warn};
use std::{collections::BTreeMap, fmt};

/// Balance at or below which the loan counts as repaid.
pub const BALANCE_EPSILON: f64 = 1e-6;
/// Simulated calendar step between installments (an approximate month).
pub const PERIOD_DAYS: u64 = 30;
const DISPLAY_DEC_PLACES: i32 = 2;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecomputePolicy {
    ShortenTerm,
    #[default]
    ReduceInstallment,
}

impl RecomputePolicy {
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_lowercase().as_str() {
            "plazo" => RecomputePolicy::ShortenTerm,
            _ => RecomputePolicy::ReduceInstallment,
        }
    }
}

impl fmt::Display for RecomputePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecomputePolicy::ShortenTerm => write!(f, "shorten term"),
            RecomputePolicy::ReduceInstallment => write!(f, "reduce installment"),
        }
    }
}

#[derive(Clone, PartialEq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtraPayments(BTreeMap<u32, f64>);

impl ExtraPayments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an extra payment, replacing any earlier amount for the same period.
    /// Period 0 and periods past the term are accepted but never reached.
    pub fn insert(&mut self, period: u32, amount: f64) -> Option<f64> {
        self.0.insert(period, amount)
    }

    pub fn get(&self, period: u32) -> f64 {
        self.0.get(&period).copied().unwrap_or(0.)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.0.iter().map(|(&period, &amount)| (period, amount))
    }
}

impl FromIterator<(u32, f64)> for ExtraPayments {
    fn from_iter<I: IntoIterator<Item = (u32, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A monetary value carried at full precision, with a rounded view for presentation.
///
/// The simulation only ever reads `exact`; `rounded` exists for reports.
#[derive(Clone, Copy, PartialEq, PartialOrd, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Amount(f64);

impl Amount {
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn exact(self) -> f64 {
        self.0
    }

    pub fn rounded(self) -> f64 {
        round(self.0, DISPLAY_DEC_PLACES)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.rounded())
    }
}

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScheduleRow {
    pub period: u32,
    pub date: NaiveDate,
    pub installment: Amount,
    pub interest: Amount,
    pub principal_portion: Amount,
    pub extra_payment: Amount,
    pub remaining_balance: Amount,
}

impl fmt::Display for ScheduleRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "period {}, date {}, installment ${}, interest ${}, principal ${}, extra ${}, balance ${}",
            self.period,
            self.date.format("%d/%m/%Y"),
            self.installment,
            self.interest,
            self.principal_portion,
            self.extra_payment,
            self.remaining_balance
        )
    }
}

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Schedule {
    period_rate: f64,
    rows: Vec<ScheduleRow>,
}

impl Schedule {
    pub fn period_rate(&self) -> f64 {
        self.period_rate
    }

    pub fn rows(&self) -> &[ScheduleRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_installment(&self) -> Option<Amount> {
        self.rows.first().map(|row| row.installment)
    }

    /// `None` when no period was simulated.
    pub fn final_balance(&self) -> Option<Amount> {
        self.rows.last().map(|row| row.remaining_balance)
    }

    pub fn total_interest(&self) -> Amount {
        Amount(self.rows.iter().map(|row| row.interest.exact()).sum())
    }

    pub fn total_extra(&self) -> Amount {
        Amount(self.rows.iter().map(|row| row.extra_payment.exact()).sum())
    }

    pub fn total_paid(&self) -> Amount {
        Amount(
            self.rows
                .iter()
                .map(|row| row.installment.exact() + row.extra_payment.exact())
                .sum(),
        )
    }

    pub fn show_amortization(&self) {
        for row in &self.rows {
            println!("{}", row);
        }
    }
}

fn round(amt: f64, dec: i32) -> f64 {
    if amt == 0. {
        0.
    } else {
        (amt * 10_f64.powi(dec)).round() / 10_f64.powi(dec)
    }
}

/// Level ("French method") installment that repays `principal` over `periods_remaining`.
///
/// With no periods left the whole principal is due at once.
pub fn fixed_installment(principal: f64, rate: f64, periods_remaining: u32) -> f64 {
    if periods_remaining == 0 {
        return principal;
    }
    let n = periods_remaining as f64;
    if rate == 0. {
        return principal / n;
    }
    // discount form of the annuity, finite where (1 + rate)^n overflows
    principal * rate / (1. - (1. + rate).powf(-n))
}

// running state threaded from one period to the next
#[derive(Clone, Copy, Debug)]
struct Accrual {
    period: u32,
    balance: f64,
    installment: f64,
    date: Option<NaiveDate>,
}

#[derive(Clone, Debug)]
pub struct ScheduleSteps<'a> {
    rate: f64,
    total_periods: u32,
    extra_payments: &'a ExtraPayments,
    policy: RecomputePolicy,
    state: Accrual,
    finished: bool,
}

impl<'a> ScheduleSteps<'a> {
    pub fn new(
        principal: f64,
        rate: f64,
        total_periods: u32,
        extra_payments: &'a ExtraPayments,
        policy: RecomputePolicy,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            rate,
            total_periods,
            extra_payments,
            policy,
            state: Accrual {
                period: 0,
                balance: principal,
                installment: fixed_installment(principal, rate, total_periods),
                date: Some(start_date),
            },
            finished: false,
        }
    }
}

impl Iterator for ScheduleSteps<'_> {
    type Item = ScheduleRow;

    fn next(&mut self) -> Option<ScheduleRow> {
        if self.finished || self.state.period >= self.total_periods {
            return None;
        }
        let Some(date) = self.state.date else {
            warn!(
                "no calendar date after period {}, schedule truncated",
                self.state.period
            );
            self.finished = true;
            return None;
        };

        let period = self.state.period + 1;
        let installment = self.state.installment;
        let interest = self.state.balance * self.rate;
        let principal_portion = installment - interest;
        let extra = self.extra_payments.get(period);

        let mut balance = self.state.balance - (principal_portion + extra);
        if balance < 0. {
            balance = 0.;
        }
        trace!(
            "period {}, interest {}, principal {}, extra {}, end bal {}",
            period,
            interest,
            principal_portion,
            extra,
            balance
        );

        let next_installment = if extra > 0. && self.policy == RecomputePolicy::ShortenTerm {
            let recomputed =
                fixed_installment(balance, self.rate, self.total_periods - period);
            debug!(
                "extra payment {} in period {}, installment {} -> {}",
                extra, period, installment, recomputed
            );
            recomputed
        } else {
            installment
        };

        self.state = Accrual {
            period,
            balance,
            installment: next_installment,
            date: date.checked_add_days(Days::new(PERIOD_DAYS)),
        };
        if balance <= BALANCE_EPSILON {
            self.finished = true;
        }

        Some(ScheduleRow {
            period,
            date,
            installment: Amount(installment),
            interest: Amount(interest),
            principal_portion: Amount(principal_portion),
            extra_payment: Amount(extra),
            remaining_balance: Amount(balance),
        })
    }
}

/// Simulates the loan period by period and returns the finished schedule.
///
/// Stops after `total_periods` rows, or earlier once the balance reaches zero.
pub fn generate_schedule(
    principal: f64,
    rate: f64,
    total_periods: u32,
    extra_payments: &ExtraPayments,
    policy: RecomputePolicy,
    start_date: NaiveDate,
) -> Schedule {
    info!(
        "generating schedule: principal {}, period rate {}, {} periods, {} extra payments, policy {}",
        principal,
        rate,
        total_periods,
        extra_payments.len(),
        policy
    );
    let rows: Vec<ScheduleRow> = ScheduleSteps::new(
        principal,
        rate,
        total_periods,
        extra_payments,
        policy,
        start_date,
    )
    .collect();
    info!("schedule complete after {} periods", rows.len());

    Schedule {
        period_rate: rate,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        fixed_installment, generate_schedule, round, Amount, ExtraPayments, RecomputePolicy,
        Schedule, BALANCE_EPSILON,
    };
    use approx::assert_relative_eq;
    use chrono::{Days, NaiveDate};
    use test_log::test;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn scenario_b(extras: &ExtraPayments, policy: RecomputePolicy) -> Schedule {
        generate_schedule(10_000_000., 0.01, 12, extras, policy, start())
    }

    #[test]
    fn test_round() {
        assert_eq!(round(888487.8867834167, 2), 888487.89);
        assert_eq!(round(-1.005_1, 2), -1.01);
        assert_eq!(round(0., 2), 0.);
        assert_eq!(Amount::new(1234.5).to_string(), "1234.50");
    }

    #[test]
    fn test_fixed_installment() {
        assert_eq!(fixed_installment(1_000_000., 0., 10), 100_000.);
        assert_relative_eq!(
            fixed_installment(10_000_000., 0.01, 12),
            888487.8867834167,
            epsilon = 1e-6
        );
        assert_eq!(fixed_installment(500., 0.01, 0), 500.);
        // one period left: balance plus one period of interest
        assert_relative_eq!(fixed_installment(1000., 0.01, 1), 1010., epsilon = 1e-9);
    }

    #[test]
    fn test_policy_tokens() {
        assert_eq!(RecomputePolicy::from_token(" Plazo"), RecomputePolicy::ShortenTerm);
        assert_eq!(
            RecomputePolicy::from_token("cuota"),
            RecomputePolicy::ReduceInstallment
        );
        assert_eq!(RecomputePolicy::default(), RecomputePolicy::ReduceInstallment);
    }

    #[test]
    fn test_extra_payments_keep_last_amount() {
        let mut extras = ExtraPayments::new();
        assert_eq!(extras.insert(3, 100.), None);
        assert_eq!(extras.insert(3, 250.), Some(100.));
        assert_eq!(extras.get(3), 250.);
        assert_eq!(extras.get(4), 0.);
        assert_eq!(extras.len(), 1);
    }

    #[test]
    fn test_zero_rate_schedule() {
        let schedule = generate_schedule(
            1_000_000.,
            0.,
            10,
            &ExtraPayments::new(),
            RecomputePolicy::default(),
            start(),
        );

        assert_eq!(schedule.len(), 10);
        for (i, row) in schedule.rows().iter().enumerate() {
            assert_eq!(row.installment.rounded(), 100_000.);
            assert_eq!(row.interest.exact(), 0.);
            assert_eq!(row.principal_portion.rounded(), 100_000.);
            assert_eq!(
                row.remaining_balance.rounded(),
                1_000_000. - 100_000. * (i as f64 + 1.)
            );
        }
        assert_eq!(schedule.final_balance().unwrap().exact(), 0.);
        assert_eq!(schedule.total_interest().exact(), 0.);
    }

    #[test]
    fn test_plain_french_schedule() {
        let schedule = scenario_b(&ExtraPayments::new(), RecomputePolicy::ShortenTerm);
        let rows = schedule.rows();

        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].interest.rounded(), 100_000.);
        assert_eq!(rows[0].installment.rounded(), 888487.89);
        assert_eq!(rows[0].principal_portion.rounded(), 788487.89);
        assert_eq!(rows[0].remaining_balance.rounded(), 9211512.11);
        assert_eq!(rows[1].interest.rounded(), 92115.12);
        assert_eq!(rows[11].interest.rounded(), 8796.91);
        assert_eq!(rows[11].principal_portion.rounded(), 879690.98);
        assert!(schedule.final_balance().unwrap().exact() <= BALANCE_EPSILON);

        for pair in rows.windows(2) {
            assert!(pair[1].remaining_balance.exact() < pair[0].remaining_balance.exact());
        }

        // the policy is irrelevant without extra payments
        let other = scenario_b(&ExtraPayments::new(), RecomputePolicy::ReduceInstallment);
        assert_eq!(schedule, other);
    }

    #[test]
    fn test_extra_payment_shorten_term_recomputes_installment() {
        let extras: ExtraPayments = [(3, 2_000_000.)].into_iter().collect();
        let schedule = scenario_b(&extras, RecomputePolicy::ShortenTerm);
        let rows = schedule.rows();

        assert!(rows.len() <= 12);
        assert_eq!(rows[2].extra_payment.rounded(), 2_000_000.);
        assert_eq!(rows[2].installment.rounded(), 888487.89);
        assert_eq!(rows[2].remaining_balance.rounded(), 5610802.85);

        let expected = fixed_installment(rows[2].remaining_balance.exact(), 0.01, 9);
        assert_eq!(rows[3].installment.exact(), expected);
        assert_eq!(rows[3].installment.rounded(), 655007.16);
        assert!(rows[3].installment.exact() < rows[0].installment.exact());
        assert_eq!(rows[3].interest.rounded(), 56108.03);
        assert!(schedule.final_balance().unwrap().exact() <= BALANCE_EPSILON);
    }

    #[test]
    fn test_extra_payment_reduce_installment_keeps_installment() {
        let extras: ExtraPayments = [(3, 2_000_000.)].into_iter().collect();
        let schedule = scenario_b(&extras, RecomputePolicy::ReduceInstallment);
        let rows = schedule.rows();

        assert_eq!(rows.len(), 10);
        for row in rows {
            assert_eq!(row.installment, rows[0].installment);
        }
        assert_eq!(rows[3].principal_portion.rounded(), 832379.86);
        assert_eq!(rows[9].interest.rounded(), 4899.89);
        assert_eq!(schedule.final_balance().unwrap().exact(), 0.);
        assert_eq!(schedule.total_extra().rounded(), 2_000_000.);
    }

    #[test]
    fn test_components_sum_to_installment() {
        for rate in [0., 0.001, 0.005, 0.01, 0.02] {
            for periods in [1, 2, 6, 12, 60] {
                let schedule = generate_schedule(
                    100_000.,
                    rate,
                    periods,
                    &ExtraPayments::new(),
                    RecomputePolicy::default(),
                    start(),
                );
                assert_eq!(schedule.len(), periods as usize, "rate {rate}, n {periods}");
                assert!(schedule.final_balance().unwrap().exact() <= BALANCE_EPSILON);
                for row in schedule.rows() {
                    assert_relative_eq!(
                        row.interest.exact() + row.principal_portion.exact(),
                        row.installment.exact(),
                        epsilon = 1e-6
                    );
                    assert!(
                        (row.interest.rounded() + row.principal_portion.rounded()
                            - row.installment.rounded())
                        .abs()
                            <= 0.011
                    );
                }
            }
        }
    }

    #[test]
    fn test_balance_floor_and_early_stop() {
        // the extra payment more than covers the remaining balance
        let extras: ExtraPayments = [(2, 1_000_000.)].into_iter().collect();
        let schedule = generate_schedule(
            10_000.,
            0.01,
            12,
            &extras,
            RecomputePolicy::ShortenTerm,
            start(),
        );
        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule.final_balance().unwrap().exact(), 0.);
        for pair in schedule.rows().windows(2) {
            assert!(pair[1].remaining_balance.exact() <= pair[0].remaining_balance.exact());
        }
    }

    #[test]
    fn test_extra_payment_in_last_period() {
        let extras: ExtraPayments = [(12, 1.)].into_iter().collect();
        let schedule = scenario_b(&extras, RecomputePolicy::ShortenTerm);
        assert_eq!(schedule.len(), 12);
        assert_eq!(schedule.final_balance().unwrap().exact(), 0.);
    }

    #[test]
    fn test_dates_step_thirty_days() {
        let schedule = scenario_b(&ExtraPayments::new(), RecomputePolicy::default());
        let rows = schedule.rows();
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(rows[1].date, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert_eq!(rows[2].date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(rows[11].date, NaiveDate::from_ymd_opt(2024, 11, 26).unwrap());
    }

    #[test]
    fn test_row_display() {
        let schedule = scenario_b(&ExtraPayments::new(), RecomputePolicy::default());
        assert_eq!(
            schedule.rows()[0].to_string(),
            "period 1, date 01/01/2024, installment $888487.89, interest $100000.00, principal $788487.89, extra $0.00, balance $9211512.11"
        );
    }

    #[test]
    fn test_identical_inputs_identical_schedules() {
        let extras: ExtraPayments = [(3, 2_000_000.), (7, 10_000.)].into_iter().collect();
        let first = scenario_b(&extras, RecomputePolicy::ShortenTerm);
        let second = scenario_b(&extras, RecomputePolicy::ShortenTerm);
        assert_eq!(first, second);
        for (a, b) in first.rows().iter().zip(second.rows()) {
            assert_eq!(
                a.remaining_balance.exact().to_bits(),
                b.remaining_balance.exact().to_bits()
            );
        }
    }

    #[test]
    fn test_long_term_high_rate_stays_finite() {
        assert_relative_eq!(fixed_installment(1000., 0.5, 2000), 500., epsilon = 1e-9);

        let schedule = generate_schedule(
            1000.,
            0.5,
            2000,
            &ExtraPayments::new(),
            RecomputePolicy::default(),
            start(),
        );
        assert_eq!(schedule.len(), 2000);
        for row in schedule.rows() {
            assert!(row.installment.exact().is_finite());
            assert!(row.interest.exact().is_finite());
            assert!(row.remaining_balance.exact().is_finite());
        }
    }

    #[test]
    fn test_schedule_stops_at_last_calendar_date() {
        let near_end = NaiveDate::MAX.checked_sub_days(Days::new(40)).unwrap();
        let schedule = generate_schedule(
            1000.,
            0.01,
            12,
            &ExtraPayments::new(),
            RecomputePolicy::default(),
            near_end,
        );
        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule.rows()[1].date, NaiveDate::MAX - Days::new(10));
    }

    #[test]
    fn test_zero_periods() {
        let schedule = generate_schedule(
            1000.,
            0.01,
            0,
            &ExtraPayments::new(),
            RecomputePolicy::default(),
            start(),
        );
        assert!(schedule.is_empty());
        assert_eq!(schedule.first_installment(), None);
        assert_eq!(schedule.final_balance(), None);
    }
}
