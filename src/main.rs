use amortization::{
    export::{export_csv, export_xlsx},
    loan::generate_schedule,
    prompt::Prompter,
    LoanError,
};
use chrono::{Local, NaiveDate};
use clap::Parser;
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;
use std::{io, path::PathBuf, process};

/// Fixed-installment loan amortization simulator
#[derive(Parser, Debug)]
#[command(name = "amortization", version, about)]
struct Cli {
    /// Where to write the CSV schedule
    #[arg(long, default_value = "amortization_schedule.csv")]
    csv: PathBuf,

    /// Where to write the spreadsheet with the payments chart
    #[arg(long, default_value = "amortization_schedule.xlsx")]
    xlsx: PathBuf,

    /// Date of the first installment (YYYY-MM-DD); defaults to today
    #[arg(long)]
    start_date: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Do not print the schedule to the terminal
    #[arg(short, long)]
    quiet: bool,
}

fn parse_start_date(raw: Option<&str>) -> Result<NaiveDate, LoanError> {
    match raw {
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|e| LoanError::InvalidDate(format!("{s}: {e}"))),
        None => Ok(Local::now().date_naive()),
    }
}

fn run(cli: &Cli) -> Result<(), LoanError> {
    let start_date = parse_start_date(cli.start_date.as_deref())?;

    println!("=== LOAN SIMULATOR - AMORTIZATION TABLE ===\n");
    let stdin = io::stdin();
    let terms = Prompter::new(stdin.lock(), io::stdout()).collect_terms()?;

    let period_rate = terms.quote.period_rate();
    println!("\nPeriod rate: {:.4}%", period_rate * 100.);

    let schedule = generate_schedule(
        terms.principal,
        period_rate,
        terms.total_periods,
        &terms.extra_payments,
        terms.policy,
        start_date,
    );

    if !cli.quiet {
        println!("\n=== AMORTIZATION TABLE ===");
        schedule.show_amortization();
    }

    export_csv(&schedule, &cli.csv)?;
    println!("\nCSV file written: {}", cli.csv.display());
    export_xlsx(&schedule, &cli.xlsx)?;
    println!("XLSX file written: {}", cli.xlsx.display());

    info!(
        "total interest {}, total paid {}",
        schedule.total_interest(),
        schedule.total_paid()
    );
    match schedule.final_balance() {
        Some(balance) => println!("\nFinal balance: ${}", balance),
        None => println!("\nNo periods were simulated."),
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("logger unavailable: {e}");
    }

    if let Err(e) = run(&cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

// verifies that types can implement the gated traits below
#[cfg(test)]
fn is_normal<T: Sized + Send + Sync + Unpin>() {}

#[test]
fn normal_types() {
    is_normal::<amortization::loan::ScheduleRow>();
    is_normal::<amortization::loan::Schedule>();
}

#[test]
fn start_date_parsing() {
    assert_eq!(
        parse_start_date(Some("2024-02-15")).unwrap(),
        NaiveDate::from_ymd_opt(2024, 2, 15).unwrap()
    );
    assert!(matches!(
        parse_start_date(Some("15/02/2024")),
        Err(LoanError::InvalidDate(_))
    ));
}

#[test]
fn cli_flags() {
    let cli = Cli::parse_from([
        "amortization",
        "--csv",
        "out.csv",
        "--xlsx",
        "out.xlsx",
        "--start-date",
        "2025-01-01",
        "-q",
    ]);
    assert_eq!(cli.csv, PathBuf::from("out.csv"));
    assert_eq!(cli.xlsx, PathBuf::from("out.xlsx"));
    assert_eq!(cli.start_date.as_deref(), Some("2025-01-01"));
    assert!(cli.quiet);
    assert!(!cli.verbose);
}
