use crate::error::Result;
use crate::loan::Schedule;
use log::{info, warn};
use rust_xlsxwriter::{
    Chart, ChartFormat, ChartSolidFill, ChartType, Color, Format, FormatAlign, Workbook,
};
use std::{fs::File, io::Write, path::Path};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

const SHEET_NAME: &str = "Amortization";
const SHEET_TITLE: &str = "Amortization Table - Loan Simulation";
const HEADER_ROW: u32 = 1;
const FIRST_DATA_ROW: u32 = 2;

pub const CSV_HEADERS: [&str; 7] = [
    "Period",
    "Date",
    "Installment ($)",
    "Interest ($)",
    "Principal ($)",
    "Extra Payment ($)",
    "Remaining Balance ($)",
];

/// Writes the schedule as CSV: BOM, header row, then one row per period with
/// rounded amounts and `DD/MM/YYYY` dates.
pub fn write_csv<W: Write>(schedule: &Schedule, mut writer: W) -> Result<()> {
    // spreadsheet applications need the BOM to detect UTF-8
    writer.write_all(UTF8_BOM)?;

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_HEADERS)?;
    for row in schedule.rows() {
        wtr.write_record([
            row.period.to_string(),
            row.date.format("%d/%m/%Y").to_string(),
            row.installment.to_string(),
            row.interest.to_string(),
            row.principal_portion.to_string(),
            row.extra_payment.to_string(),
            row.remaining_balance.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_csv(schedule: &Schedule, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    write_csv(schedule, file)?;
    info!("wrote {} rows to {}", schedule.len(), path.display());
    Ok(())
}

/// Writes a workbook with a merged title row, the schedule table, and a column
/// chart of installment, interest and principal per period below the table.
pub fn export_xlsx(schedule: &Schedule, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    let title_format = Format::new()
        .set_bold()
        .set_font_size(14)
        .set_align(FormatAlign::Center);
    let header_format = Format::new().set_bold();
    let money_format = Format::new().set_num_format("0.00");

    let last_col = (CSV_HEADERS.len() - 1) as u16;
    worksheet.merge_range(0, 0, 0, last_col, SHEET_TITLE, &title_format)?;

    let mut widths: Vec<usize> = CSV_HEADERS.iter().map(|h| h.len()).collect();
    for (col, header) in CSV_HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(HEADER_ROW, col as u16, *header, &header_format)?;
    }

    for (i, row) in schedule.rows().iter().enumerate() {
        let r = FIRST_DATA_ROW + i as u32;
        let date = row.date.format("%d/%m/%Y").to_string();
        worksheet.write_number(r, 0, row.period)?;
        worksheet.write_string(r, 1, &date)?;
        widths[1] = widths[1].max(date.len());

        let amounts = [
            row.installment,
            row.interest,
            row.principal_portion,
            row.extra_payment,
            row.remaining_balance,
        ];
        for (offset, amount) in amounts.iter().enumerate() {
            let col = offset + 2;
            worksheet.write_number_with_format(r, col as u16, amount.rounded(), &money_format)?;
            widths[col] = widths[col].max(amount.to_string().len());
        }
    }

    for (col, width) in widths.iter().enumerate() {
        worksheet.set_column_width(col as u16, (*width + 2) as f64)?;
    }

    if schedule.is_empty() {
        warn!("empty schedule, {} written without a chart", path.display());
    } else {
        let last_row = FIRST_DATA_ROW + schedule.len() as u32 - 1;
        let mut chart = Chart::new(ChartType::Column);
        chart.title().set_name("Payment Breakdown - Loan Simulation");
        chart.x_axis().set_name("Period");
        chart.y_axis().set_name("Amount ($)");
        chart.set_width(600).set_height(300);

        for (col, name, color) in [
            (2, "Installment", 0x009FE3),
            (3, "Interest", 0xF4B400),
            (4, "Principal", 0x34A853),
        ] {
            chart
                .add_series()
                .set_name(name)
                .set_categories((SHEET_NAME, FIRST_DATA_ROW, 0, last_row, 0))
                .set_values((SHEET_NAME, FIRST_DATA_ROW, col, last_row, col))
                .set_format(
                    ChartFormat::new()
                        .set_solid_fill(ChartSolidFill::new().set_color(Color::RGB(color))),
                );
        }
        worksheet.insert_chart(last_row + 2, 0, &chart)?;
    }

    workbook.save(path)?;
    info!("wrote {} rows to {}", schedule.len(), path.display());
    Ok(())
}
