//! Console tables and CSV export for experiment results

use std::io::Write;

use comfy_table::presets::UTF8_FULL;
use comfy_table::{CellAlignment, Table};

use crate::error::Result;
use crate::experiment::{AnalysisReport, ResultRow, VolumeReport};
use crate::query::{AverageRelease, HistogramBin};

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(header);
    table
}

fn right_align(table: &mut Table, from: usize) {
    let columns = table.column_count();
    for index in from..columns {
        if let Some(column) = table.column_mut(index) {
            column.set_cell_alignment(CellAlignment::Right);
        }
    }
}

/// Format with thousands separators, e.g. `4,645,408`.
pub fn format_grouped(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && formatted.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Comparison of mechanisms and budgets
pub fn results_table(rows: &[ResultRow]) -> Table {
    let mut table = new_table(vec![
        "Mechanism",
        "Epsilon",
        "Scale",
        "MAE",
        "RMSE",
        "Error (%)",
        "Example release",
    ]);
    for row in rows {
        table.add_row(vec![
            row.mechanism.to_string(),
            format!("{}", row.epsilon),
            format!(
                "{} = {}",
                row.mechanism.scale_label(),
                format_grouped(row.scale, 1)
            ),
            format_grouped(row.mae, 0),
            format_grouped(row.rmse, 0),
            format!("{:.3}", row.rel_error_pct),
            format_grouped(row.example_release, 0),
        ]);
    }
    right_align(&mut table, 1);
    table
}

pub fn histogram_table(bins: &[HistogramBin]) -> Table {
    let mut table = new_table(vec!["Sector", "True count", "Noisy count (DP)"]);
    for bin in bins {
        table.add_row(vec![
            bin.label.clone(),
            bin.true_count.to_string(),
            bin.noisy_count.to_string(),
        ]);
    }
    right_align(&mut table, 1);
    table
}

pub fn average_summary(average: &AverageRelease) -> String {
    format!(
        "True average: {}\nDP average:   {}\nDifference:   {}",
        format_grouped(average.true_average, 2),
        format_grouped(average.noisy_average, 2),
        format_grouped(average.absolute_error(), 2),
    )
}

pub fn volume_summary(report: &VolumeReport) -> String {
    format!(
        "Target broker: {}\nTrue value (clipped): {}\nSensitivity: {}\n{}",
        report.query.broker_id,
        format_grouped(report.query.true_value, 0),
        format_grouped(report.query.sensitivity, 0),
        results_table(&report.rows),
    )
}

/// Render the full analysis as console text.
pub fn render_analysis(report: &AnalysisReport) -> String {
    format!(
        "Volume (clipped sum)\n{}\n\nSector histogram (epsilon = {})\n{}\n\nAverage trade value, {} (epsilon = {})\n{}\n",
        volume_summary(&report.volume),
        report.histogram_epsilon,
        histogram_table(&report.histogram),
        report.average_sector,
        report.average_epsilon,
        average_summary(&report.average),
    )
}

/// Write result rows as CSV, one row per (mechanism, epsilon).
pub fn write_results_csv<W: Write>(rows: &[ResultRow], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::Mechanism;

    fn row(mechanism: Mechanism, epsilon: f64) -> ResultRow {
        ResultRow {
            mechanism,
            epsilon,
            delta: match mechanism {
                Mechanism::Laplace => None,
                Mechanism::Gaussian => Some(1e-5),
            },
            scale: 39574.0,
            mae: 39100.4,
            mse: 3.1e9,
            rmse: 55677.6,
            rel_error_pct: 0.842,
            example_release: 4_601_234.0,
        }
    }

    #[test]
    fn test_format_grouped() {
        assert_eq!(format_grouped(4_645_408.0, 0), "4,645,408");
        assert_eq!(format_grouped(9893.5, 1), "9,893.5");
        assert_eq!(format_grouped(-1234.567, 2), "-1,234.57");
        assert_eq!(format_grouped(999.0, 0), "999");
        assert_eq!(format_grouped(-0.0001, 0), "0");
    }

    #[test]
    fn test_results_table_contains_rows() {
        let rendered = results_table(&[row(Mechanism::Laplace, 0.5)]).to_string();
        assert!(rendered.contains("Laplace"));
        assert!(rendered.contains("b = 39,574.0"));
        assert!(rendered.contains("39,100"));
    }

    #[test]
    fn test_write_results_csv() {
        let mut out = Vec::new();
        write_results_csv(
            &[row(Mechanism::Laplace, 0.5), row(Mechanism::Gaussian, 2.0)],
            &mut out,
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "mechanism,epsilon,delta,scale,mae,mse,rmse,rel_error_pct,example_release"
        );
        assert!(lines.next().unwrap().starts_with("Laplace,0.5,,39574"));
        let gaussian: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(&gaussian[..2], ["Gaussian", "2.0"]);
        assert_eq!(gaussian[2].parse::<f64>().unwrap(), 1e-5);
        assert_eq!(gaussian[3].parse::<f64>().unwrap(), 39574.0);
    }

    #[test]
    fn test_average_summary() {
        let summary = average_summary(&AverageRelease {
            true_average: 50_000.0,
            noisy_sum: 25_100_000.0,
            noisy_count: 500.0,
            noisy_average: 50_200.0,
        });
        assert!(summary.contains("50,000.00"));
        assert!(summary.contains("200.00"));
    }
}
