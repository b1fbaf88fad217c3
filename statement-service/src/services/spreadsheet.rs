//! Workbook generation for extracted statements.
//!
//! Two sheets: an account summary and the ledger-ready transaction list. Every
//! transaction is written twice, the second time as its offsetting counter-entry
//! (debit and credit swapped, booked against [`COUNTER_ENTRY_BANK_CODE`]),
//! followed by a debit total row and a credit total row.

use crate::models::{BankStatement, Transaction};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet, XlsxError};
use std::path::Path;
use thiserror::Error;

pub const SUMMARY_SHEET: &str = "Synthèse du compte";
pub const TRANSACTIONS_SHEET: &str = "Transactions";

/// Bank code booked on every counter-entry row.
pub const COUNTER_ENTRY_BANK_CODE: &str = "471000";

const SUMMARY_HEADERS: [&str; 2] = ["Information", "Value"];
const SUMMARY_WIDTHS: [f64; 2] = [20.0, 30.0];

const TRANSACTION_HEADERS: [&str; 7] = [
    "Date",
    "Numéro de pièce",
    "Code banque",
    "Numéro de compte",
    "Description",
    "Débit",
    "Crédit",
];
const TRANSACTION_WIDTHS: [f64; 7] = [15.0, 20.0, 15.0, 20.0, 70.0, 15.0, 15.0];

const DEBIT_COL: u16 = 5;
const CREDIT_COL: u16 = 6;
const TOTALS_FILL: u32 = 0xF0F0F0;

#[derive(Debug, Error)]
pub enum SpreadsheetError {
    #[error("Failed to write workbook: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("Transaction totals overflow the decimal range")]
    TotalsOverflow,
}

/// One row of the transactions sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub date: String,
    pub document_number: i64,
    pub bank_code: String,
    pub account_number: String,
    pub description: String,
    pub debit: Decimal,
    pub credit: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerTotals {
    pub debit: Decimal,
    pub credit: Decimal,
}

/// Coerce a document number to an integer.
///
/// Integer text parses directly, decimal text truncates toward zero, anything
/// else (including absent) is 0.
pub fn coerce_document_number(raw: Option<&str>) -> i64 {
    let Some(text) = raw.map(str::trim) else {
        return 0;
    };
    if let Ok(n) = text.parse::<i64>() {
        return n;
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => f.trunc() as i64,
        _ => 0,
    }
}

/// Expand transactions into ledger rows: sequential document numbers, then each
/// row followed by its counter-entry.
pub fn ledger_rows(transactions: &[Transaction]) -> Vec<LedgerRow> {
    let mut rows = Vec::with_capacity(transactions.len() * 2);

    for (position, tx) in transactions.iter().enumerate() {
        let document_number =
            coerce_document_number(tx.document_number.as_deref()).saturating_add(position as i64);

        let original = LedgerRow {
            date: tx.date.clone().unwrap_or_default(),
            document_number,
            bank_code: tx.bank_code.clone().unwrap_or_default(),
            account_number: tx.account_number.clone().unwrap_or_default(),
            description: tx.description.clone(),
            debit: tx.debit,
            credit: tx.credit,
        };
        let counter_entry = LedgerRow {
            bank_code: COUNTER_ENTRY_BANK_CODE.to_string(),
            debit: original.credit,
            credit: original.debit,
            ..original.clone()
        };

        rows.push(original);
        rows.push(counter_entry);
    }

    rows
}

pub fn ledger_totals(rows: &[LedgerRow]) -> Result<LedgerTotals, SpreadsheetError> {
    rows.iter().try_fold(LedgerTotals::default(), |acc, row| {
        Ok(LedgerTotals {
            debit: acc
                .debit
                .checked_add(row.debit)
                .ok_or(SpreadsheetError::TotalsOverflow)?,
            credit: acc
                .credit
                .checked_add(row.credit)
                .ok_or(SpreadsheetError::TotalsOverflow)?,
        })
    })
}

/// Render the workbook in memory.
pub fn render_to_buffer(statement: &BankStatement) -> Result<Vec<u8>, SpreadsheetError> {
    let mut workbook = build_workbook(statement)?;
    let buffer = workbook.save_to_buffer()?;
    tracing::debug!(bytes = buffer.len(), "Workbook rendered in memory");
    Ok(buffer)
}

/// Render the workbook straight to `path`.
pub fn render_to_path(statement: &BankStatement, path: &Path) -> Result<(), SpreadsheetError> {
    let mut workbook = build_workbook(statement)?;
    workbook.save(path)?;
    tracing::debug!(path = %path.display(), "Workbook saved");
    Ok(())
}

fn build_workbook(statement: &BankStatement) -> Result<Workbook, SpreadsheetError> {
    let header = Format::new().set_bold();

    let mut workbook = Workbook::new();
    workbook.push_worksheet(summary_sheet(statement, &header)?);
    workbook.push_worksheet(transactions_sheet(statement, &header)?);
    Ok(workbook)
}

fn summary_sheet(statement: &BankStatement, header: &Format) -> Result<Worksheet, XlsxError> {
    let mut sheet = Worksheet::new();
    sheet.set_name(SUMMARY_SHEET)?;

    for (col, title) in SUMMARY_HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, header)?;
    }
    for (col, width) in SUMMARY_WIDTHS.iter().enumerate() {
        sheet.set_column_width(col as u16, *width)?;
    }

    let text_rows = [
        ("Nom de la banque", &statement.bank_name),
        ("Numéro de compte", &statement.account_number),
        ("Titulaire du compte", &statement.account_holder),
        ("Date de début", &statement.starting_date),
        ("Date de fin", &statement.closing_date),
    ];
    let mut row: u32 = 1;
    for (label, value) in text_rows {
        sheet.write_string(row, 0, label)?;
        if let Some(value) = value {
            sheet.write_string(row, 1, value)?;
        }
        row += 1;
    }

    for (label, value) in [
        ("Solde initial", statement.starting_balance),
        ("Solde final", statement.closing_balance),
    ] {
        sheet.write_string(row, 0, label)?;
        if let Some(amount) = value {
            sheet.write_number(row, 1, to_f64(amount))?;
        }
        row += 1;
    }

    sheet.write_string(row, 0, "Devise")?;
    if let Some(currency) = &statement.currency {
        sheet.write_string(row, 1, currency)?;
    }

    Ok(sheet)
}

fn transactions_sheet(
    statement: &BankStatement,
    header: &Format,
) -> Result<Worksheet, SpreadsheetError> {
    let mut sheet = Worksheet::new();
    sheet.set_name(TRANSACTIONS_SHEET)?;

    for (col, title) in TRANSACTION_HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, header)?;
    }
    for (col, width) in TRANSACTION_WIDTHS.iter().enumerate() {
        sheet.set_column_width(col as u16, *width)?;
    }

    let rows = ledger_rows(&statement.transactions);
    for (i, entry) in rows.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, &entry.date)?;
        sheet.write_number(row, 1, entry.document_number as f64)?;
        sheet.write_string(row, 2, &entry.bank_code)?;
        sheet.write_string(row, 3, &entry.account_number)?;
        sheet.write_string(row, 4, &entry.description)?;
        sheet.write_number(row, DEBIT_COL, to_f64(entry.debit))?;
        sheet.write_number(row, CREDIT_COL, to_f64(entry.credit))?;
    }

    let totals = ledger_totals(&rows)?;
    let debit_row = rows.len() as u32 + 1;
    let credit_row = debit_row + 1;

    let total_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(TOTALS_FILL));
    let label_format = total_format
        .clone()
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter);

    for row in [debit_row, credit_row] {
        for col in 1..TRANSACTION_HEADERS.len() as u16 {
            sheet.write_blank(row, col, &total_format)?;
        }
    }
    sheet.merge_range(debit_row, 0, credit_row, 0, "Total", &label_format)?;
    sheet.write_number_with_format(debit_row, DEBIT_COL, to_f64(totals.debit), &total_format)?;
    sheet.write_number_with_format(credit_row, CREDIT_COL, to_f64(totals.credit), &total_format)?;

    Ok(sheet)
}

fn to_f64(amount: Decimal) -> f64 {
    amount.to_f64().unwrap_or_default()
}
