use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io;
use std::iter::Enumerate;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::amount::{Amount, AmountError};
use crate::model::{ExpenseRecord, ParseMode, Split, SplitKind};
use crate::settlement::{Balances, PaymentPlan};

/// Errors that can occur when reading or writing csv rows
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: expense '{id}' missing {field}")]
    MissingField {
        line: usize,
        id: String,
        field: &'static str,
    },

    #[error("line {line}: expense '{id}' has invalid {field}: {source}")]
    InvalidAmount {
        line: usize,
        id: String,
        field: &'static str,
        source: AmountError,
    },

    #[error("line {line}: expense '{id}' disagrees with its first row on {field}")]
    InconsistentExpense {
        line: usize,
        id: String,
        field: &'static str,
    },

    #[error("failed to write row: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to flush output: {0}")]
    Flush(#[from] io::Error),
}

/// One split of one expense. Consecutive rows sharing `id` form an expense.
#[derive(Debug, Deserialize)]
struct InputRow {
    id: String,
    group_id: String,
    expense_number: Option<u32>,
    payer_id: String,
    payer_name: String,
    amount: Option<f64>,
    user_id: String,
    user_name: String,
    share: Option<f64>,
    is_settled: Option<bool>,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Serialize)]
struct BalanceRow<'a> {
    user_id: &'a str,
    user_name: &'a str,
    net_amount: String,
}

#[derive(Debug, Serialize)]
struct PlanRow<'a> {
    from_user_id: &'a str,
    from_user_name: &'a str,
    to_user_id: &'a str,
    to_user_name: &'a str,
    amount: String,
}

type Line = (usize, Result<InputRow, csv::Error>);

/// Iterator over the expenses of a csv source.
pub struct ExpenseRows<R> {
    rows: Enumerate<csv::DeserializeRecordsIntoIter<R, InputRow>>,
    pending: Option<Line>,
    mode: ParseMode,
}

/// Read expenses from a csv file
pub fn read_expenses(path: impl AsRef<Path>, mode: ParseMode) -> Result<ExpenseRows<File>, CsvError> {
    let path = path.as_ref();
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })?;
    Ok(ExpenseRows::new(reader, mode))
}

impl<R: io::Read> ExpenseRows<R> {
    pub fn new(reader: csv::Reader<R>, mode: ParseMode) -> Self {
        Self {
            rows: reader.into_deserialize::<InputRow>().enumerate(),
            pending: None,
            mode,
        }
    }

    fn pull(&mut self) -> Option<Line> {
        // 1-indexed, skip header
        self.rows.next().map(|(idx, row)| (idx + 2, row))
    }

    /// Resolve a money column. Lenient mode reads a missing value as zero.
    fn money(
        &self,
        line: usize,
        id: &str,
        field: &'static str,
        value: Option<f64>,
    ) -> Result<Amount, CsvError> {
        match (value, self.mode) {
            (Some(value), _) => {
                Amount::try_from_float(value).map_err(|source| CsvError::InvalidAmount {
                    line,
                    id: id.to_string(),
                    field,
                    source,
                })
            }
            (None, ParseMode::Lenient) => {
                warn!(line, expense = %id, field, "missing value read as zero");
                Ok(Amount::ZERO)
            }
            (None, ParseMode::Strict) => Err(CsvError::MissingField {
                line,
                id: id.to_string(),
                field,
            }),
        }
    }

    fn assemble(
        &self,
        first: (usize, InputRow),
        rest: Vec<(usize, InputRow)>,
    ) -> Result<ExpenseRecord, CsvError> {
        let (line, head) = &first;
        let expense_number = head.expense_number.ok_or_else(|| CsvError::MissingField {
            line: *line,
            id: head.id.clone(),
            field: "expense_number",
        })?;
        let amount = self.money(*line, &head.id, "amount", head.amount)?;

        let mut splits = Vec::with_capacity(rest.len() + 1);
        for (line, row) in std::iter::once(&first).chain(&rest) {
            let inconsistent = |field| CsvError::InconsistentExpense {
                line: *line,
                id: row.id.clone(),
                field,
            };
            if row.group_id != head.group_id {
                return Err(inconsistent("group_id"));
            }
            if row.payer_id != head.payer_id {
                return Err(inconsistent("payer_id"));
            }
            if row.amount.is_some() && row.amount != head.amount {
                return Err(inconsistent("amount"));
            }

            // a row without a participant carries no split
            if row.user_id.is_empty() {
                continue;
            }
            let share = self.money(*line, &row.id, "share", row.share)?;
            splits.push(Split::new(row.user_id.clone(), row.user_name.clone(), share));
        }

        let (_, head) = first;
        Ok(ExpenseRecord {
            created_by: head.payer_id.clone(),
            id: head.id,
            group_id: head.group_id,
            expense_number,
            payer_id: head.payer_id,
            payer_name: head.payer_name,
            amount,
            description: head.description,
            split_kind: SplitKind::Ratio,
            splits,
            is_settled: head.is_settled.unwrap_or(false),
        })
    }
}

impl<R: io::Read> Iterator for ExpenseRows<R> {
    type Item = Result<ExpenseRecord, CsvError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (line, first) = match self.pending.take().or_else(|| self.pull())? {
            (line, Ok(row)) => (line, row),
            (line, Err(source)) => return Some(Err(CsvError::Parse { line, source })),
        };

        let mut rest = Vec::new();
        while let Some((next_line, result)) = self.pull() {
            match result {
                Ok(row) if row.id == first.id => rest.push((next_line, row)),
                other => {
                    self.pending = Some((next_line, other));
                    break;
                }
            }
        }

        Some(self.assemble((line, first), rest))
    }
}

/// Write balances in csv format
pub fn write_balances(out: impl io::Write, balances: &Balances) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(out);

    for (user_id, balance) in balances {
        writer.serialize(BalanceRow {
            user_id,
            user_name: &balance.user_name,
            net_amount: balance.net_amount.to_string(),
        })?;
    }

    writer.flush()?;
    Ok(())
}

/// Write a transfer plan in csv format
pub fn write_plan(out: impl io::Write, plan: &[PaymentPlan]) -> Result<(), CsvError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(out);

    // explicit header so an empty plan still prints one
    writer.write_record([
        "from_user_id",
        "from_user_name",
        "to_user_id",
        "to_user_name",
        "amount",
    ])?;
    for entry in plan {
        writer.serialize(PlanRow {
            from_user_id: &entry.from_user_id,
            from_user_name: &entry.from_user_name,
            to_user_id: &entry.to_user_id,
            to_user_name: &entry.to_user_name,
            amount: entry.amount.to_string(),
        })?;
    }

    writer.flush()?;
    Ok(())
}
