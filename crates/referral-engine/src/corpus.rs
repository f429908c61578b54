/// Loader for the three tabular training inputs.
///
/// All sources are header-first CSV files (UTF-8). Columns are located by
/// header name, so column order and extra columns do not matter. Fields may
/// be double-quoted; quoted fields may contain commas and escaped quotes
/// (`""`).
///
/// Loader approach: line-by-line split with a small quote-aware field
/// scanner. Defective rows are never fatal: they are skipped with a warning
/// and counted in `LoadStats`, so training reports can surface them. Only a
/// missing file, a missing required column, or an unusable general-physician
/// catalog abort the load.
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use referral_common::text;

use crate::error::AppError;
use crate::model::{AppointmentRecord, GeneralPhysicianEntry, SpecialistEntry};

/// Everything the training pipeline needs from disk, loaded in one pass.
#[derive(Debug, Clone)]
pub struct CorpusBundle {
    /// Historical appointments in exact file order; the position of a record
    /// here is the stable index used by similarity queries.
    pub appointments: Vec<AppointmentRecord>,
    pub specialists: Vec<SpecialistEntry>,
    pub general_physicians: Vec<GeneralPhysicianEntry>,
    pub stats: LoadStats,
}

/// Row accounting for one corpus load.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LoadStats {
    pub appointments: usize,
    pub specialists: usize,
    pub general_physicians: usize,
    pub skipped_appointment_rows: usize,
    pub skipped_catalog_rows: usize,
}

/// Load the appointment history and both catalogs.
///
/// Row order of the appointment history is preserved exactly as read.
pub fn load_corpus(
    appointments_path: &Path,
    specialists_path: &Path,
    general_physicians_path: &Path,
) -> Result<CorpusBundle, AppError> {
    let (appointments, skipped_appointment_rows) = load_appointments(appointments_path)?;
    let (specialists, skipped_specialists) = load_catalog(specialists_path)?;
    let (general_physicians, skipped_general) = load_catalog(general_physicians_path)?;

    if general_physicians.is_empty() {
        return Err(AppError::DataLoad {
            path: general_physicians_path.display().to_string(),
            message: "no usable rows in the general-physician catalog".to_string(),
        });
    }

    let stats = LoadStats {
        appointments: appointments.len(),
        specialists: specialists.len(),
        general_physicians: general_physicians.len(),
        skipped_appointment_rows,
        skipped_catalog_rows: skipped_specialists + skipped_general,
    };
    info!(
        appointments = stats.appointments,
        specialists = stats.specialists,
        general_physicians = stats.general_physicians,
        skipped_appointment_rows = stats.skipped_appointment_rows,
        skipped_catalog_rows = stats.skipped_catalog_rows,
        "corpus loaded"
    );

    Ok(CorpusBundle {
        appointments,
        specialists: specialists
            .into_iter()
            .map(|(name, keywords)| SpecialistEntry { name, keywords })
            .collect(),
        general_physicians: general_physicians
            .into_iter()
            .map(|(name, keywords)| GeneralPhysicianEntry { name, keywords })
            .collect(),
        stats,
    })
}

/// Read the appointment history.
///
/// Required columns: `patient_condition`, `specialist`, `age`.
/// Optional columns: `token`, `medical_history`.
fn load_appointments(path: &Path) -> Result<(Vec<AppointmentRecord>, usize), AppError> {
    let table = Table::read(path)?;
    let condition_col = table.require_column("patient_condition", path)?;
    let specialist_col = table.require_column("specialist", path)?;
    let age_col = table.require_column("age", path)?;
    let token_col = table.column("token");
    let history_col = table.column("medical_history");

    let mut records = Vec::with_capacity(table.rows.len());
    let mut skipped = table.malformed_rows;
    for (line_number, row) in &table.rows {
        let Some(condition) = field(row, condition_col) else {
            warn!(path = %path.display(), line = line_number, "skipping row without a condition");
            skipped += 1;
            continue;
        };
        let Some(specialist) = field(row, specialist_col) else {
            warn!(path = %path.display(), line = line_number, "skipping row without a specialist");
            skipped += 1;
            continue;
        };
        let Some(age) = field(row, age_col).and_then(|v| v.parse::<u32>().ok()) else {
            warn!(path = %path.display(), line = line_number, "skipping row with a malformed age");
            skipped += 1;
            continue;
        };
        records.push(AppointmentRecord {
            token: token_col.and_then(|col| field(row, col)).map(str::to_string),
            age,
            condition: condition.to_string(),
            specialist: specialist.to_string(),
            medical_history: history_col.and_then(|col| field(row, col)).map(str::to_string),
        });
    }
    Ok((records, skipped))
}

/// Read a catalog file (specialists or general physicians).
///
/// Required column: `name`. Optional column: `keywords`, free text that is
/// normalized into a sorted token set. Duplicate names keep the first row.
fn load_catalog(path: &Path) -> Result<(Vec<(String, Vec<String>)>, usize), AppError> {
    let table = Table::read(path)?;
    let name_col = table.require_column("name", path)?;
    let keywords_col = table.column("keywords");

    let mut entries: Vec<(String, Vec<String>)> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut skipped = table.malformed_rows;
    for (line_number, row) in &table.rows {
        let Some(name) = field(row, name_col) else {
            warn!(path = %path.display(), line = line_number, "skipping catalog row without a name");
            skipped += 1;
            continue;
        };
        if !seen.insert(name.to_string()) {
            warn!(path = %path.display(), line = line_number, name = %name, "skipping duplicate catalog entry");
            skipped += 1;
            continue;
        }
        let keywords = keywords_col
            .and_then(|col| field(row, col))
            .map(|text| {
                text::tokenize(text)
                    .into_iter()
                    .collect::<BTreeSet<String>>()
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default();
        entries.push((name.to_string(), keywords));
    }
    Ok((entries, skipped))
}

/// A parsed CSV file: lowercased header map plus data rows with their
/// 1-based line numbers. Rows that fail the field scanner are dropped here
/// and surface in `malformed_rows`.
struct Table {
    columns: HashMap<String, usize>,
    rows: Vec<(usize, Vec<String>)>,
    malformed_rows: usize,
}

impl Table {
    fn read(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path).map_err(|e| AppError::DataLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut columns: Option<HashMap<String, usize>> = None;
        let mut rows = Vec::new();
        let mut malformed_rows = 0usize;
        for (line_index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let Some(fields) = split_fields(line) else {
                if columns.is_none() {
                    return Err(AppError::DataLoad {
                        path: path.display().to_string(),
                        message: format!("unterminated quote in header at line {}", line_index + 1),
                    });
                }
                warn!(path = %path.display(), line = line_index + 1, "skipping row with an unterminated quote");
                malformed_rows += 1;
                continue;
            };
            match &columns {
                None => {
                    let mut header = HashMap::new();
                    for (position, name) in fields.iter().enumerate() {
                        header.entry(name.trim().to_lowercase()).or_insert(position);
                    }
                    columns = Some(header);
                }
                Some(_) => rows.push((line_index + 1, fields)),
            }
        }

        let columns = columns.ok_or_else(|| AppError::DataLoad {
            path: path.display().to_string(),
            message: "file has no header row".to_string(),
        })?;
        Ok(Self { columns, rows, malformed_rows })
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.columns.get(name).copied()
    }

    fn require_column(&self, name: &str, path: &Path) -> Result<usize, AppError> {
        self.column(name).ok_or_else(|| AppError::DataLoad {
            path: path.display().to_string(),
            message: format!("required column {name:?} is missing"),
        })
    }
}

/// Fetch a field by position, trimmed; empty and missing fields read as `None`.
fn field(row: &[String], column: usize) -> Option<&str> {
    row.get(column).map(|value| value.trim()).filter(|value| !value.is_empty())
}

/// Split one CSV line into fields, honoring double quotes.
///
/// Returns `None` when a quote opens and never closes.
fn split_fields(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else {
            match c {
                ',' => fields.push(std::mem::take(&mut current)),
                '"' if current.trim().is_empty() => {
                    current.clear();
                    in_quotes = true;
                }
                _ => current.push(c),
            }
        }
    }
    if in_quotes {
        return None;
    }
    fields.push(current);
    Some(fields)
}
