use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Brand tag stamped on records imported from the NUTTAB reference dataset.
pub const NUTTAB_BRAND: &str = "NUTTAB";
pub const DEFAULT_SERVING_SIZE: f64 = 100.0;
pub const DEFAULT_SERVING_UNIT: &str = "g";
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// The closed set of categories a food can be filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FoodCategory {
    Protein,
    Carbs,
    Fat,
    Dairy,
    Fruit,
    Vegetable,
    Beverage,
    Snack,
    Supplement,
    Nuts,
    Seeds,
    Other,
}

impl FoodCategory {
    pub const ALL: [FoodCategory; 12] = [
        Self::Protein,
        Self::Carbs,
        Self::Fat,
        Self::Dairy,
        Self::Fruit,
        Self::Vegetable,
        Self::Beverage,
        Self::Snack,
        Self::Supplement,
        Self::Nuts,
        Self::Seeds,
        Self::Other,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Protein => "protein",
            Self::Carbs => "carbs",
            Self::Fat => "fat",
            Self::Dairy => "dairy",
            Self::Fruit => "fruit",
            Self::Vegetable => "vegetable",
            Self::Beverage => "beverage",
            Self::Snack => "snack",
            Self::Supplement => "supplement",
            Self::Nuts => "nuts",
            Self::Seeds => "seeds",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FoodCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FoodCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim();
        for category in Self::ALL {
            if category.as_str().eq_ignore_ascii_case(needle) {
                return Ok(category);
            }
        }
        bail!("Unknown food category: '{needle}'")
    }
}

/// A single spreadsheet cell, as read from the source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

impl CellValue {
    /// Blank text counts as empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Number(_) => false,
            Self::Empty => true,
        }
    }

    /// Render the cell as trimmed text (numbers without a trailing `.0`).
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.trim().to_string(),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{n:.0}"),
            Self::Number(n) => n.to_string(),
            Self::Empty => String::new(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.trim().is_empty() {
            Self::Empty
        } else {
            Self::Text(value.to_string())
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// One data row of a spreadsheet keyed by its column headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    cells: Vec<(String, CellValue)>,
}

impl RawRow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cell. A header already present keeps its first value.
    pub fn insert(&mut self, header: impl Into<String>, value: CellValue) {
        let header = header.into();
        let header = header.trim();
        if header.is_empty() || self.cells.iter().any(|(h, _)| h == header) {
            return;
        }
        self.cells.push((header.to_string(), value));
    }

    /// Look up a cell by header: exact match first, then case- and
    /// whitespace-insensitive. Empty cells are reported as absent.
    #[must_use]
    pub fn get(&self, header: &str) -> Option<&CellValue> {
        let exact = self.cells.iter().find(|(h, _)| h == header);
        let found = exact.or_else(|| {
            let wanted = header_key(header);
            self.cells.iter().find(|(h, _)| header_key(h) == wanted)
        });
        found.map(|(_, v)| v).filter(|v| !v.is_empty())
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.is_empty())
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(h, _)| h.as_str())
    }
}

impl<H: Into<String>, V: Into<CellValue>> FromIterator<(H, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (H, V)>>(iter: I) -> Self {
        let mut row = RawRow::new();
        for (h, v) in iter {
            row.insert(h, v.into());
        }
        row
    }
}

fn header_key(header: &str) -> String {
    header
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Canonical, normalized food ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodRecord {
    pub name: String,
    pub brand: String,
    pub category: FoodCategory,
    pub serving_size: f64,
    pub serving_unit: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub sugar: f64,
    pub sodium: f64,
    pub cholesterol: f64,
    pub is_public: bool,
    pub created_by: Option<String>,
}

impl FoodRecord {
    /// A record is worth storing when it has a name and some energy or macros.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
            && [self.calories, self.protein, self.carbs, self.fat]
                .iter()
                .any(|v| *v > 0.0)
    }

    /// Key used for case-insensitive name deduplication.
    #[must_use]
    pub fn name_key(&self) -> String {
        name_key(&self.name)
    }
}

#[must_use]
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A food row as stored in the database.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Food {
    pub id: i64,
    pub uuid: String,
    #[serde(flatten)]
    pub record: FoodRecord,
    pub created_at: String,
}

/// Per-run knobs for an import.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Brand used when the row has no brand column.
    pub default_brand: String,
    pub batch_size: usize,
    pub created_by: Option<String>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            default_brand: NUTTAB_BRAND.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            created_by: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportCounters {
    pub inserted: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Emitted after every persisted batch.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ImportProgress {
    pub batch: usize,
    pub processed: usize,
    pub total: usize,
    pub percent: u8,
    pub counters: ImportCounters,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub errors: usize,
    pub sample: Vec<Food>,
}

impl ImportReport {
    #[must_use]
    pub fn message(&self) -> String {
        format!(
            "Imported {} of {} valid foods ({} skipped, {} errors)",
            self.inserted, self.valid_rows, self.skipped, self.errors
        )
    }
}
