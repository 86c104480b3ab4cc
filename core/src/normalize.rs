//! Mapping of spreadsheet rows onto canonical [`FoodRecord`]s.
//!
//! Source files disagree on header spelling ("Protein (g)", "PROTEIN",
//! "protein"), so every field is looked up through an ordered alias list.
//! Nothing in here fails: a cell that cannot be read degrades to the field's
//! default and the row carries on.

use crate::categorize::resolve_category;
use crate::models::{
    CellValue, DEFAULT_SERVING_SIZE, DEFAULT_SERVING_UNIT, FoodRecord, ImportOptions, RawRow,
};

pub const KJ_PER_KCAL: f64 = 4.184;

/// Fields the importer knows how to pull out of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Brand,
    Category,
    EnergyKj,
    EnergyKcal,
    Protein,
    Carbs,
    Fat,
    Fiber,
    Sugar,
    Sodium,
    Cholesterol,
    ServingSize,
    ServingUnit,
}

impl Field {
    /// Accepted header spellings, most specific first.
    #[must_use]
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Name => &[
                "Food Name",
                "Name",
                "food_name",
                "Food",
                "Food Description",
                "Description",
            ],
            Self::Brand => &["Brand", "Brand Name", "Manufacturer"],
            Self::Category => &["Category", "Food Group", "Food Category", "Group"],
            Self::EnergyKj => &[
                "Energy (kJ)",
                "Energy, with dietary fibre (kJ)",
                "Energy with dietary fibre, equated (kJ)",
                "Energy, without dietary fibre (kJ)",
                "Energy without dietary fibre, equated (kJ)",
                "Energy kJ",
                "energy_kj",
                "kJ",
            ],
            Self::EnergyKcal => &[
                "Calories",
                "Energy (kcal)",
                "Calories (kcal)",
                "Energy kcal",
                "energy_kcal",
                "kcal",
            ],
            Self::Protein => &["Protein (g)", "Protein", "protein_g"],
            Self::Carbs => &[
                "Available carbohydrate, with sugar alcohols (g)",
                "Available carbohydrate, without sugar alcohol (g)",
                "Carbohydrate (g)",
                "Carbohydrates (g)",
                "Carbs (g)",
                "Carbohydrate",
                "Carbohydrates",
                "Carbs",
            ],
            Self::Fat => &["Fat, total (g)", "Total fat (g)", "Fat (g)", "Total Fat", "Fat"],
            Self::Fiber => &[
                "Total dietary fibre (g)",
                "Dietary fibre (g)",
                "Fibre (g)",
                "Fiber (g)",
                "Fibre",
                "Fiber",
            ],
            Self::Sugar => &["Total sugars (g)", "Sugars (g)", "Sugar (g)", "Sugars", "Sugar"],
            Self::Sodium => &["Sodium (Na) (mg)", "Sodium (mg)", "Sodium"],
            Self::Cholesterol => &["Cholesterol (mg)", "Cholesterol"],
            Self::ServingSize => &["Serving Size", "Serving Size (g)", "Serving"],
            Self::ServingUnit => &["Serving Unit", "Unit"],
        }
    }
}

/// First alias present in the row with a non-empty cell.
#[must_use]
pub fn field_value<'a>(row: &'a RawRow, aliases: &[&str]) -> Option<&'a CellValue> {
    aliases.iter().find_map(|alias| row.get(alias))
}

#[must_use]
pub fn text_field(row: &RawRow, aliases: &[&str], default: &str) -> String {
    field_value(row, aliases).map_or_else(|| default.to_string(), CellValue::as_text)
}

/// Numeric field with tolerant coercion; unreadable or negative values give
/// `default`.
#[must_use]
pub fn number_field(row: &RawRow, aliases: &[&str], default: f64) -> f64 {
    field_value(row, aliases)
        .and_then(parse_number)
        .filter(|v| *v >= 0.0)
        .unwrap_or(default)
}

/// Lenient number parse: accepts numeric cells and text like `" 1,234.5 "`.
#[must_use]
pub fn parse_number(cell: &CellValue) -> Option<f64> {
    let value = match cell {
        CellValue::Number(n) => *n,
        CellValue::Text(s) => s.trim().replace(',', "").parse::<f64>().ok()?,
        CellValue::Empty => return None,
    };
    value.is_finite().then_some(value)
}

/// Energy in kcal. Kilojoule columns win over calorie columns.
#[must_use]
pub fn energy_kcal(row: &RawRow) -> f64 {
    if field_value(row, Field::EnergyKj.aliases()).is_some() {
        return number_field(row, Field::EnergyKj.aliases(), 0.0) / KJ_PER_KCAL;
    }
    number_field(row, Field::EnergyKcal.aliases(), 0.0)
}

#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Build the candidate record for one row. Validity is checked separately.
#[must_use]
pub fn normalize_row(row: &RawRow, options: &ImportOptions) -> FoodRecord {
    let number = |field: Field| number_field(row, field.aliases(), 0.0);

    let name = text_field(row, Field::Name.aliases(), "");
    let group = field_value(row, Field::Category.aliases()).map(CellValue::as_text);
    let category = resolve_category(group.as_deref(), &name);

    let serving_size = number_field(row, Field::ServingSize.aliases(), DEFAULT_SERVING_SIZE);
    let serving_size = if serving_size > 0.0 {
        serving_size
    } else {
        DEFAULT_SERVING_SIZE
    };

    FoodRecord {
        brand: text_field(row, Field::Brand.aliases(), &options.default_brand),
        category,
        serving_size,
        serving_unit: text_field(row, Field::ServingUnit.aliases(), DEFAULT_SERVING_UNIT),
        calories: round_to(energy_kcal(row), 1),
        protein: round_to(number(Field::Protein), 1),
        carbs: round_to(number(Field::Carbs), 1),
        fat: round_to(number(Field::Fat), 1),
        fiber: round_to(number(Field::Fiber), 1),
        sugar: round_to(number(Field::Sugar), 1),
        sodium: round_to(number(Field::Sodium), 0),
        cholesterol: round_to(number(Field::Cholesterol), 0),
        is_public: true,
        created_by: options.created_by.clone(),
        name,
    }
}
