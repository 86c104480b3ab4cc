use std::sync::LazyLock;

use regex::Regex;

use crate::models::FoodCategory;

/// Name-based rules, evaluated top to bottom against the lower-cased text.
/// The first match wins, so the order here is part of the behaviour.
pub const CATEGORY_RULES: &[(&str, FoodCategory)] = &[
    (
        r"meat|fish|chicken|beef|pork|lamb|poultry|turkey|egg|legume|salmon",
        FoodCategory::Protein,
    ),
    (
        r"bread|rice|pasta|cereal|grain|wheat|corn|oat",
        FoodCategory::Carbs,
    ),
    (r"oil|butter|cream|lard|margarine|fat", FoodCategory::Fat),
    (r"milk|yogh?urt|cheese|dairy", FoodCategory::Dairy),
    (
        r"apple|orange|banana|berry|fruit|pear|grape|melon|cherry",
        FoodCategory::Fruit,
    ),
    (
        r"vegetable|veg|carrot|broccoli|spinach|lettuce|cabbage|pepper",
        FoodCategory::Vegetable,
    ),
    (
        r"juice|water|tea|coffee|drink|beverage|soda|wine|beer|alcohol",
        FoodCategory::Beverage,
    ),
    (
        r"snack|chip|crisp|cracker|popcorn|pretzel|cookie|biscuit",
        FoodCategory::Snack,
    ),
    (
        r"vitamin|supplement|mineral|protein powder|amino",
        FoodCategory::Supplement,
    ),
];

/// Keywords for an explicit category / food-group column.
const GROUP_KEYWORDS: &[(&str, FoodCategory)] = &[
    ("supplement", FoodCategory::Supplement),
    ("nut", FoodCategory::Nuts),
    ("seed", FoodCategory::Seeds),
    ("meat", FoodCategory::Protein),
    ("poultry", FoodCategory::Protein),
    ("fish", FoodCategory::Protein),
    ("seafood", FoodCategory::Protein),
    ("egg", FoodCategory::Protein),
    ("legume", FoodCategory::Protein),
    ("cereal", FoodCategory::Carbs),
    ("grain", FoodCategory::Carbs),
    ("bread", FoodCategory::Carbs),
    ("dairy", FoodCategory::Dairy),
    ("milk", FoodCategory::Dairy),
    ("fat", FoodCategory::Fat),
    ("oil", FoodCategory::Fat),
    ("fruit", FoodCategory::Fruit),
    ("vegetable", FoodCategory::Vegetable),
    ("beverage", FoodCategory::Beverage),
    ("drink", FoodCategory::Beverage),
    ("snack", FoodCategory::Snack),
    ("confection", FoodCategory::Snack),
];

static COMPILED_RULES: LazyLock<Vec<(Regex, FoodCategory)>> = LazyLock::new(|| {
    CATEGORY_RULES
        .iter()
        .map(|(pattern, category)| {
            let re = Regex::new(pattern).expect("category patterns are valid regexes");
            (re, *category)
        })
        .collect()
});

/// Infer a category from a food's name.
#[must_use]
pub fn infer_category(text: &str) -> FoodCategory {
    let text = text.to_lowercase();
    COMPILED_RULES
        .iter()
        .find(|(re, _)| re.is_match(&text))
        .map_or(FoodCategory::Other, |(_, category)| *category)
}

/// Map an explicit category / food-group cell to a category, if it says
/// anything recognisable.
#[must_use]
pub fn category_from_group(group: &str) -> Option<FoodCategory> {
    let group = group.trim().to_lowercase();
    if group.is_empty() {
        return None;
    }
    if let Ok(category) = group.parse::<FoodCategory>() {
        return Some(category);
    }
    GROUP_KEYWORDS
        .iter()
        .find(|(keyword, _)| group.contains(keyword))
        .map(|(_, category)| *category)
}

/// The explicit group column wins; the name is the fallback.
#[must_use]
pub fn resolve_category(group: Option<&str>, name: &str) -> FoodCategory {
    group
        .and_then(category_from_group)
        .unwrap_or_else(|| infer_category(name))
}
