use std::process;

use anyhow::Result;

use nutrimport_core::categorize::{category_from_group, infer_category, resolve_category};
use nutrimport_core::db::Database;

use super::helpers::print_food_table;

pub(crate) fn cmd_food_list(db: &Database, search: Option<&str>, json: bool) -> Result<()> {
    let foods = db.list_foods(search)?;

    if foods.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No foods found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&foods)?);
    } else {
        print_food_table(&foods);
    }

    Ok(())
}

pub(crate) fn cmd_categorize(text: &str, group: Option<&str>, json: bool) -> Result<()> {
    let category = resolve_category(group, text);
    let source = if group.and_then(category_from_group).is_some() {
        "group"
    } else {
        "name"
    };

    if json {
        println!(
            "{}",
            serde_json::json!({
                "text": text,
                "group": group,
                "category": category,
                "matched_on": source,
            })
        );
    } else {
        println!("{category}");
        if source == "group" && infer_category(text) != category {
            eprintln!("Note: the name alone would give '{}'", infer_category(text));
        }
    }

    Ok(())
}
