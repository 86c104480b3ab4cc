mod foods;
mod helpers;
mod import;

pub(crate) use foods::{cmd_categorize, cmd_food_list};
pub(crate) use import::cmd_import;
