use std::path::Path;
use std::process;

use anyhow::Result;

use nutrimport_core::db::Database;
use nutrimport_core::ingest::read_rows;
use nutrimport_core::models::{ImportOptions, ImportProgress};
use nutrimport_core::pipeline::{plan_import, run_import};

use super::helpers::json_error;

pub(crate) fn cmd_import(
    db: &mut Database,
    path: &Path,
    options: &ImportOptions,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let rows = match read_rows(path) {
        Ok(rows) => rows,
        Err(e) if json => {
            println!("{}", json_error(&e.to_string()));
            process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    if dry_run {
        let plan = plan_import(&*db, &rows, options)?;
        let new = plan.partition.new.len();
        let duplicates = plan.partition.duplicates.len();
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "dry_run": true,
                    "total_rows": plan.total_rows,
                    "valid_rows": plan.valid_rows,
                    "new": new,
                    "duplicates": duplicates,
                })
            );
        } else {
            println!("Dry run, no changes made.\n");
            println!("  Rows read:        {}", plan.total_rows);
            println!("  Valid foods:      {}", plan.valid_rows);
            println!("  Foods to insert:  {new}");
            println!("  Duplicates:       {duplicates}");
        }
        return Ok(());
    }

    let report = run_import(db, &rows, options, log_progress)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Import complete.\n");
        println!("  Rows read:    {}", report.total_rows);
        println!("  Valid foods:  {}", report.valid_rows);
        println!("  Inserted:     {}", report.inserted);
        println!("  Skipped:      {}", report.skipped);
        println!("  Errors:       {}", report.errors);
    }

    Ok(())
}

fn log_progress(progress: &ImportProgress) {
    let c = progress.counters;
    tracing::info!(
        batch = progress.batch,
        percent = progress.percent,
        inserted = c.inserted,
        skipped = c.skipped,
        errors = c.errors,
        "import progress"
    );
}
