//! Dedup and batched persistence of normalized foods.
//!
//! Rows flow forward once: normalize → validity filter → skip known names →
//! insert in fixed-size transactional batches. A failing batch is rolled back
//! and counted as errors; the run moves on to the next batch.

use std::collections::HashSet;

use anyhow::{Context, Result};

use crate::db::Database;
use crate::models::{
    Food, FoodRecord, ImportCounters, ImportOptions, ImportProgress, ImportReport, RawRow,
};
use crate::normalize::normalize_row;

/// How many inserted foods a report carries back to the caller.
pub const SAMPLE_SIZE: usize = 10;

/// Where imported foods end up.
pub trait FoodStore {
    /// Lower-cased names already stored.
    fn existing_names(&self) -> Result<HashSet<String>>;

    /// Write one batch atomically, returning the foods actually inserted.
    /// Name conflicts are skipped rather than failing the batch.
    fn insert_batch(&mut self, records: &[FoodRecord]) -> Result<Vec<Food>>;
}

impl FoodStore for Database {
    fn existing_names(&self) -> Result<HashSet<String>> {
        Database::existing_names(self)
    }

    fn insert_batch(&mut self, records: &[FoodRecord]) -> Result<Vec<Food>> {
        Database::insert_batch(self, records)
    }
}

/// Names seen so far in this run, plus the batch size.
#[derive(Debug, Clone)]
pub struct ImportContext {
    known_names: HashSet<String>,
    batch_size: usize,
}

impl ImportContext {
    #[must_use]
    pub fn new(known_names: HashSet<String>, batch_size: usize) -> Self {
        Self {
            known_names: known_names.iter().map(|n| n.to_lowercase()).collect(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_store<S: FoodStore + ?Sized>(store: &S, batch_size: usize) -> Result<Self> {
        Ok(Self::new(store.existing_names()?, batch_size))
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn is_known(&self, name: &str) -> bool {
        self.known_names.contains(&crate::models::name_key(name))
    }

    fn remember(&mut self, records: &[FoodRecord]) {
        self.known_names
            .extend(records.iter().map(FoodRecord::name_key));
    }

    /// Split candidates into new foods and duplicates, without writing.
    /// A name repeated inside `candidates` is new only the first time.
    #[must_use]
    pub fn partition(&self, candidates: Vec<FoodRecord>) -> Partition {
        let mut seen = HashSet::new();
        let (new, duplicates): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|r| !self.is_known(&r.name) && seen.insert(r.name_key()));
        Partition { new, duplicates }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub new: Vec<FoodRecord>,
    pub duplicates: Vec<FoodRecord>,
}

/// Normalized, valid candidates plus the tallies the report needs.
#[derive(Debug, Clone, Default)]
pub struct PreparedImport {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub candidates: Vec<FoodRecord>,
}

#[must_use]
pub fn prepare(rows: &[RawRow], options: &ImportOptions) -> PreparedImport {
    let candidates: Vec<FoodRecord> = rows
        .iter()
        .map(|row| normalize_row(row, options))
        .filter(FoodRecord::is_valid)
        .collect();
    PreparedImport {
        total_rows: rows.len(),
        valid_rows: candidates.len(),
        candidates,
    }
}

#[derive(Debug, Clone, Default)]
pub struct PersistOutcome {
    pub counters: ImportCounters,
    pub batches: usize,
    pub sample: Vec<Food>,
}

struct BatchWriter<'a, S: ?Sized> {
    store: &'a mut S,
    context: &'a mut ImportContext,
    pending: Vec<FoodRecord>,
    pending_names: HashSet<String>,
    outcome: PersistOutcome,
}

impl<S: FoodStore + ?Sized> BatchWriter<'_, S> {
    fn push(&mut self, record: FoodRecord) -> bool {
        let key = record.name_key();
        if self.context.is_known(&key) || !self.pending_names.insert(key) {
            self.outcome.counters.skipped += 1;
            return false;
        }
        self.pending.push(record);
        self.pending.len() >= self.context.batch_size
    }

    fn flush(&mut self) {
        let records = std::mem::take(&mut self.pending);
        self.pending_names.clear();
        self.outcome.batches += 1;
        let batch = self.outcome.batches;

        match self.store.insert_batch(&records) {
            Ok(inserted) => {
                let counters = &mut self.outcome.counters;
                counters.inserted += inserted.len();
                counters.skipped += records.len() - inserted.len();
                self.context.remember(&records);

                let room = SAMPLE_SIZE.saturating_sub(self.outcome.sample.len());
                self.outcome.sample.extend(inserted.into_iter().take(room));
                tracing::debug!(batch, records = records.len(), "batch committed");
            }
            Err(err) => {
                self.outcome.counters.errors += records.len();
                tracing::warn!(
                    batch,
                    records = records.len(),
                    error = %format!("{err:#}"),
                    "batch failed and was rolled back"
                );
            }
        }
    }
}

/// Insert `candidates` in batches, skipping names the context already knows.
/// `on_progress` is called after every batch.
pub fn persist<S: FoodStore + ?Sized>(
    store: &mut S,
    context: &mut ImportContext,
    candidates: Vec<FoodRecord>,
    mut on_progress: impl FnMut(&ImportProgress),
) -> PersistOutcome {
    let total = candidates.len();
    let mut writer = BatchWriter {
        store,
        context,
        pending: Vec::new(),
        pending_names: HashSet::new(),
        outcome: PersistOutcome::default(),
    };

    for (i, record) in candidates.into_iter().enumerate() {
        let processed = i + 1;
        let full = writer.push(record);
        let last = processed == total;
        if full || (last && !writer.pending.is_empty()) {
            writer.flush();
            on_progress(&ImportProgress {
                batch: writer.outcome.batches,
                processed,
                total,
                percent: percent(processed, total),
                counters: writer.outcome.counters,
            });
        }
    }

    writer.outcome
}

#[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((processed as f64 / total as f64) * 100.0).round() as u8
}

/// Run the whole pipeline over already-read rows. Only a failure to read the
/// existing names is fatal; batch failures are counted.
pub fn run_import<S: FoodStore + ?Sized>(
    store: &mut S,
    rows: &[RawRow],
    options: &ImportOptions,
    on_progress: impl FnMut(&ImportProgress),
) -> Result<ImportReport> {
    let mut context = ImportContext::from_store(store, options.batch_size)
        .context("Failed to load existing food names")?;
    let prepared = prepare(rows, options);
    tracing::info!(
        total_rows = prepared.total_rows,
        valid_rows = prepared.valid_rows,
        known = context.known_names.len(),
        "starting food import"
    );

    let outcome = persist(store, &mut context, prepared.candidates, on_progress);
    let counters = outcome.counters;
    tracing::info!(
        inserted = counters.inserted,
        skipped = counters.skipped,
        errors = counters.errors,
        batches = outcome.batches,
        "food import finished"
    );

    Ok(ImportReport {
        total_rows: prepared.total_rows,
        valid_rows: prepared.valid_rows,
        inserted: counters.inserted,
        skipped: counters.skipped,
        errors: counters.errors,
        sample: outcome.sample,
    })
}

/// What an import would do, without writing anything.
#[derive(Debug, Clone)]
pub struct ImportPlan {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub partition: Partition,
}

pub fn plan_import<S: FoodStore + ?Sized>(
    store: &S,
    rows: &[RawRow],
    options: &ImportOptions,
) -> Result<ImportPlan> {
    let context = ImportContext::from_store(store, options.batch_size)
        .context("Failed to load existing food names")?;
    let prepared = prepare(rows, options);
    Ok(ImportPlan {
        total_rows: prepared.total_rows,
        valid_rows: prepared.valid_rows,
        partition: context.partition(prepared.candidates),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CellValue, FoodCategory};
    use anyhow::bail;

    fn food_row(name: &str, protein: &str) -> RawRow {
        [("Food Name", name), ("Protein (g)", protein)]
            .into_iter()
            .collect()
    }

    fn numbered_rows(count: usize) -> Vec<RawRow> {
        (1..=count)
            .map(|i| food_row(&format!("Food {i}"), "5"))
            .collect()
    }

    fn options(batch_size: usize) -> ImportOptions {
        ImportOptions {
            batch_size,
            ..ImportOptions::default()
        }
    }

    /// Fails the nth `insert_batch` call (1-based).
    struct FlakyStore {
        inner: Database,
        fail_on: usize,
        calls: usize,
    }

    impl FoodStore for FlakyStore {
        fn existing_names(&self) -> Result<HashSet<String>> {
            self.inner.existing_names()
        }

        fn insert_batch(&mut self, records: &[FoodRecord]) -> Result<Vec<Food>> {
            self.calls += 1;
            if self.calls == self.fail_on {
                bail!("simulated connection reset");
            }
            self.inner.insert_batch(records)
        }
    }

    struct UnreachableStore;

    impl FoodStore for UnreachableStore {
        fn existing_names(&self) -> Result<HashSet<String>> {
            bail!("database unreachable")
        }

        fn insert_batch(&mut self, _records: &[FoodRecord]) -> Result<Vec<Food>> {
            unreachable!("no batch should be attempted")
        }
    }

    #[test]
    fn test_import_inserts_valid_rows() {
        let mut db = Database::open_in_memory().unwrap();
        let rows: Vec<RawRow> = vec![
            [
                ("Food Name", "Salmon"),
                ("Energy (kJ)", "870"),
                ("Protein (g)", "20"),
                ("Fat, total (g)", "13"),
            ]
            .into_iter()
            .collect(),
            [("Food Name", "Water"), ("Energy (kJ)", "0")]
                .into_iter()
                .collect(),
            [("Food Name", "Olive Oil"), ("Fat (g)", "13.5")]
                .into_iter()
                .collect(),
            [("Food Name", ""), ("Protein (g)", "10")]
                .into_iter()
                .collect(),
        ];

        let report = run_import(&mut db, &rows, &ImportOptions::default(), |_| {}).unwrap();
        assert_eq!(report.total_rows, 4);
        assert_eq!(report.valid_rows, 2);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.errors, 0);

        let salmon = db.get_food_by_name("salmon").unwrap().unwrap();
        assert_eq!(salmon.record.category, FoodCategory::Protein);
        assert!((salmon.record.calories - 207.9).abs() < 1e-9);
        let oil = db.get_food_by_name("Olive Oil").unwrap().unwrap();
        assert_eq!(oil.record.category, FoodCategory::Fat);
        assert!(db.get_food_by_name("Water").unwrap().is_none());
    }

    #[test]
    fn test_second_import_inserts_nothing() {
        let mut db = Database::open_in_memory().unwrap();
        let rows = numbered_rows(7);

        let first = run_import(&mut db, &rows, &options(3), |_| {}).unwrap();
        assert_eq!(first.inserted, 7);

        let second = run_import(&mut db, &rows, &options(3), |_| {}).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped, 7);
        assert_eq!(second.errors, 0);
        assert_eq!(db.count_foods().unwrap(), 7);
    }

    #[test]
    fn test_duplicate_names_within_file_insert_once() {
        let mut db = Database::open_in_memory().unwrap();
        let rows = vec![
            food_row("Apple", "0.3"),
            food_row("APPLE ", "0.4"),
            food_row("Pear", "0.4"),
        ];
        let report = run_import(&mut db, &rows, &ImportOptions::default(), |_| {}).unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, 1);
        let apple = db.get_food_by_name("apple").unwrap().unwrap();
        assert!((apple.record.protein - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_duplicates_across_batches_rejected() {
        let mut db = Database::open_in_memory().unwrap();
        let rows = vec![
            food_row("Oats", "13"),
            food_row("Rice", "2.7"),
            food_row("Barley", "12"),
            food_row("oats", "13"),
            food_row("RICE", "2.7"),
        ];
        let report = run_import(&mut db, &rows, &options(2), |_| {}).unwrap();
        assert_eq!(report.inserted, 3);
        assert_eq!(report.skipped, 2);
        assert_eq!(db.count_foods().unwrap(), 3);
    }

    #[test]
    fn test_failed_batch_does_not_stop_run() {
        let mut store = FlakyStore {
            inner: Database::open_in_memory().unwrap(),
            fail_on: 2,
            calls: 0,
        };
        let rows = numbered_rows(6);
        let report = run_import(&mut store, &rows, &options(2), |_| {}).unwrap();

        assert_eq!(store.calls, 3);
        assert_eq!(report.inserted, 4);
        assert_eq!(report.errors, 2);
        assert_eq!(report.skipped, 0);

        let db = &store.inner;
        assert!(db.get_food_by_name("Food 1").unwrap().is_some());
        assert!(db.get_food_by_name("Food 2").unwrap().is_some());
        assert!(db.get_food_by_name("Food 3").unwrap().is_none());
        assert!(db.get_food_by_name("Food 4").unwrap().is_none());
        assert!(db.get_food_by_name("Food 5").unwrap().is_some());
        assert!(db.get_food_by_name("Food 6").unwrap().is_some());
    }

    #[test]
    fn test_constraint_failure_rolls_back_only_its_batch() {
        let mut db = Database::open_in_memory().unwrap();
        let mut context = ImportContext::new(HashSet::new(), 2);
        let prepared = prepare(&numbered_rows(6), &ImportOptions::default());
        let mut candidates = prepared.candidates;
        candidates[3].serving_size = -5.0;

        let outcome = persist(&mut db, &mut context, candidates, |_| {});
        assert_eq!(outcome.batches, 3);
        assert_eq!(outcome.counters.inserted, 4);
        assert_eq!(outcome.counters.errors, 2);
        assert_eq!(db.count_foods().unwrap(), 4);
        assert!(db.get_food_by_name("Food 3").unwrap().is_none());
        assert!(!context.is_known("Food 3"));
        assert!(context.is_known("food 5"));
    }

    #[test]
    fn test_store_conflict_counts_as_skipped() {
        let mut db = Database::open_in_memory().unwrap();
        run_import(&mut db, &[food_row("Tofu", "8")], &options(50), |_| {}).unwrap();

        // A context that has not seen the stored name relies on the store.
        let mut context = ImportContext::new(HashSet::new(), 50);
        let prepared = prepare(
            &[food_row("tofu", "8"), food_row("Tempeh", "19")],
            &ImportOptions::default(),
        );
        let outcome = persist(&mut db, &mut context, prepared.candidates, |_| {});
        assert_eq!(outcome.counters.inserted, 1);
        assert_eq!(outcome.counters.skipped, 1);
        assert_eq!(outcome.counters.errors, 0);
    }

    #[test]
    fn test_progress_reported_per_batch() {
        let mut db = Database::open_in_memory().unwrap();
        let mut progress = Vec::new();
        run_import(&mut db, &numbered_rows(5), &options(2), |p| progress.push(*p)).unwrap();

        assert_eq!(progress.len(), 3);
        assert_eq!(
            progress.iter().map(|p| p.batch).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(progress[0].percent, 40);
        assert_eq!(progress[1].percent, 80);
        assert_eq!(progress[2].percent, 100);
        assert_eq!(progress[2].counters.inserted, 5);
        assert!(progress.windows(2).all(|w| w[0].counters.inserted <= w[1].counters.inserted));
    }

    #[test]
    fn test_default_batch_size_is_fifty() {
        let mut db = Database::open_in_memory().unwrap();
        let mut batches = 0;
        let report =
            run_import(&mut db, &numbered_rows(120), &ImportOptions::default(), |_| {
                batches += 1;
            })
            .unwrap();
        assert_eq!(report.inserted, 120);
        assert_eq!(batches, 3);
    }

    #[test]
    fn test_sample_is_capped() {
        let mut db = Database::open_in_memory().unwrap();
        let report = run_import(&mut db, &numbered_rows(25), &options(4), |_| {}).unwrap();
        assert_eq!(report.inserted, 25);
        assert_eq!(report.sample.len(), SAMPLE_SIZE);
        assert_eq!(report.sample[0].record.name, "Food 1");
    }

    #[test]
    fn test_unreachable_store_aborts() {
        let mut store = UnreachableStore;
        let err = run_import(&mut store, &numbered_rows(3), &options(2), |_| {}).unwrap_err();
        assert!(format!("{err:#}").contains("database unreachable"));
    }

    #[test]
    fn test_plan_import_writes_nothing() {
        let mut db = Database::open_in_memory().unwrap();
        run_import(&mut db, &[food_row("Egg", "12.6")], &options(50), |_| {}).unwrap();

        let rows: Vec<RawRow> = vec![
            food_row("egg", "12.6"),
            food_row("Duck", "18"),
            food_row("duck", "18"),
            [("Food Name", CellValue::from("Ice")), ("Protein (g)", CellValue::Empty)]
                .into_iter()
                .collect(),
        ];
        let plan = plan_import(&db, &rows, &ImportOptions::default()).unwrap();
        assert_eq!(plan.total_rows, 4);
        assert_eq!(plan.valid_rows, 3);
        assert_eq!(plan.partition.new.len(), 1);
        assert_eq!(plan.partition.new[0].name, "Duck");
        assert_eq!(plan.partition.duplicates.len(), 2);
        assert_eq!(db.count_foods().unwrap(), 1);
    }

    #[test]
    fn test_context_batch_size_never_zero() {
        assert_eq!(ImportContext::new(HashSet::new(), 0).batch_size(), 1);
    }
}
