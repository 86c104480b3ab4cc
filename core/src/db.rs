use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::models::{Food, FoodCategory, FoodRecord, name_key};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS foods (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL COLLATE NOCASE UNIQUE CHECK (length(trim(name)) > 0),
                    brand TEXT NOT NULL DEFAULT '',
                    category TEXT NOT NULL CHECK (category IN (
                        'protein', 'carbs', 'fat', 'dairy', 'fruit', 'vegetable',
                        'beverage', 'snack', 'supplement', 'nuts', 'seeds', 'other'
                    )),
                    serving_size REAL NOT NULL DEFAULT 100 CHECK (serving_size > 0),
                    serving_unit TEXT NOT NULL DEFAULT 'g',
                    calories REAL NOT NULL DEFAULT 0 CHECK (calories >= 0),
                    protein REAL NOT NULL DEFAULT 0 CHECK (protein >= 0),
                    carbs REAL NOT NULL DEFAULT 0 CHECK (carbs >= 0),
                    fat REAL NOT NULL DEFAULT 0 CHECK (fat >= 0),
                    fiber REAL NOT NULL DEFAULT 0 CHECK (fiber >= 0),
                    sugar REAL NOT NULL DEFAULT 0 CHECK (sugar >= 0),
                    sodium REAL NOT NULL DEFAULT 0 CHECK (sodium >= 0),
                    cholesterol REAL NOT NULL DEFAULT 0 CHECK (cholesterol >= 0),
                    is_public INTEGER NOT NULL DEFAULT 1,
                    created_by TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_foods_category ON foods(category);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // Expects columns in the order of FOOD_COLUMNS.
    fn food_from_row(row: &rusqlite::Row) -> rusqlite::Result<Food> {
        let category: String = row.get(4)?;
        let category = category.parse::<FoodCategory>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
        })?;
        Ok(Food {
            id: row.get(0)?,
            uuid: row.get(1)?,
            record: FoodRecord {
                name: row.get(2)?,
                brand: row.get(3)?,
                category,
                serving_size: row.get(5)?,
                serving_unit: row.get(6)?,
                calories: row.get(7)?,
                protein: row.get(8)?,
                carbs: row.get(9)?,
                fat: row.get(10)?,
                fiber: row.get(11)?,
                sugar: row.get(12)?,
                sodium: row.get(13)?,
                cholesterol: row.get(14)?,
                is_public: row.get(15)?,
                created_by: row.get(16)?,
            },
            created_at: row.get(17)?,
        })
    }

    // --- Foods ---

    /// Lower-cased names of every stored food.
    pub fn existing_names(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM foods")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|name| name.map(|n| name_key(&n)))
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(names)
    }

    /// Insert a batch inside one transaction. Names that already exist are
    /// left alone; the foods actually written are returned. Any other failure
    /// rolls the whole batch back.
    pub fn insert_batch(&mut self, records: &[FoodRecord]) -> Result<Vec<Food>> {
        let tx = self.conn.transaction()?;
        let mut inserted = Vec::with_capacity(records.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO foods (uuid, name, brand, category, serving_size, serving_unit,
                    calories, protein, carbs, fat, fiber, sugar, sodium, cholesterol,
                    is_public, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                 ON CONFLICT(name) DO NOTHING",
            )?;
            for record in records {
                let uuid = Uuid::new_v4().to_string();
                let now = Local::now().to_rfc3339();
                let changed = stmt
                    .execute(params![
                        uuid,
                        record.name,
                        record.brand,
                        record.category.as_str(),
                        record.serving_size,
                        record.serving_unit,
                        record.calories,
                        record.protein,
                        record.carbs,
                        record.fat,
                        record.fiber,
                        record.sugar,
                        record.sodium,
                        record.cholesterol,
                        record.is_public,
                        record.created_by,
                        now,
                    ])
                    .with_context(|| format!("Failed to insert food '{}'", record.name))?;
                if changed > 0 {
                    inserted.push(Food {
                        id: tx.last_insert_rowid(),
                        uuid,
                        record: record.clone(),
                        created_at: now,
                    });
                }
            }
        }
        tx.commit().context("Failed to commit food batch")?;
        Ok(inserted)
    }

    pub fn get_food_by_name(&self, name: &str) -> Result<Option<Food>> {
        let food = self
            .conn
            .query_row(
                &format!("SELECT {FOOD_COLUMNS} FROM foods WHERE name = ?1"),
                params![name.trim()],
                Self::food_from_row,
            )
            .optional()?;
        Ok(food)
    }

    pub fn list_foods(&self, search: Option<&str>) -> Result<Vec<Food>> {
        if let Some(query) = search {
            let escaped = query
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            let pattern = format!("%{escaped}%");
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {FOOD_COLUMNS} FROM foods
                 WHERE name LIKE ?1 ESCAPE '\\' OR brand LIKE ?1 ESCAPE '\\'
                 ORDER BY name LIMIT 100"
            ))?;
            let foods = stmt
                .query_map(params![pattern], Self::food_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(foods);
        }
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {FOOD_COLUMNS} FROM foods ORDER BY name LIMIT 100"))?;
        let foods = stmt
            .query_map([], Self::food_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(foods)
    }

    pub fn count_foods(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM foods", [], |row| row.get(0))?;
        Ok(count)
    }
}

const FOOD_COLUMNS: &str = "id, uuid, name, brand, category, serving_size, serving_unit, \
    calories, protein, carbs, fat, fiber, sugar, sodium, cholesterol, is_public, created_by, created_at";
