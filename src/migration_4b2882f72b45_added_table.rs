//! Added table.
//!
//! Revision 4b2882f72b45, revises 1af83d1bdddd. Created 2023-10-13 15:45:26.
//!
//! `job.user_id` points at the owning user by convention only; no foreign key
//! is declared.

use crate::Migration;

pub const REVISION: &str = "4b2882f72b45";
pub const DOWN_REVISION: &str = "1af83d1bdddd";

pub fn migration() -> Migration {
    Migration::new(REVISION)
        .revises(DOWN_REVISION)
        .with_message("Added table.")
        .with_up(
            r#"
        CREATE TABLE job (
            id INTEGER NOT NULL,
            name VARCHAR(256) NOT NULL,
            user_id INTEGER NOT NULL,
            PRIMARY KEY (id)
        )
        "#,
        )
        // No IF EXISTS: dropping a missing table must fail.
        .with_down("DROP TABLE job")
}
