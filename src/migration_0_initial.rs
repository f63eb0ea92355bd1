use super::Migration;

pub const REVISION: &str = "initial";

pub fn migration() -> Migration {
    Migration::new(REVISION)
        .with_message("Revision history")
        .with_up(
            r#"
        CREATE TABLE migrations (
            revision TEXT NOT NULL PRIMARY KEY,
            executed_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
        )
        .with_down(
            r#"
        DROP TABLE IF EXISTS migrations
        "#,
        )
}
