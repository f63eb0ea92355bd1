mod chain;
pub mod config;
mod migration_0_initial;
pub mod migration_4b2882f72b45_added_table;
mod migrator;
pub mod revisions;

pub use chain::Chain;
pub use migrator::{AppliedRevision, Migrator, Target};

use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Default, Debug, Clone)]
/// A single revision in a migration chain
pub struct Migration {
    pub revision: String,
    /// The revision this one is applied on top of
    pub down_revision: Option<String>,
    pub message: String,
    pub up: Vec<String>,
    pub down: Vec<String>,
    pub mode: Mode,
}

#[derive(Error, Debug)]
/// An error validating or executing migrations
pub enum MigrationError {
    #[error("Error executing sql \"{statement}\": {error}")]
    Statement {
        statement: String,
        error: sqlx::Error,
    },
    #[error("revision {0} is declared more than once")]
    DuplicateRevision(String),
    #[error("multiple base revisions: {}", .0.join(", "))]
    MultipleBases(Vec<String>),
    #[error("revisions {} all revise {parent}", .revisions.join(", "))]
    Branch {
        parent: String,
        revisions: Vec<String>,
    },
    #[error("revisions not reachable from the base: {}", .0.join(", "))]
    Disconnected(Vec<String>),
    #[error("unknown revision {0}")]
    UnknownRevision(String),
    #[error("revision {0} is reserved for the history table")]
    ReservedRevision(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Broad classification of the database errors a migration can hit
pub enum ErrorKind {
    /// The object being created is already present
    AlreadyExists,
    /// The object being dropped or altered is missing
    DoesNotExist,
    Other,
}

impl MigrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MigrationError::Statement {
                error: sqlx::Error::Database(db),
                ..
            } => match db.code().as_deref() {
                // duplicate_table
                Some("42P07") => ErrorKind::AlreadyExists,
                // undefined_table
                Some("42P01") => ErrorKind::DoesNotExist,
                _ => ErrorKind::Other,
            },
            _ => ErrorKind::Other,
        }
    }
}

#[derive(Default, Debug, PartialEq, Clone, Copy)]
/// The migration's execution mode
pub enum Mode {
    /// The migration is stable and ready for deployment
    #[default]
    Stable,
    /// The migration is still being worked on and should not be deployed
    Debug,
    /// The migration is still being worked on and should not be deployed. This
    /// mode is mostly used to test complex migrations that alter existing
    /// structures to ensure the entire chain is re-playable
    NuclearDebug,
}

macro_rules! migration_try {
    ($condition:expr, $stmt:expr) => {{
        match $condition {
            Ok(result) => result,
            Err(err) => {
                return Err(MigrationError::Statement {
                    statement: $stmt.to_owned(),
                    error: err,
                })
            }
        }
    }};
}

impl Migration {
    /// Create an empty migration. `revision` is the unique key recorded in
    /// the history table once the migration has been performed.
    pub fn new(revision: &str) -> Self {
        Migration {
            revision: revision.to_owned(),
            ..Default::default()
        }
    }

    /// Declare the revision this migration is applied on top of
    pub fn revises(mut self, down_revision: &str) -> Self {
        self.down_revision = Some(down_revision.to_owned());
        self
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = message.to_owned();
        self
    }

    /// Add an "Up" sql statement that is performed when applying the migration
    pub fn with_up(mut self, up: &str) -> Self {
        self.up.push(up.to_owned());
        self
    }

    /// Add a "Down" sql statement that is performed when rolling a migration back.
    /// Down statements run in the reverse order they were added.
    pub fn with_down(mut self, down: &str) -> Self {
        self.down.insert(0, down.to_owned());
        self
    }

    /// Mark this migration as executing in debug mode. Will panic if `#[cfg(not(debug_assertions))]`
    pub fn debug(mut self) -> Self {
        #[cfg(not(debug_assertions))]
        panic!("Debug migration turned on");
        self.mode = Mode::Debug;
        self
    }

    /// Mark this migration as executing in "nuclear" debug mode, forcing all migrations to-rerun. Will panic if `#[cfg(not(debug_assertions))]`
    pub fn nuclear_debug(mut self) -> Self {
        #[cfg(not(debug_assertions))]
        panic!("Debug migration turned on");
        self.mode = Mode::NuclearDebug;
        self
    }

    /// The "Up" statements as a script, for running by hand
    pub fn up_sql(&self) -> String {
        script(&self.up)
    }

    /// The "Down" statements as a script, for running by hand
    pub fn down_sql(&self) -> String {
        script(&self.down)
    }

    /// Revision metadata followed by both scripts
    pub fn summary(&self) -> String {
        format!(
            "Revision: {}\nRevises: {}\nMessage: {}\n\n-- upgrade\n{}\n-- downgrade\n{}",
            self.revision,
            self.down_revision.as_deref().unwrap_or("<base>"),
            self.message,
            self.up_sql(),
            self.down_sql()
        )
    }

    /// Validate the chain formed by `migrations` and bring the database up to
    /// date with it, honoring each migration's `Mode`.
    pub async fn run_all(pool: &PgPool, migrations: Vec<Migration>) -> Result<(), MigrationError> {
        Migrator::new(pool, migrations)?.run().await
    }

    /// Run the "Up" statements in a single transaction without touching the
    /// history table.
    pub async fn apply(&self, db: &PgPool) -> Result<(), MigrationError> {
        info!(revision = %self.revision, "Applying {}", self.revision);
        self.execute(db, &self.up, None).await
    }

    /// Run the "Down" statements in a single transaction without touching
    /// the history table.
    pub async fn revert(&self, db: &PgPool) -> Result<(), MigrationError> {
        info!(revision = %self.revision, "Reverting {}", self.revision);
        self.execute(db, &self.down, None).await
    }

    pub(crate) async fn perform(&self, db: &PgPool) -> Result<(), MigrationError> {
        info!(revision = %self.revision, "Performing {}", self.revision);
        self.execute(
            db,
            &self.up,
            Some("INSERT INTO migrations (revision) VALUES ($1)"),
        )
        .await
    }

    pub(crate) async fn undo(&self, db: &PgPool) -> Result<(), MigrationError> {
        info!(revision = %self.revision, "Undoing {}", self.revision);
        // The bootstrap revision drops the history table itself.
        let history = if self.revision == migration_0_initial::REVISION {
            None
        } else {
            Some("DELETE FROM migrations WHERE revision = $1")
        };
        self.execute(db, &self.down, history).await
    }

    /// Runs `statements` and then `history`, bound to this revision, in one
    /// transaction.
    async fn execute(
        &self,
        db: &PgPool,
        statements: &[String],
        history: Option<&str>,
    ) -> Result<(), MigrationError> {
        let mut tx = migration_try!(db.begin().await, "BEGIN TRANSACTION");
        for statement in statements {
            debug!(%statement);
            migration_try!(sqlx::query(statement).execute(&mut *tx).await, statement);
        }
        if let Some(history) = history {
            migration_try!(
                sqlx::query(history)
                    .bind(&self.revision)
                    .execute(&mut *tx)
                    .await,
                history
            );
        }
        migration_try!(tx.commit().await, "COMMIT TRANSACTION");
        Ok(())
    }
}

fn script(statements: &[String]) -> String {
    statements
        .iter()
        .map(|s| format!("{};\n", s.trim()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn down_statements_run_in_reverse() {
        let migration = Migration::new("a")
            .with_up("CREATE TABLE one (id INTEGER)")
            .with_up("CREATE TABLE two (id INTEGER)")
            .with_down("DROP TABLE one")
            .with_down("DROP TABLE two");
        assert_eq!(migration.down, vec!["DROP TABLE two", "DROP TABLE one"]);
        assert_eq!(
            migration.up_sql(),
            "CREATE TABLE one (id INTEGER);\nCREATE TABLE two (id INTEGER);\n"
        );
        assert_eq!(migration.down_sql(), "DROP TABLE two;\nDROP TABLE one;\n");
    }

    #[test]
    fn builder_records_chain_metadata() {
        let migration = Migration::new("b").revises("a").with_message("Added b.");
        assert_eq!(migration.revision, "b");
        assert_eq!(migration.down_revision.as_deref(), Some("a"));
        assert_eq!(migration.message, "Added b.");
        assert_eq!(migration.mode, Mode::Stable);
    }

    #[test]
    fn summary_shows_metadata_and_scripts() {
        let migration = Migration::new("b")
            .revises("a")
            .with_message("Added b.")
            .with_up("CREATE TABLE b (id INTEGER)")
            .with_down("DROP TABLE b");
        assert_eq!(
            migration.summary(),
            "Revision: b\nRevises: a\nMessage: Added b.\n\n\
             -- upgrade\nCREATE TABLE b (id INTEGER);\n\n\
             -- downgrade\nDROP TABLE b;\n"
        );
        assert!(Migration::new("a").summary().starts_with("Revision: a\nRevises: <base>\n"));
    }

    #[test]
    #[cfg(debug_assertions)]
    fn debug_modes() {
        assert_eq!(Migration::new("a").debug().mode, Mode::Debug);
        assert_eq!(Migration::new("a").nuclear_debug().mode, Mode::NuclearDebug);
    }

    #[test]
    fn non_database_errors_are_unclassified() {
        let err = MigrationError::Statement {
            statement: "SELECT 1".to_owned(),
            error: sqlx::Error::RowNotFound,
        };
        assert_eq!(err.kind(), ErrorKind::Other);
        assert!(err.to_string().starts_with("Error executing sql \"SELECT 1\": "));
        assert_eq!(
            MigrationError::UnknownRevision("x".to_owned()).kind(),
            ErrorKind::Other
        );
    }
}
