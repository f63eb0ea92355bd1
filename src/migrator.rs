use crate::{migration_0_initial, Chain, Migration, MigrationError, Mode};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashSet;
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Where an upgrade or downgrade should stop
pub enum Target {
    /// The newest revision of the chain
    Head,
    /// Before the oldest revision of the chain
    Base,
    Revision(String),
}

impl FromStr for Target {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "head" => Target::Head,
            "base" => Target::Base,
            revision => Target::Revision(revision.to_owned()),
        })
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Head => f.write_str("head"),
            Target::Base => f.write_str("base"),
            Target::Revision(revision) => f.write_str(revision),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedRevision {
    pub revision: String,
    pub executed_at: DateTime<Utc>,
}

/// Runs a validated chain of migrations against a database, tracking which
/// revisions have been performed in the `migrations` table.
///
/// The migrator assumes it has exclusive access to the schema while running.
pub struct Migrator<'a> {
    pool: &'a PgPool,
    initial: Migration,
    chain: Chain,
}

impl<'a> Migrator<'a> {
    pub fn new(pool: &'a PgPool, migrations: Vec<Migration>) -> Result<Self, MigrationError> {
        Ok(Migrator {
            pool,
            initial: migration_0_initial::migration(),
            chain: Chain::new(migrations)?,
        })
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Revisions recorded in the history table. Empty when the table has not
    /// been created yet.
    async fn applied(&self) -> Result<HashSet<String>, MigrationError> {
        const STATEMENT: &str = "SELECT revision FROM migrations";
        match sqlx::query_scalar::<_, String>(STATEMENT)
            .fetch_all(self.pool)
            .await
        {
            Ok(revisions) => Ok(revisions.into_iter().collect()),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("42P01") => {
                Ok(HashSet::new())
            }
            Err(error) => Err(MigrationError::Statement {
                statement: STATEMENT.to_owned(),
                error,
            }),
        }
    }

    /// Creates the history table if needed and returns the recorded revisions.
    async fn bootstrap(&self) -> Result<HashSet<String>, MigrationError> {
        let mut applied = self.applied().await?;
        if !applied.contains(&self.initial.revision) {
            self.initial.perform(self.pool).await?;
            applied.insert(self.initial.revision.clone());
        }
        Ok(applied)
    }

    /// Performs every missing revision up to and including `target`, oldest
    /// first. Returns the revisions that were performed.
    pub async fn upgrade(&self, target: &Target) -> Result<Vec<String>, MigrationError> {
        let end = self.chain.resolve(target)?;
        let applied = self.bootstrap().await?;
        let mut performed = Vec::new();
        for migration in self.chain.iter().take(end) {
            if !applied.contains(&migration.revision) {
                migration.perform(self.pool).await?;
                performed.push(migration.revision.clone());
            }
        }
        info!(%target, performed = performed.len(), "upgrade complete");
        Ok(performed)
    }

    /// Undoes every recorded revision newer than `target`, newest first.
    /// Returns the revisions that were undone.
    pub async fn downgrade(&self, target: &Target) -> Result<Vec<String>, MigrationError> {
        let keep = self.chain.resolve(target)?;
        let applied = self.applied().await?;
        let mut undone = Vec::new();
        for migration in self.chain.iter().skip(keep).rev() {
            if applied.contains(&migration.revision) {
                migration.undo(self.pool).await?;
                undone.push(migration.revision.clone());
            }
        }
        info!(%target, undone = undone.len(), "downgrade complete");
        Ok(undone)
    }

    /// The newest recorded revision of the chain
    pub async fn current(&self) -> Result<Option<String>, MigrationError> {
        let applied = self.applied().await?;
        Ok(self
            .chain
            .iter()
            .rev()
            .find(|m| applied.contains(&m.revision))
            .map(|m| m.revision.clone()))
    }

    /// Recorded chain revisions, oldest first
    pub async fn history(&self) -> Result<Vec<AppliedRevision>, MigrationError> {
        const STATEMENT: &str = "SELECT revision, executed_at FROM migrations";
        let rows = match sqlx::query_as::<_, (String, DateTime<Utc>)>(STATEMENT)
            .fetch_all(self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("42P01") => Vec::new(),
            Err(error) => {
                return Err(MigrationError::Statement {
                    statement: STATEMENT.to_owned(),
                    error,
                })
            }
        };
        Ok(self
            .chain
            .iter()
            .filter_map(|m| {
                rows.iter()
                    .find(|(revision, _)| *revision == m.revision)
                    .map(|(revision, executed_at)| AppliedRevision {
                        revision: revision.clone(),
                        executed_at: *executed_at,
                    })
            })
            .collect())
    }

    /// Brings the database up to the head of the chain, honoring each
    /// migration's `Mode`.
    pub async fn run(&self) -> Result<(), MigrationError> {
        let mut applied = self.applied().await?;

        if self.chain.iter().any(|m| m.mode == Mode::NuclearDebug) {
            // Roll everything back, history included, then replay the chain.
            warn!("nuclear debug migration present, replaying every revision");
            for migration in self.chain.iter().rev() {
                if applied.contains(&migration.revision) {
                    migration.undo(self.pool).await?;
                }
            }
            self.initial.undo(self.pool).await?;
            self.initial.perform(self.pool).await?;
            for migration in self.chain.iter() {
                migration.perform(self.pool).await?;
            }
            return Ok(());
        }

        if !applied.contains(&self.initial.revision) {
            self.initial.perform(self.pool).await?;
        }
        for migration in self.chain.iter() {
            if migration.mode == Mode::Debug && applied.contains(&migration.revision) {
                warn!(revision = %migration.revision, "replaying debug migration");
                migration.undo(self.pool).await?;
                applied.remove(&migration.revision);
            }

            if !applied.contains(&migration.revision) {
                migration.perform(self.pool).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_targets() {
        assert_eq!("head".parse::<Target>().unwrap(), Target::Head);
        assert_eq!("base".parse::<Target>().unwrap(), Target::Base);
        assert_eq!(
            "4b2882f72b45".parse::<Target>().unwrap(),
            Target::Revision("4b2882f72b45".to_owned())
        );
        assert_eq!(Target::Revision("abc".to_owned()).to_string(), "abc");
        assert_eq!(Target::Head.to_string(), "head");
    }
}
