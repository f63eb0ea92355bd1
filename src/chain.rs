use crate::{migration_0_initial, Migration, MigrationError, Target};
use std::collections::HashMap;

/// Migrations linked through their `down_revision` into one linear sequence,
/// oldest first.
#[derive(Debug, Clone)]
pub struct Chain {
    migrations: Vec<Migration>,
}

impl Chain {
    /// Orders `migrations` by following each migration's `down_revision`.
    ///
    /// The base is the single migration whose `down_revision` is `None` or
    /// points outside of the supplied set, which lets a chain continue from
    /// revisions managed elsewhere. Every other migration must revise exactly
    /// one migration of the set, and no two migrations may revise the same one.
    /// The history table's own revision id cannot be reused.
    pub fn new(migrations: Vec<Migration>) -> Result<Self, MigrationError> {
        let mut by_revision: HashMap<String, Migration> = HashMap::new();
        for migration in migrations {
            if migration.revision == migration_0_initial::REVISION {
                return Err(MigrationError::ReservedRevision(migration.revision));
            }
            if by_revision.contains_key(&migration.revision) {
                return Err(MigrationError::DuplicateRevision(migration.revision));
            }
            by_revision.insert(migration.revision.clone(), migration);
        }

        let mut bases = Vec::new();
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for migration in by_revision.values() {
            match migration.down_revision.as_deref() {
                Some(parent) if by_revision.contains_key(parent) => children
                    .entry(parent)
                    .or_default()
                    .push(migration.revision.as_str()),
                _ => bases.push(migration.revision.clone()),
            }
        }

        if let Some((parent, revisions)) = children.iter().find(|(_, c)| c.len() > 1) {
            let mut revisions: Vec<String> = revisions.iter().map(|r| (*r).to_owned()).collect();
            revisions.sort();
            return Err(MigrationError::Branch {
                parent: (*parent).to_owned(),
                revisions,
            });
        }

        let base = match bases.len() {
            0 if by_revision.is_empty() => return Ok(Chain { migrations: Vec::new() }),
            0 => {
                let mut unreachable: Vec<String> = by_revision.keys().cloned().collect();
                unreachable.sort();
                return Err(MigrationError::Disconnected(unreachable));
            }
            1 => bases.remove(0),
            _ => {
                bases.sort();
                return Err(MigrationError::MultipleBases(bases));
            }
        };

        let mut order = vec![base];
        while let Some(next) = children
            .get(order[order.len() - 1].as_str())
            .and_then(|c| c.first())
        {
            order.push((*next).to_owned());
        }

        if order.len() != by_revision.len() {
            let mut unreachable: Vec<String> = by_revision
                .keys()
                .filter(|revision| !order.contains(revision))
                .cloned()
                .collect();
            unreachable.sort();
            return Err(MigrationError::Disconnected(unreachable));
        }

        let migrations = order
            .iter()
            .filter_map(|revision| by_revision.remove(revision))
            .collect();
        Ok(Chain { migrations })
    }

    pub fn base(&self) -> Option<&Migration> {
        self.migrations.first()
    }

    pub fn head(&self) -> Option<&Migration> {
        self.migrations.last()
    }

    /// Index of `revision` in the chain, oldest first
    pub fn position(&self, revision: &str) -> Option<usize> {
        self.migrations.iter().position(|m| m.revision == revision)
    }

    /// Number of migrations, counted from the base, that are applied once
    /// the database sits at `target`
    pub fn resolve(&self, target: &Target) -> Result<usize, MigrationError> {
        match target {
            Target::Head => Ok(self.len()),
            Target::Base => Ok(0),
            Target::Revision(revision) => self
                .position(revision)
                .map(|index| index + 1)
                .ok_or_else(|| MigrationError::UnknownRevision(revision.clone())),
        }
    }

    /// Script performing every migration up to and including `target`,
    /// oldest first, for running by hand against a database at the base.
    pub fn upgrade_script(&self, target: &Target) -> Result<String, MigrationError> {
        let end = self.resolve(target)?;
        let mut script = String::new();
        for migration in self.iter().take(end) {
            script.push_str(&format!(
                "-- Running upgrade {} -> {}\n",
                migration.down_revision.as_deref().unwrap_or("<base>"),
                migration.revision
            ));
            script.push_str(&migration.up_sql());
        }
        Ok(script)
    }

    /// Script undoing every migration newer than `target`, newest first, for
    /// running by hand against a database at the head.
    pub fn downgrade_script(&self, target: &Target) -> Result<String, MigrationError> {
        let keep = self.resolve(target)?;
        let mut script = String::new();
        for migration in self.iter().skip(keep).rev() {
            script.push_str(&format!(
                "-- Running downgrade {} -> {}\n",
                migration.revision,
                migration.down_revision.as_deref().unwrap_or("<base>")
            ));
            script.push_str(&migration.down_sql());
        }
        Ok(script)
    }

    pub fn get(&self, revision: &str) -> Option<&Migration> {
        self.migrations.iter().find(|m| m.revision == revision)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Migration> {
        self.migrations.iter()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl<'a> IntoIterator for &'a Chain {
    type Item = &'a Migration;
    type IntoIter = std::slice::Iter<'a, Migration>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
