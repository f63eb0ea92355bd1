use crate::{migration_4b2882f72b45_added_table, Migration};

/// Every application revision, oldest first
pub fn all() -> Vec<Migration> {
    vec![migration_4b2882f72b45_added_table::migration()]
}
