use crate::Result;
use crate::error::Error;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use subtle::ConstantTimeEq;
use tracing::info;

#[derive(Debug, Default)]
struct Tables {
    passwords: HashMap<String, String>,
    /// Kept sorted and deduplicated for binary search
    groups: HashMap<String, Vec<String>>,
}

/// Usernames, passwords and group memberships.
///
/// Read-mostly: lookups take a shared lock, loads and updates an exclusive one.
#[derive(Debug, Default)]
pub struct CredentialStore {
    tables: RwLock<Tables>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces passwords; the last write for a username wins
    pub fn add_credentials<I, U, P>(&self, entries: I)
    where
        I: IntoIterator<Item = (U, P)>,
        U: Into<String>,
        P: Into<String>,
    {
        let mut tables = self.tables.write();
        for (username, password) in entries {
            tables.passwords.insert(username.into(), password.into());
        }
    }

    /// Replaces the group set of each listed user
    pub fn add_groups<I, U, G>(&self, entries: I)
    where
        I: IntoIterator<Item = (U, G)>,
        U: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        let mut tables = self.tables.write();
        for (username, groups) in entries {
            let mut groups: Vec<String> = groups.into_iter().map(Into::into).collect();
            groups.sort();
            groups.dedup();
            tables.groups.insert(username.into(), groups);
        }
    }

    /// Loads `[username, password, groups?]` rows.
    ///
    /// Each row is committed as it is read, so rows before a malformed one
    /// stay loaded. Row numbers in [`Error::MalformedRow`] start at 1.
    pub fn load_from_table<R, F>(&self, rows: R) -> Result<usize>
    where
        R: IntoIterator<Item = Vec<F>>,
        F: AsRef<str>,
    {
        let mut loaded = 0;
        for (index, row) in rows.into_iter().enumerate() {
            let (username, password) = match row.as_slice() {
                [username, password, ..] => (username.as_ref(), password.as_ref()),
                _ => return Err(Error::MalformedRow { row: index + 1 }),
            };
            self.add_credentials([(username, password)]);

            let groups: Vec<&str> = row
                .get(2)
                .map(|g| g.as_ref().split(' ').filter(|g| !g.is_empty()).collect())
                .unwrap_or_default();
            if !groups.is_empty() {
                self.add_groups([(username, groups)]);
            }
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Loads a comma-separated table, one user per line
    pub fn load_csv_reader(&self, reader: impl Read) -> Result<usize> {
        let mut rows = Vec::new();
        for line in BufReader::new(reader).lines() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            rows.push(line.split(',').map(str::to_string).collect::<Vec<_>>());
        }
        self.load_from_table(rows)
    }

    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let loaded = self.load_csv_reader(std::fs::File::open(path)?)?;
        info!(path = %path.display(), users = loaded, "loaded credentials");
        Ok(loaded)
    }

    /// True iff `username` exists and `password` matches exactly
    pub fn check(&self, username: &str, password: &str) -> bool {
        let tables = self.tables.read();
        tables
            .passwords
            .get(username)
            .is_some_and(|stored| bool::from(stored.as_bytes().ct_eq(password.as_bytes())))
    }

    /// True iff the user belongs to at least one of `required`
    pub fn user_in_any_group(&self, username: &str, required: &[String]) -> bool {
        let tables = self.tables.read();
        let Some(groups) = tables.groups.get(username) else {
            return false;
        };
        required
            .iter()
            .any(|group| groups.binary_search(group).is_ok())
    }

    pub fn groups_of(&self, username: &str) -> Vec<String> {
        self.tables
            .read()
            .groups
            .get(username)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.tables.read().passwords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
