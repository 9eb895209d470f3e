use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

use crate::error::DbError;

/// Named SQL templates with `{param}` placeholders.
///
/// Templates are stored as given; nothing is validated until execution.
#[derive(Debug, Default)]
pub struct QueryRegistry {
    queries: RwLock<HashMap<String, Arc<str>>>,
}

impl QueryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<str>>> {
        self.queries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<str>>> {
        self.queries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register `template` under `name`, replacing any earlier template with that name.
    pub fn store(&self, name: impl Into<String>, template: impl Into<String>) {
        let name = name.into();
        let template: Arc<str> = Arc::from(template.into());
        if self.write().insert(name.clone(), template).is_some() {
            warn!(query = %name, "overwriting registered query");
        }
    }

    /// Look up a template.
    ///
    /// # Errors
    /// Returns `DbError::QueryNotFound` when nothing is registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<str>, DbError> {
        self.read()
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::QueryNotFound {
                query: name.to_owned(),
            })
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn remove(&self, name: &str) -> Option<Arc<str>> {
        self.write().remove(name)
    }

    pub fn clear(&self) {
        self.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_resolve() {
        let registry = QueryRegistry::new();
        registry.store("get_user", "SELECT * FROM users WHERE id = {user_id}");
        assert_eq!(
            &*registry.resolve("get_user").unwrap(),
            "SELECT * FROM users WHERE id = {user_id}"
        );
        assert!(registry.contains("get_user"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn overwrite_keeps_latest_template() {
        let registry = QueryRegistry::new();
        registry.store("q", "SELECT 1");
        registry.store("q", "SELECT 2");
        assert_eq!(&*registry.resolve("q").unwrap(), "SELECT 2");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_name_is_query_not_found() {
        let registry = QueryRegistry::new();
        let err = registry.resolve("missing").unwrap_err();
        assert!(matches!(err, DbError::QueryNotFound { ref query } if query == "missing"));
    }

    #[test]
    fn names_are_sorted_and_clear_empties() {
        let registry = QueryRegistry::new();
        registry.store("b", "SELECT 2");
        registry.store("a", "SELECT 1");
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        registry.clear();
        assert!(registry.is_empty());
    }
}
