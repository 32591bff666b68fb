//! Function table.
//!
//! Installed once when the server starts and never changed afterwards.
//! Names need not be unique: a call reaches every entry with its name.

use std::fmt;
use std::sync::Arc;

use cfipc_core::status::Status;

/// A server-side function. Receives the attached payload bytes, may
/// mutate them in place, returns a status.
pub type FunctionHandler = Arc<dyn Fn(&mut [u8]) -> Status + Send + Sync>;

#[derive(Clone)]
pub struct FunctionDescriptor {
    pub name: String,
    pub handler: FunctionHandler,
}

impl FunctionDescriptor {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut [u8]) -> Status + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
        }
    }
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Ordered, immutable function table.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    table: Vec<FunctionDescriptor>,
}

impl FunctionRegistry {
    pub fn new(table: Vec<FunctionDescriptor>) -> Self {
        Self { table }
    }

    pub fn builder() -> FunctionRegistryBuilder {
        FunctionRegistryBuilder::default()
    }

    /// Entries named `name`, in registration order.
    pub fn matching<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FunctionDescriptor> + 'a {
        self.table.iter().filter(move |d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.matching(name).next().is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.table.iter().map(|d| d.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl From<Vec<FunctionDescriptor>> for FunctionRegistry {
    fn from(table: Vec<FunctionDescriptor>) -> Self {
        Self::new(table)
    }
}

#[derive(Default)]
pub struct FunctionRegistryBuilder {
    table: Vec<FunctionDescriptor>,
}

impl FunctionRegistryBuilder {
    pub fn function<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut [u8]) -> Status + Send + Sync + 'static,
    {
        self.table.push(FunctionDescriptor::new(name, handler));
        self
    }

    pub fn build(self) -> FunctionRegistry {
        FunctionRegistry::new(self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_keeps_registration_order() {
        let registry = FunctionRegistry::builder()
            .function("a", |_| 1)
            .function("b", |_| 2)
            .function("a", |_| 3)
            .build();
        let mut buf = [0u8; 0];
        let statuses: Vec<Status> = registry
            .matching("a")
            .map(|d| (d.handler)(&mut buf))
            .collect();
        assert_eq!(statuses, vec![1, 3]);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["a", "b", "a"]);
    }

    #[test]
    fn lookup_is_exact() {
        let registry = FunctionRegistry::new(vec![FunctionDescriptor::new("set_color", |_| 0)]);
        assert!(registry.contains("set_color"));
        assert!(!registry.contains("set_colour"));
        assert!(!registry.contains("SET_COLOR"));
        assert!(!registry.contains(""));
    }

    #[test]
    fn empty_registry() {
        let registry = FunctionRegistry::default();
        assert!(registry.is_empty());
        assert_eq!(registry.matching("x").count(), 0);
    }

    #[test]
    fn debug_shows_name_only() {
        let d = FunctionDescriptor::new("f", |_| 0);
        assert_eq!(format!("{:?}", d), "FunctionDescriptor { name: \"f\", .. }");
    }
}
