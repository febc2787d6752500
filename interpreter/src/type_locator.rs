use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};
use crate::error::TypeNotFoundError;
use crate::types::{array_of, builtin, TypeHandle};

/// Maps dotted type names, optionally `[]`-suffixed, to type handles.
pub trait TypeLocator: Send + Sync {
    fn find_type(&self, name: &str) -> Result<TypeHandle, TypeNotFoundError>;
    fn fingerprint(&self) -> u64;
}

/// Registered types by name plus import prefixes tried for unqualified names.
#[derive(Debug, Clone)]
pub struct StandardTypeLocator {
    types: HashMap<String, TypeHandle>,
    imports: Vec<String>,
}

static SHARED: LazyLock<Arc<StandardTypeLocator>> = LazyLock::new(|| Arc::new(StandardTypeLocator::new()));

const QUALIFIED_BUILTINS: &[(&str, &str)] = &[
    ("java.lang.Object", "Object"),
    ("java.lang.String", "String"),
    ("java.lang.Number", "Number"),
    ("java.lang.Boolean", "Boolean"),
    ("java.lang.Integer", "Integer"),
    ("java.lang.Long", "Long"),
    ("java.lang.Float", "Float"),
    ("java.lang.Double", "Double"),
    ("java.util.List", "List"),
    ("java.util.Map", "Map"),
];

impl Default for StandardTypeLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardTypeLocator {
    /// A locator that knows the built-in types.
    pub fn new() -> Self {
        let mut locator = StandardTypeLocator { types: HashMap::new(), imports: Vec::new() };
        for t in builtin::all() {
            locator.register(t);
        }
        for (qualified, short) in QUALIFIED_BUILTINS {
            if let Some(t) = locator.types.get(*short).cloned() {
                locator.types.insert((*qualified).to_string(), t);
            }
        }
        locator
    }

    pub fn shared() -> Arc<StandardTypeLocator> {
        SHARED.clone()
    }

    pub fn register(&mut self, t: TypeHandle) {
        self.types.insert(t.name().to_string(), t);
    }

    pub fn register_as(&mut self, name: impl Into<String>, t: TypeHandle) {
        self.types.insert(name.into(), t);
    }

    /// Unqualified names are also looked up as `prefix.name`.
    pub fn import(&mut self, prefix: impl Into<String>) {
        let prefix = prefix.into();
        if !self.imports.contains(&prefix) {
            self.imports.push(prefix);
        }
    }

    fn lookup(&self, name: &str) -> Option<TypeHandle> {
        self.types.get(name).cloned().or_else(|| {
            self.imports
                .iter()
                .find_map(|prefix| self.types.get(&format!("{prefix}.{name}")).cloned())
        })
    }
}

impl TypeLocator for StandardTypeLocator {
    fn find_type(&self, name: &str) -> Result<TypeHandle, TypeNotFoundError> {
        let mut base = name.trim();
        let mut dimensions = 0;
        while let Some(stripped) = base.strip_suffix("[]") {
            base = stripped.trim_end();
            dimensions += 1;
        }
        let mut found = self
            .lookup(base)
            .ok_or_else(|| TypeNotFoundError { name: name.to_string() })?;
        for _ in 0..dimensions {
            found = array_of(&found);
        }
        Ok(found)
    }

    fn fingerprint(&self) -> u64 {
        let mut entries: Vec<(&String, u64)> = self.types.iter().map(|(k, v)| (k, v.id())).collect();
        entries.sort();
        let mut hasher = DefaultHasher::new();
        entries.hash(&mut hasher);
        self.imports.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeBuilder;

    #[test]
    fn locates_builtins_by_short_and_qualified_name() {
        let locator = StandardTypeLocator::new();
        let short = locator.find_type("String").unwrap();
        let qualified = locator.find_type("java.lang.String").unwrap();
        assert!(Arc::ptr_eq(&short, &qualified));
        assert!(locator.find_type("int").is_ok());
    }

    #[test]
    fn array_suffixes() {
        let locator = StandardTypeLocator::new();
        let matrix = locator.find_type("int[][]").unwrap();
        assert_eq!(matrix.name(), "int[][]");
        assert!(Arc::ptr_eq(&matrix, &array_of(&array_of(&builtin::int()))));
    }

    #[test]
    fn imports_and_registration() {
        let mut locator = StandardTypeLocator::new();
        let point = TypeBuilder::class("Point").build();
        locator.register_as("com.example.Point", point.clone());
        assert!(locator.find_type("Point").is_err());

        let before = locator.fingerprint();
        locator.import("com.example");
        assert_ne!(locator.fingerprint(), before);
        assert!(Arc::ptr_eq(&locator.find_type("Point").unwrap(), &point));
    }

    #[test]
    fn unknown_type() {
        let err = StandardTypeLocator::new().find_type("com.Missing").unwrap_err();
        assert_eq!(err.to_string(), "type 'com.Missing' cannot be found");
    }

    #[test]
    fn fingerprint_is_content_based() {
        assert_eq!(StandardTypeLocator::new().fingerprint(), StandardTypeLocator::new().fingerprint());
    }
}
