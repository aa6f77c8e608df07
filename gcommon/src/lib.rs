//! Shared primitives used across the groundchat crates.
//!
//! ```rust
//! use gcommon::{Registry, TraceId};
//!
//! let trace = TraceId::new("trace-1");
//! let mut roles = Registry::new();
//! roles.insert("user".to_string(), "User role");
//!
//! assert_eq!(trace.to_string(), "trace-1");
//! assert_eq!(roles.get("user"), Some(&"User role"));
//! ```

pub mod future {
    //! Boxed future alias shared by the async seams.
    //!
    //! ```rust
    //! use gcommon::BoxFuture;
    //!
    //! fn word_count<'a>(value: &'a str) -> BoxFuture<'a, usize> {
    //!     Box::pin(async move { value.split_whitespace().count() })
    //! }
    //!
    //! let _future = word_count("hello there");
    //! ```

    use std::future::Future;
    use std::pin::Pin;

    pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
}

pub mod context {
    //! Request correlation identifiers.

    use std::fmt::{Display, Formatter};

    /// Correlates one inbound HTTP request with the provider calls it triggers.
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    pub struct TraceId(String);

    impl TraceId {
        pub fn new(value: impl Into<String>) -> Self {
            Self(value.into())
        }

        pub fn as_str(&self) -> &str {
            self.0.as_str()
        }
    }

    impl Display for TraceId {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl From<String> for TraceId {
        fn from(value: String) -> Self {
            Self(value)
        }
    }

    impl From<&str> for TraceId {
        fn from(value: &str) -> Self {
            Self(value.to_string())
        }
    }
}

pub mod registry {
    //! Read-mostly keyed registry used for roles and users loaded at startup.
    //!
    //! ```rust
    //! use gcommon::Registry;
    //!
    //! let mut registry = Registry::new();
    //! assert!(registry.insert_if_absent("admin".to_string(), 1_u32));
    //! assert!(!registry.insert_if_absent("admin".to_string(), 2_u32));
    //!
    //! assert_eq!(registry.get("admin"), Some(&1));
    //! ```

    use std::borrow::Borrow;
    use std::collections::HashMap;
    use std::hash::Hash;

    #[derive(Debug, Clone)]
    pub struct Registry<K, V> {
        items: HashMap<K, V>,
    }

    impl<K, V> Default for Registry<K, V>
    where
        K: Eq + Hash,
    {
        fn default() -> Self {
            Self {
                items: HashMap::new(),
            }
        }
    }

    impl<K, V> Registry<K, V>
    where
        K: Eq + Hash,
    {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&mut self, key: K, value: V) -> Option<V> {
            self.items.insert(key, value)
        }

        /// Inserts only when the key is new; the first registration wins.
        pub fn insert_if_absent(&mut self, key: K, value: V) -> bool {
            if self.items.contains_key(&key) {
                return false;
            }

            self.items.insert(key, value);
            true
        }

        pub fn get<Q>(&self, key: &Q) -> Option<&V>
        where
            K: Borrow<Q>,
            Q: Eq + Hash + ?Sized,
        {
            self.items.get(key)
        }

        pub fn contains_key<Q>(&self, key: &Q) -> bool
        where
            K: Borrow<Q>,
            Q: Eq + Hash + ?Sized,
        {
            self.items.contains_key(key)
        }

        pub fn keys(&self) -> impl Iterator<Item = &K> {
            self.items.keys()
        }

        pub fn values(&self) -> impl Iterator<Item = &V> {
            self.items.values()
        }

        pub fn len(&self) -> usize {
            self.items.len()
        }

        pub fn is_empty(&self) -> bool {
            self.items.is_empty()
        }
    }
}

pub use context::TraceId;
pub use future::BoxFuture;
pub use registry::Registry;
