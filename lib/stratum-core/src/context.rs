//! Request-scoped context overlay.
//!
//! A [`Context`] carries cross-cutting values (logger, span, trace id) down a
//! handler chain without threading them through every signature. It is an
//! append-only overlay: [`Context::with`] never mutates the receiver, it
//! returns a new context layered on top of it, so a value added by an inner
//! layer is invisible to the outer ones.
//!
//! Keys are types, not strings. Each concern declares a zero-sized marker
//! implementing [`ContextKey`], which also fixes the value type:
//!
//! ```
//! use stratum_core::{Context, ContextKey};
//!
//! struct RequestId;
//!
//! impl ContextKey for RequestId {
//!     type Value = String;
//! }
//!
//! let ctx = Context::new().with::<RequestId>("req-42".to_string());
//! assert_eq!(ctx.get::<RequestId>().map(String::as_str), Some("req-42"));
//! ```

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

/// Typed key for a [`Context`] entry.
pub trait ContextKey: 'static {
    /// Type of the value stored under this key.
    type Value: Send + Sync + 'static;
}

struct Entry {
    key: TypeId,
    key_name: &'static str,
    value: Box<dyn Any + Send + Sync>,
    parent: Option<Arc<Entry>>,
}

/// Immutable, append-only key/value overlay attached to one request.
///
/// Cloning is one `Arc` increment.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Entry>>,
}

impl Context {
    /// Empty context.
    #[must_use]
    pub const fn new() -> Self {
        Self { head: None }
    }

    /// Returns a new context with `value` stored under `K`.
    ///
    /// If `K` is already present the new value shadows it; the receiver keeps
    /// reading the previous one.
    #[must_use]
    pub fn with<K: ContextKey>(&self, value: K::Value) -> Self {
        Self {
            head: Some(Arc::new(Entry {
                key: TypeId::of::<K>(),
                key_name: type_name::<K>(),
                value: Box::new(value),
                parent: self.head.clone(),
            })),
        }
    }

    /// Value stored under `K`, or `None` when no layer wrote it.
    #[must_use]
    pub fn get<K: ContextKey>(&self) -> Option<&K::Value> {
        let key = TypeId::of::<K>();
        self.entries()
            .find(|entry| entry.key == key)
            .and_then(|entry| entry.value.downcast_ref::<K::Value>())
    }

    /// Returns `true` if some layer stored a value under `K`.
    #[must_use]
    pub fn contains<K: ContextKey>(&self) -> bool {
        self.get::<K>().is_some()
    }

    /// Number of entries, shadowed ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().count()
    }

    /// Returns `true` if nothing was stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    fn entries(&self) -> impl Iterator<Item = &Entry> {
        std::iter::successors(self.head.as_deref(), |entry| entry.parent.as_deref())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries().map(|entry| entry.key_name))
            .finish()
    }
}
