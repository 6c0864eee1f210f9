//! Type Registry
//!
//! One isolated key -> record table per registered shape. Shapes are resolved
//! to a [`ShapeId`] once, at registration; the watch path then addresses its
//! table by index and never inspects types again. Typed reads look the shape up
//! by `TypeId` and downcast the table they find.
//!
//! Tables are `DashMap`s, so readers and the single dispatcher writing a given
//! key never need caller-side locking.

#[cfg(test)]
mod registry_test;

use std::any::Any;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::Span;

use crate::metrics::DECODE_FAILURES;
use crate::store::matches_prefix;
use crate::CodecError;
use crate::Error;
use crate::LogContext;
use crate::Result;

/// A decodable configuration record.
///
/// Implemented for every owned type that round-trips through serde.
pub trait Shape: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Shape for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Reported for a [`ShapeId`] issued by another registry
const UNKNOWN_SHAPE: &str = "<unknown>";

pub(crate) fn shape_name<T: Shape>() -> &'static str {
    std::any::type_name::<T>()
}

/// Index of a registered shape's table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeId(usize);

impl ShapeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Untyped view over one shape's table, used by the watch path
pub trait ShapeTable: Send + Sync + 'static {
    fn shape_name(&self) -> &'static str;

    /// Decodes `raw` into a fresh record and stores it under `key`.
    /// On failure the existing entry is left as it was.
    fn put(
        &self,
        key: &str,
        raw: &[u8],
    ) -> Result<()>;

    /// Returns whether an entry was removed
    fn remove(
        &self,
        key: &str,
    ) -> bool;

    fn contains(
        &self,
        key: &str,
    ) -> bool;

    fn collect_keys(
        &self,
        prefix: &str,
        out: &mut Vec<String>,
    );

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn as_any(&self) -> &dyn Any;
}

/// Table of decoded records of one shape
pub struct TypedTable<T: Shape> {
    entries: DashMap<String, T>,
}

impl<T: Shape> Default for TypedTable<T> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<T: Shape> TypedTable<T> {
    /// Returns a copy of the cached record, decoupled from the live entry
    pub fn get(
        &self,
        key: &str,
    ) -> Option<T> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }
}

impl<T: Shape> ShapeTable for TypedTable<T> {
    fn shape_name(&self) -> &'static str {
        shape_name::<T>()
    }

    fn put(
        &self,
        key: &str,
        raw: &[u8],
    ) -> Result<()> {
        let record: T = serde_json::from_slice(raw).map_err(|source| CodecError::Decode {
            shape: shape_name::<T>(),
            key: key.to_string(),
            source,
        })?;
        self.entries.insert(key.to_string(), record);
        Ok(())
    }

    fn remove(
        &self,
        key: &str,
    ) -> bool {
        self.entries.remove(key).is_some()
    }

    fn contains(
        &self,
        key: &str,
    ) -> bool {
        self.entries.contains_key(key)
    }

    fn collect_keys(
        &self,
        prefix: &str,
        out: &mut Vec<String>,
    ) {
        out.extend(
            self.entries
                .iter()
                .filter(|entry| matches_prefix(entry.key(), prefix))
                .map(|entry| entry.key().clone()),
        );
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Registry of every shape the manager was wired with
pub struct TypeRegistry {
    tables: Vec<Arc<dyn ShapeTable>>,
    by_type: HashMap<TypeId, ShapeId>,
    span: Span,
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let shapes: Vec<_> = self.tables.iter().map(|t| (t.shape_name(), t.len())).collect();
        f.debug_struct("TypeRegistry").field("shapes", &shapes).finish()
    }
}

impl TypeRegistry {
    pub fn new(log: &LogContext) -> Self {
        Self {
            tables: Vec::new(),
            by_type: HashMap::new(),
            span: log.module_span("store"),
        }
    }

    /// Creates the table for `T`, or returns the existing one's id if `T`
    /// was registered before (several prefixes may share a shape).
    pub fn register<T: Shape>(&mut self) -> ShapeId {
        if let Some(id) = self.by_type.get(&TypeId::of::<T>()) {
            return *id;
        }

        let id = ShapeId(self.tables.len());
        self.tables.push(Arc::new(TypedTable::<T>::default()));
        self.by_type.insert(TypeId::of::<T>(), id);

        debug!(parent: &self.span, operation = "register", shape = shape_name::<T>(), "shape registered");
        id
    }

    pub fn shape_id<T: Shape>(&self) -> Option<ShapeId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    pub fn shape_name(
        &self,
        shape: ShapeId,
    ) -> &'static str {
        self.table(shape).map_or(UNKNOWN_SHAPE, |t| t.shape_name())
    }

    pub fn shape_count(&self) -> usize {
        self.tables.len()
    }

    /// Decodes and stores `raw`. A malformed value is logged and the previous
    /// entry (if any) survives.
    pub fn put(
        &self,
        shape: ShapeId,
        key: &str,
        raw: &[u8],
    ) -> Result<()> {
        let Some(table) = self.table(shape) else {
            error!(parent: &self.span, operation = "store_config", key, shape = shape.0, "shape id not from this registry");
            return Err(Error::ShapeNotRegistered { shape: UNKNOWN_SHAPE });
        };
        match table.put(key, raw) {
            Ok(()) => {
                trace!(parent: &self.span, operation = "store_config", key, "cache entry updated");
                Ok(())
            }
            Err(e) => {
                DECODE_FAILURES.with_label_values(&[table.shape_name()]).inc();
                error!(
                    parent: &self.span,
                    operation = "store_config",
                    key,
                    shape = table.shape_name(),
                    error = %e,
                    "decode failed, keeping previous entry"
                );
                Err(e)
            }
        }
    }

    /// Absent keys are a no-op
    pub fn remove(
        &self,
        shape: ShapeId,
        key: &str,
    ) -> bool {
        let Some(table) = self.table(shape) else {
            error!(parent: &self.span, operation = "remove_config", key, shape = shape.0, "shape id not from this registry");
            return false;
        };
        let removed = table.remove(key);
        trace!(parent: &self.span, operation = "remove_config", key, removed, "cache entry removed");
        removed
    }

    /// Returns a copy of the record cached under `key`.
    ///
    /// A shape that was never registered reads as a miss.
    pub fn get<T: Shape>(
        &self,
        key: &str,
    ) -> Option<T> {
        match self.try_get::<T>(key) {
            Ok(found) => found,
            Err(e) => {
                debug!(parent: &self.span, operation = "get_config", key, error = %e, "lookup miss");
                None
            }
        }
    }

    /// Like [`get`](Self::get) but reports an unregistered shape as
    /// [`Error::ShapeNotRegistered`] instead of a miss.
    pub fn try_get<T: Shape>(
        &self,
        key: &str,
    ) -> Result<Option<T>> {
        let id = self.shape_id::<T>().ok_or(Error::ShapeNotRegistered {
            shape: shape_name::<T>(),
        })?;

        let table = self
            .table(id)
            .and_then(|t| t.as_any().downcast_ref::<TypedTable<T>>())
            .ok_or(Error::ShapeNotRegistered {
                shape: shape_name::<T>(),
            })?;

        Ok(table.get(key))
    }

    /// Every cached key starting with `prefix`, across all shapes.
    /// Order is unspecified.
    pub fn list_keys(
        &self,
        prefix: &str,
    ) -> Vec<String> {
        let mut keys = Vec::new();
        for table in &self.tables {
            table.collect_keys(prefix, &mut keys);
        }
        keys
    }

    /// Total number of cached entries across all shapes
    pub fn len(&self) -> usize {
        self.tables.iter().map(|t| t.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn table(
        &self,
        shape: ShapeId,
    ) -> Option<&Arc<dyn ShapeTable>> {
        self.tables.get(shape.0)
    }
}
