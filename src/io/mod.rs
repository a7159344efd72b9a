//! Read/write dispatch.
//!
//! A registry of handlers keyed by the runtime combination of (Type, Format,
//! Storage, View). Resolution scans handlers in descending priority and uses
//! the first whose `matches` accepts the combination; unknown combinations
//! produce a structured `Dispatch` error naming all four components.

use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;

use crate::error::{Error, Result};
use crate::format::Format;
use crate::storage::{StorageKind, StoragePartition};
use crate::types::Type;
use crate::view::View;

mod json;

/// The in-memory value exchanged between IO handlers and Producer `build`
/// closures.
pub type Datum = serde_json::Value;

type MatchFn = fn(&Type, &Format, StorageKind, &View) -> bool;
type ReadFn = fn(&Type, &Format, &[StoragePartition], &View) -> Result<Datum>;
type WriteFn = fn(&Datum, &Type, &Format, &StoragePartition, &View) -> Result<StoragePartition>;

#[derive(Debug)]
pub struct ReadHandler {
    pub key: &'static str,
    pub priority: i32,
    pub matches: MatchFn,
    pub read: ReadFn,
}

pub struct WriteHandler {
    pub key: &'static str,
    pub priority: i32,
    pub matches: MatchFn,
    pub write: WriteFn,
}

/// Append-only handler registry.
pub struct Registry {
    readers: RwLock<Vec<Arc<ReadHandler>>>,
    writers: RwLock<Vec<Arc<WriteHandler>>>,
}

impl Registry {
    fn with_builtins() -> Registry {
        let registry = Registry {
            readers: RwLock::new(Vec::new()),
            writers: RwLock::new(Vec::new()),
        };
        json::register(&registry);
        registry
    }

    pub fn register_reader(&self, handler: ReadHandler) {
        self.readers.write().expect("io registry poisoned").push(Arc::new(handler));
    }

    pub fn register_writer(&self, handler: WriteHandler) {
        self.writers.write().expect("io registry poisoned").push(Arc::new(handler));
    }

    pub fn lookup_read(
        &self,
        type_: &Type,
        format: &Format,
        storage: StorageKind,
        view: &View,
    ) -> Result<Arc<ReadHandler>> {
        let readers = self.readers.read().expect("io registry poisoned");
        let mut candidates: Vec<&Arc<ReadHandler>> = readers.iter().collect();
        candidates.sort_by_key(|handler| -handler.priority);
        candidates
            .into_iter()
            .find(|handler| (handler.matches)(type_, format, storage, view))
            .cloned()
            .ok_or_else(|| dispatch_error("read", type_, format, storage, view))
    }

    pub fn lookup_write(
        &self,
        type_: &Type,
        format: &Format,
        storage: StorageKind,
        view: &View,
    ) -> Result<Arc<WriteHandler>> {
        let writers = self.writers.read().expect("io registry poisoned");
        let mut candidates: Vec<&Arc<WriteHandler>> = writers.iter().collect();
        candidates.sort_by_key(|handler| -handler.priority);
        candidates
            .into_iter()
            .find(|handler| (handler.matches)(type_, format, storage, view))
            .cloned()
            .ok_or_else(|| dispatch_error("write", type_, format, storage, view))
    }

    /// Read the partitions into the view's in-memory representation.
    pub fn read(
        &self,
        type_: &Type,
        format: &Format,
        partitions: &[StoragePartition],
        view: &View,
    ) -> Result<Datum> {
        let first = partitions
            .first()
            .ok_or_else(|| Error::MissingData("Read expected at least one partition".to_string()))?;
        let kind = first.kind();
        if partitions.iter().any(|partition| partition.kind() != kind) {
            return Err(Error::Storage(
                "All partitions in one read must share a storage driver".to_string(),
            ));
        }
        let handler = self.lookup_read(type_, format, kind, view)?;
        (handler.read)(type_, format, partitions, view)
    }

    /// Write the value into the partition's location, returning the
    /// partition updated with its content fingerprint.
    pub fn write(
        &self,
        data: &Datum,
        type_: &Type,
        format: &Format,
        partition: &StoragePartition,
        view: &View,
    ) -> Result<StoragePartition> {
        let handler = self.lookup_write(type_, format, partition.kind(), view)?;
        (handler.write)(data, type_, format, partition, view)
    }
}

fn dispatch_error(
    operation: &'static str,
    type_: &Type,
    format: &Format,
    storage: StorageKind,
    view: &View,
) -> Error {
    Error::Dispatch {
        operation,
        type_: type_.to_string(),
        format: format.to_string(),
        storage: format!("{:?}", storage),
        view: view.to_string(),
    }
}

lazy_static! {
    static ref REGISTRY: Registry = Registry::with_builtins();
}

pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Dispatch a read through the global registry.
pub fn read(
    type_: &Type,
    format: &Format,
    partitions: &[StoragePartition],
    view: &View,
) -> Result<Datum> {
    registry().read(type_, format, partitions, view)
}

/// Dispatch a write through the global registry.
pub fn write(
    data: &Datum,
    type_: &Type,
    format: &Format,
    partition: &StoragePartition,
    view: &View,
) -> Result<StoragePartition> {
    registry().write(data, type_, format, partition, view)
}
