//! Engine
//!
//! Single entry point combining the typed cache ([`StoreManager`]) and raw
//! watch access ([`RawWatchManager`]) over one store and one set of settings.
//! The store client stays owned by the caller; the engine only holds a
//! shared reference.

#[cfg(test)]
mod engine_test;

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use crate::BoxError;
use crate::EventKind;
use crate::PrefixWatcherHandle;
use crate::PrefixWatcherId;
use crate::RawWatch;
use crate::RawWatchManager;
use crate::RemoteStore;
use crate::Result;
use crate::Settings;
use crate::Shape;
use crate::StoreManager;
use crate::StoreManagerBuilder;
use crate::WatchEvent;
use crate::WatchStatus;

pub struct EngineBuilder {
    store: Arc<dyn RemoteStore>,
    settings: Settings,
    store_manager: StoreManagerBuilder,
}

impl EngineBuilder {
    /// Preloads `prefix` into the typed cache as `T`.
    ///
    /// # Panics
    /// If `prefix` is empty.
    pub fn register<T: Shape>(
        mut self,
        prefix: impl Into<String>,
    ) -> Self {
        self.store_manager = self.store_manager.register::<T>(prefix);
        self
    }

    pub async fn build(self) -> Engine {
        let raw = RawWatchManager::new(self.store.clone(), &self.settings);
        let typed = self.store_manager.build().await;

        let span = self.settings.log.context().module_span("engine");
        info!(parent: &span, "engine started");

        Engine { typed, raw }
    }
}

#[derive(Debug)]
pub struct Engine {
    typed: StoreManager,
    raw: RawWatchManager,
}

impl Engine {
    pub fn builder(
        store: Arc<dyn RemoteStore>,
        settings: Settings,
    ) -> EngineBuilder {
        EngineBuilder {
            store_manager: StoreManager::builder(store.clone(), settings.clone()),
            store,
            settings,
        }
    }

    // ----- raw access -----

    /// See [`RawWatchManager::watch`]
    pub async fn watch<F>(
        &self,
        key: &str,
        callback: F,
    ) -> Result<RawWatch>
    where
        F: Fn(&WatchEvent) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.raw.watch(key, callback).await
    }

    pub async fn watch_put(
        &self,
        key: &str,
        value: impl Into<Bytes>,
    ) -> Result<()> {
        self.raw.watch_put(key, value).await
    }

    pub async fn watch_delete(
        &self,
        key: &str,
    ) -> Result<()> {
        self.raw.watch_delete(key).await
    }

    pub async fn watch_get(
        &self,
        key: &str,
    ) -> Result<Bytes> {
        self.raw.watch_get(key).await
    }

    // ----- typed cache -----

    /// Reads from memory only; see [`StoreManager::get_config`]
    pub fn get_config<T: Shape>(
        &self,
        key: &str,
    ) -> Option<T> {
        self.typed.get_config(key)
    }

    pub fn try_get_config<T: Shape>(
        &self,
        key: &str,
    ) -> Result<Option<T>> {
        self.typed.try_get_config(key)
    }

    pub fn list_keys(
        &self,
        prefix: &str,
    ) -> Vec<String> {
        self.typed.list_keys(prefix)
    }

    /// Not read-your-write; see [`StoreManager::put_config`]
    pub async fn put_config<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<()> {
        self.typed.put_config(key, value).await
    }

    pub async fn delete_config(
        &self,
        key: &str,
    ) -> Result<()> {
        self.typed.delete_config(key).await
    }

    pub fn add_prefix_watcher<F>(
        &self,
        prefix: &str,
        callback: F,
    ) -> PrefixWatcherHandle
    where
        F: Fn(&str, EventKind) + Send + Sync + 'static,
    {
        self.typed.add_prefix_watcher(prefix, callback)
    }

    pub fn remove_prefix_watcher(
        &self,
        id: PrefixWatcherId,
    ) -> bool {
        self.typed.remove_prefix_watcher(id)
    }

    pub fn watch_status(
        &self,
        prefix: &str,
    ) -> Option<WatchStatus> {
        self.typed.watch_status(prefix)
    }

    pub fn subscribe_status(
        &self,
        prefix: &str,
    ) -> Option<watch::Receiver<WatchStatus>> {
        self.typed.subscribe_status(prefix)
    }

    pub fn is_healthy(&self) -> bool {
        self.typed.is_healthy()
    }

    // ----- lifecycle -----

    /// Direct access to the underlying store
    pub fn store(&self) -> Arc<dyn RemoteStore> {
        self.typed.store()
    }

    pub fn store_manager(&self) -> &StoreManager {
        &self.typed
    }

    pub fn raw_watcher(&self) -> &RawWatchManager {
        &self.raw
    }

    /// Stops every typed and raw watch loop
    pub async fn shutdown(&self) {
        self.typed.shutdown().await;
        self.raw.shutdown().await;
    }
}
