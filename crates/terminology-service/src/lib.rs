//! # terminology-service
//!
//! Hosts a [`TerminologyEngine`] for `$expand` and `$validate-code` and runs
//! deferred pre-expansion on a background tokio task.
//!
//! The transport layer is left to the embedding application: handlers call
//! [`TerminologyServer::expand`] and [`TerminologyServer::validate_code`],
//! which return HTTP-style
//! [`OperationError`](terminology_engine::OperationError)s on failure.

#![warn(missing_docs)]

pub mod config;
pub mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use terminology_engine::operations::{self, ExpandRequest, ValidateCodeRequest};
use terminology_engine::{OperationResult, TerminologyEngine};
use terminology_types::{
    CodeSystemDefinition, ExpansionResult, ValidationResult, ValueSetDefinition,
};
use tokio::sync::Notify;

pub use config::ServiceConfig;
pub use worker::run_pre_expansion_worker;

/// Shared handle to the engine and the pre-expansion worker.
#[derive(Clone)]
pub struct TerminologyServer {
    engine: Arc<TerminologyEngine>,
    wake: Arc<Notify>,
    shutdown: Arc<AtomicBool>,
}

impl TerminologyServer {
    /// Creates a new server around the given engine.
    pub fn new(engine: TerminologyEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            wake: Arc::new(Notify::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a reference to the engine.
    pub fn engine(&self) -> &TerminologyEngine {
        &self.engine
    }

    /// Runs `$expand`.
    pub fn expand(&self, request: &ExpandRequest) -> OperationResult<ExpansionResult> {
        let result = operations::expand(&self.engine, request);
        self.wake_if_deferred();
        result
    }

    /// Runs `$validate-code`.
    pub fn validate_code(&self, request: &ValidateCodeRequest) -> OperationResult<ValidationResult> {
        let result = operations::validate_code(&self.engine, request);
        self.wake_if_deferred();
        result
    }

    /// Stores a ValueSet resource and wakes the worker.
    pub fn store_value_set(&self, value_set: ValueSetDefinition) -> OperationResult<String> {
        let id = self.engine.store_value_set(value_set)?;
        self.wake_if_deferred();
        Ok(id)
    }

    /// Stores a CodeSystem resource and wakes the worker.
    pub fn store_code_system(&self, code_system: CodeSystemDefinition) -> OperationResult<String> {
        let id = self.engine.store_code_system(code_system)?;
        self.wake_if_deferred();
        Ok(id)
    }

    /// Wakes the worker if value sets are waiting for pre-expansion.
    pub fn wake_if_deferred(&self) {
        if self.engine.materializer().queued() > 0 {
            self.wake.notify_one();
        }
    }

    /// Asks the worker to stop after the value set it is materializing.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Returns true once [`shutdown`](Self::shutdown) was called.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub(crate) fn engine_handle(&self) -> Arc<TerminologyEngine> {
        Arc::clone(&self.engine)
    }

    pub(crate) fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub(crate) fn wake_signal(&self) -> &Notify {
        &self.wake
    }
}

impl std::fmt::Debug for TerminologyServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminologyServer")
            .field("code_systems", &self.engine.registry().len())
            .field("deferred", &self.engine.materializer().queued())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}
