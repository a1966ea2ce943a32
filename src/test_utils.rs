//! Test utilities for parcel-consult
//!
//! Engine and fetcher doubles shared by the unit tests. Each double records
//! what it was asked to do so tests can assert on the command/lookup sequence.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::domain::{EngineCommand, ParcelRecord};
use crate::engine::{EngineError, EngineHandle, FetchError, ParcelFetcher};

/// Engine double that records every dispatched command.
#[derive(Debug, Clone, Default)]
pub struct RecordingEngine {
    commands: Arc<Mutex<Vec<EngineCommand>>>,
    failing: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later dispatch of the named command fail as unreachable.
    pub fn fail_on(&self, command: &'static str) {
        self.failing.lock().unwrap().push(command);
    }

    pub fn commands(&self) -> Vec<EngineCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn command_names(&self) -> Vec<&'static str> {
        self.commands().iter().map(EngineCommand::name).collect()
    }

    pub fn clear(&self) {
        self.commands.lock().unwrap().clear();
    }
}

#[async_trait]
impl EngineHandle for RecordingEngine {
    async fn dispatch(&self, command: EngineCommand) -> Result<(), EngineError> {
        let name = command.name();
        if self.failing.lock().unwrap().contains(&name) {
            return Err(EngineError::Unreachable {
                command: name,
                reason: "engine offline".to_string(),
            });
        }
        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}

/// Fetcher that answers immediately, optionally failing some codes a fixed number of times.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    failures: Mutex<HashMap<String, usize>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedFetcher {
    #[must_use]
    pub fn fail_times(self, code: &str, times: usize) -> Self {
        self.failures.lock().unwrap().insert(code.to_string(), times);
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl ParcelFetcher for ScriptedFetcher {
    async fn fetch(&self, parcel_code: &str) -> Result<ParcelRecord, FetchError> {
        self.calls.lock().unwrap().push(parcel_code.to_string());
        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(parcel_code) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(FetchError::NotFound { status: 404 });
            }
        }
        Ok(ParcelRecord::with_code(parcel_code))
    }
}

/// Fetcher that blocks each lookup until the test releases a permit.
#[derive(Debug)]
pub struct GatedFetcher {
    gate: Arc<Semaphore>,
}

impl GatedFetcher {
    pub fn new() -> Self {
        Self { gate: Arc::new(Semaphore::new(0)) }
    }

    pub fn gate(&self) -> Arc<Semaphore> {
        Arc::clone(&self.gate)
    }
}

#[async_trait]
impl ParcelFetcher for GatedFetcher {
    async fn fetch(&self, parcel_code: &str) -> Result<ParcelRecord, FetchError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;
        permit.forget();
        Ok(ParcelRecord::with_code(parcel_code))
    }
}
