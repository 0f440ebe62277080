use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{BusStats, Command, CommandBus};
use crate::{MaestroError, Result};

/// Thread-safe handle over a [`CommandBus`].
///
/// Producers running on other threads (audio analysis, beat detection)
/// enqueue through a clone of this handle while the frame loop drains the
/// same bus.
#[derive(Clone)]
pub struct SharedCommandBus {
    shared: Arc<Mutex<CommandBus>>,
}

impl SharedCommandBus {
    pub fn new(bus: CommandBus) -> Self {
        Self {
            shared: Arc::new(Mutex::new(bus)),
        }
    }

    pub fn enqueue(&self, command: Command, priority: Option<i32>) -> Result<bool> {
        let mut bus = self.lock()?;
        Ok(bus.enqueue(command, priority))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    pub fn stats(&self) -> Result<BusStats> {
        Ok(self.lock()?.stats())
    }

    pub fn clear(&self) -> Result<usize> {
        Ok(self.lock()?.clear())
    }

    /// Runs `f` with exclusive access to the bus.
    pub fn with<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut CommandBus) -> R,
    {
        let mut bus = self.lock()?;
        Ok(f(&mut bus))
    }

    /// Locks the bus for the frame loop. The bus never panics part-way
    /// through an operation, so a poisoned lock still guards consistent data
    /// and the render loop keeps going.
    pub(crate) fn lock_for_frame(&self) -> MutexGuard<'_, CommandBus> {
        self.shared.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("command bus lock poisoned, recovering for frame loop");
            PoisonError::into_inner(poisoned)
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, CommandBus>> {
        self.shared
            .lock()
            .map_err(|_| MaestroError::Poisoned("command bus"))
    }
}

impl std::fmt::Debug for SharedCommandBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCommandBus").finish()
    }
}
