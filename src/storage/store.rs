//! Domain store interface
//!
//! The persistence operations the domain handlers rely on. Each composite
//! write is atomic: either every row lands or none does.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::StoreError;
use crate::protocol::messages::DailySchedule;

pub trait DomainStore: Send {
    fn contains_rpi(&mut self, id: u64) -> Result<bool, StoreError>;
    fn contains_rpi_named(&mut self, name: &str) -> Result<bool, StoreError>;
    fn contains_peripheral(&mut self, id: u64) -> Result<bool, StoreError>;
    fn contains_peripheral_named(&mut self, name: &str) -> Result<bool, StoreError>;
    fn contains_soil_moisture_sensor(&mut self, id: u64) -> Result<bool, StoreError>;
    fn contains_irrigation_system(&mut self, id: u64) -> Result<bool, StoreError>;

    /// Returns the new RPi's id.
    fn insert_rpi(&mut self, name: &str, location: &str) -> Result<u64, StoreError>;

    /// Inserts the peripheral, its sensor row, and the optional ownership
    /// edge as one unit. Returns the peripheral id.
    fn insert_soil_moisture_sensor(
        &mut self,
        name: &str,
        rpi_id: Option<u64>,
        floor: f64,
        ceil: f64,
    ) -> Result<u64, StoreError>;

    /// Inserts the peripheral, its irrigation row, and the optional ownership
    /// edge as one unit. Returns the peripheral id.
    fn insert_irrigation_system(&mut self, name: &str, rpi_id: Option<u64>) -> Result<u64, StoreError>;

    /// Returns the measurement id.
    fn insert_soil_moisture_measurement(&mut self, sensor_id: u64, value: f64) -> Result<u64, StoreError>;

    /// Drops the peripheral's current owner and, unless `orphan` is set,
    /// assigns it to `rpi_id`.
    fn update_peripheral_ownership(
        &mut self,
        peripheral_id: u64,
        rpi_id: u64,
        orphan: bool,
    ) -> Result<(), StoreError>;

    /// Replaces the system's whole weekly schedule.
    fn replace_irrigation_schedule(
        &mut self,
        irrigation_system_id: u64,
        schedules: &[DailySchedule],
    ) -> Result<(), StoreError>;
}

/// One store shared by several handlers.
///
/// Handlers run one at a time on the event loop, so the lock is never
/// contended; it exists so the handle can be `Send`.
pub struct SharedStore<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> SharedStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, S>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl<S> Clone for SharedStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: DomainStore> DomainStore for SharedStore<S> {
    fn contains_rpi(&mut self, id: u64) -> Result<bool, StoreError> {
        self.lock()?.contains_rpi(id)
    }

    fn contains_rpi_named(&mut self, name: &str) -> Result<bool, StoreError> {
        self.lock()?.contains_rpi_named(name)
    }

    fn contains_peripheral(&mut self, id: u64) -> Result<bool, StoreError> {
        self.lock()?.contains_peripheral(id)
    }

    fn contains_peripheral_named(&mut self, name: &str) -> Result<bool, StoreError> {
        self.lock()?.contains_peripheral_named(name)
    }

    fn contains_soil_moisture_sensor(&mut self, id: u64) -> Result<bool, StoreError> {
        self.lock()?.contains_soil_moisture_sensor(id)
    }

    fn contains_irrigation_system(&mut self, id: u64) -> Result<bool, StoreError> {
        self.lock()?.contains_irrigation_system(id)
    }

    fn insert_rpi(&mut self, name: &str, location: &str) -> Result<u64, StoreError> {
        self.lock()?.insert_rpi(name, location)
    }

    fn insert_soil_moisture_sensor(
        &mut self,
        name: &str,
        rpi_id: Option<u64>,
        floor: f64,
        ceil: f64,
    ) -> Result<u64, StoreError> {
        self.lock()?.insert_soil_moisture_sensor(name, rpi_id, floor, ceil)
    }

    fn insert_irrigation_system(&mut self, name: &str, rpi_id: Option<u64>) -> Result<u64, StoreError> {
        self.lock()?.insert_irrigation_system(name, rpi_id)
    }

    fn insert_soil_moisture_measurement(&mut self, sensor_id: u64, value: f64) -> Result<u64, StoreError> {
        self.lock()?.insert_soil_moisture_measurement(sensor_id, value)
    }

    fn update_peripheral_ownership(
        &mut self,
        peripheral_id: u64,
        rpi_id: u64,
        orphan: bool,
    ) -> Result<(), StoreError> {
        self.lock()?
            .update_peripheral_ownership(peripheral_id, rpi_id, orphan)
    }

    fn replace_irrigation_schedule(
        &mut self,
        irrigation_system_id: u64,
        schedules: &[DailySchedule],
    ) -> Result<(), StoreError> {
        self.lock()?
            .replace_irrigation_schedule(irrigation_system_id, schedules)
    }
}
