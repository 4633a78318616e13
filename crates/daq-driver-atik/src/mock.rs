//! In-process stand-in for the Atik SDK.
//!
//! Wheels are declared up front with [`MockWheel`]. A move completes after
//! `settle_polls` position queries, and a wheel only shows up after
//! `present_after` presence checks, so the driver's polling loops can be
//! exercised without hardware. `fail_next` scripts a non-zero status for the
//! next call of a given SDK function.

use crate::error::EfwError;
use crate::sdk::{EfwDetails, EfwHandle, EfwSdk};
use crate::status::{check_status, ArtemisStatus, EfwType};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Declaration of one simulated wheel.
#[derive(Debug, Clone)]
pub struct MockWheel {
    /// Device index on the bus
    pub index: i32,
    /// Reported wheel generation
    pub efw_type: EfwType,
    /// Reported serial number
    pub serial_number: u32,
    /// Number of filter slots
    pub slots: i32,
    /// Slot at start-up
    pub position: i32,
    /// Presence checks answered `false` before the wheel appears
    pub present_after: u32,
    /// Position queries answered "moving" after each move
    pub settle_polls: u32,
}

impl MockWheel {
    /// Five-slot EFW2 at `index` that settles after two polls.
    pub fn new(index: i32, serial_number: u32) -> Self {
        Self {
            index,
            efw_type: EfwType::Efw2,
            serial_number,
            slots: 5,
            position: 0,
            present_after: 0,
            settle_polls: 2,
        }
    }

    /// Set the slot count
    pub fn with_slots(mut self, slots: i32) -> Self {
        self.slots = slots;
        self
    }

    /// Set the start-up slot
    pub fn with_position(mut self, position: i32) -> Self {
        self.position = position;
        self
    }

    /// Delay presence by `checks` calls
    pub fn with_present_after(mut self, checks: u32) -> Self {
        self.present_after = checks;
        self
    }

    /// Moves take `polls` position queries to finish
    pub fn with_settle_polls(mut self, polls: u32) -> Self {
        self.settle_polls = polls;
        self
    }

    /// Report a different wheel generation
    pub fn with_type(mut self, efw_type: EfwType) -> Self {
        self.efw_type = efw_type;
        self
    }
}

#[derive(Debug)]
struct WheelState {
    setup: MockWheel,
    presence_checks: u32,
    connected: bool,
    target: Option<i32>,
    polls_remaining: u32,
}

impl WheelState {
    fn present(&self) -> bool {
        self.presence_checks >= self.setup.present_after
    }
}

#[derive(Debug, Default)]
struct MockState {
    wheels: Vec<WheelState>,
    device_count: i32,
    failures: HashMap<&'static str, i32>,
    moves: Vec<(i32, i32)>,
    presence_checks: u32,
}

/// Simulated [`EfwSdk`].
#[derive(Debug, Default)]
pub struct MockEfwSdk {
    state: Mutex<MockState>,
}

impl MockEfwSdk {
    /// SDK with no wheels attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// SDK with a single default wheel at index 0.
    pub fn single(slots: i32) -> Self {
        Self::new().with_wheel(MockWheel::new(0, 1_210_320).with_slots(slots))
    }

    /// Attach a wheel.
    pub fn with_wheel(self, wheel: MockWheel) -> Self {
        self.state().wheels.push(WheelState {
            setup: wheel,
            presence_checks: 0,
            connected: false,
            target: None,
            polls_remaining: 0,
        });
        self
    }

    /// Value reported by `ArtemisDeviceCount` (zero unless set, as the real
    /// SDK reports with only a filter wheel attached).
    pub fn with_device_count(self, count: i32) -> Self {
        self.state().device_count = count;
        self
    }

    /// Make the next call of `op` return `code`.
    pub fn fail_next(&self, op: &'static str, code: i32) {
        self.state().failures.insert(op, code);
    }

    /// Every accepted `(index, position)` move, in order.
    pub fn moves(&self) -> Vec<(i32, i32)> {
        self.state().moves.clone()
    }

    /// Total `ArtemisEFWIsPresent` calls.
    pub fn presence_checks(&self) -> u32 {
        self.state().presence_checks
    }

    /// Whether the wheel at `index` holds an open connection.
    pub fn wheel_connected(&self, index: i32) -> bool {
        self.state()
            .wheels
            .iter()
            .any(|w| w.setup.index == index && w.connected)
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MockState {
    fn scripted(&mut self, op: &'static str) -> Result<(), EfwError> {
        match self.failures.remove(op) {
            Some(code) => check_status(op, code),
            None => Ok(()),
        }
    }

    fn by_index(&mut self, index: i32) -> Option<&mut WheelState> {
        self.wheels.iter_mut().find(|w| w.setup.index == index)
    }

    fn by_handle(
        &mut self,
        op: &'static str,
        handle: EfwHandle,
    ) -> Result<&mut WheelState, EfwError> {
        let index = i32::try_from(handle.as_raw() - 1).unwrap_or(-1);
        match self.wheels.iter_mut().find(|w| w.setup.index == index) {
            Some(wheel) if wheel.connected => Ok(wheel),
            _ => Err(EfwError::Status {
                op,
                status: ArtemisStatus::NotConnected,
            }),
        }
    }
}

fn handle_for(index: i32) -> Option<EfwHandle> {
    EfwHandle::from_raw(usize::try_from(index).ok()? + 1)
}

fn details_of(wheel: &WheelState) -> EfwDetails {
    EfwDetails {
        efw_type: wheel.setup.efw_type,
        serial_number: wheel.setup.serial_number,
    }
}

impl EfwSdk for MockEfwSdk {
    fn refresh_devices_count(&self) -> i32 {
        self.state().device_count
    }

    fn device_count(&self) -> i32 {
        self.state().device_count
    }

    fn is_present(&self, index: i32) -> bool {
        let mut state = self.state();
        state.presence_checks += 1;
        match state.by_index(index) {
            Some(wheel) if wheel.present() => true,
            Some(wheel) => {
                wheel.presence_checks += 1;
                false
            }
            None => false,
        }
    }

    fn connect(&self, index: i32) -> Option<EfwHandle> {
        let mut state = self.state();
        if state.failures.remove("ArtemisEFWConnect").is_some() {
            return None;
        }
        let wheel = state.by_index(index)?;
        if !wheel.present() {
            return None;
        }
        wheel.connected = true;
        handle_for(index)
    }

    fn disconnect(&self, handle: EfwHandle) -> Result<(), EfwError> {
        let mut state = self.state();
        state.scripted("ArtemisEFWDisconnect")?;
        let wheel = state.by_handle("ArtemisEFWDisconnect", handle)?;
        wheel.connected = false;
        Ok(())
    }

    fn is_connected(&self, handle: EfwHandle) -> bool {
        self.state()
            .by_handle("ArtemisEFWIsConnected", handle)
            .is_ok()
    }

    fn details(&self, handle: EfwHandle) -> Result<EfwDetails, EfwError> {
        let mut state = self.state();
        state.scripted("ArtemisEFWGetDetails")?;
        state
            .by_handle("ArtemisEFWGetDetails", handle)
            .map(|w| details_of(w))
    }

    fn device_details(&self, index: i32) -> Result<EfwDetails, EfwError> {
        let mut state = self.state();
        state.scripted("ArtemisEFWGetDeviceDetails")?;
        match state.by_index(index) {
            Some(wheel) if wheel.present() => Ok(details_of(wheel)),
            _ => Err(EfwError::Status {
                op: "ArtemisEFWGetDeviceDetails",
                status: ArtemisStatus::InvalidParameter,
            }),
        }
    }

    fn position_count(&self, handle: EfwHandle) -> Result<i32, EfwError> {
        let mut state = self.state();
        state.scripted("ArtemisEFWNmrPosition")?;
        state
            .by_handle("ArtemisEFWNmrPosition", handle)
            .map(|w| w.setup.slots)
    }

    fn set_position(&self, handle: EfwHandle, position: i32) -> Result<(), EfwError> {
        let mut state = self.state();
        state.scripted("ArtemisEFWSetPosition")?;
        let wheel = state.by_handle("ArtemisEFWSetPosition", handle)?;
        if position < 0 || position >= wheel.setup.slots {
            return Err(EfwError::Status {
                op: "ArtemisEFWSetPosition",
                status: ArtemisStatus::InvalidParameter,
            });
        }
        let index = wheel.setup.index;
        if wheel.setup.settle_polls == 0 {
            wheel.setup.position = position;
        } else {
            wheel.target = Some(position);
            wheel.polls_remaining = wheel.setup.settle_polls;
        }
        state.moves.push((index, position));
        Ok(())
    }

    fn position(&self, handle: EfwHandle) -> Result<(i32, bool), EfwError> {
        let mut state = self.state();
        state.scripted("ArtemisEFWGetPosition")?;
        let wheel = state.by_handle("ArtemisEFWGetPosition", handle)?;
        if let Some(target) = wheel.target {
            if wheel.polls_remaining > 0 {
                wheel.polls_remaining -= 1;
                return Ok((wheel.setup.position, true));
            }
            wheel.setup.position = target;
            wheel.target = None;
        }
        Ok((wheel.setup.position, false))
    }
}
