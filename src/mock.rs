//! Recording bus and delay for testing without hardware.

use std::collections::BTreeMap;

use embedded_hal::blocking::delay::DelayMs;

use crate::bus::RegisterBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockBusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    Read(u16),
    Write(u16, u8),
}

/// Register file that records every successful access
#[derive(Debug, Default)]
pub struct MockBus {
    regs: BTreeMap<u16, u8>,
    events: Vec<BusEvent>,
    attempted_writes: usize,
    fail_on_write: Option<usize>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the write with this zero-based index fail
    pub fn fail_on_write(mut self, index: usize) -> Self {
        self.fail_on_write = Some(index);
        self
    }

    pub fn events(&self) -> &[BusEvent] {
        &self.events
    }

    pub fn writes(&self) -> Vec<(u16, u8)> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                BusEvent::Write(a, v) => Some((a, v)),
                BusEvent::Read(_) => None,
            })
            .collect()
    }

    pub fn attempted_writes(&self) -> usize {
        self.attempted_writes
    }
}

impl RegisterBus for MockBus {
    type Error = MockBusError;

    fn read_reg(&mut self, addr: u16) -> Result<u8, MockBusError> {
        self.events.push(BusEvent::Read(addr));
        Ok(self.regs.get(&addr).copied().unwrap_or(0))
    }

    fn write_reg(&mut self, addr: u16, value: u8) -> Result<(), MockBusError> {
        let index = self.attempted_writes;
        self.attempted_writes += 1;
        if self.fail_on_write == Some(index) {
            return Err(MockBusError);
        }
        self.regs.insert(addr, value);
        self.events.push(BusEvent::Write(addr, value));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MockDelay {
    pub total_ms: u32,
}

impl DelayMs<u32> for MockDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.total_ms += ms;
    }
}
