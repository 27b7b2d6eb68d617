/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Analog gain lookup: maps a requested gain onto the steps the sensor
//! can actually produce.
//!
//! Gain values are fixed-point and opaque to this module; vendor tables
//! usually carry the ISP's log2 gain scaled by 2^16, but any
//! monotonically increasing unit works.

use crate::ControlError;

/// One achievable gain step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GainBreakpoint {
    /// Register encoding written to the sensor
    pub code: u32,
    /// Gain produced by `code`
    pub gain: u32,
}

impl GainBreakpoint {
    pub const fn new(code: u32, gain: u32) -> Self {
        Self { code, gain }
    }
}

/// The gain actually selected for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantized {
    pub code: u32,
    pub gain: u32,
}

impl From<GainBreakpoint> for Quantized {
    fn from(bp: GainBreakpoint) -> Self {
        Self {
            code: bp.code,
            gain: bp.gain,
        }
    }
}

/// Validated, immutable gain table
#[derive(Debug, Clone, Copy)]
pub struct GainTable<'a> {
    entries: &'a [GainBreakpoint],
    max_gain: u32,
}

impl<'a> GainTable<'a> {
    /// Entries must be ascending by code, non-decreasing by gain,
    /// and the last entry must reach exactly `max_gain`.
    pub fn new(
        entries: &'a [GainBreakpoint],
        max_gain: u32,
    ) -> Result<Self, ControlError> {
        let last = entries.last().ok_or(ControlError::MalformedTable)?;
        if last.gain != max_gain {
            return Err(ControlError::MalformedTable);
        }
        let ordered = entries
            .windows(2)
            .all(|w| w[0].code < w[1].code && w[0].gain <= w[1].gain);
        if !ordered {
            return Err(ControlError::MalformedTable);
        }
        Ok(Self { entries, max_gain })
    }

    /// Accept a vendor table that keeps going past the device ceiling:
    /// everything after the last entry at or below `max_gain` is ignored.
    pub fn with_ceiling(
        entries: &'a [GainBreakpoint],
        max_gain: u32,
    ) -> Result<Self, ControlError> {
        let len = entries
            .iter()
            .position(|bp| bp.gain > max_gain)
            .unwrap_or(entries.len());
        Self::new(&entries[..len], max_gain)
    }

    pub fn max_gain(&self) -> u32 {
        self.max_gain
    }

    pub fn entries(&self) -> &'a [GainBreakpoint] {
        self.entries
    }

    /// Round `requested` down to the nearest achievable step, saturating
    /// at `max_gain`. Requests below the first step snap to the first step.
    pub fn quantize(&self, requested: u32) -> Result<Quantized, ControlError> {
        let first = *self.entries.first().ok_or(ControlError::MalformedTable)?;
        if requested == 0 {
            return Ok(first.into());
        }

        for (idx, bp) in self.entries.iter().enumerate() {
            if requested < bp.gain {
                let prev = match idx.checked_sub(1) {
                    Some(p) => self.entries[p],
                    None => first,
                };
                return Ok(prev.into());
            }
            if bp.gain == self.max_gain {
                return Ok((*bp).into());
            }
        }

        // only reachable if the ceiling entry went missing
        Err(ControlError::MalformedTable)
    }
}
