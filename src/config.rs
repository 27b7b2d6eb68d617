/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Static per-device description, normally declared as a `static`
//! next to the sensor's register tables.

use crate::exposure::{ExposureLayout, RegisterField};
use crate::gain::GainBreakpoint;
use crate::program::RegisterOp;
use crate::timing::{TimingLimits, TimingParameters};

#[derive(Debug, Clone, Copy)]
pub struct SensorConfig {
    /// Pixel clock in Hz
    pub pixel_clock: u64,
    /// Line length of the default mode (HTS)
    pub default_hts: u32,
    /// Frame length of the default mode (VTS)
    pub default_vts: u32,
    pub min_integration_lines: u32,
    pub timing: TimingLimits,

    pub gain_table: &'static [GainBreakpoint],
    pub max_gain: u32,
    /// Ignore table entries past `max_gain` instead of rejecting them
    pub ceiling_truncate: bool,

    pub exposure: ExposureLayout,
    /// Frame length registers, written on frame rate changes
    pub vts: &'static [RegisterField],

    /// Receives the bank number on `RegisterOp::BankSelect`
    pub page_register: Option<u16>,

    pub init: &'static [RegisterOp],
    pub stream_on: &'static [RegisterOp],
    pub stream_off: &'static [RegisterOp],
}

impl SensorConfig {
    /// Timing state of the default mode
    pub fn default_timing(&self) -> TimingParameters {
        TimingParameters {
            pixel_clock: self.pixel_clock,
            total_width: self.default_hts,
            total_height: self.default_vts,
            min_integration_lines: self.min_integration_lines,
            max_integration_native_lines: self
                .default_vts
                .saturating_sub(self.timing.integration_margin),
        }
    }
}
