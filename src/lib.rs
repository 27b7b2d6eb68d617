/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/
#![cfg_attr(not(test), no_std)]

//! Exposure and frame-timing control core for register-programmed image sensors
//! The sensor-specific parts are all data, supplied as a [`SensorConfig`]:
//! - a gain table mapping hardware gain codes to achievable gain
//! - register layouts for shutter, gain and frame length (VTS)
//! - gain brackets: auxiliary analog tuning writes tied to gain ranges
//! - init / stream on / stream off register programs
//! This driver computes what to write and plays it over a [`RegisterBus`].
//! Chip detection, power sequencing and clock setup are left to the caller.

#[cfg(feature = "rttdebug")]
use panic_rtt_core::rprintln;

use embedded_hal::blocking::delay::DelayMs;

pub mod bus;
pub mod config;
pub mod exposure;
pub mod gain;
pub mod program;
pub mod timing;

#[cfg(test)]
pub mod mock;

pub use bus::{I2cBus, RegisterBus};
pub use config::SensorConfig;
pub use exposure::{
    BracketOrder, ExposureCoordinator, ExposureLayout, ExposureRequest,
    ExposureResult, GainBracket, GroupHold, RegisterField,
};
pub use gain::{GainBreakpoint, GainTable, Quantized};
pub use program::{run_program, Executor, ProgramState, RegisterOp, RegisterProgram};
pub use timing::{Fps, TimingController, TimingLimits, TimingParameters};

use exposure::push_fields;
use program::PROGRAM_CAPACITY;

/// Failures of the pure exposure / timing computations.
/// These are always detected before anything is written to the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// Requested frame rate (or resulting frame length) is outside the
    /// device envelope
    OutOfRange,
    /// Gain or bracket table is empty, unordered, or misses its ceiling
    MalformedTable,
    /// Program would not fit in a [`RegisterProgram`]
    ProgramOverflow,
}

/// Errors in this crate
#[derive(Debug)]
pub enum Error<CommE> {
    /// Sensor communication error
    Comm(CommE),
    /// Frame rate or default timing outside the device envelope
    OutOfRange,
    /// Gain or bracket table failed validation
    MalformedTable,
    /// Configured register layout does not fit in a [`RegisterProgram`]
    ProgramOverflow,
    /// A program selected a register bank but the device has no page register
    NoPageRegister,
}

impl<CommE> From<ControlError> for Error<CommE> {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::OutOfRange => Error::OutOfRange,
            ControlError::MalformedTable => Error::MalformedTable,
            ControlError::ProgramOverflow => Error::ProgramOverflow,
        }
    }
}

/// Typed replacement for the ioctl-style control entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetExposure(ExposureRequest),
    SetIntegrationTime(u32),
    SetAnalogGain(u32),
    SetFps(Fps),
    QuantizeGain(u32),
    GetTiming,
    SetStreaming(bool),
    ReadRegister(u16),
    WriteRegister { addr: u16, value: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Done,
    Exposure(ExposureResult),
    /// Shutter lines programmed after clamping
    IntegrationLines(u32),
    Gain(Quantized),
    Timing(TimingParameters),
    Register(u8),
}

/// Per-device driver state
pub struct Sensor<B> {
    bus: B,
    config: &'static SensorConfig,
    gain_table: GainTable<'static>,
    timing_ctl: TimingController,
    timing: TimingParameters,
    coordinator: ExposureCoordinator,
    last_exposure: Option<ExposureResult>,
    streaming: bool,
}

impl<B, CommE> Sensor<B>
where
    B: RegisterBus<Error = CommE>,
{
    /// Validate `config` and take ownership of the bus.
    /// Nothing is written to the sensor until [`Sensor::init`].
    pub fn new(bus: B, config: &'static SensorConfig) -> Result<Self, Error<CommE>> {
        let gain_table = if config.ceiling_truncate {
            GainTable::with_ceiling(config.gain_table, config.max_gain)?
        } else {
            GainTable::new(config.gain_table, config.max_gain)?
        };
        let coordinator = ExposureCoordinator::new(config.exposure)?;
        if coordinator.worst_case_len() > PROGRAM_CAPACITY
            || config.vts.len() + 1 > PROGRAM_CAPACITY
        {
            return Err(Error::ProgramOverflow);
        }

        let timing = config.default_timing();
        let limits = &config.timing;
        if timing.total_width == 0
            || limits.min_fps > limits.max_fps
            || timing.total_height > limits.max_vts
            || timing.max_integration_native_lines < timing.min_integration_lines
        {
            return Err(Error::OutOfRange);
        }

        Ok(Self {
            bus,
            config,
            gain_table,
            timing_ctl: TimingController::new(config.timing),
            timing,
            coordinator,
            last_exposure: None,
            streaming: false,
        })
    }

    pub fn config(&self) -> &'static SensorConfig {
        self.config
    }

    pub fn gain_table(&self) -> &GainTable<'static> {
        &self.gain_table
    }

    pub fn timing(&self) -> &TimingParameters {
        &self.timing
    }

    /// Most recently applied exposure, if any since the last init
    pub fn last_exposure(&self) -> Option<ExposureResult> {
        self.last_exposure
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Give back the bus
    pub fn release(self) -> B {
        self.bus
    }

    fn run(
        &mut self,
        ops: &[RegisterOp],
        delay: &mut impl DelayMs<u32>,
    ) -> Result<usize, Error<CommE>> {
        run_program(&mut self.bus, delay, ops, self.config.page_register)
    }

    /// Load the init program; sensor state returns to the default mode
    pub fn init(&mut self, delay: &mut impl DelayMs<u32>) -> Result<(), Error<CommE>> {
        #[cfg(feature = "rttdebug")]
        rprintln!("sensor init start");

        // whatever was latched before is gone once init starts writing
        self.coordinator.invalidate();
        self.last_exposure = None;
        self.streaming = false;
        self.run(self.config.init, delay)?;
        self.timing = self.config.default_timing();

        #[cfg(feature = "rttdebug")]
        rprintln!("sensor init done");
        Ok(())
    }

    pub fn set_streaming(
        &mut self,
        on: bool,
        delay: &mut impl DelayMs<u32>,
    ) -> Result<(), Error<CommE>> {
        let ops = if on {
            self.config.stream_on
        } else {
            self.config.stream_off
        };
        self.run(ops, delay)?;
        self.streaming = on;
        Ok(())
    }

    pub fn quantize_gain(&self, gain: u32) -> Result<Quantized, ControlError> {
        self.gain_table.quantize(gain)
    }

    /// Program shutter and analog gain together
    pub fn set_exposure(
        &mut self,
        request: ExposureRequest,
        delay: &mut impl DelayMs<u32>,
    ) -> Result<ExposureResult, Error<CommE>> {
        let update = self.coordinator.set_exposure(
            request.integration_lines,
            request.analog_gain,
            &self.gain_table,
            &self.timing,
        )?;
        self.run(update.program.as_slice(), delay)?;
        self.coordinator.commit(update.result.bracket);
        self.last_exposure = Some(update.result);
        Ok(update.result)
    }

    /// Program the shutter only; returns the line count actually written
    pub fn set_integration_time(
        &mut self,
        lines: u32,
        delay: &mut impl DelayMs<u32>,
    ) -> Result<u32, Error<CommE>> {
        let (program, lines) = self.coordinator.shutter_update(lines, &self.timing)?;
        self.run(program.as_slice(), delay)?;
        if let Some(last) = self.last_exposure.as_mut() {
            last.integration_lines = lines;
        }
        Ok(lines)
    }

    /// Program the analog gain only
    pub fn set_analog_gain(
        &mut self,
        gain: u32,
        delay: &mut impl DelayMs<u32>,
    ) -> Result<Quantized, Error<CommE>> {
        let (program, update) = self.coordinator.gain_update(gain, &self.gain_table)?;
        self.run(program.as_slice(), delay)?;
        self.coordinator.commit(update.bracket);
        if let Some(last) = self.last_exposure.as_mut() {
            last.gain_code = update.quantized.code;
            last.achieved_gain = update.quantized.gain;
            last.bracket = update.bracket;
        }
        Ok(update.quantized)
    }

    /// Retarget the frame rate by rewriting the frame length.
    ///
    /// The shutter is not touched here: a line count beyond the new
    /// integration limit gets clamped by the next exposure update.
    /// Callers should stop streaming around this when tearing matters.
    pub fn set_fps(
        &mut self,
        fps: Fps,
        delay: &mut impl DelayMs<u32>,
    ) -> Result<(), Error<CommE>> {
        let mut next = self.timing;
        self.timing_ctl.recompute_fps(fps.num(), fps.den(), &mut next)?;

        let mut program = RegisterProgram::new();
        push_fields(&mut program, self.config.vts, next.total_height)?;
        program.push(RegisterOp::End)?;
        self.run(program.as_slice(), delay)?;

        self.timing = next;
        Ok(())
    }

    pub fn read_register(&mut self, addr: u16) -> Result<u8, Error<CommE>> {
        self.bus.read_reg(addr).map_err(Error::Comm)
    }

    pub fn write_register(&mut self, addr: u16, value: u8) -> Result<(), Error<CommE>> {
        self.bus.write_reg(addr, value).map_err(Error::Comm)
    }

    pub fn dispatch(
        &mut self,
        cmd: Command,
        delay: &mut impl DelayMs<u32>,
    ) -> Result<Response, Error<CommE>> {
        let resp = match cmd {
            Command::SetExposure(req) => Response::Exposure(self.set_exposure(req, delay)?),
            Command::SetIntegrationTime(lines) => {
                Response::IntegrationLines(self.set_integration_time(lines, delay)?)
            }
            Command::SetAnalogGain(gain) => Response::Gain(self.set_analog_gain(gain, delay)?),
            Command::SetFps(fps) => {
                self.set_fps(fps, delay)?;
                Response::Timing(self.timing)
            }
            Command::QuantizeGain(gain) => Response::Gain(self.quantize_gain(gain)?),
            Command::GetTiming => Response::Timing(self.timing),
            Command::SetStreaming(on) => {
                self.set_streaming(on, delay)?;
                Response::Done
            }
            Command::ReadRegister(addr) => Response::Register(self.read_register(addr)?),
            Command::WriteRegister { addr, value } => {
                self.write_register(addr, value)?;
                Response::Done
            }
        };
        Ok(resp)
    }
}
