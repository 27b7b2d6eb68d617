/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Turns shutter / gain requests into a single register program.

use crate::gain::{GainTable, Quantized};
use crate::program::{RegisterOp, RegisterProgram};
use crate::timing::TimingParameters;
use crate::ControlError;

#[cfg(feature = "rttdebug")]
use panic_rtt_core::rprintln;

/// One register byte carved out of a wider value:
/// `(((value >> rshift) & mask) << lshift) as u8`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterField {
    pub addr: u16,
    pub rshift: u8,
    pub mask: u8,
    pub lshift: u8,
}

impl RegisterField {
    pub const fn bits(addr: u16, rshift: u8, mask: u8) -> Self {
        Self {
            addr,
            rshift,
            mask,
            lshift: 0,
        }
    }

    pub const fn shifted_left(self, lshift: u8) -> Self {
        Self { lshift, ..self }
    }

    pub fn extract(&self, value: u32) -> u8 {
        let v = (value >> self.rshift) & self.mask as u32;
        (v << self.lshift) as u8
    }
}

pub(crate) fn push_fields(
    program: &mut RegisterProgram,
    fields: &[RegisterField],
    value: u32,
) -> Result<(), ControlError> {
    for field in fields {
        program.push(RegisterOp::write(field.addr, field.extract(value)))?;
    }
    Ok(())
}

/// Auxiliary writes required while the achieved gain lies in
/// `min_gain..=max_gain`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GainBracket {
    pub min_gain: u32,
    pub max_gain: u32,
    pub writes: &'static [(u16, u8)],
}

impl GainBracket {
    pub fn contains(&self, gain: u32) -> bool {
        self.min_gain <= gain && gain <= self.max_gain
    }
}

/// Where bracket writes land relative to the gain code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BracketOrder {
    BeforeGain,
    AfterGain,
}

/// Latch programs wrapped around a combined shutter + gain update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupHold {
    pub enter: &'static [RegisterOp],
    pub leave: &'static [RegisterOp],
}

/// Register layout of the exposure controls
#[derive(Debug, Clone, Copy)]
pub struct ExposureLayout {
    pub shutter: &'static [RegisterField],
    pub gain: &'static [RegisterField],
    pub brackets: &'static [GainBracket],
    pub bracket_order: BracketOrder,
    pub group_hold: Option<GroupHold>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExposureRequest {
    pub integration_lines: u32,
    pub analog_gain: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExposureResult {
    /// Shutter lines actually programmed, after clamping
    pub integration_lines: u32,
    pub gain_code: u32,
    pub achieved_gain: u32,
    /// Index of the gain bracket the achieved gain falls in
    pub bracket: Option<usize>,
}

/// A program plus what it will apply once executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposureUpdate {
    pub program: RegisterProgram,
    pub result: ExposureResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GainUpdate {
    pub quantized: Quantized,
    pub bracket: Option<usize>,
}

/// Builds exposure programs and remembers which gain bracket the sensor
/// was last left in, so bracket writes go out only on a change.
#[derive(Debug, Clone)]
pub struct ExposureCoordinator {
    layout: ExposureLayout,
    applied_bracket: Option<usize>,
}

impl ExposureCoordinator {
    /// Brackets must be ordered, non-empty and disjoint
    pub fn new(layout: ExposureLayout) -> Result<Self, ControlError> {
        let well_formed = layout.brackets.iter().all(|b| b.min_gain <= b.max_gain)
            && layout
                .brackets
                .windows(2)
                .all(|w| w[0].max_gain < w[1].min_gain);
        if !well_formed {
            return Err(ControlError::MalformedTable);
        }
        Ok(Self {
            layout,
            applied_bracket: None,
        })
    }

    pub fn applied_bracket(&self) -> Option<usize> {
        self.applied_bracket
    }

    /// Forget the applied bracket; the next gain update writes it again
    pub fn invalidate(&mut self) {
        self.applied_bracket = None;
    }

    /// Record that a program built by this coordinator was executed
    pub fn commit(&mut self, bracket: Option<usize>) {
        #[cfg(feature = "rttdebug")]
        {
            if bracket != self.applied_bracket {
                rprintln!("gain bracket {:?} -> {:?}", self.applied_bracket, bracket);
            }
        }
        self.applied_bracket = bracket;
    }

    fn bracket_for(&self, gain: u32) -> Option<usize> {
        self.layout.brackets.iter().position(|b| b.contains(gain))
    }

    /// Most ops any update from this layout can produce
    pub fn worst_case_len(&self) -> usize {
        let hold = self
            .layout
            .group_hold
            .map_or(0, |h| h.enter.len() + h.leave.len());
        let bracket = self
            .layout
            .brackets
            .iter()
            .map(|b| b.writes.len())
            .max()
            .unwrap_or(0);
        hold + self.layout.shutter.len() + self.layout.gain.len() + bracket + 1
    }

    fn push_gain(
        &self,
        program: &mut RegisterProgram,
        quantized: Quantized,
        bracket: Option<usize>,
    ) -> Result<(), ControlError> {
        let aux: &[(u16, u8)] = match bracket {
            Some(idx) if bracket != self.applied_bracket => {
                self.layout.brackets[idx].writes
            }
            _ => &[],
        };
        if self.layout.bracket_order == BracketOrder::BeforeGain {
            for &(addr, value) in aux {
                program.push(RegisterOp::write(addr, value))?;
            }
        }
        push_fields(program, self.layout.gain, quantized.code)?;
        if self.layout.bracket_order == BracketOrder::AfterGain {
            for &(addr, value) in aux {
                program.push(RegisterOp::write(addr, value))?;
            }
        }
        Ok(())
    }

    /// Shutter registers only
    pub fn shutter_update(
        &self,
        integration_lines: u32,
        params: &TimingParameters,
    ) -> Result<(RegisterProgram, u32), ControlError> {
        let lines = params.clamp_integration(integration_lines);
        let mut program = RegisterProgram::new();
        push_fields(&mut program, self.layout.shutter, lines)?;
        program.push(RegisterOp::End)?;
        Ok((program, lines))
    }

    /// Gain code plus bracket writes if the bracket changes
    pub fn gain_update(
        &self,
        analog_gain: u32,
        table: &GainTable<'_>,
    ) -> Result<(RegisterProgram, GainUpdate), ControlError> {
        let quantized = table.quantize(analog_gain)?;
        let bracket = self.bracket_for(quantized.gain);
        let mut program = RegisterProgram::new();
        self.push_gain(&mut program, quantized, bracket)?;
        program.push(RegisterOp::End)?;
        Ok((program, GainUpdate { quantized, bracket }))
    }

    /// Shutter and gain in one program, inside the group hold if the
    /// device has one
    pub fn set_exposure(
        &self,
        integration_lines: u32,
        analog_gain: u32,
        table: &GainTable<'_>,
        params: &TimingParameters,
    ) -> Result<ExposureUpdate, ControlError> {
        let lines = params.clamp_integration(integration_lines);
        let quantized = table.quantize(analog_gain)?;
        let bracket = self.bracket_for(quantized.gain);

        let mut program = RegisterProgram::new();
        if let Some(hold) = self.layout.group_hold {
            program.extend_from(hold.enter)?;
        }
        push_fields(&mut program, self.layout.shutter, lines)?;
        self.push_gain(&mut program, quantized, bracket)?;
        if let Some(hold) = self.layout.group_hold {
            program.extend_from(hold.leave)?;
        }
        program.push(RegisterOp::End)?;

        Ok(ExposureUpdate {
            program,
            result: ExposureResult {
                integration_lines: lines,
                gain_code: quantized.code,
                achieved_gain: quantized.gain,
                bracket,
            },
        })
    }
}
