/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Register programs: ordered write / delay / bank-select sequences,
//! and the executor that plays them against a [`RegisterBus`].

use arrayvec::ArrayVec;
use embedded_hal::blocking::delay::DelayMs;

use crate::bus::RegisterBus;
use crate::{ControlError, Error};

#[cfg(feature = "rttdebug")]
use panic_rtt_core::rprintln;

/// Upper bound on ops in a program assembled at run time
pub const PROGRAM_CAPACITY: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOp {
    Write { addr: u16, value: u8 },
    /// Block for the given number of milliseconds
    Delay { ms: u32 },
    /// Switch register page via the device's page-select register
    BankSelect { bank: u8 },
    /// Stop; anything listed after this is never executed
    End,
}

impl RegisterOp {
    pub const fn write(addr: u16, value: u8) -> Self {
        RegisterOp::Write { addr, value }
    }

    pub const fn delay(ms: u32) -> Self {
        RegisterOp::Delay { ms }
    }
}

/// Program assembled at run time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterProgram {
    ops: ArrayVec<RegisterOp, PROGRAM_CAPACITY>,
}

impl RegisterProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: RegisterOp) -> Result<(), ControlError> {
        self.ops
            .try_push(op)
            .map_err(|_| ControlError::ProgramOverflow)
    }

    pub fn extend_from(&mut self, ops: &[RegisterOp]) -> Result<(), ControlError> {
        for op in ops {
            self.push(*op)?;
        }
        Ok(())
    }

    pub fn as_slice(&self) -> &[RegisterOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Writes in program order, stopping at `End`
    pub fn writes(&self) -> impl Iterator<Item = (u16, u8)> + '_ {
        self.ops
            .iter()
            .take_while(|op| **op != RegisterOp::End)
            .filter_map(|op| match *op {
                RegisterOp::Write { addr, value } => Some((addr, value)),
                _ => None,
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    Ready,
    Running,
    Done,
    /// A bus access failed at the op with this index
    Failed { at: usize },
}

/// Steps through a program one op at a time.
///
/// There is no rollback: after a failure the device keeps whatever the
/// last successful write left behind.
pub struct Executor<'p> {
    ops: &'p [RegisterOp],
    page_register: Option<u16>,
    pc: usize,
    state: ProgramState,
}

impl<'p> Executor<'p> {
    pub fn new(ops: &'p [RegisterOp]) -> Self {
        Self {
            ops,
            page_register: None,
            pc: 0,
            state: ProgramState::Ready,
        }
    }

    /// Register that receives the bank number on `BankSelect`
    pub fn with_page_register(mut self, page_register: Option<u16>) -> Self {
        self.page_register = page_register;
        self
    }

    pub fn state(&self) -> ProgramState {
        self.state
    }

    /// Number of ops executed so far
    pub fn executed(&self) -> usize {
        self.pc
    }

    /// Execute the next op
    pub fn step<B, D>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
    ) -> Result<ProgramState, Error<B::Error>>
    where
        B: RegisterBus,
        D: DelayMs<u32>,
    {
        match self.state {
            ProgramState::Ready => self.state = ProgramState::Running,
            ProgramState::Running => {}
            done_or_failed => return Ok(done_or_failed),
        }

        let op = match self.ops.get(self.pc) {
            Some(op) => *op,
            None => {
                self.state = ProgramState::Done;
                return Ok(self.state);
            }
        };

        let res = match op {
            RegisterOp::Write { addr, value } => {
                bus.write_reg(addr, value).map_err(Error::Comm)
            }
            RegisterOp::Delay { ms } => {
                delay.delay_ms(ms);
                Ok(())
            }
            RegisterOp::BankSelect { bank } => match self.page_register {
                Some(reg) => bus.write_reg(reg, bank).map_err(Error::Comm),
                None => Err(Error::NoPageRegister),
            },
            RegisterOp::End => {
                self.state = ProgramState::Done;
                return Ok(self.state);
            }
        };

        if let Err(e) = res {
            #[cfg(feature = "rttdebug")]
            rprintln!("register program failed at op {}", self.pc);
            self.state = ProgramState::Failed { at: self.pc };
            return Err(e);
        }
        self.pc += 1;
        Ok(self.state)
    }

    /// Run to `End` or exhaustion; returns the number of ops executed
    pub fn run<B, D>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
    ) -> Result<usize, Error<B::Error>>
    where
        B: RegisterBus,
        D: DelayMs<u32>,
    {
        while self.step(bus, delay)? == ProgramState::Running {}
        Ok(self.pc)
    }
}

/// Execute `ops` start to finish against `bus`
pub fn run_program<B, D>(
    bus: &mut B,
    delay: &mut D,
    ops: &[RegisterOp],
    page_register: Option<u16>,
) -> Result<usize, Error<B::Error>>
where
    B: RegisterBus,
    D: DelayMs<u32>,
{
    Executor::new(ops)
        .with_page_register(page_register)
        .run(bus, delay)
}
