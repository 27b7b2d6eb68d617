/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Register transport used by the program executor

use embedded_hal::blocking::i2c;

/// Byte-wide register access at 16-bit addresses
pub trait RegisterBus {
    type Error;

    fn read_reg(&mut self, addr: u16) -> Result<u8, Self::Error>;

    fn write_reg(&mut self, addr: u16, value: u8) -> Result<(), Self::Error>;
}

impl<B: RegisterBus + ?Sized> RegisterBus for &mut B {
    type Error = B::Error;

    fn read_reg(&mut self, addr: u16) -> Result<u8, Self::Error> {
        (**self).read_reg(addr)
    }

    fn write_reg(&mut self, addr: u16, value: u8) -> Result<(), Self::Error> {
        (**self).write_reg(addr, value)
    }
}

/// Two-wire (SCCB-like) register access for sensors with 16-bit register
/// addresses and 8-bit register values
pub struct I2cBus<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C> I2cBus<I2C> {
    /// `address` is the 7-bit device address
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Give back the underlying i2c port
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C, CommE> RegisterBus for I2cBus<I2C>
where
    I2C: i2c::Write<Error = CommE> + i2c::Read<Error = CommE>,
{
    type Error = CommE;

    fn read_reg(&mut self, addr: u16) -> Result<u8, CommE> {
        // SCCB has no repeated start: address phase and read phase are
        // separate transactions
        let cmd_buf = addr.to_be_bytes();
        let mut recv_buf = [0u8];
        self.i2c.write(self.address, &cmd_buf)?;
        self.i2c.read(self.address, &mut recv_buf)?;
        Ok(recv_buf[0])
    }

    fn write_reg(&mut self, addr: u16, value: u8) -> Result<(), CommE> {
        let [hi, lo] = addr.to_be_bytes();
        let write_buf = [hi, lo, value];
        self.i2c.write(self.address, &write_buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeI2c {
        sent: Vec<(u8, Vec<u8>)>,
        reply: u8,
    }

    impl i2c::Write for FakeI2c {
        type Error = ();
        fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), ()> {
            self.sent.push((address, bytes.to_vec()));
            Ok(())
        }
    }

    impl i2c::Read for FakeI2c {
        type Error = ();
        fn read(&mut self, _address: u8, buffer: &mut [u8]) -> Result<(), ()> {
            buffer[0] = self.reply;
            Ok(())
        }
    }

    #[test]
    fn write_sends_big_endian_address_then_value() {
        let mut bus = I2cBus::new(FakeI2c::default(), 0x30);
        assert_eq!(bus.address(), 0x30);
        bus.write_reg(0x3e01, 0x5a).unwrap();
        let i2c = bus.release();
        assert_eq!(i2c.sent, vec![(0x30, vec![0x3e, 0x01, 0x5a])]);
    }

    #[test]
    fn read_addresses_then_reads() {
        let mut bus = I2cBus::new(
            FakeI2c {
                reply: 0x21,
                ..FakeI2c::default()
            },
            0x30,
        );
        assert_eq!(bus.read_reg(0x3107).unwrap(), 0x21);
        assert_eq!(bus.release().sent, vec![(0x30, vec![0x31, 0x07])]);
    }
}
