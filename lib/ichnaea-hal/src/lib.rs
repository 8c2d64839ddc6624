// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hardware abstraction traits consumed by the Ichnaea power-control core.
//!
//! Every capability the core needs from the board is expressed here as a
//! trait rather than a concrete peripheral binding, so the leaf components
//! (sensor facade, PDI database, controller driver) stay generic and
//! testable against an in-memory fake instead of a PAC.

#![no_std]

/// Degrees Celsius.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Celsius(pub f32);

/// Rotations per minute.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Rpm(pub u16);

/// Volts of potential.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Volts(pub f32);

/// Amperes of current.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Amperes(pub f32);

/// Ohms of resistance.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Ohms(pub f32);

/// A multiplexed ADC input channel.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct AdcChannel(pub u8);

/// A GPIO pin identifier, board-assigned.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct GpioPin(pub u8);

/// A PWM-capable pin identifier.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct PwmPin(pub u8);

/// A chip-select-qualified SPI peripheral instance.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct SpiPort(pub u8);

/// Errors a [`Spi`] transfer can report.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u32)]
pub enum SpiError {
    /// The transfer completed with fewer bytes than requested.
    ShortTransfer = 1,
    /// The underlying peripheral reported a bus error.
    BusFault = 2,
}

/// Errors an [`Nvm`] operation can report.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u32)]
pub enum NvmError {
    /// `offset`/`len` fell outside the addressable region.
    OutOfRange = 1,
    /// The underlying flash device reported a program/erase failure.
    DeviceFault = 2,
}

/// Analog-to-digital conversion, with a cached-vs-refresh read mode.
pub trait Adc {
    /// Samples `channel` now and updates the cache. Averaging, channel-select
    /// settling, and inter-sample spacing are the implementation's concern;
    /// the core only ever asks for "a fresh value" or "whatever's cached".
    fn read_voltage(&mut self, channel: AdcChannel) -> f32;

    /// Returns the last value `read_voltage` produced for `channel`, or `0.0`
    /// if the channel has never been sampled.
    fn cached(&self, channel: AdcChannel) -> f32;
}

/// Digital I/O.
pub trait Gpio {
    fn set(&mut self, pin: GpioPin, level: bool);
    fn get(&self, pin: GpioPin) -> bool;
}

/// PWM channel configuration (switching-frequency sync, fan drive, etc).
pub trait Pwm {
    fn configure(&mut self, pin: PwmPin, frequency_hz: u32, duty: u16);
}

/// A blocking, full-duplex SPI transfer primitive. Chip-select bracketing is
/// the caller's responsibility (the controller driver holds its own CS pin).
pub trait Spi {
    fn transfer(
        &mut self,
        port: SpiPort,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), SpiError>;
}

/// Monotonic wall-clock access and busy-wait delay.
pub trait Clock {
    fn millis(&self) -> u64;
    fn micros(&self) -> u64;
    fn delay_us(&self, n: u32);
}

/// Raw non-volatile storage with 4 KiB erase granularity.
pub trait Nvm {
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), NvmError>;
    fn write(&mut self, offset: u32, buf: &[u8]) -> Result<(), NvmError>;
    fn erase(&mut self, offset: u32, len: u32) -> Result<(), NvmError>;
}

/// System-level control not owned by any one driver.
pub trait System {
    /// Performs a warm reset. Does not return.
    fn warm_reset(&mut self) -> !;
}
