//! # Analog Devices AD7799 Driver
//!
//! Async driver for the AD7799 low-noise sigma-delta ADC, connected over SPI
//! with a dedicated chip-select line. The driver keeps a mirror of the
//! configuration last written to the device (rate, mode, channel, gain,
//! polarity) and uses it to convert raw 24-bit conversion codes to volts.

#![cfg_attr(not(test), no_std)]

use crate::registers::*;
use byteorder::{BigEndian, ByteOrder};
use core::result::Result;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::{delay, spi};

#[cfg(feature = "defmt")]
use defmt::*;

mod registers;

pub use registers::Register;

/// Filter update rate select.
///
/// Slower rates trade throughput for noise rejection; each code has a fixed
/// settle time that bounds how long a single conversion may take.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Rate {
    Sps470 = 1,
    Sps242,
    Sps123,
    Sps62,
    Sps50,
    Sps39,
    Sps33_2,
    /// 19.6 Hz, 90 dB rejection at 60 Hz.
    Sps19_6 = 8,
    /// 16.7 Hz, 80 dB rejection at 50 Hz.
    Sps16_7Rej80,
    /// 16.7 Hz, 65 dB rejection at 50 Hz and 60 Hz.
    Sps16_7Rej65,
    Sps12_5,
    Sps10,
    Sps8_33,
    Sps6_25,
    Sps4_17,
}

/// Settle time per rate code, in milliseconds. Index 0 is reserved.
const SETTLE_TIME_MS: [u32; 16] = [
    0, 4, 8, 16, 32, 40, 48, 60, 101, 120, 120, 160, 200, 240, 320, 480,
];

impl Rate {
    /// Minimum wait before a triggered conversion's result is valid.
    pub const fn settle_time_ms(self) -> u32 {
        SETTLE_TIME_MS[self as usize]
    }
}

/// Operating mode select.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Mode {
    Continuous = 0,
    Single,
    Idle,
    PowerDown,
    InternalZeroCal,
    InternalFullCal,
    SystemZeroCal,
    SystemFullCal,
}

/// Differential input channel select. Codes 4 to 6 are not valid selections.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Channel {
    /// AIN1(+) - AIN1(-)
    Ain1 = 0,
    /// AIN2(+) - AIN2(-)
    Ain2 = 1,
    /// AIN3(+) - AIN3(-)
    Ain3 = 2,
    /// AIN1(-) - AIN1(-), shorted input
    Ain1Shorted = 3,
    /// AVDD supply monitor
    AvddMonitor = 7,
}

/// Instrumentation amplifier gain, encoded as the base-2 exponent.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Gain {
    G1 = 0,
    G2,
    G4,
    G8,
    G16,
    G32,
    G64,
    G128,
}

impl Gain {
    /// Effective amplifier gain.
    pub const fn multiplier(self) -> u32 {
        1 << self as u8
    }
}

/// Input polarity: signed around mid-scale, or unsigned from zero.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Polarity {
    Bipolar = 0,
    Unipolar,
}

/// Errors that can occur when using the AD7799 driver.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<SpiErr, PinErr> {
    /// SPI transport failure, including bus timeouts.
    Spi(SpiErr),
    /// Chip-select line failure.
    Pin(PinErr),
    /// The ID register does not identify an AD7799.
    IdentityMismatch,
    /// A triggered conversion did not become ready within 1.5x the settle
    /// time of the configured rate.
    ConversionTimeout,
}

/// AD7799 async driver.
///
/// The configuration fields held here always equal the values last
/// successfully written to the device; a failed setter leaves both the
/// device register and the mirror untouched. Voltage conversion reads only
/// the mirror, never the hardware.
pub struct Ad7799<SPI, CS, DELAY>
where
    SPI: spi::SpiBus,
    CS: OutputPin,
    DELAY: delay::DelayNs,
{
    spi: SPI,
    cs: CS,
    delay: DELAY,
    vref: f32,
    rate: Rate,
    mode: Mode,
    channel: Channel,
    gain: Gain,
    polarity: Polarity,
    last_raw: u32,
    last_voltage: f32,
}

impl<SPI, CS, DELAY, SpiErr, PinErr> Ad7799<SPI, CS, DELAY>
where
    SPI: spi::SpiBus<u8, Error = SpiErr>,
    CS: OutputPin<Error = PinErr>,
    DELAY: delay::DelayNs,
{
    /// Creates a new AD7799 driver instance.
    ///
    /// # Arguments
    /// spi: The SPI bus.
    /// cs: The chip-select pin, active low.
    /// delay: The delay provider.
    /// vref: The external reference voltage, in volts.
    ///
    /// Call [`Self::reset`] before any other state-mutating operation so the
    /// device and the mirrored configuration agree.
    pub fn new(spi: SPI, cs: CS, delay: DELAY, vref: f32) -> Self {
        Self {
            spi,
            cs,
            delay,
            vref,
            rate: Rate::Sps4_17,
            mode: Mode::Continuous,
            channel: Channel::Ain1,
            gain: Gain::G128,
            polarity: Polarity::Bipolar,
            last_raw: 0,
            last_voltage: 0.0,
        }
    }

    /// Verifies the hardware identity via the ID register.
    ///
    /// The low nibble must match the AD7799 family identifier; on mismatch
    /// no configuration is touched and the device must not be used.
    pub async fn init(&mut self) -> Result<(), Error<SpiErr, PinErr>> {
        let id = self.read_register(Register::Id).await? as u8;
        if id & DEVICE_ID_MASK != DEVICE_ID {
            return Err(Error::IdentityMismatch);
        }
        Ok(())
    }

    /// Resets the device and the mirrored configuration to the defaults:
    /// continuous mode, gain x128, channel AIN1, bipolar, slowest rate.
    pub async fn reset(&mut self) -> Result<(), Error<SpiErr, PinErr>> {
        // 32 ones on DIN reset the serial interface and all registers.
        self.cs.set_low().map_err(Error::Pin)?;
        let io = self.write_frame(&[0xFF; 4]).await;
        self.cs.set_high().map_err(Error::Pin)?;
        io?;

        // Registers hold their power-on values here, so a full-word write
        // cannot clobber an unrelated field.
        let word = mode::SELECT.insert(
            mode::RATE.insert(0, Rate::Sps4_17 as u16),
            Mode::Continuous as u16,
        );
        self.write_register(Register::Mode, u32::from(word)).await?;

        self.rate = Rate::Sps4_17;
        self.mode = Mode::Continuous;
        self.channel = Channel::Ain1;
        self.gain = Gain::G128;
        self.polarity = Polarity::Bipolar;
        Ok(())
    }

    /// Performs a single conversion and returns the measured voltage.
    ///
    /// Triggers the conversion by switching to single mode, polls the status
    /// register until the ready bit clears, then reads the data register.
    /// Fails with [`Error::ConversionTimeout`] no later than 1.5x the
    /// configured rate's settle time after the trigger, leaving the cached
    /// raw/voltage values unchanged.
    pub async fn single_conversion(&mut self) -> Result<f32, Error<SpiErr, PinErr>> {
        self.set_mode(Mode::Single).await?;

        let budget_ms = self.rate.settle_time_ms() * 3 / 2;
        for _ in 0..budget_ms {
            if self.ready().await? {
                let raw = self.read_register(Register::Data).await?;
                self.last_raw = raw;
                self.last_voltage = raw_to_volts(raw, self.gain, self.polarity, self.vref);
                return Ok(self.last_voltage);
            }
            self.delay.delay_ms(1).await;
        }
        Err(Error::ConversionTimeout)
    }

    /// Returns true when a conversion result is available (status ready bit
    /// is active low).
    pub async fn ready(&mut self) -> Result<bool, Error<SpiErr, PinErr>> {
        let stat = self.read_register(Register::Status).await? as u8;
        Ok(stat & status::RDY == 0)
    }

    /// Sets the filter update rate.
    pub async fn set_rate(&mut self, rate: Rate) -> Result<(), Error<SpiErr, PinErr>> {
        self.update_field(Register::Mode, mode::RATE, rate as u16)
            .await?;
        self.rate = rate;
        Ok(())
    }

    /// Sets the operating mode.
    pub async fn set_mode(&mut self, mode: Mode) -> Result<(), Error<SpiErr, PinErr>> {
        self.update_field(Register::Mode, mode::SELECT, mode as u16)
            .await?;
        self.mode = mode;
        Ok(())
    }

    /// Selects the differential input channel.
    pub async fn set_channel(&mut self, channel: Channel) -> Result<(), Error<SpiErr, PinErr>> {
        self.update_field(Register::Configuration, config::CHANNEL, channel as u16)
            .await?;
        self.channel = channel;
        Ok(())
    }

    /// Sets the instrumentation amplifier gain.
    pub async fn set_gain(&mut self, gain: Gain) -> Result<(), Error<SpiErr, PinErr>> {
        self.update_field(Register::Configuration, config::GAIN, gain as u16)
            .await?;
        self.gain = gain;
        Ok(())
    }

    /// Sets unipolar or bipolar conversion.
    pub async fn set_polarity(&mut self, polarity: Polarity) -> Result<(), Error<SpiErr, PinErr>> {
        self.update_field(Register::Configuration, config::POLARITY, polarity as u16)
            .await?;
        self.polarity = polarity;
        Ok(())
    }

    /// Enables or disables the reference detect function.
    pub async fn set_reference_detect(
        &mut self,
        enabled: bool,
    ) -> Result<(), Error<SpiErr, PinErr>> {
        self.update_field(Register::Configuration, config::REF_DETECT, enabled as u16)
            .await
    }

    /// Reads a register, returning its value right-aligned in a `u32`.
    ///
    /// The command byte and the response bytes are exchanged under a single
    /// chip-select assertion; the register's wire width is fixed by its
    /// address.
    pub async fn read_register(&mut self, reg: Register) -> Result<u32, Error<SpiErr, PinErr>> {
        let width = reg.width();
        let mut buf = [0u8; 3];
        self.cs.set_low().map_err(Error::Pin)?;
        let io = self.read_frame(reg, &mut buf[..width]).await;
        self.cs.set_high().map_err(Error::Pin)?;
        io?;
        Ok(match width {
            1 => u32::from(buf[0]),
            2 => u32::from(BigEndian::read_u16(&buf[..2])),
            _ => BigEndian::read_u24(&buf[..3]),
        })
    }

    /// Writes a register value, most-significant byte first.
    pub async fn write_register(
        &mut self,
        reg: Register,
        value: u32,
    ) -> Result<(), Error<SpiErr, PinErr>> {
        let width = reg.width();
        let mut frame = [0u8; 4];
        frame[0] = comm_addr(reg);
        match width {
            1 => frame[1] = value as u8,
            2 => BigEndian::write_u16(&mut frame[1..3], value as u16),
            _ => BigEndian::write_u24(&mut frame[1..4], value),
        }
        self.cs.set_low().map_err(Error::Pin)?;
        let io = self.write_frame(&frame[..1 + width]).await;
        self.cs.set_high().map_err(Error::Pin)?;
        io
    }

    /// Read-modify-write of one bit-field; the mirror is the caller's
    /// responsibility and is only updated after this succeeds.
    async fn update_field(
        &mut self,
        reg: Register,
        field: Field,
        value: u16,
    ) -> Result<(), Error<SpiErr, PinErr>> {
        let word = self.read_register(reg).await? as u16;
        let word = field.insert(word, value);
        self.write_register(reg, u32::from(word)).await
    }

    async fn read_frame(
        &mut self,
        reg: Register,
        buf: &mut [u8],
    ) -> Result<(), Error<SpiErr, PinErr>> {
        self.spi
            .write(&[COMM_READ | comm_addr(reg)])
            .await
            .map_err(Error::Spi)?;
        self.spi.read(buf).await.map_err(Error::Spi)?;
        self.spi.flush().await.map_err(Error::Spi)
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), Error<SpiErr, PinErr>> {
        self.spi.write(frame).await.map_err(Error::Spi)?;
        self.spi.flush().await.map_err(Error::Spi)
    }

    /// The configured reference voltage.
    pub fn reference_voltage(&self) -> f32 {
        self.vref
    }

    /// The filter update rate last written to the device.
    pub fn rate(&self) -> Rate {
        self.rate
    }

    /// The operating mode last written to the device.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The input channel last written to the device.
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// The amplifier gain last written to the device.
    pub fn gain(&self) -> Gain {
        self.gain
    }

    /// The conversion polarity last written to the device.
    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// The most recent raw conversion code.
    pub fn last_raw(&self) -> u32 {
        self.last_raw
    }

    /// The most recent derived voltage.
    pub fn last_voltage(&self) -> f32 {
        self.last_voltage
    }
}

/// Converts a raw conversion code to volts.
///
/// Always scales by the fixed 24-bit data register width, independent of any
/// other register's width.
fn raw_to_volts(raw: u32, gain: Gain, polarity: Polarity, vref: f32) -> f32 {
    const FULL_SCALE: f32 = 16_777_216.0; // 2^24
    const MID_SCALE: f32 = 8_388_608.0; // 2^23

    let gain = gain.multiplier() as f32;
    match polarity {
        Polarity::Unipolar => raw as f32 * vref / (FULL_SCALE * gain),
        Polarity::Bipolar => (raw as f32 - MID_SCALE) * vref / (MID_SCALE * gain),
    }
}
