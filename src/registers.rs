#![allow(dead_code)]

/// Represents the register addresses in the AD7799 ADC.
///
/// Address 0 is the Status register on reads; writes to address 0 target the
/// Communications register instead.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Register {
    /// Status Register (RO, 8-bit)
    Status = 0x00,
    /// Mode Register (RW, 16-bit)
    Mode,
    /// Configuration Register (RW, 16-bit)
    Configuration,
    /// Data Register (RO, 24-bit)
    Data,
    /// ID Register (RO, 8-bit)
    Id,
    /// IO Register (RO, 8-bit)
    Io,
    /// Offset Register (RW, 24-bit)
    Offset,
    /// Full-Scale Register (RW, 24-bit)
    FullScale,
}

impl Register {
    /// Width of the register on the wire, in bytes.
    pub const fn width(self) -> usize {
        match self {
            Register::Status | Register::Id | Register::Io => 1,
            Register::Mode | Register::Configuration => 2,
            Register::Data | Register::Offset | Register::FullScale => 3,
        }
    }
}

/// Communications register: read operation flag (bit 6).
pub(crate) const COMM_READ: u8 = 1 << 6;

/// Communications register: register address in bits 5:3.
pub(crate) const fn comm_addr(reg: Register) -> u8 {
    (reg as u8 & 0x7) << 3
}

/// A contiguous bit-field within a 16-bit register word.
///
/// The Mode and Configuration registers multiplex several independent
/// settings into one word; all packing and unpacking goes through these
/// accessors so a field update never disturbs its neighbours.
#[derive(Clone, Copy)]
pub(crate) struct Field {
    shift: u8,
    width: u8,
}

impl Field {
    pub(crate) const fn new(shift: u8, width: u8) -> Self {
        Self { shift, width }
    }

    pub(crate) const fn mask(self) -> u16 {
        (((1u32 << self.width) - 1) as u16) << self.shift
    }

    /// Returns `word` with this field replaced by `value`.
    pub(crate) const fn insert(self, word: u16, value: u16) -> u16 {
        (word & !self.mask()) | ((value << self.shift) & self.mask())
    }

    /// Extracts this field's value from `word`.
    pub(crate) const fn extract(self, word: u16) -> u16 {
        (word & self.mask()) >> self.shift
    }
}

/// Bit-fields of the Mode register.
pub(crate) mod mode {
    use super::Field;

    /// Operating mode select.
    pub const SELECT: Field = Field::new(13, 3);
    /// Power switch control.
    pub const PSW: Field = Field::new(12, 1);
    /// Filter update rate select.
    pub const RATE: Field = Field::new(0, 4);
}

/// Bit-fields of the Configuration register.
pub(crate) mod config {
    use super::Field;

    /// Burnout current enable (reserved, no setter).
    pub const BURNOUT: Field = Field::new(13, 1);
    /// Unipolar/bipolar select.
    pub const POLARITY: Field = Field::new(12, 1);
    /// Instrumentation amplifier gain select.
    pub const GAIN: Field = Field::new(8, 3);
    /// Reference detect enable.
    pub const REF_DETECT: Field = Field::new(5, 1);
    /// Buffered mode enable (reserved, no setter).
    pub const BUFFERED: Field = Field::new(4, 1);
    /// Analog input channel select.
    pub const CHANNEL: Field = Field::new(0, 3);
}

/// Status register bits.
pub(crate) mod status {
    /// Conversion ready, active low.
    pub const RDY: u8 = 1 << 7;
    /// Overrange/underrange error flag.
    pub const ERR: u8 = 1 << 6;
}

/// Expected low nibble of the ID register for the AD7799 family.
pub(crate) const DEVICE_ID: u8 = 0x9;
pub(crate) const DEVICE_ID_MASK: u8 = 0x0F;
