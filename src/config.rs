//! Driver configuration: strip timing, SoC generation, pin and DMA channel.

use crate::{
    platform::{BusAddress, PhysAddress},
    pwm::{GpioPin, PinFunction},
};

/// Frequency of the crystal oscillator that feeds the PWM clock manager.
pub const OSCILLATOR_HZ: u32 = 19_200_000;

/// The number of PWM bits that represent one LED data bit.
///
/// A logical `1` is sent as a long high pulse, a logical `0` as a short one.
/// The width also fixes the PWM clock: the serializer runs at
/// `bits() * bit_rate_hz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolWidth {
    /// `110` for a one, `100` for a zero.
    Three,
    /// `1110` for a one, `1000` for a zero.
    Four,
}

impl SymbolWidth {
    /// Bits per symbol.
    pub const fn bits(self) -> u32 {
        match self {
            SymbolWidth::Three => 3,
            SymbolWidth::Four => 4,
        }
    }

    /// Symbol for a logical one, right aligned.
    pub const fn high(self) -> u32 {
        match self {
            SymbolWidth::Three => 0b110,
            SymbolWidth::Four => 0b1110,
        }
    }

    /// Symbol for a logical zero, right aligned.
    pub const fn low(self) -> u32 {
        match self {
            SymbolWidth::Three => 0b100,
            SymbolWidth::Four => 0b1000,
        }
    }
}

/// Line timing of an LED protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// LED data bits per second.
    pub bit_rate_hz: u32,
    /// Minimum low time that latches a frame, in microseconds.
    pub reset_us: u32,
    /// Color bytes per pixel.
    pub bytes_per_pixel: usize,
    /// PWM bits per LED data bit.
    pub symbol: SymbolWidth,
}

impl Timing {
    /// Classic WS2812/WS2811 at 800 kHz with a 55 µs latch.
    pub const WS2812: Timing = Timing {
        bit_rate_hz: 800_000,
        reset_us: 55,
        bytes_per_pixel: 3,
        symbol: SymbolWidth::Three,
    };

    /// Newer WS2812B revisions, which need 300 µs to latch.
    pub const WS2812B_V5: Timing = Timing {
        bit_rate_hz: 800_000,
        reset_us: 300,
        bytes_per_pixel: 3,
        symbol: SymbolWidth::Three,
    };

    /// SK6812 RGBW strips.
    pub const SK6812_RGBW: Timing = Timing {
        bit_rate_hz: 800_000,
        reset_us: 80,
        bytes_per_pixel: 4,
        symbol: SymbolWidth::Four,
    };

    /// Rate of the PWM serializer, in bits per second.
    pub const fn symbol_rate_hz(&self) -> u32 {
        self.symbol.bits().saturating_mul(self.bit_rate_hz)
    }

    /// The integer divisor that derives the serializer clock from the oscillator.
    ///
    /// Returns `0` if the rate is zero or faster than the oscillator.
    pub const fn clock_divisor(&self) -> u32 {
        match OSCILLATOR_HZ.checked_div(self.symbol_rate_hz()) {
            Some(divisor) => divisor,
            None => 0,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::WS2812
    }
}

/// The SoC generation, which determines where the peripherals live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Soc {
    /// Raspberry Pi 1 and Zero.
    #[default]
    Bcm2835,
    /// Raspberry Pi 2 and 3.
    Bcm2836,
}

impl Soc {
    /// Where the VideoCore bus address space starts for peripherals.
    pub const BUS_PERIPHERAL_BASE: u32 = 0x7E00_0000;

    /// ARM physical address of the peripheral window.
    pub const fn peripheral_base(self) -> PhysAddress {
        match self {
            Soc::Bcm2835 => PhysAddress(0x2000_0000),
            Soc::Bcm2836 => PhysAddress(0x3F00_0000),
        }
    }

    /// ARM physical address of a register at `offset` inside the peripheral window.
    pub const fn phys_address(self, offset: u32) -> PhysAddress {
        PhysAddress(self.peripheral_base().0 + offset)
    }

    /// Bus address, as seen by the DMA engine, of a register at `offset`.
    pub const fn bus_address(self, offset: u32) -> BusAddress {
        BusAddress(Self::BUS_PERIPHERAL_BASE + offset)
    }
}

/// How long to wait for a peripheral status bit before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two status reads, in microseconds.
    pub interval_us: u32,
    /// Number of status reads before the peripheral is declared dead.
    pub max_polls: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_us: 10,
            max_polls: 100_000,
        }
    }
}

/// Everything [`Ws281xDriver::init`](crate::pwm::Ws281xDriver::init) needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Number of pixels on the strip. Fixes the render buffer size.
    pub pixel_count: usize,
    /// The pin that carries the PWM channel 1 output.
    pub pin: GpioPin,
    /// The alternate function that routes PWM channel 1 to `pin`.
    pub pin_function: PinFunction,
    /// Protocol timing.
    pub timing: Timing,
    /// SoC generation.
    pub soc: Soc,
    /// DMA channel that feeds the PWM FIFO.
    pub dma_channel: u8,
    /// Invert the output polarity, for inverting level shifters.
    pub invert: bool,
    /// Status polling limits.
    pub poll: PollPolicy,
}

impl EngineConfig {
    /// Highest DMA channel with the standard register layout.
    pub const MAX_DMA_CHANNEL: u8 = 14;

    /// A WS2812 configuration with default SoC, DMA channel 10 and polling limits.
    pub fn new(pixel_count: usize, pin: GpioPin, pin_function: PinFunction) -> Self {
        Self {
            pixel_count,
            pin,
            pin_function,
            timing: Timing::default(),
            soc: Soc::default(),
            dma_channel: 10,
            invert: false,
            poll: PollPolicy::default(),
        }
    }

    /// Use a different protocol timing.
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Use a different SoC generation.
    pub fn with_soc(mut self, soc: Soc) -> Self {
        self.soc = soc;
        self
    }

    /// Use a different DMA channel.
    pub fn with_dma_channel(mut self, dma_channel: u8) -> Self {
        self.dma_channel = dma_channel;
        self
    }

    /// Invert the output.
    pub fn with_invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    /// Use different polling limits.
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Number of input bytes a single render accepts.
    ///
    /// Saturates for pixel counts no buffer could hold.
    pub fn capacity(&self) -> usize {
        self.pixel_count.saturating_mul(self.timing.bytes_per_pixel)
    }
}
