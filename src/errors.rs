//! Error types

use snafu::prelude::*;

use crate::registers::Peripheral;

/// A peripheral that stopped responding.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum HardwareError {
    /// The status register never reached the expected state.
    #[snafu(display("{peripheral} did not settle after {polls} polls"))]
    Timeout {
        /// The peripheral that was polled.
        peripheral: Peripheral,
        /// The number of status reads before giving up.
        polls: u32,
    },
}

/// Errors a [`Platform`](crate::platform::Platform) can report.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PlatformError {
    /// The register range could not be mapped.
    #[snafu(display("unable to map register range"))]
    MapFailed,
    /// No DMA-capable memory is left.
    #[snafu(display("out of DMA-capable memory"))]
    NoMemory,
    /// The platform returned memory that violates the requested alignment.
    #[snafu(display("region is not aligned to {align} bytes"))]
    Misaligned {
        /// The alignment that was requested.
        align: usize,
    },
}

/// Errors of the [`Ws281xDriver::init`](crate::pwm::Ws281xDriver::init) function
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum InitError {
    /// The strip needs at least one pixel.
    #[snafu(display("pixel count must be positive"))]
    InvalidPixelCount,
    /// Only DMA channels 0 to 14 share the register layout this driver uses.
    #[snafu(display("DMA channel {channel} is not supported, use 0..=14"))]
    InvalidDmaChannel {
        /// The configured channel.
        channel: u8,
    },
    /// The bit rate cannot be derived from the 19.2 MHz oscillator.
    #[snafu(display("bit rate {bit_rate_hz} Hz needs clock divisor {divisor}, outside 1..=4095"))]
    InvalidClockDivisor {
        /// The configured LED bit rate.
        bit_rate_hz: u32,
        /// The divisor that rate would need.
        divisor: u32,
    },
    /// A register window could not be mapped.
    #[snafu(display("unable to map the {peripheral} registers"))]
    MapRegisters {
        /// The peripheral whose window failed.
        peripheral: Peripheral,
        /// The platform's reason.
        source: PlatformError,
    },
    /// DMA memory for the control block or the render buffer is unavailable.
    #[snafu(display("unable to allocate {len} bytes for the {what}"))]
    OutOfMemory {
        /// Which allocation failed.
        what: &'static str,
        /// The requested size in bytes.
        len: usize,
        /// The platform's reason.
        source: PlatformError,
    },
    /// A peripheral did not settle while being configured.
    #[snafu(context(false))]
    #[snafu(display("hardware fault during initialization: {source}"))]
    Hardware {
        /// The unresponsive peripheral.
        source: HardwareError,
    },
}

/// Errors of the [`Ws281xDriver::render`](crate::pwm::Ws281xDriver::render) function
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RenderError {
    /// The input holds more bytes than the strip was sized for.
    #[snafu(display("{len} bytes exceed the capacity of {capacity} bytes"))]
    Oversized {
        /// The length of the rejected input.
        len: usize,
        /// The number of bytes the render buffer holds.
        capacity: usize,
    },
    /// The encoder refused the input.
    #[snafu(context(false))]
    #[snafu(display("unable to encode: {source}"))]
    Encode {
        /// The encoder's reason.
        source: EncodeError,
    },
    /// The DMA channel could not be retired before the buffer was reused.
    #[snafu(context(false))]
    #[snafu(display("hardware fault during render: {source}"))]
    Hardware {
        /// The unresponsive peripheral.
        source: HardwareError,
    },
}

/// Errors of the [`WaveformEncoder`](crate::pwm::WaveformEncoder)
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EncodeError {
    /// The waveform does not fit in front of the reset padding.
    #[snafu(display("{input_bits} waveform bits do not fit into {available_bits} bits"))]
    Overflow {
        /// The number of waveform bits the input expands to.
        input_bits: usize,
        /// The number of waveform bits in front of the reset padding.
        available_bits: usize,
    },
}
