//! The PWM + DMA driver.
//!
//! PWM channel 1 runs as a serializer clocked at `symbol bits × bit rate`
//! from the 19.2 MHz oscillator. One DMA channel copies the encoded frame
//! from the render buffer into the PWM FIFO, paced by the PWM's DREQ line.
//! The trailing zero words of the buffer hold the line low long enough to
//! latch the frame.

use embedded_hal::delay::DelayNs;

use crate::{config::EngineConfig, platform::Platform};

mod clock;
mod control_block;
mod dma;
mod driver;
mod driver_builder;
mod encoder;
mod gpio;
mod render_buffer;
mod serializer;

pub use clock::{ClockControl, ClockDivisor};
pub use control_block::{DmaControlBlock, TransferInfo};
pub use dma::{DmaControlStatus, DmaDebug, DmaStatus};
pub use encoder::WaveformEncoder;
pub use gpio::{GpioPin, PinFunction};
pub use render_buffer::BufferLayout;
pub use serializer::{PwmControl, PwmDmaConfig, PwmStatus};

use clock::ClockGenerator;
use control_block::ControlBlockHandle;
use dma::DmaEngine;
use gpio::GpioMux;
use render_buffer::RenderBuffer;
use serializer::Serializer;

/// Lifecycle of the render engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Resources are being acquired.
    Uninitialized,
    /// Ready to render; a previous frame may still be streaming out.
    Idle,
    /// A frame is being encoded and handed to the DMA engine.
    Rendering,
    /// The hardware is being released.
    ShuttingDown,
}

/// A WS281x LED strip driver based on the BCM2835 PWM serializer and a DMA channel.
///
/// The driver owns everything it touches: the four mapped register blocks,
/// the DMA control block and the render buffer, plus the [`Platform`] that
/// provided them. Get it back with [`cleanup`](Ws281xDriver::cleanup).
pub struct Ws281xDriver<P: Platform, D: DelayNs> {
    platform: P,
    delay: D,
    config: EngineConfig,
    state: EngineState,
    gpio: GpioMux<P::Window>,
    clock: ClockGenerator<P::Window>,
    serializer: Serializer<P::Window>,
    dma: DmaEngine<P::Window>,
    encoder: WaveformEncoder,
    control_block: ControlBlockHandle,
    buffer: RenderBuffer,
}
