use snafu::prelude::*;

use crate::{
    config::EngineConfig,
    errors::{
        InitError, InvalidClockDivisorSnafu, InvalidDmaChannelSnafu, InvalidPixelCountSnafu,
        MapRegistersSnafu, OutOfMemorySnafu, PlatformError,
    },
    platform::{DmaRegion, Platform},
    registers::{Peripheral, RegisterBlock},
};

use super::{
    clock::{ClockGenerator, MAX_DIVISOR},
    control_block::{ControlBlockHandle, DmaControlBlock},
    dma::DmaEngine,
    gpio::GpioMux,
    render_buffer::{BufferLayout, RenderBuffer},
    serializer::Serializer,
    EngineState, WaveformEncoder,
};

/// Everything the driver owns besides the platform and the delay.
pub(crate) struct Parts<P: Platform> {
    pub gpio: GpioMux<P::Window>,
    pub clock: ClockGenerator<P::Window>,
    pub serializer: Serializer<P::Window>,
    pub dma: DmaEngine<P::Window>,
    pub encoder: WaveformEncoder,
    pub control_block: ControlBlockHandle,
    pub buffer: RenderBuffer,
}

/// Acquires the driver's resources one by one.
///
/// Dropping the builder before [`build`](DriverBuilder::build) hands every
/// resource acquired so far back to the platform, in reverse order.
pub(crate) struct DriverBuilder<'a, P: Platform> {
    config: EngineConfig,
    layout: BufferLayout,
    platform: &'a mut P,
    state: EngineState,
    gpio: Option<RegisterBlock<P::Window>>,
    clock: Option<RegisterBlock<P::Window>>,
    pwm: Option<RegisterBlock<P::Window>>,
    dma: Option<RegisterBlock<P::Window>>,
    control_block: Option<ControlBlockHandle>,
    buffer: Option<RenderBuffer>,
}

impl<'a, P: Platform> DriverBuilder<'a, P> {
    /// Checks the configuration and computes the buffer layout.
    pub fn new(config: EngineConfig, platform: &'a mut P) -> Result<Self, InitError> {
        ensure!(config.pixel_count > 0, InvalidPixelCountSnafu);
        ensure!(
            config.dma_channel <= EngineConfig::MAX_DMA_CHANNEL,
            InvalidDmaChannelSnafu {
                channel: config.dma_channel
            }
        );

        let divisor = config.timing.clock_divisor();
        ensure!(
            (1..=MAX_DIVISOR).contains(&divisor),
            InvalidClockDivisorSnafu {
                bit_rate_hz: config.timing.bit_rate_hz,
                divisor,
            }
        );

        let layout = BufferLayout::new(config.pixel_count, &config.timing)
            .filter(|layout| layout.len() <= DmaControlBlock::MAX_TRANSFER_LEN as usize)
            .context(InvalidPixelCountSnafu)?;

        log::debug!(
            "Render buffer: {} pixels, {} waveform bytes + {} reset bytes = {} bytes",
            config.pixel_count,
            layout.data_bytes(),
            layout.reset_padding_bytes(),
            layout.len()
        );
        log::debug!(
            "PWM clock: {} Hz / {} = {} Hz",
            crate::config::OSCILLATOR_HZ,
            divisor,
            config.timing.symbol_rate_hz()
        );

        Ok(Self {
            config,
            layout,
            platform,
            state: EngineState::Uninitialized,
            gpio: None,
            clock: None,
            pwm: None,
            dma: None,
            control_block: None,
            buffer: None,
        })
    }

    /// Maps the GPIO, clock manager, PWM and DMA channel registers.
    pub fn map_registers(&mut self) -> Result<(), InitError> {
        for peripheral in Peripheral::ALL {
            let phys = peripheral.phys_address(self.config.soc, self.config.dma_channel);
            let size = peripheral.size();

            let window = self
                .platform
                .map_registers(peripheral, phys, size)
                .context(MapRegistersSnafu { peripheral })?;
            log::debug!("Mapped {} registers at {:#010x}", peripheral, phys.0);

            let block = Some(RegisterBlock::new(peripheral, phys, size, window));
            match peripheral {
                Peripheral::Gpio => self.gpio = block,
                Peripheral::ClockManager => self.clock = block,
                Peripheral::Pwm => self.pwm = block,
                Peripheral::Dma => self.dma = block,
            }
        }
        Ok(())
    }

    fn alloc_dma(
        &mut self,
        what: &'static str,
        len: usize,
        align: usize,
    ) -> Result<DmaRegion, InitError> {
        let region = self
            .platform
            .alloc_dma(len, align)
            .context(OutOfMemorySnafu { what, len })?;

        if region.len() < len || !region.is_aligned(align) {
            self.platform.free_dma(region);
            return Err(PlatformError::Misaligned { align }).context(OutOfMemorySnafu { what, len });
        }

        log::debug!(
            "Allocated {} bytes for the {} at bus address {:#010x}",
            len,
            what,
            region.bus_address().0
        );
        Ok(region)
    }

    /// Allocates the DMA control block.
    pub fn allocate_control_block(&mut self) -> Result<(), InitError> {
        let region = self.alloc_dma(
            "DMA control block",
            DmaControlBlock::SIZE,
            DmaControlBlock::ALIGN,
        )?;
        self.control_block = Some(ControlBlockHandle::new(region));
        Ok(())
    }

    /// Allocates the render buffer and points the control block at it.
    pub fn allocate_render_buffer(&mut self) -> Result<(), InitError> {
        let region = self.alloc_dma("render buffer", self.layout.len(), 4)?;
        let buffer = RenderBuffer::new(region, self.layout);

        if let Some(control_block) = self.control_block.as_mut() {
            let fifo = Serializer::<P::Window>::fifo_bus_address(self.config.soc);
            control_block.write(&DmaControlBlock::one_shot(
                buffer.bus_address(),
                self.layout.len() as u32,
                fifo,
            ));
        }

        self.buffer = Some(buffer);
        Ok(())
    }

    /// Hands the acquired resources over, disarming the rollback.
    ///
    /// # Panics
    ///
    /// If any acquisition step was skipped.
    pub fn build(mut self) -> Parts<P> {
        let config = self.config;
        self.state = EngineState::Idle;

        match (
            self.gpio.take(),
            self.clock.take(),
            self.pwm.take(),
            self.dma.take(),
            self.control_block.take(),
            self.buffer.take(),
        ) {
            (Some(gpio), Some(clock), Some(pwm), Some(dma), Some(control_block), Some(buffer)) => {
                Parts {
                    gpio: GpioMux::new(gpio),
                    clock: ClockGenerator::new(clock, config.poll),
                    serializer: Serializer::new(pwm),
                    dma: DmaEngine::new(dma, config.dma_channel, config.poll),
                    encoder: WaveformEncoder::new(
                        config.timing.symbol,
                        self.layout.reset_padding_bytes(),
                    ),
                    control_block,
                    buffer,
                }
            }
            _ => unreachable!("driver built before all resources were acquired"),
        }
    }
}

impl<'a, P: Platform> Drop for DriverBuilder<'a, P> {
    fn drop(&mut self) {
        if self.state != EngineState::Uninitialized {
            return;
        }

        if let Some(buffer) = self.buffer.take() {
            self.platform.free_dma(buffer.into_region());
        }
        if let Some(control_block) = self.control_block.take() {
            self.platform.free_dma(control_block.into_region());
        }

        for block in [
            self.dma.take(),
            self.pwm.take(),
            self.clock.take(),
            self.gpio.take(),
        ]
        .into_iter()
        .flatten()
        {
            self.platform.unmap_registers(block.peripheral(), block.into_window());
        }

        log::debug!("Released partially acquired driver resources");
    }
}
