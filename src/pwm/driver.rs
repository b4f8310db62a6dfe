use embedded_hal::delay::DelayNs;
use snafu::prelude::*;

use crate::{
    config::EngineConfig,
    errors::{EncodeError, HardwareError, InitError, OversizedSnafu, RenderError},
    pixel::Pixel,
    pixelstream::IntoPixelStream,
    platform::Platform,
};

use super::{
    driver_builder::{DriverBuilder, Parts},
    BufferLayout, DmaControlBlock, DmaStatus, EngineState, WaveformEncoder, Ws281xDriver,
};

impl<P: Platform, D: DelayNs> Ws281xDriver<P, D> {
    /// Initializes the driver.
    ///
    /// Maps the registers, allocates the DMA memory, and brings up the PWM
    /// clock, the serializer and the output pin. On failure, everything
    /// acquired so far is released again before the error is returned.
    pub fn init(config: EngineConfig, mut platform: P, delay: D) -> Result<Self, InitError> {
        log::debug!("Initializing WS281x driver.");
        log::debug!("    Pixels: {}", config.pixel_count);
        log::debug!("    Timing: {:?}", config.timing);
        log::debug!("    SoC: {:?}", config.soc);
        log::debug!("    Pin: GPIO {} ({:?})", config.pin.number(), config.pin_function);
        log::debug!("    DMA channel: {}", config.dma_channel);

        let parts = {
            let mut builder = DriverBuilder::new(config, &mut platform)?;
            builder.map_registers()?;
            builder.allocate_control_block()?;
            builder.allocate_render_buffer()?;
            builder.build()
        };

        let Parts {
            gpio,
            clock,
            serializer,
            dma,
            encoder,
            control_block,
            buffer,
        } = parts;

        let mut driver = Self {
            platform,
            delay,
            config,
            state: EngineState::Uninitialized,
            gpio,
            clock,
            serializer,
            dma,
            encoder,
            control_block,
            buffer,
        };

        if let Err(err) = driver.bring_up() {
            log::error!("Unable to bring up the LED output: {}", err);
            drop(driver.cleanup());
            return Err(err);
        }

        driver.state = EngineState::Idle;
        Ok(driver)
    }

    fn bring_up(&mut self) -> Result<(), InitError> {
        let _ = self.dma.stop(&mut self.delay)?;
        self.serializer.disable(&mut self.delay);

        self.clock.configure(self.config.timing.clock_divisor(), &mut self.delay)?;
        self.serializer.setup(self.config.invert, &mut self.delay);

        if !self.config.pin.carries_pwm0(self.config.pin_function) {
            log::warn!(
                "GPIO {} does not carry PWM channel 1 on {:?}",
                self.config.pin.number(),
                self.config.pin_function
            );
        }
        self.gpio.set_function(self.config.pin, self.config.pin_function);
        if self.gpio.function_code(self.config.pin) != self.config.pin_function.code() {
            log::warn!("GPIO {} did not take its function", self.config.pin.number());
        }

        Ok(())
    }

    /// Renders one frame of raw LED bytes, in the order they go on the wire.
    ///
    /// Waits for the previous frame to finish streaming, encodes `data` and
    /// starts the transfer. Does not wait for the new frame to go out.
    ///
    /// Pixels beyond the end of `data` are sent as zeros.
    pub fn render(&mut self, data: &[u8]) -> Result<(), RenderError> {
        let capacity = self.config.capacity();
        ensure!(
            data.len() <= capacity,
            OversizedSnafu {
                len: data.len(),
                capacity,
            }
        );

        self.render_frame(|encoder, words| encoder.encode(data, words))
    }

    /// Renders one frame of pixels.
    ///
    /// See [`Pixel`] for the supported pixel types and their byte order.
    pub fn render_pixels<T>(&mut self, pixels: T) -> Result<(), RenderError>
    where
        T: IntoPixelStream,
        T::PixelIter: ExactSizeIterator,
    {
        let stream = pixels.into_pixel_stream();
        let len = stream.byte_len();

        let capacity = self.config.capacity();
        ensure!(len <= capacity, OversizedSnafu { len, capacity });

        if <T::Pixel as Pixel>::BYTES != self.config.timing.bytes_per_pixel {
            log::warn!(
                "Rendering {}-byte pixels to a strip with {} bytes per pixel",
                <T::Pixel as Pixel>::BYTES,
                self.config.timing.bytes_per_pixel
            );
        }

        self.render_frame(|encoder, words| encoder.encode_stream(stream, len, words))
    }

    fn render_frame<F>(&mut self, encode: F) -> Result<(), RenderError>
    where
        F: FnOnce(&WaveformEncoder, &mut [u32]) -> Result<usize, EncodeError>,
    {
        self.state = EngineState::Rendering;
        let result = self.stream_frame(encode);
        self.state = EngineState::Idle;
        result
    }

    fn stream_frame<F>(&mut self, encode: F) -> Result<(), RenderError>
    where
        F: FnOnce(&WaveformEncoder, &mut [u32]) -> Result<usize, EncodeError>,
    {
        let retired = self.dma.stop(&mut self.delay)?;

        let bits = encode(&self.encoder, self.buffer.words_mut())?;

        let status = self.serializer.clear_status();
        if status.has_errors() {
            log::warn!("PWM reported errors since the last frame: {:?}", status);
        }

        self.dma.start(retired, &self.control_block);
        log::trace!(
            "Streaming {} waveform bits, {} bytes in total",
            bits,
            self.buffer.layout().len()
        );

        Ok(())
    }

    /// Blocks until the frame in flight has been handed to the PWM.
    pub fn wait_idle(&mut self) -> Result<(), HardwareError> {
        self.dma.wait_complete(&mut self.delay)
    }

    /// Stops the output and releases all resources.
    ///
    /// Returns the platform, with every register block unmapped and all DMA
    /// memory freed. Hardware that does not respond is logged and skipped.
    pub fn cleanup(mut self) -> P {
        self.state = EngineState::ShuttingDown;
        log::debug!("Shutting down the WS281x driver.");

        if let Err(err) = self.dma.stop(&mut self.delay) {
            log::warn!("Unable to stop DMA channel {}: {}", self.dma.channel(), err);
        }
        self.serializer.disable(&mut self.delay);
        if let Err(err) = self.clock.stop(&mut self.delay) {
            log::warn!("Unable to stop the PWM clock: {}", err);
        }

        let Self {
            mut platform,
            gpio,
            clock,
            serializer,
            dma,
            control_block,
            buffer,
            ..
        } = self;

        platform.free_dma(buffer.into_region());
        platform.free_dma(control_block.into_region());

        for block in [
            dma.into_block(),
            serializer.into_block(),
            clock.into_block(),
            gpio.into_block(),
        ] {
            platform.unmap_registers(block.peripheral(), block.into_window());
        }

        platform
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The configuration the driver was initialized with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Size and shape of the render buffer.
    pub fn layout(&self) -> &BufferLayout {
        self.buffer.layout()
    }

    /// The encoder that fills the render buffer.
    pub fn encoder(&self) -> &WaveformEncoder {
        &self.encoder
    }

    /// The render buffer, as the DMA engine sees it.
    ///
    /// While a frame is streaming out this is the frame being sent.
    pub fn waveform(&self) -> &[u32] {
        self.buffer.words()
    }

    /// The control block the DMA engine runs from.
    pub fn control_block(&self) -> DmaControlBlock {
        self.control_block.read()
    }

    /// A snapshot of the DMA channel.
    pub fn dma_status(&self) -> DmaStatus {
        self.dma.status()
    }
}
