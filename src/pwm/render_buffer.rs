use crate::{
    config::{SymbolWidth, Timing},
    platform::{BusAddress, DmaRegion},
};

const WORD_BYTES: usize = 4;

const fn div_ceil(value: u64, divisor: u64) -> u64 {
    value / divisor + (value % divisor != 0) as u64
}

/// Size and shape of the render buffer of a strip.
///
/// ```text
/// | data_bytes: encoded pixels | reset padding | rounding to full words |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pixel_count: usize,
    bytes_per_pixel: usize,
    symbol: SymbolWidth,
    data_bytes: usize,
    reset_padding_bytes: usize,
    len: usize,
}

impl BufferLayout {
    /// Computes the layout for `pixel_count` pixels.
    ///
    /// Returns `None` if the buffer size does not fit into a `usize`.
    pub fn new(pixel_count: usize, timing: &Timing) -> Option<Self> {
        let symbol_bits = timing.symbol.bits() as usize;
        let data_bytes = pixel_count
            .checked_mul(timing.bytes_per_pixel)?
            .checked_mul(symbol_bits)?;

        let reset_bits = div_ceil(
            u64::from(timing.reset_us)
                .checked_mul(u64::from(timing.bit_rate_hz))?
                .checked_mul(symbol_bits as u64)?,
            1_000_000,
        );
        let reset_padding_bytes = usize::try_from(div_ceil(reset_bits, 8)).ok()?;

        let unaligned = data_bytes.checked_add(reset_padding_bytes)?;
        let len = unaligned.checked_add(WORD_BYTES - 1)? / WORD_BYTES * WORD_BYTES;

        Some(Self {
            pixel_count,
            bytes_per_pixel: timing.bytes_per_pixel,
            symbol: timing.symbol,
            data_bytes,
            reset_padding_bytes,
            len,
        })
    }

    /// Number of pixels the buffer is sized for.
    pub fn pixel_count(&self) -> usize {
        self.pixel_count
    }

    /// Input bytes one frame holds.
    pub fn capacity(&self) -> usize {
        self.pixel_count * self.bytes_per_pixel
    }

    /// Symbol width the waveform is encoded with.
    pub fn symbol(&self) -> SymbolWidth {
        self.symbol
    }

    /// Bytes of waveform a full frame takes.
    pub fn data_bytes(&self) -> usize {
        self.data_bytes
    }

    /// Bytes of low signal behind the waveform that latch the frame.
    pub fn reset_padding_bytes(&self) -> usize {
        self.reset_padding_bytes
    }

    /// Total length in bytes, a multiple of the FIFO word size.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total length in FIFO words.
    pub fn words(&self) -> usize {
        self.len / WORD_BYTES
    }
}

/// The DMA source: encoded waveform followed by the reset padding.
#[derive(Debug)]
pub(crate) struct RenderBuffer {
    region: DmaRegion,
    layout: BufferLayout,
}

impl RenderBuffer {
    /// Takes over `region`, which must be at least `layout.len()` bytes long.
    pub fn new(mut region: DmaRegion, layout: BufferLayout) -> Self {
        assert!(region.len() >= layout.len(), "render buffer region too small");
        region.words_mut().fill(0);
        Self { region, layout }
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    pub fn bus_address(&self) -> BusAddress {
        self.region.bus_address()
    }

    /// The words the DMA engine transfers.
    pub fn words(&self) -> &[u32] {
        &self.region.words()[..self.layout.words()]
    }

    pub fn words_mut(&mut self) -> &mut [u32] {
        let words = self.layout.words();
        &mut self.region.words_mut()[..words]
    }

    pub fn into_region(self) -> DmaRegion {
        self.region
    }
}
