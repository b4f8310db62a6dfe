use snafu::prelude::*;

use crate::{
    config::SymbolWidth,
    errors::{EncodeError, OverflowSnafu},
};

/// Expands every byte value into its 8 symbols, most significant bit first.
///
/// The result is right aligned and `8 * symbol.bits()` bits wide.
const fn expansion_table(symbol: SymbolWidth) -> [u32; 256] {
    let bits = symbol.bits();
    let mut table = [0u32; 256];

    let mut byte = 0;
    while byte < 256 {
        let mut expanded = 0u32;
        let mut bit = 0;
        while bit < 8 {
            let code = if byte & (0x80 >> bit) != 0 {
                symbol.high()
            } else {
                symbol.low()
            };
            expanded = (expanded << bits) | code;
            bit += 1;
        }
        table[byte] = expanded;
        byte += 1;
    }

    table
}

static THREE_BIT_SYMBOLS: [u32; 256] = expansion_table(SymbolWidth::Three);
static FOUR_BIT_SYMBOLS: [u32; 256] = expansion_table(SymbolWidth::Four);

/// Writes a bit stream into FIFO words, filling each word from its most significant bit.
struct WordPacker<'a> {
    out: &'a mut [u32],
    written: usize,
    pending: u64,
    pending_bits: u32,
}

impl<'a> WordPacker<'a> {
    fn new(out: &'a mut [u32]) -> Self {
        Self {
            out,
            written: 0,
            pending: 0,
            pending_bits: 0,
        }
    }

    /// Appends the lowest `bits` bits of `value`. `bits` must not exceed 32.
    fn push(&mut self, value: u32, bits: u32) {
        self.pending = (self.pending << bits) | u64::from(value);
        self.pending_bits += bits;

        if self.pending_bits >= 32 {
            self.pending_bits -= 32;
            self.out[self.written] = (self.pending >> self.pending_bits) as u32;
            self.written += 1;
            self.pending &= (1u64 << self.pending_bits) - 1;
        }
    }

    /// Flushes the partial word and zeroes everything behind it.
    fn finish(self) {
        let mut written = self.written;
        if self.pending_bits > 0 {
            self.out[written] = (self.pending << (32 - self.pending_bits)) as u32;
            written += 1;
        }
        self.out[written..].fill(0);
    }
}

/// Turns LED data bytes into the PWM serializer waveform.
///
/// Every data bit becomes one [`SymbolWidth`] symbol. Symbols are packed
/// back to back into 32-bit words, first bit in the most significant
/// position, because that is the order in which the serializer shifts a FIFO
/// word onto the pin. A byte therefore usually straddles a word boundary.
///
/// The last `reset_padding_bytes` of the output stay low; they produce the
/// latch period that ends a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveformEncoder {
    symbol: SymbolWidth,
    reset_padding_bytes: usize,
}

impl WaveformEncoder {
    /// Creates an encoder that reserves `reset_padding_bytes` of silence at the end of its output.
    pub const fn new(symbol: SymbolWidth, reset_padding_bytes: usize) -> Self {
        Self {
            symbol,
            reset_padding_bytes,
        }
    }

    /// The symbol width.
    pub fn symbol(&self) -> SymbolWidth {
        self.symbol
    }

    /// Bytes of silence kept at the end of the output.
    pub fn reset_padding_bytes(&self) -> usize {
        self.reset_padding_bytes
    }

    /// Number of waveform bits `len` input bytes expand to.
    ///
    /// Saturates instead of overflowing.
    pub fn waveform_bits(&self, len: usize) -> usize {
        len.saturating_mul(8 * self.symbol.bits() as usize)
    }

    /// Number of waveform bits that fit in front of the reset padding of `out`.
    pub fn available_bits(&self, out: &[u32]) -> usize {
        (out.len() * 4)
            .saturating_sub(self.reset_padding_bytes)
            .saturating_mul(8)
    }

    fn table(&self) -> &'static [u32; 256] {
        match self.symbol {
            SymbolWidth::Three => &THREE_BIT_SYMBOLS,
            SymbolWidth::Four => &FOUR_BIT_SYMBOLS,
        }
    }

    /// Encodes `data` into `out` and zeroes the rest of `out`.
    ///
    /// Returns the number of waveform bits written. Fails without touching
    /// `out` if the waveform would reach into the reset padding.
    pub fn encode(&self, data: &[u8], out: &mut [u32]) -> Result<usize, EncodeError> {
        self.encode_stream(data.iter().copied(), data.len(), out)
    }

    /// Like [`encode`](Self::encode), for a byte source of known length.
    ///
    /// At most `len` bytes are taken from `bytes`.
    pub(crate) fn encode_stream(
        &self,
        bytes: impl Iterator<Item = u8>,
        len: usize,
        out: &mut [u32],
    ) -> Result<usize, EncodeError> {
        let input_bits = self.waveform_bits(len);
        let available_bits = self.available_bits(out);
        ensure!(
            input_bits <= available_bits,
            OverflowSnafu {
                input_bits,
                available_bits,
            }
        );

        let table = self.table();
        let bits_per_byte = 8 * self.symbol.bits();

        let mut packer = WordPacker::new(out);
        let mut encoded = 0;
        for byte in bytes.take(len) {
            packer.push(table[usize::from(byte)], bits_per_byte);
            encoded += 1;
        }
        packer.finish();

        Ok(self.waveform_bits(encoded))
    }
}
