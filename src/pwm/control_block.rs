// Accessors generated by `bitfield!` carry no doc comments.
#![allow(missing_docs)]

use bitfield::bitfield;

use crate::platform::{dma_barrier, BusAddress, DmaRegion};

bitfield! {
    /// The `TI` word of a control block.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct TransferInfo(u32);
    impl Debug;
    pub no_wide_bursts, set_no_wide_bursts: 26;
    pub waits, set_waits: 25, 21;
    pub permap, set_permap: 20, 16;
    pub burst_length, set_burst_length: 15, 12;
    pub src_ignore, set_src_ignore: 11;
    pub src_dreq, set_src_dreq: 10;
    pub src_width, set_src_width: 9;
    pub src_inc, set_src_inc: 8;
    pub dest_ignore, set_dest_ignore: 7;
    pub dest_dreq, set_dest_dreq: 6;
    pub dest_width, set_dest_width: 5;
    pub dest_inc, set_dest_inc: 4;
    pub wait_resp, set_wait_resp: 3;
    pub tdmode, set_tdmode: 1;
    pub inten, set_inten: 0;
}

impl TransferInfo {
    /// Peripheral number of the PWM DREQ line.
    pub const PERMAP_PWM: u32 = 5;

    /// Memory to PWM FIFO, one word per DREQ from the PWM.
    pub fn pwm_fifo_feed() -> Self {
        let mut ti = TransferInfo(0);
        ti.set_no_wide_bursts(true);
        ti.set_wait_resp(true);
        ti.set_dest_dreq(true);
        ti.set_permap(Self::PERMAP_PWM);
        ti.set_src_inc(true);
        ti
    }
}

/// A DMA control block as the engine reads it from memory.
///
/// The engine only accepts control blocks on 32-byte boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C, align(32))]
pub struct DmaControlBlock {
    /// Transfer information.
    pub ti: u32,
    /// Bus address to read from.
    pub source_ad: u32,
    /// Bus address to write to.
    pub dest_ad: u32,
    /// Bytes to transfer.
    pub txfr_len: u32,
    /// 2D stride, unused.
    pub stride: u32,
    /// Bus address of the next control block, `0` to stop.
    pub nextconbk: u32,
    reserved: [u32; 2],
}

impl DmaControlBlock {
    /// Size of a control block in bytes.
    pub const SIZE: usize = 32;
    /// Required alignment in both address spaces.
    pub const ALIGN: usize = 32;
    /// Largest `txfr_len` of a linear transfer.
    pub const MAX_TRANSFER_LEN: u32 = (1 << 30) - 1;

    const WORDS: usize = Self::SIZE / 4;

    /// A single transfer of `len` bytes from `source` into the PWM FIFO at `fifo`.
    pub fn one_shot(source: BusAddress, len: u32, fifo: BusAddress) -> Self {
        Self {
            ti: TransferInfo::pwm_fifo_feed().0,
            source_ad: source.0,
            dest_ad: fifo.0,
            txfr_len: len,
            stride: 0,
            nextconbk: 0,
            reserved: [0; 2],
        }
    }

    /// The decoded `ti` word.
    pub fn transfer_info(&self) -> TransferInfo {
        TransferInfo(self.ti)
    }

    fn to_words(self) -> [u32; Self::WORDS] {
        [
            self.ti,
            self.source_ad,
            self.dest_ad,
            self.txfr_len,
            self.stride,
            self.nextconbk,
            self.reserved[0],
            self.reserved[1],
        ]
    }

    fn from_words(words: [u32; Self::WORDS]) -> Self {
        Self {
            ti: words[0],
            source_ad: words[1],
            dest_ad: words[2],
            txfr_len: words[3],
            stride: words[4],
            nextconbk: words[5],
            reserved: [words[6], words[7]],
        }
    }
}

/// Control block storage in DMA memory.
#[derive(Debug)]
pub(crate) struct ControlBlockHandle {
    region: DmaRegion,
}

impl ControlBlockHandle {
    /// Whether `region` can hold a control block.
    pub fn fits(region: &DmaRegion) -> bool {
        region.is_aligned(DmaControlBlock::ALIGN) && region.len() >= DmaControlBlock::SIZE
    }

    /// Takes over `region` and zeroes it.
    pub fn new(region: DmaRegion) -> Self {
        assert!(Self::fits(&region), "control block region is misaligned");

        let mut handle = Self { region };
        handle.write(&DmaControlBlock::default());
        handle
    }

    /// The address to load into `CONBLK_AD`.
    pub fn bus_address(&self) -> BusAddress {
        self.region.bus_address()
    }

    /// Stores `block`. The DMA engine must not be running from it.
    pub fn write(&mut self, block: &DmaControlBlock) {
        let words = self.region.words_mut();
        for (word, value) in words.iter_mut().zip(block.to_words()) {
            // SAFETY: `word` is a valid, aligned reference into the region.
            unsafe { core::ptr::write_volatile(word, value) };
        }
        dma_barrier();
    }

    pub fn read(&self) -> DmaControlBlock {
        let mut words = [0; DmaControlBlock::WORDS];
        for (value, word) in words.iter_mut().zip(self.region.words()) {
            // SAFETY: `word` is a valid, aligned reference into the region.
            *value = unsafe { core::ptr::read_volatile(word) };
        }
        DmaControlBlock::from_words(words)
    }

    pub fn into_region(self) -> DmaRegion {
        self.region
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake;

    #[test]
    fn layout_matches_hardware() {
        assert_eq!(core::mem::size_of::<DmaControlBlock>(), DmaControlBlock::SIZE);
        assert_eq!(core::mem::align_of::<DmaControlBlock>(), DmaControlBlock::ALIGN);
    }

    #[test]
    fn pwm_feed_transfer_info() {
        let ti = TransferInfo::pwm_fifo_feed();
        assert_eq!(ti.0, (1 << 26) | (5 << 16) | (1 << 8) | (1 << 6) | (1 << 3));
        assert!(!ti.dest_inc());
        assert!(!ti.inten());
    }

    #[test]
    fn one_shot_block_round_trips_through_dma_memory() {
        let mut handle = ControlBlockHandle::new(fake::alloc(32, 32));
        assert_eq!(handle.read(), DmaControlBlock::default());

        let block = DmaControlBlock::one_shot(BusAddress(0xC000_1000), 28, BusAddress(0x7E20_C018));
        let barriers = fake::barriers();
        handle.write(&block);
        assert!(fake::barriers() > barriers, "control block left unfenced");

        let stored = handle.read();
        assert_eq!(stored, block);
        assert_eq!(stored.txfr_len, 28);
        assert_eq!(stored.nextconbk, 0);
        assert_eq!(stored.stride, 0);
        assert_eq!(stored.transfer_info().permap(), TransferInfo::PERMAP_PWM);

        fake::free(handle.into_region(), 32);
    }

    #[test]
    fn misaligned_region_does_not_fit() {
        let region = fake::alloc(64, 32);
        let base = core::ptr::NonNull::new(region.as_ptr()).unwrap();
        let next_word = core::ptr::NonNull::new(region.as_ptr().wrapping_add(1)).unwrap();
        // SAFETY: both views stay inside `region` and are never accessed.
        let shifted =
            unsafe { DmaRegion::new(BusAddress(region.bus_address().0 + 4), next_word, 32) };
        let short = unsafe { DmaRegion::new(region.bus_address(), base, 16) };

        assert!(ControlBlockHandle::fits(&region));
        assert!(!ControlBlockHandle::fits(&shifted));
        assert!(!ControlBlockHandle::fits(&short));

        fake::free(region, 32);
    }
}
