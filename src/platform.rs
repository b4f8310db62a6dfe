//! The boundary to whatever hosts the driver.
//!
//! The driver never maps memory or allocates DMA buffers on its own; a
//! [`Platform`] does that. A kernel module implements it with
//! `ioremap`/`dma_alloc_coherent`, a user-space tool with `/dev/mem` and the
//! VideoCore mailbox, and the tests with a simulated SoC.

use core::{
    ptr::NonNull,
    sync::atomic::{fence, Ordering},
};

use crate::{
    errors::PlatformError,
    registers::{Peripheral, RegisterWindow},
};

/// An ARM physical address, used to map register blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysAddress(pub u32);

/// A VideoCore bus address, the only kind the DMA engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BusAddress(pub u32);

/// A physically contiguous, DMA-visible memory region.
///
/// Holds both views of the same memory: the bus address handed to the DMA
/// engine and the pointer the CPU reads and writes through.
#[derive(Debug)]
pub struct DmaRegion {
    bus: BusAddress,
    ptr: NonNull<u32>,
    len: usize,
}

impl DmaRegion {
    /// Wraps memory handed out by a DMA allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must be 4-byte aligned and valid for reads and writes of `len`
    /// bytes until the region is given back to [`Platform::free_dma`], the
    /// memory must not be accessed through any other pointer in the meantime,
    /// and `bus` must be the bus address of the same memory.
    pub unsafe fn new(bus: BusAddress, ptr: NonNull<u32>, len: usize) -> Self {
        Self { bus, ptr, len }
    }

    /// Address of the region as seen by the DMA engine.
    pub fn bus_address(&self) -> BusAddress {
        self.bus
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// CPU pointer to the start of the region.
    pub fn as_ptr(&self) -> *mut u32 {
        self.ptr.as_ptr()
    }

    /// Whether both address views honor `align`.
    pub fn is_aligned(&self, align: usize) -> bool {
        self.bus.0 as usize % align == 0 && self.ptr.as_ptr() as usize % align == 0
    }

    pub(crate) fn words(&self) -> &[u32] {
        // SAFETY: guaranteed by the contract of `new`.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len / 4) }
    }

    pub(crate) fn words_mut(&mut self) -> &mut [u32] {
        // SAFETY: guaranteed by the contract of `new`.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len / 4) }
    }
}

/// Orders CPU accesses to DMA memory against the register write that hands
/// the memory to the DMA engine, or the register read that takes it back.
///
/// Must sit between the last buffer store and arming a channel, and between
/// retiring a channel and the first buffer store.
pub(crate) fn dma_barrier() {
    fence(Ordering::SeqCst);
    #[cfg(test)]
    fake::BARRIERS.with(|count| count.set(count.get() + 1));
}

/// Maps register blocks and hands out DMA memory.
pub trait Platform {
    /// The register window type of mapped blocks.
    type Window: RegisterWindow;

    /// Maps `size` bytes of registers starting at `phys`.
    fn map_registers(
        &mut self,
        peripheral: Peripheral,
        phys: PhysAddress,
        size: usize,
    ) -> Result<Self::Window, PlatformError>;

    /// Unmaps a window returned by [`map_registers`](Platform::map_registers).
    fn unmap_registers(&mut self, peripheral: Peripheral, window: Self::Window);

    /// Allocates `len` bytes of physically contiguous, uncached, DMA-visible
    /// memory aligned to `align` in both address spaces.
    fn alloc_dma(&mut self, len: usize, align: usize) -> Result<DmaRegion, PlatformError>;

    /// Releases a region returned by [`alloc_dma`](Platform::alloc_dma).
    fn free_dma(&mut self, region: DmaRegion);
}
