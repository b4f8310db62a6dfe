//! Typed access to the memory mapped register blocks.
//!
//! Every hardware unit the driver touches is reached through a
//! [`RegisterWindow`]. On a real system that is an [`MmioWindow`] over an
//! `ioremap`/`mmap` of the block; in tests it can be any fake that reacts to
//! writes the way the silicon does.

use core::{fmt, ptr::NonNull};

use crate::{config::Soc, platform::PhysAddress};

/// 32-bit register access at byte offsets inside one mapped block.
pub trait RegisterWindow {
    /// Reads the register at `offset`.
    fn read(&self, offset: usize) -> u32;

    /// Writes `value` to the register at `offset`.
    fn write(&mut self, offset: usize, value: u32);
}

/// A [`RegisterWindow`] over a mapped address range, using volatile accesses.
#[derive(Debug)]
pub struct MmioWindow {
    base: NonNull<u32>,
    size: usize,
}

impl MmioWindow {
    /// Wraps a mapped register range.
    ///
    /// # Safety
    ///
    /// `base` must point to `size` bytes of mapped device memory that stay
    /// mapped for as long as the window exists, and nothing else may write
    /// to those registers in the meantime.
    pub unsafe fn new(base: NonNull<u32>, size: usize) -> Self {
        Self { base, size }
    }

    /// The mapped base pointer, for handing back to the unmapping code.
    pub fn as_ptr(&self) -> *mut u32 {
        self.base.as_ptr()
    }

    /// The size of the mapped range in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    fn word(&self, offset: usize) -> *mut u32 {
        assert!(
            offset % 4 == 0 && offset + 4 <= self.size,
            "register offset {:#x} outside of a {:#x} byte window",
            offset,
            self.size
        );
        // SAFETY: the offset was checked against the mapped size above.
        unsafe { self.base.as_ptr().add(offset / 4) }
    }
}

impl RegisterWindow for MmioWindow {
    fn read(&self, offset: usize) -> u32 {
        // SAFETY: `word` only returns pointers inside the mapped range.
        unsafe { self.word(offset).read_volatile() }
    }

    fn write(&mut self, offset: usize, value: u32) {
        // SAFETY: `word` only returns pointers inside the mapped range.
        unsafe { self.word(offset).write_volatile(value) }
    }
}

/// The hardware blocks the driver maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Peripheral {
    /// GPIO function select registers.
    Gpio,
    /// The PWM clock manager (`CM_PWMCTL`, `CM_PWMDIV`).
    ClockManager,
    /// The PWM controller.
    Pwm,
    /// One DMA channel.
    Dma,
}

impl Peripheral {
    /// All blocks, in mapping order.
    pub const ALL: [Peripheral; 4] = [
        Peripheral::Gpio,
        Peripheral::ClockManager,
        Peripheral::Pwm,
        Peripheral::Dma,
    ];

    /// Offset of the block inside the peripheral window.
    pub const fn offset(self, dma_channel: u8) -> u32 {
        match self {
            Peripheral::Gpio => 0x20_0000,
            Peripheral::ClockManager => 0x10_10A0,
            Peripheral::Pwm => 0x20_C000,
            Peripheral::Dma => 0x7000 + 0x100 * dma_channel as u32,
        }
    }

    /// Bytes to map for the block.
    pub const fn size(self) -> usize {
        match self {
            Peripheral::Gpio => 40 * 4,
            Peripheral::ClockManager => 2 * 4,
            Peripheral::Pwm => 10 * 4,
            Peripheral::Dma => 9 * 4,
        }
    }

    /// ARM physical base address of the block.
    pub const fn phys_address(self, soc: Soc, dma_channel: u8) -> PhysAddress {
        soc.phys_address(self.offset(dma_channel))
    }
}

impl fmt::Display for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Peripheral::Gpio => "GPIO",
            Peripheral::ClockManager => "PWM clock manager",
            Peripheral::Pwm => "PWM",
            Peripheral::Dma => "DMA channel",
        })
    }
}

/// One mapped hardware block.
#[derive(Debug)]
pub struct RegisterBlock<W> {
    peripheral: Peripheral,
    phys_base: PhysAddress,
    size: usize,
    window: W,
}

impl<W: RegisterWindow> RegisterBlock<W> {
    /// Wraps a freshly mapped window.
    pub fn new(peripheral: Peripheral, phys_base: PhysAddress, size: usize, window: W) -> Self {
        Self {
            peripheral,
            phys_base,
            size,
            window,
        }
    }

    /// Which block this is.
    pub fn peripheral(&self) -> Peripheral {
        self.peripheral
    }

    /// ARM physical base address.
    pub fn phys_base(&self) -> PhysAddress {
        self.phys_base
    }

    /// Mapped size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Reads the register at `offset`.
    pub fn read(&self, offset: usize) -> u32 {
        debug_assert!(offset + 4 <= self.size);
        self.window.read(offset)
    }

    /// Writes the register at `offset`.
    pub fn write(&mut self, offset: usize, value: u32) {
        debug_assert!(offset + 4 <= self.size);
        self.window.write(offset, value)
    }

    /// The underlying window.
    pub fn window(&self) -> &W {
        &self.window
    }

    /// The underlying window, mutably.
    pub fn window_mut(&mut self) -> &mut W {
        &mut self.window
    }

    /// Releases the window, for unmapping.
    pub fn into_window(self) -> W {
        self.window
    }
}

/// Declares a register block wrapper with one `read_*`/`write_*` pair per register.
macro_rules! register_block {
    (
        $(#[$attr:meta])*
        $name:ident {
            $($register:ident @ $offset:literal),+ $(,)?
        }
    ) => {
        $(#[$attr])*
        pub(crate) struct $name<W: $crate::registers::RegisterWindow> {
            block: $crate::registers::RegisterBlock<W>,
        }

        #[allow(dead_code)]
        impl<W: $crate::registers::RegisterWindow> $name<W> {
            $(pub(crate) const $register: usize = $offset;)+

            pub(crate) fn new(block: $crate::registers::RegisterBlock<W>) -> Self {
                $(debug_assert!($offset + 4 <= block.size());)+
                Self { block }
            }

            pub(crate) fn block(&self) -> &$crate::registers::RegisterBlock<W> {
                &self.block
            }

            pub(crate) fn block_mut(&mut self) -> &mut $crate::registers::RegisterBlock<W> {
                &mut self.block
            }

            pub(crate) fn into_block(self) -> $crate::registers::RegisterBlock<W> {
                self.block
            }

            ::paste::paste! {
                $(
                    pub(crate) fn [<read_ $register:lower>](&self) -> u32 {
                        self.block.read(Self::$register)
                    }

                    pub(crate) fn [<write_ $register:lower>](&mut self, value: u32) {
                        self.block.write(Self::$register, value)
                    }
                )+
            }
        }
    };
}

pub(crate) use register_block;
