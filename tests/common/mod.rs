#![allow(dead_code)]

//! A simulated BCM2835 that is just real enough to run the driver against.

use std::{
    alloc::{self, Layout},
    cell::RefCell,
    collections::HashMap,
    ptr::NonNull,
    rc::Rc,
};

use embedded_hal::delay::DelayNs;
use ws281x_pwm_dma::{
    errors::PlatformError,
    platform::{BusAddress, DmaRegion, PhysAddress, Platform},
    registers::{Peripheral, RegisterWindow},
    EngineConfig, GpioPin, PinFunction, PollPolicy,
};

pub const CM_PASSWORD: u32 = 0x5A00_0000;
pub const CM_BUSY: u32 = 1 << 7;
pub const CM_KILL: u32 = 1 << 5;
pub const CM_ENAB: u32 = 1 << 4;

pub const PWM_CLRF1: u32 = 1 << 6;

pub const DMA_RESET: u32 = 1 << 31;
pub const DMA_ERROR: u32 = 1 << 8;
pub const DMA_INT: u32 = 1 << 2;
pub const DMA_END: u32 = 1 << 1;
pub const DMA_ACTIVE: u32 = 1 << 0;
const DMA_CS_WRITABLE: u32 = 0xF0FF_0000 | DMA_ACTIVE;
const DMA_DEBUG_READ_ERROR: u32 = 1 << 2;

/// Byte pattern that freshly allocated DMA memory is filled with.
pub const STALE: u8 = 0xA5;

const BUS_BASE: u32 = 0xC000_0000;
const PAGE: u32 = 4096;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A configuration for GPIO 18 with short polling limits.
pub fn config(pixel_count: usize) -> EngineConfig {
    EngineConfig::new(pixel_count, GpioPin::GPIO18, PinFunction::Alt5).with_poll_policy(PollPolicy {
        interval_us: 10,
        max_polls: 100,
    })
}

/// Misbehaviour to inject.
#[derive(Debug, Default, Clone)]
pub struct Faults {
    /// The clock generator never reports busy.
    pub clock_never_starts: bool,
    /// Mapping this block fails.
    pub unmappable: Option<Peripheral>,
    /// Number of DMA allocations that succeed.
    pub alloc_limit: Option<usize>,
    /// Every transfer ends with a read error.
    pub dma_error: bool,
    /// The DMA channel ignores `RESET` and cannot be deactivated.
    pub dma_wedged: bool,
    /// `CS` reads a transfer stays active for; `0` completes it at once.
    pub dma_busy_reads: u32,
}

struct Allocation {
    ptr: NonNull<u32>,
    layout: Layout,
}

struct SimState {
    faults: Faults,
    regs: HashMap<Peripheral, Vec<u32>>,
    mapped: HashMap<Peripheral, PhysAddress>,
    allocations: HashMap<u32, Allocation>,
    allocation_count: usize,
    next_bus: u32,
    frames: Vec<Vec<u32>>,
    control_blocks: Vec<[u32; 8]>,
    busy_reads_left: u32,
}

impl SimState {
    fn new(faults: Faults) -> Self {
        Self {
            faults,
            regs: HashMap::new(),
            mapped: HashMap::new(),
            allocations: HashMap::new(),
            allocation_count: 0,
            next_bus: BUS_BASE,
            frames: Vec::new(),
            control_blocks: Vec::new(),
            busy_reads_left: 0,
        }
    }

    fn regs(&mut self, peripheral: Peripheral) -> &mut Vec<u32> {
        self.regs
            .entry(peripheral)
            .or_insert_with(|| vec![0; peripheral.size() / 4])
    }

    fn read(&mut self, peripheral: Peripheral, offset: usize) -> u32 {
        if peripheral == Peripheral::Dma && offset == 0x00 && self.busy_reads_left > 0 {
            self.busy_reads_left -= 1;
            if self.busy_reads_left == 0 {
                self.complete_transfer();
            }
        }
        self.regs(peripheral)[offset / 4]
    }

    fn write(&mut self, peripheral: Peripheral, offset: usize, value: u32) {
        match peripheral {
            Peripheral::Gpio => self.regs(peripheral)[offset / 4] = value,
            Peripheral::ClockManager => self.write_clock(offset, value),
            Peripheral::Pwm => self.write_pwm(offset, value),
            Peripheral::Dma => self.write_dma(offset, value),
        }
    }

    fn write_clock(&mut self, offset: usize, value: u32) {
        if value & 0xFF00_0000 != CM_PASSWORD {
            return;
        }
        let value = value & 0x00FF_FFFF;
        let never_starts = self.faults.clock_never_starts;
        let regs = self.regs(Peripheral::ClockManager);
        match offset {
            0x00 => {
                let running = value & CM_ENAB != 0 && value & CM_KILL == 0 && !never_starts;
                regs[0] = (value & !CM_BUSY) | if running { CM_BUSY } else { 0 };
            }
            _ => regs[offset / 4] = value,
        }
    }

    fn write_pwm(&mut self, offset: usize, value: u32) {
        let regs = self.regs(Peripheral::Pwm);
        match offset {
            0x00 => regs[0] = value & !PWM_CLRF1,
            0x04 => regs[1] &= !value,
            _ => regs[offset / 4] = value,
        }
    }

    fn write_dma(&mut self, offset: usize, value: u32) {
        let wedged = self.faults.dma_wedged;
        match offset {
            0x00 if value & DMA_RESET != 0 => {
                if !wedged {
                    let regs = self.regs(Peripheral::Dma);
                    regs[0] = 0;
                    regs[8] = 0;
                    self.busy_reads_left = 0;
                }
            }
            0x00 => {
                let regs = self.regs(Peripheral::Dma);
                let cs = regs[0];
                let latched = cs & (DMA_END | DMA_INT) & !value;
                let mut next = (value & DMA_CS_WRITABLE) | latched | (cs & DMA_ERROR);
                if wedged {
                    next |= cs & DMA_ACTIVE;
                }
                regs[0] = next;

                if next & DMA_ACTIVE != 0 && cs & DMA_ACTIVE == 0 {
                    self.start_transfer();
                }
            }
            0x20 => self.regs(Peripheral::Dma)[8] &= !value,
            _ => self.regs(Peripheral::Dma)[offset / 4] = value,
        }
    }

    fn start_transfer(&mut self) {
        let conblk_ad = self.regs(Peripheral::Dma)[1];
        let block = self.read_bus(conblk_ad, 8);
        let control_block: [u32; 8] = block.try_into().unwrap();
        self.control_blocks.push(control_block);

        let (source, len) = (control_block[1], control_block[3]);
        let frame = self.read_bus(source, len as usize / 4);
        self.frames.push(frame);

        if self.faults.dma_error {
            let regs = self.regs(Peripheral::Dma);
            regs[0] |= DMA_ERROR;
            regs[8] |= DMA_DEBUG_READ_ERROR;
        } else if self.faults.dma_busy_reads == 0 {
            self.complete_transfer();
        } else {
            self.busy_reads_left = self.faults.dma_busy_reads;
        }
    }

    fn complete_transfer(&mut self) {
        let regs = self.regs(Peripheral::Dma);
        regs[0] = (regs[0] & !DMA_ACTIVE) | DMA_END;
    }

    /// Reads `words` words at a bus address, the way the DMA engine would.
    fn read_bus(&self, address: u32, words: usize) -> Vec<u32> {
        let (base, allocation) = self
            .allocations
            .iter()
            .find(|&(&base, allocation)| {
                address >= base && (address - base) as usize + words * 4 <= allocation.layout.size()
            })
            .unwrap_or_else(|| panic!("DMA access to unallocated bus address {:#010x}", address));

        let start = (address - base) as usize / 4;
        // SAFETY: the range was checked against the allocation above.
        unsafe { std::slice::from_raw_parts(allocation.ptr.as_ptr().add(start), words).to_vec() }
    }
}

impl Drop for SimState {
    fn drop(&mut self) {
        for (_, allocation) in self.allocations.drain() {
            // SAFETY: allocated in `alloc_dma` with this layout.
            unsafe { alloc::dealloc(allocation.ptr.as_ptr().cast(), allocation.layout) };
        }
    }
}

/// The simulated SoC. Clones share the same hardware.
#[derive(Clone)]
pub struct SimSoc(Rc<RefCell<SimState>>);

impl SimSoc {
    pub fn new() -> Self {
        Self::with_faults(Faults::default())
    }

    pub fn with_faults(faults: Faults) -> Self {
        Self(Rc::new(RefCell::new(SimState::new(faults))))
    }

    pub fn inject(&self, change: impl FnOnce(&mut Faults)) {
        change(&mut self.0.borrow_mut().faults);
    }

    pub fn register(&self, peripheral: Peripheral, offset: usize) -> u32 {
        self.0.borrow_mut().regs(peripheral)[offset / 4]
    }

    pub fn set_register(&self, peripheral: Peripheral, offset: usize, value: u32) {
        self.0.borrow_mut().regs(peripheral)[offset / 4] = value;
    }

    /// The function code of a GPIO pin.
    pub fn gpio_function(&self, pin: u8) -> u32 {
        let fsel = self.register(Peripheral::Gpio, usize::from(pin / 10) * 4);
        (fsel >> ((pin % 10) * 3)) & 0b111
    }

    /// Every frame the DMA engine copied, oldest first.
    pub fn frames(&self) -> Vec<Vec<u32>> {
        self.0.borrow().frames.clone()
    }

    /// The control block of the most recent transfer.
    pub fn last_control_block(&self) -> Option<[u32; 8]> {
        self.0.borrow().control_blocks.last().copied()
    }

    pub fn mapped(&self) -> HashMap<Peripheral, PhysAddress> {
        self.0.borrow().mapped.clone()
    }

    pub fn outstanding_allocations(&self) -> usize {
        self.0.borrow().allocations.len()
    }

    pub fn allocation_count(&self) -> usize {
        self.0.borrow().allocation_count
    }
}

pub struct SimWindow {
    peripheral: Peripheral,
    soc: Rc<RefCell<SimState>>,
}

impl RegisterWindow for SimWindow {
    fn read(&self, offset: usize) -> u32 {
        self.soc.borrow_mut().read(self.peripheral, offset)
    }

    fn write(&mut self, offset: usize, value: u32) {
        self.soc.borrow_mut().write(self.peripheral, offset, value)
    }
}

impl Platform for SimSoc {
    type Window = SimWindow;

    fn map_registers(
        &mut self,
        peripheral: Peripheral,
        phys: PhysAddress,
        size: usize,
    ) -> Result<SimWindow, PlatformError> {
        let mut state = self.0.borrow_mut();
        if state.faults.unmappable == Some(peripheral) {
            return Err(PlatformError::MapFailed);
        }
        assert_eq!(size, peripheral.size());
        assert!(
            state.mapped.insert(peripheral, phys).is_none(),
            "{} mapped twice",
            peripheral
        );
        state.regs(peripheral);

        Ok(SimWindow {
            peripheral,
            soc: Rc::clone(&self.0),
        })
    }

    fn unmap_registers(&mut self, peripheral: Peripheral, window: SimWindow) {
        assert_eq!(window.peripheral, peripheral);
        assert!(
            self.0.borrow_mut().mapped.remove(&peripheral).is_some(),
            "{} unmapped twice",
            peripheral
        );
    }

    fn alloc_dma(&mut self, len: usize, align: usize) -> Result<DmaRegion, PlatformError> {
        let mut state = self.0.borrow_mut();
        if let Some(limit) = state.faults.alloc_limit {
            if state.allocation_count >= limit {
                return Err(PlatformError::NoMemory);
            }
        }

        let layout =
            Layout::from_size_align(len.max(4), align.max(4)).map_err(|_| PlatformError::NoMemory)?;
        // SAFETY: `layout` has a non-zero size.
        let ptr = NonNull::new(unsafe { alloc::alloc(layout) }).ok_or(PlatformError::NoMemory)?;
        // SAFETY: the allocation is `layout.size()` bytes long.
        unsafe { ptr.as_ptr().write_bytes(STALE, layout.size()) };
        let ptr = ptr.cast::<u32>();

        let bus = state.next_bus;
        state.next_bus += (layout.size() as u32 + PAGE - 1) / PAGE * PAGE;
        state.allocations.insert(bus, Allocation { ptr, layout });
        state.allocation_count += 1;

        // SAFETY: freshly allocated, aligned and owned by the region until freed.
        Ok(unsafe { DmaRegion::new(BusAddress(bus), ptr, len) })
    }

    fn free_dma(&mut self, region: DmaRegion) {
        let allocation = self
            .0
            .borrow_mut()
            .allocations
            .remove(&region.bus_address().0)
            .expect("freeing DMA memory that was never allocated");
        assert_eq!(allocation.ptr.as_ptr(), region.as_ptr());
        // SAFETY: allocated in `alloc_dma` with this layout.
        unsafe { alloc::dealloc(allocation.ptr.as_ptr().cast(), allocation.layout) };
    }
}

/// A delay that returns at once.
pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}
