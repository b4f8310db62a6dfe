// Accessors generated by `bitfield!` carry no doc comments.
#![allow(missing_docs)]

use bitfield::bitfield;
use embedded_hal::delay::DelayNs;

use crate::{
    config::Soc,
    platform::BusAddress,
    poll::SETTLE_US,
    registers::{register_block, Peripheral, RegisterBlock, RegisterWindow},
};

register_block!(
    /// The PWM controller. Only channel 1 is used.
    PwmRegisters {
        CTL @ 0x00,
        STA @ 0x04,
        DMAC @ 0x08,
        RNG1 @ 0x10,
        DAT1 @ 0x14,
        FIF1 @ 0x18,
    }
);

/// Bits shifted out per FIFO word.
const BITS_PER_WORD: u32 = 32;

/// DMA request threshold and panic level, as used by the firmware.
const DMAC_DREQ: u32 = 3;
const DMAC_PANIC: u32 = 7;

bitfield! {
    /// Image of the PWM `CTL` register, channel 1 half.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct PwmControl(u32);
    impl Debug;
    pub msen1, set_msen1: 7;
    pub clrf1, set_clrf1: 6;
    pub usef1, set_usef1: 5;
    pub pola1, set_pola1: 4;
    pub sbit1, set_sbit1: 3;
    pub rptl1, set_rptl1: 2;
    pub mode1, set_mode1: 1;
    pub pwen1, set_pwen1: 0;
}

bitfield! {
    /// Image of the PWM `STA` register.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct PwmStatus(u32);
    impl Debug;
    pub sta1, _: 9;
    pub berr, _: 8;
    pub gapo1, _: 4;
    pub rerr1, _: 3;
    pub werr1, _: 2;
    pub empt1, _: 1;
    pub full1, _: 0;
}

impl PwmStatus {
    /// Write-1-to-clear error flags: BERR, GAPO1..4, RERR1, WERR1.
    pub const ERROR_MASK: u32 = 0x1FC;

    /// Whether any error flag is set.
    pub fn has_errors(&self) -> bool {
        self.0 & Self::ERROR_MASK != 0
    }
}

bitfield! {
    /// Image of the PWM `DMAC` register.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct PwmDmaConfig(u32);
    impl Debug;
    pub enab, set_enab: 31;
    pub panic, set_panic: 15, 8;
    pub dreq, set_dreq: 7, 0;
}

/// PWM channel 1 in serializer mode, fed from its FIFO.
pub(crate) struct Serializer<W: RegisterWindow> {
    regs: PwmRegisters<W>,
}

impl<W: RegisterWindow> Serializer<W> {
    pub fn new(block: RegisterBlock<W>) -> Self {
        Self {
            regs: PwmRegisters::new(block),
        }
    }

    /// Bus address of the FIFO, the destination of every DMA transfer.
    pub fn fifo_bus_address(soc: Soc) -> BusAddress {
        soc.bus_address(Peripheral::Pwm.offset(0) + PwmRegisters::<W>::FIF1 as u32)
    }

    pub fn control(&self) -> PwmControl {
        PwmControl(self.regs.read_ctl())
    }

    pub fn dma_config(&self) -> PwmDmaConfig {
        PwmDmaConfig(self.regs.read_dmac())
    }

    pub fn disable<D: DelayNs>(&mut self, delay: &mut D) {
        self.regs.write_ctl(0);
        delay.delay_us(SETTLE_US);
    }

    /// Puts channel 1 into serializer mode with an empty FIFO and DMA requests enabled.
    ///
    /// The PWM clock must already be running.
    pub fn setup<D: DelayNs>(&mut self, invert: bool, delay: &mut D) {
        self.disable(delay);

        self.regs.write_rng1(BITS_PER_WORD);

        let mut ctl = PwmControl(0);
        ctl.set_clrf1(true);
        self.regs.write_ctl(ctl.0);
        delay.delay_us(SETTLE_US);

        let stale = self.clear_status();
        if stale.has_errors() {
            log::debug!("Cleared stale PWM status {:#x}", stale.0);
        }

        let mut dmac = PwmDmaConfig(0);
        dmac.set_enab(true);
        dmac.set_panic(DMAC_PANIC);
        dmac.set_dreq(DMAC_DREQ);
        self.regs.write_dmac(dmac.0);

        let mut ctl = PwmControl(0);
        ctl.set_usef1(true);
        ctl.set_mode1(true);
        ctl.set_pola1(invert);
        ctl.set_pwen1(true);
        self.regs.write_ctl(ctl.0);

        log::debug!(
            "PWM serializer armed: CTL = {:#010x}, DMAC = {:#010x}, RNG1 = {}",
            self.control().0,
            self.dma_config().0,
            self.regs.read_rng1()
        );
    }

    /// Clears the latched error flags and returns the ones that were set.
    pub fn clear_status(&mut self) -> PwmStatus {
        let errors = self.regs.read_sta() & PwmStatus::ERROR_MASK;
        if errors != 0 {
            self.regs.write_sta(errors);
        }
        PwmStatus(errors)
    }

    pub fn into_block(self) -> RegisterBlock<W> {
        self.regs.into_block()
    }
}
