// Accessors generated by `bitfield!` carry no doc comments.
#![allow(missing_docs)]

use bitfield::bitfield;
use embedded_hal::delay::DelayNs;
use snafu::prelude::*;

use crate::{
    config::PollPolicy,
    errors::{HardwareError, TimeoutSnafu},
    platform::{dma_barrier, BusAddress},
    poll::{self, SETTLE_US},
    registers::{register_block, Peripheral, RegisterBlock, RegisterWindow},
};

use super::control_block::ControlBlockHandle;

register_block!(
    /// One channel of the DMA controller.
    DmaRegisters {
        CS @ 0x00,
        CONBLK_AD @ 0x04,
        TI @ 0x08,
        SOURCE_AD @ 0x0C,
        DEST_AD @ 0x10,
        TXFR_LEN @ 0x14,
        NEXTCONBK @ 0x1C,
        DEBUG @ 0x20,
    }
);

/// AXI priority used for the PWM feed, the highest there is.
const PRIORITY: u32 = 15;

bitfield! {
    /// Image of the channel's `CS` register.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct DmaControlStatus(u32);
    impl Debug;
    pub reset, set_reset: 31;
    pub abort, set_abort: 30;
    pub disdebug, set_disdebug: 29;
    pub wait_for_outstanding_writes, set_wait_for_outstanding_writes: 28;
    pub panic_priority, set_panic_priority: 23, 20;
    pub priority, set_priority: 19, 16;
    pub error, _: 8;
    pub waiting_for_outstanding_writes, _: 6;
    pub dreq_stops_dma, _: 5;
    pub paused, _: 4;
    pub dreq, _: 3;
    pub int, set_int: 2;
    pub end, set_end: 1;
    pub active, set_active: 0;
}

bitfield! {
    /// Image of the channel's `DEBUG` register, error half.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct DmaDebug(u32);
    impl Debug;
    pub read_error, _: 2;
    pub fifo_error, _: 1;
    pub read_last_not_set_error, _: 0;
}

impl DmaDebug {
    /// Write-1-to-clear error flags.
    pub const ERROR_MASK: u32 = 0b111;

    /// Whether any error flag is set.
    pub fn has_errors(&self) -> bool {
        self.0 & Self::ERROR_MASK != 0
    }
}

/// A snapshot of the DMA channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaStatus {
    /// A transfer is in progress.
    pub active: bool,
    /// The last transfer completed.
    pub end: bool,
    /// The channel latched an error.
    pub error: bool,
    /// The error flags of the `DEBUG` register.
    pub debug: DmaDebug,
    /// The control block the channel is working on.
    pub control_block: BusAddress,
}

/// Proof that the channel is reset and no transfer reads from the render buffer.
#[must_use]
pub(crate) struct Retired(());

/// The DMA channel that copies the render buffer into the PWM FIFO.
pub(crate) struct DmaEngine<W: RegisterWindow> {
    regs: DmaRegisters<W>,
    channel: u8,
    poll: PollPolicy,
}

impl<W: RegisterWindow> DmaEngine<W> {
    pub fn new(block: RegisterBlock<W>, channel: u8, poll: PollPolicy) -> Self {
        Self {
            regs: DmaRegisters::new(block),
            channel,
            poll,
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn control_status(&self) -> DmaControlStatus {
        DmaControlStatus(self.regs.read_cs())
    }

    pub fn status(&self) -> DmaStatus {
        let cs = self.control_status();
        DmaStatus {
            active: cs.active(),
            end: cs.end(),
            error: cs.error(),
            debug: DmaDebug(self.regs.read_debug() & DmaDebug::ERROR_MASK),
            control_block: BusAddress(self.regs.read_conblk_ad()),
        }
    }

    /// Waits until the running transfer finished or failed.
    pub fn wait_complete<D: DelayNs>(&self, delay: &mut D) -> Result<(), HardwareError> {
        let regs = &self.regs;
        poll::wait_until(delay, &self.poll, Peripheral::Dma, || {
            let cs = DmaControlStatus(regs.read_cs());
            !cs.active() || cs.error()
        })?;
        Ok(())
    }

    /// Lets a running transfer drain, then resets the channel.
    ///
    /// A transfer that does not finish in time is cut off, and a transfer
    /// error is logged and cleared; neither is reported to the caller. Only
    /// a channel that stays active through the reset is an error.
    pub fn stop<D: DelayNs>(&mut self, delay: &mut D) -> Result<Retired, HardwareError> {
        if let Err(err) = self.wait_complete(delay) {
            log::warn!("{}, resetting DMA channel {} mid-transfer", err, self.channel);
        }

        let cs = self.control_status();
        if cs.error() {
            let debug = DmaDebug(self.regs.read_debug());
            log::error!(
                "DMA channel {} transfer error: CS = {:#010x}, DEBUG = {:?}",
                self.channel,
                cs.0,
                debug
            );
            log::error!(
                "    TI = {:#010x}, {:#010x} -> {:#010x}, {} bytes left, next {:#010x}",
                self.regs.read_ti(),
                self.regs.read_source_ad(),
                self.regs.read_dest_ad(),
                self.regs.read_txfr_len(),
                self.regs.read_nextconbk()
            );
        }

        let mut reset = DmaControlStatus(0);
        reset.set_reset(true);
        self.regs.write_cs(reset.0);
        delay.delay_us(SETTLE_US);

        let mut clear = DmaControlStatus(0);
        clear.set_int(true);
        clear.set_end(true);
        self.regs.write_cs(clear.0);
        self.regs.write_debug(DmaDebug::ERROR_MASK);

        ensure!(
            !self.control_status().active(),
            TimeoutSnafu {
                peripheral: Peripheral::Dma,
                polls: self.poll.max_polls,
            }
        );

        dma_barrier();
        Ok(Retired(()))
    }

    /// Starts a transfer described by `control_block`.
    pub fn start(&mut self, _retired: Retired, control_block: &ControlBlockHandle) {
        dma_barrier();
        self.regs.write_conblk_ad(control_block.bus_address().0);

        let mut cs = DmaControlStatus(0);
        cs.set_wait_for_outstanding_writes(true);
        cs.set_panic_priority(PRIORITY);
        cs.set_priority(PRIORITY);
        self.regs.write_cs(cs.0);

        cs.set_active(true);
        self.regs.write_cs(cs.0);
    }

    pub fn into_block(self) -> RegisterBlock<W> {
        self.regs.into_block()
    }
}
