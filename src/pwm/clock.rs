// Accessors generated by `bitfield!` carry no doc comments.
#![allow(missing_docs)]

use bitfield::bitfield;
use embedded_hal::delay::DelayNs;

use crate::{
    config::PollPolicy,
    errors::HardwareError,
    poll::{self, SETTLE_US},
    registers::{register_block, Peripheral, RegisterBlock, RegisterWindow},
};

register_block!(
    /// `CM_PWMCTL` and `CM_PWMDIV`.
    ClockRegisters {
        CTL @ 0x00,
        DIV @ 0x04,
    }
);

/// Every clock manager write must carry this in bits 31..24.
const CM_PASSWORD: u32 = 0x5A;

/// `SRC` value of the 19.2 MHz crystal oscillator.
const CM_SRC_OSCILLATOR: u32 = 1;

/// Largest integer divisor `DIVI` can hold.
pub(crate) const MAX_DIVISOR: u32 = 0xFFF;

bitfield! {
    /// Image of `CM_PWMCTL`.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct ClockControl(u32);
    impl Debug;
    pub passwd, set_passwd: 31, 24;
    pub mash, set_mash: 10, 9;
    pub flip, set_flip: 8;
    pub busy, _: 7;
    pub kill, set_kill: 5;
    pub enab, set_enab: 4;
    pub src, set_src: 3, 0;
}

bitfield! {
    /// Image of `CM_PWMDIV`.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct ClockDivisor(u32);
    impl Debug;
    pub passwd, set_passwd: 31, 24;
    pub divi, set_divi: 23, 12;
    pub divf, set_divf: 11, 0;
}

/// Proof that the generator is disabled and no longer busy.
#[must_use]
pub(crate) struct Settled(());

/// Proof that divisor and source are programmed while the generator was settled.
#[must_use]
pub(crate) struct Programmed(());

/// The PWM clock generator.
///
/// The clock manager ignores writes without the password, and it must never
/// see a divisor or source change while it is enabled or still busy. Those
/// rules are encoded in the token types: [`program`](Self::program) needs a
/// [`Settled`] that only [`stop`](Self::stop) hands out, and
/// [`enable`](Self::enable) needs the resulting [`Programmed`].
pub(crate) struct ClockGenerator<W: RegisterWindow> {
    regs: ClockRegisters<W>,
    poll: PollPolicy,
}

impl<W: RegisterWindow> ClockGenerator<W> {
    pub fn new(block: RegisterBlock<W>, poll: PollPolicy) -> Self {
        Self {
            regs: ClockRegisters::new(block),
            poll,
        }
    }

    pub fn control(&self) -> ClockControl {
        ClockControl(self.regs.read_ctl())
    }

    pub fn divisor(&self) -> ClockDivisor {
        ClockDivisor(self.regs.read_div())
    }

    fn write_control(&mut self, mut ctl: ClockControl) {
        ctl.set_passwd(CM_PASSWORD);
        self.regs.write_ctl(ctl.0);
    }

    fn wait_busy<D: DelayNs>(&self, delay: &mut D, busy: bool) -> Result<u32, HardwareError> {
        let regs = &self.regs;
        poll::wait_until(delay, &self.poll, Peripheral::ClockManager, || {
            ClockControl(regs.read_ctl()).busy() == busy
        })
    }

    /// Disables the generator and waits until it stopped.
    ///
    /// Falls back to `KILL` if the generator does not stop on its own.
    /// Calling this on a stopped generator only confirms it is not busy.
    pub fn stop<D: DelayNs>(&mut self, delay: &mut D) -> Result<Settled, HardwareError> {
        let mut ctl = self.control();
        if ctl.enab() {
            ctl.set_enab(false);
            self.write_control(ctl);
            delay.delay_us(SETTLE_US);
        }

        if let Err(err) = self.wait_busy(delay, false) {
            log::warn!("{}, killing the PWM clock", err);

            let mut ctl = self.control();
            ctl.set_enab(false);
            ctl.set_kill(true);
            self.write_control(ctl);
            let killed = self.wait_busy(delay, false);

            ctl.set_kill(false);
            self.write_control(ctl);
            killed?;
        }

        Ok(Settled(()))
    }

    /// Programs the integer divisor and selects the oscillator, without MASH filtering.
    pub fn program(&mut self, _settled: Settled, divisor: u32) -> Programmed {
        assert!(
            (1..=MAX_DIVISOR).contains(&divisor),
            "PWM clock divisor out of range"
        );

        let mut div = ClockDivisor(0);
        div.set_passwd(CM_PASSWORD);
        div.set_divi(divisor);
        div.set_divf(0);
        self.regs.write_div(div.0);

        let mut ctl = ClockControl(0);
        ctl.set_mash(0);
        ctl.set_src(CM_SRC_OSCILLATOR);
        self.write_control(ctl);

        Programmed(())
    }

    /// Enables the generator and waits until it runs.
    pub fn enable<D: DelayNs>(
        &mut self,
        _programmed: Programmed,
        delay: &mut D,
    ) -> Result<(), HardwareError> {
        let mut ctl = self.control();
        ctl.set_src(CM_SRC_OSCILLATOR);
        ctl.set_enab(true);
        self.write_control(ctl);

        delay.delay_us(SETTLE_US);
        self.wait_busy(delay, true)?;
        Ok(())
    }

    /// Runs the PWM clock at `oscillator / divisor`.
    pub fn configure<D: DelayNs>(
        &mut self,
        divisor: u32,
        delay: &mut D,
    ) -> Result<(), HardwareError> {
        let settled = self.stop(delay)?;
        let programmed = self.program(settled, divisor);
        self.enable(programmed, delay)?;

        log::debug!(
            "PWM clock running: CM_PWMCTL = {:#010x}, CM_PWMDIV = {:#010x}",
            self.control().0,
            self.divisor().0
        );
        Ok(())
    }

    pub fn into_block(self) -> RegisterBlock<W> {
        self.regs.into_block()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::fake::{self, FakeWindow, NoDelay};

    const BUSY: u32 = 1 << 7;
    const KILL: u32 = 1 << 5;
    const ENAB: u32 = 1 << 4;

    /// Busy follows the enable bit; writes without password are dropped.
    fn responsive(regs: &mut [u32], offset: usize, value: u32) {
        if value >> 24 != CM_PASSWORD {
            return;
        }
        let value = value & 0x00FF_FFFF;
        match offset {
            0x00 => {
                let busy = if value & (ENAB | KILL) == ENAB { BUSY } else { 0 };
                regs[0] = (value & !BUSY) | busy;
            }
            _ => regs[1] = value,
        }
    }

    /// Ignores a plain disable; only KILL clears busy.
    fn stuck_until_killed(regs: &mut [u32], offset: usize, value: u32) {
        let value = value & 0x00FF_FFFF;
        if offset == 0x00 {
            let busy = if value & KILL != 0 {
                0
            } else if value & ENAB != 0 {
                BUSY
            } else {
                regs[0] & BUSY
            };
            regs[0] = (value & !BUSY) | busy;
        }
    }

    /// Never reports busy, as if the generator had no input clock.
    fn never_starts(regs: &mut [u32], offset: usize, value: u32) {
        if offset == 0x00 {
            regs[0] = value & 0x00FF_FFFF & !BUSY;
        }
    }

    fn generator(hook: fake::WriteHook) -> ClockGenerator<FakeWindow> {
        ClockGenerator::new(
            fake::block(
                Peripheral::ClockManager,
                FakeWindow::with_hook(Peripheral::ClockManager.size(), hook),
            ),
            PollPolicy {
                interval_us: 10,
                max_polls: 50,
            },
        )
    }

    #[test]
    fn configure_programs_divisor_before_enabling() {
        let mut clock = generator(responsive);
        clock.configure(8, &mut NoDelay::default()).unwrap();

        assert!(clock.control().enab());
        assert!(clock.control().busy());
        assert_eq!(clock.control().src(), CM_SRC_OSCILLATOR);
        assert_eq!(clock.control().mash(), 0);
        assert_eq!(clock.divisor().divi(), 8);

        let writes = clock.into_block().into_window().writes;
        let div_write = writes.iter().position(|&(o, _)| o == 0x04).unwrap();
        let enable_write = writes
            .iter()
            .position(|&(o, v)| o == 0x00 && v & ENAB != 0)
            .unwrap();
        assert!(div_write < enable_write);
        assert!(writes.iter().all(|&(_, v)| v >> 24 == CM_PASSWORD));
    }

    #[test]
    fn stop_is_idempotent() {
        let mut clock = generator(responsive);
        let mut delay = NoDelay::default();
        clock.configure(8, &mut delay).unwrap();

        let _ = clock.stop(&mut delay).unwrap();
        let after_first = clock.control();
        let _ = clock.stop(&mut delay).unwrap();

        assert_eq!(clock.control(), after_first);
        assert!(!after_first.enab());
        assert!(!after_first.busy());
    }

    #[test]
    fn stop_on_a_stopped_clock_writes_nothing() {
        let mut clock = generator(responsive);
        let _ = clock.stop(&mut NoDelay::default()).unwrap();
        assert!(clock.into_block().into_window().writes.is_empty());
    }

    #[test]
    fn stop_falls_back_to_kill() {
        let mut clock = generator(stuck_until_killed);
        clock
            .regs
            .write_ctl(CM_PASSWORD << 24 | ENAB | CM_SRC_OSCILLATOR);
        assert!(clock.control().busy());

        let _ = clock.stop(&mut NoDelay::default()).unwrap();
        assert!(!clock.control().busy());

        let writes = clock.into_block().into_window().writes;
        assert!(writes.iter().any(|&(_, v)| v & KILL != 0));
        assert_eq!(writes.last().unwrap().1 & KILL, 0);
    }

    #[test]
    fn clock_that_never_starts_times_out() {
        let mut clock = generator(never_starts);
        let err = clock.configure(8, &mut NoDelay::default()).err().unwrap();
        assert!(matches!(
            err,
            HardwareError::Timeout {
                peripheral: Peripheral::ClockManager,
                polls: 50
            }
        ));
    }
}
