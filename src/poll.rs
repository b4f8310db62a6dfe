use embedded_hal::delay::DelayNs;
use snafu::prelude::*;

use crate::{
    config::PollPolicy,
    errors::{HardwareError, TimeoutSnafu},
    registers::Peripheral,
};

/// Settle time after clock manager and DMA state changes.
pub(crate) const SETTLE_US: u32 = 10;

/// Busy-waits until `condition` holds, reading at most `policy.max_polls` times.
///
/// Returns the number of delays it took.
pub(crate) fn wait_until<D: DelayNs>(
    delay: &mut D,
    policy: &PollPolicy,
    peripheral: Peripheral,
    mut condition: impl FnMut() -> bool,
) -> Result<u32, HardwareError> {
    for polls in 0..policy.max_polls {
        if condition() {
            return Ok(polls);
        }
        delay.delay_us(policy.interval_us);
    }

    ensure!(
        condition(),
        TimeoutSnafu {
            peripheral,
            polls: policy.max_polls,
        }
    );
    Ok(policy.max_polls)
}
