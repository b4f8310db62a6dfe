use crate::registers::{register_block, RegisterBlock, RegisterWindow};

register_block!(
    /// The six GPIO function select registers, 3 bits per pin.
    GpioRegisters {
        GPFSEL0 @ 0x00,
        GPFSEL1 @ 0x04,
        GPFSEL2 @ 0x08,
        GPFSEL3 @ 0x0C,
        GPFSEL4 @ 0x10,
        GPFSEL5 @ 0x14,
    }
);

const PINS_PER_FSEL: u8 = 10;
const FSEL_BITS: u8 = 3;
const FSEL_MASK: u32 = 0b111;

/// A BCM2835 GPIO pin number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpioPin(u8);

impl GpioPin {
    /// Number of GPIO pins on the SoC.
    pub const COUNT: u8 = 54;

    /// GPIO 12, PWM0 on [`PinFunction::Alt0`].
    pub const GPIO12: GpioPin = GpioPin(12);
    /// GPIO 18, PWM0 on [`PinFunction::Alt5`]. Pin 12 of the Pi header.
    pub const GPIO18: GpioPin = GpioPin(18);
    /// GPIO 40, PWM0 on [`PinFunction::Alt0`]. Wired to the audio jack.
    pub const GPIO40: GpioPin = GpioPin(40);
    /// GPIO 52, PWM0 on [`PinFunction::Alt1`].
    pub const GPIO52: GpioPin = GpioPin(52);

    /// Every pin that can carry PWM channel 1, with the function that routes it.
    pub const PWM0_ROUTES: [(GpioPin, PinFunction); 4] = [
        (Self::GPIO12, PinFunction::Alt0),
        (Self::GPIO18, PinFunction::Alt5),
        (Self::GPIO40, PinFunction::Alt0),
        (Self::GPIO52, PinFunction::Alt1),
    ];

    /// Creates a pin.
    ///
    /// # Panics
    ///
    /// If `number` is not below [`GpioPin::COUNT`].
    pub const fn new(number: u8) -> Self {
        assert!(number < Self::COUNT, "GPIO pin out of range");
        Self(number)
    }

    /// The pin number.
    pub const fn number(self) -> u8 {
        self.0
    }

    /// Whether `function` routes PWM channel 1 to this pin.
    pub fn carries_pwm0(self, function: PinFunction) -> bool {
        Self::PWM0_ROUTES.contains(&(self, function))
    }

    const fn fsel_index(self) -> usize {
        (self.0 / PINS_PER_FSEL) as usize
    }

    const fn fsel_shift(self) -> u32 {
        ((self.0 % PINS_PER_FSEL) * FSEL_BITS) as u32
    }
}

/// Pin functions of the function select registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinFunction {
    /// Plain input.
    Input,
    /// Plain output.
    Output,
    /// Alternate function 0.
    Alt0,
    /// Alternate function 1.
    Alt1,
    /// Alternate function 2.
    Alt2,
    /// Alternate function 3.
    Alt3,
    /// Alternate function 4.
    Alt4,
    /// Alternate function 5.
    Alt5,
}

impl PinFunction {
    /// The 3-bit code of the function in `GPFSELn`.
    ///
    /// The alternate functions are not numbered in order.
    pub const fn code(self) -> u32 {
        match self {
            PinFunction::Input => 0b000,
            PinFunction::Output => 0b001,
            PinFunction::Alt0 => 0b100,
            PinFunction::Alt1 => 0b101,
            PinFunction::Alt2 => 0b110,
            PinFunction::Alt3 => 0b111,
            PinFunction::Alt4 => 0b011,
            PinFunction::Alt5 => 0b010,
        }
    }
}

pub(crate) struct GpioMux<W: RegisterWindow> {
    regs: GpioRegisters<W>,
}

impl<W: RegisterWindow> GpioMux<W> {
    pub fn new(block: RegisterBlock<W>) -> Self {
        Self {
            regs: GpioRegisters::new(block),
        }
    }

    fn fsel_offset(pin: GpioPin) -> usize {
        GpioRegisters::<W>::GPFSEL0 + 4 * pin.fsel_index()
    }

    /// Routes `function` to `pin`, leaving the other nine pins of the word untouched.
    pub fn set_function(&mut self, pin: GpioPin, function: PinFunction) {
        let offset = Self::fsel_offset(pin);
        let shift = pin.fsel_shift();

        let mut fsel = self.regs.block().read(offset);
        fsel &= !(FSEL_MASK << shift);
        fsel |= function.code() << shift;
        self.regs.block_mut().write(offset, fsel);

        log::debug!(
            "GPIO {} set to function {:?} (GPFSEL{} = {:#010x})",
            pin.number(),
            function,
            pin.fsel_index(),
            fsel
        );
    }

    /// The raw function code currently selected for `pin`.
    pub fn function_code(&self, pin: GpioPin) -> u32 {
        (self.regs.block().read(Self::fsel_offset(pin)) >> pin.fsel_shift()) & FSEL_MASK
    }

    pub fn into_block(self) -> RegisterBlock<W> {
        self.regs.into_block()
    }
}
