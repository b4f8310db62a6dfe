#![no_std]
#![deny(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(test)]
extern crate std;

pub mod config;
pub mod errors;
pub mod platform;
pub mod pwm;
pub mod registers;

mod pixel;
mod pixelstream;
mod poll;

pub use config::{EngineConfig, PollPolicy, Soc, SymbolWidth, Timing};
pub use pixel::Pixel;
pub use pixelstream::{IntoPixelStream, PixelStream};
pub use pwm::{EngineState, GpioPin, PinFunction, Ws281xDriver};
