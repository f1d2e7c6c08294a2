#![cfg_attr(feature = "nostd", no_std)]

#[macro_use]
extern crate logger;

pub mod iir;
pub mod lerp;
pub mod moving;
pub mod sliding;
