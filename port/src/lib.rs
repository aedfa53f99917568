#![allow(clippy::upper_case_acronyms)]
#![cfg_attr(not(any(test)), no_std)]
#![forbid(unsafe_code)]

pub mod devcons;
pub mod fdt;
