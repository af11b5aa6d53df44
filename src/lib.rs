//! An embeddable RV64IM virtual machine.
//!
//! Provides a fixed 64 KiB byte-addressable memory arena, 32 general-purpose
//! registers, a pure instruction decoder and a synchronous
//! fetch-decode-execute interpreter with host-registered environment calls.

pub mod utils;
pub mod virtual_machine;

#[cfg(test)]
mod test_utils;
