//! # DSP (Digital Signal Processing) Primitives
//!
//! The building blocks of the glitch delay, from the bottom up:
//!
//! - **`codec`**: Packs `i16` samples into 1 or 2 bytes at a chosen bit
//!   depth, and unpacks them again.
//!
//! - **`delay_buffer`**: A byte ring that stores encoded samples behind a
//!   write head. Its slot count depends on the bit depth.
//!
//! - **`play_head`**: The read position. Trails the write head by the
//!   delay time, crossfades over every jump and can be confined to a loop.
//!
//! - **`glitch`**: The freeze / glitch state machine that decides when the
//!   play head loops and where.

pub mod codec;
pub mod delay_buffer;
pub mod glitch;
pub mod play_head;
