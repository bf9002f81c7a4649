//! # QUARRY Shared
//!
//! Primitive types used by the enchant engine and by whatever host embeds it.
//!
//! ## CRITICAL RULE
//!
//! This crate holds data, not behavior. It must never depend on the engine
//! crate, on an RNG, or on any I/O.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod math;
pub mod types;

pub use constants::blocks;
pub use math::{BlockPos, Vec3};
pub use types::{Amount, BlockKind, ItemId, ItemStack, Millis, PlayerId, ToolHandle};
