//! Virtual ARM GICv2 distributor core.
//!
//! This crate emulates the GICv2 distributor register file and the
//! list-register injection pipeline a type-1 hypervisor needs to deliver
//! virtual interrupts to its guests. It owns no hardware: MMIO decode,
//! register semantics and the overflow FIFO are all here, but programming
//! the real list registers, scheduling vCPUs and parsing a device tree stay
//! with the embedding hypervisor (see [`gic::HvOps`]).
//!
//! Module map:
//! - [`error`] - the crate-wide `HvResult`/`HvError` pair.
//! - [`logging`] - a sink-injectable `log` backend.
//! - [`consts`] - sizing constants and the MMIO offset table.
//! - [`config`] - validated distributor sizing ([`config::VgicConfig`]).
//! - [`dist_state`] - the logical register file ([`dist_state::DistState`]).
//! - [`registry`] - the vIRQ source catalog ([`registry::VirqRegistry`]).
//! - [`pipeline`] - list-register shadow + overflow FIFO ([`pipeline::InjectionPipeline`]).
//! - [`mmio`] - fault decode ([`mmio::Fault`], [`mmio::decode_offset`]).
//! - [`sgi`] - SGIR decode and target-list fan-out.
//! - [`gic`] - the composed [`gic::VirtualGic`] entry point.
#![no_std]

extern crate alloc;

pub mod config;
pub mod consts;
pub mod dist_state;
pub mod error;
pub mod gic;
pub mod logging;
pub mod mmio;
pub mod pipeline;
pub mod registry;
pub mod sgi;

pub use config::VgicConfig;
pub use error::{HvError, HvResult};
pub use gic::{HvOps, VirtualGic};
pub use mmio::Fault;
pub use registry::VirqHandle;
