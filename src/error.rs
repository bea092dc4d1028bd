//! Crate-wide error type.
//!
//! Mirrors the `HvResult` / `hv_result_err!` idiom used throughout the
//! surrounding hypervisor: a small enum of named failure kinds instead of
//! the `-1` / `NULL` returns of the original C implementation, with a
//! macro for building an `Err` at the call site without repeating the
//! constructor.

use core::fmt;

/// Result alias used for every fallible operation in this crate.
pub type HvResult<T = ()> = Result<T, HvError>;

/// Failure kinds the vGIC core can report.
///
/// Guest-visible failures (everything except [`HvError::QueueOverflow`] and
/// [`HvError::HvLoadListReg`]) are handled entirely within the MMIO path: the
/// fault is still advanced so the guest makes progress (see `mmio::Fault`).
/// Only the two invariant-violation kinds are meant to propagate to the
/// embedding hypervisor as a hard fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HvError {
    /// The SPI table has no free slot left for a new registration.
    RegistryFull,
    /// The (vcpu, virq) SGI/PPI slot already holds a handle.
    SlotTaken,
    /// No `VirqHandle` is registered for this (vcpu, virq) pair.
    NotRegistered,
    /// The IRQ is not enabled on the target vCPU.
    Masked,
    /// The distributor's global enable bit (CTLR) is clear.
    DistributorDisabled,
    /// The per-vCPU overflow FIFO is full. This is always a bug: the FIFO is
    /// sized generously and overflow means a maintenance path is stuck.
    QueueOverflow,
    /// The trapped access does not correspond to any known register.
    UnknownRegister,
    /// A register encoding this core does not understand (e.g. an SGIR
    /// target-list-filter value other than SPEC/OTHERS/SELF).
    BadEncoding,
    /// The `HvOps::load_list_reg` primitive itself failed.
    HvLoadListReg,
    /// The supplied [`crate::config::VgicConfig`] is not usable.
    InvalidConfig,
}

impl fmt::Display for HvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            HvError::RegistryFull => "SPI registry is full",
            HvError::SlotTaken => "SGI/PPI slot already registered",
            HvError::NotRegistered => "vIRQ has no registered handle",
            HvError::Masked => "vIRQ is disabled on this vCPU",
            HvError::DistributorDisabled => "distributor is globally disabled",
            HvError::QueueOverflow => "per-vCPU overflow FIFO is full",
            HvError::UnknownRegister => "unknown distributor register offset",
            HvError::BadEncoding => "unrecognized register encoding",
            HvError::HvLoadListReg => "hypervisor list-register load failed",
            HvError::InvalidConfig => "invalid vGIC configuration",
        };
        f.write_str(msg)
    }
}

/// Build an `Err(HvError::$kind)`, logging at `error!` level first.
///
/// ```ignore
/// return hv_result_err!(QueueOverflow, "vcpu {} irq {}", vcpu, irq);
/// ```
#[macro_export]
macro_rules! hv_result_err {
    ($kind: ident) => {{
        log::error!("{}", $crate::error::HvError::$kind);
        Err($crate::error::HvError::$kind)
    }};
    ($kind: ident, $($arg: tt)+) => {{
        log::error!("{}: {}", $crate::error::HvError::$kind, format_args!($($arg)+));
        Err($crate::error::HvError::$kind)
    }};
}
