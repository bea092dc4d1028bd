//! vGIC sizing configuration.
//!
//! Parsing this out of a device tree or a static hypervisor config blob is
//! explicitly not this crate's job (see SPEC_FULL.md §1, "Out of scope").
//! What the core *does* own is validating whatever configuration the caller
//! hands it before trusting it to size per-vCPU tables, the way the host
//! hypervisor's `HvSystemConfig` validates a parsed config before the rest
//! of the system relies on it.

use crate::consts::{GIC_SPI_IRQ_MIN, MAX_VIRQS};
use crate::error::HvResult;
use crate::hv_result_err;

/// Distributor sizing parameters fixed for the lifetime of a [`crate::gic::VirtualGic`].
#[derive(Debug, Clone, Copy)]
pub struct VgicConfig {
    /// Number of vCPUs attached to this distributor. Must be at least 1 and
    /// fit in a 16-bit CPU target-list mask (GICv2 supports up to 8).
    pub num_vcpus: usize,
    /// Number of implemented SPIs (vIRQs >= `GIC_SPI_IRQ_MIN`). Bounded by
    /// `MAX_VIRQS - GIC_SPI_IRQ_MIN`.
    pub num_spis: usize,
    /// The distributor identification value exposed at IIDR (0x008).
    pub dist_ident: u32,
    /// Guest-physical base address of the distributor's MMIO window. The
    /// core itself never adds or subtracts this — every [`crate::mmio::Fault`]
    /// already carries an offset relative to it, computed by the hypervisor
    /// primitive that owns the trap (see SPEC_FULL.md §1, "Out of scope").
    /// Kept here purely for identification/logging, the same role it plays
    /// informing the embedding VMM's own device-tree node for this distributor.
    pub mmio_base: usize,
}

impl VgicConfig {
    /// Validate `self`, returning [`crate::error::HvError::InvalidConfig`] if
    /// the distributor cannot be built from it.
    pub fn validate(self) -> HvResult<Self> {
        if self.num_vcpus == 0 || self.num_vcpus > 8 {
            return hv_result_err!(InvalidConfig, "num_vcpus {} out of range 1..=8", self.num_vcpus);
        }
        let max_spis = MAX_VIRQS - GIC_SPI_IRQ_MIN as usize;
        if self.num_spis > max_spis {
            return hv_result_err!(
                InvalidConfig,
                "num_spis {} exceeds capacity {}",
                self.num_spis,
                max_spis
            );
        }
        log::info!(
            "vGIC distributor configured: {} vcpu(s), {} SPI(s), ident {:#x}, base {:#x}",
            self.num_vcpus,
            self.num_spis,
            self.dist_ident,
            self.mmio_base
        );
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(num_vcpus: usize, num_spis: usize) -> VgicConfig {
        VgicConfig { num_vcpus, num_spis, dist_ident: 0x4B41_0043, mmio_base: 0x0800_0000 }
    }

    #[test]
    fn zero_vcpus_is_rejected() {
        assert_eq!(cfg(0, 0).validate().unwrap_err(), crate::error::HvError::InvalidConfig);
    }

    #[test]
    fn too_many_vcpus_is_rejected() {
        assert_eq!(cfg(9, 0).validate().unwrap_err(), crate::error::HvError::InvalidConfig);
    }

    #[test]
    fn num_spis_over_capacity_is_rejected() {
        let max_spis = MAX_VIRQS - GIC_SPI_IRQ_MIN as usize;
        assert!(cfg(1, max_spis).validate().is_ok());
        assert_eq!(cfg(1, max_spis + 1).validate().unwrap_err(), crate::error::HvError::InvalidConfig);
    }
}
