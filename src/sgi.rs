//! SGIR (0xF00) decode and SGI fan-out.
//!
//! Field layout mirrors the GICv2 architecture spec: bits [25:24] select the
//! targeting mode, [23:16] carry an explicit CPU target list when the mode is
//! `Specified`, and [3:0] carry the SGI's vIRQ number. Decoding the bitfield
//! with `tock-registers` instead of hand-rolled shifts matches how the
//! surrounding hypervisor reads wire-format register values elsewhere.

use numeric_enum_macro::numeric_enum;
use tock_registers::fields::FieldValue;
use tock_registers::interfaces::Readable;
use tock_registers::registers::InMemoryRegister;
use tock_registers::register_bitfields;

use crate::error::HvResult;
use crate::hv_result_err;

register_bitfields![u32,
    pub SGIR [
        TARGET_LIST_FILTER OFFSET(24) NUMBITS(2) [],
        CPU_TARGET_LIST OFFSET(16) NUMBITS(8) [],
        SGI_INTID OFFSET(0) NUMBITS(4) [],
    ]
];

numeric_enum! {
    #[repr(u32)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// SGIR\[25:24\]: how the CPU target list is computed.
    pub enum TargetListFilter {
        /// Forward only to the vCPUs named in `CPU_TARGET_LIST`.
        Specified = 0b00,
        /// Forward to every vCPU except the sender.
        AllOthers = 0b01,
        /// Forward only to the sender.
        SelfOnly = 0b10,
    }
}

/// A decoded SGIR write.
pub struct SgiGenerate {
    pub filter: TargetListFilter,
    pub cpu_target_list: u8,
    pub virq: u32,
}

/// Decode a raw SGIR value, or report [`crate::error::HvError::BadEncoding`]
/// if bits [25:24] hold the one filter value (0b11) the architecture leaves
/// reserved.
pub fn decode(raw: u32) -> HvResult<SgiGenerate> {
    let reg: InMemoryRegister<u32, SGIR::Register> = InMemoryRegister::new(raw);
    let filter = match reg.read(SGIR::TARGET_LIST_FILTER) {
        0b00 => TargetListFilter::Specified,
        0b01 => TargetListFilter::AllOthers,
        0b10 => TargetListFilter::SelfOnly,
        other => return hv_result_err!(BadEncoding, "reserved SGIR target-list-filter {:#04b}", other),
    };
    Ok(SgiGenerate {
        filter,
        cpu_target_list: reg.read(SGIR::CPU_TARGET_LIST) as u8,
        virq: reg.read(SGIR::SGI_INTID),
    })
}

/// Encode an SGIR value back, used only so `sgi_control` read-back matches
/// what was written (this core never synthesizes SGIR writes itself).
pub fn encode(gen: &SgiGenerate) -> u32 {
    let filter_value: FieldValue<u32, SGIR::Register> = SGIR::TARGET_LIST_FILTER.val(gen.filter as u32);
    let targets: FieldValue<u32, SGIR::Register> = SGIR::CPU_TARGET_LIST.val(gen.cpu_target_list as u32);
    let intid: FieldValue<u32, SGIR::Register> = SGIR::SGI_INTID.val(gen.virq);
    (filter_value + targets + intid).value
}

/// Resolve which vCPUs a decoded SGIR write should fan out to.
///
/// `sender` is the vCPU whose MMIO trap produced this write; `num_vcpus` is
/// the distributor's configured vCPU count.
pub fn target_vcpus(gen: &SgiGenerate, sender: usize, num_vcpus: usize) -> alloc::vec::Vec<usize> {
    use alloc::vec::Vec;
    match gen.filter {
        TargetListFilter::Specified => (0..num_vcpus).filter(|&v| gen.cpu_target_list & (1 << v) != 0).collect(),
        TargetListFilter::AllOthers => (0..num_vcpus).filter(|&v| v != sender).collect(),
        TargetListFilter::SelfOnly => { let mut v = Vec::with_capacity(1); v.push(sender); v }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_specified_target_list() {
        let raw = (0b00u32 << 24) | (0b0000_0101 << 16) | 7;
        let gen = decode(raw).unwrap();
        assert_eq!(gen.filter, TargetListFilter::Specified);
        assert_eq!(gen.cpu_target_list, 0b0000_0101);
        assert_eq!(gen.virq, 7);
    }

    #[test]
    fn reserved_filter_is_bad_encoding() {
        let raw = 0b11u32 << 24;
        let err = decode(raw).unwrap_err();
        assert_eq!(err, crate::error::HvError::BadEncoding);
    }

    #[test]
    fn all_others_excludes_sender() {
        let gen = SgiGenerate { filter: TargetListFilter::AllOthers, cpu_target_list: 0, virq: 1 };
        let targets = target_vcpus(&gen, 1, 4);
        assert_eq!(targets, alloc::vec![0, 2, 3]);
    }

    #[test]
    fn self_only_targets_sender() {
        let gen = SgiGenerate { filter: TargetListFilter::SelfOnly, cpu_target_list: 0, virq: 1 };
        assert_eq!(target_vcpus(&gen, 2, 4), alloc::vec![2]);
    }
}
