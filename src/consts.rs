//! Sizing constants and MMIO register offsets for the GICv2 distributor.
//!
//! Names mirror the ARM Generic Interrupt Controller Architecture
//! Specification (GICv2) so the offset table in [`crate::mmio`] reads the
//! same way the spec's register map does.

/// Number of Software-Generated Interrupts (IDs 0..15), banked per vCPU.
pub const NUM_SGI_VIRQS: u32 = 16;
/// Number of Private Peripheral Interrupts (IDs 16..31), banked per vCPU.
pub const NUM_PPI_VIRQS: u32 = 16;
/// First vIRQ number that is a Shared Peripheral Interrupt (global, not banked).
pub const GIC_SPI_IRQ_MIN: u32 = NUM_SGI_VIRQS + NUM_PPI_VIRQS;
/// Upper bound (exclusive) on any vIRQ number this distributor can represent.
pub const MAX_VIRQS: usize = 200;

/// Number of physical list registers per vCPU. A typical GICv2 implementation
/// exposes four; the true count is implementation-defined and in practice
/// probed by the hypervisor, but the core needs a fixed number at build time.
pub const NUM_LIST_REGS: usize = 4;
/// Depth of the per-vCPU overflow FIFO. Must be a power of two: one slot is
/// always reserved so that `head == tail` unambiguously means "empty".
pub const MAX_IRQ_QUEUE_LEN: usize = 64;

/// Value written to CTLR to enable the distributor.
pub const GIC_ENABLED: u32 = 1;

const fn max_spi_words() -> usize {
    (MAX_VIRQS - GIC_SPI_IRQ_MIN as usize + 31) / 32
}

/// Number of 32-bit words needed to cover all implemented SPIs in a
/// bitmap register (ISENABLER1.., ISPENDR1.., ...).
pub const SPI_BITMAP_WORDS: usize = max_spi_words();

/// Number of bytes needed to cover all implemented SPIs in a per-IRQ byte
/// register (IPRIORITYR, ITARGETSR beyond the banked first 32 bytes).
pub const SPI_BYTE_REGS: usize = MAX_VIRQS - GIC_SPI_IRQ_MIN as usize;

// --- Distributor MMIO register offsets (relative to the distributor base) ---

pub const CTLR: usize = 0x000;
pub const TYPER: usize = 0x004;
pub const IIDR: usize = 0x008;

pub const IGROUPR0: usize = 0x080;
pub const IGROUPR1: usize = 0x084;
pub const IGROUPRN: usize = 0x0FC;

pub const ISENABLER0: usize = 0x100;
pub const ISENABLER1: usize = 0x104;
pub const ISENABLERN: usize = 0x17C;

pub const ICENABLER0: usize = 0x180;
pub const ICENABLER1: usize = 0x184;
pub const ICENABLERN: usize = 0x1FC;

pub const ISPENDR0: usize = 0x200;
pub const ISPENDR1: usize = 0x204;
pub const ISPENDRN: usize = 0x27C;

pub const ICPENDR0: usize = 0x280;
pub const ICPENDR1: usize = 0x284;
pub const ICPENDRN: usize = 0x2FC;

pub const ISACTIVER0: usize = 0x300;
pub const ISACTIVER1: usize = 0x304;
pub const ISACTIVERN: usize = 0x37C;

pub const ICACTIVER0: usize = 0x380;
pub const ICACTIVER1: usize = 0x384;
pub const ICACTIVERN: usize = 0x3FC;

pub const IPRIORITYR0: usize = 0x400;
pub const IPRIORITYR7: usize = 0x41C;
pub const IPRIORITYR8: usize = 0x420;
pub const IPRIORITYRN: usize = 0x7F8;

pub const ITARGETSR0: usize = 0x800;
pub const ITARGETSR7: usize = 0x81C;
pub const ITARGETSR8: usize = 0x820;
pub const ITARGETSRN: usize = 0xBF8;

pub const ICFGR0: usize = 0xC00;
pub const ICFGRN: usize = 0xCFC;

pub const SPI_CONFIG_START: usize = 0xD00;
pub const SPI_CONFIG_END: usize = 0xDE4;

pub const SGIR: usize = 0xF00;

pub const CPENDSGIR0: usize = 0xF10;
pub const SPENDSGIRN: usize = 0xF2C;

pub const PERIPH_ID_START: usize = 0xFC0;
pub const PERIPH_ID_END: usize = 0xFFB;

// --- Reserved / implementation-defined ranges ---
//
// The GICv2 architecture spec calls these out as distinct from genuinely
// unmapped offsets: RAZ/WI, no fault. Kept separate from `RegAccess::Unknown`
// so the decoder doesn't log an error for an access the hardware itself
// defines as silently inert.
pub const RESERVED_0_START: usize = 0x00C;
pub const RESERVED_0_END: usize = 0x01C;
pub const RESERVED_1_START: usize = 0x020;
pub const RESERVED_1_END: usize = 0x03C;
pub const RESERVED_2_START: usize = 0x040;
pub const RESERVED_2_END: usize = 0x07C;
pub const RESERVED_PRIORITY_TAIL: usize = 0x7FC;
pub const RESERVED_TARGETS_TAIL: usize = 0xBFC;
/// 0xDE8..0xEFC, including the non-secure access control registers (NSACR);
/// NSACR is itself a non-goal (§1), so this core never decodes it separately.
pub const RESERVED_NSACR_START: usize = 0xDE8;
pub const RESERVED_NSACR_END: usize = 0xEFC;
pub const RESERVED_SGIR_TAIL_START: usize = 0xF04;
pub const RESERVED_SGIR_TAIL_END: usize = 0xF0C;
pub const RESERVED_PRE_PERIPH_ID_START: usize = 0xF30;
pub const RESERVED_PRE_PERIPH_ID_END: usize = 0xFBC;

/// Number of 32-bit words in the read-only peripheral-ID block.
pub const PERIPH_ID_WORDS: usize = (PERIPH_ID_END - PERIPH_ID_START + 1).div_ceil(4);

/// Number of 32-bit words in the read/write SPI configuration block.
pub const SPI_CONFIG_WORDS: usize = (SPI_CONFIG_END - SPI_CONFIG_START) / 4 + 1;
