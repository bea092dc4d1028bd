//! Catalog of registered virtual IRQs.
//!
//! The registry is the *owner* of every [`VirqHandle`]; the list-register
//! shadow and per-vCPU FIFOs (see [`crate::pipeline`]) only ever hold
//! `usize` indices into it. That sidesteps the dangling-reference class of
//! bug the original C source accepts by design (handles are never
//! unregistered today, but nothing stops a future caller from trying).

use alloc::vec;
use alloc::vec::Vec;

use crate::consts::{GIC_SPI_IRQ_MIN, MAX_VIRQS};
use crate::error::HvResult;
use crate::hv_result_err;

/// Callback invoked when a masked IRQ source should be told it may fire
/// again (see `InjectionPipeline::enable_irq`, STATE b in SPEC_FULL.md).
///
/// `token` is an opaque value threaded back to the caller, mirroring the
/// `void *token` of the original `virq_handle`.
pub type AckFn = fn(vcpu: usize, virq: u32, token: usize);

/// An immutable (after registration) record of one virtual IRQ source.
#[derive(Clone, Copy)]
pub struct VirqHandle {
    pub virq: u32,
    pub ack: AckFn,
    pub token: usize,
}

impl VirqHandle {
    pub fn new(virq: u32, ack: AckFn, token: usize) -> Self {
        Self { virq, ack, token }
    }

    /// Invoke the registered ack callback for `vcpu`.
    pub fn ack(&self, vcpu: usize) {
        (self.ack)(vcpu, self.virq, self.token);
    }
}

fn noop_ack(_vcpu: usize, _virq: u32, _token: usize) {}

/// Arena of registered [`VirqHandle`]s plus the two lookup tables SPEC_FULL.md
/// §3 calls for: a per-vCPU fixed-slot table for SGI/PPI, and a bounded
/// linear-scan table for SPI.
pub struct VirqRegistry {
    arena: Vec<VirqHandle>,
    /// `sgi_ppi[vcpu][virq]` -> index into `arena`.
    sgi_ppi: Vec<[Option<usize>; GIC_SPI_IRQ_MIN as usize]>,
    /// SPI slots -> index into `arena`. Bounded by `MAX_VIRQS - GIC_SPI_IRQ_MIN`.
    spi: Vec<Option<usize>>,
}

impl VirqRegistry {
    pub fn new(num_vcpus: usize) -> Self {
        Self {
            arena: Vec::new(),
            sgi_ppi: vec![[None; GIC_SPI_IRQ_MIN as usize]; num_vcpus],
            spi: vec![None; MAX_VIRQS - GIC_SPI_IRQ_MIN as usize],
        }
    }

    /// Register `handle` for `vcpu`. SGI/PPI registration fails if the
    /// (vcpu, virq) slot is already taken (I1). SPI registration scans for
    /// a free slot and fails if the table is full (I2); per O4 it does
    /// *not* check whether `handle.virq` is already registered elsewhere in
    /// the SPI table — callers must not double-register the same SPI.
    pub fn register(&mut self, vcpu: usize, handle: VirqHandle) -> HvResult<()> {
        if handle.virq < GIC_SPI_IRQ_MIN {
            let slot = &mut self.sgi_ppi[vcpu][handle.virq as usize];
            if slot.is_some() {
                return hv_result_err!(SlotTaken, "vcpu {} virq {}", vcpu, handle.virq);
            }
            let idx = self.arena.len();
            self.arena.push(handle);
            *slot = Some(idx);
            Ok(())
        } else {
            let free = self.spi.iter().position(Option::is_none);
            match free {
                Some(i) => {
                    let idx = self.arena.len();
                    self.arena.push(handle);
                    self.spi[i] = Some(idx);
                    Ok(())
                }
                None => hv_result_err!(RegistryFull, "no free SPI slot for virq {}", handle.virq),
            }
        }
    }

    /// Fetch a handle directly by arena index, used by [`crate::pipeline`]
    /// consumers that only ever stored the index, never the handle.
    pub(crate) fn handle_at(&self, idx: usize) -> VirqHandle {
        self.arena[idx]
    }

    /// O(1) for SGI/PPI, O(MAX_VIRQS) linear scan for SPI.
    pub fn lookup(&self, vcpu: usize, virq: u32) -> Option<VirqHandle> {
        self.lookup_idx(vcpu, virq).map(|idx| self.arena[idx])
    }

    /// Same as [`Self::lookup`] but returns the arena index, which is what
    /// [`crate::pipeline::LrShadow`] and [`crate::pipeline::IrqQueue`] store.
    pub(crate) fn lookup_idx(&self, vcpu: usize, virq: u32) -> Option<usize> {
        if virq < GIC_SPI_IRQ_MIN {
            self.sgi_ppi[vcpu][virq as usize]
        } else {
            self.spi.iter().filter_map(|slot| *slot).find(|&idx| self.arena[idx].virq == virq)
        }
    }
}

/// A handle with a no-op ack callback, useful for tests and for sources
/// that never need to be woken (e.g. SGIs, which are always enabled).
pub fn handle_without_ack(virq: u32) -> VirqHandle {
    VirqHandle::new(virq, noop_ack, 0)
}
