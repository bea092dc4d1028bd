//! Per-vCPU list-register shadow and overflow FIFO.
//!
//! This module only owns the bookkeeping structures from SPEC_FULL.md §3
//! (`LrShadow`, `IrqQueue`); the orchestration that ties them to
//! [`crate::dist_state::DistState`] and [`crate::registry::VirqRegistry`]
//! lives in [`crate::gic`], the same way the original C source's
//! `vgic_dist_set_pending_irq` and friends take the whole `vgic_t *vgic`
//! rather than being methods on the queue itself.
//!
//! Both structures store [`crate::registry::VirqRegistry`] arena indices,
//! never the handles themselves (see registry.rs's module doc).

use alloc::vec;
use alloc::vec::Vec;

use crate::consts::{MAX_IRQ_QUEUE_LEN, NUM_LIST_REGS};
use crate::error::HvResult;
use crate::hv_result_err;

fn next(i: usize) -> usize {
    (i + 1) & (MAX_IRQ_QUEUE_LEN - 1)
}

/// Bounded circular FIFO of overflow vIRQs for one vCPU.
///
/// Empty iff `head == tail`; full iff `next(tail) == head` (one slot is
/// always reserved so the two conditions stay distinguishable).
pub struct IrqQueue {
    buf: Vec<Option<usize>>,
    head: usize,
    tail: usize,
}

impl IrqQueue {
    pub fn new() -> Self {
        debug_assert!(MAX_IRQ_QUEUE_LEN.is_power_of_two());
        Self {
            buf: vec![None; MAX_IRQ_QUEUE_LEN],
            head: 0,
            tail: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        next(self.tail) == self.head
    }

    /// Push `idx` (a registry arena index) onto the tail.
    pub fn enqueue(&mut self, idx: usize) -> HvResult<()> {
        if self.is_full() {
            return hv_result_err!(QueueOverflow);
        }
        self.buf[self.tail] = Some(idx);
        self.tail = next(self.tail);
        Ok(())
    }

    /// Pop the oldest entry, if any.
    pub fn dequeue(&mut self) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let idx = self.buf[self.head].take();
        self.head = next(self.head);
        idx
    }
}

impl Default for IrqQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-vCPU shadow of the hardware list registers: which registry index (if
/// any) currently occupies each of the `NUM_LIST_REGS` physical slots.
pub struct LrShadow {
    slots: [Option<usize>; NUM_LIST_REGS],
}

impl LrShadow {
    pub fn new() -> Self {
        Self {
            slots: [None; NUM_LIST_REGS],
        }
    }

    /// First free slot, ascending index (the LR-allocation policy SPEC_FULL.md
    /// §4.3 specifies; no priority tie-break).
    pub fn find_empty(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    pub fn occupy(&mut self, lr_index: usize, idx: usize) {
        self.slots[lr_index] = Some(idx);
    }

    pub fn free(&mut self, lr_index: usize) -> Option<usize> {
        self.slots[lr_index].take()
    }

    pub fn get(&self, lr_index: usize) -> Option<usize> {
        self.slots[lr_index]
    }
}

impl Default for LrShadow {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects one [`LrShadow`] and one [`IrqQueue`] per vCPU.
pub struct InjectionPipeline {
    lr_shadow: Vec<LrShadow>,
    queues: Vec<IrqQueue>,
}

impl InjectionPipeline {
    pub fn new(num_vcpus: usize) -> Self {
        Self {
            lr_shadow: (0..num_vcpus).map(|_| LrShadow::new()).collect(),
            queues: (0..num_vcpus).map(|_| IrqQueue::new()).collect(),
        }
    }

    pub fn lr_shadow(&self, vcpu: usize) -> &LrShadow {
        &self.lr_shadow[vcpu]
    }

    pub fn lr_shadow_mut(&mut self, vcpu: usize) -> &mut LrShadow {
        &mut self.lr_shadow[vcpu]
    }

    pub fn queue(&self, vcpu: usize) -> &IrqQueue {
        &self.queues[vcpu]
    }

    pub fn queue_mut(&mut self, vcpu: usize) -> &mut IrqQueue {
        &mut self.queues[vcpu]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_is_fifo() {
        let mut q = IrqQueue::new();
        q.enqueue(10).unwrap();
        q.enqueue(20).unwrap();
        assert_eq!(q.dequeue(), Some(10));
        assert_eq!(q.dequeue(), Some(20));
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn queue_overflow_is_fatal() {
        let mut q = IrqQueue::new();
        for i in 0..MAX_IRQ_QUEUE_LEN - 1 {
            q.enqueue(i).unwrap();
        }
        assert!(q.is_full());
        let err = q.enqueue(999).unwrap_err();
        assert_eq!(err, crate::error::HvError::QueueOverflow);
    }

    #[test]
    fn lr_shadow_allocates_ascending() {
        let mut lrs = LrShadow::new();
        assert_eq!(lrs.find_empty(), Some(0));
        lrs.occupy(0, 7);
        assert_eq!(lrs.find_empty(), Some(1));
        lrs.free(0);
        assert_eq!(lrs.find_empty(), Some(0));
    }
}
