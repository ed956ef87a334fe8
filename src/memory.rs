//! Fenced sandbox allocator for memory testing.
//!
//! Allocations are served from a fixed arena instead of the real heap.
//! Every block is wrapped in fences, freed memory is poisoned, and the
//! arena itself sits between two untouchable barriers, so overruns,
//! underruns, double frees, leaks, and use-after-free writes all leave a
//! detectable signature. Faults are queued as [`FaultReport`]s for the
//! engine to print; the sandbox itself never touches the output layer.
//!
//! Handles are plain offsets into the arena ([`SandboxPtr`]), and all
//! reads and writes go through accessors, so a test can deliberately
//! scribble past the end of a block without undefined behavior.

use std::ops::{Add, Sub};

use thiserror::Error;

pub const FENCE_SIZE: usize = 7;
pub const BARRIER_SIZE: usize = 16;
pub const DEFAULT_LIMIT: usize = 4096;

const FENCE_HEAD: u8 = b'b';
const FENCE_TAIL: u8 = b'e';
const FILL_DIRTY: u8 = b'N';
const FILL_FREED: u8 = b'F';
const FILL_UNUSED: u8 = b'X';
const BARRIER_BYTE: u8 = 0xFF;

/// Offset of an allocation payload within the arena's usable region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SandboxPtr(pub usize);

impl Add<usize> for SandboxPtr {
    type Output = SandboxPtr;
    fn add(self, rhs: usize) -> SandboxPtr {
        SandboxPtr(self.0 + rhs)
    }
}

impl Sub<usize> for SandboxPtr {
    type Output = SandboxPtr;
    fn sub(self, rhs: usize) -> SandboxPtr {
        SandboxPtr(self.0 - rhs)
    }
}

/// One tracked allocation. `start` is the offset of the leading fence.
#[derive(Debug, Clone, Copy)]
pub struct MemoryRecord {
    pub start: usize,
    pub size: usize,
    pub freed: bool,
}

impl MemoryRecord {
    pub fn payload(&self) -> usize {
        self.start + FENCE_SIZE
    }
}

/// Everything the sandbox can catch. Display strings are the user-visible
/// error messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoryFault {
    #[error("malloc: ran out of test memory space! Increase limit from {0} bytes.")]
    OutOfSpace(usize),
    #[error("malloc: preceding fence broken")]
    PrecedingFence,
    #[error("free: invalid pointer, out of bounds")]
    FreeOutOfBounds,
    #[error("free: invalid pointer, not malloc result")]
    FreeUnknown,
    #[error("free: pointer already freed")]
    DoubleFree,
    #[error("free: broken fence")]
    FreeFence,
    #[error("realloc: broken fence")]
    ReallocFence,
    #[error("realloc: malloc failed in realloc")]
    ReallocAllocFailed,
    #[error("realloc: nothing previously allocated")]
    ReallocNothing,
    #[error("after: detected buffer over/underrun")]
    Overrun,
    #[error("after: memory modified after free")]
    ModifiedAfterFree,
    #[error("after: allocated memory not freed")]
    Leak,
    #[error("after: primary fence broken (large overrun)")]
    BarrierBroken,
    #[error("after: mismatched malloc/free calls")]
    Imbalance { mallocs: i32, frees: i32 },
}

/// What to show under a fault line.
#[derive(Debug, Clone)]
pub enum FaultDump {
    None,
    /// Hex/ascii dump of a whole tracked block.
    Record(MemoryRecord),
    /// Three rows of 16 bytes around an arbitrary pointer.
    Window(SandboxPtr),
}

#[derive(Debug, Clone)]
pub struct FaultReport {
    pub fault: MemoryFault,
    pub dump: FaultDump,
}

/// State of the forced allocation-failure directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum AllocFail {
    Normal,
    /// A one-shot failure already fired; the directive must be accounted
    /// for at the end of the test.
    WasExpected,
    FailOnce,
    FailAlways,
}

pub struct Sandbox {
    arena: Vec<u8>,
    limit: usize,
    cursor: usize,
    records: Vec<MemoryRecord>,
    faults: Vec<FaultReport>,
    pub(crate) mallocs: i32,
    pub(crate) frees: i32,
    pub(crate) expect_error: bool,
    pub(crate) error: bool,
    pub(crate) fail: AllocFail,
    pub(crate) forced_failures: i32,
    pub(crate) enabled: bool,
}

impl Sandbox {
    pub fn new(limit: usize) -> Self {
        Self {
            arena: vec![0; limit + BARRIER_SIZE * 2],
            limit,
            cursor: 0,
            records: Vec::with_capacity(16),
            faults: Vec::new(),
            mallocs: 0,
            frees: 0,
            expect_error: false,
            error: false,
            fail: AllocFail::Normal,
            forced_failures: 0,
            enabled: false,
        }
    }

    /// Wipe all per-test state. Fills the arena and rebuilds the barriers
    /// when memory testing is enabled for the pass.
    pub fn reset(&mut self, enable: bool) {
        self.enabled = enable;
        self.records.clear();
        self.faults.clear();
        self.cursor = 0;
        self.mallocs = 0;
        self.frees = 0;
        self.expect_error = false;
        self.error = false;
        self.fail = AllocFail::Normal;
        self.forced_failures = 0;
        if enable {
            let tail = BARRIER_SIZE + self.limit;
            self.arena[..BARRIER_SIZE].fill(BARRIER_BYTE);
            self.arena[BARRIER_SIZE..tail].fill(FILL_UNUSED);
            self.arena[tail..].fill(BARRIER_BYTE);
        }
    }

    // ==== allocation ========================================================

    pub fn alloc(&mut self, size: usize) -> Option<SandboxPtr> {
        if size == 0 {
            return None;
        }

        if self.fail >= AllocFail::FailOnce {
            if self.fail == AllocFail::FailOnce {
                self.fail = AllocFail::WasExpected;
            }
            self.forced_failures += 1;
            return None;
        }

        let next = self.cursor + FENCE_SIZE * 2 + size;
        if next >= self.limit - FENCE_SIZE * 2 {
            // An exhausted arena is a test-setup problem and must never be
            // absorbed by an expected-memory-errors directive.
            self.expect_error = false;
            self.report(MemoryFault::OutOfSpace(self.limit), FaultDump::None);
            return None;
        }

        // Counted before the fence check so a fence-broken allocation still
        // skews the malloc/free parity check.
        self.mallocs += 1;

        if self.cursor != 0 {
            let fence = self.cursor - FENCE_SIZE..self.cursor;
            if fence.clone().any(|i| self.arena[BARRIER_SIZE + i] != FENCE_TAIL) {
                let dump = match self.records.last() {
                    Some(prev) => FaultDump::Record(*prev),
                    None => FaultDump::None,
                };
                self.report(MemoryFault::PrecedingFence, dump);
                return None;
            }
        }

        if self.records.len() == self.records.capacity() {
            self.records.reserve_exact(self.records.capacity() / 2);
        }

        let record = MemoryRecord {
            start: self.cursor,
            size,
            freed: false,
        };
        self.fill(record.start, FENCE_SIZE, FENCE_HEAD);
        self.fill(record.payload(), size, FILL_DIRTY);
        self.fill(record.payload() + size, FENCE_SIZE, FENCE_TAIL);
        self.records.push(record);
        self.cursor = next;

        Some(SandboxPtr(record.payload()))
    }

    pub fn free(&mut self, ptr: SandboxPtr) {
        if ptr.0 >= self.limit {
            self.report(MemoryFault::FreeOutOfBounds, FaultDump::Window(ptr));
            return;
        }

        let index = match self.find_index(ptr) {
            Some(i) => i,
            None => {
                self.report(MemoryFault::FreeUnknown, FaultDump::Window(ptr));
                return;
            }
        };

        if self.records[index].freed {
            self.report(MemoryFault::DoubleFree, FaultDump::None);
        }

        let record = self.records[index];
        if !self.fence_intact(&record) {
            self.report(MemoryFault::FreeFence, FaultDump::Record(record));
        }

        self.fill(record.payload(), record.size, FILL_FREED);
        self.records[index].freed = true;
        self.frees += 1;
    }

    pub fn calloc(&mut self, count: usize, size: usize) -> Option<SandboxPtr> {
        let total = match count.checked_mul(size) {
            Some(total) => total,
            None => {
                // Nothing this large can fit anyway; report it as exhaustion.
                self.expect_error = false;
                self.report(MemoryFault::OutOfSpace(self.limit), FaultDump::None);
                return None;
            }
        };
        let ptr = self.alloc(total)?;
        self.fill(ptr.0, total, 0);
        Some(ptr)
    }

    pub fn realloc(&mut self, ptr: Option<SandboxPtr>, new_size: usize) -> Option<SandboxPtr> {
        let ptr = match ptr {
            Some(p) => p,
            None => return self.alloc(new_size),
        };

        if self.records.is_empty() {
            self.report(MemoryFault::ReallocNothing, FaultDump::None);
            return self.alloc(new_size);
        }

        if self.fail >= AllocFail::FailOnce {
            if self.fail == AllocFail::FailOnce {
                self.fail = AllocFail::WasExpected;
            }
            self.forced_failures += 1;
            return None;
        }

        let last = *self.records.last()?;
        if last.payload() == ptr.0 {
            return self.realloc_in_place(ptr, last, new_size);
        }

        // Not the newest block, so in-place resizing would collide with a
        // later allocation. Allocate, copy, free.
        let old = match self.find_index(ptr) {
            Some(i) => self.records[i],
            None => {
                self.report(MemoryFault::FreeUnknown, FaultDump::Window(ptr));
                return None;
            }
        };
        let new_ptr = match self.alloc(new_size) {
            Some(p) => p,
            None => {
                self.report(MemoryFault::ReallocAllocFailed, FaultDump::None);
                return None;
            }
        };
        for i in 0..old.size.min(new_size) {
            let byte = self.read(old.payload() + i);
            self.write(new_ptr.0 + i, byte);
        }
        self.free(ptr);
        Some(new_ptr)
    }

    fn realloc_in_place(
        &mut self,
        ptr: SandboxPtr,
        last: MemoryRecord,
        new_size: usize,
    ) -> Option<SandboxPtr> {
        if !self.fence_intact(&last) {
            self.report(MemoryFault::ReallocFence, FaultDump::Record(last));
            return None;
        }

        if new_size == last.size {
            return Some(ptr);
        }

        let next = last.start + FENCE_SIZE * 2 + new_size;
        if next >= self.limit - FENCE_SIZE * 2 {
            self.expect_error = false;
            self.report(MemoryFault::OutOfSpace(self.limit), FaultDump::None);
            return None;
        }

        if new_size > last.size {
            self.fill(ptr.0 + new_size, FENCE_SIZE, FENCE_TAIL);
            self.fill(ptr.0 + last.size, new_size - last.size, FILL_DIRTY);
        } else {
            self.fill(ptr.0 + new_size, FENCE_SIZE, FENCE_TAIL);
            self.fill(ptr.0 + new_size + FENCE_SIZE, last.size - new_size, FILL_UNUSED);
        }

        let index = self.records.len() - 1;
        self.records[index].size = new_size;
        self.cursor = next;
        Some(ptr)
    }

    /// Plain bump allocation used when memory testing is disabled or the
    /// call happens outside a group body. No fences, records, or checks;
    /// the block is dirty-filled only inside a group body.
    pub fn raw_alloc(&mut self, size: usize, dirty: bool) -> Option<SandboxPtr> {
        if self.cursor + size > self.limit {
            return None;
        }
        let ptr = SandboxPtr(self.cursor);
        if dirty {
            self.fill(ptr.0, size, FILL_UNUSED);
        }
        self.cursor += size;
        Some(ptr)
    }

    // ==== end-of-test validation ===========================================

    /// Run after every non-failed test: fence integrity, poison integrity
    /// of freed blocks, leaks, barrier integrity, and malloc/free parity.
    pub fn final_checks(&mut self) {
        for i in 0..self.records.len() {
            let record = self.records[i];

            if !self.fence_intact(&record) {
                self.report(MemoryFault::Overrun, FaultDump::Record(record));
            }

            if record.freed {
                let payload = record.payload();
                if (0..record.size).any(|j| self.read(payload + j) != FILL_FREED) {
                    self.report(MemoryFault::ModifiedAfterFree, FaultDump::Record(record));
                }
            } else {
                self.report(MemoryFault::Leak, FaultDump::Record(record));
            }
        }

        let tail = BARRIER_SIZE + self.limit;
        let broken = (0..BARRIER_SIZE)
            .any(|i| self.arena[i] != BARRIER_BYTE || self.arena[tail + i] != BARRIER_BYTE);
        if broken {
            self.report(MemoryFault::BarrierBroken, FaultDump::None);
        }

        if self.mallocs != self.frees {
            self.report(
                MemoryFault::Imbalance {
                    mallocs: self.mallocs,
                    frees: self.frees,
                },
                FaultDump::None,
            );
        }
    }

    /// An allocation failure was requested but no allocation ever happened.
    pub fn unfired_fail_directive(&self) -> bool {
        self.fail >= AllocFail::WasExpected && self.forced_failures == 0
    }

    pub fn take_faults(&mut self) -> Vec<FaultReport> {
        std::mem::take(&mut self.faults)
    }

    // ==== access ===========================================================

    pub fn peek(&self, ptr: SandboxPtr) -> u8 {
        self.read(ptr.0)
    }

    pub fn poke(&mut self, ptr: SandboxPtr, byte: u8) {
        self.write(ptr.0, byte);
    }

    pub fn find_record(&self, ptr: SandboxPtr) -> Option<MemoryRecord> {
        self.find_index(ptr).map(|i| self.records[i])
    }

    // ==== dumps ============================================================

    /// Hex/ascii rows covering a tracked block, fences included. The row
    /// containing the payload start is marked.
    pub fn dump_record(&self, record: &MemoryRecord) -> Vec<String> {
        let mut rows = Vec::new();
        let mut i = 0;
        while i < record.size + FENCE_SIZE + 16 {
            let base = BARRIER_SIZE + record.start + i + FENCE_SIZE - 16;
            rows.push(self.dump_row(base, i == 16));
            i += 16;
        }
        rows
    }

    /// Three rows of 16 bytes around an arbitrary pointer.
    pub fn dump_window(&self, ptr: SandboxPtr) -> Vec<String> {
        let base = BARRIER_SIZE + ptr.0;
        vec![
            self.dump_row(base.saturating_sub(16), false),
            self.dump_row(base, true),
            self.dump_row(base + 16, false),
        ]
    }

    fn dump_row(&self, base: usize, target: bool) -> String {
        let mut row = format!("0x{:08X}{}", base, if target { "-> " } else { ":  " });
        for i in 0..16 {
            match self.arena.get(base + i) {
                Some(byte) => row.push_str(&format!("{:02X} ", byte)),
                None => row.push_str("xx "),
            }
        }
        row.push_str(if target { "= " } else { "- " });
        for i in 0..16 {
            match self.arena.get(base + i) {
                Some(&byte) if byte > 0x1F && byte < 0x7F => row.push(byte as char),
                Some(_) => row.push('.'),
                None => row.push(' '),
            }
        }
        row
    }

    // ==== internals ========================================================

    fn report(&mut self, fault: MemoryFault, dump: FaultDump) {
        self.faults.push(FaultReport { fault, dump });
    }

    fn find_index(&self, ptr: SandboxPtr) -> Option<usize> {
        self.records
            .binary_search_by(|r| r.payload().cmp(&ptr.0))
            .ok()
    }

    fn fence_intact(&self, record: &MemoryRecord) -> bool {
        let head = record.start..record.payload();
        let tail = record.payload() + record.size..record.start + FENCE_SIZE * 2 + record.size;
        head.into_iter().all(|i| self.read(i) == FENCE_HEAD)
            && tail.into_iter().all(|i| self.read(i) == FENCE_TAIL)
    }

    fn read(&self, offset: usize) -> u8 {
        self.arena[BARRIER_SIZE + offset]
    }

    fn write(&mut self, offset: usize, byte: u8) {
        self.arena[BARRIER_SIZE + offset] = byte;
    }

    fn fill(&mut self, offset: usize, len: usize, byte: u8) {
        let start = BARRIER_SIZE + offset;
        self.arena[start..start + len].fill(byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> Sandbox {
        let mut sandbox = Sandbox::new(DEFAULT_LIMIT);
        sandbox.reset(true);
        sandbox
    }

    fn faults(sandbox: &mut Sandbox) -> Vec<MemoryFault> {
        sandbox.take_faults().into_iter().map(|r| r.fault).collect()
    }

    #[test]
    fn alloc_wraps_payload_in_fences_and_dirt() {
        let mut sandbox = sandbox();
        let ptr = sandbox.alloc(5).unwrap();
        assert_eq!(ptr.0, FENCE_SIZE);
        assert_eq!(sandbox.peek(ptr - 1), b'b');
        assert_eq!(sandbox.peek(ptr), b'N');
        assert_eq!(sandbox.peek(ptr + 4), b'N');
        assert_eq!(sandbox.peek(ptr + 5), b'e');
        assert!(faults(&mut sandbox).is_empty());
    }

    #[test]
    fn zero_sized_alloc_returns_none_without_fault() {
        let mut sandbox = sandbox();
        assert!(sandbox.alloc(0).is_none());
        assert!(faults(&mut sandbox).is_empty());
        assert_eq!(sandbox.mallocs, 0);
    }

    #[test]
    fn clean_alloc_free_passes_final_checks() {
        let mut sandbox = sandbox();
        let ptr = sandbox.alloc(8).unwrap();
        sandbox.free(ptr);
        sandbox.final_checks();
        assert!(faults(&mut sandbox).is_empty());
    }

    #[test]
    fn leak_is_reported() {
        let mut sandbox = sandbox();
        sandbox.alloc(8).unwrap();
        sandbox.final_checks();
        let faults = faults(&mut sandbox);
        assert!(faults.contains(&MemoryFault::Leak));
        assert!(matches!(faults[1], MemoryFault::Imbalance { .. }));
    }

    #[test]
    fn overrun_breaks_the_fence() {
        let mut sandbox = sandbox();
        let ptr = sandbox.alloc(5).unwrap();
        sandbox.poke(ptr + 5, b'!');
        sandbox.free(ptr);
        assert_eq!(faults(&mut sandbox), vec![MemoryFault::FreeFence]);
    }

    #[test]
    fn double_free_is_reported_and_still_counted() {
        let mut sandbox = sandbox();
        let ptr = sandbox.alloc(5).unwrap();
        sandbox.free(ptr);
        sandbox.free(ptr);
        assert_eq!(faults(&mut sandbox), vec![MemoryFault::DoubleFree]);
        assert_eq!(sandbox.frees, 2);
    }

    #[test]
    fn write_after_free_is_caught_by_final_checks() {
        let mut sandbox = sandbox();
        let ptr = sandbox.alloc(5).unwrap();
        sandbox.free(ptr);
        sandbox.poke(ptr + 2, b'!');
        sandbox.final_checks();
        assert_eq!(faults(&mut sandbox), vec![MemoryFault::ModifiedAfterFree]);
    }

    #[test]
    fn free_of_unknown_pointer_is_reported() {
        let mut sandbox = sandbox();
        let ptr = sandbox.alloc(5).unwrap();
        sandbox.free(ptr + 1);
        assert_eq!(faults(&mut sandbox), vec![MemoryFault::FreeUnknown]);
    }

    #[test]
    fn calloc_zeroes_the_payload() {
        let mut sandbox = sandbox();
        let ptr = sandbox.calloc(4, 2).unwrap();
        assert!((0..8).all(|i| sandbox.peek(ptr + i) == 0));
    }

    #[test]
    fn realloc_grows_the_newest_block_in_place() {
        let mut sandbox = sandbox();
        let ptr = sandbox.alloc(4).unwrap();
        for i in 0..4 {
            sandbox.poke(ptr + i, b'a' + i as u8);
        }
        let grown = sandbox.realloc(Some(ptr), 8).unwrap();
        assert_eq!(grown, ptr);
        assert_eq!(sandbox.peek(grown), b'a');
        assert_eq!(sandbox.peek(grown + 3), b'd');
        assert_eq!(sandbox.peek(grown + 4), b'N');
        assert_eq!(sandbox.peek(grown + 8), b'e');
        assert!(faults(&mut sandbox).is_empty());
    }

    #[test]
    fn realloc_of_an_older_block_moves_it() {
        let mut sandbox = sandbox();
        let first = sandbox.alloc(4).unwrap();
        sandbox.poke(first, b'Q');
        let _second = sandbox.alloc(4).unwrap();
        let moved = sandbox.realloc(Some(first), 8).unwrap();
        assert_ne!(moved, first);
        assert_eq!(sandbox.peek(moved), b'Q');
        assert!(faults(&mut sandbox).is_empty());
        // Old block was freed by the move.
        assert_eq!(sandbox.peek(first), b'F');
    }

    #[test]
    fn forced_failure_fires_once() {
        let mut sandbox = sandbox();
        sandbox.fail = AllocFail::FailOnce;
        assert!(sandbox.alloc(5).is_none());
        assert!(sandbox.alloc(5).is_some());
        assert_eq!(sandbox.forced_failures, 1);
        assert!(!sandbox.unfired_fail_directive());
    }

    #[test]
    fn unfired_directive_is_flagged() {
        let mut sandbox = sandbox();
        sandbox.fail = AllocFail::FailOnce;
        assert!(sandbox.unfired_fail_directive());
    }

    #[test]
    fn broken_tail_fence_fails_the_next_alloc() {
        let mut sandbox = sandbox();
        let ptr = sandbox.alloc(8).unwrap();
        sandbox.poke(ptr + 8, b'!');
        assert!(sandbox.alloc(4).is_none());
        assert_eq!(faults(&mut sandbox), vec![MemoryFault::PrecedingFence]);
        // Still counted, so the parity check flags the run as well.
        assert_eq!(sandbox.mallocs, 2);
    }

    #[test]
    fn writing_past_the_arena_breaks_the_barrier() {
        let mut sandbox = sandbox();
        let ptr = sandbox.alloc(8).unwrap();
        sandbox.free(ptr);
        // Offsets at or past the limit land in the tail barrier.
        sandbox.poke(SandboxPtr(DEFAULT_LIMIT + 4), 0);
        sandbox.final_checks();
        assert_eq!(faults(&mut sandbox), vec![MemoryFault::BarrierBroken]);
    }

    #[test]
    fn calloc_overflow_is_reported_as_exhaustion() {
        let mut sandbox = sandbox();
        sandbox.expect_error = true;
        assert!(sandbox.calloc(usize::MAX, 2).is_none());
        assert!(!sandbox.expect_error);
        assert_eq!(
            faults(&mut sandbox),
            vec![MemoryFault::OutOfSpace(DEFAULT_LIMIT)]
        );
        assert_eq!(sandbox.mallocs, 0);
    }

    #[test]
    fn exhaustion_reports_and_clears_expectation() {
        let mut sandbox = sandbox();
        sandbox.expect_error = true;
        assert!(sandbox.alloc(DEFAULT_LIMIT).is_none());
        assert!(!sandbox.expect_error);
        assert_eq!(
            faults(&mut sandbox),
            vec![MemoryFault::OutOfSpace(DEFAULT_LIMIT)]
        );
    }
}
