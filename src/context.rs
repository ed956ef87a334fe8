//! Nested context tracking for group bodies.
//!
//! A context shares setup between tests. Because the group body is
//! re-executed once per contained test, open contexts must be remembered
//! across passes: the stack persists for the whole group, and a cursor is
//! walked back up it on every pass so already-open contexts are re-entered
//! instead of duplicated.

/// Maximum nesting depth, counting the root frame.
pub const MAX_CONTEXT_DEPTH: usize = 20;

#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub desc: &'static str,
    /// Header already shown for this frame.
    pub printed: bool,
    /// This frame was named by a line selection; popping it ends the run.
    pub requested: bool,
}

pub struct ContextStack {
    frames: Vec<Frame>,
    /// Cursor into `frames`, rewound to the root between passes.
    index: usize,
}

impl Default for ContextStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStack {
    pub fn new() -> Self {
        let root = Frame {
            desc: "<root context>",
            printed: false,
            requested: false,
        };
        Self {
            frames: vec![root],
            index: 0,
        }
    }

    /// Advance the cursor if the next frame up the stack matches `desc`.
    pub fn replay_next(&mut self, desc: &str) -> bool {
        if self.index + 1 < self.frames.len() && self.frames[self.index + 1].desc == desc {
            self.index += 1;
            true
        } else {
            false
        }
    }

    /// Frame under the cursor.
    pub fn current(&self) -> &Frame {
        &self.frames[self.index]
    }

    /// Cursor sits on the top of the stack.
    pub fn at_top(&self) -> bool {
        self.index + 1 == self.frames.len()
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() >= MAX_CONTEXT_DEPTH
    }

    pub fn push(&mut self, desc: &'static str, requested: bool) {
        self.frames.push(Frame {
            desc,
            printed: false,
            requested,
        });
        self.index = self.frames.len() - 1;
    }

    /// Pop the top frame. The root frame is never popped.
    pub fn pop(&mut self) {
        debug_assert!(self.frames.len() > 1);
        if self.frames.len() > 1 {
            self.frames.pop();
        }
        self.index = self.frames.len() - 1;
    }

    /// Rewind the cursor to the root. Called between passes.
    pub fn rewind(&mut self) {
        self.index = 0;
    }

    /// Drop everything but the root. Called between groups.
    pub fn clear(&mut self) {
        self.frames.truncate(1);
        self.index = 0;
    }

    /// Number of frames, root included.
    pub fn level_count(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn frames_mut(&mut self) -> &mut [Frame] {
        &mut self.frames
    }
}
