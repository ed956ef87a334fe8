//! Test execution engine.
//!
//! A [`Spec`] owns everything a run needs: parameters, the context stack,
//! the memory sandbox, the output pipeline, and the per-test bookkeeping.
//! Group bodies receive `&mut Spec` and drive it through the macro layer.
//!
//! Each group body is executed once per contained test. A pass runs until
//! one not-yet-run test activates, and the loop repeats until a pass makes
//! no progress, so every test starts from fresh function-scope state while
//! still seeing the setup code of its enclosing contexts.

use crate::cli::{LineSelect, Params, Verbosity};
use crate::context::{ContextStack, MAX_CONTEXT_DEPTH};
use crate::memory::{
    AllocFail, FaultDump, FaultReport, MemoryFault, Sandbox, SandboxPtr, DEFAULT_LIMIT,
};
use crate::output::{Color, LineSink, Output};
use crate::suite::{TestGroup, TestSuite};
use crate::value::Value;

/// How much of a test's header block has been shown. Logged output may be
/// followed by a failure, which reprints the description in red, so the
/// two header stages are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PrintLevel {
    NotPrinted,
    Logged,
    Printed,
}

pub struct Spec {
    pub params: Params,
    out: Output,
    memory: Sandbox,
    ctx: ContextStack,

    suite_file: &'static str,
    group: Option<TestGroup>,

    filename_printed: bool,
    function_printed: bool,
    desc_printed: PrintLevel,
    description: &'static str,

    /// Line of the last test or context reached; tests at or before it
    /// have already run in an earlier pass.
    cur_line: u32,
    in_function: bool,
    in_progress: bool,
    expect_fail: bool,
    skip: bool,
    failed: bool,
    warned: bool,

    tests_run: i32,
    tests_passed: i32,
    warnings: i32,
}

impl Spec {
    pub fn new(params: Params, sink: Box<dyn LineSink>) -> Self {
        let padding = params.padding;
        Self {
            params,
            out: Output::new(sink, padding),
            memory: Sandbox::new(DEFAULT_LIMIT),
            ctx: ContextStack::new(),
            suite_file: "",
            group: None,
            filename_printed: false,
            function_printed: false,
            desc_printed: PrintLevel::NotPrinted,
            description: "",
            cur_line: 0,
            in_function: false,
            in_progress: false,
            expect_fail: false,
            skip: false,
            failed: false,
            warned: false,
            tests_run: 0,
            tests_passed: 0,
            warnings: 0,
        }
    }

    // ==== RUNNERS ===========================================================

    pub fn before_run(&mut self) {
        self.tests_run = 0;
        self.tests_passed = 0;
        self.warnings = 0;
    }

    pub fn run_suite(&mut self, suite: &TestSuite) {
        self.before_suite(suite.filename);

        let selected = match &self.params.file {
            Some(file) => suite.filename.ends_with(file.as_str()),
            None => true,
        };
        if !selected {
            if self.params.verbosity == Verbosity::Full {
                let line = format!("skipping file: %c{}", suite.filename);
                self.out.print(&line, Some(Color::Purple));
            }
            return;
        }

        for group in &suite.groups {
            // A selected group line widens the selection for that group
            // only; the filter is restored for its siblings.
            let saved = self.params.select;
            if self.params.select == LineSelect::Line(group.line) {
                self.params.select = LineSelect::All;
            }
            self.process_group(*group);
            self.params.select = saved;
        }
    }

    pub fn process_group(&mut self, group: TestGroup) {
        self.group = Some(group);
        self.before_group();

        loop {
            self.before_pass();
            let prev_line = self.cur_line;

            self.in_function = true;
            (group.body)(self);
            self.in_function = false;

            // A pass that activated nothing and reached no new line means
            // every test in the group has run.
            if !self.in_progress && prev_line == self.cur_line {
                break;
            }

            self.end_test();
        }

        self.ctx.clear();
    }

    pub fn summary(&mut self) {
        if self.tests_run > 0 {
            let mut color = if self.tests_run == self.tests_passed {
                Color::BoldGreen
            } else {
                Color::BoldRed
            };
            let percent = (100.0 * self.tests_passed as f32 / self.tests_run as f32) as i32;
            let mut line = format!(
                "Tests passed:%c {} out of {}, or {}%",
                self.tests_passed, self.tests_run, percent
            );
            if self.warnings > 0 {
                line.push_str(&format!(" - warnings: {}", self.warnings));
                if color == Color::BoldGreen {
                    color = Color::BoldYellow;
                }
            }
            self.out.print(&line, Some(color));
        } else {
            self.out.print("Tests passed:%c 0 out of 0", Some(Color::BoldYellow));
        }
    }

    /// Number of failed tests, used as the process exit code.
    pub fn failing_count(&self) -> i32 {
        self.tests_run - self.tests_passed
    }

    fn before_suite(&mut self, filename: &'static str) {
        self.suite_file = filename;
        self.filename_printed = false;
    }

    fn before_group(&mut self) {
        self.function_printed = false;
        self.cur_line = 0;
    }

    fn before_pass(&mut self) {
        self.ctx.rewind();
        self.expect_fail = false;
        self.skip = false;
        self.memory.reset(self.params.memory_test);
        self.failed = false;
        self.warned = false;
        self.out.indent = 0;
    }

    // ==== TEST BEGIN/END ====================================================

    pub fn begin_test(&mut self, line: u32, desc: &'static str) -> bool {
        // Another test is already running this pass.
        if self.in_progress {
            return false;
        }

        // Already ran in an earlier pass.
        if self.cur_line >= line {
            return false;
        }

        self.cur_line = line;
        self.description = desc;
        self.desc_printed = PrintLevel::NotPrinted;

        let selected = match self.params.select {
            LineSelect::All => true,
            LineSelect::Line(selected) => selected == line,
            LineSelect::Done => false,
        };

        if selected && !self.skip {
            self.in_progress = true;
        } else {
            if self.params.verbosity == Verbosity::Full || self.skip {
                // Raise in_progress just long enough for the header to
                // print as a test description rather than "pre-test".
                self.in_progress = true;
                self.print_headers(Color::Blue, PrintLevel::Logged, "");
            }
            self.in_progress = false;
        }

        self.in_progress
    }

    pub fn end_test(&mut self) -> bool {
        if !self.in_progress {
            return false;
        }

        if !self.failed && self.params.memory_test {
            self.memory.final_checks();
            self.flush_memory_faults();
            if self.memory.unfired_fail_directive() {
                // A test-design problem, not a memory fault: expecting
                // memory errors must not absolve a directive that never
                // took effect.
                self.error("memory error: after: malloc fail requested, but never called");
            }
        }

        self.tests_run += 1;

        let passed = (!self.failed ^ self.expect_fail)
            && (!self.memory.error ^ self.memory.expect_error);

        if passed {
            self.tests_passed += 1;
            if self.params.verbosity >= Verbosity::Run || self.params.select != LineSelect::All {
                let note = if self.expect_fail || self.memory.expect_error {
                    " (failed successfully)"
                } else {
                    ""
                };
                self.print_headers(Color::Green, PrintLevel::Logged, note);
            }
        } else {
            if self.expect_fail && !self.failed {
                self.expect_fail = false; // so the error prints
                self.error("expected to fail, but succeeded instead");
            }
            if self.memory.expect_error && !self.memory.error {
                self.error("expected memory errors, but none were found");
            }
        }

        self.in_progress = false;
        true
    }

    /// A test body is currently executing.
    pub fn active(&self) -> bool {
        self.in_progress
    }

    // ==== CONTEXTS ==========================================================

    pub fn context_begin(&mut self, line: u32, desc: &'static str) -> bool {
        // Mid-test, skip the whole block so enclosing contexts can close.
        if self.in_progress {
            return false;
        }

        // Re-enter a context opened in an earlier pass.
        if self.ctx.replay_next(desc) {
            return true;
        }
        if self.ctx.current().desc == desc {
            return true;
        }

        // Execution has moved past this context; all its tests are done.
        if self.cur_line > line {
            return false;
        }

        debug_assert!(self.ctx.at_top());

        let mut requested = false;
        if self.params.select == LineSelect::Line(line) {
            requested = true;
            self.params.select = LineSelect::All;
        }

        self.cur_line = line;

        if self.ctx.is_full() {
            let message = format!(
                "context error:%c Too many nested contexts - maximum depth allowed: {}",
                MAX_CONTEXT_DEPTH
            );
            self.warn(line, &message);
            self.warn(line, "%cDeeply nested contexts are skipped; flatten the test layout");
            return false;
        }

        self.ctx.push(desc, requested);
        true
    }

    /// Returns true when the context has closed for good, which ends the
    /// current pass.
    pub fn context_end(&mut self, line: u32) -> bool {
        // A test inside ran this pass; keep the context open for the next.
        if self.in_progress {
            return false;
        }

        self.cur_line = line + 1;

        // Popping a requested context means the selection is satisfied.
        if self.ctx.current().requested {
            self.params.select = LineSelect::Done;
        }

        self.ctx.pop();
        true
    }

    // ==== CHECKS ============================================================

    pub fn check(&mut self, line: u32, ok: bool, expr: &str) -> bool {
        if !ok {
            self.error(&format!("line {}: expected {}", line, expr));
        }
        ok
    }

    pub fn check_cmp(
        &mut self,
        line: u32,
        ok: bool,
        expr: &str,
        op: &str,
        lhs: Value,
        rhs: Value,
        types: (&str, &str),
    ) -> bool {
        if ok {
            return true;
        }
        let received = format!("%n\nreceived {} {} {}", lhs, op, rhs);
        let types = format!(" : ( {}, {} )", types.0, types.1);
        self.fail_typed(line, expr, &received, &types);
        false
    }

    pub fn check_match(
        &mut self,
        line: u32,
        ok: bool,
        expr: &str,
        received: Value,
        ty: &str,
    ) -> bool {
        if ok {
            return true;
        }
        let received = format!("%n\nreceived {}", received);
        let types = format!(" : ( {} )", ty);
        self.fail_typed(line, expr, &received, &types);
        false
    }

    // ==== DIRECTIVES ========================================================

    pub fn expect_to_fail(&mut self) -> bool {
        if !self.params.force_fails {
            self.expect_fail = true;
        }
        true
    }

    pub fn expect_memory_errors(&mut self) -> bool {
        if self.memory_directive_warning() {
            self.skip = true;
            return !self.in_progress;
        }
        if !self.params.force_fails {
            self.memory.expect_error = true;
        }
        true
    }

    pub fn fail_next_alloc(&mut self, only_once: bool) -> bool {
        if self.memory_directive_warning() {
            self.skip = true;
            return !self.in_progress;
        }
        self.memory.fail = if only_once {
            AllocFail::FailOnce
        } else {
            AllocFail::FailAlways
        };
        true
    }

    pub fn malloc_count(&mut self) -> i32 {
        if self.memory_directive_warning() {
            self.skip = true;
            return -1;
        }
        self.memory.mallocs
    }

    pub fn free_count(&mut self) -> i32 {
        if self.memory_directive_warning() {
            self.skip = true;
            return -1;
        }
        self.memory.frees
    }

    fn memory_directive_warning(&mut self) -> bool {
        if self.params.memory_test {
            return false;
        }
        self.warn_at(
            None,
            "warning: expecting memory errors, but memory testing is disabled",
        );
        self.expect_fail = true;
        true
    }

    // ==== MEMORY ============================================================

    pub fn malloc(&mut self, size: usize) -> Option<SandboxPtr> {
        if !self.memory.enabled || !self.in_function {
            return self.memory.raw_alloc(size, self.in_function);
        }
        let ptr = self.memory.alloc(size);
        self.flush_memory_faults();
        ptr
    }

    pub fn calloc(&mut self, count: usize, size: usize) -> Option<SandboxPtr> {
        if !self.memory.enabled || !self.in_function {
            let total = count.checked_mul(size)?;
            return self.memory.raw_alloc(total, self.in_function);
        }
        let ptr = self.memory.calloc(count, size);
        self.flush_memory_faults();
        ptr
    }

    pub fn realloc(&mut self, ptr: Option<SandboxPtr>, new_size: usize) -> Option<SandboxPtr> {
        if !self.memory.enabled || !self.in_function {
            return self.memory.raw_alloc(new_size, self.in_function);
        }
        let ptr = self.memory.realloc(ptr, new_size);
        self.flush_memory_faults();
        ptr
    }

    pub fn free(&mut self, ptr: SandboxPtr) {
        if !self.memory.enabled || !self.in_function {
            return;
        }
        self.memory.free(ptr);
        self.flush_memory_faults();
    }

    pub fn peek(&self, ptr: SandboxPtr) -> u8 {
        self.memory.peek(ptr)
    }

    pub fn poke(&mut self, ptr: SandboxPtr, byte: u8) {
        self.memory.poke(ptr, byte);
    }

    // ==== LOGGING ===========================================================

    pub fn log(&mut self, line: u32, message: &str) {
        if (self.cur_line != 0 && self.cur_line >= line)
            || self.params.verbosity < Verbosity::Notes
        {
            return;
        }
        let level = self.print_headers(Color::BoldWhite, PrintLevel::Logged, "");
        let text = format!("{}line {}: {}", self.pad(level), line, message);
        self.out.print(&text, None);
    }

    pub fn warn(&mut self, line: u32, message: &str) {
        self.warn_at(Some(line), message);
    }

    fn warn_at(&mut self, line: Option<u32>, message: &str) {
        if let Some(line) = line {
            if self.cur_line != 0 && self.cur_line > line {
                return;
            }
        }
        let level = self.print_headers(Color::Yellow, PrintLevel::Logged, "");
        let text = match line {
            Some(line) => format!("{}line {}:%c {}", self.pad(level), line, message),
            None => format!("{}%c{}", self.pad(level), message),
        };
        // The first warning of a pass is counted and shown bold.
        let color = if self.warned {
            Color::Yellow
        } else {
            self.warnings += 1;
            Color::BoldYellow
        };
        self.out.print(&text, Some(color));
        self.warned = true;
    }

    /// Hex/ascii dump of the block at `ptr`, or a 48-byte window around it
    /// when no allocation record matches. Gated like [`Spec::log`].
    pub fn log_memory(&mut self, line: u32, ptr: SandboxPtr) {
        if (self.cur_line != 0 && self.cur_line >= line)
            || self.params.verbosity < Verbosity::Notes
        {
            return;
        }
        let level = self.print_headers(Color::BoldWhite, PrintLevel::Logged, "");
        if self.params.padding {
            self.out.blank();
        }
        let record = self.memory.find_record(ptr);
        let rows = match record {
            Some(record) => self.memory.dump_record(&record),
            None => self.memory.dump_window(ptr),
        };
        for row in rows {
            let text = format!("{}{}", self.pad(level), row);
            self.out.print(&text, None);
        }
        if record.is_some() && self.params.padding {
            self.out.blank();
        }
    }

    // ==== FAILURE REPORTING =================================================

    pub fn error(&mut self, message: &str) {
        if !self.in_progress {
            return;
        }
        if !self.expect_fail {
            self.error_no_fail(message, false);
        }
        self.failed = true;
    }

    fn error_no_fail(&mut self, message: &str, memory: bool) -> usize {
        let level = self.print_headers(Color::Red, PrintLevel::Printed, "");
        let prefix = if memory { "memory error: " } else { "" };
        let text = format!("{}{}{}", self.pad(level), prefix, message);
        self.out.print(&text, None);
        if self.params.padding {
            self.out.blank();
        }
        level
    }

    fn fail_typed(&mut self, line: u32, expr: &str, received: &str, types: &str) {
        if !self.in_progress {
            return;
        }
        self.failed = true;
        if self.expect_fail {
            return;
        }

        let level = self.print_headers(Color::Red, PrintLevel::Printed, "");

        // Continuation lines ("received ...") align under "expected".
        let prefix = format!("{}line {}: ", self.pad(level), line);
        self.out.indent = prefix.len();

        let mut text = format!("{}expected {}{}", prefix, expr, received);
        if self.params.show_types {
            text.push_str(types);
        }
        self.out.print(&text, None);
        if self.params.padding {
            self.out.blank();
        }
    }

    fn flush_memory_faults(&mut self) {
        for report in self.memory.take_faults() {
            self.report_memory_fault(report);
        }
    }

    fn report_memory_fault(&mut self, report: FaultReport) {
        if !self.in_progress {
            return;
        }
        if !self.memory.expect_error {
            let message = report.fault.to_string();
            let level = self.error_no_fail(&message, true);

            match report.dump {
                FaultDump::Record(record) => {
                    for row in self.memory.dump_record(&record) {
                        let text = format!("{}{}", self.pad(level + 1), row);
                        self.out.print(&text, None);
                    }
                    if self.params.padding {
                        self.out.blank();
                    }
                }
                FaultDump::Window(ptr) => {
                    for row in self.memory.dump_window(ptr) {
                        let text = format!("{}{}", self.pad(level + 1), row);
                        self.out.print(&text, None);
                    }
                }
                FaultDump::None => {}
            }

            if let MemoryFault::Imbalance { mallocs, frees } = report.fault {
                // Aligned under the message text, past "memory error: after: ".
                let width = self.params.tab_size * level + 21;
                let text = format!("{:width$}mallocs: {}, frees: {}%n", "", mallocs, frees);
                self.out.print(&text, None);
            }
        }
        self.memory.error = true;
    }

    // ==== HEADERS ===========================================================

    /// Print whichever headers are still pending for the current position:
    /// filename, group, unprinted contexts, then the test description.
    /// Returns the indent level for detail lines that follow.
    fn print_headers(&mut self, desc_color: Color, desc_level: PrintLevel, append: &str) -> usize {
        if !self.filename_printed {
            let text = format!("in file: %c{}", self.suite_file);
            self.out.print(&text, Some(Color::BoldPurple));
            self.filename_printed = true;
        }

        if !self.function_printed {
            if let Some(group) = self.group {
                let text = format!(
                    "{}in function ({}):%c {}",
                    self.pad(1),
                    group.line,
                    group.name
                );
                self.out.print(&text, Some(Color::BoldCyan));
            }
            self.function_printed = true;
        }

        let mut level = 2;
        for i in 1..self.ctx.level_count() {
            let frame = self.ctx.frames_mut()[i];
            if !frame.printed {
                let text = format!("{}{}", self.pad(level), frame.desc);
                self.out.print(&text, Some(Color::Cyan));
                self.ctx.frames_mut()[i].printed = true;
            }
            level += 1;
        }

        if self.desc_printed < desc_level {
            if !self.in_progress {
                let text = format!("{}pre-test", self.pad(level));
                self.out.print(&text, None);
                self.desc_printed = PrintLevel::Printed;
            } else {
                let text = format!("{}{}{}", self.pad(level), self.description, append);
                self.out.print(&text, Some(desc_color));
                self.desc_printed = desc_level;
            }
        }

        level + 1
    }

    fn pad(&self, level: usize) -> String {
        " ".repeat(self.params.tab_size * level)
    }
}
