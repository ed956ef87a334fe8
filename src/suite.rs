//! Suite and group declarations plus the top-level entry points.
//!
//! A group is a plain function taking `&mut Spec`, usually declared with
//! the [`describe!`](crate::describe) macro; a suite bundles the groups of
//! one file. [`run_all`] is what a test binary's `main` calls.

use crate::cli::Params;
use crate::engine::Spec;
use crate::output::{ConsoleSink, LineSink};

pub type GroupFn = fn(&mut Spec);

/// One `describe` block: a named group of tests run as a unit.
#[derive(Clone, Copy)]
pub struct TestGroup {
    pub line: u32,
    pub name: &'static str,
    pub body: GroupFn,
}

impl TestGroup {
    pub fn new(line: u32, name: &'static str, body: GroupFn) -> Self {
        Self { line, name, body }
    }
}

/// All the groups declared in one source file.
pub struct TestSuite {
    pub filename: &'static str,
    pub groups: Vec<TestGroup>,
}

impl TestSuite {
    pub fn new(filename: &'static str, groups: Vec<TestGroup>) -> Self {
        Self { filename, groups }
    }
}

/// Run every suite with arguments from the process command line.
/// Returns the number of failed tests, suitable as an exit code.
pub fn run_all(suites: &[TestSuite]) -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();
    run_all_from(suites, &args)
}

/// Run every suite with explicit arguments, reporting to stdout.
pub fn run_all_from(suites: &[TestSuite], args: &[String]) -> i32 {
    run_all_with_sink(suites, args, Box::new(ConsoleSink::auto()))
}

/// Run every suite with explicit arguments and a caller-supplied sink.
pub fn run_all_with_sink(suites: &[TestSuite], args: &[String], sink: Box<dyn LineSink>) -> i32 {
    let params = match Params::parse(args) {
        Ok(params) => params,
        Err(err) => {
            // Help output or a usage error; either way the run is a no-op.
            let _ = err.print();
            return 0;
        }
    };

    let mut spec = Spec::new(params, sink);
    spec.before_run();
    for suite in suites {
        spec.run_suite(suite);
    }
    spec.summary();
    spec.failing_count()
}
