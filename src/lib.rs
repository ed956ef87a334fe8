//! A behavior-driven test runner with nested contexts, per-test isolation,
//! and a fenced memory sandbox.
//!
//! Tests are declared with [`describe!`], [`it!`], and [`context!`], and
//! asserted with [`expect!`]. A group body re-runs once per test it
//! contains, so every test starts from fresh local state while still
//! seeing the setup code of its enclosing contexts. Allocations made
//! through the [`Spec`] handle land in a sandbox that catches overruns,
//! leaks, double frees, and writes after free.
//!
//! ```no_run
//! use respec::{describe, expect, it, run_all, suite};
//!
//! describe!(addition, |s| {
//!     it!(s, "adds small numbers", {
//!         expect!(s, 1 + 1, ==, 2);
//!     });
//! });
//!
//! suite!(arithmetic: addition);
//!
//! fn main() {
//!     std::process::exit(run_all(&[arithmetic()]));
//! }
//! ```
//!
//! The binary accepts a `file[:line]` filter and flags for verbosity,
//! padding, and memory testing; run with `--help` for the full list.

mod cli;
mod context;
mod engine;
mod macros;
pub mod matchers;
mod memory;
mod output;
mod suite;
mod value;

pub use cli::{LineSelect, Params, Verbosity};
pub use engine::Spec;
pub use memory::SandboxPtr;
pub use output::{Color, ConsoleSink, LineSink, OutputBuffer};
pub use suite::{run_all, run_all_from, run_all_with_sink, GroupFn, TestGroup, TestSuite};
pub use value::{ToValue, Value};
