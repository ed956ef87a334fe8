//! Command-line interface for the test runner.
//!
//! Arguments are parsed with clap into [`Args`] and then folded into
//! [`Params`], the runtime configuration the engine actually consumes.
//! The positional target narrows the run: `file` keeps only suites whose
//! filename ends with it, `file:line` or a bare `:line` additionally keeps
//! only the test or context declared on that line.

use clap::Parser;

// ============================================================================
// ARGUMENT PARSING
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "respec",
    about = "Runs spec suites with optional file and line filtering",
    disable_version_flag = true
)]
struct Args {
    /// Restrict the run to `file`, `file:line`, or `:line`
    target: Option<String>,

    /// Report passing tests as they run
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Also show log output from tests
    #[arg(short = 'n', long = "notes")]
    notes: bool,

    /// Show everything, including skipped files and pre-test headers
    #[arg(short = 'V', long = "very-verbose")]
    very_verbose: bool,

    /// Run tests marked expected-to-fail as ordinary tests
    #[arg(short = 'f', long = "force-fails")]
    force_fails: bool,

    /// Disable the memory sandbox checks
    #[arg(short = 'm', long = "ignore-memory")]
    ignore_memory: bool,

    /// Append operand types to failed expectation reports
    #[arg(short = 's', long = "show-types")]
    show_types: bool,

    /// Pad reports with blank lines for readability
    #[arg(short = 'p', long = "padding")]
    padding: bool,

    /// Spaces per indentation level in reports
    #[arg(short = 't', long = "tab-size", default_value_t = 2)]
    tab_size: usize,
}

// ============================================================================
// RUNTIME PARAMETERS
// ============================================================================

/// How much a run reports. Each level includes everything below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Failures and the summary only.
    Quiet,
    /// Plus log and warning output.
    Notes,
    /// Plus passing tests.
    Run,
    /// Plus skipped files and pre-test headers.
    Full,
}

/// Which tests a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSelect {
    /// No line filter.
    All,
    /// Only the test or context declared on this line.
    Line(u32),
    /// The selected scope has finished; skip the rest.
    Done,
}

/// Runtime configuration derived from the command line.
#[derive(Debug, Clone)]
pub struct Params {
    pub file: Option<String>,
    pub select: LineSelect,
    pub verbosity: Verbosity,
    pub tab_size: usize,
    pub padding: bool,
    pub force_fails: bool,
    pub memory_test: bool,
    pub show_types: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            file: None,
            select: LineSelect::All,
            verbosity: Verbosity::Quiet,
            tab_size: 2,
            padding: false,
            force_fails: false,
            memory_test: true,
            show_types: false,
        }
    }
}

impl Params {
    /// Parse runner arguments (without the program name).
    pub fn parse(args: &[String]) -> Result<Params, clap::Error> {
        let args = Args::try_parse_from(
            std::iter::once("respec".to_string()).chain(args.iter().cloned()),
        )?;

        let verbosity = if args.very_verbose {
            Verbosity::Full
        } else if args.verbose {
            Verbosity::Run
        } else if args.notes {
            Verbosity::Notes
        } else {
            Verbosity::Quiet
        };

        let (file, select) = match args.target.as_deref() {
            Some(target) => split_target(target),
            None => (None, LineSelect::All),
        };

        // A line selection implies the caller wants to see that test's
        // output even when it logs.
        let verbosity = match select {
            LineSelect::Line(_) if verbosity == Verbosity::Quiet => Verbosity::Notes,
            _ => verbosity,
        };

        Ok(Params {
            file,
            select,
            verbosity,
            tab_size: args.tab_size,
            padding: args.padding,
            force_fails: args.force_fails,
            memory_test: !args.ignore_memory,
            show_types: args.show_types,
        })
    }
}

fn split_target(target: &str) -> (Option<String>, LineSelect) {
    match target.split_once(':') {
        Some((file, line)) => {
            let file = if file.is_empty() {
                None
            } else {
                Some(file.to_string())
            };
            match line.parse::<u32>() {
                Ok(n) => (file, LineSelect::Line(n)),
                Err(_) => (file, LineSelect::All),
            }
        }
        None => (Some(target.to_string()), LineSelect::All),
    }
}
