//! Output formatting: headers, failure detail, verbosity levels, padding,
//! and the summary line.

use respec::{
    context, describe, expect, it, run_all_with_sink, suite, test_log, test_warn, OutputBuffer,
};

fn run(suites: &[respec::TestSuite], args: &[&str]) -> (i32, OutputBuffer) {
    let buffer = OutputBuffer::new();
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    let code = run_all_with_sink(suites, &args, Box::new(buffer.clone()));
    (code, buffer)
}

describe!(passing, |s| {
    it!(s, "shows up only when verbose", {
        expect!(s, true);
    });
});

describe!(failing, |s| {
    it!(s, "compares two numbers", {
        let (two, three) = (2, 3);
        expect!(s, two, ==, three);
    });
});

describe!(nested_failure, |s| {
    context!(s, "inside a context", {
        it!(s, "fails in here", {
            expect!(s, false);
        });
    });
});

describe!(noisy, |s| {
    it!(s, "logs a note", {
        test_log!(s, "this only shows at -n and up");
        expect!(s, true);
    });
});

describe!(warning, |s| {
    it!(s, "warns but passes", {
        test_warn!(s, "beware of this");
        expect!(s, true);
    });
});

suite!(passing_suite: passing);
suite!(failing_suite: failing);
suite!(nested_suite: nested_failure);
suite!(noisy_suite: noisy);
suite!(warning_suite: warning);

#[test]
fn a_quiet_passing_run_prints_only_the_summary() {
    let (code, buffer) = run(&[passing_suite()], &[]);
    assert_eq!(code, 0);
    assert_eq!(buffer.lines().len(), 1, "{}", buffer.text());
    assert!(buffer.contains("Tests passed: 1 out of 1, or 100%"));
}

#[test]
fn an_empty_run_reports_zero_of_zero() {
    let (code, buffer) = run(&[], &[]);
    assert_eq!(code, 0);
    assert!(buffer.contains("Tests passed: 0 out of 0"));
}

#[test]
fn verbose_runs_print_passing_descriptions() {
    let (_, buffer) = run(&[passing_suite()], &["-v"]);
    assert!(buffer.contains("it shows up only when verbose"), "{}", buffer.text());
}

#[test]
fn a_failure_prints_the_full_header_chain() {
    let (code, buffer) = run(&[failing_suite()], &[]);
    assert_eq!(code, 1);
    assert!(buffer.contains("in file: "));
    assert!(buffer.contains("in function ("));
    assert!(buffer.contains("it compares two numbers"));
    assert!(buffer.contains("expected two == three"));
    assert!(buffer.contains("received 2 == 3"));
}

#[test]
fn a_context_header_appears_above_its_failing_test() {
    let (code, buffer) = run(&[nested_suite()], &[]);
    assert_eq!(code, 1);
    assert!(buffer.contains("context: [")); // emphasis marker stripped
    assert!(buffer.contains("inside a context"));
    assert!(buffer.contains("expected false"));
}

#[test]
fn show_types_appends_the_operand_types() {
    let (_, buffer) = run(&[failing_suite()], &["-s"]);
    assert!(buffer.contains(" : ( i32, i32 )"), "{}", buffer.text());
}

#[test]
fn padding_inserts_blank_lines_around_failures() {
    let (_, buffer) = run(&[failing_suite()], &["-p"]);
    assert!(buffer.lines().iter().any(|line| line.is_empty()));
}

#[test]
fn received_lines_align_under_expected() {
    let (_, buffer) = run(&[failing_suite()], &[]);
    let lines = buffer.lines();
    let expected = lines
        .iter()
        .find(|line| line.contains("expected two"))
        .cloned()
        .unwrap();
    let received = lines
        .iter()
        .find(|line| line.contains("received 2"))
        .cloned()
        .unwrap();
    let expected_col = expected.find("expected").unwrap();
    let received_col = received.find("received").unwrap();
    assert_eq!(expected_col, received_col, "{}", buffer.text());
}

#[test]
fn notes_appear_at_dash_n_but_not_by_default() {
    let (_, quiet) = run(&[noisy_suite()], &[]);
    assert!(!quiet.contains("this only shows"));
    let (_, notes) = run(&[noisy_suite()], &["-n"]);
    assert!(notes.contains("this only shows"), "{}", notes.text());
    assert!(notes.contains("line "));
}

#[test]
fn warnings_pass_but_mark_the_summary() {
    let (code, buffer) = run(&[warning_suite()], &[]);
    assert_eq!(code, 0);
    assert!(buffer.contains("beware of this"));
    assert!(buffer.contains("1 out of 1, or 100% - warnings: 1"));
}

#[test]
fn a_wider_tab_size_indents_more() {
    let (_, narrow) = run(&[failing_suite()], &[]);
    let (_, wide) = run(&[failing_suite()], &["-t", "6"]);
    let indent_of = |buffer: &OutputBuffer| {
        buffer
            .lines()
            .iter()
            .find(|line| line.contains("in function ("))
            .map(|line| line.len() - line.trim_start().len())
            .unwrap()
    };
    assert_eq!(indent_of(&narrow), 2);
    assert_eq!(indent_of(&wide), 6);
}

#[test]
fn help_prints_without_running_anything() {
    let (code, buffer) = run(&[passing_suite()], &["--help"]);
    assert_eq!(code, 0);
    assert!(!buffer.contains("Tests passed"));
}
