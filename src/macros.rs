//! Declaration macros: `describe!`, `suite!`, `it!`, `context!`, `expect!`
//! and the in-test helpers.
//!
//! The macros exist to capture what a plain function call cannot: the
//! source line, the expression text, and the operand types of a failed
//! expectation. All real work happens in [`Spec`](crate::Spec) methods.

/// Declares a test group as a function returning a
/// [`TestGroup`](crate::TestGroup).
///
/// ```
/// use respec::{describe, it, expect};
///
/// describe!(addition, |s| {
///     it!(s, "adds small numbers", {
///         expect!(s, 1 + 1, ==, 2);
///     });
/// });
/// ```
#[macro_export]
macro_rules! describe {
    ($name:ident, |$spec:ident| $body:block) => {
        pub fn $name() -> $crate::TestGroup {
            fn body($spec: &mut $crate::Spec) $body
            $crate::TestGroup::new(line!(), stringify!($name), body)
        }
    };
}

/// Bundles declared groups into a [`TestSuite`](crate::TestSuite) for this
/// file.
#[macro_export]
macro_rules! suite {
    ($name:ident: $($group:ident),+ $(,)?) => {
        pub fn $name() -> $crate::TestSuite {
            $crate::TestSuite::new(file!(), vec![$($group()),+])
        }
    };
}

/// Declares one test. The body runs in its own pass over the group, so
/// changes to group-local variables never leak between tests. The bodyless
/// form marks a test as pending.
#[macro_export]
macro_rules! it {
    ($spec:ident, $desc:literal, $body:block) => {
        if $spec.begin_test(line!(), concat!("test %c[", line!(), "] it ", $desc)) $body
    };
    ($spec:ident, $desc:literal $(,)?) => {
        let _ = $spec.begin_test(line!(), concat!("test %c[", line!(), "] it ", $desc));
    };
}

/// Like [`it!`] without the "it" in the description.
#[macro_export]
macro_rules! test {
    ($spec:ident, $desc:literal, $body:block) => {
        if $spec.begin_test(line!(), concat!("test %c[", line!(), "] ", $desc)) $body
    };
    ($spec:ident, $desc:literal $(,)?) => {
        let _ = $spec.begin_test(line!(), concat!("test %c[", line!(), "] ", $desc));
    };
}

/// Opens a context block. Setup before the tests inside re-runs for each
/// of them; the block closes for good once every test in it has run.
#[macro_export]
macro_rules! context {
    ($spec:ident, $desc:literal, $body:block) => {
        if $spec.context_begin(line!(), concat!("context: %c[", line!(), "] ", $desc)) {
            $body
            if $spec.context_end(line!()) {
                return;
            }
        }
    };
}

/// Runs the body only while a test is active, for teardown after the
/// tests of a context.
#[macro_export]
macro_rules! after {
    ($spec:ident, $body:block) => {
        if $spec.active() $body
    };
}

/// The assertion macro. Forms, tried in order:
///
/// * `expect!(s, to_fail)` and the memory directives `memory_errors`,
///   `null_malloc`, `null_mallocs`
/// * `expect!(s, value, matcher(args...))`, optionally with `not`
/// * `expect!(s, lhs, op, rhs)` for `==`, `!=`, `<`, `<=`, `>`, `>=`
/// * `expect!(s, value, matcher)`, optionally with `not`
/// * `expect!(s, condition)`
///
/// A failed expectation reports and returns from the group body; the
/// engine then moves on to the next test.
#[macro_export]
macro_rules! expect {
    ($spec:ident, to_fail) => {{
        let __ok = $spec.expect_to_fail();
        if !$spec.check(line!(), __ok, "to_fail") {
            return;
        }
    }};
    ($spec:ident, memory_errors) => {{
        let __ok = $spec.expect_memory_errors();
        if !$spec.check(line!(), __ok, "memory_errors") {
            return;
        }
    }};
    ($spec:ident, null_malloc) => {{
        let __ok = $spec.fail_next_alloc(true);
        if !$spec.check(line!(), __ok, "null_malloc") {
            return;
        }
    }};
    ($spec:ident, null_mallocs) => {{
        let __ok = $spec.fail_next_alloc(false);
        if !$spec.check(line!(), __ok, "null_mallocs") {
            return;
        }
    }};
    ($spec:ident, $val:expr, not $matcher:ident($($arg:expr),+ $(,)?)) => {{
        let __val = $val;
        let __shown = $crate::ToValue::to_value(&__val);
        let __ty = ::std::any::type_name_of_val(&__val);
        let __ok = !$crate::matchers::$matcher(__val, $($arg),+);
        if !$spec.check_match(
            line!(),
            __ok,
            concat!(
                stringify!($val), " to not ",
                stringify!($matcher), stringify!(($($arg),+)),
            ),
            __shown,
            __ty,
        ) {
            return;
        }
    }};
    ($spec:ident, $val:expr, $matcher:ident($($arg:expr),+ $(,)?)) => {{
        let __val = $val;
        let __shown = $crate::ToValue::to_value(&__val);
        let __ty = ::std::any::type_name_of_val(&__val);
        let __ok = $crate::matchers::$matcher(__val, $($arg),+);
        if !$spec.check_match(
            line!(),
            __ok,
            concat!(
                stringify!($val), " to ",
                stringify!($matcher), stringify!(($($arg),+)),
            ),
            __shown,
            __ty,
        ) {
            return;
        }
    }};
    ($spec:ident, $val:expr, not $matcher:ident) => {{
        let __val = $val;
        let __shown = $crate::ToValue::to_value(&__val);
        let __ty = ::std::any::type_name_of_val(&__val);
        let __ok = !$crate::matchers::$matcher(__val);
        if !$spec.check_match(
            line!(),
            __ok,
            concat!(stringify!($val), " to not ", stringify!($matcher)),
            __shown,
            __ty,
        ) {
            return;
        }
    }};
    ($spec:ident, $lhs:expr, $op:tt, $rhs:expr) => {{
        let __lhs = $lhs;
        let __rhs = $rhs;
        let __ok = __lhs $op __rhs;
        if !$spec.check_cmp(
            line!(),
            __ok,
            concat!(stringify!($lhs), " ", stringify!($op), " ", stringify!($rhs)),
            stringify!($op),
            $crate::ToValue::to_value(&__lhs),
            $crate::ToValue::to_value(&__rhs),
            (
                ::std::any::type_name_of_val(&__lhs),
                ::std::any::type_name_of_val(&__rhs),
            ),
        ) {
            return;
        }
    }};
    ($spec:ident, $val:expr, $matcher:ident) => {{
        let __val = $val;
        let __shown = $crate::ToValue::to_value(&__val);
        let __ty = ::std::any::type_name_of_val(&__val);
        let __ok = $crate::matchers::$matcher(__val);
        if !$spec.check_match(
            line!(),
            __ok,
            concat!(stringify!($val), " to ", stringify!($matcher)),
            __shown,
            __ty,
        ) {
            return;
        }
    }};
    ($spec:ident, $cond:expr) => {{
        let __ok = $cond;
        if !$spec.check(line!(), __ok, stringify!($cond)) {
            return;
        }
    }};
}

/// Logs a note at the current position, shown at `-n` and above.
#[macro_export]
macro_rules! test_log {
    ($spec:ident, $msg:expr) => {
        $spec.log(line!(), $msg)
    };
}

/// Emits a warning. Warnings are always shown and counted in the summary,
/// but do not fail the test.
#[macro_export]
macro_rules! test_warn {
    ($spec:ident, $msg:expr) => {
        $spec.warn(line!(), $msg)
    };
}

/// Fails the current test with a message and ends its body.
#[macro_export]
macro_rules! test_fail {
    ($spec:ident, $msg:expr) => {{
        $spec.error($msg);
        return;
    }};
}

/// Dumps the sandbox block at `ptr`, shown at `-n` and above.
#[macro_export]
macro_rules! test_log_memory {
    ($spec:ident, $ptr:expr) => {
        $spec.log_memory(line!(), $ptr)
    };
}
