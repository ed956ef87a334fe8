//! The runner exercising itself: a spec file written with the full macro
//! surface, run end to end and checked against its expected totals.

use respec::{
    after, context, describe, expect, it, run_all_with_sink, suite, test_log, OutputBuffer,
};

fn run(suites: &[respec::TestSuite], args: &[&str]) -> (i32, OutputBuffer) {
    let buffer = OutputBuffer::new();
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    let code = run_all_with_sink(suites, &args, Box::new(buffer.clone()));
    (code, buffer)
}

describe!(fresh_state, |s| {
    let mut incrementor = 1;
    context!(s, "after shared setup", {
        incrementor += 1;
        it!(s, "sees the counter at two", {
            expect!(s, incrementor, ==, 2);
        });
        it!(s, "is not affected by the previous test", {
            incrementor += 10;
            expect!(s, incrementor, ==, 12);
        });
    });
    it!(s, "never sees the setup from outside the context", {
        expect!(s, incrementor, ==, 1);
    });
});

describe!(comparisons, |s| {
    it!(s, "handles the ordered operators", {
        let (low, high) = (3, 7);
        expect!(s, low, <, high);
        expect!(s, low, <=, 3);
        expect!(s, high, >, low);
        expect!(s, high, >=, 7);
        expect!(s, low, !=, high);
    });
    it!(s, "compares strings and chars", {
        let name = "sandbox";
        expect!(s, name, ==, "sandbox");
        expect!(s, 'x', !=, 'y');
    });
});

describe!(matching, |s| {
    it!(s, "bounds values inclusively", {
        let x = 3;
        expect!(s, x, be_between(1, 5));
        expect!(s, 1, be_between(1, 5));
        expect!(s, 1, not be_between_exclusive(1, 5));
        expect!(s, x, not be_between(10, 20));
    });
    it!(s, "measures distance from a target", {
        expect!(s, 3, be_within(2, 5));
        expect!(s, 7, be_within(2, 5));
        expect!(s, 8, not be_within(2, 5));
    });
    it!(s, "approximates floats", {
        let third = 1.0f32 / 3.0;
        expect!(s, third, !=, 0.3333f32);
        expect!(s, third, be_about(0.3333));
    });
    it!(s, "knows parity and sign", {
        expect!(s, 4, be_even);
        expect!(s, 3, be_odd);
        expect!(s, 5, be_positive);
        expect!(s, -5, be_negative);
        expect!(s, true, be_true);
        expect!(s, false, be_false);
    });
});

describe!(shared_resource, |s| {
    context!(s, "with an allocated buffer", {
        let buffer = s.malloc(8);
        it!(s, "can write into it", {
            if let Some(ptr) = buffer {
                s.poke(ptr, 1);
                expect!(s, s.peek(ptr), ==, 1u8);
            }
        });
        it!(s, "gets a dirty buffer each time", {
            if let Some(ptr) = buffer {
                test_log!(s, "each test allocates its own block");
                expect!(s, s.peek(ptr), ==, b'N');
            }
        });
        after!(s, {
            if let Some(ptr) = buffer {
                s.free(ptr);
            }
        });
    });
});

describe!(nesting, |s| {
    let mut depth = 0;
    context!(s, "one level in", {
        depth += 1;
        context!(s, "two levels in", {
            depth += 1;
            it!(s, "sees both setups", {
                expect!(s, depth, ==, 2);
            });
        });
        it!(s, "sees only the outer setup", {
            expect!(s, depth, ==, 1);
        });
    });
});

describe!(pending, |s| {
    it!(s, "will support unicode descriptions someday");
});

suite!(selfspec: fresh_state, comparisons, matching, shared_resource, nesting, pending);

#[test]
fn the_whole_spec_passes() {
    let (code, buffer) = run(&[selfspec()], &[]);
    assert_eq!(code, 0, "{}", buffer.text());
    assert!(buffer.contains("14 out of 14, or 100%"), "{}", buffer.text());
}

#[test]
fn the_whole_spec_passes_verbosely_too() {
    let (code, buffer) = run(&[selfspec()], &["-V", "-n", "-p", "-s"]);
    assert_eq!(code, 0, "{}", buffer.text());
    assert!(buffer.contains("it will support unicode descriptions someday"));
}
