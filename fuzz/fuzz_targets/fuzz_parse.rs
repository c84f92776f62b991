#![no_main]

use codevolve::{parse, render};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };
    // Cap inputs to keep the recursive-descent parser shallow
    if source.len() > 4096 {
        return;
    }

    let Ok(tree) = parse(source) else {
        return;
    };
    let canonical = render(&tree);
    let reparsed = parse(&canonical).expect("canonical output must parse");
    assert_eq!(render(&reparsed), canonical, "rendering is not a fixed point");
});
