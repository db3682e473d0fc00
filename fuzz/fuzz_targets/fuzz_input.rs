// SPDX-License-Identifier: PMPL-1.0
#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use audiotag::naming::{sanitize_filename, short_caption};
use audiotag::pipeline::{remove_links, TextRules};
use audiotag::rules::ConditionOperator;

#[derive(Arbitrary, Debug)]
struct Input {
    text: String,
    needle: String,
    replacement: String,
}

fuzz_target!(|input: Input| {
    let name = sanitize_filename(&input.text);
    assert!(!name.contains('/'));
    let _ = short_caption(&input.text);
    let _ = remove_links(&input.text);

    for op in ConditionOperator::ALL {
        let _ = op.matches(&input.text, &input.needle);
    }

    let rules = TextRules {
        replacements: vec![(input.needle, input.replacement)],
        remove_links: true,
        ..TextRules::default()
    };
    let _ = rules.process("title", &input.text);
});
