#![no_main]

use libfuzzer_sys::fuzz_target;
use minilisp::{EvalConfig, Evaluator};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let mut evaluator = Evaluator::with_config(EvalConfig {
            max_call_depth: 200,
            trace_calls: false,
        });
        let globals = evaluator.globals().clone();
        for form in minilisp::parse_all(s) {
            let Ok((expr, _)) = form else { break };
            // Printing must never fail on anything the evaluator produces
            if let Ok(value) = evaluator.eval(&expr, &globals) {
                let _ = value.to_string();
            }
        }
    }
});
