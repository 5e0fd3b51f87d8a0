#![no_main]

use libfuzzer_sys::fuzz_target;
use tailmetrics_log_pipeline::rule::{FieldSpec, ValueSpec};

fuzz_target!(|data: &[u8]| {
    if let Ok(spec) = std::str::from_utf8(data) {
        // 문법 오류는 Err로만 보고되어야 함
        let _ = ValueSpec::parse(spec);
        let _ = FieldSpec::parse(spec);
    }
});
