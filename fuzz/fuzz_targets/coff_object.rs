#![no_main]

use libfuzzer_sys::fuzz_target;
use pewter_coff::CoffFile;

fuzz_target!(|data: &[u8]| {
    // Try to parse as a COFF object - should never panic
    match CoffFile::parse(data) {
        Ok(mut object) => {
            for section in object.sections() {
                let _ = section.name().len();
                let _ = section.file_end();
            }
            let strings = object.string_table().clone();
            for symbol in object.symbols() {
                let _ = symbol.resolved_name(&strings);
                let _ = symbol.record_count();
            }

            // Re-emitting a parsed object must not panic either
            let _ = object.to_bytes();
        }
        Err(_) => {
            // Parse errors are expected for malformed input
        }
    }
});
