#![no_main]

use libfuzzer_sys::fuzz_target;
use pewter_pe::Image;

fuzz_target!(|data: &[u8]| {
    // Try to parse as a PE image - should never panic
    match Image::parse(data) {
        Ok(image) => {
            // If parsing succeeds, exercise the parsed model
            let _ = image.optional_header.magic();
            let _ = image.optional_header.image_base();

            for section in image.sections() {
                let _ = section.name().len();
                let _ = section.header.flags_string();
                let _ = section.virtual_end();
            }

            for descriptor in image.imports() {
                let _ = descriptor.dll_name.len();
                let _ = descriptor.imports.len();
            }
            if let Some(exports) = image.exports() {
                let _ = exports.image_name.len();
                let _ = exports.symbols.len();
            }
            if let Some(relocs) = image.base_relocations() {
                let _ = relocs.entry_count();
            }

            // Typed readers are bounds-checked
            let _ = image.try_read_u32_at_rva(0x1000);
            let _ = image.read_string_at_rva(0x2000);

            let _ = image.rich_header();

            // Re-emitting a parsed image must not panic either. Emission
            // honors the claimed header size, so bound it to keep malformed
            // inputs from ballooning the output buffer.
            if image.optional_header.size_of_headers() < 0x0100_0000 {
                let _ = image.to_bytes();
                let _ = image.validate();
            }
        }
        Err(_) => {
            // Parse errors are expected for malformed input
        }
    }
});
