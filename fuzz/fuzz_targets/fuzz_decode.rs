#![no_main]

use libfuzzer_sys::fuzz_target;
use segdir::store::{DataInput, IndexInput, MemoryIndexInput};

fuzz_target!(|data: &[u8]| {
    // Decode a stream of mixed primitives from arbitrary bytes
    // Every failure must surface as an error, never a panic
    if data.is_empty() {
        return;
    }
    let buffer_size = (data[0] as usize % 64) + 1;
    let mut input = MemoryIndexInput::from_bytes("fuzz", &data[1..], buffer_size);

    while input.remaining() > 0 {
        let before = input.file_pointer();
        let result = match before % 5 {
            0 => input.read_vint().map(drop),
            1 => input.read_vlong().map(drop),
            2 => input.read_int().map(drop),
            3 => input.read_string().map(drop),
            _ => input.read_long().map(drop),
        };
        if result.is_err() {
            break;
        }
        assert!(input.file_pointer() > before);
        assert!(input.file_pointer() <= input.length());
    }
});
