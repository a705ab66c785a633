#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use segdir::store::{DataInput, IndexInput, MemoryIndexInput};

#[derive(Debug, Arbitrary)]
enum Op {
    ReadByte,
    ReadBytes(u16),
    Seek(u16),
    Skip(u8),
    SetBufferSize(u8),
    Clone,
}

#[derive(Debug, Arbitrary)]
struct Input {
    data: Vec<u8>,
    buffer_size: u8,
    ops: Vec<Op>,
}

fuzz_target!(|input: Input| {
    // Run random cursor operations and check every successful read against
    // the backing bytes
    let data = input.data;
    let mut cursor =
        MemoryIndexInput::from_bytes("fuzz", data.clone(), input.buffer_size.max(1) as usize);

    for op in input.ops {
        let pos = cursor.file_pointer() as usize;
        match op {
            Op::ReadByte => {
                if let Ok(b) = cursor.read_byte() {
                    assert_eq!(b, data[pos]);
                } else {
                    assert!(pos >= data.len());
                }
            }
            Op::ReadBytes(n) => {
                let mut buf = vec![0u8; n as usize];
                if cursor.read_bytes(&mut buf).is_ok() {
                    assert_eq!(&buf[..], &data[pos..pos + buf.len()]);
                } else {
                    assert!(pos + buf.len() > data.len());
                    break;
                }
            }
            Op::Seek(p) => {
                cursor.seek(p as u64).unwrap();
                assert_eq!(cursor.file_pointer(), p as u64);
            }
            Op::Skip(n) => {
                if cursor.skip_bytes(n as u64).is_err() {
                    break;
                }
            }
            Op::SetBufferSize(n) => cursor.set_buffer_size(n.max(1) as usize),
            Op::Clone => {
                let mut clone = cursor.try_clone().unwrap();
                assert_eq!(clone.file_pointer(), cursor.file_pointer());
                if let Ok(b) = clone.read_byte() {
                    assert_eq!(b, data[pos]);
                }
            }
        }
    }
});
