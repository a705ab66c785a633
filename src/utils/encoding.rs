//! Encoders matching the on-disk formats decoded by
//! [`DataInput`](crate::store::DataInput).

/// Encode a u32 as a vint (7-bit groups, low group first)
pub fn encode_vint(mut value: u32, buf: &mut Vec<u8>) {
    loop {
        if value < 0x80 {
            buf.push(value as u8);
            break;
        }
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
}

/// Encode a u64 as a vlong
pub fn encode_vlong(mut value: u64, buf: &mut Vec<u8>) {
    loop {
        if value < 0x80 {
            buf.push(value as u8);
            break;
        }
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
}

/// Encode a string as a vint byte length followed by UTF-8 bytes
pub fn encode_string(value: &str, buf: &mut Vec<u8>) {
    encode_vint(value.len() as u32, buf);
    buf.extend_from_slice(value.as_bytes());
}

/// Append an i32 in big-endian format
pub fn put_int(value: i32, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Append an i64 in big-endian format
pub fn put_long(value: i64, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&value.to_be_bytes());
}
