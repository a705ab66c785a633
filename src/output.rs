//! Output formatting for directory listings and hex dumps

use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Bytes shown per hex dump row
pub const DUMP_WIDTH: usize = 16;

fn stdout_for(color: bool) -> StandardStream {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

/// Print directory entries as `size  name`, directories marked with a trailing slash
pub fn print_listing(entries: &[(String, Option<u64>)], color: bool) -> io::Result<()> {
    let mut stdout = stdout_for(color);
    let width = entries
        .iter()
        .filter_map(|(_, len)| len.map(|l| l.to_string().len()))
        .max()
        .unwrap_or(1);

    for (name, len) in entries {
        match len {
            Some(len) => {
                stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
                write!(stdout, "{:>width$}", len, width = width)?;
                stdout.reset()?;
                writeln!(stdout, "  {}", name)?;
            }
            None => {
                write!(stdout, "{:>width$}  ", "-", width = width)?;
                stdout.set_color(ColorSpec::new().set_fg(Some(Color::Blue)).set_bold(true))?;
                writeln!(stdout, "{}/", name)?;
                stdout.reset()?;
            }
        }
    }

    Ok(())
}

/// Print `bytes` as a hex dump whose first row starts at file offset `start`
pub fn print_hex_dump(start: u64, bytes: &[u8], color: bool) -> io::Result<()> {
    let mut stdout = stdout_for(color);
    write_hex_dump(&mut stdout, start, bytes)
}

/// Write a hex dump in `xxd` layout: offset, hex columns, printable ASCII
pub fn write_hex_dump<W: WriteColor>(out: &mut W, start: u64, bytes: &[u8]) -> io::Result<()> {
    for (row, chunk) in bytes.chunks(DUMP_WIDTH).enumerate() {
        let offset = start + (row * DUMP_WIDTH) as u64;

        out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
        write!(out, "{:08x}", offset)?;
        out.reset()?;
        write!(out, ": ")?;

        for i in 0..DUMP_WIDTH {
            match chunk.get(i) {
                Some(&b) => {
                    if b == 0 {
                        out.set_color(ColorSpec::new().set_dimmed(true))?;
                        write!(out, "{:02x}", b)?;
                        out.reset()?;
                    } else {
                        write!(out, "{:02x}", b)?;
                    }
                }
                None => write!(out, "  ")?,
            }
            if i % 2 == 1 {
                write!(out, " ")?;
            }
        }

        write!(out, " ")?;
        for &b in chunk {
            if b.is_ascii_graphic() || b == b' ' {
                write!(out, "{}", b as char)?;
            } else {
                out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
                write!(out, ".")?;
                out.reset()?;
            }
        }
        writeln!(out)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use termcolor::NoColor;

    fn dump(start: u64, bytes: &[u8]) -> String {
        let mut out = NoColor::new(Vec::new());
        write_hex_dump(&mut out, start, bytes).unwrap();
        String::from_utf8(out.into_inner()).unwrap()
    }

    #[test]
    fn test_hex_dump_single_row() {
        let text = dump(0, b"AB\x00\x7f");
        assert_eq!(
            text,
            "00000000: 4142 007f                                AB..\n"
        );
    }

    #[test]
    fn test_hex_dump_rows_follow_start_offset() {
        let bytes: Vec<u8> = (0u8..20).collect();
        let text = dump(0x100, &bytes);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00000100: 0001 0203"));
        assert!(lines[1].starts_with("00000110: 1011 1213"));
    }

    #[test]
    fn test_hex_dump_empty() {
        assert_eq!(dump(0, &[]), "");
    }
}
