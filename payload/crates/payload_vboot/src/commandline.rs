use core::fmt::{self, Write};

use thiserror::Error;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum CommandLineError {
    #[error("substituted command line does not fit into {0} bytes")]
    TooLong(usize),
    #[error("disk number {0} has no drive letter")]
    DevNum(u32),
}

/// Highest disk number `%D` can name, drive `z`.
pub const MAX_DEVNUM: u32 = 25;

/// Appended when the partition table is not on the boot disk.
const EXTERNAL_GPT_ARG: &[u8] = b" gpt";

/// Values substituted into a kernel command line template.
#[derive(Debug, Copy, Clone)]
pub struct CommandLineParams<'a> {
    /// Index of the boot disk, `%D` expands to `'a' + devnum`.
    pub devnum: u32,
    /// One-based partition number, `%P`.
    pub partnum: u32,
    /// Partition GUID, `%U`.
    pub guid: &'a [u8; 16],
    /// Tell the kernel where to find its partition table.
    pub external_gpt: bool,
}

struct Cursor<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl Cursor<'_> {
    fn push(&mut self, byte: u8) -> Result<(), CommandLineError> {
        let capacity = self.buf.len();
        let slot = self
            .buf
            .get_mut(self.len)
            .ok_or(CommandLineError::TooLong(capacity))?;
        *slot = byte;
        self.len += 1;
        Ok(())
    }
}

impl Write for Cursor<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        s.bytes().try_for_each(|b| self.push(b).map_err(|_| fmt::Error))
    }
}

/// Expand `%D`, `%P` and `%U` in `src` into `dst`.
///
/// `src` ends at its first NUL byte. Other `%` sequences are copied as
/// they are. With `external_gpt` set, ` gpt` is appended. The result is
/// NUL terminated; the returned length does not include the terminator.
pub fn substitute(
    src: &[u8],
    params: &CommandLineParams<'_>,
    dst: &mut [u8],
) -> Result<usize, CommandLineError> {
    let capacity = dst.len();
    let too_long = |_| CommandLineError::TooLong(capacity);
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    let mut out = Cursor { buf: dst, len: 0 };

    let mut bytes = src[..end].iter().copied().peekable();
    while let Some(byte) = bytes.next() {
        if byte != b'%' {
            out.push(byte)?;
            continue;
        }
        match bytes.peek().copied() {
            Some(b'D') => {
                let devnum = u8::try_from(params.devnum)
                    .ok()
                    .filter(|&n| u32::from(n) <= MAX_DEVNUM)
                    .ok_or(CommandLineError::DevNum(params.devnum))?;
                out.push(b'a' + devnum)?;
            }
            Some(b'P') => {
                write!(out, "{}", params.partnum).map_err(too_long)?;
            }
            Some(b'U') => {
                write_guid(&mut out, params.guid).map_err(too_long)?;
            }
            _ => {
                out.push(byte)?;
                continue;
            }
        }
        bytes.next();
    }

    if params.external_gpt {
        EXTERNAL_GPT_ARG.iter().try_for_each(|&b| out.push(b))?;
    }

    let len = out.len;
    out.push(0)?;
    Ok(len)
}

/// Canonical upper-case form, with the first three fields little-endian.
fn write_guid(out: &mut impl Write, g: &[u8; 16]) -> fmt::Result {
    write!(
        out,
        "{:02X}{:02X}{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-",
        g[3], g[2], g[1], g[0], g[5], g[4], g[7], g[6], g[8], g[9]
    )?;
    g[10..].iter().try_for_each(|b| write!(out, "{b:02X}"))
}
