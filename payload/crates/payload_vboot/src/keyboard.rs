//! Console input for the firmware screens.

use bitflags::bitflags;

pub const KEY_UP: u32 = 0x100;
pub const KEY_DOWN: u32 = 0x101;
pub const KEY_LEFT: u32 = 0x102;
pub const KEY_RIGHT: u32 = 0x103;

/// Curses codes some consoles deliver for the arrow keys.
const CURSES_KEY_DOWN: u32 = 0o402;
const CURSES_KEY_UP: u32 = 0o403;
const CURSES_KEY_LEFT: u32 = 0o404;
const CURSES_KEY_RIGHT: u32 = 0o405;

const CSI_0: u32 = 0x1B;
const CSI_1: u32 = 0x5B;

/// How long to wait for the rest of an escape sequence.
pub const ESCAPE_TIMEOUT_US: u64 = 10 * 1000;

bitflags! {
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct KeyFlags: u32 {
        const TRUSTED_KEYBOARD = 0x1;
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum InputType {
    Unknown,
    Serial,
    Usb,
    Ec,
}

pub trait Console {
    fn has_key(&mut self) -> bool;

    /// Blocks until a character is available.
    fn get_char(&mut self) -> u32;

    /// Device the last character came from.
    fn last_input_type(&self) -> InputType;
}

pub trait Clock {
    fn now_us(&mut self) -> u64;
}

/// Read one key, translated to the engine's key codes. Returns 0 if no
/// key is pending or an escape sequence was not understood.
pub fn read_key<C, T>(console: &mut C, clock: &mut T) -> u32
where
    C: Console + ?Sized,
    T: Clock + ?Sized,
{
    if !console.has_key() {
        return 0;
    }

    match console.get_char() {
        0x0A => 0x0D,
        CURSES_KEY_UP => KEY_UP,
        CURSES_KEY_DOWN => KEY_DOWN,
        CURSES_KEY_RIGHT => KEY_RIGHT,
        CURSES_KEY_LEFT => KEY_LEFT,
        CSI_0 => {
            let start = clock.now_us();
            while !console.has_key() {
                if clock.now_us().saturating_sub(start) >= ESCAPE_TIMEOUT_US {
                    return CSI_0;
                }
            }

            if console.get_char() != CSI_1 {
                return CSI_0;
            }

            match char::from_u32(console.get_char()) {
                Some('A') => KEY_UP,
                Some('B') => KEY_DOWN,
                Some('C') => KEY_RIGHT,
                Some('D') => KEY_LEFT,
                _ => 0,
            }
        }
        ch => ch,
    }
}

/// Like [`read_key`], and also report whether the key can be trusted to
/// come from a person at the keyboard. USB devices cannot.
pub fn read_key_with_flags<C, T>(console: &mut C, clock: &mut T) -> (u32, KeyFlags)
where
    C: Console + ?Sized,
    T: Clock + ?Sized,
{
    let key = read_key(console, clock);
    let mut flags = KeyFlags::empty();
    if console.last_input_type() != InputType::Usb {
        flags |= KeyFlags::TRUSTED_KEYBOARD;
    }
    (key, flags)
}

#[cfg(test)]
mod tests {
    use alloc::collections::VecDeque;

    use super::*;

    struct ScriptedConsole {
        pending: VecDeque<u32>,
        input_type: InputType,
    }

    impl ScriptedConsole {
        fn new(keys: &[u32]) -> Self {
            Self {
                pending: keys.iter().copied().collect(),
                input_type: InputType::Serial,
            }
        }
    }

    impl Console for ScriptedConsole {
        fn has_key(&mut self) -> bool {
            !self.pending.is_empty()
        }

        fn get_char(&mut self) -> u32 {
            self.pending.pop_front().unwrap_or(0)
        }

        fn last_input_type(&self) -> InputType {
            self.input_type
        }
    }

    /// Advances by one millisecond per reading.
    struct StepClock(u64);

    impl Clock for StepClock {
        fn now_us(&mut self) -> u64 {
            self.0 += 1000;
            self.0
        }
    }

    fn read(keys: &[u32]) -> u32 {
        read_key(&mut ScriptedConsole::new(keys), &mut StepClock(0))
    }

    #[test]
    fn test_no_key() {
        assert_eq!(read(&[]), 0);
    }

    #[test]
    fn test_plain_and_translated_keys() {
        assert_eq!(read(&['x' as u32]), 'x' as u32);
        assert_eq!(read(&['\n' as u32]), '\r' as u32);
        assert_eq!(read(&[0o403]), KEY_UP);
        assert_eq!(read(&[0o402]), KEY_DOWN);
        assert_eq!(read(&[0o404]), KEY_LEFT);
        assert_eq!(read(&[0o405]), KEY_RIGHT);
    }

    #[test]
    fn test_escape_sequences() {
        assert_eq!(read(&[0x1B, '[' as u32, 'A' as u32]), KEY_UP);
        assert_eq!(read(&[0x1B, '[' as u32, 'B' as u32]), KEY_DOWN);
        assert_eq!(read(&[0x1B, '[' as u32, 'C' as u32]), KEY_RIGHT);
        assert_eq!(read(&[0x1B, '[' as u32, 'D' as u32]), KEY_LEFT);
        assert_eq!(read(&[0x1B, '[' as u32, 'Z' as u32]), 0);
        assert_eq!(read(&[0x1B, 'O' as u32]), 0x1B);
    }

    #[test]
    fn test_lone_escape_times_out() {
        let mut clock = StepClock(0);
        assert_eq!(read_key(&mut ScriptedConsole::new(&[0x1B]), &mut clock), 0x1B);
        assert!(clock.0 >= ESCAPE_TIMEOUT_US);
    }

    #[test]
    fn test_usb_keys_are_untrusted() {
        let mut console = ScriptedConsole::new(&['y' as u32]);
        let (key, flags) = read_key_with_flags(&mut console, &mut StepClock(0));
        assert_eq!(key, 'y' as u32);
        assert_eq!(flags, KeyFlags::TRUSTED_KEYBOARD);

        let mut console = ScriptedConsole::new(&['y' as u32]);
        console.input_type = InputType::Usb;
        let (_, flags) = read_key_with_flags(&mut console, &mut StepClock(0));
        assert!(flags.is_empty());
    }
}
