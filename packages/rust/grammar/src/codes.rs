//! mIRC-style formatting control codes.

/// Toggle bold.
pub const BOLD: char = '\x02';
/// Start a colour sequence (`\x03FG[,BG]`).
pub const COLOR: char = '\x03';
/// Start a hex colour sequence (`\x04RRGGBB[,RRGGBB]`).
pub const HEX_COLOR: char = '\x04';
/// Reset all formatting.
pub const NORMAL: char = '\x0f';
/// Toggle monospace.
pub const MONOSPACE: char = '\x11';
/// Toggle reverse video.
pub const REVERSE: char = '\x16';
/// Toggle italic.
pub const ITALIC: char = '\x1d';
/// Toggle strikethrough.
pub const STRIKETHROUGH: char = '\x1e';
/// Toggle underline.
pub const UNDERLINE: char = '\x1f';

/// Every control character the normalizer removes.
pub const ALL: [char; 9] = [
    BOLD,
    COLOR,
    HEX_COLOR,
    NORMAL,
    MONOSPACE,
    REVERSE,
    ITALIC,
    STRIKETHROUGH,
    UNDERLINE,
];

/// The 16 standard palette colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    White = 0,
    Black = 1,
    Blue = 2,
    Green = 3,
    Red = 4,
    Brown = 5,
    Purple = 6,
    Orange = 7,
    Yellow = 8,
    LightGreen = 9,
    Cyan = 10,
    LightCyan = 11,
    LightBlue = 12,
    Pink = 13,
    Grey = 14,
    LightGrey = 15,
}

impl Color {
    /// The two-digit foreground sequence for this colour, e.g. `\x0304`.
    pub fn fg(self) -> String {
        format!("{COLOR}{:02}", self as u8)
    }
}
