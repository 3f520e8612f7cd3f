/// An ASCII control code used by ESC/P, ESC/POS, and ESC/P2 streams.
///
/// These are the names accepted as identifiers in send-data source and used
/// when rendering command prefixes for humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ControlCode {
    /// End of transmission.
    Eot = 0x04,
    /// Backspace.
    Bs = 0x08,
    /// Horizontal tab.
    Ht = 0x09,
    /// Line feed.
    Lf = 0x0A,
    /// Form feed.
    Ff = 0x0C,
    /// Carriage return.
    Cr = 0x0D,
    /// Data link escape.
    Dle = 0x10,
    /// Cancel.
    Can = 0x18,
    /// Escape.
    Esc = 0x1B,
    /// File separator.
    Fs = 0x1C,
    /// Group separator.
    Gs = 0x1D,
    /// Space.
    Sp = 0x20,
}

impl ControlCode {
    /// Every known control code, in byte order.
    pub const ALL: [ControlCode; 12] = [
        ControlCode::Eot,
        ControlCode::Bs,
        ControlCode::Ht,
        ControlCode::Lf,
        ControlCode::Ff,
        ControlCode::Cr,
        ControlCode::Dle,
        ControlCode::Can,
        ControlCode::Esc,
        ControlCode::Fs,
        ControlCode::Gs,
        ControlCode::Sp,
    ];

    /// The wire byte for this code.
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// The upper-case mnemonic (`"ESC"`, `"LF"`, …).
    pub fn name(self) -> &'static str {
        match self {
            ControlCode::Eot => "EOT",
            ControlCode::Bs => "BS",
            ControlCode::Ht => "HT",
            ControlCode::Lf => "LF",
            ControlCode::Ff => "FF",
            ControlCode::Cr => "CR",
            ControlCode::Dle => "DLE",
            ControlCode::Can => "CAN",
            ControlCode::Esc => "ESC",
            ControlCode::Fs => "FS",
            ControlCode::Gs => "GS",
            ControlCode::Sp => "SP",
        }
    }

    /// Look up a code by its mnemonic. Matching is case-sensitive, as in
    /// send-data source.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Look up a code by its wire byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.byte() == b)
    }
}

impl std::fmt::Display for ControlCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
