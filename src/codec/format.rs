//! Format descriptor grammar.
//!
//! A descriptor is an optional byte-order marker from `@=!<>` followed by
//! one or more groups of an optional decimal repeat count and a type code
//! from `xcbBhHiIlLfdspPqQ?`. One descriptor describes one record; a
//! property's payload is that record repeated up to the registered length.

use super::CodecError;

/// Byte order a descriptor's scalars are laid out in.
///
/// The wire default is network order; `@` and `=` select host order with
/// standard sizes and no alignment padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
    Native,
}

/// One type code of the descriptor grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatCode {
    /// `x` - pad byte, no scalar.
    Pad,
    /// `c` - single one-byte character.
    Char,
    /// `b` / `B`
    I8,
    U8,
    /// `h` / `H`
    I16,
    U16,
    /// `i`, `l` / `I`, `L` - standard sizes, both four bytes.
    I32,
    U32,
    /// `q` / `Q`
    I64,
    U64,
    /// `f` / `d`
    F32,
    F64,
    /// `s` - fixed-length byte string; the count is the byte length.
    Bytes,
    /// `p` - length-prefixed (pascal) string; the count is the field width.
    Pascal,
    /// `P` - native pointer, native mode only.
    Pointer,
    /// `?`
    Bool,
}

impl FormatCode {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'x' => Some(Self::Pad),
            'c' => Some(Self::Char),
            'b' => Some(Self::I8),
            'B' => Some(Self::U8),
            'h' => Some(Self::I16),
            'H' => Some(Self::U16),
            'i' | 'l' => Some(Self::I32),
            'I' | 'L' => Some(Self::U32),
            'q' => Some(Self::I64),
            'Q' => Some(Self::U64),
            'f' => Some(Self::F32),
            'd' => Some(Self::F64),
            's' => Some(Self::Bytes),
            'p' => Some(Self::Pascal),
            'P' => Some(Self::Pointer),
            '?' => Some(Self::Bool),
            _ => None,
        }
    }

    /// Encoded width of one scalar of this code, in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::Pad | Self::Char | Self::I8 | Self::U8 | Self::Bool => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 | Self::Pointer => 8,
            // Counted as a unit via the repeat count.
            Self::Bytes | Self::Pascal => 1,
        }
    }

    /// True only for `s`. Pascal strings carry their own length prefix
    /// and decode through the per-field path like any other code.
    pub fn is_plain_string(&self) -> bool {
        matches!(self, Self::Bytes)
    }
}

/// One `count × code` group of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatField {
    pub code: FormatCode,
    /// Repeat count; for `s`/`p` this is the byte width of one string.
    pub count: u32,
    /// The character the code was written as, kept for diagnostics.
    pub symbol: char,
}

/// A parsed format descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSpec {
    pub order: ByteOrder,
    /// True only under the `@` marker; gates native-only codes.
    pub native: bool,
    pub fields: Vec<FormatField>,
}

impl FormatSpec {
    pub fn parse(format: &str) -> Result<Self, CodecError> {
        let mut chars = format.chars().peekable();
        let (order, native) = match chars.peek() {
            Some('@') => {
                chars.next();
                (ByteOrder::Native, true)
            }
            Some('=') => {
                chars.next();
                (ByteOrder::Native, false)
            }
            Some('<') => {
                chars.next();
                (ByteOrder::Little, false)
            }
            Some('>') | Some('!') => {
                chars.next();
                (ByteOrder::Big, false)
            }
            _ => (ByteOrder::Big, false),
        };

        let mut fields = Vec::new();
        while let Some(&c) = chars.peek() {
            let mut count: Option<u32> = None;
            if c.is_ascii_digit() {
                let mut n: u32 = 0;
                while let Some(&d) = chars.peek() {
                    if let Some(digit) = d.to_digit(10) {
                        n = n.saturating_mul(10).saturating_add(digit);
                        chars.next();
                    } else {
                        break;
                    }
                }
                count = Some(n);
            }
            let symbol = chars.next().ok_or(CodecError::DanglingCount)?;
            let code = FormatCode::from_char(symbol).ok_or(CodecError::UnknownCode(symbol))?;
            if code == FormatCode::Pointer && !native {
                return Err(CodecError::NativeOnly(symbol));
            }
            fields.push(FormatField {
                code,
                count: count.unwrap_or(1),
                symbol,
            });
        }

        if fields.is_empty() {
            return Err(CodecError::EmptyFormat);
        }
        Ok(Self {
            order,
            native,
            fields,
        })
    }

    /// Encoded size of one full record.
    pub fn item_size(&self) -> usize {
        self.fields
            .iter()
            .map(|f| f.code.size() * f.count as usize)
            .sum()
    }

    /// Number of scalars one record decodes to.
    pub fn scalar_count(&self) -> usize {
        self.fields
            .iter()
            .map(|f| match f.code {
                FormatCode::Pad => 0,
                FormatCode::Bytes | FormatCode::Pascal => 1,
                _ => f.count as usize,
            })
            .sum()
    }

    /// True when the descriptor carries an `s` field; such payloads take
    /// the whole-payload string shortcut. `p` does not qualify.
    pub fn contains_plain_string(&self) -> bool {
        self.fields.iter().any(|f| f.code.is_plain_string())
    }
}
