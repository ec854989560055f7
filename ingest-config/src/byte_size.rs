use std::fmt;
use std::str::FromStr;

use human_size::{Byte, Size};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Error returned when parsing a [`ByteSize`] fails.
pub use human_size::ParsingError as ByteSizeParseError;

/// Human readable units, largest first.
///
/// Binary units are preferred over decimal units when both represent a value exactly.
const UNITS: &[(&str, u64)] = &[
    ("GiB", 1 << 30),
    ("GB", 1_000_000_000),
    ("MiB", 1 << 20),
    ("MB", 1_000_000),
    ("KiB", 1 << 10),
    ("kB", 1_000),
];

/// Represents a size in bytes.
///
/// `ByteSize` can be parsed from strings with a unit suffix, such as `"64MiB"` or `"1 kB"`, or from
/// a plain number of bytes. When formatted, it uses the largest unit that represents the value
/// exactly.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ByteSize(u64);

impl ByteSize {
    /// Create a byte size from bytes.
    pub const fn bytes(value: u64) -> Self {
        Self(value)
    }

    /// Create a byte size from kilobytes.
    pub const fn kilobytes(value: u64) -> Self {
        Self(value * 1_000)
    }

    /// Create a byte size from mebibytes.
    pub const fn mebibytes(value: u64) -> Self {
        Self(value * 1024 * 1024)
    }

    /// Return the value in bytes.
    pub const fn as_bytes(self) -> u64 {
        self.0
    }

    /// Return the value in bytes as `usize`, saturating on 32-bit platforms.
    pub fn as_usize(self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }
}

impl FromStr for ByteSize {
    type Err = ByteSizeParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if let Ok(value) = value.trim().parse::<u64>() {
            return Ok(Self(value));
        }

        let size: Size = value.parse()?;
        let bytes = size.into::<Byte>().value();

        // Sizes that overflow during unit conversion must not saturate.
        if !bytes.is_finite() || bytes < 0.0 || bytes >= u64::MAX as f64 {
            return Err(ByteSizeParseError::InvalidValue);
        }

        Ok(Self(bytes as u64))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &(unit, factor) in UNITS {
            if self.0 >= factor && self.0 % factor == 0 {
                return write!(f, "{}{}", self.0 / factor, unit);
            }
        }

        write!(f, "{}B", self.0)
    }
}

impl fmt::Debug for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteSize({self})")
    }
}

impl From<u64> for ByteSize {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Serialize for ByteSize {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct V;

        impl de::Visitor<'_> for V {
            type Value = ByteSize;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("data size")
            }

            fn visit_u64<E>(self, value: u64) -> Result<ByteSize, E>
            where
                E: de::Error,
            {
                Ok(ByteSize(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<ByteSize, E>
            where
                E: de::Error,
            {
                u64::try_from(value)
                    .map(ByteSize)
                    .map_err(|_| de::Error::invalid_value(de::Unexpected::Signed(value), &self))
            }

            fn visit_str<E>(self, value: &str) -> Result<ByteSize, E>
            where
                E: de::Error,
            {
                value
                    .parse()
                    .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(value), &self))
            }
        }

        deserializer.deserialize_any(V)
    }
}
