//! Engine-native columnar page and the column descriptor/type-tag closed
//! set from spec.md §3.

use std::fmt;

/// Closed set of wire-type tags carried in schema JSON and used to pick a
/// decode path in `wire::decode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireTag {
    Integer,
    BigInt,
    Double,
    Date,
    Time,
    Timestamp,
    DecimalShort,
    DecimalLong,
    Varchar,
}

impl WireTag {
    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "INTEGER" => WireTag::Integer,
            "BIGINT" => WireTag::BigInt,
            "DOUBLE" => WireTag::Double,
            "DATE" => WireTag::Date,
            "TIME" => WireTag::Time,
            "TIMESTAMP" => WireTag::Timestamp,
            "DECIMAL_SHORT" => WireTag::DecimalShort,
            "DECIMAL_LONG" => WireTag::DecimalLong,
            "VARCHAR" => WireTag::Varchar,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WireTag::Integer => "INTEGER",
            WireTag::BigInt => "BIGINT",
            WireTag::Double => "DOUBLE",
            WireTag::Date => "DATE",
            WireTag::Time => "TIME",
            WireTag::Timestamp => "TIMESTAMP",
            WireTag::DecimalShort => "DECIMAL_SHORT",
            WireTag::DecimalLong => "DECIMAL_LONG",
            WireTag::Varchar => "VARCHAR",
        }
    }
}

impl fmt::Display for WireTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (name, wire-type tag, engine type) as registered by the page source
/// before the first producer connects (spec.md §3, §4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub wire_tag: WireTag,
}

/// A bit-packed null mask, one bit per row, `1` meaning null — mirrors the
/// on-wire null-indicator semantics so decode is a direct bit set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NullMask {
    bits: Vec<u8>,
    len: usize,
}

impl NullMask {
    pub fn with_capacity(cap: usize) -> Self {
        NullMask {
            bits: Vec::with_capacity(cap.div_ceil(8)),
            len: 0,
        }
    }

    pub fn push(&mut self, is_null: bool) {
        let byte_idx = self.len / 8;
        if byte_idx == self.bits.len() {
            self.bits.push(0);
        }
        if is_null {
            self.bits[byte_idx] |= 1 << (self.len % 8);
        }
        self.len += 1;
    }

    pub fn get(&self, row: usize) -> bool {
        debug_assert!(row < self.len);
        (self.bits[row / 8] >> (row % 8)) & 1 == 1
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Engine-native typed column storage. The closed set mirrors the wire-tag
/// decode targets in spec.md §4.1's table, collapsing INTEGER/DATE into
/// `Int32` and BIGINT/TIME/TIMESTAMP/DECIMAL_SHORT into `Int64`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Double(Vec<f64>),
    Decimal128(Vec<i128>),
    Utf8(Vec<String>),
}

impl ColumnData {
    pub fn empty_for(tag: WireTag) -> Self {
        match tag {
            WireTag::Integer | WireTag::Date => ColumnData::Int32(Vec::new()),
            WireTag::BigInt | WireTag::Time | WireTag::Timestamp | WireTag::DecimalShort => {
                ColumnData::Int64(Vec::new())
            }
            WireTag::Double => ColumnData::Double(Vec::new()),
            WireTag::DecimalLong => ColumnData::Decimal128(Vec::new()),
            WireTag::Varchar => ColumnData::Utf8(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int32(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::Double(v) => v.len(),
            ColumnData::Decimal128(v) => v.len(),
            ColumnData::Utf8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push_null_placeholder(&mut self) {
        match self {
            ColumnData::Int32(v) => v.push(0),
            ColumnData::Int64(v) => v.push(0),
            ColumnData::Double(v) => v.push(0.0),
            ColumnData::Decimal128(v) => v.push(0),
            ColumnData::Utf8(v) => v.push(String::new()),
        }
    }
}

/// One typed column array plus its null mask.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
    pub nulls: NullMask,
}

/// An immutable, engine-native columnar block of up to the configured
/// target batch size rows. Ownership transfers to the consumer on dequeue
/// (spec.md §3 "Page").
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub columns: Vec<Column>,
}

impl Page {
    pub fn nrows(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }
}
