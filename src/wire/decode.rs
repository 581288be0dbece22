//! Single-pass, row-major batch decode (spec.md §4.1's decode-rules table).

use crate::error::WireError;
use crate::page::{Column, ColumnData, NullMask, Page};
use crate::page::{ColumnDescriptor, WireTag};

const NS_PER_DAY_PICOS: i128 = 86_400 * 1_000_000_000_000;

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.pos + n > self.buf.len() {
            return Err(WireError::MalformedFrame("truncated batch".into()));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn i32_be(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u32_be(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn i64_be(&mut self) -> Result<i64, WireError> {
        Ok(i64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f64_be(&mut self) -> Result<f64, WireError> {
        Ok(f64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn i128_be(&mut self) -> Result<i128, WireError> {
        Ok(i128::from_be_bytes(self.take(16)?.try_into().unwrap()))
    }

    fn u16_be(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }
}

/// Applies the configured timezone offset to a TIME value and wraps the
/// result into `[0, 86400e12)` picoseconds, per spec.md §4.1 / §8.6.
pub fn apply_time_offset(raw_picos: i64, tz_offset_seconds: i64) -> i64 {
    let shifted = raw_picos as i128 + (tz_offset_seconds as i128) * 1_000_000_000_000;
    shifted.rem_euclid(NS_PER_DAY_PICOS) as i64
}

/// Applies the configured timezone offset to a TIMESTAMP value, per
/// spec.md §4.1 / §8.6.
pub fn apply_timestamp_offset(raw_micros: i64, tz_offset_seconds: i64) -> i64 {
    raw_micros + tz_offset_seconds * 1_000_000
}

/// Decodes one batch: a 4-byte row count followed by that many rows, each
/// row carrying one null-indicator byte per column and, if not null, the
/// typed payload per spec.md §4.1. A 0-row batch is legal and yields `None`
/// (it is never enqueued, per spec.md §4.1).
pub fn decode_batch(
    bytes: &[u8],
    columns: &[ColumnDescriptor],
    tz_offset_seconds: i64,
) -> Result<Option<Page>, WireError> {
    let mut cur = Cursor::new(bytes);
    let nrows = cur.u32_be()? as usize;
    if nrows == 0 {
        return Ok(None);
    }

    let mut cols: Vec<Column> = columns
        .iter()
        .map(|d| Column {
            name: d.name.clone(),
            data: ColumnData::empty_for(d.wire_tag),
            nulls: NullMask::with_capacity(nrows),
        })
        .collect();

    for _ in 0..nrows {
        for (col, descriptor) in cols.iter_mut().zip(columns.iter()) {
            let null_flag = cur.u8()?;
            if null_flag == 1 {
                col.nulls.push(true);
                col.data.push_null_placeholder();
                continue;
            }
            if null_flag != 0 {
                return Err(WireError::MalformedFrame(format!(
                    "invalid null flag byte {null_flag}"
                )));
            }
            col.nulls.push(false);
            match descriptor.wire_tag {
                WireTag::Integer | WireTag::Date => {
                    let v = cur.i32_be()?;
                    match &mut col.data {
                        ColumnData::Int32(vec) => vec.push(v),
                        _ => unreachable!(),
                    }
                }
                WireTag::BigInt | WireTag::DecimalShort => {
                    let v = cur.i64_be()?;
                    match &mut col.data {
                        ColumnData::Int64(vec) => vec.push(v),
                        _ => unreachable!(),
                    }
                }
                WireTag::Time => {
                    let raw = cur.i64_be()?;
                    let v = apply_time_offset(raw, tz_offset_seconds);
                    match &mut col.data {
                        ColumnData::Int64(vec) => vec.push(v),
                        _ => unreachable!(),
                    }
                }
                WireTag::Timestamp => {
                    let raw = cur.i64_be()?;
                    let v = apply_timestamp_offset(raw, tz_offset_seconds);
                    match &mut col.data {
                        ColumnData::Int64(vec) => vec.push(v),
                        _ => unreachable!(),
                    }
                }
                WireTag::Double => {
                    let v = cur.f64_be()?;
                    match &mut col.data {
                        ColumnData::Double(vec) => vec.push(v),
                        _ => unreachable!(),
                    }
                }
                WireTag::DecimalLong => {
                    let v = cur.i128_be()?;
                    match &mut col.data {
                        ColumnData::Decimal128(vec) => vec.push(v),
                        _ => unreachable!(),
                    }
                }
                WireTag::Varchar => {
                    let len = cur.u16_be()? as usize;
                    let raw = cur.take(len)?;
                    let s = std::str::from_utf8(raw)
                        .map_err(|e| WireError::MalformedFrame(e.to_string()))?
                        .to_string();
                    match &mut col.data {
                        ColumnData::Utf8(vec) => vec.push(s),
                        _ => unreachable!(),
                    }
                }
            }
        }
    }

    Ok(Some(Page { columns: cols }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, tag: WireTag) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            wire_tag: tag,
        }
    }

    #[test]
    fn s1_single_producer_tiny_batch() {
        // schema [a: INTEGER], rows {null, 7, i32::MIN}
        let mut buf = Vec::new();
        buf.extend_from_slice(&3u32.to_be_bytes());
        buf.push(1); // null
        buf.push(0);
        buf.extend_from_slice(&7i32.to_be_bytes());
        buf.push(0);
        buf.extend_from_slice(&i32::MIN.to_be_bytes());

        let columns = vec![col("a", WireTag::Integer)];
        let page = decode_batch(&buf, &columns, 0).unwrap().unwrap();
        assert_eq!(page.nrows(), 3);
        match &page.columns[0].data {
            ColumnData::Int32(v) => assert_eq!(v, &vec![0, 7, i32::MIN]),
            _ => panic!("wrong column kind"),
        }
        assert!(page.columns[0].nulls.get(0));
        assert!(!page.columns[0].nulls.get(1));
        assert!(!page.columns[0].nulls.get(2));
    }

    #[test]
    fn zero_row_batch_is_not_a_page() {
        let buf = 0u32.to_be_bytes();
        let columns = vec![col("a", WireTag::Integer)];
        assert!(decode_batch(&buf, &columns, 0).unwrap().is_none());
    }

    #[test]
    fn s5_varchar_utf8_round_trip() {
        let s = "héllo";
        assert_eq!(s.len(), 6);
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.push(0);
        buf.extend_from_slice(&(s.len() as u16).to_be_bytes());
        buf.extend_from_slice(s.as_bytes());

        let columns = vec![col("s", WireTag::Varchar)];
        let page = decode_batch(&buf, &columns, 0).unwrap().unwrap();
        match &page.columns[0].data {
            ColumnData::Utf8(v) => assert_eq!(v[0], "héllo"),
            _ => panic!("wrong column kind"),
        }
    }

    #[test]
    fn decimal_long_round_trips_boundary_values() {
        for v in [
            i128::MIN,
            i128::MAX,
            1i128,
            -1i128,
            2i128.pow(64),
            -(2i128.pow(64)),
        ] {
            let mut buf = Vec::new();
            buf.extend_from_slice(&1u32.to_be_bytes());
            buf.push(0);
            buf.extend_from_slice(&v.to_be_bytes());
            let columns = vec![col("d", WireTag::DecimalLong)];
            let page = decode_batch(&buf, &columns, 0).unwrap().unwrap();
            match &page.columns[0].data {
                ColumnData::Decimal128(vec) => assert_eq!(vec[0], v),
                _ => panic!("wrong column kind"),
            }
        }
    }

    #[test]
    fn tz_application_on_timestamp_and_time() {
        assert_eq!(apply_timestamp_offset(1_000_000, 3600), 1_000_000 + 3_600_000_000);
        // TIME wraps modulo one day
        let one_day_picos = 86_400i128 * 1_000_000_000_000;
        let one_hour_picos = 3_600i128 * 1_000_000_000_000;
        assert_eq!(
            apply_time_offset((one_day_picos - one_hour_picos) as i64, 2 * 3600),
            // 23:00:00 + 2h wraps to the 01:00:00 mark
            one_hour_picos as i64
        );
    }

    #[test]
    fn null_mask_round_trips_every_subset() {
        // columns a: INTEGER (nullable), b: VARCHAR (nullable)
        let mut buf = Vec::new();
        buf.extend_from_slice(&2u32.to_be_bytes());
        // row0: a=null, b="x"
        buf.push(1);
        buf.push(0);
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.push(b'x');
        // row1: a=5, b=null
        buf.push(0);
        buf.extend_from_slice(&5i32.to_be_bytes());
        buf.push(1);

        let columns = vec![col("a", WireTag::Integer), col("b", WireTag::Varchar)];
        let page = decode_batch(&buf, &columns, 0).unwrap().unwrap();
        assert!(page.columns[0].nulls.get(0));
        assert!(!page.columns[0].nulls.get(1));
        assert!(!page.columns[1].nulls.get(0));
        assert!(page.columns[1].nulls.get(1));
    }
}
