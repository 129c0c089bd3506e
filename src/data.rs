use std::io::{self, Cursor};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{NaiveDateTime, TimeZone, Utc};

use crate::Error;

pub trait MtpRead: ReadBytesExt {
    fn read_mtp_u8(&mut self) -> Result<u8, Error> {
        Ok(self.read_u8()?)
    }

    fn read_mtp_i8(&mut self) -> Result<i8, Error> {
        Ok(self.read_i8()?)
    }

    fn read_mtp_u16(&mut self) -> Result<u16, Error> {
        Ok(self.read_u16::<LittleEndian>()?)
    }

    fn read_mtp_i16(&mut self) -> Result<i16, Error> {
        Ok(self.read_i16::<LittleEndian>()?)
    }

    fn read_mtp_u32(&mut self) -> Result<u32, Error> {
        Ok(self.read_u32::<LittleEndian>()?)
    }

    fn read_mtp_i32(&mut self) -> Result<i32, Error> {
        Ok(self.read_i32::<LittleEndian>()?)
    }

    fn read_mtp_u64(&mut self) -> Result<u64, Error> {
        Ok(self.read_u64::<LittleEndian>()?)
    }

    fn read_mtp_i64(&mut self) -> Result<i64, Error> {
        Ok(self.read_i64::<LittleEndian>()?)
    }

    fn read_mtp_u128(&mut self) -> Result<u128, Error> {
        Ok(self.read_u128::<LittleEndian>()?)
    }

    fn read_mtp_i128(&mut self) -> Result<i128, Error> {
        Ok(self.read_i128::<LittleEndian>()?)
    }

    #[inline(always)]
    fn read_mtp_vec<T: Sized, U: Fn(&mut Self) -> Result<T, Error>>(
        &mut self,
        func: U,
    ) -> Result<Vec<T>, Error> {
        let len = self.read_u32::<LittleEndian>()? as usize;
        (0..len).map(|_| func(self)).collect()
    }

    fn read_mtp_u8_vec(&mut self) -> Result<Vec<u8>, Error> {
        self.read_mtp_vec(|cur| cur.read_mtp_u8())
    }

    fn read_mtp_i8_vec(&mut self) -> Result<Vec<i8>, Error> {
        self.read_mtp_vec(|cur| cur.read_mtp_i8())
    }

    fn read_mtp_u16_vec(&mut self) -> Result<Vec<u16>, Error> {
        self.read_mtp_vec(|cur| cur.read_mtp_u16())
    }

    fn read_mtp_i16_vec(&mut self) -> Result<Vec<i16>, Error> {
        self.read_mtp_vec(|cur| cur.read_mtp_i16())
    }

    fn read_mtp_u32_vec(&mut self) -> Result<Vec<u32>, Error> {
        self.read_mtp_vec(|cur| cur.read_mtp_u32())
    }

    fn read_mtp_i32_vec(&mut self) -> Result<Vec<i32>, Error> {
        self.read_mtp_vec(|cur| cur.read_mtp_i32())
    }

    fn read_mtp_u64_vec(&mut self) -> Result<Vec<u64>, Error> {
        self.read_mtp_vec(|cur| cur.read_mtp_u64())
    }

    fn read_mtp_i64_vec(&mut self) -> Result<Vec<i64>, Error> {
        self.read_mtp_vec(|cur| cur.read_mtp_i64())
    }

    fn read_mtp_u128_vec(&mut self) -> Result<Vec<u128>, Error> {
        self.read_mtp_vec(|cur| cur.read_mtp_u128())
    }

    fn read_mtp_i128_vec(&mut self) -> Result<Vec<i128>, Error> {
        self.read_mtp_vec(|cur| cur.read_mtp_i128())
    }

    fn read_mtp_str(&mut self) -> Result<String, Error> {
        let len = self.read_u8()?;
        if len > 0 {
            // len includes the trailing null u16
            let data: Vec<u16> = (0..(len - 1))
                .map(|_| self.read_u16::<LittleEndian>())
                .collect::<Result<Vec<_>, _>>()?;

            self.read_u16::<LittleEndian>()?;
            String::from_utf16(&data)
                .map_err(|_| Error::Malformed(format!("Invalid UTF16 data: {:?}", data)))
        } else {
            Ok("".into())
        }
    }

    /// Reads an MTP date-time string, returning it as epoch seconds.
    /// An empty string decodes to 0.
    fn read_mtp_datetime(&mut self) -> Result<i64, Error> {
        let s = self.read_mtp_str()?;
        if s.is_empty() {
            return Ok(0);
        }
        parse_datetime(&s)
    }

    fn expect_end(&mut self) -> Result<(), Error>;
}

impl<T: AsRef<[u8]>> MtpRead for Cursor<T> {
    fn expect_end(&mut self) -> Result<(), Error> {
        let len = self.get_ref().as_ref().len();
        if len as u64 != self.position() {
            Err(Error::Malformed(format!(
                "Dataset {} bytes, expected {} bytes",
                len,
                self.position()
            )))
        } else {
            Ok(())
        }
    }
}

pub trait MtpWrite: WriteBytesExt {
    fn write_mtp_u8(&mut self, val: u8) -> Result<(), Error> {
        Ok(self.write_u8(val)?)
    }

    fn write_mtp_i8(&mut self, val: i8) -> Result<(), Error> {
        Ok(self.write_i8(val)?)
    }

    fn write_mtp_u16(&mut self, val: u16) -> Result<(), Error> {
        Ok(self.write_u16::<LittleEndian>(val)?)
    }

    fn write_mtp_i16(&mut self, val: i16) -> Result<(), Error> {
        Ok(self.write_i16::<LittleEndian>(val)?)
    }

    fn write_mtp_u32(&mut self, val: u32) -> Result<(), Error> {
        Ok(self.write_u32::<LittleEndian>(val)?)
    }

    fn write_mtp_i32(&mut self, val: i32) -> Result<(), Error> {
        Ok(self.write_i32::<LittleEndian>(val)?)
    }

    fn write_mtp_u64(&mut self, val: u64) -> Result<(), Error> {
        Ok(self.write_u64::<LittleEndian>(val)?)
    }

    fn write_mtp_i64(&mut self, val: i64) -> Result<(), Error> {
        Ok(self.write_i64::<LittleEndian>(val)?)
    }

    fn write_mtp_u128(&mut self, val: u128) -> Result<(), Error> {
        Ok(self.write_u128::<LittleEndian>(val)?)
    }

    fn write_mtp_i128(&mut self, val: i128) -> Result<(), Error> {
        Ok(self.write_i128::<LittleEndian>(val)?)
    }

    #[inline(always)]
    fn write_mtp_vec<T, U: Fn(&mut Self, &T) -> Result<(), Error>>(
        &mut self,
        vals: &[T],
        func: U,
    ) -> Result<(), Error> {
        self.write_u32::<LittleEndian>(vals.len() as u32)?;
        for val in vals {
            func(self, val)?;
        }
        Ok(())
    }

    fn write_mtp_u16_vec(&mut self, vals: &[u16]) -> Result<(), Error> {
        self.write_mtp_vec(vals, |w, v| w.write_mtp_u16(*v))
    }

    fn write_mtp_u32_vec(&mut self, vals: &[u32]) -> Result<(), Error> {
        self.write_mtp_vec(vals, |w, v| w.write_mtp_u32(*v))
    }

    /// The length byte counts UTF-16 code units including the trailing NUL;
    /// an empty string is a single zero byte.
    fn write_mtp_str(&mut self, val: &str) -> Result<(), Error> {
        let units = val.encode_utf16().count();
        if units > 0xFE {
            return Err(Error::Malformed(format!(
                "string of {} UTF-16 units does not fit in a dataset",
                units
            )));
        }
        if units == 0 {
            self.write_u8(0)?;
            return Ok(());
        }
        self.write_u8(units as u8 + 1)?;
        for unit in val.encode_utf16() {
            self.write_u16::<LittleEndian>(unit)?;
        }
        self.write_all(b"\0\0")?;
        Ok(())
    }

    fn write_mtp_datetime(&mut self, secs: i64) -> Result<(), Error> {
        self.write_mtp_str(&format_datetime(secs))
    }
}

impl<W: io::Write + ?Sized> MtpWrite for W {}

pub(crate) fn format_datetime(secs: i64) -> String {
    match Utc.timestamp_opt(secs, 0).single() {
        Some(dt) => dt.format("%Y%m%dT%H%M%S").to_string(),
        None => String::new(),
    }
}

pub(crate) fn parse_datetime(s: &str) -> Result<i64, Error> {
    let dt = NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
        .map_err(|_| Error::Malformed(format!("Invalid date-time string: {:?}", s)))?;
    Ok(Utc.from_utc_datetime(&dt).timestamp())
}

/// A dynamically typed MTP value, as carried by property datasets. The
/// variant names follow the data-type codes of the protocol.
#[derive(Debug, Eq, PartialEq, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MtpData {
    UNDEF,
    INT8(i8),
    UINT8(u8),
    INT16(i16),
    UINT16(u16),
    INT32(i32),
    UINT32(u32),
    INT64(i64),
    UINT64(u64),
    INT128(i128),
    UINT128(u128),
    AINT8(Vec<i8>),
    AUINT8(Vec<u8>),
    AINT16(Vec<i16>),
    AUINT16(Vec<u16>),
    AINT32(Vec<i32>),
    AUINT32(Vec<u32>),
    AINT64(Vec<i64>),
    AUINT64(Vec<u64>),
    AINT128(Vec<i128>),
    AUINT128(Vec<u128>),
    STR(String),
}

impl MtpData {
    /// 16-bit data-type code: arrays set bit 0x4000, strings are 0xFFFF.
    pub fn dtype(&self) -> u16 {
        use self::MtpData::*;
        match self {
            UNDEF => 0x0000,
            INT8(_) => 0x0001,
            UINT8(_) => 0x0002,
            INT16(_) => 0x0003,
            UINT16(_) => 0x0004,
            INT32(_) => 0x0005,
            UINT32(_) => 0x0006,
            INT64(_) => 0x0007,
            UINT64(_) => 0x0008,
            INT128(_) => 0x0009,
            UINT128(_) => 0x000A,
            AINT8(_) => 0x4001,
            AUINT8(_) => 0x4002,
            AINT16(_) => 0x4003,
            AUINT16(_) => 0x4004,
            AINT32(_) => 0x4005,
            AUINT32(_) => 0x4006,
            AINT64(_) => 0x4007,
            AUINT64(_) => 0x4008,
            AINT128(_) => 0x4009,
            AUINT128(_) => 0x400A,
            STR(_) => 0xFFFF,
        }
    }

    pub fn encode<W: MtpWrite>(&self, w: &mut W) -> Result<(), Error> {
        use self::MtpData::*;
        match self {
            UNDEF => Ok(()),
            &INT8(val) => w.write_mtp_i8(val),
            &UINT8(val) => w.write_mtp_u8(val),
            &INT16(val) => w.write_mtp_i16(val),
            &UINT16(val) => w.write_mtp_u16(val),
            &INT32(val) => w.write_mtp_i32(val),
            &UINT32(val) => w.write_mtp_u32(val),
            &INT64(val) => w.write_mtp_i64(val),
            &UINT64(val) => w.write_mtp_u64(val),
            &INT128(val) => w.write_mtp_i128(val),
            &UINT128(val) => w.write_mtp_u128(val),
            AINT8(val) => w.write_mtp_vec(val, |w, v| w.write_mtp_i8(*v)),
            AUINT8(val) => w.write_mtp_vec(val, |w, v| w.write_mtp_u8(*v)),
            AINT16(val) => w.write_mtp_vec(val, |w, v| w.write_mtp_i16(*v)),
            AUINT16(val) => w.write_mtp_vec(val, |w, v| w.write_mtp_u16(*v)),
            AINT32(val) => w.write_mtp_vec(val, |w, v| w.write_mtp_i32(*v)),
            AUINT32(val) => w.write_mtp_vec(val, |w, v| w.write_mtp_u32(*v)),
            AINT64(val) => w.write_mtp_vec(val, |w, v| w.write_mtp_i64(*v)),
            AUINT64(val) => w.write_mtp_vec(val, |w, v| w.write_mtp_u64(*v)),
            AINT128(val) => w.write_mtp_vec(val, |w, v| w.write_mtp_i128(*v)),
            AUINT128(val) => w.write_mtp_vec(val, |w, v| w.write_mtp_u128(*v)),
            STR(val) => w.write_mtp_str(val),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut out = vec![];
        self.encode(&mut out)?;
        Ok(out)
    }

    pub fn read_type<T: MtpRead>(kind: u16, reader: &mut T) -> Result<MtpData, Error> {
        use self::MtpData::*;
        Ok(match kind {
            0x0001 => INT8(reader.read_mtp_i8()?),
            0x0002 => UINT8(reader.read_mtp_u8()?),
            0x0003 => INT16(reader.read_mtp_i16()?),
            0x0004 => UINT16(reader.read_mtp_u16()?),
            0x0005 => INT32(reader.read_mtp_i32()?),
            0x0006 => UINT32(reader.read_mtp_u32()?),
            0x0007 => INT64(reader.read_mtp_i64()?),
            0x0008 => UINT64(reader.read_mtp_u64()?),
            0x0009 => INT128(reader.read_mtp_i128()?),
            0x000A => UINT128(reader.read_mtp_u128()?),
            0x4001 => AINT8(reader.read_mtp_i8_vec()?),
            0x4002 => AUINT8(reader.read_mtp_u8_vec()?),
            0x4003 => AINT16(reader.read_mtp_i16_vec()?),
            0x4004 => AUINT16(reader.read_mtp_u16_vec()?),
            0x4005 => AINT32(reader.read_mtp_i32_vec()?),
            0x4006 => AUINT32(reader.read_mtp_u32_vec()?),
            0x4007 => AINT64(reader.read_mtp_i64_vec()?),
            0x4008 => AUINT64(reader.read_mtp_u64_vec()?),
            0x4009 => AINT128(reader.read_mtp_i128_vec()?),
            0x400A => AUINT128(reader.read_mtp_u128_vec()?),
            0xFFFF => STR(reader.read_mtp_str()?),
            _ => UNDEF,
        })
    }
}

impl From<i8> for MtpData {
    fn from(value: i8) -> Self {
        MtpData::INT8(value)
    }
}

impl From<u8> for MtpData {
    fn from(value: u8) -> Self {
        MtpData::UINT8(value)
    }
}

impl From<i16> for MtpData {
    fn from(value: i16) -> Self {
        MtpData::INT16(value)
    }
}

impl From<u16> for MtpData {
    fn from(value: u16) -> Self {
        MtpData::UINT16(value)
    }
}

impl From<i32> for MtpData {
    fn from(value: i32) -> Self {
        MtpData::INT32(value)
    }
}

impl From<u32> for MtpData {
    fn from(value: u32) -> Self {
        MtpData::UINT32(value)
    }
}

impl From<i64> for MtpData {
    fn from(value: i64) -> Self {
        MtpData::INT64(value)
    }
}

impl From<u64> for MtpData {
    fn from(value: u64) -> Self {
        MtpData::UINT64(value)
    }
}

impl From<u128> for MtpData {
    fn from(value: u128) -> Self {
        MtpData::UINT128(value)
    }
}

impl<'a> From<&'a str> for MtpData {
    fn from(value: &'a str) -> Self {
        MtpData::STR(value.to_owned())
    }
}

impl From<String> for MtpData {
    fn from(value: String) -> Self {
        MtpData::STR(value)
    }
}
