use std::fmt::{self, LowerHex};

#[cfg(feature = "serde")]
use serde::Serialize;

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};

#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum EventCode {
    Standard(StandardEventCode),
    Other(u16),
}

impl FromPrimitive for EventCode {
    fn from_i64(n: i64) -> Option<Self> {
        Some(StandardEventCode::from_i64(n).map_or_else(
            || EventCode::Other(n as u16),
            |code| EventCode::Standard(code),
        ))
    }

    fn from_u64(n: u64) -> Option<Self> {
        Some(StandardEventCode::from_u64(n).map_or_else(
            || EventCode::Other(n as u16),
            |code| EventCode::Standard(code),
        ))
    }
}

impl ToPrimitive for EventCode {
    fn to_i64(&self) -> Option<i64> {
        match self {
            EventCode::Standard(code) => code.to_i64(),
            EventCode::Other(code) => Some(*code as i64),
        }
    }

    fn to_u64(&self) -> Option<u64> {
        match self {
            EventCode::Standard(code) => code.to_u64(),
            EventCode::Other(code) => Some(*code as u64),
        }
    }
}

impl LowerHex for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventCode::Standard(code) => fmt::LowerHex::fmt(code, f),
            EventCode::Other(code) => fmt::LowerHex::fmt(code, f),
        }
    }
}

impl From<StandardEventCode> for EventCode {
    fn from(code: StandardEventCode) -> Self {
        EventCode::Standard(code)
    }
}

#[repr(u16)]
#[derive(FromPrimitive, ToPrimitive, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum StandardEventCode {
    Undefined = 0x4000,
    CancelTransaction,
    ObjectAdded,
    ObjectRemoved,
    StoreAdded,
    StoreRemoved,
    DevicePropChanged,
    ObjectInfoChanged,
    StoreFull,
    DeviceReset,
    StorageInfoChanged,
    CaptureComplete,
    UnreportedStatus,
}

impl LowerHex for StandardEventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let val = self.to_u16().unwrap();
        fmt::LowerHex::fmt(&val, f)
    }
}
