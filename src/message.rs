use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::{Error, EventCode, ResponseCode, StandardResponseCode};

/// Size of the container header: length, type, code, transaction id.
pub const CONTAINER_HEADER_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[repr(u16)]
pub enum ContainerType {
    Undefined = 0,
    Command = 1,
    Data = 2,
    Response = 3,
    Event = 4,
}

fn pack_container(kind: ContainerType, code: u16, tid: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(CONTAINER_HEADER_SIZE + payload.len());
    buf.write_u32::<LittleEndian>((CONTAINER_HEADER_SIZE + payload.len()) as u32)
        .ok();
    buf.write_u16::<LittleEndian>(kind as u16).ok();
    buf.write_u16::<LittleEndian>(code).ok();
    buf.write_u32::<LittleEndian>(tid).ok();
    buf.extend_from_slice(payload);
    buf
}

fn params_from_payload(payload: &[u8]) -> Result<Vec<u32>, Error> {
    if payload.len() % 4 != 0 {
        return Err(Error::Malformed(format!(
            "parameter payload of {} bytes is not a multiple of four",
            payload.len()
        )));
    }
    let mut cur = std::io::Cursor::new(payload);
    (0..payload.len() / 4)
        .map(|_| Ok(cur.read_u32::<LittleEndian>()?))
        .collect()
}

fn params_to_payload(params: &[u32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(params.len() * 4);
    for p in params {
        buf.write_u32::<LittleEndian>(*p).ok();
    }
    buf
}

/// An operation request from the initiator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub code: u16,
    pub tid: u32,
    params: Vec<u32>,
}

impl Command {
    pub fn new(code: u16, tid: u32, params: Vec<u32>) -> Command {
        Command { code, tid, params }
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn get_param(&self, idx: usize) -> Option<u32> {
        self.params.get(idx).copied()
    }

    pub fn pack(&self) -> Vec<u8> {
        pack_container(
            ContainerType::Command,
            self.code,
            self.tid,
            &params_to_payload(&self.params),
        )
    }
}

/// The responder's answer to a Command; starts out Ok and is mutated by the
/// operation handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: ResponseCode,
    pub tid: u32,
    params: Vec<u32>,
}

impl Response {
    pub fn to_command(command: &Command) -> Response {
        Response {
            code: StandardResponseCode::Ok.into(),
            tid: command.tid,
            params: vec![],
        }
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn get_param(&self, idx: usize) -> Option<u32> {
        self.params.get(idx).copied()
    }

    pub fn add_param(&mut self, param: u32) {
        self.params.push(param);
    }

    pub fn pack(&self) -> Vec<u8> {
        pack_container(
            ContainerType::Response,
            self.code.to_u16().unwrap(),
            self.tid,
            &params_to_payload(&self.params),
        )
    }
}

/// A Data container, possibly still being assembled from transport chunks.
/// `length` is the declared container length, which in a first fragment may
/// exceed the bytes received so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMessage {
    pub length: u32,
    pub code: u16,
    pub tid: u32,
    pub payload: Vec<u8>,
}

impl DataMessage {
    pub fn new(code: u16, tid: u32, payload: Vec<u8>) -> DataMessage {
        DataMessage {
            length: (CONTAINER_HEADER_SIZE + payload.len()) as u32,
            code,
            tid,
            payload,
        }
    }

    /// Whether the payload has reached the declared container length. More
    /// payload than declared is a framing error.
    pub fn has_all_data(&self) -> Result<bool, Error> {
        let have = self.payload.len() + CONTAINER_HEADER_SIZE;
        if (self.length as usize) < have {
            return Err(Error::Malformed(format!(
                "declared length {:#x} < actual data length {:#x}",
                self.length, have
            )));
        }
        Ok(self.length as usize == have)
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.payload.extend_from_slice(chunk);
    }

    pub fn pack(&self) -> Vec<u8> {
        pack_container(ContainerType::Data, self.code, self.tid, &self.payload)
    }
}

/// An asynchronous Event container. The responder core does not originate
/// events on its own; this is the framing for transports that do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub code: u16,
    pub tid: u32,
    pub payload: Vec<u8>,
}

impl Event {
    pub fn new(code: u16, tid: u32, payload: Vec<u8>) -> Event {
        Event { code, tid, payload }
    }

    pub fn with_params(code: EventCode, tid: u32, params: &[u32]) -> Event {
        Event {
            code: code.to_u16().unwrap(),
            tid,
            payload: params_to_payload(params),
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        pack_container(ContainerType::Event, self.code, self.tid, &self.payload)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Container {
    Command(Command),
    Data(DataMessage),
    Response(Response),
    Event(Event),
}

/// Parses one framed container. In permissive mode the declared length may
/// exceed the buffer, which accepts the first fragment of a chunked Data
/// container; the buffer running past the declared length is an error in
/// both modes.
pub fn container_from_payload(buf: &[u8], permissive: bool) -> Result<Container, Error> {
    if buf.len() < CONTAINER_HEADER_SIZE {
        return Err(Error::Malformed(format!(
            "container of {} bytes is shorter than a header",
            buf.len()
        )));
    }
    let mut cur = std::io::Cursor::new(buf);
    let length = cur.read_u32::<LittleEndian>()?;
    let kind_u16 = cur.read_u16::<LittleEndian>()?;
    let code = cur.read_u16::<LittleEndian>()?;
    let tid = cur.read_u32::<LittleEndian>()?;

    if buf.len() as u32 > length || (!permissive && (buf.len() as u32) < length) {
        return Err(Error::Malformed(format!(
            "declared length {:#x} != actual length {:#x}",
            length,
            buf.len()
        )));
    }

    let kind = ContainerType::from_u16(kind_u16)
        .ok_or_else(|| Error::Malformed(format!("invalid container type {:#x}", kind_u16)))?;
    let payload = &buf[CONTAINER_HEADER_SIZE..];

    Ok(match kind {
        ContainerType::Command => Container::Command(Command {
            code,
            tid,
            params: params_from_payload(payload)?,
        }),
        ContainerType::Response => Container::Response(Response {
            code: ResponseCode::from_u16(code).unwrap_or(ResponseCode::Other(code)),
            tid,
            params: params_from_payload(payload)?,
        }),
        ContainerType::Data => Container::Data(DataMessage {
            length,
            code,
            tid,
            payload: payload.to_vec(),
        }),
        ContainerType::Event => Container::Event(Event {
            code,
            tid,
            payload: payload.to_vec(),
        }),
        ContainerType::Undefined => {
            return Err(Error::Malformed("undefined container type".into()));
        }
    })
}
