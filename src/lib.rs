//! Media Transfer Protocol responder stack: the device side of MTP/PTP.
//!
//! The crate consumes framed protocol containers from a transport (typically
//! USB bulk endpoints), drives the Command → (Data) → Response transaction
//! state machine, and serves an in-memory hierarchy of storages and objects
//! with the standard operation set. The transport itself is out of scope:
//! [`MtpResponder::handle_payload`] takes one incoming payload and returns
//! the ordered, already-framed containers to write back.
//!
//! ```no_run
//! use mtpr::*;
//!
//! # fn demo(info: DeviceInfo, storage: MtpStorage) {
//! let mut device = MtpDevice::new(info);
//! device.add_storage(storage);
//! let mut responder = MtpResponder::new(device);
//! // for each payload arriving from the transport:
//! # let payload: &[u8] = &[];
//! for container in responder.handle_payload(payload).unwrap() {
//!     // write `container` back to the transport, in order
//!     # drop(container);
//! }
//! # }
//! ```

use thiserror::Error;

use std::io;

mod command;
mod data;
mod device;
mod engine;
mod event;
mod message;
mod object;
mod ops;
mod properties;
mod response;
mod storage;

pub use crate::command::*;
pub use crate::data::*;
pub use crate::device::{DeviceInfo, MtpDevice};
pub use crate::engine::MtpResponder;
pub use crate::event::*;
pub use crate::message::*;
pub use crate::object::{
    AssociationType, MtpObject, ObjectFormatCode, ObjectHandle, ObjectInfo,
};
pub use crate::properties::{
    supported_object_properties, DeviceProperty, DevicePropertyCode, Form, ObjectPropDesc,
    ObjectProperty, ObjectPropertyCode, Perm,
};
pub use crate::response::*;
pub use crate::storage::{
    AccessType, FilesystemType, MtpStorage, StorageId, StorageInfo, StorageType,
};

/// Engine-level failures: framing and state violations raised to the
/// transport. Protocol-level failures never surface here; they are reported
/// as MTP response codes on the wire.
#[derive(Error, Debug)]
pub enum Error {
    /// Data received was malformed, or arrived in a state that expects a
    /// different container.
    #[error("the data received was malformed: {0}")]
    Malformed(String),

    /// Another IO error
    #[error("an i/o error occurred: {0}")]
    Io(#[from] io::Error),
}
