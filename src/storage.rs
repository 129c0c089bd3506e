use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};
use std::fmt::Display;
use std::io::Cursor;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::object::{self, MtpObject, ObjectHandle};
use crate::{Error, MtpRead, MtpWrite};

/// Storage ids carry a tag in the high bits so initiators can tell them from
/// object handles.
pub(crate) const STORAGE_ID_TAG: u32 = 0x00020000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct StorageId(pub(crate) u32);

impl StorageId {
    /// The wildcard id that addresses all storages combined.
    pub fn all() -> StorageId {
        StorageId(0xFFFFFFFF)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl Display for StorageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageId(0x{:08x})", self.0)
    }
}

impl From<u32> for StorageId {
    fn from(raw: u32) -> Self {
        StorageId(raw)
    }
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum StorageType {
    FixedRom = 0x0001,
    RemovableRom = 0x0002,
    FixedRam = 0x0003,
    RemovableRam = 0x0004,
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum FilesystemType {
    Flat = 0x0001,
    Hierarchical = 0x0002,
    Dcf = 0x0003,
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum AccessType {
    ReadWrite = 0x0000,
    ReadOnlyNoDelete = 0x0001,
    ReadOnlyWithDelete = 0x0002,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct StorageInfo {
    pub storage_type: StorageType,
    pub filesystem_type: FilesystemType,
    pub access_capability: AccessType,
    pub max_capacity: u64,
    pub free_space_in_bytes: u64,
    pub free_space_in_images: u32,
    pub storage_description: String,
    pub volume_label: String,
}

impl StorageInfo {
    pub fn encode<W: MtpWrite>(&self, w: &mut W) -> Result<(), Error> {
        w.write_mtp_u16(self.storage_type.to_u16().unwrap())?;
        w.write_mtp_u16(self.filesystem_type.to_u16().unwrap())?;
        w.write_mtp_u16(self.access_capability.to_u16().unwrap())?;
        w.write_mtp_u64(self.max_capacity)?;
        w.write_mtp_u64(self.free_space_in_bytes)?;
        w.write_mtp_u32(self.free_space_in_images)?;
        w.write_mtp_str(&self.storage_description)?;
        w.write_mtp_str(&self.volume_label)?;
        Ok(())
    }

    pub fn pack(&self) -> Result<Vec<u8>, Error> {
        let mut out = vec![];
        self.encode(&mut out)?;
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<StorageInfo, Error> {
        let mut cur = Cursor::new(buf);
        let storage_type = cur.read_mtp_u16()?;
        let filesystem_type = cur.read_mtp_u16()?;
        let access_capability = cur.read_mtp_u16()?;
        Ok(StorageInfo {
            storage_type: StorageType::from_u16(storage_type)
                .ok_or_else(|| Error::Malformed(format!("bad storage type {:#x}", storage_type)))?,
            filesystem_type: FilesystemType::from_u16(filesystem_type).ok_or_else(|| {
                Error::Malformed(format!("bad filesystem type {:#x}", filesystem_type))
            })?,
            access_capability: AccessType::from_u16(access_capability).ok_or_else(|| {
                Error::Malformed(format!("bad access capability {:#x}", access_capability))
            })?,
            max_capacity: cur.read_mtp_u64()?,
            free_space_in_bytes: cur.read_mtp_u64()?,
            free_space_in_images: cur.read_mtp_u32()?,
            storage_description: cur.read_mtp_str()?,
            volume_label: cur.read_mtp_str()?,
        })
    }
}

/// One storage of the device: a StorageInfo record plus the ordered list of
/// root objects. The child vectors own the whole tree.
#[derive(Debug, Clone)]
pub struct MtpStorage {
    pub(crate) id: StorageId,
    pub info: StorageInfo,
    pub(crate) objects: Vec<MtpObject>,
}

impl MtpStorage {
    /// Creates an unattached storage. Its id is assigned when it is added to
    /// a device.
    pub fn new(info: StorageInfo) -> MtpStorage {
        MtpStorage {
            id: StorageId(0),
            info,
            objects: Vec::new(),
        }
    }

    pub fn id(&self) -> StorageId {
        self.id
    }

    /// Appends an object tree at the storage root. Handles are assigned when
    /// the storage (or the object, for attached storages) is added through
    /// the device.
    pub fn add_object(&mut self, object: MtpObject) {
        self.objects.push(object);
    }

    pub fn objects(&self) -> &[MtpObject] {
        &self.objects
    }

    pub fn can_write(&self) -> bool {
        self.info.access_capability == AccessType::ReadWrite
    }

    pub fn can_delete(&self) -> bool {
        match self.info.access_capability {
            AccessType::ReadWrite | AccessType::ReadOnlyWithDelete => true,
            AccessType::ReadOnlyNoDelete => false,
        }
    }

    /// All object handles in this storage, depth-first in insertion order.
    pub fn handles(&self) -> Vec<ObjectHandle> {
        let mut out = Vec::new();
        object::collect_handles(&self.objects, &mut out);
        out
    }

    pub fn object(&self, handle: ObjectHandle) -> Option<&MtpObject> {
        object::find(&self.objects, handle)
    }

    pub(crate) fn object_mut(&mut self, handle: ObjectHandle) -> Option<&mut MtpObject> {
        object::find_mut(&mut self.objects, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(access: AccessType) -> StorageInfo {
        StorageInfo {
            storage_type: StorageType::FixedRam,
            filesystem_type: FilesystemType::Hierarchical,
            access_capability: access,
            max_capacity: 150000,
            free_space_in_bytes: 120000,
            free_space_in_images: 0,
            storage_description: "Internal storage".into(),
            volume_label: "vol-1".into(),
        }
    }

    #[test]
    fn info_roundtrip() {
        let packed = info(AccessType::ReadWrite).pack().unwrap();
        let back = StorageInfo::decode(&packed).unwrap();
        assert_eq!(back.storage_type, StorageType::FixedRam);
        assert_eq!(back.access_capability, AccessType::ReadWrite);
        assert_eq!(back.max_capacity, 150000);
        assert_eq!(back.storage_description, "Internal storage");
        assert_eq!(back.volume_label, "vol-1");
    }

    #[test]
    fn access_capabilities() {
        let rw = MtpStorage::new(info(AccessType::ReadWrite));
        assert!(rw.can_write() && rw.can_delete());

        let ro = MtpStorage::new(info(AccessType::ReadOnlyNoDelete));
        assert!(!ro.can_write() && !ro.can_delete());

        let rod = MtpStorage::new(info(AccessType::ReadOnlyWithDelete));
        assert!(!rod.can_write() && rod.can_delete());
    }
}
