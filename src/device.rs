use std::io::Cursor;

use num_traits::FromPrimitive;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::command::CommandCode;
use crate::object::{self, MtpObject, ObjectHandle};
use crate::ops::{Operation, OperationRegistry};
use crate::properties::DeviceProperty;
use crate::storage::{MtpStorage, StorageId, STORAGE_ID_TAG};
use crate::{Error, MtpRead, MtpWrite, StandardResponseCode};

/// Mints unique 32-bit ids for one device. Storage ids get their tag applied
/// on top.
#[derive(Debug, Default, Clone)]
pub(crate) struct IdAllocator {
    counter: u32,
}

impl IdAllocator {
    pub(crate) fn next(&mut self) -> u32 {
        self.counter += 1;
        self.counter
    }
}

/// The DeviceInfo dataset. The supported-operation and supported-property
/// arrays are filled in from the live registry when the dataset is packed.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct DeviceInfo {
    pub std_version: u16,
    pub mtp_vendor_ext_id: u32,
    pub mtp_version: u16,
    pub mtp_extensions: String,
    pub functional_mode: u16,
    pub operations_supported: Vec<u16>,
    pub events_supported: Vec<u16>,
    pub device_properties_supported: Vec<u16>,
    pub capture_formats: Vec<u16>,
    pub playback_formats: Vec<u16>,
    pub manufacturer: String,
    pub model: String,
    pub device_version: String,
    pub serial_number: String,
}

impl DeviceInfo {
    pub fn encode<W: MtpWrite>(&self, w: &mut W) -> Result<(), Error> {
        w.write_mtp_u16(self.std_version)?;
        w.write_mtp_u32(self.mtp_vendor_ext_id)?;
        w.write_mtp_u16(self.mtp_version)?;
        w.write_mtp_str(&self.mtp_extensions)?;
        w.write_mtp_u16(self.functional_mode)?;
        w.write_mtp_u16_vec(&self.operations_supported)?;
        w.write_mtp_u16_vec(&self.events_supported)?;
        w.write_mtp_u16_vec(&self.device_properties_supported)?;
        w.write_mtp_u16_vec(&self.capture_formats)?;
        w.write_mtp_u16_vec(&self.playback_formats)?;
        w.write_mtp_str(&self.manufacturer)?;
        w.write_mtp_str(&self.model)?;
        w.write_mtp_str(&self.device_version)?;
        w.write_mtp_str(&self.serial_number)?;
        Ok(())
    }

    pub fn pack(&self) -> Result<Vec<u8>, Error> {
        let mut out = vec![];
        self.encode(&mut out)?;
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<DeviceInfo, Error> {
        let mut cur = Cursor::new(buf);
        Ok(DeviceInfo {
            std_version: cur.read_mtp_u16()?,
            mtp_vendor_ext_id: cur.read_mtp_u32()?,
            mtp_version: cur.read_mtp_u16()?,
            mtp_extensions: cur.read_mtp_str()?,
            functional_mode: cur.read_mtp_u16()?,
            operations_supported: cur.read_mtp_u16_vec()?,
            events_supported: cur.read_mtp_u16_vec()?,
            device_properties_supported: cur.read_mtp_u16_vec()?,
            capture_formats: cur.read_mtp_u16_vec()?,
            playback_formats: cur.read_mtp_u16_vec()?,
            manufacturer: cur.read_mtp_str()?,
            model: cur.read_mtp_str()?,
            device_version: cur.read_mtp_str()?,
            serial_number: cur.read_mtp_str()?,
        })
    }
}

/// The responder's device model: storages, device properties, session state
/// and the pending object minted by SendObjectInfo.
pub struct MtpDevice {
    pub info: DeviceInfo,
    pub(crate) stores: Vec<MtpStorage>,
    pub(crate) properties: Vec<DeviceProperty>,
    pub(crate) session_id: Option<u32>,
    pub(crate) pending_object: Option<ObjectHandle>,
    pub(crate) ids: IdAllocator,
    registry: OperationRegistry,
}

impl MtpDevice {
    pub fn new(info: DeviceInfo) -> MtpDevice {
        MtpDevice {
            info,
            stores: Vec::new(),
            properties: Vec::new(),
            session_id: None,
            pending_object: None,
            ids: IdAllocator::default(),
            registry: OperationRegistry::standard(),
        }
    }

    pub fn session_id(&self) -> Option<u32> {
        self.session_id
    }

    /// Resolves a wire opcode to a registered operation. Vendor and
    /// unregistered codes fall out as `CommandCode::Other` and stay
    /// unresolved.
    pub(crate) fn operation(&self, code: u16) -> Option<&Operation> {
        match CommandCode::from_u16(code) {
            Some(CommandCode::Standard(code)) => self.registry.get(code),
            _ => None,
        }
    }

    /// The DeviceInfo dataset, advertising the registered operations and
    /// properties.
    pub fn device_info_payload(&self) -> Result<Vec<u8>, Error> {
        let mut info = self.info.clone();
        info.operations_supported = self.registry.codes();
        info.device_properties_supported = self.properties.iter().map(|p| p.code()).collect();
        info.pack()
    }

    /// Attaches a storage, minting its tagged id and assigning handles to
    /// any seeded object trees.
    pub fn add_storage(&mut self, mut storage: MtpStorage) -> StorageId {
        let id = StorageId(self.ids.next() | STORAGE_ID_TAG);
        storage.id = id;
        let mut roots = std::mem::take(&mut storage.objects);
        for obj in &mut roots {
            assign_handles(obj, &mut self.ids, id.raw(), 0);
        }
        storage.objects = roots;
        self.stores.push(storage);
        id
    }

    /// Registers a device property; a property with the same code is
    /// replaced.
    pub fn add_property(&mut self, property: DeviceProperty) {
        if let Some(existing) = self
            .properties
            .iter_mut()
            .find(|p| p.code() == property.code())
        {
            *existing = property;
        } else {
            self.properties.push(property);
        }
    }

    pub fn properties(&self) -> &[DeviceProperty] {
        &self.properties
    }

    pub(crate) fn property(&self, code: u32) -> Result<&DeviceProperty, StandardResponseCode> {
        self.properties
            .iter()
            .find(|p| p.code() as u32 == code)
            .ok_or(StandardResponseCode::DevicePropNotSupported)
    }

    pub(crate) fn property_mut(
        &mut self,
        code: u32,
    ) -> Result<&mut DeviceProperty, StandardResponseCode> {
        self.properties
            .iter_mut()
            .find(|p| p.code() as u32 == code)
            .ok_or(StandardResponseCode::DevicePropNotSupported)
    }

    pub fn storages(&self) -> &[MtpStorage] {
        &self.stores
    }

    pub fn storage(&self, id: StorageId) -> Result<&MtpStorage, StandardResponseCode> {
        self.stores
            .iter()
            .find(|s| s.id == id)
            .ok_or(StandardResponseCode::InvalidStorageId)
    }

    fn storage_index(&self, id: StorageId) -> Result<usize, StandardResponseCode> {
        self.stores
            .iter()
            .position(|s| s.id == id)
            .ok_or(StandardResponseCode::InvalidStorageId)
    }

    /// Looks an object up across all storages, in storage insertion order,
    /// depth-first within each.
    pub fn object(&self, handle: ObjectHandle) -> Result<&MtpObject, StandardResponseCode> {
        self.stores
            .iter()
            .find_map(|s| s.object(handle))
            .ok_or(StandardResponseCode::InvalidObjectHandle)
    }

    pub(crate) fn object_mut(
        &mut self,
        handle: ObjectHandle,
    ) -> Result<&mut MtpObject, StandardResponseCode> {
        self.stores
            .iter_mut()
            .find_map(|s| s.object_mut(handle))
            .ok_or(StandardResponseCode::InvalidObjectHandle)
    }

    /// All handles under one storage (or every storage for the wildcard id)
    /// whose object passes the format filter.
    pub fn handles_for_storage(
        &self,
        storage_id: StorageId,
        fmt: u32,
    ) -> Result<Vec<ObjectHandle>, StandardResponseCode> {
        let stores: Vec<&MtpStorage> = if storage_id == StorageId::all() {
            self.stores.iter().collect()
        } else {
            vec![self.storage(storage_id)?]
        };
        let mut handles = Vec::new();
        for store in stores {
            for handle in store.handles() {
                let obj = store.object(handle).expect("listed handle resolves");
                if obj.format_matches(fmt) {
                    handles.push(handle);
                }
            }
        }
        Ok(handles)
    }

    /// Attaches an object tree below a parent (or at the storage root),
    /// assigning handles throughout. This is also the seeding entry point.
    pub fn add_object(
        &mut self,
        storage_id: StorageId,
        parent: Option<ObjectHandle>,
        mut object: MtpObject,
    ) -> Result<ObjectHandle, StandardResponseCode> {
        let idx = self.storage_index(storage_id)?;
        if let Some(p) = parent {
            if self.stores[idx].object(p).is_none() {
                return Err(StandardResponseCode::InvalidParentObject);
            }
        }
        let parent_raw = parent.map_or(0, |p| p.0);
        assign_handles(&mut object, &mut self.ids, storage_id.raw(), parent_raw);
        let handle = object.handle;
        let storage = &mut self.stores[idx];
        match parent {
            Some(p) => storage
                .object_mut(p)
                .ok_or(StandardResponseCode::InvalidParentObject)?
                .children
                .push(object),
            None => storage.objects.push(object),
        }
        Ok(handle)
    }

    /// Deletes one object (and its subtree) by handle.
    pub fn delete_object(
        &mut self,
        handle: ObjectHandle,
        fmt: u32,
    ) -> Result<(), StandardResponseCode> {
        for store in &mut self.stores {
            if store.object(handle).is_none() {
                continue;
            }
            if !store.can_delete() {
                return Err(StandardResponseCode::ObjectWriteProtected);
            }
            return object::delete_in(&mut store.objects, handle, fmt)
                .expect("object found above");
        }
        Err(StandardResponseCode::InvalidObjectHandle)
    }

    /// Wildcard delete across every storage, aggregating per-object outcomes
    /// into one response.
    pub fn delete_all_objects(&mut self, fmt: u32) -> Result<(), StandardResponseCode> {
        let mut deleted = false;
        let mut undeleted = false;
        for store in &mut self.stores {
            if !store.can_delete() {
                undeleted |= !store.objects.is_empty();
                continue;
            }
            let mut kept = Vec::new();
            for mut obj in store.objects.drain(..) {
                match object::delete_tree(&mut obj, fmt) {
                    Ok(()) => deleted = true,
                    Err(code) => {
                        if code == StandardResponseCode::PartialDeletion {
                            deleted = true;
                        }
                        undeleted = true;
                        kept.push(obj);
                    }
                }
            }
            store.objects = kept;
        }
        if undeleted {
            Err(if deleted {
                StandardResponseCode::PartialDeletion
            } else {
                StandardResponseCode::ObjectWriteProtected
            })
        } else {
            Ok(())
        }
    }

    /// Detaches an object and re-attaches it under a new storage/parent,
    /// keeping its handles.
    pub fn move_object(
        &mut self,
        handle: ObjectHandle,
        storage_id: StorageId,
        parent: Option<ObjectHandle>,
    ) -> Result<(), StandardResponseCode> {
        let idx = self.storage_index(storage_id)?;
        if !self.stores[idx].can_write() {
            return Err(StandardResponseCode::StoreReadOnly);
        }
        if let Some(p) = parent {
            // the target parent must exist and must not sit inside the
            // subtree being moved
            let moved = self.object(handle)?;
            if object::find(std::slice::from_ref(moved), p).is_some() {
                return Err(StandardResponseCode::InvalidParentObject);
            }
            if self.stores[idx].object(p).is_none() {
                return Err(StandardResponseCode::InvalidParentObject);
            }
        } else {
            self.object(handle)?;
        }
        let mut obj = self
            .stores
            .iter_mut()
            .find_map(|s| object::detach(&mut s.objects, handle))
            .ok_or(StandardResponseCode::InvalidObjectHandle)?;
        obj.info.parent_object = parent.map_or(0, |p| p.0);
        obj.set_storage(storage_id.raw());
        let storage = &mut self.stores[idx];
        match parent {
            Some(p) => storage
                .object_mut(p)
                .ok_or(StandardResponseCode::InvalidParentObject)?
                .children
                .push(obj),
            None => storage.objects.push(obj),
        }
        Ok(())
    }

    /// Deep-copies an object into the target storage/parent and returns the
    /// handle of the new root.
    pub fn copy_object(
        &mut self,
        handle: ObjectHandle,
        storage_id: StorageId,
        parent: Option<ObjectHandle>,
    ) -> Result<ObjectHandle, StandardResponseCode> {
        let idx = self.storage_index(storage_id)?;
        if !self.stores[idx].can_write() {
            return Err(StandardResponseCode::StoreReadOnly);
        }
        let copy = self.object(handle)?.deep_copy();
        self.add_object(storage_id, parent, copy)
    }

    /// Drops a half-constructed object left over when SendObjectInfo is not
    /// followed by SendObject.
    pub(crate) fn discard_pending(&mut self) {
        if let Some(handle) = self.pending_object.take() {
            for store in &mut self.stores {
                if object::detach(&mut store.objects, handle).is_some() {
                    break;
                }
            }
        }
    }
}

/// Assigns handles through a subtree (minting only where unassigned) and
/// rewrites storage and parent back-references.
pub(crate) fn assign_handles(
    obj: &mut MtpObject,
    ids: &mut IdAllocator,
    storage_id: u32,
    parent: u32,
) {
    if obj.handle.raw() == 0 {
        obj.handle = ObjectHandle(ids.next());
    }
    obj.info.storage_id = storage_id;
    obj.info.parent_object = parent;
    let handle = obj.handle.raw();
    for child in &mut obj.children {
        assign_handles(child, ids, storage_id, handle);
    }
    obj.refresh_properties();
}
