use num_derive::{FromPrimitive, ToPrimitive};
use std::fmt::Display;
use std::io::Cursor;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::properties::ObjectProperty;
use crate::{Error, MtpRead, MtpWrite, StandardResponseCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ObjectHandle(pub(crate) u32);

impl ObjectHandle {
    /// The wildcard handle that addresses every object.
    pub fn all() -> ObjectHandle {
        ObjectHandle(0xFFFFFFFF)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl Display for ObjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectHandle(0x{:08x})", self.0)
    }
}

impl From<u32> for ObjectHandle {
    fn from(raw: u32) -> Self {
        ObjectHandle(raw)
    }
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ObjectFormatCode {
    UndefinedNonImage = 0x3000,
    Association,
    Script,
    Executable,
    Text,
    Html,
    Dpof,
    Aiff,
    Wav,
    Mp3,
    Avi,
    Mpeg,
    Asf,
    UndefinedImage = 0x3800,
    ExifJpeg,
    TiffEp,
    FlashPix,
    Bmp,
    Ciff,
    UndefinedReserved,
    Gif,
    Jfif,
    Pcd,
    Pict,
    Png,
    UndefinedReserved2,
    Tiff,
    TiffIt,
    Jp2,
    Jpx,
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum AssociationType {
    Undefined = 0x0000,
    GenericFolder,
    Album,
    TimeSequence,
    PanoramicHorizontal,
    PanoramicVertical,
    Panoramic2D,
    AncillaryData,
}

/// The ObjectInfo dataset. Dates are epoch seconds internally and MTP
/// date-time strings on the wire. `storage_id` and `parent_object` are raw
/// ids; 0 means unattached (or root, for the parent).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ObjectInfo {
    pub storage_id: u32,
    pub object_format: u16,
    pub protection_status: u16,
    pub object_compressed_size: u32,
    pub thumb_format: u16,
    pub thumb_compressed_size: u32,
    pub thumb_pix_width: u32,
    pub thumb_pix_height: u32,
    pub image_pix_width: u32,
    pub image_pix_height: u32,
    pub image_bit_depth: u32,
    pub parent_object: u32,
    pub association_type: u16,
    pub association_desc: u32,
    pub sequence_number: u32,
    pub filename: String,
    pub capture_date: i64,
    pub modification_date: i64,
    pub keywords: String,
}

impl ObjectInfo {
    /// A minimal info record for a plain file-like object.
    pub fn with_filename<S: Into<String>>(filename: S) -> ObjectInfo {
        ObjectInfo {
            storage_id: 0,
            object_format: 0,
            protection_status: 0,
            object_compressed_size: 0,
            thumb_format: 0,
            thumb_compressed_size: 0,
            thumb_pix_width: 0,
            thumb_pix_height: 0,
            image_pix_width: 0,
            image_pix_height: 0,
            image_bit_depth: 0,
            parent_object: 0,
            association_type: 0,
            association_desc: 0,
            sequence_number: 0,
            filename: filename.into(),
            capture_date: 0,
            modification_date: 0,
            keywords: String::new(),
        }
    }

    pub fn encode<W: MtpWrite>(&self, w: &mut W) -> Result<(), Error> {
        w.write_mtp_u32(self.storage_id)?;
        w.write_mtp_u16(self.object_format)?;
        w.write_mtp_u16(self.protection_status)?;
        w.write_mtp_u32(self.object_compressed_size)?;
        w.write_mtp_u16(self.thumb_format)?;
        w.write_mtp_u32(self.thumb_compressed_size)?;
        w.write_mtp_u32(self.thumb_pix_width)?;
        w.write_mtp_u32(self.thumb_pix_height)?;
        w.write_mtp_u32(self.image_pix_width)?;
        w.write_mtp_u32(self.image_pix_height)?;
        w.write_mtp_u32(self.image_bit_depth)?;
        w.write_mtp_u32(self.parent_object)?;
        w.write_mtp_u16(self.association_type)?;
        w.write_mtp_u32(self.association_desc)?;
        w.write_mtp_u32(self.sequence_number)?;
        w.write_mtp_str(&self.filename)?;
        w.write_mtp_datetime(self.capture_date)?;
        w.write_mtp_datetime(self.modification_date)?;
        w.write_mtp_str(&self.keywords)?;
        Ok(())
    }

    pub fn pack(&self) -> Result<Vec<u8>, Error> {
        let mut out = vec![];
        self.encode(&mut out)?;
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<ObjectInfo, Error> {
        let mut cur = Cursor::new(buf);
        Ok(ObjectInfo {
            storage_id: cur.read_mtp_u32()?,
            object_format: cur.read_mtp_u16()?,
            protection_status: cur.read_mtp_u16()?,
            object_compressed_size: cur.read_mtp_u32()?,
            thumb_format: cur.read_mtp_u16()?,
            thumb_compressed_size: cur.read_mtp_u32()?,
            thumb_pix_width: cur.read_mtp_u32()?,
            thumb_pix_height: cur.read_mtp_u32()?,
            image_pix_width: cur.read_mtp_u32()?,
            image_pix_height: cur.read_mtp_u32()?,
            image_bit_depth: cur.read_mtp_u32()?,
            parent_object: cur.read_mtp_u32()?,
            association_type: cur.read_mtp_u16()?,
            association_desc: cur.read_mtp_u32()?,
            sequence_number: cur.read_mtp_u32()?,
            filename: cur.read_mtp_str()?,
            capture_date: cur.read_mtp_datetime()?,
            modification_date: cur.read_mtp_datetime()?,
            keywords: cur.read_mtp_str()?,
        })
    }
}

/// An object in the storage hierarchy: payload, ObjectInfo, properties, and
/// child objects. The child vector owns the subtree; parent and storage are
/// carried as ids inside the info record.
#[derive(Debug, Clone)]
pub struct MtpObject {
    pub(crate) handle: ObjectHandle,
    pub info: ObjectInfo,
    pub(crate) data: Option<Vec<u8>>,
    pub(crate) properties: Vec<ObjectProperty>,
    pub(crate) children: Vec<MtpObject>,
}

impl MtpObject {
    /// Creates an unattached object. The handle is assigned when the object
    /// enters a device.
    pub fn new(data: Option<Vec<u8>>, info: ObjectInfo) -> MtpObject {
        let mut obj = MtpObject {
            handle: ObjectHandle(0),
            info,
            data,
            properties: Vec::new(),
            children: Vec::new(),
        };
        obj.refresh_properties();
        obj
    }

    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    pub fn children(&self) -> &[MtpObject] {
        &self.children
    }

    /// Associations (folders and the like) are containers.
    pub fn is_association(&self) -> bool {
        self.info.association_type != 0
    }

    /// A format filter matches on the wildcard, a zero filter, an exact
    /// format, or an object of unset format.
    pub fn format_matches(&self, fmt: u32) -> bool {
        fmt == 0
            || fmt == 0xFFFFFFFF
            || fmt == self.info.object_format as u32
            || self.info.object_format == 0
    }

    /// Appends a child. Parent and storage references are rewritten here for
    /// attached parents and again on device attach for seeded trees.
    pub fn add_object(&mut self, mut child: MtpObject) {
        child.info.parent_object = self.handle.0;
        child.set_storage(self.info.storage_id);
        self.children.push(child);
    }

    pub(crate) fn set_storage(&mut self, storage_id: u32) {
        self.info.storage_id = storage_id;
        self.refresh_properties();
        for child in &mut self.children {
            child.set_storage(storage_id);
        }
    }

    /// Replaces the payload. With `adhere_size` the data must fit the
    /// declared compressed size; the size field then tracks the actual
    /// length.
    pub fn set_data(&mut self, data: Vec<u8>, adhere_size: bool) -> Result<(), StandardResponseCode> {
        if adhere_size && data.len() > self.info.object_compressed_size as usize {
            return Err(StandardResponseCode::StoreFull);
        }
        self.info.object_compressed_size = data.len() as u32;
        self.data = Some(data);
        self.refresh_properties();
        Ok(())
    }

    pub fn set_protection_status(&mut self, status: u32) -> Result<(), StandardResponseCode> {
        if status > 0xFFFF {
            return Err(StandardResponseCode::InvalidParameter);
        }
        self.info.protection_status = status as u16;
        self.refresh_properties();
        Ok(())
    }

    /// Deep copy of info, data and children. Handles are left unassigned and
    /// minted when the copy is attached.
    pub fn deep_copy(&self) -> MtpObject {
        let mut copy = MtpObject::new(self.data.clone(), self.info.clone());
        for child in &self.children {
            copy.children.push(child.deep_copy());
        }
        copy
    }

    pub fn properties(&self) -> &[ObjectProperty] {
        &self.properties
    }

    pub fn property(&self, code: u16) -> Option<&ObjectProperty> {
        self.properties.iter().find(|p| p.code() == code)
    }

    /// Writes a property value. Read-only properties refuse; a rename writes
    /// through to the info record.
    pub fn set_property_value(
        &mut self,
        code: u16,
        buf: &[u8],
    ) -> Result<(), StandardResponseCode> {
        let prop = self
            .properties
            .iter_mut()
            .find(|p| p.code() == code)
            .ok_or(StandardResponseCode::ObjectPropNotSupported)?;
        prop.set_value(buf)?;
        if code == crate::properties::ObjectPropertyCode::OBJECT_FILE_NAME {
            if let crate::MtpData::STR(name) = prop.value() {
                self.info.filename = name.clone();
            }
        }
        self.refresh_properties();
        Ok(())
    }

    pub(crate) fn refresh_properties(&mut self) {
        self.properties = ObjectProperty::standard_set(&self.info, self.handle);
    }
}

pub(crate) fn find(objects: &[MtpObject], handle: ObjectHandle) -> Option<&MtpObject> {
    for obj in objects {
        if obj.handle == handle {
            return Some(obj);
        }
        if let Some(found) = find(&obj.children, handle) {
            return Some(found);
        }
    }
    None
}

pub(crate) fn find_mut(objects: &mut [MtpObject], handle: ObjectHandle) -> Option<&mut MtpObject> {
    for obj in objects {
        if obj.handle == handle {
            return Some(obj);
        }
        if let Some(found) = find_mut(&mut obj.children, handle) {
            return Some(found);
        }
    }
    None
}

/// Removes the object with the given handle from wherever it sits in the
/// tree, returning it with its subtree intact.
pub(crate) fn detach(objects: &mut Vec<MtpObject>, handle: ObjectHandle) -> Option<MtpObject> {
    if let Some(idx) = objects.iter().position(|o| o.handle == handle) {
        return Some(objects.remove(idx));
    }
    for obj in objects {
        if let Some(found) = detach(&mut obj.children, handle) {
            return Some(found);
        }
    }
    None
}

/// Finds the object with the given handle anywhere in the tree and runs the
/// delete machinery on it, detaching it on success. `None` when the handle
/// is not in this tree.
pub(crate) fn delete_in(
    objects: &mut Vec<MtpObject>,
    handle: ObjectHandle,
    fmt: u32,
) -> Option<Result<(), StandardResponseCode>> {
    if let Some(idx) = objects.iter().position(|o| o.handle == handle) {
        let res = delete_tree(&mut objects[idx], fmt);
        if res.is_ok() {
            objects.remove(idx);
        }
        return Some(res);
    }
    for obj in objects {
        if let Some(res) = delete_in(&mut obj.children, handle, fmt) {
            return Some(res);
        }
    }
    None
}

pub(crate) fn collect_handles(objects: &[MtpObject], out: &mut Vec<ObjectHandle>) {
    for obj in objects {
        out.push(obj.handle);
        collect_handles(&obj.children, out);
    }
}

/// Deletes matching children bottom-up, then judges the object itself.
/// `Ok(())` means the caller must detach the object; on error the object
/// stays attached (with whatever children survived).
pub(crate) fn delete_tree(obj: &mut MtpObject, fmt: u32) -> Result<(), StandardResponseCode> {
    let (deleted, failed) = delete_children(&mut obj.children, fmt);
    if failed > 0 {
        return Err(if deleted > 0 {
            StandardResponseCode::PartialDeletion
        } else {
            StandardResponseCode::ObjectWriteProtected
        });
    }
    if !obj.format_matches(fmt) {
        return Err(StandardResponseCode::SpecificationByFormatUnsupported);
    }
    Ok(())
}

pub(crate) fn delete_children(children: &mut Vec<MtpObject>, fmt: u32) -> (usize, usize) {
    let mut kept = Vec::new();
    let mut deleted = 0;
    let mut failed = 0;
    for mut child in children.drain(..) {
        match delete_tree(&mut child, fmt) {
            Ok(()) => deleted += 1,
            Err(_) => {
                failed += 1;
                kept.push(child);
            }
        }
    }
    *children = kept;
    (deleted, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::ToPrimitive;

    fn leaf(name: &str, format: u16) -> MtpObject {
        let mut info = ObjectInfo::with_filename(name);
        info.object_format = format;
        MtpObject::new(None, info)
    }

    #[test]
    fn format_filter_laws() {
        let jpeg = ObjectFormatCode::ExifJpeg.to_u16().unwrap();
        let obj = leaf("a.jpeg", jpeg);
        assert!(obj.format_matches(0));
        assert!(obj.format_matches(0xFFFFFFFF));
        assert!(obj.format_matches(jpeg as u32));
        assert!(!obj.format_matches(ObjectFormatCode::Png.to_u16().unwrap() as u32));

        let unset = leaf("b", 0);
        assert!(unset.format_matches(ObjectFormatCode::Png.to_u16().unwrap() as u32));
    }

    #[test]
    fn set_data_tracks_size() {
        let mut obj = leaf("a", 0);
        obj.set_data(vec![1, 2, 3], false).unwrap();
        assert_eq!(obj.info.object_compressed_size, 3);
        assert_eq!(obj.data(), &[1, 2, 3]);
    }

    #[test]
    fn set_data_adhere_size() {
        let mut obj = leaf("a", 0);
        obj.info.object_compressed_size = 2;
        assert_eq!(
            obj.set_data(vec![1, 2, 3], true),
            Err(StandardResponseCode::StoreFull)
        );
        assert_eq!(obj.info.object_compressed_size, 2);
        obj.set_data(vec![1], true).unwrap();
        assert_eq!(obj.info.object_compressed_size, 1);
    }

    #[test]
    fn protection_status_range() {
        let mut obj = leaf("a", 0);
        obj.set_protection_status(0x8002).unwrap();
        assert_eq!(obj.info.protection_status, 0x8002);
        assert_eq!(
            obj.set_protection_status(0x10000),
            Err(StandardResponseCode::InvalidParameter)
        );
        assert_eq!(obj.info.protection_status, 0x8002);
    }

    #[test]
    fn deep_copy_keeps_structure() {
        let mut root = leaf("dir", 0);
        root.info.association_type = AssociationType::GenericFolder.to_u16().unwrap();
        let mut inner = leaf("file", 0);
        inner.set_data(vec![9, 9], false).unwrap();
        root.add_object(inner);

        let copy = root.deep_copy();
        assert_eq!(copy.handle.raw(), 0);
        assert_eq!(copy.children.len(), 1);
        assert_eq!(copy.children[0].data(), &[9, 9]);
        assert_eq!(copy.info.filename, "dir");
    }

    #[test]
    fn delete_by_format_is_selective() {
        let jpeg = ObjectFormatCode::ExifJpeg.to_u16().unwrap();
        let png = ObjectFormatCode::Png.to_u16().unwrap();
        let mut folder = leaf("dir", jpeg);
        folder.add_object(leaf("a.jpeg", jpeg));
        folder.add_object(leaf("b.png", png));

        // the png child refuses, the jpeg child goes: partial
        let res = delete_tree(&mut folder, jpeg as u32);
        assert_eq!(res, Err(StandardResponseCode::PartialDeletion));
        assert_eq!(folder.children.len(), 1);
        assert_eq!(folder.children[0].info.filename, "b.png");
    }

    #[test]
    fn delete_none_matches_reports_write_protected() {
        let jpeg = ObjectFormatCode::ExifJpeg.to_u16().unwrap();
        let png = ObjectFormatCode::Png.to_u16().unwrap();
        let mut folder = leaf("dir", jpeg);
        folder.add_object(leaf("b.png", png));
        folder.add_object(leaf("c.png", png));

        let res = delete_tree(&mut folder, jpeg as u32);
        assert_eq!(res, Err(StandardResponseCode::ObjectWriteProtected));
        assert_eq!(folder.children.len(), 2);
    }

    #[test]
    fn delete_self_format_mismatch() {
        let jpeg = ObjectFormatCode::ExifJpeg.to_u16().unwrap();
        let png = ObjectFormatCode::Png.to_u16().unwrap();
        let mut obj = leaf("b.png", png);
        assert_eq!(
            delete_tree(&mut obj, jpeg as u32),
            Err(StandardResponseCode::SpecificationByFormatUnsupported)
        );
        assert_eq!(delete_tree(&mut obj, 0), Ok(()));
    }

    #[test]
    fn info_roundtrip() {
        let mut info = ObjectInfo::with_filename("wallpaper_1.jpeg");
        info.storage_id = 0x00020001;
        info.object_format = ObjectFormatCode::ExifJpeg.to_u16().unwrap();
        info.object_compressed_size = 4;
        info.capture_date = 1596196862;
        info.modification_date = 1596196900;
        info.keywords = "wall".into();

        let packed = info.pack().unwrap();
        let back = ObjectInfo::decode(&packed).unwrap();
        assert_eq!(back.storage_id, info.storage_id);
        assert_eq!(back.object_format, info.object_format);
        assert_eq!(back.object_compressed_size, 4);
        assert_eq!(back.filename, "wallpaper_1.jpeg");
        assert_eq!(back.capture_date, 1596196862);
        assert_eq!(back.modification_date, 1596196900);
        assert_eq!(back.keywords, "wall");
    }

    #[test]
    fn tree_search_and_detach() {
        let mut a = leaf("a", 0);
        a.handle = ObjectHandle(1);
        let mut b = leaf("b", 0);
        b.handle = ObjectHandle(2);
        let mut c = leaf("c", 0);
        c.handle = ObjectHandle(3);
        b.children.push(c);
        a.children.push(b);
        let mut roots = vec![a];

        assert!(find(&roots, ObjectHandle(3)).is_some());
        assert!(find(&roots, ObjectHandle(4)).is_none());

        let mut handles = Vec::new();
        collect_handles(&roots, &mut handles);
        assert_eq!(handles, vec![ObjectHandle(1), ObjectHandle(2), ObjectHandle(3)]);

        let detached = detach(&mut roots, ObjectHandle(2)).unwrap();
        assert_eq!(detached.children.len(), 1);
        assert!(find(&roots, ObjectHandle(3)).is_none());
    }
}
