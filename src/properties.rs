use std::io::Cursor;

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::ToPrimitive;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::data::format_datetime;
use crate::object::{ObjectHandle, ObjectInfo};
use crate::{Error, MtpData, MtpWrite, StandardResponseCode};

/// Device property codes named by the protocol.
pub struct DevicePropertyCode;

impl DevicePropertyCode {
    pub const UNDEFINED: u16 = 0x5000;
    pub const BATTERY_LEVEL: u16 = 0x5001;
    pub const FUNCTIONAL_MODE: u16 = 0x5002;
    pub const IMAGE_SIZE: u16 = 0x5003;
    pub const COMPRESSION_SETTING: u16 = 0x5004;
    pub const WHITE_BALANCE: u16 = 0x5005;
    pub const RGB_GAIN: u16 = 0x5006;
    pub const F_NUMBER: u16 = 0x5007;
    pub const FOCAL_LENGTH: u16 = 0x5008;
    pub const FOCUS_DISTANCE: u16 = 0x5009;
    pub const FOCUS_MODE: u16 = 0x500A;
    pub const EXPOSURE_METERING_MODE: u16 = 0x500B;
    pub const FLASH_MODE: u16 = 0x500C;
    pub const EXPOSURE_TIME: u16 = 0x500D;
    pub const EXPOSURE_PROGRAM_MODE: u16 = 0x500E;
    pub const EXPOSURE_INDEX: u16 = 0x500F;
    pub const EXPOSURE_BIAS_COMPENSATION: u16 = 0x5010;
    pub const DATE_TIME: u16 = 0x5011;
    pub const CAPTURE_DELAY: u16 = 0x5012;
    pub const STILL_CAPTURE_MODE: u16 = 0x5013;
    pub const CONTRAST: u16 = 0x5014;
    pub const SHARPNESS: u16 = 0x5015;
    pub const DIGITAL_ZOOM: u16 = 0x5016;
    pub const EFFECT_MODE: u16 = 0x5017;
    pub const BURST_NUMBER: u16 = 0x5018;
    pub const BURST_INTERVAL: u16 = 0x5019;
    pub const TIMELAPSE_NUMBER: u16 = 0x501A;
    pub const TIMELAPSE_INTERVAL: u16 = 0x501B;
    pub const FOCUS_METERING_MODE: u16 = 0x501C;
    pub const UPLOAD_URL: u16 = 0x501D;
    pub const ARTIST: u16 = 0x501E;
    pub const COPYRIGHT_INFO: u16 = 0x501F;
    pub const SYNCHRONIZATION_PARTNER: u16 = 0xD401;
    pub const DEVICE_FRIENDLY_NAME: u16 = 0xD402;
    pub const VOLUME_LEVEL: u16 = 0xD403;
    pub const DEVICE_ICON: u16 = 0xD405;
    pub const SESSION_INITIATOR_INFO: u16 = 0xD406;
    pub const PERCEIVED_DEVICE_TYPE: u16 = 0xD407;
    pub const PLAYBACK_RATE: u16 = 0xD410;
    pub const PLAYBACK_OBJECT: u16 = 0xD411;
    pub const PLAYBACK_CONTAINER_INDEX: u16 = 0xD412;
    pub const PLAYBACK_POSITION: u16 = 0xD413;
}

/// Object property codes named by the protocol (the subset this stack
/// works with).
pub struct ObjectPropertyCode;

impl ObjectPropertyCode {
    pub const STORAGE_ID: u16 = 0xDC01;
    pub const OBJECT_FORMAT: u16 = 0xDC02;
    pub const PROTECTION_STATUS: u16 = 0xDC03;
    pub const OBJECT_SIZE: u16 = 0xDC04;
    pub const ASSOCIATION_TYPE: u16 = 0xDC05;
    pub const ASSOCIATION_DESC: u16 = 0xDC06;
    pub const OBJECT_FILE_NAME: u16 = 0xDC07;
    pub const DATE_CREATED: u16 = 0xDC08;
    pub const DATE_MODIFIED: u16 = 0xDC09;
    pub const KEYWORDS: u16 = 0xDC0A;
    pub const PARENT_OBJECT: u16 = 0xDC0B;
    pub const ALLOWED_FOLDER_CONTENTS: u16 = 0xDC0C;
    pub const HIDDEN: u16 = 0xDC0D;
    pub const SYSTEM_OBJECT: u16 = 0xDC0E;
    pub const PERSISTENT_UNIQUE_OBJECT_IDENTIFIER: u16 = 0xDC41;
    pub const SYNC_ID: u16 = 0xDC42;
    pub const PROPERTY_BAG: u16 = 0xDC43;
    pub const NAME: u16 = 0xDC44;
    pub const CREATED_BY: u16 = 0xDC45;
    pub const ARTIST: u16 = 0xDC46;
    pub const DATE_AUTHORED: u16 = 0xDC47;
    pub const DESCRIPTION: u16 = 0xDC48;
    pub const WIDTH: u16 = 0xDC87;
    pub const HEIGHT: u16 = 0xDC88;
    pub const DURATION: u16 = 0xDC89;
    pub const DISPLAY_NAME: u16 = 0xDCE0;
}

/// Access permission of a property.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Perm {
    Get = 0,
    GetSet = 1,
}

/// Optional form descriptor constraining a property's values.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Form {
    None,
    Range {
        min: MtpData,
        max: MtpData,
        step: MtpData,
    },
    /// The allowed-value list is encoded with a u16 element count.
    Enumeration(Vec<MtpData>),
    DateTime,
    FixedLengthArray,
    Regex,
    ByteArray,
    LongString,
}

impl Form {
    pub fn flag(&self) -> u8 {
        match self {
            Form::None => 0x00,
            Form::Range { .. } => 0x01,
            Form::Enumeration(_) => 0x02,
            Form::DateTime => 0x03,
            Form::FixedLengthArray => 0x04,
            Form::Regex => 0x05,
            Form::ByteArray => 0x06,
            Form::LongString => 0xFF,
        }
    }

    /// Writes the form flag and, for forms that carry one, the form body.
    pub fn encode<W: MtpWrite>(&self, w: &mut W) -> Result<(), Error> {
        w.write_mtp_u8(self.flag())?;
        match self {
            Form::Range { min, max, step } => {
                min.encode(w)?;
                max.encode(w)?;
                step.encode(w)?;
            }
            Form::Enumeration(values) => {
                w.write_mtp_u16(values.len() as u16)?;
                for value in values {
                    value.encode(w)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// A device property: current and default value, permission, and form.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct DeviceProperty {
    code: u16,
    perm: Perm,
    value: MtpData,
    default: MtpData,
    form: Form,
}

impl DeviceProperty {
    pub fn new(code: u16, perm: Perm, value: MtpData, default: MtpData) -> DeviceProperty {
        DeviceProperty {
            code,
            perm,
            value,
            default,
            form: Form::None,
        }
    }

    pub fn with_form(
        code: u16,
        perm: Perm,
        value: MtpData,
        default: MtpData,
        form: Form,
    ) -> DeviceProperty {
        DeviceProperty {
            code,
            perm,
            value,
            default,
            form,
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn dtype(&self) -> u16 {
        self.value.dtype()
    }

    pub fn can_set(&self) -> bool {
        self.perm == Perm::GetSet
    }

    pub fn value(&self) -> &MtpData {
        &self.value
    }

    /// The DevicePropDesc dataset:
    /// code | dtype | perm | default | current | form flag [| form].
    pub fn desc(&self) -> Result<Vec<u8>, Error> {
        let mut out = vec![];
        out.write_mtp_u16(self.code)?;
        out.write_mtp_u16(self.dtype())?;
        out.write_mtp_u8(self.perm.to_u8().unwrap())?;
        self.default.encode(&mut out)?;
        self.value.encode(&mut out)?;
        self.form.encode(&mut out)?;
        Ok(out)
    }

    pub fn value_bytes(&self) -> Result<Vec<u8>, Error> {
        self.value.to_bytes()
    }

    pub fn set_value(&mut self, buf: &[u8]) -> Result<(), StandardResponseCode> {
        if !self.can_set() {
            return Err(StandardResponseCode::AccessDenied);
        }
        let mut cur = Cursor::new(buf);
        self.value = MtpData::read_type(self.dtype(), &mut cur)
            .map_err(|_| StandardResponseCode::InvalidDevicePropFormat)?;
        Ok(())
    }

    /// Resetting honors the writable gate, like setting.
    pub fn reset_value(&mut self) -> Result<(), StandardResponseCode> {
        if !self.can_set() {
            return Err(StandardResponseCode::AccessDenied);
        }
        self.value = self.default.clone();
        Ok(())
    }
}

/// Shared descriptor of an object property.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ObjectPropDesc {
    pub code: u16,
    pub perm: Perm,
    pub default: MtpData,
    pub group_code: u32,
    pub form: Form,
}

impl ObjectPropDesc {
    fn new(code: u16, perm: Perm, default: MtpData) -> ObjectPropDesc {
        ObjectPropDesc {
            code,
            perm,
            default,
            group_code: 0,
            form: Form::None,
        }
    }

    fn with_form(code: u16, perm: Perm, default: MtpData, form: Form) -> ObjectPropDesc {
        ObjectPropDesc {
            code,
            perm,
            default,
            group_code: 0,
            form,
        }
    }

    pub fn dtype(&self) -> u16 {
        self.default.dtype()
    }

    pub fn can_set(&self) -> bool {
        self.perm == Perm::GetSet
    }

    /// The ObjectPropDesc dataset:
    /// code | dtype | perm | default | group code | form flag [| form].
    pub fn pack(&self) -> Result<Vec<u8>, Error> {
        let mut out = vec![];
        out.write_mtp_u16(self.code)?;
        out.write_mtp_u16(self.dtype())?;
        out.write_mtp_u8(self.perm.to_u8().unwrap())?;
        self.default.encode(&mut out)?;
        out.write_mtp_u32(self.group_code)?;
        self.form.encode(&mut out)?;
        Ok(out)
    }

    /// Descriptor for a supported property code.
    pub fn standard(code: u16) -> Option<ObjectPropDesc> {
        use self::ObjectPropertyCode as OPC;
        Some(match code {
            OPC::STORAGE_ID => ObjectPropDesc::new(code, Perm::Get, MtpData::UINT32(0)),
            OPC::OBJECT_FORMAT => ObjectPropDesc::new(code, Perm::Get, MtpData::UINT16(0)),
            OPC::PROTECTION_STATUS => ObjectPropDesc::with_form(
                code,
                Perm::Get,
                MtpData::UINT16(0),
                Form::Enumeration(vec![
                    MtpData::UINT16(0x0000),
                    MtpData::UINT16(0x0001),
                    MtpData::UINT16(0x8002),
                    MtpData::UINT16(0x8003),
                ]),
            ),
            OPC::OBJECT_SIZE => ObjectPropDesc::new(code, Perm::Get, MtpData::UINT64(0)),
            OPC::ASSOCIATION_TYPE => ObjectPropDesc::with_form(
                code,
                Perm::Get,
                MtpData::UINT16(0),
                Form::Enumeration(vec![MtpData::UINT16(0), MtpData::UINT16(1)]),
            ),
            OPC::ASSOCIATION_DESC => ObjectPropDesc::new(code, Perm::Get, MtpData::UINT32(0)),
            OPC::OBJECT_FILE_NAME => {
                ObjectPropDesc::new(code, Perm::GetSet, MtpData::STR(String::new()))
            }
            OPC::DATE_CREATED => ObjectPropDesc::with_form(
                code,
                Perm::Get,
                MtpData::STR(String::new()),
                Form::DateTime,
            ),
            OPC::DATE_MODIFIED => ObjectPropDesc::with_form(
                code,
                Perm::Get,
                MtpData::STR(String::new()),
                Form::DateTime,
            ),
            OPC::KEYWORDS => ObjectPropDesc::new(code, Perm::Get, MtpData::STR(String::new())),
            OPC::PARENT_OBJECT => ObjectPropDesc::new(code, Perm::Get, MtpData::UINT32(0)),
            OPC::PERSISTENT_UNIQUE_OBJECT_IDENTIFIER => {
                ObjectPropDesc::new(code, Perm::Get, MtpData::UINT128(0))
            }
            OPC::NAME => ObjectPropDesc::new(code, Perm::Get, MtpData::STR(String::new())),
            _ => return None,
        })
    }
}

/// The property codes every object carries, in descriptor order.
pub fn supported_object_properties() -> &'static [u16] {
    &[
        ObjectPropertyCode::STORAGE_ID,
        ObjectPropertyCode::OBJECT_FORMAT,
        ObjectPropertyCode::PROTECTION_STATUS,
        ObjectPropertyCode::OBJECT_SIZE,
        ObjectPropertyCode::ASSOCIATION_TYPE,
        ObjectPropertyCode::ASSOCIATION_DESC,
        ObjectPropertyCode::OBJECT_FILE_NAME,
        ObjectPropertyCode::DATE_CREATED,
        ObjectPropertyCode::DATE_MODIFIED,
        ObjectPropertyCode::KEYWORDS,
        ObjectPropertyCode::PARENT_OBJECT,
        ObjectPropertyCode::PERSISTENT_UNIQUE_OBJECT_IDENTIFIER,
        ObjectPropertyCode::NAME,
    ]
}

/// One property of one object: a shared descriptor plus the current value.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ObjectProperty {
    desc: ObjectPropDesc,
    value: MtpData,
}

impl ObjectProperty {
    pub fn code(&self) -> u16 {
        self.desc.code
    }

    pub fn dtype(&self) -> u16 {
        self.desc.dtype()
    }

    pub fn can_set(&self) -> bool {
        self.desc.can_set()
    }

    pub fn value(&self) -> &MtpData {
        &self.value
    }

    pub fn value_bytes(&self) -> Result<Vec<u8>, Error> {
        self.value.to_bytes()
    }

    pub fn set_value(&mut self, buf: &[u8]) -> Result<(), StandardResponseCode> {
        if !self.can_set() {
            return Err(StandardResponseCode::AccessDenied);
        }
        let mut cur = Cursor::new(buf);
        self.value = MtpData::read_type(self.dtype(), &mut cur)
            .map_err(|_| StandardResponseCode::InvalidObjectPropValue)?;
        Ok(())
    }

    /// Builds the fixed property set of an object from its info record.
    pub(crate) fn standard_set(info: &ObjectInfo, handle: ObjectHandle) -> Vec<ObjectProperty> {
        use self::ObjectPropertyCode as OPC;
        supported_object_properties()
            .iter()
            .map(|&code| {
                let value = match code {
                    OPC::STORAGE_ID => MtpData::UINT32(info.storage_id),
                    OPC::OBJECT_FORMAT => MtpData::UINT16(info.object_format),
                    OPC::PROTECTION_STATUS => MtpData::UINT16(info.protection_status),
                    OPC::OBJECT_SIZE => MtpData::UINT64(info.object_compressed_size as u64),
                    OPC::ASSOCIATION_TYPE => MtpData::UINT16(info.association_type),
                    OPC::ASSOCIATION_DESC => MtpData::UINT32(info.association_desc),
                    OPC::OBJECT_FILE_NAME => MtpData::STR(info.filename.clone()),
                    OPC::DATE_CREATED => MtpData::STR(format_datetime(info.capture_date)),
                    OPC::DATE_MODIFIED => MtpData::STR(format_datetime(info.modification_date)),
                    OPC::KEYWORDS => MtpData::STR(info.keywords.clone()),
                    OPC::PARENT_OBJECT => MtpData::UINT32(info.parent_object),
                    OPC::PERSISTENT_UNIQUE_OBJECT_IDENTIFIER => {
                        MtpData::UINT128(handle.raw() as u128)
                    }
                    OPC::NAME => MtpData::STR(info.filename.clone()),
                    _ => MtpData::UNDEF,
                };
                ObjectProperty {
                    desc: ObjectPropDesc::standard(code).expect("supported code has a descriptor"),
                    value,
                }
            })
            .collect()
    }
}
