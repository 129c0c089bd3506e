#![allow(dead_code)]

use num_traits::ToPrimitive;

use mtpr::*;

pub fn device_info() -> DeviceInfo {
    DeviceInfo {
        std_version: 100,
        mtp_vendor_ext_id: 0x00000006,
        mtp_version: 100,
        mtp_extensions: "microsoft.com: 1.0;".into(),
        functional_mode: 0,
        operations_supported: vec![],
        events_supported: vec![],
        device_properties_supported: vec![],
        capture_formats: vec![],
        playback_formats: vec![
            ObjectFormatCode::ExifJpeg.to_u16().unwrap(),
            ObjectFormatCode::Mp3.to_u16().unwrap(),
        ],
        manufacturer: "Acme".into(),
        model: "Brick 3000".into(),
        device_version: "1.2.3".into(),
        serial_number: "0123456789abcdef".into(),
    }
}

pub fn storage_info(access: AccessType, desc: &str) -> StorageInfo {
    StorageInfo {
        storage_type: StorageType::FixedRam,
        filesystem_type: FilesystemType::Hierarchical,
        access_capability: access,
        max_capacity: 150000,
        free_space_in_bytes: 120000,
        free_space_in_images: 0,
        storage_description: desc.into(),
        volume_label: "vol-1".into(),
    }
}

pub fn file_object(name: &str, format: ObjectFormatCode, data: &[u8]) -> MtpObject {
    let mut info = ObjectInfo::with_filename(name);
    info.object_format = format.to_u16().unwrap();
    let mut obj = MtpObject::new(None, info);
    obj.set_data(data.to_vec(), false).unwrap();
    obj
}

pub fn folder_object(name: &str) -> MtpObject {
    let mut info = ObjectInfo::with_filename(name);
    info.object_format = ObjectFormatCode::Association.to_u16().unwrap();
    info.association_type = AssociationType::GenericFolder.to_u16().unwrap();
    MtpObject::new(None, info)
}

/// A responder over two storages: a writable one holding
/// media/{wallpaper_1.jpeg, notes.txt}, and a read-only one holding
/// firmware.bin. Battery level is a read-only device property, the friendly
/// name a writable one.
pub fn build_responder() -> MtpResponder {
    let mut device = MtpDevice::new(device_info());

    let mut media = folder_object("media");
    media.add_object(file_object(
        "wallpaper_1.jpeg",
        ObjectFormatCode::ExifJpeg,
        &[1, 2, 3, 4],
    ));
    media.add_object(file_object("notes.txt", ObjectFormatCode::Text, b"hello"));
    let mut rw = MtpStorage::new(storage_info(AccessType::ReadWrite, "Internal storage"));
    rw.add_object(media);
    device.add_storage(rw);

    let mut ro = MtpStorage::new(storage_info(AccessType::ReadOnlyNoDelete, "Firmware"));
    ro.add_object(file_object(
        "firmware.bin",
        ObjectFormatCode::UndefinedNonImage,
        &[0xDE, 0xAD],
    ));
    device.add_storage(ro);

    device.add_property(DeviceProperty::with_form(
        DevicePropertyCode::BATTERY_LEVEL,
        Perm::Get,
        MtpData::UINT8(80),
        MtpData::UINT8(100),
        Form::Range {
            min: MtpData::UINT8(0),
            max: MtpData::UINT8(100),
            step: MtpData::UINT8(1),
        },
    ));
    device.add_property(DeviceProperty::new(
        DevicePropertyCode::DEVICE_FRIENDLY_NAME,
        Perm::GetSet,
        MtpData::from("Brick"),
        MtpData::from("Brick"),
    ));

    MtpResponder::new(device)
}

pub fn run(responder: &mut MtpResponder, payload: Vec<u8>) -> Vec<Vec<u8>> {
    responder.handle_payload(&payload).expect("engine accepts payload")
}

pub fn run_cmd(
    responder: &mut MtpResponder,
    code: StandardCommandCode,
    tid: u32,
    params: &[u32],
) -> Vec<Vec<u8>> {
    run(
        responder,
        Command::new(code as u16, tid, params.to_vec()).pack(),
    )
}

pub fn run_data(
    responder: &mut MtpResponder,
    code: StandardCommandCode,
    tid: u32,
    payload: &[u8],
) -> Vec<Vec<u8>> {
    run(
        responder,
        DataMessage::new(code as u16, tid, payload.to_vec()).pack(),
    )
}

/// The last container of a completed exchange, parsed as the Response.
pub fn response_of(outputs: &[Vec<u8>]) -> Response {
    let buf = outputs.last().expect("an output container");
    match container_from_payload(buf, false).expect("parsable output") {
        Container::Response(response) => response,
        other => panic!("expected a response container, got {:?}", other),
    }
}

/// The Data container of a two-container exchange.
pub fn data_of(outputs: &[Vec<u8>]) -> DataMessage {
    assert_eq!(outputs.len(), 2, "expected data and response containers");
    match container_from_payload(&outputs[0], false).expect("parsable output") {
        Container::Data(data) => data,
        other => panic!("expected a data container, got {:?}", other),
    }
}

pub fn open_session(responder: &mut MtpResponder) {
    let outs = run_cmd(responder, StandardCommandCode::OpenSession, 1, &[1]);
    assert_eq!(response_of(&outs).code, StandardResponseCode::Ok);
}

pub fn handle_of(responder: &MtpResponder, name: &str) -> ObjectHandle {
    let device = responder.device();
    for handle in device
        .handles_for_storage(StorageId::all(), 0)
        .expect("wildcard listing")
    {
        if device.object(handle).expect("listed handle").info.filename == name {
            return handle;
        }
    }
    panic!("no object named {:?}", name);
}

pub fn num_objects(responder: &mut MtpResponder, tid: u32, storage: u32) -> u32 {
    let outs = run_cmd(responder, StandardCommandCode::GetNumObjects, tid, &[storage]);
    let data = data_of(&outs);
    u32::from_le_bytes([
        data.payload[0],
        data.payload[1],
        data.payload[2],
        data.payload[3],
    ])
}
