//! End-to-end exchanges against the transaction engine, at the byte level.

mod common;

use common::*;
use mtpr::*;

fn hex_to_bytes(s: &str) -> Vec<u8> {
    hex::decode(s).expect("valid hex")
}

#[test]
fn open_session_exact_bytes() {
    let mut responder = build_responder();
    let command = hex_to_bytes("10000000010002100100000001000000");
    let outputs = responder.handle_payload(&command).unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0], hex_to_bytes("0c0000000300012001000000"));
    assert_eq!(responder.device().session_id(), Some(1));
}

#[test]
fn duplicate_open_session() {
    let mut responder = build_responder();
    open_session(&mut responder);
    let outs = run_cmd(&mut responder, StandardCommandCode::OpenSession, 2, &[2]);
    assert_eq!(
        response_of(&outs).code,
        StandardResponseCode::SessionAlreadyOpen
    );
    assert_eq!(responder.device().session_id(), Some(1));
}

#[test]
fn unknown_opcode_is_rejected_with_same_tid() {
    let mut responder = build_responder();
    let outputs = responder
        .handle_payload(&Command::new(0x0000, 7, vec![]).pack())
        .unwrap();
    assert_eq!(outputs.len(), 1);
    let response = response_of(&outputs);
    assert_eq!(response.code, StandardResponseCode::OperationNotSupported);
    assert_eq!(response.tid, 7);
}

#[test]
fn get_device_info_without_session() {
    let mut responder = build_responder();
    let outs = run_cmd(&mut responder, StandardCommandCode::GetDeviceInfo, 1, &[]);
    assert_eq!(outs.len(), 2);
    let data = data_of(&outs);
    let response = response_of(&outs);
    assert_eq!(response.code, StandardResponseCode::Ok);

    let info = DeviceInfo::decode(&data.payload).unwrap();
    assert_eq!(info.manufacturer, "Acme");
    assert!(info
        .operations_supported
        .contains(&(StandardCommandCode::OpenSession as u16)));
    assert!(info
        .operations_supported
        .contains(&(StandardCommandCode::GetObjectPropList as u16)));
    // reserved capture operations are not advertised
    assert!(!info
        .operations_supported
        .contains(&(StandardCommandCode::InitiateCapture as u16)));
    assert!(info
        .device_properties_supported
        .contains(&DevicePropertyCode::BATTERY_LEVEL));
}

#[test]
fn send_object_info_and_send_object() {
    let mut responder = build_responder();
    open_session(&mut responder);
    let storage_id = responder.device().storages()[0].id().raw();

    let mut info = ObjectInfo::with_filename("wallpaper_1.jpeg");
    info.object_compressed_size = 4;
    let outs = run_cmd(
        &mut responder,
        StandardCommandCode::SendObjectInfo,
        2,
        &[storage_id],
    );
    assert!(outs.is_empty(), "waiting for the object info dataset");
    let outs = run_data(
        &mut responder,
        StandardCommandCode::SendObjectInfo,
        2,
        &info.pack().unwrap(),
    );
    let response = response_of(&outs);
    assert_eq!(response.code, StandardResponseCode::Ok);
    assert_eq!(response.get_param(0), Some(storage_id));
    assert_eq!(response.get_param(1), Some(0xFFFFFFFF));
    let new_handle = response.get_param(2).expect("a new handle");

    let outs = run_cmd(&mut responder, StandardCommandCode::SendObject, 3, &[]);
    assert!(outs.is_empty(), "waiting for the object data");
    let outs = run_data(
        &mut responder,
        StandardCommandCode::SendObject,
        3,
        &hex_to_bytes("31323334"),
    );
    assert_eq!(response_of(&outs).code, StandardResponseCode::Ok);

    let outs = run_cmd(&mut responder, StandardCommandCode::GetObject, 4, &[new_handle]);
    assert_eq!(data_of(&outs).payload, hex_to_bytes("31323334"));

    let outs = run_cmd(
        &mut responder,
        StandardCommandCode::GetObjectInfo,
        5,
        &[new_handle],
    );
    let back = ObjectInfo::decode(&data_of(&outs).payload).unwrap();
    assert_eq!(back.object_compressed_size, 4);
    assert_eq!(back.filename, "wallpaper_1.jpeg");
}

#[test]
fn chunked_send_object() {
    let mut responder = build_responder();
    open_session(&mut responder);
    let storage_id = responder.device().storages()[0].id().raw();

    let mut info = ObjectInfo::with_filename("wallpaper_1.jpeg");
    info.object_compressed_size = 4;
    run_cmd(
        &mut responder,
        StandardCommandCode::SendObjectInfo,
        2,
        &[storage_id],
    );
    let outs = run_data(
        &mut responder,
        StandardCommandCode::SendObjectInfo,
        2,
        &info.pack().unwrap(),
    );
    let new_handle = response_of(&outs).get_param(2).unwrap();

    let outs = run_cmd(&mut responder, StandardCommandCode::SendObject, 3, &[]);
    assert_eq!(outs.len(), 0);

    let full = DataMessage::new(StandardCommandCode::SendObject as u16, 3, vec![0x31, 0x32, 0x33, 0x34]).pack();
    // header + 2 payload bytes, then 1 + 1
    let outs = responder.handle_payload(&full[..14]).unwrap();
    assert_eq!(outs.len(), 0);
    let outs = responder.handle_payload(&full[14..15]).unwrap();
    assert_eq!(outs.len(), 0);
    let outs = responder.handle_payload(&full[15..]).unwrap();
    assert_eq!(outs.len(), 1);
    assert_eq!(response_of(&outs).code, StandardResponseCode::Ok);

    let outs = run_cmd(&mut responder, StandardCommandCode::GetObject, 4, &[new_handle]);
    assert_eq!(data_of(&outs).payload, vec![0x31, 0x32, 0x33, 0x34]);
}

#[test]
fn responses_echo_the_transaction_id() {
    let mut responder = build_responder();
    open_session(&mut responder);
    let outs = run_cmd(&mut responder, StandardCommandCode::GetStorageIDs, 99, &[]);
    assert_eq!(data_of(&outs).tid, 99);
    assert_eq!(response_of(&outs).tid, 99);
}
