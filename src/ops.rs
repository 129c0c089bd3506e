use log::debug;

use crate::command::StandardCommandCode;
use crate::device::MtpDevice;
use crate::message::{Command, DataMessage, Response};
use crate::object::{MtpObject, ObjectHandle, ObjectInfo};
use crate::properties::{supported_object_properties, ObjectPropDesc};
use crate::storage::StorageId;
use crate::{MtpWrite, StandardResponseCode};

/// A handler produces an optional responder-to-initiator data payload, or a
/// response code for the error arm.
type HandlerResult = Result<Option<Vec<u8>>, StandardResponseCode>;
type Handler = fn(&mut MtpDevice, &Command, &mut Response, Option<&DataMessage>) -> HandlerResult;

pub(crate) struct Operation {
    pub code: StandardCommandCode,
    pub name: &'static str,
    pub handler: Handler,
    pub min_params: usize,
    pub session_required: bool,
    pub ir_data: bool,
}

/// The operation table, built once at device construction. Registering the
/// same opcode twice is a configuration error.
pub(crate) struct OperationRegistry {
    ops: Vec<Operation>,
}

impl OperationRegistry {
    pub fn standard() -> OperationRegistry {
        use self::StandardCommandCode as Op;

        let mut reg = OperationRegistry { ops: Vec::new() };
        let mut add = |code: Op,
                       handler: Handler,
                       min_params: usize,
                       session_required: bool,
                       ir_data: bool| {
            reg.register(Operation {
                code,
                name: code.name(),
                handler,
                min_params,
                session_required,
                ir_data,
            });
        };

        add(Op::GetDeviceInfo, get_device_info, 0, false, false);
        add(Op::OpenSession, open_session, 1, false, false);
        add(Op::CloseSession, close_session, 0, true, false);
        add(Op::GetStorageIDs, get_storage_ids, 0, true, false);
        add(Op::GetStorageInfo, get_storage_info, 1, true, false);
        add(Op::GetNumObjects, get_num_objects, 1, true, false);
        add(Op::GetObjectHandles, get_object_handles, 1, true, false);
        add(Op::GetObjectInfo, get_object_info, 1, true, false);
        add(Op::GetObject, get_object, 1, true, false);
        add(Op::GetThumb, get_thumb, 1, true, false);
        add(Op::DeleteObject, delete_object, 1, true, false);
        add(Op::SendObjectInfo, send_object_info, 1, true, true);
        add(Op::SendObject, send_object, 0, true, true);
        add(Op::FormatStore, format_store, 1, true, false);
        add(Op::ResetDevice, reset_device, 0, true, false);
        add(Op::SelfTest, self_test, 0, true, false);
        add(Op::SetObjectProtection, set_object_protection, 2, true, false);
        add(Op::PowerDown, power_down, 0, true, false);
        add(Op::GetDevicePropDesc, get_device_prop_desc, 1, true, false);
        add(Op::GetDevicePropValue, get_device_prop_value, 1, true, false);
        add(Op::SetDevicePropValue, set_device_prop_value, 1, true, true);
        add(Op::ResetDevicePropValue, reset_device_prop_value, 1, true, false);
        add(Op::MoveObject, move_object, 2, true, false);
        add(Op::CopyObject, copy_object, 2, true, false);
        add(Op::GetPartialObject, get_partial_object, 3, true, false);
        add(Op::GetObjectPropsSupported, get_object_props_supported, 1, true, false);
        add(Op::GetObjectPropDesc, get_object_prop_desc, 2, true, false);
        add(Op::GetObjectPropValue, get_object_prop_value, 2, true, false);
        add(Op::SetObjectPropValue, set_object_prop_value, 2, true, true);
        add(Op::GetObjectPropList, get_object_prop_list, 1, true, false);
        add(Op::GetObjectReferences, get_object_references, 1, true, false);
        reg
    }

    fn register(&mut self, op: Operation) {
        if self.ops.iter().any(|o| o.code == op.code) {
            panic!("operation {:#06x} already registered", op.code as u16);
        }
        self.ops.push(op);
    }

    pub fn get(&self, code: StandardCommandCode) -> Option<&Operation> {
        self.ops.iter().find(|o| o.code == code)
    }

    pub fn codes(&self) -> Vec<u16> {
        self.ops.iter().map(|o| o.code as u16).collect()
    }
}

/// Dispatches a fully assembled transaction: discards a stale pending
/// object, runs the uniform gate, then the handler. Protocol failures land
/// in the response code.
pub(crate) fn handle_transaction(
    device: &mut MtpDevice,
    command: &Command,
    response: &mut Response,
    ir_data: Option<&DataMessage>,
) -> Option<Vec<u8>> {
    if device.pending_object.is_some()
        && command.code != StandardCommandCode::SendObject as u16
    {
        debug!("pending object not followed by SendObject, discarding");
        device.discard_pending();
    }

    let (name, handler, min_params, session_required, ir_required) =
        match device.operation(command.code) {
            Some(op) => (op.name, op.handler, op.min_params, op.session_required, op.ir_data),
            None => {
                response.code = StandardResponseCode::OperationNotSupported.into();
                return None;
            }
        };
    debug!("dispatching {} tid {}", name, command.tid);

    let gated = if command.num_params() < min_params {
        Err(StandardResponseCode::ParameterNotSupported)
    } else if session_required && device.session_id.is_none() {
        Err(StandardResponseCode::SessionNotOpen)
    } else if ir_required && ir_data.is_none() {
        Err(StandardResponseCode::InvalidDataset)
    } else {
        handler(device, command, response, ir_data)
    };

    match gated {
        Ok(payload) => payload,
        Err(code) => {
            debug!("{} tid {} failed with {:?}", name, command.tid, code);
            response.code = code.into();
            None
        }
    }
}

fn storage_param(command: &Command, idx: usize) -> StorageId {
    StorageId(command.get_param(idx).unwrap_or(0))
}

fn handle_param(command: &Command, idx: usize) -> ObjectHandle {
    ObjectHandle(command.get_param(idx).unwrap_or(0))
}

fn parent_param(command: &Command, idx: usize) -> Option<ObjectHandle> {
    match command.get_param(idx).unwrap_or(0) {
        0 | 0xFFFFFFFF => None,
        p => Some(ObjectHandle(p)),
    }
}

fn get_device_info(
    device: &mut MtpDevice,
    _command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let payload = device
        .device_info_payload()
        .map_err(|_| StandardResponseCode::GeneralError)?;
    Ok(Some(payload))
}

fn open_session(
    device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    if device.session_id.is_some() {
        return Err(StandardResponseCode::SessionAlreadyOpen);
    }
    device.session_id = command.get_param(0);
    Ok(None)
}

fn close_session(
    device: &mut MtpDevice,
    _command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    device.session_id = None;
    Ok(None)
}

fn get_storage_ids(
    device: &mut MtpDevice,
    _command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let ids: Vec<u32> = device.storages().iter().map(|s| s.id().raw()).collect();
    let mut payload = vec![];
    payload
        .write_mtp_u32_vec(&ids)
        .map_err(|_| StandardResponseCode::GeneralError)?;
    Ok(Some(payload))
}

fn get_storage_info(
    device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let storage = device.storage(storage_param(command, 0))?;
    let payload = storage
        .info
        .pack()
        .map_err(|_| StandardResponseCode::GeneralError)?;
    Ok(Some(payload))
}

fn get_num_objects(
    device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let fmt = command.get_param(1).unwrap_or(0);
    let handles = device.handles_for_storage(storage_param(command, 0), fmt)?;
    let mut payload = vec![];
    payload
        .write_mtp_u32(handles.len() as u32)
        .map_err(|_| StandardResponseCode::GeneralError)?;
    Ok(Some(payload))
}

fn get_object_handles(
    device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let fmt = command.get_param(1).unwrap_or(0);
    let handles = device.handles_for_storage(storage_param(command, 0), fmt)?;
    let raw: Vec<u32> = handles.iter().map(|h| h.raw()).collect();
    let mut payload = vec![];
    payload
        .write_mtp_u32_vec(&raw)
        .map_err(|_| StandardResponseCode::GeneralError)?;
    Ok(Some(payload))
}

fn get_object_info(
    device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let obj = device.object(handle_param(command, 0))?;
    let payload = obj
        .info
        .pack()
        .map_err(|_| StandardResponseCode::GeneralError)?;
    Ok(Some(payload))
}

fn get_object(
    device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let obj = device.object(handle_param(command, 0))?;
    Ok(Some(obj.data().to_vec()))
}

fn get_thumb(
    device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    device.object(handle_param(command, 0))?;
    Err(StandardResponseCode::NoThumbnailPresent)
}

fn delete_object(
    device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let handle = handle_param(command, 0);
    let fmt = command.get_param(1).unwrap_or(0);
    if handle == ObjectHandle::all() {
        device.delete_all_objects(fmt)?;
    } else {
        // a direct handle deletes the whole subtree, so the filter is wild
        device.delete_object(handle, 0xFFFFFFFF)?;
    }
    Ok(None)
}

fn send_object_info(
    device: &mut MtpDevice,
    command: &Command,
    response: &mut Response,
    ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let storage_id = storage_param(command, 0);
    if storage_id.raw() == 0 {
        return Err(StandardResponseCode::InvalidStorageId);
    }
    let parent = parent_param(command, 1);
    {
        let storage = device.storage(storage_id)?;
        if !storage.can_write() {
            return Err(StandardResponseCode::StoreReadOnly);
        }
    }
    let data = ir_data.ok_or(StandardResponseCode::InvalidDataset)?;
    let info =
        ObjectInfo::decode(&data.payload).map_err(|_| StandardResponseCode::InvalidDataset)?;
    let obj = MtpObject::new(None, info);
    let handle = device.add_object(storage_id, parent, obj)?;
    response.add_param(storage_id.raw());
    response.add_param(parent.map_or(0xFFFFFFFF, |p| p.raw()));
    response.add_param(handle.raw());
    // the next operation must be SendObject, otherwise the object is dropped
    device.pending_object = Some(handle);
    Ok(None)
}

fn send_object(
    device: &mut MtpDevice,
    _command: &Command,
    _response: &mut Response,
    ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let handle = device
        .pending_object
        .ok_or(StandardResponseCode::NoValidObjectInfo)?;
    let data = ir_data.ok_or(StandardResponseCode::InvalidDataset)?;
    let obj = device.object_mut(handle)?;
    obj.set_data(data.payload.clone(), true)?;
    device.pending_object = None;
    Ok(None)
}

fn format_store(
    device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    // no actual formatting is performed
    device.storage(storage_param(command, 0))?;
    Err(StandardResponseCode::ParameterNotSupported)
}

fn reset_device(
    device: &mut MtpDevice,
    _command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    device.session_id = None;
    Ok(None)
}

fn self_test(
    _device: &mut MtpDevice,
    _command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    Ok(None)
}

fn set_object_protection(
    device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let status = command.get_param(1).unwrap_or(0);
    let obj = device.object_mut(handle_param(command, 0))?;
    obj.set_protection_status(status)?;
    Ok(None)
}

fn power_down(
    device: &mut MtpDevice,
    _command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    device.session_id = None;
    Ok(None)
}

fn get_device_prop_desc(
    device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let prop = device.property(command.get_param(0).unwrap_or(0))?;
    let payload = prop.desc().map_err(|_| StandardResponseCode::GeneralError)?;
    Ok(Some(payload))
}

fn get_device_prop_value(
    device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let prop = device.property(command.get_param(0).unwrap_or(0))?;
    let payload = prop
        .value_bytes()
        .map_err(|_| StandardResponseCode::GeneralError)?;
    Ok(Some(payload))
}

fn set_device_prop_value(
    device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let data = ir_data.ok_or(StandardResponseCode::InvalidDataset)?;
    let prop = device.property_mut(command.get_param(0).unwrap_or(0))?;
    prop.set_value(&data.payload)?;
    Ok(None)
}

fn reset_device_prop_value(
    device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let code = command.get_param(0).unwrap_or(0);
    if code == 0xFFFFFFFF {
        // wildcard reset skips read-only properties
        for prop in &mut device.properties {
            if prop.can_set() {
                prop.reset_value()?;
            }
        }
    } else {
        device.property_mut(code)?.reset_value()?;
    }
    Ok(None)
}

fn move_object(
    device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    device.move_object(
        handle_param(command, 0),
        storage_param(command, 1),
        parent_param(command, 2),
    )?;
    Ok(None)
}

fn copy_object(
    device: &mut MtpDevice,
    command: &Command,
    response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let new_handle = device.copy_object(
        handle_param(command, 0),
        storage_param(command, 1),
        parent_param(command, 2),
    )?;
    response.add_param(new_handle.raw());
    Ok(None)
}

fn get_partial_object(
    device: &mut MtpDevice,
    command: &Command,
    response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let offset = command.get_param(1).unwrap_or(0) as usize;
    let max = command.get_param(2).unwrap_or(0) as usize;
    let obj = device.object(handle_param(command, 0))?;
    let data = obj.data();
    if offset > data.len() {
        return Err(StandardResponseCode::InvalidParameter);
    }
    let end = offset.saturating_add(max).min(data.len());
    let slice = data[offset..end].to_vec();
    response.add_param(slice.len() as u32);
    Ok(Some(slice))
}

fn get_object_props_supported(
    _device: &mut MtpDevice,
    _command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let mut payload = vec![];
    payload
        .write_mtp_u16_vec(supported_object_properties())
        .map_err(|_| StandardResponseCode::GeneralError)?;
    Ok(Some(payload))
}

fn prop_code_param(command: &Command, idx: usize) -> Result<u16, StandardResponseCode> {
    let code = command.get_param(idx).unwrap_or(0);
    if code > 0xFFFF {
        return Err(StandardResponseCode::ObjectPropNotSupported);
    }
    Ok(code as u16)
}

fn get_object_prop_desc(
    _device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let code = prop_code_param(command, 0)?;
    let desc =
        ObjectPropDesc::standard(code).ok_or(StandardResponseCode::ObjectPropNotSupported)?;
    let payload = desc.pack().map_err(|_| StandardResponseCode::GeneralError)?;
    Ok(Some(payload))
}

fn get_object_prop_value(
    device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let code = prop_code_param(command, 1)?;
    let obj = device.object(handle_param(command, 0))?;
    let prop = obj
        .property(code)
        .ok_or(StandardResponseCode::ObjectPropNotSupported)?;
    let payload = prop
        .value_bytes()
        .map_err(|_| StandardResponseCode::GeneralError)?;
    Ok(Some(payload))
}

fn set_object_prop_value(
    device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let code = prop_code_param(command, 1)?;
    let data = ir_data.ok_or(StandardResponseCode::InvalidDataset)?;
    let obj = device.object_mut(handle_param(command, 0))?;
    obj.set_property_value(code, &data.payload)?;
    Ok(None)
}

fn get_object_prop_list(
    device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let handle = handle_param(command, 0);
    let obj = device.object(handle)?;
    let props = obj.properties();
    let mut payload = vec![];
    let write = |payload: &mut Vec<u8>| -> Result<(), crate::Error> {
        payload.write_mtp_u32(props.len() as u32)?;
        for prop in props {
            payload.write_mtp_u32(handle.raw())?;
            payload.write_mtp_u16(prop.code())?;
            payload.write_mtp_u16(prop.dtype())?;
            prop.value().encode(payload)?;
        }
        Ok(())
    };
    write(&mut payload).map_err(|_| StandardResponseCode::GeneralError)?;
    Ok(Some(payload))
}

fn get_object_references(
    device: &mut MtpDevice,
    command: &Command,
    _response: &mut Response,
    _ir_data: Option<&DataMessage>,
) -> HandlerResult {
    let obj = device.object(handle_param(command, 0))?;
    let refs: Vec<u32> = obj.children().iter().map(|c| c.handle().raw()).collect();
    let mut payload = vec![];
    payload
        .write_mtp_u32_vec(&refs)
        .map_err(|_| StandardResponseCode::GeneralError)?;
    Ok(Some(payload))
}
