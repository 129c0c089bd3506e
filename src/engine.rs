use log::{trace, warn};
use num_traits::FromPrimitive;

use crate::command::CommandCode;
use crate::message::{container_from_payload, Command, Container, DataMessage, Response};
use crate::ops;
use crate::{Error, MtpDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitCommand,
    WaitDataStart,
    WaitMoreData,
    Handle,
    Respond,
}

#[derive(Debug, Default)]
struct Transaction {
    command: Option<Command>,
    ir_data: Option<DataMessage>,
    ri_data: Option<DataMessage>,
    response: Option<Response>,
}

/// The transaction engine: feeds transport payloads through the
/// Command → (Data) → Response state machine and dispatches assembled
/// transactions against the device model.
///
/// `handle_payload` is the single entry point; it never blocks and the
/// caller must not interleave invocations. On a framing error the engine is
/// left mid-transaction; callers normally log and [`reset`](Self::reset).
pub struct MtpResponder {
    device: MtpDevice,
    state: State,
    transaction: Transaction,
}

impl MtpResponder {
    pub fn new(device: MtpDevice) -> MtpResponder {
        MtpResponder {
            device,
            state: State::WaitCommand,
            transaction: Transaction::default(),
        }
    }

    pub fn device(&self) -> &MtpDevice {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut MtpDevice {
        &mut self.device
    }

    /// Abandons any in-flight transaction.
    pub fn reset(&mut self) {
        trace!("engine reset");
        self.state = State::WaitCommand;
        self.transaction = Transaction::default();
    }

    /// Consumes one transport payload and returns the framed containers to
    /// write back, in order ({optional Data, then Response} once a
    /// transaction completes, empty otherwise).
    pub fn handle_payload(&mut self, payload: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
        self.process_input(payload)?;
        if self.state == State::Handle {
            self.run_handler();
        }
        let mut out = Vec::new();
        if self.state == State::Respond {
            if let Some(data) = self.transaction.ri_data.take() {
                trace!("emitting data container, {} bytes", data.payload.len());
                out.push(data.pack());
            }
            if let Some(response) = self.transaction.response.take() {
                trace!("emitting response {:?} tid {}", response.code, response.tid);
                out.push(response.pack());
            }
            self.reset();
        }
        Ok(out)
    }

    fn process_input(&mut self, payload: &[u8]) -> Result<(), Error> {
        match self.state {
            State::WaitCommand => self.input_command(payload),
            State::WaitDataStart => self.input_data_start(payload),
            State::WaitMoreData => self.input_more_data(payload),
            State::Handle | State::Respond => {
                Err(Error::Malformed("input while mid-transaction".into()))
            }
        }
    }

    fn input_command(&mut self, payload: &[u8]) -> Result<(), Error> {
        let command = match container_from_payload(payload, false)? {
            Container::Command(command) => command,
            other => {
                return Err(Error::Malformed(format!(
                    "expected a command container, got {:?}",
                    other
                )));
            }
        };
        let code = CommandCode::from_u16(command.code).unwrap_or(CommandCode::Other(command.code));
        trace!("command {:x} tid {}", code, command.tid);
        self.transaction.response = Some(Response::to_command(&command));
        let next = match self.device.operation(command.code) {
            None => {
                if let Some(response) = self.transaction.response.as_mut() {
                    response.code = crate::StandardResponseCode::OperationNotSupported.into();
                }
                State::Respond
            }
            Some(op) if op.ir_data => State::WaitDataStart,
            Some(_) => State::Handle,
        };
        self.transaction.command = Some(command);
        self.state = next;
        Ok(())
    }

    fn input_data_start(&mut self, payload: &[u8]) -> Result<(), Error> {
        let data = match container_from_payload(payload, true)? {
            Container::Data(data) => data,
            other => {
                return Err(Error::Malformed(format!(
                    "expected a data container, got {:?}",
                    other
                )));
            }
        };
        if let Some(command) = &self.transaction.command {
            if data.tid != command.tid {
                warn!(
                    "data container tid {} does not match command tid {}",
                    data.tid, command.tid
                );
            }
        }
        let complete = data.has_all_data()?;
        trace!(
            "data start, {}/{} payload bytes",
            data.payload.len(),
            data.length as usize - crate::message::CONTAINER_HEADER_SIZE
        );
        self.transaction.ir_data = Some(data);
        self.state = if complete {
            State::Handle
        } else {
            State::WaitMoreData
        };
        Ok(())
    }

    fn input_more_data(&mut self, payload: &[u8]) -> Result<(), Error> {
        let data = self
            .transaction
            .ir_data
            .as_mut()
            .ok_or_else(|| Error::Malformed("no data container to continue".into()))?;
        data.extend(payload);
        trace!(
            "data continuation, {}/{} payload bytes",
            data.payload.len(),
            data.length as usize - crate::message::CONTAINER_HEADER_SIZE
        );
        if data.has_all_data()? {
            self.state = State::Handle;
        }
        Ok(())
    }

    fn run_handler(&mut self) {
        let tx = &mut self.transaction;
        let (command, response) = match (tx.command.as_ref(), tx.response.as_mut()) {
            (Some(command), Some(response)) => (command, response),
            _ => {
                warn!("handle state without an assembled transaction");
                self.state = State::Respond;
                return;
            }
        };
        let payload = ops::handle_transaction(&mut self.device, command, response, tx.ir_data.as_ref());
        tx.ri_data = payload.map(|p| DataMessage::new(command.code, command.tid, p));
        self.state = State::Respond;
    }
}
