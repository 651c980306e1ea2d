//! Purpose: Carry the `methods` channel over newline-delimited JSON streams.
//! Exports: `RequestId`, `Request`, `Rejected`, `parse_request`, `reply_json`, `error_json`.
//! Exports: `serve`, `ServeSummary`.
//! Role: Transport adapter between a byte stream (stdio) and the bridge dispatcher.
//! Invariants: Output only carries response objects, one JSON value per line.
//! Invariants: Every request line gets exactly one response line, malformed ones included.
//! Invariants: Dispatch and response writing both happen on the home thread.
//! Invariants: Input EOF ends the loop only after every in-flight call has answered.

use std::io::{BufRead, BufWriter, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json, json};
use tracing::{debug, error, info};

use crate::bridge::{Bridge, CHANNEL_NAME};
use crate::core::dispatch::Dispatcher;
use crate::core::error::{Error, ErrorKind};
use crate::core::home::{HomeHandle, HomeLoop};
use crate::core::outcome::{Call, FAULT_CODE, Reply};
use crate::core::value::Value;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
    Null,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub call: Call,
}

/// A request that could not be turned into a call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejected {
    pub id: RequestId,
    pub message: String,
}

impl Rejected {
    fn new(id: RequestId, message: impl Into<String>) -> Self {
        Self {
            id,
            message: message.into(),
        }
    }
}

pub fn parse_request(line: &str) -> Result<Request, Rejected> {
    let value = serde_json::from_str::<Json>(line)
        .map_err(|_| Rejected::new(RequestId::Null, "invalid JSON"))?;
    let mut object = match value {
        Json::Object(object) => object,
        _ => return Err(Rejected::new(RequestId::Null, "request must be a JSON object")),
    };

    let id = match object.remove("id") {
        Some(raw) => parse_id(raw)?,
        None => RequestId::Null,
    };

    if let Some(channel) = object.remove("channel") {
        if channel.as_str() != Some(CHANNEL_NAME) {
            return Err(Rejected::new(id, format!("unknown channel: {channel}")));
        }
    }

    let name = match object.remove("method") {
        Some(Json::String(name)) => name,
        _ => return Err(Rejected::new(id, "missing method field")),
    };

    let argument = match object.remove("arguments") {
        Some(raw) => Value::from_json(&raw).map_err(|err| {
            Rejected::new(
                id.clone(),
                err.message().unwrap_or("invalid arguments").to_string(),
            )
        })?,
        None => Value::Absent,
    };

    Ok(Request {
        id,
        call: Call { name, argument },
    })
}

fn parse_id(raw: Json) -> Result<RequestId, Rejected> {
    match raw {
        Json::String(value) => Ok(RequestId::String(value)),
        Json::Number(value) => value.as_i64().map(RequestId::Number).ok_or_else(|| {
            Rejected::new(RequestId::Null, "id must be an integer number")
        }),
        Json::Null => Ok(RequestId::Null),
        _ => Err(Rejected::new(
            RequestId::Null,
            "id must be a string, integer number, or null",
        )),
    }
}

pub fn reply_json(id: &RequestId, reply: &Reply) -> Json {
    let mut object = Map::new();
    object.insert("id".to_string(), id_json(id));
    match reply {
        Reply::Success(value) => {
            object.insert("result".to_string(), value.to_json());
        }
        Reply::NotImplemented => {
            object.insert("notImplemented".to_string(), Json::Bool(true));
        }
        Reply::Error { code, message } => {
            object.insert(
                "error".to_string(),
                json!({ "code": code, "message": message, "details": Json::Null }),
            );
        }
    }
    Json::Object(object)
}

pub fn error_json(rejected: &Rejected) -> Json {
    reply_json(
        &rejected.id,
        &Reply::Error {
            code: FAULT_CODE.to_string(),
            message: rejected.message.clone(),
        },
    )
}

fn id_json(id: &RequestId) -> Json {
    serde_json::to_value(id).unwrap_or(Json::Null)
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ServeSummary {
    pub requests: usize,
    pub rejected: usize,
}

type SharedWriter<W> = Arc<Mutex<BufWriter<W>>>;

/// Per-stream state. Counters are only mutated from home-thread tasks.
struct Session<W: Write> {
    dispatcher: Dispatcher,
    home: HomeHandle,
    writer: SharedWriter<W>,
    in_flight: AtomicUsize,
    input_done: AtomicBool,
    requests: AtomicUsize,
    rejected: AtomicUsize,
    write_error: Mutex<Option<Error>>,
}

impl<W: Write + Send + 'static> Session<W> {
    fn handle_line(self: &Arc<Self>, line: String) {
        let message = line.trim_end_matches(['\n', '\r']);
        if message.trim().is_empty() {
            return;
        }
        self.requests.fetch_add(1, Ordering::Relaxed);
        match parse_request(message) {
            Ok(Request { id, call }) => {
                debug!(method = %call.name, "request");
                self.in_flight.fetch_add(1, Ordering::Relaxed);
                let session = Arc::clone(self);
                self.dispatcher.dispatch(
                    call,
                    Box::new(move |reply| {
                        session.write(&reply_json(&id, &reply));
                        session.in_flight.fetch_sub(1, Ordering::Relaxed);
                        session.maybe_stop();
                    }),
                );
            }
            Err(rejected) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(reason = %rejected.message, "rejected request");
                self.write(&error_json(&rejected));
            }
        }
    }

    fn finish_input(&self) {
        self.input_done.store(true, Ordering::Relaxed);
        self.maybe_stop();
    }

    fn maybe_stop(&self) {
        if self.input_done.load(Ordering::Relaxed) && self.in_flight.load(Ordering::Relaxed) == 0 {
            self.home.request_stop();
        }
    }

    fn write(&self, payload: &Json) {
        if let Err(err) = write_json_line(&self.writer, payload) {
            error!(error = %err, "failed to write response");
            let mut slot = self
                .write_error
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slot.get_or_insert(err);
        }
    }
}

fn write_json_line<W: Write>(writer: &SharedWriter<W>, payload: &Json) -> Result<(), Error> {
    let mut writer = writer
        .lock()
        .map_err(|_| Error::new(ErrorKind::Internal).with_message("output lock poisoned"))?;
    serde_json::to_writer(&mut *writer, payload).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode response")
            .with_source(err)
    })?;
    writer.write_all(b"\n").map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write response")
            .with_source(err)
    })?;
    writer.flush().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to flush response")
            .with_source(err)
    })
}

/// Serves requests from `input` until EOF, writing one response line per request.
///
/// Must be called on the thread that owns `home`. Input is read on a helper
/// thread; each line is handed to the home thread for dispatch.
pub fn serve<R, W>(
    bridge: &Bridge,
    home: &HomeLoop,
    input: R,
    output: W,
) -> Result<ServeSummary, Error>
where
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    let handle = home.handle();
    let session = Arc::new(Session {
        dispatcher: bridge.dispatcher().clone(),
        home: handle.clone(),
        writer: Arc::new(Mutex::new(BufWriter::new(output))),
        in_flight: AtomicUsize::new(0),
        input_done: AtomicBool::new(false),
        requests: AtomicUsize::new(0),
        rejected: AtomicUsize::new(0),
        write_error: Mutex::new(None),
    });

    let reader_session = Arc::clone(&session);
    let reader = thread::Builder::new()
        .name("hostbridge-reader".to_string())
        .spawn(move || read_lines(input, &reader_session))
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to spawn reader thread")
                .with_source(err)
        })?;

    info!(channel = CHANNEL_NAME, "serving");
    home.run();

    let read_result = reader.join().map_err(|_| {
        Error::new(ErrorKind::Internal).with_message("reader thread panicked")
    })?;
    read_result?;

    if let Some(err) = session
        .write_error
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take()
    {
        return Err(err);
    }

    let summary = ServeSummary {
        requests: session.requests.load(Ordering::Relaxed),
        rejected: session.rejected.load(Ordering::Relaxed),
    };
    info!(requests = summary.requests, rejected = summary.rejected, "input closed");
    Ok(summary)
}

fn read_lines<R, W>(mut input: R, session: &Arc<Session<W>>) -> Result<(), Error>
where
    R: BufRead,
    W: Write + Send + 'static,
{
    let mut result = Ok(());
    loop {
        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let task_session = Arc::clone(session);
                if let Err(err) = session.home.post(move || task_session.handle_line(line)) {
                    result = Err(err);
                    break;
                }
            }
            Err(err) => {
                result = Err(Error::new(ErrorKind::Io)
                    .with_message("failed to read request")
                    .with_source(err));
                break;
            }
        }
    }

    let done_session = Arc::clone(session);
    if session.home.post(move || done_session.finish_input()).is_err() {
        // Home loop is gone; make sure `run` does not wait forever.
        session.home.request_stop();
    }
    result
}
