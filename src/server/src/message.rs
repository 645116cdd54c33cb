use byteordered::byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use cluster::UpdateRecord;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Result};
use storage::{Camera, ObjectKind, Sighting, VectorClock};
use tokio::io::{AsyncRead, AsyncWrite, AsyncReadExt as TokioAsyncReadExt, AsyncWriteExt as TokioAsyncWriteExt};

use crate::error::RpcError;
use crate::opcodes::*;

/// Wire protocol format:
/// 1. code (u16)
/// 2. status (u8)
/// 3. body_length (u32)
/// 4. body (JSON) - `body_length` bytes

const HEADER_SIZE: usize = 2 + 1 + 4; // code + status + body_len
const MAX_MESSAGE_SIZE: u64 = 64 * 1024 * 1024; // 64 MB

/// Outcome code carried in every frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    InvalidArgument,
    NotFound,
    Unavailable,
    DeadlineExceeded,
    Internal,
}

impl Status {
    pub fn as_u8(self) -> u8 {
        match self {
            Status::Ok => 0,
            Status::InvalidArgument => 1,
            Status::NotFound => 2,
            Status::Unavailable => 3,
            Status::DeadlineExceeded => 4,
            Status::Internal => 5,
        }
    }

    pub fn from_u8(code: u8) -> Status {
        match code {
            0 => Status::Ok,
            1 => Status::InvalidArgument,
            2 => Status::NotFound,
            3 => Status::Unavailable,
            4 => Status::DeadlineExceeded,
            _ => Status::Internal,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Status::Ok => "OK",
            Status::InvalidArgument => "INVALID_ARGUMENT",
            Status::NotFound => "NOT_FOUND",
            Status::Unavailable => "UNAVAILABLE",
            Status::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Status::Internal => "INTERNAL",
        };
        f.write_str(name)
    }
}

/// One observation in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub kind: ObjectKind,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    Ping { message: String },
    Reset,
    Seed { camera: Camera, kind: ObjectKind, id: String, timestamp: u64 },
    RegisterCamera { camera: Camera, clock: VectorClock },
    CameraInfo { name: String, clock: VectorClock },
    Report {
        camera_name: String,
        entries: Vec<ReportEntry>,
        clock: VectorClock,
        session_id: u64,
        client_seq: u64,
    },
    TrackExact { kind: ObjectKind, id: String, clock: VectorClock },
    TraceAll { kind: ObjectKind, id: String, clock: VectorClock },
    TrackPattern { kind: ObjectKind, pattern: String, clock: VectorClock },
    GossipPull { clock: VectorClock },
}

impl Request {
    pub fn opcode(&self) -> u16 {
        match self {
            Request::Ping { .. } => OP_PING,
            Request::Reset => OP_RESET,
            Request::Seed { .. } => OP_SEED,
            Request::RegisterCamera { .. } => OP_REGISTER_CAMERA,
            Request::CameraInfo { .. } => OP_CAMERA_INFO,
            Request::Report { .. } => OP_REPORT,
            Request::TrackExact { .. } => OP_TRACK_EXACT,
            Request::TraceAll { .. } => OP_TRACE_ALL,
            Request::TrackPattern { .. } => OP_TRACK_PATTERN,
            Request::GossipPull { .. } => OP_GOSSIP_PULL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Pong { message: String },
    Ack { clock: VectorClock },
    Registered { session_id: u64, clock: VectorClock },
    CameraInfo { camera: Camera, clock: VectorClock },
    Track { sighting: Option<Sighting>, clock: VectorClock },
    Trace { sightings: Vec<Sighting>, clock: VectorClock },
    Updates { updates: Vec<UpdateRecord> },
    Error { message: String },
}

impl Response {
    /// The replica clock carried by this response, if any.
    pub fn clock(&self) -> Option<&VectorClock> {
        match self {
            Response::Ack { clock }
            | Response::Registered { clock, .. }
            | Response::CameraInfo { clock, .. }
            | Response::Track { clock, .. }
            | Response::Trace { clock, .. } => Some(clock),
            Response::Pong { .. } | Response::Updates { .. } | Response::Error { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub code: u16,
    pub status: Status,
    pub body: Vec<u8>,
}

fn invalid_data(err: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string())
}

impl Frame {
    pub fn encode<T: Serialize>(code: u16, status: Status, body: &T) -> Result<Frame> {
        let body = serde_json::to_vec(body).map_err(invalid_data)?;
        Ok(Frame { code, status, body })
    }

    pub fn request(request: &Request) -> Result<Frame> {
        Frame::encode(request.opcode(), Status::Ok, request)
    }

    pub fn response(code: u16, response: &Response) -> Result<Frame> {
        Frame::encode(code, Status::Ok, response)
    }

    pub fn error(err: &RpcError) -> Result<Frame> {
        Frame::encode(OP_ERROR, err.status, &Response::Error { message: err.message.clone() })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(invalid_data)
    }

    /// Decode a response frame, turning error frames into `RpcError`.
    pub fn into_response(self) -> Result<std::result::Result<Response, RpcError>> {
        match self.decode::<Response>()? {
            Response::Error { message } => Ok(Err(RpcError::new(self.status, message))),
            _ if self.status != Status::Ok => Ok(Err(RpcError::new(self.status, "unexpected response"))),
            response => Ok(Ok(response)),
        }
    }

    /// Async send for tokio::io::AsyncWrite
    pub async fn send_async<W: AsyncWrite + Unpin + Send>(&self, stream: &mut W) -> Result<()> {
        // Build header in buffer using byteorder (synchronous)
        let mut header = [0u8; HEADER_SIZE];
        {
            let mut cursor = Cursor::new(&mut header[..]);
            WriteBytesExt::write_u16::<BigEndian>(&mut cursor, self.code)?;
            WriteBytesExt::write_u8(&mut cursor, self.status.as_u8())?;
            WriteBytesExt::write_u32::<BigEndian>(&mut cursor, self.body.len() as u32)?;
        }

        TokioAsyncWriteExt::write_all(stream, &header).await?;
        TokioAsyncWriteExt::write_all(stream, &self.body).await?;
        TokioAsyncWriteExt::flush(stream).await?;
        Ok(())
    }

    /// Async receive for tokio::io::AsyncRead
    pub async fn receive_async<R: AsyncRead + Unpin + Send>(stream: &mut R) -> Result<Frame> {
        let mut header = [0u8; HEADER_SIZE];
        TokioAsyncReadExt::read_exact(stream, &mut header).await?;

        // Parse header using byteorder (synchronous)
        let (code, status, body_length) = {
            let mut cursor = Cursor::new(&header[..]);
            let code = ReadBytesExt::read_u16::<BigEndian>(&mut cursor)?;
            let status = ReadBytesExt::read_u8(&mut cursor)?;
            let body_length = ReadBytesExt::read_u32::<BigEndian>(&mut cursor)?;
            (code, status, body_length)
        };

        // Validate message size to prevent OOM attacks
        if body_length as u64 > MAX_MESSAGE_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("message too large: {} bytes (max: {} bytes)", body_length, MAX_MESSAGE_SIZE),
            ));
        }

        let mut body = vec![0u8; body_length as usize];
        TokioAsyncReadExt::read_exact(stream, &mut body).await?;

        Ok(Frame {
            code,
            status: Status::from_u8(status),
            body,
        })
    }
}

/// Send `request` and wait for its response on the same stream.
pub async fn roundtrip<S>(stream: &mut S, request: &Request) -> Result<std::result::Result<Response, RpcError>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    Frame::request(request)?.send_async(stream).await?;
    Frame::receive_async(stream).await?.into_response()
}
