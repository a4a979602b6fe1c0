//! Per-frame detection readout published to the network

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::capture::Frame;

/// One detected fiducial marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarkerReadout {
    pub id: u32,
    /// Sub-pixel centre, in frame coordinates
    pub x: f64,
    pub y: f64,
    /// Orientation in radians
    pub angle: f64,
    pub corners: [(f64, f64); 4],
}

impl MarkerReadout {
    pub fn at(id: u32, x: f64, y: f64) -> Self {
        Self {
            id,
            x,
            y,
            angle: 0.0,
            corners: [(x, y); 4],
        }
    }
}

/// Status carried by readouts that hold no detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadoutError {
    /// Frame dropped because processing could not keep up
    ProcessOverflow,
}

/// Reusable detection readout, checked out of a `MessagePool` per frame.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultMessage {
    pub frame_id: u64,
    /// Device timestamp in microseconds
    pub timestamp: u64,
    /// Wall-clock capture time
    pub time: WallTime,
    pub producer_uuid: String,
    pub width: u32,
    pub height: u32,
    pub markers: Vec<MarkerReadout>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReadoutError>,
}

/// Seconds and nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WallTime {
    pub seconds: u64,
    pub nanos: u32,
}

impl From<SystemTime> for WallTime {
    fn from(time: SystemTime) -> Self {
        let since = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        Self {
            seconds: since.as_secs(),
            nanos: since.subsec_nanos(),
        }
    }
}

impl ResultMessage {
    /// Reset for `frame`, keeping allocated capacity.
    pub fn prepare(&mut self, frame: &Frame, producer_uuid: &str) {
        self.frame_id = frame.id();
        self.timestamp = frame.timestamp().as_micros() as u64;
        self.time = WallTime::from(frame.meta.time);
        self.producer_uuid.clear();
        self.producer_uuid.push_str(producer_uuid);
        self.width = frame.width();
        self.height = frame.height();
        self.markers.clear();
        self.error = None;
    }

    pub fn is_overflow(&self) -> bool {
        self.error == Some(ReadoutError::ProcessOverflow)
    }

    /// Length-prefixed (u32 big endian) JSON frame.
    pub fn to_wire(&self) -> Result<Bytes, serde_json::Error> {
        let body = serde_json::to_vec(self)?;
        let mut buf = BytesMut::with_capacity(4 + body.len());
        buf.put_u32(body.len() as u32);
        buf.put_slice(&body);
        Ok(buf.freeze())
    }
}
