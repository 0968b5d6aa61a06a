//! Read-only share links.
//!
//! A [`SharePayload`] is serialized to JSON, deflated with `flate2` and
//! encoded as URL-safe base64 without padding, so it fits in a URL path
//! segment.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::domain::{ScheduleMatrix, ShiftCode, Staff};
use crate::error::{EngineError, Result};

/// Upper bound on inflated payload size.
const MAX_INFLATED_BYTES: u64 = 8 * 1024 * 1024;

/// Everything needed to rebuild a read-only roster view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharePayload {
    pub staff: Vec<Staff>,
    pub days: usize,
    /// Row-major shift codes, `staff.len() × days` long.
    pub schedule: Vec<ShiftCode>,
}

impl SharePayload {
    /// The schedule as a matrix, checked against the staff count and horizon.
    pub fn matrix(&self) -> Result<ScheduleMatrix> {
        ScheduleMatrix::from_cells(self.staff.len(), self.days, self.schedule.clone())
    }
}

/// Encodes a payload into a URL-safe token.
///
/// ```
/// use roster_engine::domain::Staff;
/// use roster_engine::share::{decode, encode, SharePayload};
///
/// let payload = SharePayload { staff: vec![Staff::new("a", "Kim")], days: 3, schedule: vec![1, 0, 3] };
/// let token = encode(&payload).unwrap();
/// assert!(!token.contains('/') && !token.contains('+'));
/// assert_eq!(decode(&token).unwrap(), payload);
/// ```
pub fn encode(payload: &SharePayload) -> Result<String> {
    payload.matrix()?;
    let json = serde_json::to_vec(payload).map_err(|e| EngineError::Share(e.to_string()))?;
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(&json)
        .map_err(|e| EngineError::Share(e.to_string()))?;
    let compressed = encoder.finish().map_err(|e| EngineError::Share(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(compressed))
}

/// Decodes a token and validates the schedule shape.
pub fn decode(token: &str) -> Result<SharePayload> {
    let compressed = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|e| EngineError::Share(format!("invalid base64: {}", e)))?;

    let mut json = Vec::new();
    DeflateDecoder::new(compressed.as_slice())
        .take(MAX_INFLATED_BYTES)
        .read_to_end(&mut json)
        .map_err(|e| EngineError::Share(format!("invalid deflate stream: {}", e)))?;

    let payload: SharePayload =
        serde_json::from_slice(&json).map_err(|e| EngineError::Share(format!("invalid payload: {}", e)))?;
    payload.matrix()?;
    Ok(payload)
}
