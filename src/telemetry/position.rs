use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{epoch_millis, from_epoch_millis, is_stale_at, truncate_to_millis, DEFAULT_MAX_AGE};
use crate::error::ValidationError;

/// Allowed deviation of a rotation quaternion's norm from 1.0.
pub const QUATERNION_TOLERANCE: f64 = 0.01;

/// Orientation as a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

/// Orientation as roll/pitch/yaw in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// Latest known pose of an asset in the world frame.
///
/// Construction validates the heading range and the quaternion norm, so any
/// `PositionRecord` in the system satisfies both. A new write replaces the
/// previous record wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "PositionPayload", try_from = "PositionPayload")]
pub struct PositionRecord {
    x: f64,
    y: f64,
    z: f64,
    heading: f64,
    timestamp: DateTime<Utc>,
    map_id: Option<String>,
    frame_id: Option<String>,
    rotation: Option<Quaternion>,
    euler: Option<EulerAngles>,
}

/// Wire form of a position as stored under `asset:<id>:position`.
///
/// Quaternion components are written only when a rotation is present and all
/// four must be present to read one back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionPayload {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qz: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qw: Option<f64>,
    pub heading: f64,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<String>,
    #[serde(rename = "mapId", default, skip_serializing_if = "Option::is_none")]
    pub map_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub euler: Option<EulerAngles>,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    pub fn is_normalized(&self) -> bool {
        (self.norm() - 1.0).abs() < QUATERNION_TOLERANCE
    }

    /// Rotation about the vertical axis by `heading` degrees.
    pub fn from_heading(heading: f64) -> Self {
        let half = heading.to_radians() / 2.0;
        Self {
            x: 0.0,
            y: 0.0,
            z: half.sin(),
            w: half.cos(),
        }
    }
}

impl PositionRecord {
    /// The timestamp is truncated to milliseconds, the precision it is
    /// stored with.
    pub fn new(
        x: f64,
        y: f64,
        z: f64,
        heading: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        for (field, value) in [("x", x), ("y", y), ("z", z)] {
            if !value.is_finite() {
                return Err(ValidationError::NotFinite { field });
            }
        }
        if !(0.0..360.0).contains(&heading) {
            return Err(ValidationError::HeadingOutOfRange(heading));
        }
        Ok(Self {
            x,
            y,
            z,
            heading,
            timestamp: truncate_to_millis(timestamp),
            map_id: None,
            frame_id: None,
            rotation: None,
            euler: None,
        })
    }

    pub fn with_rotation(
        mut self,
        rotation: Quaternion,
    ) -> Result<Self, ValidationError> {
        if !rotation.is_normalized() {
            return Err(ValidationError::QuaternionNotNormalized(rotation.norm()));
        }
        self.rotation = Some(rotation);
        Ok(self)
    }

    pub fn with_euler(
        mut self,
        euler: EulerAngles,
    ) -> Result<Self, ValidationError> {
        for (field, value) in [("roll", euler.roll), ("pitch", euler.pitch), ("yaw", euler.yaw)] {
            if !value.is_finite() {
                return Err(ValidationError::NotFinite { field });
            }
        }
        self.euler = Some(euler);
        Ok(self)
    }

    pub fn with_map_id(
        mut self,
        map_id: impl Into<String>,
    ) -> Self {
        self.map_id = Some(map_id.into());
        self
    }

    pub fn with_frame_id(
        mut self,
        frame_id: impl Into<String>,
    ) -> Self {
        self.frame_id = Some(frame_id.into());
        self
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn z(&self) -> f64 {
        self.z
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn map_id(&self) -> Option<&str> {
        self.map_id.as_deref()
    }

    pub fn frame_id(&self) -> Option<&str> {
        self.frame_id.as_deref()
    }

    pub fn rotation(&self) -> Option<Quaternion> {
        self.rotation
    }

    pub fn euler(&self) -> Option<EulerAngles> {
        self.euler
    }

    /// Euclidean distance to another position in the same frame.
    pub fn distance_to(
        &self,
        other: &PositionRecord,
    ) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Staleness against the wall clock with the default 5 s threshold.
    pub fn is_stale(&self) -> bool {
        self.is_stale_after(DEFAULT_MAX_AGE)
    }

    pub fn is_stale_after(
        &self,
        max_age: Duration,
    ) -> bool {
        is_stale_at(self.timestamp, max_age, Utc::now())
    }
}

impl From<PositionRecord> for PositionPayload {
    fn from(p: PositionRecord) -> Self {
        Self {
            x: p.x,
            y: p.y,
            z: p.z,
            qx: p.rotation.map(|q| q.x),
            qy: p.rotation.map(|q| q.y),
            qz: p.rotation.map(|q| q.z),
            qw: p.rotation.map(|q| q.w),
            heading: p.heading,
            timestamp: epoch_millis(p.timestamp),
            frame_id: p.frame_id,
            map_id: p.map_id,
            euler: p.euler,
        }
    }
}

impl TryFrom<PositionPayload> for PositionRecord {
    type Error = ValidationError;

    fn try_from(p: PositionPayload) -> Result<Self, Self::Error> {
        let timestamp = from_epoch_millis(p.timestamp)?;
        let mut record = PositionRecord::new(p.x, p.y, p.z, p.heading, timestamp)?;
        match (p.qx, p.qy, p.qz, p.qw) {
            (Some(x), Some(y), Some(z), Some(w)) => {
                record = record.with_rotation(Quaternion { x, y, z, w })?;
            }
            (None, None, None, None) => {}
            _ => return Err(ValidationError::PartialRotation),
        }
        if let Some(euler) = p.euler {
            record = record.with_euler(euler)?;
        }
        record.map_id = p.map_id;
        record.frame_id = p.frame_id;
        Ok(record)
    }
}
