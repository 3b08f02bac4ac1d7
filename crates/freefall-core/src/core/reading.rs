// crates/freefall-core/src/core/reading.rs
// ============================================================================
// Module: Sensor Readings
// Description: Candidate and validated forms of one uploaded sample.
// Purpose: Fix the positional schema of a freefall sample line.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A sample line carries exactly [`FIELD_COUNT`] positional fields. The
//! decoder produces [`CandidateRecord`] values holding raw text; only the
//! validator constructs [`SensorReading`], and only once every field has been
//! converted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde::Serializer;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of fields in a well-formed sample line.
pub const FIELD_COUNT: usize = 11;

// ============================================================================
// SECTION: Field Schema
// ============================================================================

/// Conversion class of a sample field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit floating point.
    Float,
}

/// Positional fields of a sample line, in wire order.
///
/// # Invariants
/// - [`SensorField::ALL`] is ordered exactly as fields appear on the wire and
///   as columns appear in storage.
/// - Serializes as its wire column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorField {
    /// Upload session identifier.
    SessionId,
    /// Sample time in client-defined units.
    Timestamp,
    /// Accelerometer X axis.
    AccelX,
    /// Accelerometer Y axis.
    AccelY,
    /// Accelerometer Z axis.
    AccelZ,
    /// Gyroscope X axis.
    GyroX,
    /// Gyroscope Y axis.
    GyroY,
    /// Gyroscope Z axis.
    GyroZ,
    /// Position X.
    PosX,
    /// Position Y.
    PosY,
    /// Position Z.
    PosZ,
}

impl SensorField {
    /// All fields in wire order.
    pub const ALL: [Self; FIELD_COUNT] = [
        Self::SessionId,
        Self::Timestamp,
        Self::AccelX,
        Self::AccelY,
        Self::AccelZ,
        Self::GyroX,
        Self::GyroY,
        Self::GyroZ,
        Self::PosX,
        Self::PosY,
        Self::PosZ,
    ];

    /// Returns the column name used on the wire header and in storage.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SessionId => "session_id",
            Self::Timestamp => "timestamp",
            Self::AccelX => "accelX",
            Self::AccelY => "accelY",
            Self::AccelZ => "accelZ",
            Self::GyroX => "gyroX",
            Self::GyroY => "gyroY",
            Self::GyroZ => "gyroZ",
            Self::PosX => "posX",
            Self::PosY => "posY",
            Self::PosZ => "posZ",
        }
    }

    /// Returns the conversion class for the field.
    #[must_use]
    pub const fn kind(self) -> FieldKind {
        match self {
            Self::SessionId | Self::Timestamp => FieldKind::Integer,
            _ => FieldKind::Float,
        }
    }
}

impl Serialize for SensorField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// One decoded, not yet validated, data line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    /// 1-based line number within the batch, header excluded.
    pub line: usize,
    /// Raw text fields in wire order. Arity is not guaranteed.
    pub fields: Vec<String>,
}

/// A sample whose fields have all been type-converted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Upload session identifier.
    pub session_id: i64,
    /// Sample time in client-defined units.
    pub timestamp: i64,
    /// Accelerometer X axis.
    pub accel_x: f64,
    /// Accelerometer Y axis.
    pub accel_y: f64,
    /// Accelerometer Z axis.
    pub accel_z: f64,
    /// Gyroscope X axis.
    pub gyro_x: f64,
    /// Gyroscope Y axis.
    pub gyro_y: f64,
    /// Gyroscope Z axis.
    pub gyro_z: f64,
    /// Position X.
    pub pos_x: f64,
    /// Position Y.
    pub pos_y: f64,
    /// Position Z.
    pub pos_z: f64,
}

impl SensorReading {
    /// Assembles a reading from converted values in wire order.
    #[must_use]
    pub const fn from_parts(ids: [i64; 2], measurements: [f64; 9]) -> Self {
        let [session_id, timestamp] = ids;
        let [accel_x, accel_y, accel_z, gyro_x, gyro_y, gyro_z, pos_x, pos_y, pos_z] =
            measurements;
        Self {
            session_id,
            timestamp,
            accel_x,
            accel_y,
            accel_z,
            gyro_x,
            gyro_y,
            gyro_z,
            pos_x,
            pos_y,
            pos_z,
        }
    }

    /// Returns the nine floating-point measurements in column order.
    #[must_use]
    pub const fn measurements(&self) -> [f64; 9] {
        [
            self.accel_x,
            self.accel_y,
            self.accel_z,
            self.gyro_x,
            self.gyro_y,
            self.gyro_z,
            self.pos_x,
            self.pos_y,
            self.pos_z,
        ]
    }
}
