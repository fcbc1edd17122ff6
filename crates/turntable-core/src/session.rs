use crate::error::{ConfigError, RecordError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const FULL_TURN: u32 = 360;

/// Number of captures for a full turn: `floor(360 / angle_step)`.
///
/// A step that does not divide 360 leaves the last `360 % angle_step`
/// degrees uncaptured.
pub fn planned_steps(angle_step: u32) -> Result<u32, ConfigError> {
    if angle_step == 0 || angle_step > FULL_TURN {
        return Err(ConfigError::InvalidAngleStep(angle_step));
    }
    Ok(FULL_TURN / angle_step)
}

// ---------------------------------------------------------------------------
// SessionRecord
// ---------------------------------------------------------------------------

/// One capture run: the angle→photo mapping collected so far and whether the
/// full turn was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub angle_step: u32,
    #[serde(default)]
    pub photos: BTreeMap<u32, PathBuf>,
    #[serde(default)]
    pub completed: bool,
}

impl SessionRecord {
    pub fn new(name: impl Into<String>, angle_step: u32) -> Result<Self, ConfigError> {
        planned_steps(angle_step)?;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: Utc::now(),
            angle_step,
            photos: BTreeMap::new(),
            completed: false,
        })
    }

    pub fn planned_steps(&self) -> u32 {
        planned_steps(self.angle_step).unwrap_or(0)
    }

    /// Arc left uncaptured at the end of the turn when the step does not
    /// divide 360.
    pub fn residual_arc(&self) -> u32 {
        if self.angle_step == 0 {
            return FULL_TURN;
        }
        FULL_TURN % self.angle_step
    }

    pub fn steps_completed(&self) -> usize {
        self.photos.len()
    }

    pub fn photo(&self, angle: u32) -> Option<&Path> {
        self.photos.get(&angle).map(PathBuf::as_path)
    }

    /// Photos ordered by angle.
    pub fn ordered_photos(&self) -> impl Iterator<Item = (u32, &Path)> {
        self.photos.iter().map(|(a, p)| (*a, p.as_path()))
    }

    // ---------------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------------

    pub fn record_photo(&mut self, angle: u32, path: PathBuf) -> Result<(), RecordError> {
        if angle >= FULL_TURN {
            return Err(RecordError::AngleOutOfRange(angle));
        }
        if self.angle_step == 0 || angle % self.angle_step != 0 {
            return Err(RecordError::OffStep {
                angle,
                step: self.angle_step,
            });
        }
        if path.as_os_str().is_empty() {
            return Err(RecordError::EmptyPath(angle));
        }
        if self.photos.contains_key(&angle) {
            return Err(RecordError::DuplicateAngle(angle));
        }
        self.photos.insert(angle, path);
        Ok(())
    }

    /// Mark the session complete. Only allowed once every planned angle has
    /// a photo.
    pub fn mark_completed(&mut self) -> Result<(), RecordError> {
        let planned = self.planned_steps();
        if planned == 0 || self.photos.len() != planned as usize {
            return Err(RecordError::Incomplete {
                recorded: self.photos.len(),
                planned,
            });
        }
        self.completed = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn full_record(step: u32) -> SessionRecord {
        let mut record = SessionRecord::new("turn", step).unwrap();
        for i in 0..record.planned_steps() {
            let angle = i * step;
            record
                .record_photo(angle, PathBuf::from(format!("/photos/angle_{angle:03}.jpg")))
                .unwrap();
        }
        record
    }

    #[test]
    fn planned_steps_for_divisors_and_non_divisors() {
        assert_eq!(planned_steps(15).unwrap(), 24);
        assert_eq!(planned_steps(7).unwrap(), 51);
        assert_eq!(planned_steps(360).unwrap(), 1);
        assert!(planned_steps(0).is_err());
        assert!(planned_steps(361).is_err());
    }

    #[test]
    fn new_rejects_invalid_step() {
        assert!(SessionRecord::new("bad", 0).is_err());
    }

    #[test]
    fn residual_arc_for_non_divisor() {
        let record = SessionRecord::new("odd", 7).unwrap();
        assert_eq!(record.residual_arc(), 3);
        let record = SessionRecord::new("even", 15).unwrap();
        assert_eq!(record.residual_arc(), 0);
    }

    #[test]
    fn record_photo_validates_angle() {
        let mut record = SessionRecord::new("s", 15).unwrap();
        assert_eq!(
            record.record_photo(360, PathBuf::from("a.jpg")),
            Err(RecordError::AngleOutOfRange(360))
        );
        assert_eq!(
            record.record_photo(20, PathBuf::from("a.jpg")),
            Err(RecordError::OffStep { angle: 20, step: 15 })
        );
        assert_eq!(
            record.record_photo(30, PathBuf::new()),
            Err(RecordError::EmptyPath(30))
        );
        record.record_photo(30, PathBuf::from("a.jpg")).unwrap();
        assert_eq!(
            record.record_photo(30, PathBuf::from("b.jpg")),
            Err(RecordError::DuplicateAngle(30))
        );
        assert_eq!(record.photo(30), Some(Path::new("a.jpg")));
    }

    #[test]
    fn mark_completed_requires_all_steps() {
        let mut record = SessionRecord::new("s", 90).unwrap();
        record.record_photo(0, PathBuf::from("0.jpg")).unwrap();
        assert_eq!(
            record.mark_completed(),
            Err(RecordError::Incomplete {
                recorded: 1,
                planned: 4
            })
        );
        assert!(!record.completed);

        let mut record = full_record(90);
        record.mark_completed().unwrap();
        assert!(record.completed);
    }

    #[test]
    fn ordered_photos_sorted_by_angle() {
        let mut record = SessionRecord::new("s", 90).unwrap();
        record.record_photo(180, PathBuf::from("c.jpg")).unwrap();
        record.record_photo(0, PathBuf::from("a.jpg")).unwrap();
        record.record_photo(90, PathBuf::from("b.jpg")).unwrap();
        let angles: Vec<u32> = record.ordered_photos().map(|(a, _)| a).collect();
        assert_eq!(angles, vec![0, 90, 180]);
    }

    #[test]
    fn yaml_round_trip_preserves_mapping_and_flag() {
        let mut record = full_record(15);
        record.mark_completed().unwrap();

        let yaml = serde_yaml::to_string(&record).unwrap();
        let back: SessionRecord = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.photos.len(), 24);
        assert!(back.completed);
    }

    #[test]
    fn json_round_trip_preserves_mapping_and_flag() {
        let mut record = SessionRecord::new("partial", 7).unwrap();
        record.record_photo(0, PathBuf::from("a.jpg")).unwrap();
        record.record_photo(7, PathBuf::from("b.jpg")).unwrap();

        let json = serde_json::to_string(&record).unwrap();
        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.photos, record.photos);
        assert!(!back.completed);
    }
}
