use serde::{Deserialize, Serialize};

/// One trajectory ping from the dataset.
///
/// Records are immutable once loaded. Every field is optional at the type level so that records
/// built outside of [crate::prelude::Dataset::load] can still be represented, but a loaded dataset
/// only contains records for which [Record::required] returns `Some`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub trajectory_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Metres per second.
    pub speed: Option<f64>,
    /// Degrees.
    pub bearing: Option<f64>,
    pub accuracy: Option<f64>,
    /// Unix time in seconds, as recorded by the source.
    pub timestamp: Option<i64>,
    pub driving_mode: Option<String>,
    pub os_name: Option<String>,
}

/// The fields every request needs, borrowed from a [Record].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequiredFields<'a> {
    pub trajectory_id: &'a str,
    pub latitude: f64,
    pub longitude: f64,
}

impl Record {
    pub fn new(trajectory_id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            trajectory_id: Some(trajectory_id.into()),
            latitude: Some(latitude),
            longitude: Some(longitude),
            ..Default::default()
        }
    }

    /// The trajectory id and coordinates, or `None` if any of them is absent.
    pub fn required(&self) -> Option<RequiredFields<'_>> {
        let trajectory_id = self
            .trajectory_id
            .as_deref()
            .filter(|id| !id.is_empty())?;

        Some(RequiredFields {
            trajectory_id,
            latitude: self.latitude.filter(|v| v.is_finite())?,
            longitude: self.longitude.filter(|v| v.is_finite())?,
        })
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = Some(bearing);
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_driving_mode(mut self, driving_mode: impl Into<String>) -> Self {
        self.driving_mode = Some(driving_mode.into());
        self
    }

    pub fn with_os_name(mut self, os_name: impl Into<String>) -> Self {
        self.os_name = Some(os_name.into());
        self
    }
}

/// A row as it appears in the source file. Values stay as text so that one bad cell drops its row
/// instead of failing the whole load.
#[derive(Debug, Deserialize)]
pub(crate) struct SourceRow {
    trj_id: Option<String>,
    driving_mode: Option<String>,
    osname: Option<String>,
    pingtimestamp: Option<String>,
    rawlat: Option<String>,
    rawlng: Option<String>,
    speed: Option<String>,
    bearing: Option<String>,
    accuracy: Option<String>,
}

fn text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|v| !v.is_empty())
}

fn number(value: Option<String>) -> Option<f64> {
    text(value)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

impl From<SourceRow> for Record {
    fn from(row: SourceRow) -> Self {
        Self {
            trajectory_id: text(row.trj_id),
            latitude: number(row.rawlat),
            longitude: number(row.rawlng),
            speed: number(row.speed),
            bearing: number(row.bearing),
            accuracy: number(row.accuracy),
            // Some exports write the epoch seconds as a float.
            timestamp: number(row.pingtimestamp).map(|v| v as i64),
            driving_mode: text(row.driving_mode),
            os_name: text(row.osname),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_fields_need_id_and_coordinates() {
        let record = Record::new("70193", -6.2, 106.8);
        let required = record.required().unwrap();
        assert_eq!("70193", required.trajectory_id);
        assert_eq!(-6.2, required.latitude);

        let missing_lat = Record {
            latitude: None,
            ..record.clone()
        };
        assert!(missing_lat.required().is_none());

        let empty_id = Record {
            trajectory_id: Some(String::new()),
            ..record
        };
        assert!(empty_id.required().is_none());
    }

    #[test]
    fn source_row_conversion_trims_and_parses() {
        let row = SourceRow {
            trj_id: Some(" \"70193\" ".to_string()),
            driving_mode: Some("car".to_string()),
            osname: Some("android".to_string()),
            pingtimestamp: Some("1554737720".to_string()),
            rawlat: Some("-6.2387".to_string()),
            rawlng: Some("not a number".to_string()),
            speed: Some("".to_string()),
            bearing: Some("90".to_string()),
            accuracy: None,
        };

        let record = Record::from(row);
        assert_eq!(Some("70193".to_string()), record.trajectory_id);
        assert_eq!(Some(-6.2387), record.latitude);
        assert_eq!(None, record.longitude);
        assert_eq!(None, record.speed);
        assert_eq!(Some(90.0), record.bearing);
        assert_eq!(Some(1554737720), record.timestamp);
    }
}
