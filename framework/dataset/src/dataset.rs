use std::io::Read;
use std::path::Path;

use rand::Rng;

use crate::error::DataLoadError;
use crate::record::{Record, SourceRow};

/// Columns the source file must have in its header row.
pub const REQUIRED_COLUMNS: [&str; 3] = ["trj_id", "rawlat", "rawlng"];

/// The immutable table of records shared by every virtual user.
///
/// Build it once, wrap it in an `Arc` and hand clones of the `Arc` to the virtual users. There is
/// no interior mutability, so concurrent sampling needs no locking.
#[derive(Debug)]
pub struct Dataset {
    /// Never empty.
    records: Vec<Record>,
    dropped: usize,
}

impl Dataset {
    /// Load a dataset from a CSV file with a header row.
    ///
    /// Rows without a trajectory id, latitude or longitude are dropped here so that sampling never
    /// has to check them again.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataLoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DataLoadError::NotFound {
                path: path.to_path_buf(),
            });
        }

        log::debug!("Loading dataset from {}", path.display());
        let file = std::fs::File::open(path)?;
        let dataset = Self::from_reader(file)?;
        log::info!(
            "Loaded {} records from {} ({} incomplete rows dropped)",
            dataset.len(),
            path.display(),
            dataset.dropped()
        );

        Ok(dataset)
    }

    /// Parse CSV with a header row from any reader. See [Dataset::load].
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DataLoadError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(DataLoadError::MissingColumn { column });
            }
        }

        let mut records = Vec::new();
        let mut dropped = 0;
        for row in reader.deserialize::<SourceRow>() {
            let record = Record::from(row?);
            if record.required().is_some() {
                records.push(record);
            } else {
                dropped += 1;
            }
        }

        if records.is_empty() {
            return Err(DataLoadError::Empty { dropped });
        }

        Ok(Self { records, dropped })
    }

    /// Use records that were built in code. They are taken as they are, so a virtual user may still
    /// come across a record with missing fields and skip it.
    pub fn from_records(records: Vec<Record>) -> Result<Self, DataLoadError> {
        if records.is_empty() {
            return Err(DataLoadError::Empty { dropped: 0 });
        }

        Ok(Self {
            records,
            dropped: 0,
        })
    }

    /// A uniformly random record.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> &Record {
        &self.records[rng.gen_range(0..self.records.len())]
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false for a successfully built dataset.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// How many source rows were dropped for missing required fields.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}
