mod dataset;
mod error;
mod record;

pub mod prelude {
    pub use crate::dataset::{Dataset, REQUIRED_COLUMNS};
    pub use crate::error::DataLoadError;
    pub use crate::record::{Record, RequiredFields};
}
