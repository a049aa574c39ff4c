use thiserror::Error;

/// Per-record validation failure. The record is skipped, the run continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputDataError {
    #[error("record {id} has no city_district")]
    MissingDistrict { id: u64 },

    #[error("record {id} has no usable coordinates")]
    MissingCoordinates { id: u64 },

    #[error("record {id} has no population_in_district")]
    MissingPopulation { id: u64 },

    #[error("record {id} has negative population {value}")]
    NegativePopulation { id: u64, value: i64 },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed store file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Column '{column}' not found in {file}")]
    MissingColumn { column: String, file: String },
}
