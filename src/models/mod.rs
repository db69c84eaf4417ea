//! Core data models for papers and search operations.

mod paper;
mod search;

pub use paper::{Paper, PaperBuilder, SourceType};
pub use search::{
    FailureKind, FetchRequest, ProviderResult, SearchFailure, SearchOutcome, SearchSuccess,
    SourceFailure,
};
