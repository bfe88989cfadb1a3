pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod extract;
pub mod frame;
pub mod ledger;
pub mod load;
pub mod pipeline;
pub mod quality;
pub mod star_schema;
pub mod table;

pub use error::{PipelineError, Result};
