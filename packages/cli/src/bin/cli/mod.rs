pub mod backup;
pub mod encryption;
pub mod mood;
pub mod notes;
pub mod utils;
