pub mod clear;
pub mod import;
pub mod report;
pub mod status;
pub mod sync;
