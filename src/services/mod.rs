pub mod badge;
pub mod difficulty;
pub mod review;
pub mod scoring;
