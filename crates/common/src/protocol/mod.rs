// Wire formats: backend HTTP bodies and background worker messages.

pub mod backend;
pub mod worker;
