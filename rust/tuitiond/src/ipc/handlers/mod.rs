pub mod core;
pub mod fees;
pub mod fees_admin;
pub mod setup;
pub mod students;
