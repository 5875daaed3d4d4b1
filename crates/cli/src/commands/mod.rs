pub mod agent;
pub mod doctor;
pub mod providers;
pub mod status;
pub mod usage;
