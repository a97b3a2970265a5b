pub mod activity;
pub mod spawn;
pub mod tune;
