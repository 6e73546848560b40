pub mod edit;
pub mod show;
