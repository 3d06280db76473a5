pub mod add;
pub mod clear;
pub mod common;
pub mod completions;
pub mod delete;
pub mod edit;
pub mod failures;
pub mod list;
pub mod queue;
pub mod settings;
pub mod sync;
