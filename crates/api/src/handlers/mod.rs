pub mod assets;
pub mod defaults;
pub mod jobs;
pub mod models;
pub mod queue;
pub mod tools;
pub mod workflows;
