pub mod academic;
pub mod attendance;
pub mod classes;
pub mod core;
pub mod grading;
pub mod results;
pub mod rollup;
pub mod setup;
pub mod students;
