pub mod app;
pub mod scenario;
pub mod shutdown;
