// Library for tests and the two binaries to access modules

pub mod agent;
pub mod models;
pub mod server;
pub mod version;
