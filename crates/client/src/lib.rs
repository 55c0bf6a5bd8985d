// reposync-client library: durable offline edit queue and its sync pipeline.

pub mod background;
pub mod backend;
pub mod bus;
pub mod config;
pub mod connectivity;
pub mod editor;
pub mod flush;
pub mod probe;
pub mod status;
pub mod store;
pub mod trigger;
