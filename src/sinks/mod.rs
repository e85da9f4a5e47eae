pub mod net;
pub mod offline;

pub use net::NetSink;
pub use offline::OfflineSink;
