//! Line-delimited JSON protocol spoken with the host over stdin/stdout

pub mod dispatcher;
pub mod protocol;
pub mod sink;
