pub mod transport;

pub use transport::{ReqwestTransport, Response, Transport, TransportError};
