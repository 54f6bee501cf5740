//! The proxy engine: connection dispatch (C8), the CONNECT/TLS tunnel
//! handler (C6), the plain-HTTP handler (C7), the shared decision-loop
//! engine they both drive through, and the upstream HTTP client.

pub mod dispatcher;
pub mod engine;
pub mod plain;
pub mod tunnel;
pub mod upstream;
