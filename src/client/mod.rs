// Language client layer
// - options.rs: document selector, watch pattern, client identity
// - transport.rs: LSP stdio framing (Content-Length + JSON-RPC)
// - session.rs: lifecycle state machine (start/stop)
pub mod options;
pub mod session;
pub mod transport;
