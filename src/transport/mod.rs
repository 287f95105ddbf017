// Transport module - THE WIRE (abstract)
// Request/response transport to the master plus the typed envelope layer

mod http;
mod link;
mod traits;

pub use traits::{
    // Core trait
    Transport,
    // Configuration
    TransportConfig,
    // Request types
    Method, Request, Response,
    // Errors
    TransportError,
};

pub use http::HttpTransport;

pub use link::{
    parse_reply, Auth, ErrorHandler, LinkError, MasterLink, ProtocolError, StatusEnvelope,
};
