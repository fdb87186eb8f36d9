//! WebSocket transport: command framing, subscription streaming, CORS.
//! The engine never sees a raw frame; everything crossing this boundary is
//! an already-typed [`crate::protocol::ClientCommand`] or
//! [`crate::protocol::ServerEvent`].

mod handler;
mod routes;

pub use routes::create_router;
