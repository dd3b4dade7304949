//! Client address extractor that also works without `ConnectInfo`.
//!
//! In-process tests drive the router without a socket, so the peer address is
//! optional rather than a hard requirement of the handlers.

use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;

/// Peer address of the caller, when the server recorded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub Option<SocketAddr>);

impl fmt::Display for ClientAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(addr) => write!(f, "{addr}"),
            None => f.write_str("unknown"),
        }
    }
}

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientAddr(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn test_missing_connect_info_is_none() {
        let (mut parts, _) = Request::new(()).into_parts();
        let addr = ClientAddr::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(addr, ClientAddr(None));
        assert_eq!(addr.to_string(), "unknown");
    }

    #[tokio::test]
    async fn test_connect_info_is_used() {
        let (mut parts, _) = Request::new(()).into_parts();
        let socket: SocketAddr = "10.0.0.5:40000".parse().unwrap();
        parts.extensions.insert(ConnectInfo(socket));
        let addr = ClientAddr::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(addr.to_string(), "10.0.0.5:40000");
    }
}
