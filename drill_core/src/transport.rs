//! Transport abstraction for backend requests.
//!
//! The HTTP client lives outside this crate. The engine only builds
//! endpoint-keyed requests and reads back a status code and a body, so
//! front ends can plug in their client of choice and tests can use
//! [`crate::testing::MockTransport`].

use crate::{BackendId, Error, Result};
use async_trait::async_trait;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// Backend endpoints the engine talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    DrillGroups,
    DrillGroup(BackendId),
    LikedGroup,
    LikedGroupById(BackendId),
    LikedDrillCheck(BackendId),
    SessionDrills,
    Preferences,
}

impl Endpoint {
    pub fn path(&self) -> String {
        match self {
            Endpoint::DrillGroups => "/api/drill-groups/".to_string(),
            Endpoint::DrillGroup(id) => format!("/api/drill-groups/{}/", id),
            Endpoint::LikedGroup => "/api/liked-group/".to_string(),
            Endpoint::LikedGroupById(id) => format!("/api/liked-group/{}/", id),
            Endpoint::LikedDrillCheck(id) => format!("/api/liked-drills/{}/check/", id),
            Endpoint::SessionDrills => "/api/session-drills/".to_string(),
            Endpoint::Preferences => "/api/preferences/".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub method: Method,
    pub endpoint: Endpoint,
    pub body: Option<serde_json::Value>,
}

impl Request {
    pub fn get(endpoint: Endpoint) -> Self {
        Self {
            method: Method::Get,
            endpoint,
            body: None,
        }
    }

    pub fn delete(endpoint: Endpoint) -> Self {
        Self {
            method: Method::Delete,
            endpoint,
            body: None,
        }
    }

    pub fn with_body<T: Serialize + ?Sized>(
        method: Method,
        endpoint: Endpoint,
        body: &T,
    ) -> Result<Self> {
        Ok(Self {
            method,
            endpoint,
            body: Some(serde_json::to_value(body)?),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one request and returns the backend's answer.
///
/// `Err` is for failures below HTTP (no connection, timeout). A non-2xx
/// status comes back as an `Ok(Response)`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response>;
}

/// Transport for front ends that run without a backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineTransport;

#[async_trait]
impl Transport for OfflineTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        Err(Error::transport(format!(
            "offline: {:?} {}",
            request.method,
            request.endpoint.path()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_paths() {
        assert_eq!(Endpoint::DrillGroups.path(), "/api/drill-groups/");
        assert_eq!(Endpoint::DrillGroup(12).path(), "/api/drill-groups/12/");
        assert_eq!(Endpoint::LikedDrillCheck(5).path(), "/api/liked-drills/5/check/");
    }

    #[test]
    fn test_success_range() {
        assert!(Response::new(200, "").is_success());
        assert!(Response::new(204, "").is_success());
        assert!(!Response::new(404, "").is_success());
        assert!(!Response::new(500, "").is_success());
    }

    #[tokio::test]
    async fn test_offline_transport_fails() {
        let err = OfflineTransport
            .send(Request::get(Endpoint::DrillGroups))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Sync { status: 0, .. }));
    }
}
