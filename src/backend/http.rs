// ABOUTME: JSON-over-HTTP/1.1 client for a fleet/routing controller endpoint.
// ABOUTME: One connection per request; every exchange is bounded by the request timeout.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HOST};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::time::Duration;
use tokio::net::TcpStream;

use super::error::{
    BackendError, ConnectSnafu, DecodeSnafu, ExternalSystem, TransportSnafu,
};
use super::sealed::Sealed;
use super::traits::{FleetOps, RoutingOps};
use crate::fleet::{Capacity, Instance, TargetHealth};
use crate::lifecycle::LifecycleResult;
use crate::routing::RoutingRules;
use crate::types::{Color, InstanceId, LifecycleToken, ResourceName};

#[derive(Serialize)]
struct ProtectionBody {
    protected: bool,
}

#[derive(Serialize)]
struct LifecycleActionBody<'a> {
    instance: &'a str,
    result: LifecycleResult,
}

#[derive(Deserialize)]
struct InstanceList {
    instances: Vec<Instance>,
}

#[derive(Deserialize)]
struct TargetHealthList {
    targets: Vec<TargetHealth>,
}

/// Controller client.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    authority: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpBackend {
    /// `endpoint` is `host:port`, optionally prefixed with `http://`.
    pub fn new(
        endpoint: &str,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        if endpoint.starts_with("https://") {
            return Err(BackendError::Protocol {
                system: ExternalSystem::FleetManager,
                message: "https endpoints are not supported; terminate TLS in front of the controller"
                    .to_string(),
            });
        }
        let authority = endpoint
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string();
        if authority.is_empty() || authority.contains('/') {
            return Err(BackendError::Protocol {
                system: ExternalSystem::FleetManager,
                message: format!("invalid controller endpoint: {endpoint}"),
            });
        }
        Ok(Self {
            authority,
            auth_token,
            timeout,
        })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    async fn send(
        &self,
        system: ExternalSystem,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(StatusCode, Bytes), BackendError> {
        let exchange = async {
            let stream = TcpStream::connect(&self.authority)
                .await
                .context(ConnectSnafu { system })?;
            let io = TokioIo::new(stream);

            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .context(TransportSnafu { system })?;

            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    tracing::debug!("controller connection error: {}", e);
                }
            });

            let mut builder = Request::builder()
                .method(method)
                .uri(path)
                .header(HOST, &self.authority)
                .header(ACCEPT, "application/json");
            if let Some(ref token) = self.auth_token {
                builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
            }
            if body.is_some() {
                builder = builder.header(CONTENT_TYPE, "application/json");
            }

            let req = builder
                .body(Full::new(Bytes::from(body.unwrap_or_default())))
                .map_err(|e| BackendError::Protocol {
                    system,
                    message: format!("failed to build request: {e}"),
                })?;

            let resp = sender
                .send_request(req)
                .await
                .context(TransportSnafu { system })?;
            let status = resp.status();
            let bytes = resp
                .into_body()
                .collect()
                .await
                .context(TransportSnafu { system })?
                .to_bytes();

            Ok::<_, BackendError>((status, bytes))
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| BackendError::Timeout {
                system,
                timeout: self.timeout,
            })?
    }

    /// Send and require a 2xx answer.
    async fn call(
        &self,
        system: ExternalSystem,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, BackendError> {
        tracing::debug!(%method, path, "controller request");
        let (status, bytes) = self.send(system, method, path, body).await?;
        check_status(system, status, &bytes)?;
        Ok(bytes)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        system: ExternalSystem,
        path: &str,
    ) -> Result<T, BackendError> {
        let bytes = self.call(system, Method::GET, path, None).await?;
        serde_json::from_slice(&bytes).context(DecodeSnafu { system })
    }

    async fn write_json<B: Serialize + ?Sized>(
        &self,
        system: ExternalSystem,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<(), BackendError> {
        let payload = serde_json::to_vec(body).map_err(|e| BackendError::Protocol {
            system,
            message: format!("failed to encode request: {e}"),
        })?;
        self.call(system, method, path, Some(payload)).await?;
        Ok(())
    }
}

fn check_status(system: ExternalSystem, status: StatusCode, body: &[u8]) -> Result<(), BackendError> {
    if status.is_success() {
        return Ok(());
    }
    let message = String::from_utf8_lossy(body).trim().to_string();
    if status.is_server_error() {
        return Err(BackendError::Unreachable {
            system,
            message: format!("{status}: {message}"),
        });
    }
    Err(BackendError::Rejected {
        system,
        status: status.as_u16(),
        message,
    })
}

impl Sealed for HttpBackend {}

#[async_trait]
impl FleetOps for HttpBackend {
    async fn set_capacity(&self, color: Color, capacity: Capacity) -> Result<(), BackendError> {
        let path = format!("/fleets/{color}/capacity");
        self.write_json(ExternalSystem::FleetManager, Method::PUT, &path, &capacity)
            .await
    }

    async fn capacity_of(&self, color: Color) -> Result<Capacity, BackendError> {
        let path = format!("/fleets/{color}/capacity");
        self.get_json(ExternalSystem::FleetManager, &path).await
    }

    async fn list_instances(&self, color: Color) -> Result<Vec<Instance>, BackendError> {
        let path = format!("/fleets/{color}/instances");
        let list: InstanceList = self.get_json(ExternalSystem::FleetManager, &path).await?;
        Ok(list.instances)
    }

    async fn set_scale_in_protection(
        &self,
        color: Color,
        protected: bool,
    ) -> Result<(), BackendError> {
        let path = format!("/fleets/{color}/protection");
        self.write_json(
            ExternalSystem::FleetManager,
            Method::PUT,
            &path,
            &ProtectionBody { protected },
        )
        .await
    }

    async fn complete_lifecycle_action(
        &self,
        instance: &InstanceId,
        token: &LifecycleToken,
        result: LifecycleResult,
    ) -> Result<(), BackendError> {
        let path = format!(
            "/lifecycle-actions/{}",
            urlencoding::encode(token.as_str())
        );
        self.write_json(
            ExternalSystem::FleetManager,
            Method::POST,
            &path,
            &LifecycleActionBody {
                instance: instance.as_str(),
                result,
            },
        )
        .await
    }

    async fn target_group_health(
        &self,
        role: &ResourceName,
        color: Color,
    ) -> Result<Vec<TargetHealth>, BackendError> {
        let path = format!(
            "/target-groups/{}/{color}/health",
            urlencoding::encode(role.as_str())
        );
        let list: TargetHealthList = self.get_json(ExternalSystem::FleetManager, &path).await?;
        Ok(list.targets)
    }
}

#[async_trait]
impl RoutingOps for HttpBackend {
    async fn apply_routing_rules(&self, rules: &RoutingRules) -> Result<(), BackendError> {
        self.write_json(ExternalSystem::RoutingLayer, Method::PUT, "/routing/rules", rules)
            .await
    }

    async fn current_routing_rules(&self) -> Result<Option<RoutingRules>, BackendError> {
        let system = ExternalSystem::RoutingLayer;
        let (status, bytes) = self
            .send(system, Method::GET, "/routing/rules", None)
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(system, status, &bytes)?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .context(DecodeSnafu { system })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_accepts_plain_authority() {
        let backend = HttpBackend::new("http://127.0.0.1:8080/", None, Duration::from_secs(1))
            .unwrap();
        assert_eq!(backend.authority(), "127.0.0.1:8080");
    }

    #[test]
    fn endpoint_rejects_tls_and_paths() {
        assert!(HttpBackend::new("https://ctl:443", None, Duration::from_secs(1)).is_err());
        assert!(HttpBackend::new("ctl:80/api", None, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn server_errors_are_retryable() {
        let err = check_status(
            ExternalSystem::RoutingLayer,
            StatusCode::BAD_GATEWAY,
            b"upstream down",
        )
        .unwrap_err();
        assert!(err.is_retryable());

        let err = check_status(ExternalSystem::RoutingLayer, StatusCode::CONFLICT, b"busy")
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
