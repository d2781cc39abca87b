//! HTTP API for binds
//!
//! ## Mutations
//! - `POST /{kind}/{action}/` - `action` is `add` or `remove`;
//!   body `{"target_ct": "catalog.Item", "target_object_id": 9}`
//! - `POST /{action}/` - same, with the kind in the body: `"type": "wishlist"`
//!
//! `add` answers `201 Created` with the bind, `remove` answers `204 No Content`.
//! Unknown type or missing target is `400` with a field-keyed message, an
//! existing bind on `add` is `409`, a missing bind on `remove` is `404`.
//!
//! ## Reads
//! - `GET /{kind}/?target_ct=catalog.Item` - keys bound by the caller
//! - `POST /{kind}/state/` - `{"target_ct": ..., "target_object_ids": [...]}`
//!   answers `{"<key>": true|false, ...}` from a single store query
//! - `GET /health` - Health check
//!
//! The caller is identified by headers set by the authenticating gateway
//! (see [`HeaderPrincipalExtractor`]); requests without them get `401`.
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST http://localhost:8095/wishlist/add/ \
//!      -H "x-principal-type: user.User" -H "x-principal-id: 1" \
//!      -H "Content-Type: application/json" \
//!      -d '{"target_ct": "catalog.Item", "target_object_id": 9}'
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::author::HeaderPrincipalExtractor;
use crate::db::BinderDb;
use crate::error::BinderError;
use crate::model::{BindAction, EntityKey, EntityRef, RelationKind};
use crate::services::response::{self, error_response};
use crate::services::Services;

const REQUIRED: &str = "This field is required.";

/// Request handler: maps routes and payloads onto service calls
pub struct BindApi {
    services: Arc<Services>,
    kinds: Vec<RelationKind>,
    principals: HeaderPrincipalExtractor,
    db: Option<Arc<BinderDb>>,
}

/// Body of add/remove requests
#[derive(Debug, Default, Deserialize)]
struct BindPayload {
    target_ct: Option<Value>,
    target_object_id: Option<Value>,
    #[serde(rename = "type")]
    kind: Option<Value>,
}

/// Body of state requests
#[derive(Debug, Default, Deserialize)]
struct StatePayload {
    target_ct: Option<Value>,
    #[serde(default)]
    target_object_ids: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    target_ct: Option<String>,
}

impl BindApi {
    pub fn new(
        services: Arc<Services>,
        kinds: Vec<RelationKind>,
        principals: HeaderPrincipalExtractor,
    ) -> Self {
        Self {
            services,
            kinds,
            principals,
            db: None,
        }
    }

    /// Report bind counts from this database on `/health`
    pub fn with_stats(mut self, db: Arc<BinderDb>) -> Self {
        self.db = Some(db);
        self
    }

    /// Route a request whose body has already been read
    pub fn handle(
        &self,
        method: &Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Response<Full<Bytes>> {
        debug!(method = %method, path = %path, "Incoming request");

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let result = match (method, segments.as_slice()) {
            (&Method::GET, ["health"]) => self.handle_health(),
            (_, ["health"]) => Ok(response::method_not_allowed()),

            // Single-endpoint form: kind in the body
            (&Method::POST, [action]) if self.kind(action).is_none() => {
                self.handle_bind(None, action, headers, body)
            }

            (&Method::GET, [kind]) => match self.kind(kind) {
                Some(kind) => self.handle_list(kind, query, headers),
                None => Ok(response::not_found("Not Found")),
            },

            (&Method::POST, [kind, "state"]) => match self.kind(kind) {
                Some(kind) => self.handle_state(kind, headers, body),
                None => Ok(response::not_found("Not Found")),
            },

            (&Method::POST, [kind, action]) => match self.kind(kind) {
                Some(kind) => self.handle_bind(Some(kind), action, headers, body),
                None => Ok(response::not_found("Not Found")),
            },

            (_, [kind, ..]) if self.kind(kind).is_some() => Ok(response::method_not_allowed()),

            _ => Ok(response::not_found("Not Found")),
        };

        result.unwrap_or_else(|e| {
            if e.is_client_error() {
                warn!(method = %method, path = %path, error = %e, "Request rejected");
            }
            error_response(e)
        })
    }

    fn kind(&self, name: &str) -> Option<RelationKind> {
        self.kinds.iter().find(|k| k.as_str() == name).cloned()
    }

    fn author(&self, headers: &HeaderMap) -> Result<EntityRef, BinderError> {
        let principal = self.principals.extract(headers)?;
        Ok(self.services.authors.resolve(&principal))
    }

    /// GET /health
    fn handle_health(&self) -> Result<Response<Full<Bytes>>, BinderError> {
        let mut body = serde_json::json!({
            "status": "ok",
            "entity_types": self.services.registry.len(),
            "relation_kinds": self.kinds,
        });
        if let Some(db) = &self.db {
            let stats = db.stats()?;
            body["binds"] = serde_json::json!(stats.bind_count);
            body["by_kind"] = serde_json::json!(stats.by_kind);
        }
        Ok(response::ok(&body))
    }

    /// POST /{kind}/{action}/ and POST /{action}/
    fn handle_bind(
        &self,
        path_kind: Option<RelationKind>,
        action: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Response<Full<Bytes>>, BinderError> {
        let author = self.author(headers)?;
        let action = BindAction::parse(action)?;
        let payload: BindPayload = parse_body(body)?;

        let kind = match path_kind {
            Some(kind) => kind,
            None => self.body_kind(payload.kind.as_ref())?,
        };
        let target_ct = parse_type_id(payload.target_ct.as_ref())?;
        let target_key = match payload.target_object_id.as_ref() {
            Some(value) => parse_key(value)?,
            None => return Err(BinderError::validation("target_object_id", REQUIRED)),
        };

        let association = &self.services.association;
        match action {
            BindAction::Add => {
                let bind = association.add(&author, &target_ct, &target_key, &kind)?;
                Ok(response::created(&bind))
            }
            BindAction::Remove => {
                association.remove(&author, &target_ct, &target_key, &kind)?;
                Ok(response::no_content())
            }
        }
    }

    /// GET /{kind}/?target_ct=...
    fn handle_list(
        &self,
        kind: RelationKind,
        query: Option<&str>,
        headers: &HeaderMap,
    ) -> Result<Response<Full<Bytes>>, BinderError> {
        let author = self.author(headers)?;
        let query: ListQuery = serde_urlencoded::from_str(query.unwrap_or(""))
            .map_err(|e| BinderError::validation("target_ct", e.to_string()))?;
        let target_ct = query
            .target_ct
            .ok_or_else(|| BinderError::validation("target_ct", REQUIRED))?;

        let targets = self
            .services
            .association
            .list_bound_targets(&author, &target_ct, &kind)?;
        let canonical = self
            .services
            .association
            .resolve_target_type(&target_ct)?
            .type_id()
            .to_string();

        Ok(response::ok(&serde_json::json!({
            "target_ct": canonical,
            "targets": targets.into_iter().map(|t| t.key).collect::<Vec<_>>(),
        })))
    }

    /// POST /{kind}/state/
    fn handle_state(
        &self,
        kind: RelationKind,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Response<Full<Bytes>>, BinderError> {
        let author = self.author(headers)?;
        let payload: StatePayload = parse_body(body)?;

        let target_ct = parse_type_id(payload.target_ct.as_ref())?;
        let descriptor = self.services.association.resolve_target_type(&target_ct)?;

        let candidates = payload
            .target_object_ids
            .iter()
            .map(|value| {
                parse_key(value).map_err(|_| {
                    BinderError::validation("target_object_ids", "Incorrect type. Expected pk value.")
                })
            })
            .map(|key| key.map(|key| descriptor.entity_ref(key)))
            .collect::<Result<Vec<_>, _>>()?;

        let states = self.services.annotator.annotate(
            &author,
            &kind,
            descriptor.type_id(),
            &candidates,
        )?;

        let body: BTreeMap<String, bool> = states
            .into_iter()
            .map(|(target, bound)| (target.key.to_string(), bound))
            .collect();
        Ok(response::ok(&body))
    }

    fn body_kind(&self, value: Option<&Value>) -> Result<RelationKind, BinderError> {
        match value {
            None | Some(Value::Null) => Err(BinderError::validation("type", REQUIRED)),
            Some(Value::String(name)) => self.kind(name).ok_or_else(|| {
                BinderError::validation("type", format!("\"{}\" is not a valid choice.", name))
            }),
            Some(other) => Err(BinderError::validation(
                "type",
                format!("\"{}\" is not a valid choice.", other),
            )),
        }
    }
}

fn parse_body<T: serde::de::DeserializeOwned + Default>(body: &[u8]) -> Result<T, BinderError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(body)?)
}

fn parse_type_id(value: Option<&Value>) -> Result<String, BinderError> {
    match value {
        None | Some(Value::Null) => Err(BinderError::validation("target_ct", REQUIRED)),
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(_) => Err(BinderError::validation("target_ct", "Invalid value.")),
    }
}

fn parse_key(value: &Value) -> Result<EntityKey, BinderError> {
    match value {
        Value::Number(n) => n.as_u64().map(EntityKey::from).ok_or_else(|| {
            BinderError::validation("target_object_id", "Incorrect type. Expected pk value.")
        }),
        Value::String(s) => EntityKey::new(s.as_str()),
        Value::Null => Err(BinderError::validation("target_object_id", REQUIRED)),
        _ => Err(BinderError::validation(
            "target_object_id",
            "Incorrect type. Expected pk value.",
        )),
    }
}

// =============================================================================
// Server
// =============================================================================

/// HTTP server state
pub struct HttpServer {
    api: Arc<BindApi>,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(api: Arc<BindApi>, bind_addr: SocketAddr) -> Self {
        Self { api, bind_addr }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), BinderError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Read the body, then hand off to the synchronous handler
    async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let (parts, body) = req.into_parts();

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(error = %e, "Failed to read request body");
                return Ok(response::json_response(
                    StatusCode::BAD_REQUEST,
                    &serde_json::json!({ "error": "Failed to read body" }),
                ));
            }
        };

        let api = self.api.clone();
        let path = parts.uri.path().to_string();
        let query = parts.uri.query().map(str::to_string);

        // SQLite calls block; keep them off the async workers
        let response = tokio::task::spawn_blocking(move || {
            api.handle(&parts.method, &path, query.as_deref(), &parts.headers, &body)
        })
        .await;

        Ok(response.unwrap_or_else(|e| {
            error_response(BinderError::Internal(format!("Handler task failed: {}", e)))
        }))
    }
}
