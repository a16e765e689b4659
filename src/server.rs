// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! HTTP listener for the decoy surface.
//!
//! Serves `robots.txt` directly; every other request is unmatched by design
//! and falls through to the [`Responder`]. The tarpit plan is rendered as a
//! channel-backed streaming body driven by a spawned task, so a stalled
//! scanner occupies only its own task between chunks.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use hyper::body::Bytes;
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use serde_json::{Map, Value};

use crate::responder::{Responder, ResponsePlan};

/// Start the listener on the given bind address and port. Runs indefinitely.
pub async fn run_server(bind: &str, port: u16, responder: Arc<Responder>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;

    let make_svc = make_service_fn(move |conn: &AddrStream| {
        let responder = responder.clone();
        let remote = conn.remote_addr();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| dispatch(req, responder.clone(), remote)))
        }
    });

    eprintln!("clawtrap listening on {}", addr);
    Server::bind(&addr).serve(make_svc).await?;
    Ok(())
}

async fn dispatch(
    req: Request<Body>,
    responder: Arc<Responder>,
    remote: SocketAddr,
) -> Result<Response<Body>, Infallible> {
    if req.method() == &hyper::Method::GET && req.uri().path() == "/robots.txt" {
        return Ok(robots_response());
    }
    Ok(fallthrough(req, responder, remote.ip().to_string()).await)
}

/// Unpack a hyper request and run it through the engine.
async fn fallthrough(req: Request<Body>, responder: Arc<Responder>, observed: String) -> Response<Body> {
    let (parts, body) = req.into_parts();
    let method = parts.method.as_str().to_string();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().map(|q| q.to_string());

    let mut headers = HashMap::new();
    for (name, value) in parts.headers.iter() {
        if let Ok(v) = value.to_str() {
            headers.insert(name.as_str().to_string(), v.to_string());
        }
    }

    let body_bytes = hyper::body::to_bytes(body).await.unwrap_or_default();
    let body_map = parse_json_body(&headers, &body_bytes);

    match responder.handle(headers, &method, &observed, &path, query, body_map).await {
        Ok(plan) => render_plan(plan),
        Err(e) => {
            tracing::error!("request handling failed: {:#}", e);
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::from("Internal Server Error"))
                .unwrap()
        }
    }
}

/// Only declared-JSON object bodies count; anything else is an empty body.
fn parse_json_body(headers: &HashMap<String, String>, bytes: &[u8]) -> Option<Map<String, Value>> {
    let content_type = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .map(|(_, v)| v.as_str())?;
    if content_type != "application/json" {
        return None;
    }
    match serde_json::from_slice::<Value>(bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn render_plan(plan: ResponsePlan) -> Response<Body> {
    match plan {
        ResponsePlan::Reject404 => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("404 Not Found"))
            .unwrap(),
        ResponsePlan::HoneypotReplay(content) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain")
            .header("Access-Control-Allow-Origin", "*")
            .header("Content-Length", content.len())
            .body(Body::from(content))
            .unwrap(),
        ResponsePlan::Empty200 => Response::builder()
            .status(StatusCode::OK)
            .body(Body::empty())
            .unwrap(),
        ResponsePlan::Tarpit { chunk, interval, max_chunks } => {
            let (sender, body) = Body::channel();
            tokio::spawn(stream_tarpit(sender, chunk, interval, max_chunks));
            Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain")
                .body(body)
                .unwrap()
        }
    }
}

/// Emit `chunk` then suspend, up to `max_chunks` times. A failed send means
/// the peer hung up; that ends the stream as a normal completion. Running to
/// the ceiling closes the body empty-handed with the 200 already on the wire.
async fn stream_tarpit(mut sender: hyper::body::Sender, chunk: Bytes, interval: Duration, max_chunks: u32) {
    for sent in 0..max_chunks {
        if sender.send_data(chunk.clone()).await.is_err() {
            tracing::debug!("tarpit peer disconnected after {} chunks", sent);
            return;
        }
        tokio::time::sleep(interval).await;
    }
    tracing::debug!("tarpit ran to its {} chunk ceiling", max_chunks);
}

fn robots_response() -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/plain")
        .body(Body::from("User-agent: *\nAllow: *"))
        .unwrap()
}
