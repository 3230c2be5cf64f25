//! The top-level facade: submit a [`Request`], get back a [`Response`].
//! Mirrors the teacher's `Client` (default-constructed rustls config,
//! `get`/request methods returning `anyhow::Result`), generalized from a
//! single blocking HTTP/2 round trip to a pooled, async SPDY one.

use crate::config::Configuration;
use crate::request::Request;
use crate::response::{self, Response};
use crate::session::SubmitRequest;
use crate::session_pool::{new_event_channel, SessionPool};
use anyhow::Context;

pub struct Client {
    pool: SessionPool,
}

impl Client {
    pub fn new(config: Configuration) -> Self {
        Self {
            pool: SessionPool::new(config),
        }
    }

    pub async fn send(&self, request: Request) -> anyhow::Result<Response> {
        let origin = request.origin().context("invalid request URL")?;
        let (tx, rx) = new_event_channel();
        let body = request.body_source();
        let submit = SubmitRequest {
            headers: request.headers,
            body,
            priority: request.priority,
            events: tx,
        };
        self.pool
            .submit(&origin, submit)
            .await
            .context("submitting request")?;
        response::collect(rx).await.context("awaiting response")
    }

    pub async fn get(&self, url: url::Url) -> anyhow::Result<Response> {
        self.send(Request::get(url)?).await
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(Configuration::default())
    }
}
