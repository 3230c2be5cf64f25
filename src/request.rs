//! Caller-facing request construction: method/url/headers/body folded
//! into a canonicalized header block plus a [`BodySource`] (spec §6
//! "Caller-facing contract"). Shape follows the teacher's `Request`, with
//! pseudo-headers and priority generalized for SPDY submission.

use crate::headers::{canonicalize, HeaderBlock};
use crate::origin::Origin;
use crate::stream::BodySource;
use bytes::Bytes;
use url::Url;

#[derive(Debug, Clone, derive_more::Display)]
pub enum Method {
    #[display(fmt = "GET")]
    Get,
    #[display(fmt = "POST")]
    Post,
    #[display(fmt = "PUT")]
    Put,
    #[display(fmt = "DELETE")]
    Delete,
    #[display(fmt = "HEAD")]
    Head,
    #[display(fmt = "PATCH")]
    Patch,
    #[display(fmt = "OPTIONS")]
    Options,
    #[display(fmt = "{}", _0)]
    Other(String),
}

pub struct Request {
    pub url: Url,
    pub headers: HeaderBlock,
    pub body: Bytes,
    pub priority: u8,
}

impl Request {
    pub fn new(
        method: Method,
        url: Url,
        extra_headers: impl IntoIterator<Item = (String, String)>,
        body: impl Into<Bytes>,
    ) -> Result<Self, crate::origin::OriginError> {
        let origin = Origin::from_url(&url)?;
        let mut pairs = vec![
            (":method".to_owned(), method.to_string()),
            (":scheme".to_owned(), origin.scheme.clone()),
            (":path".to_owned(), path_and_query(&url)),
            (":host".to_owned(), origin.authority()),
            (":version".to_owned(), "HTTP/1.1".to_owned()),
        ];
        pairs.extend(extra_headers);
        Ok(Self {
            url,
            headers: canonicalize(pairs),
            body: body.into(),
            priority: 0,
        })
    }

    pub fn get(url: Url) -> Result<Self, crate::origin::OriginError> {
        Self::new(Method::Get, url, [], Bytes::new())
    }

    pub fn post(url: Url, body: impl Into<Bytes>) -> Result<Self, crate::origin::OriginError> {
        Self::new(Method::Post, url, [], body)
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(7);
        self
    }

    pub fn origin(&self) -> Result<Origin, crate::origin::OriginError> {
        Origin::from_url(&self.url)
    }

    pub fn body_source(&self) -> BodySource {
        BodySource::Memory(self.body.clone())
    }
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_owned(),
    }
}
