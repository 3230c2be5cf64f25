#![warn(future_incompatible, nonstandard_style, rust_2018_idioms, unused)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::similar_names,
    clippy::cast_possible_truncation,
    clippy::too_many_lines
)]

mod client;
pub mod compressor;
mod config;
mod dictionary;
pub mod error;
pub mod frame;
pub mod headers;
pub mod metadata;
mod origin;
mod request;
mod response;
pub mod session;
pub mod session_pool;
pub mod settings;
pub mod socket;
pub mod stream;
mod stream_set;

pub use bytes::Bytes;
pub use client::Client;
pub use config::Configuration;
pub use error::{CodecError, Error, FrameDecodeError, SessionError, StreamError, TransportError};
pub use frame::{Frame, FrameType, StreamId};
pub use origin::Origin;
pub use request::{Method, Request};
pub use response::Response;
pub use url::Url;
