//! Component H: per-origin pool of sessions, dispatch of pending streams,
//! and REFUSED_STREAM/GOAWAY retry. Grounded on
//! `original_source/SPDY/SPDYSessionPool.h`; the bound + retry policy is
//! spec §4.H / §9's resolved Open Question (cap 3, configurable).

use crate::config::Configuration;
use crate::error::Error;
use crate::origin::Origin;
use crate::session::{Session, StreamEvent, SubmitRequest};
use crate::settings::SettingsStore;
use crate::socket;
use dashmap::DashMap;
use log::warn;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::ClientConfig;

type ActiveSession = Arc<Mutex<Session<TlsStream<tokio::net::TcpStream>>>>;

/// Process-wide registry of sessions keyed by [`Origin`] (spec §4.H,
/// §5 "Shared resources": lookups and creation are atomic per origin).
pub struct SessionPool {
    config: Configuration,
    tls_config: Arc<ClientConfig>,
    settings: Arc<SettingsStore>,
    sessions: Arc<DashMap<Origin, Vec<ActiveSession>>>,
}

impl SessionPool {
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            tls_config: socket::default_tls_config(),
            settings: Arc::new(SettingsStore::new()),
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Picks an established session for `origin`, opening a fresh one (up
    /// to `session_pool_size`) when none is eligible, then submits the
    /// stream. Retries on REFUSED_STREAM / GOAWAY past last-good-id on a
    /// fresh session up to `max_refused_stream_retries` times.
    pub async fn submit(&self, origin: &Origin, request: SubmitRequest) -> Result<(), Error> {
        // Only in-memory bodies can be replayed on a fresh session after a
        // REFUSED_STREAM/GOAWAY retry; a one-shot reader body forfeits
        // retry (spec §4.H leaves the cap configurable, not the
        // replayability of arbitrary body sources).
        let replay = match &request.body {
            crate::stream::BodySource::Memory(bytes) => {
                Some((request.headers.clone(), bytes.clone(), request.priority))
            }
            crate::stream::BodySource::Reader(_) => None,
        };

        let events = request.events.clone();
        let mut pending = Some(request);
        let mut attempts = 0;
        loop {
            let session = self.acquire(origin).await?;
            let request = pending.take().expect("request rebuilt on every retry");
            let result = {
                let mut guard = session.lock().await;
                guard.submit(request).await
            };
            match result {
                Ok(_) => return Ok(()),
                Err(err) if attempts < self.config.max_refused_stream_retries => {
                    let Some((headers, body, priority)) = replay.clone() else {
                        return Err(err);
                    };
                    attempts += 1;
                    warn!("stream refused on {origin}, retrying ({attempts}): {err}");
                    pending = Some(SubmitRequest {
                        headers,
                        body: crate::stream::BodySource::Memory(body),
                        priority,
                        events: events.clone(),
                    });
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn acquire(&self, origin: &Origin) -> Result<ActiveSession, Error> {
        {
            let entry = self.sessions.get(origin);
            if let Some(sessions) = entry {
                for session in sessions.iter() {
                    let guard = session.lock().await;
                    if !guard.is_going_away() && !guard.is_closed() {
                        drop(guard);
                        return Ok(session.clone());
                    }
                }
            }
        }

        let at_capacity = self
            .sessions
            .get(origin)
            .map(|s| s.len() >= self.config.session_pool_size)
            .unwrap_or(false);
        if at_capacity {
            return Err(Error::Other(format!(
                "session pool for {origin} is at capacity"
            )));
        }

        let stream = socket::connect(
            &origin.host,
            origin.port,
            self.config.connect_timeout,
            self.tls_config.clone(),
        )
        .await?;
        let mut session = Session::new(
            stream,
            origin.clone(),
            self.config.clone(),
            self.settings.clone(),
        );
        session.establish().await?;
        let session = Arc::new(Mutex::new(session));
        self.sessions
            .entry(origin.clone())
            .or_default()
            .push(session.clone());
        spawn_pump(self.sessions.clone(), origin.clone(), session.clone());
        Ok(session)
    }
}

/// Spawns the read/scheduler loop for every session of an origin; in
/// practice one task per `Session` (spec §5: "each Session runs on a
/// single logical execution context"). On exit the session is reaped
/// from the pool so `acquire` never hands out a dead connection.
fn spawn_pump(sessions: Arc<DashMap<Origin, Vec<ActiveSession>>>, origin: Origin, session: ActiveSession) {
    tokio::spawn(async move {
        loop {
            let result = {
                let mut guard = session.lock().await;
                guard.poll().await
            };
            if result.is_err() {
                break;
            }
        }
        if let Some(mut entry) = sessions.get_mut(&origin) {
            entry.retain(|s| !Arc::ptr_eq(s, &session));
        }
        sessions.remove_if(&origin, |_, v| v.is_empty());
    });
}

/// A one-shot event receiver convenience for callers that just want a
/// single stream's events without wiring their own channel.
pub fn new_event_channel() -> (mpsc::UnboundedSender<StreamEvent>, mpsc::UnboundedReceiver<StreamEvent>) {
    mpsc::unbounded_channel()
}
