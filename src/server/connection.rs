// Connection handling module
// Accepts a single TCP connection and serves it with the dispatcher

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpStream;

use super::ServeSettings;
use crate::handler::Dispatcher;
use crate::logger::{self, AccessLogEntry};

/// Accept a connection, enforcing the connection limit
pub fn accept_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    dispatcher: &Arc<Dispatcher>,
    settings: &Arc<ServeSettings>,
    conn_counter: &Arc<AtomicUsize>,
) {
    // Increment counter first, then check limit (prevents race condition)
    let prev_count = conn_counter.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = settings.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            conn_counter.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!("Max connections reached: {prev_count}/{max_conn}. Connection rejected.");
            drop(stream);
            return;
        }
    }

    logger::log_connection_accepted(&peer_addr);

    handle_connection(
        stream,
        peer_addr,
        Arc::clone(dispatcher),
        Arc::clone(settings),
        Arc::clone(conn_counter),
    );
}

/// Serve one connection in its own task
///
/// Every request on the connection goes through [`Dispatcher::dispatch`].
/// Only reading request headers is time-bounded; a request that is being
/// dispatched is never cut off by the transport.
fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    settings: Arc<ServeSettings>,
    conn_counter: Arc<AtomicUsize>,
) {
    tokio::spawn(async move {
        let io = TokioIo::new(stream);
        let mut builder = http1::Builder::new();
        builder
            .keep_alive(settings.keep_alive)
            .timer(TokioTimer::new())
            .header_read_timeout(settings.header_read_timeout);

        let service_settings = Arc::clone(&settings);
        let conn = builder.serve_connection(
            io,
            service_fn(move |req| {
                let dispatcher = Arc::clone(&dispatcher);
                let settings = Arc::clone(&service_settings);
                async move {
                    let started = Instant::now();
                    let entry = settings
                        .access_log
                        .then(|| AccessLogEntry::from_request(&req, Some(peer_addr)));

                    let resp = dispatcher.dispatch(req).await;

                    if let Some(mut entry) = entry {
                        entry.finish(
                            resp.status().as_u16(),
                            resp.body().size_hint().exact(),
                            started.elapsed(),
                        );
                        logger::log_access(&entry, &settings.access_log_format);
                    }
                    Ok::<_, Infallible>(resp)
                }
            }),
        );

        if let Err(err) = conn.await {
            if err.is_timeout() {
                tracing::debug!(%peer_addr, "Connection closed: header read timeout");
            } else {
                logger::log_connection_error(&err);
            }
        }

        conn_counter.fetch_sub(1, Ordering::SeqCst);
    });
}
