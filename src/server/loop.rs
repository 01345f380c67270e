// Server loop module
// Accepts connections until the shutdown future resolves

use std::future::Future;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::connection::accept_connection;
use super::ServeSettings;
use crate::handler::Dispatcher;

/// Accept loop
///
/// Connections already being served keep running after shutdown; only new
/// connections stop being accepted.
pub async fn start_server_loop<S>(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    settings: Arc<ServeSettings>,
    shutdown: S,
) -> std::io::Result<()>
where
    S: Future<Output = ()>,
{
    let active_connections = Arc::new(AtomicUsize::new(0));
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(
                            stream,
                            peer_addr,
                            &dispatcher,
                            &settings,
                            &active_connections,
                        );
                    }
                    Err(e) => tracing::error!("Failed to accept connection: {e}"),
                }
            }

            () = &mut shutdown => {
                tracing::info!(
                    addr = ?listener.local_addr().ok(),
                    "Shutdown requested, no longer accepting connections"
                );
                return Ok(());
            }
        }
    }
}
