//! Per-connection HTTP/1.1 handler.
//!
//! Every request on the connection, whatever its method or path, goes
//! through the [`Pipeline`].

use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, Instrument};

use crate::pipeline::Pipeline;

/// Spawns the task serving one accepted connection. The permit is held for
/// the lifetime of the connection; the graceful watcher lets shutdown wait
/// for it.
///
/// A client that does not deliver a complete request head within
/// `read_timeout` (idle keep-alive included) is disconnected, which frees
/// the permit.
pub(crate) fn spawn_connection(
    stream: TcpStream,
    client_addr: SocketAddr,
    permit: OwnedSemaphorePermit,
    pipeline: Arc<Pipeline>,
    graceful: &GracefulShutdown,
    read_timeout: Duration,
) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let pipeline = pipeline.clone();
        async move { Ok::<_, Infallible>(pipeline.handle(req).await) }
    });

    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(read_timeout)
        .keep_alive(true)
        .serve_connection(io, service);
    let conn = graceful.watch(conn);

    let span = tracing::info_span!("worker_connection", client_addr = %client_addr);
    tokio::spawn(
        async move {
            let _permit = permit;
            debug!(target: "cachet::worker", "Worker spawned for incoming connection");

            if let Err(e) = conn.await {
                debug!(
                    target: "cachet::worker",
                    error = ?e,
                    "Connection closed with an error"
                );
            } else {
                debug!(target: "cachet::worker", "Connection handled successfully");
            }
        }
        .instrument(span),
    );
}
