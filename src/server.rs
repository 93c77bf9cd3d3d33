use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{body::Bytes, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use crate::api_handlers::{json_response, route, ErrorResponse};
use crate::config::ServerConfig;
use crate::logging::{log_error_stderr, log_info};
use crate::session::SessionRegistry;

pub struct AppState {
    pub registry: SessionRegistry,
    pub config: ServerConfig,
}

// Start the HTTP server with Tokio
pub fn start_server(state: Arc<AppState>) -> (tokio::task::JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown_signal = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown_signal);

    let handle = tokio::spawn(async move {
        let config = &state.config;
        let ip = config.host.parse::<std::net::IpAddr>().unwrap_or([127, 0, 0, 1].into());
        let addr = SocketAddr::from((ip, config.port));
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                log_error_stderr(&format!("Failed to start API server on {addr}: {e}"));
                return;
            }
        };
        log_info(&format!("Draw server listening on {addr}"));

        loop {
            if shutdown_clone.load(Ordering::Relaxed) {
                break;
            }

            // Accept with a timeout so the shutdown flag is polled
            let accept_result = tokio::time::timeout(
                std::time::Duration::from_millis(100),
                listener.accept()
            ).await;

            match accept_result {
                Ok(Ok((stream, _))) => {
                    let state = Arc::clone(&state);
                    let io = TokioIo::new(stream);

                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            handle_request(req, Arc::clone(&state))
                        });

                        if let Err(err) = http1::Builder::new()
                            .serve_connection(io, service)
                            .await
                        {
                            log_error_stderr(&format!("Error serving connection: {err:?}"));
                        }
                    });
                }
                Ok(Err(e)) => {
                    log_error_stderr(&format!("Error accepting connection: {e}"));
                    break;
                }
                Err(_) => {
                    // Timeout, check the shutdown flag again
                }
            }
        }
        log_info("API Server shutting down...");
    });

    (handle, shutdown_signal)
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let body = match req.collect().await {
        Ok(body) => body.to_bytes(),
        Err(_) => {
            return Ok(json_response(
                StatusCode::BAD_REQUEST,
                &ErrorResponse { error: "Failed to read request body".to_string() },
            ));
        }
    };

    Ok(route(&state, &method, &path, &body).await)
}
