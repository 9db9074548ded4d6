//! Geometry Gateway
//!
//! Typed FIFO channel to a `GeometryService` running on a worker thread.
//! Requests are sent when the call is made, not when its future is first
//! polled, so responses resolve in call order even with several requests in
//! flight. Every request is answered exactly once; nothing is retried.

use super::gateway_data::{
    ClipBounds, ClipResponse, DecimateParams, DecimateResponse, GatewayMetrics, GatewayShared,
    GeometryRequest, GeometryResponse, ServiceResult,
};
use super::service::GeometryService;
use crate::error::{ErrorContext, MesherError, MesherResult, OptionExt};
use crate::geometry::geometry_data::GeometryBuffers;
use futures::channel::oneshot;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

/// Handle to the worker thread that owns the geometry service
pub struct GeometryGateway {
    sender: Option<flume::Sender<GeometryRequest>>,
    shared: Arc<Mutex<GatewayShared>>,
    worker: Option<thread::JoinHandle<()>>,
}

fn request_name(request: &GeometryRequest) -> &'static str {
    match request {
        GeometryRequest::Decimate { .. } => "decimate",
        GeometryRequest::Clip { .. } => "clip",
    }
}

fn run_request<S: GeometryService>(service: &mut S, request: GeometryRequest) -> ServiceResult {
    match request {
        GeometryRequest::Decimate { buffers, params } => service
            .decimate(buffers, &params)
            .map(GeometryResponse::Decimated),
        GeometryRequest::Clip {
            buffers,
            indices,
            bounds,
        } => service
            .clip(buffers, indices, &bounds)
            .map(GeometryResponse::Clipped),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    }
}

fn worker_loop<S: GeometryService>(
    mut service: S,
    receiver: flume::Receiver<GeometryRequest>,
    shared: Arc<Mutex<GatewayShared>>,
) {
    log::info!("[GeometryGateway::worker] Started");

    while let Ok(request) = receiver.recv() {
        let operation = request_name(&request);
        let result = panic::catch_unwind(AssertUnwindSafe(|| run_request(&mut service, request)))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload);
                log::error!(
                    "[GeometryGateway::worker] Service panicked during {}: {}",
                    operation,
                    message
                );
                Err(format!("service panicked: {}", message))
            });

        let mut shared = shared.lock();
        match &result {
            Ok(_) => shared.metrics.completed += 1,
            Err(reason) => {
                shared.metrics.failed += 1;
                log::warn!(
                    "[GeometryGateway::worker] {} failed: {}",
                    operation,
                    reason
                );
            }
        }

        match shared.pending.pop_front() {
            // A dropped receiver means the caller stopped waiting
            Some(responder) => {
                let _ = responder.send(result);
            }
            None => log::error!(
                "[GeometryGateway::worker] {} finished with no pending request",
                operation
            ),
        }
    }

    // Dropping the responders wakes anyone still waiting with a cancellation
    let abandoned = {
        let mut shared = shared.lock();
        let count = shared.pending.len();
        shared.pending.clear();
        count
    };
    log::info!(
        "[GeometryGateway::worker] Request channel closed, {} requests abandoned",
        abandoned
    );
}

async fn await_response(
    operation: &'static str,
    submitted: MesherResult<oneshot::Receiver<ServiceResult>>,
) -> MesherResult<GeometryResponse> {
    match submitted?.await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(reason)) => Err(MesherError::GatewayFailure {
            operation: operation.to_string(),
            reason,
        }),
        Err(oneshot::Canceled) => Err(MesherError::GatewayFailure {
            operation: operation.to_string(),
            reason: "worker dropped the request".to_string(),
        }),
    }
}

fn unexpected(operation: &'static str, response: &GeometryResponse) -> MesherError {
    MesherError::GatewayFailure {
        operation: operation.to_string(),
        reason: format!("mismatched response {:?}", std::mem::discriminant(response)),
    }
}

impl GeometryGateway {
    /// Start a worker thread that owns `service`
    pub fn spawn<S: GeometryService>(service: S) -> MesherResult<Self> {
        let (sender, receiver) = flume::unbounded();
        let shared = Arc::new(Mutex::new(GatewayShared::default()));

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("geometry-gateway".to_string())
            .spawn(move || worker_loop(service, receiver, worker_shared))
            .context("spawning geometry gateway worker")?;

        Ok(Self {
            sender: Some(sender),
            shared,
            worker: Some(worker),
        })
    }

    /// Queue a request and its responder under one lock, keeping the pending
    /// queue in channel order
    fn submit(&self, request: GeometryRequest) -> MesherResult<oneshot::Receiver<ServiceResult>> {
        let sender = self.sender.as_ref().ok_or_mesher(|| MesherError::ChannelClosed {
            name: "geometry_gateway".to_string(),
        })?;

        let (responder, receiver) = oneshot::channel();
        let mut shared = self.shared.lock();
        sender.send(request)?;
        shared.pending.push_back(responder);
        shared.metrics.submitted += 1;
        Ok(receiver)
    }

    /// Simplify `buffers`; ownership of the buffers moves to the service
    pub fn decimate(
        &self,
        buffers: GeometryBuffers,
        params: DecimateParams,
    ) -> impl Future<Output = MesherResult<DecimateResponse>> {
        let submitted = self.submit(GeometryRequest::Decimate { buffers, params });
        async move {
            match await_response("decimate", submitted).await? {
                GeometryResponse::Decimated(response) => Ok(response),
                other => Err(unexpected("decimate", &other)),
            }
        }
    }

    /// Clip indexed triangles to `bounds`; ownership of the buffers moves to
    /// the service
    pub fn clip(
        &self,
        buffers: GeometryBuffers,
        indices: Vec<u32>,
        bounds: ClipBounds,
    ) -> impl Future<Output = MesherResult<ClipResponse>> {
        let submitted = self.submit(GeometryRequest::Clip {
            buffers,
            indices,
            bounds,
        });
        async move {
            match await_response("clip", submitted).await? {
                GeometryResponse::Clipped(response) => Ok(response),
                other => Err(unexpected("clip", &other)),
            }
        }
    }

    /// Requests sent but not yet answered
    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn metrics(&self) -> GatewayMetrics {
        self.shared.lock().metrics
    }

    /// Close the request channel and wait for the worker to finish what it
    /// already received
    pub fn shutdown(&mut self) {
        if let Some(sender) = self.sender.take() {
            drop(sender);
            log::info!("[GeometryGateway::shutdown] Closing request channel");
        }

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("[GeometryGateway::shutdown] Worker thread panicked");
            }
        }
    }
}

impl Drop for GeometryGateway {
    fn drop(&mut self) {
        self.shutdown();
    }
}
