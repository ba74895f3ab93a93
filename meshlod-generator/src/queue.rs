//! Background LOD generation
//!
//! A [`LodWorker`] owns one thread that takes [`LodRequest`]s off a channel
//! in submission order, runs them on a detached snapshot of the mesh and
//! sends back [`LodResponse`]s. The caller applies a response to its mesh
//! with [`LodResponse::inject`] on whatever thread owns that mesh.

use crate::cost::cost_from_config;
use crate::generator::{LodGenerationReport, MeshLodGenerator};
use crate::input::{BufferInputProvider, LodInputBuffer};
use crate::output::{CompressedOutput, LodOutputBuffer, UncompressedOutput};
use flume::{Receiver, Sender};
use log::{debug, info, warn};
use meshlod_core::{Error, LodConfig, LodMesh, Result};
use std::thread::{self, JoinHandle};

/// One mesh to process in the background.
#[derive(Debug, Clone)]
pub struct LodRequest {
    pub mesh_name: String,
    pub input: LodInputBuffer,
    pub config: LodConfig,
}

impl LodRequest {
    /// Snapshot `mesh` so the request no longer borrows it.
    pub fn new(mesh: &LodMesh, config: LodConfig) -> Self {
        Self {
            mesh_name: mesh.name.clone(),
            input: LodInputBuffer::from_mesh(mesh),
            config,
        }
    }
}

#[derive(Debug)]
pub struct LodResponse {
    pub mesh_name: String,
    pub config: LodConfig,
    pub output: LodOutputBuffer,
    pub report: Result<LodGenerationReport>,
}

/// Hooks around [`LodResponse::inject`].
pub trait LodInjectorListener {
    /// Return false to drop the response instead of injecting it.
    fn should_inject(&mut self, _response: &LodResponse) -> bool {
        true
    }

    fn injection_completed(&mut self, _response: &LodResponse) {}
}

impl LodResponse {
    /// Replace the generated levels of `mesh` with this response.
    ///
    /// Returns `Ok(false)` when the listener vetoed the injection.
    pub fn inject(
        &self,
        mesh: &mut LodMesh,
        listener: Option<&mut dyn LodInjectorListener>,
    ) -> Result<bool> {
        if let Err(err) = &self.report {
            return Err(Error::Algorithm(format!(
                "LOD generation of {} failed: {}",
                self.mesh_name, err
            )));
        }
        if mesh.name != self.mesh_name {
            return Err(Error::InvalidData(format!(
                "response for {} injected into {}",
                self.mesh_name, mesh.name
            )));
        }
        match listener {
            Some(listener) => {
                if !listener.should_inject(self) {
                    debug!("{}: injection vetoed", self.mesh_name);
                    return Ok(false);
                }
                self.output.inject(mesh)?;
                listener.injection_completed(self);
            }
            None => self.output.inject(mesh)?,
        }
        Ok(true)
    }
}

fn process(generator: &MeshLodGenerator, request: LodRequest) -> LodResponse {
    let LodRequest {
        mesh_name,
        input,
        config,
    } = request;
    debug!("{}: generating {} LOD levels", mesh_name, config.levels.len());
    let mut output = LodOutputBuffer::new(input.submeshes.len());
    let provider = BufferInputProvider::new(input);
    let mut cost = cost_from_config(&config.advanced);
    let report = if config.advanced.use_compression {
        generator.generate_with(
            &provider,
            &mut cost,
            &mut CompressedOutput::new(&mut output),
            &config,
        )
    } else {
        generator.generate_with(
            &provider,
            &mut cost,
            &mut UncompressedOutput::new(&mut output),
            &config,
        )
    };
    if let Err(err) = &report {
        warn!("{}: LOD generation failed: {}", mesh_name, err);
    }
    LodResponse {
        mesh_name,
        config,
        output,
        report,
    }
}

/// A named thread generating LODs for queued requests.
pub struct LodWorker {
    requests: Option<Sender<LodRequest>>,
    /// Second handle on the request queue, for dropping pending work.
    pending: Receiver<LodRequest>,
    responses: Receiver<LodResponse>,
    handle: Option<JoinHandle<()>>,
}

impl LodWorker {
    pub fn spawn() -> Result<Self> {
        Self::with_generator(MeshLodGenerator::new())
    }

    pub fn with_generator(generator: MeshLodGenerator) -> Result<Self> {
        let (request_tx, request_rx) = flume::unbounded::<LodRequest>();
        let (response_tx, response_rx) = flume::unbounded();
        let pending = request_rx.clone();
        let handle = thread::Builder::new()
            .name("meshlod-worker".into())
            .spawn(move || {
                info!("LOD worker started");
                for request in request_rx.iter() {
                    let response = process(&generator, request);
                    if response_tx.send(response).is_err() {
                        break;
                    }
                }
                info!("LOD worker stopped");
            })
            .map_err(|e| Error::Channel(format!("cannot start LOD worker: {}", e)))?;
        Ok(Self {
            requests: Some(request_tx),
            pending,
            responses: response_rx,
            handle: Some(handle),
        })
    }

    pub fn submit(&self, request: LodRequest) -> Result<()> {
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| Error::Channel("LOD worker is shut down".into()))?;
        requests
            .send(request)
            .map_err(|_| Error::Channel("LOD worker is gone".into()))
    }

    /// Drop every request the worker has not started yet.
    pub fn clear_pending_requests(&self) -> usize {
        let dropped = self.pending.drain().count();
        if dropped > 0 {
            debug!("dropped {} pending LOD requests", dropped);
        }
        dropped
    }

    pub fn responses(&self) -> &Receiver<LodResponse> {
        &self.responses
    }

    pub fn try_recv(&self) -> Option<LodResponse> {
        self.responses.try_recv().ok()
    }

    /// Block until the next response arrives.
    pub fn recv(&self) -> Result<LodResponse> {
        self.responses
            .recv()
            .map_err(|_| Error::Channel("LOD worker stopped before responding".into()))
    }

    /// Finish the queued requests, stop the thread and return the
    /// responses nobody received yet.
    pub fn shutdown(mut self) -> Vec<LodResponse> {
        self.stop();
        self.responses.drain().collect()
    }

    fn stop(&mut self) {
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("LOD worker panicked");
            }
        }
    }
}

impl Drop for LodWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
