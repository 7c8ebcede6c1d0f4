use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use thiserror::Error;
use tracing::{debug, warn};

use crate::manager::ShaderManager;

type Task = Box<dyn FnOnce(&mut ShaderManager) + Send>;

enum RenderCommand {
    Run(Task),
    Shutdown,
}

#[derive(Debug, Error)]
pub enum RenderThreadError {
    #[error("failed to spawn render thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("render thread has stopped")]
    Disconnected,
    #[error("render thread panicked")]
    Panicked,
}

/// Dedicated thread that owns the `ShaderManager`.
///
/// Tasks run one at a time in submission order. Everything that touches the
/// GPU goes through here.
pub struct RenderThread {
    commands: Sender<RenderCommand>,
    join_handle: Option<JoinHandle<()>>,
}

impl RenderThread {
    pub fn spawn(manager: ShaderManager) -> Result<Self, RenderThreadError> {
        let (commands, inbox) = unbounded();
        let handle = thread::Builder::new()
            .name("shaderlay-render".into())
            .spawn(move || run_render_thread(manager, inbox))
            .map_err(RenderThreadError::Spawn)?;
        Ok(Self {
            commands,
            join_handle: Some(handle),
        })
    }

    /// Queues `job`; its result arrives on the returned receiver.
    pub fn submit<T, F>(&self, job: F) -> Result<Receiver<T>, RenderThreadError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ShaderManager) -> T + Send + 'static,
    {
        let (reply_tx, reply_rx) = bounded(1);
        let task: Task = Box::new(move |manager: &mut ShaderManager| {
            let _ = reply_tx.send(job(manager));
        });
        self.commands
            .send(RenderCommand::Run(task))
            .map_err(|_| RenderThreadError::Disconnected)?;
        Ok(reply_rx)
    }

    /// Submits `job` and blocks until it has run.
    pub fn call<T, F>(&self, job: F) -> Result<T, RenderThreadError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ShaderManager) -> T + Send + 'static,
    {
        self.submit(job)?
            .recv()
            .map_err(|_| RenderThreadError::Disconnected)
    }

    /// Runs every queued task, releases GPU programs and joins the thread.
    pub fn shutdown(mut self) -> Result<(), RenderThreadError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), RenderThreadError> {
        let Some(handle) = self.join_handle.take() else {
            return Ok(());
        };
        let _ = self.commands.send(RenderCommand::Shutdown);
        handle.join().map_err(|_| RenderThreadError::Panicked)
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "render thread did not stop cleanly");
        }
    }
}

fn run_render_thread(mut manager: ShaderManager, inbox: Receiver<RenderCommand>) {
    debug!("render thread started");
    for command in inbox.iter() {
        match command {
            RenderCommand::Run(task) => task(&mut manager),
            RenderCommand::Shutdown => break,
        }
    }
    manager.cleanup();
    debug!("render thread stopped");
}
