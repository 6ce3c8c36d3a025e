//! Audio context: the renderer plus the driver pulling from it

use super::render::Renderer;
use crate::audio::output::OutputDriver;
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Owns the engine clock (through the renderer) and the output driver
#[derive(Clone)]
pub struct AudioContext {
    renderer: Arc<Renderer>,
    driver: Arc<dyn OutputDriver>,
}

impl AudioContext {
    /// Pair a renderer with the driver that pulls from it.
    ///
    /// # Errors
    /// `Error::EngineUnavailable` if their sample rates disagree.
    pub fn new(renderer: Arc<Renderer>, driver: Arc<dyn OutputDriver>) -> Result<Self> {
        if renderer.sample_rate() != driver.sample_rate() {
            return Err(Error::EngineUnavailable(format!(
                "Renderer runs at {}Hz but the output runs at {}Hz",
                renderer.sample_rate(),
                driver.sample_rate()
            )));
        }
        Ok(Self { renderer, driver })
    }

    pub fn renderer(&self) -> &Arc<Renderer> {
        &self.renderer
    }

    pub fn sample_rate(&self) -> u32 {
        self.renderer.sample_rate()
    }

    /// Engine clock in seconds
    pub fn current_time(&self) -> f64 {
        self.renderer.clock().now()
    }

    pub fn is_running(&self) -> bool {
        self.driver.is_running()
    }

    /// Start the output if it is suspended.
    ///
    /// The driver call may block (device thread round trip), so it runs on the
    /// blocking pool.
    pub async fn resume(&self) -> Result<()> {
        if self.driver.is_running() {
            return Ok(());
        }
        let driver = self.driver.clone();
        tokio::task::spawn_blocking(move || driver.resume()).await??;
        info!("Audio context resumed at {}Hz", self.sample_rate());
        Ok(())
    }

    pub async fn suspend(&self) -> Result<()> {
        if !self.driver.is_running() {
            return Ok(());
        }
        let driver = self.driver.clone();
        tokio::task::spawn_blocking(move || driver.suspend()).await??;
        debug!("Audio context suspended at {:.3}s", self.current_time());
        Ok(())
    }
}
