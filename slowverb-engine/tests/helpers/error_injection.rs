//! Node factories that simulate missing platform features

use slowverb_engine::dsp::{Analyser, AnalyserSettings, AnalyserTap, Convolver, ConvolverKernel};
use slowverb_engine::graph::NodeFactory;
use slowverb_engine::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Every convolver request fails, as on a runtime without convolution support
#[derive(Default)]
pub struct NoConvolverFactory {
    pub attempts: AtomicUsize,
}

impl NodeFactory for NoConvolverFactory {
    fn create_convolver(&self, _kernel: Arc<ConvolverKernel>) -> Result<Convolver> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::CapabilityDegraded(
            "convolution is not supported".to_string(),
        ))
    }
}

/// Even the basic graph cannot be built
#[derive(Default)]
pub struct NoAnalyserFactory;

impl NodeFactory for NoAnalyserFactory {
    fn create_analyser(&self, _settings: AnalyserSettings) -> Result<(Analyser, AnalyserTap)> {
        Err(Error::EngineUnavailable("no audio subsystem".to_string()))
    }
}
