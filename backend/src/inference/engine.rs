use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tch::{CModule, Device, Kind, TchError, Tensor};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to load model from {path}: {source}")]
    Model { path: PathBuf, source: TchError },
    #[error("model probe forward pass failed: {0}")]
    Probe(TchError),
    #[error("model outputs {actual} classes but the label table has {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// The loaded TorchScript module. Immutable after construction; shared
/// read-only across all requests. Forward passes are serialized because a
/// libtorch module shares internal buffers between calls.
pub struct Engine {
    module: Mutex<CModule>,
    device: Device,
    input_size: u32,
}

impl Engine {
    /// Loads the module and probes it with a zero tensor so that a wrong
    /// format or an output width that disagrees with the label table fails
    /// here, before the service ever goes ready.
    pub fn load(path: &Path, input_size: u32, num_classes: usize) -> Result<Self, LoadError> {
        let device = Device::cuda_if_available();
        let module =
            CModule::load_on_device(path, device).map_err(|source| LoadError::Model {
                path: path.to_path_buf(),
                source,
            })?;

        let side = input_size as i64;
        let probe = Tensor::zeros([1, 3, side, side], (Kind::Float, device));
        let output = tch::no_grad(|| module.forward_ts(&[probe])).map_err(LoadError::Probe)?;
        let actual = output.size().last().copied().unwrap_or(0) as usize;
        if actual != num_classes {
            return Err(LoadError::DimensionMismatch {
                expected: num_classes,
                actual,
            });
        }

        log::info!(
            "loaded model from {} on {:?} ({} classes)",
            path.display(),
            device,
            actual
        );

        Ok(Self {
            module: Mutex::new(module),
            device,
            input_size,
        })
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    /// Runs one forward pass and returns the softmaxed probabilities as a
    /// flat vector indexed like the label table.
    pub fn forward(&self, input: &Tensor) -> Result<Vec<f32>, TchError> {
        let input = input.to_device(self.device);
        let output = {
            let module = self.module.lock().unwrap();
            tch::no_grad(|| module.forward_ts(&[input]))?
        };
        let probs = output
            .softmax(-1, Kind::Float)
            .to_kind(Kind::Float)
            .view([-1]);
        let count = probs.size().first().copied().unwrap_or(0) as usize;
        let mut out = vec![0f32; count];
        probs.copy_data(&mut out, count);
        Ok(out)
    }
}
