use crate::error::{LoadError, RunError};
use crate::matting::{self, CutoutResult, Device, MattingModel, MAX_BOX_SIZE};
use image::DynamicImage;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Lifecycle of the single model slot.
///
/// `Loading` is the transient state between retiring the previous handle and
/// committing the new one; a failed load lands back in `Unloaded`, never in
/// a stale `Ready`.
enum ModelState {
    Unloaded,
    Loading,
    Ready(Box<dyn MattingModel>),
}

/// Owner of the one loaded model and arbiter of access to it.
///
/// A single mutex covers the entire `load` and the entire `run` call, not
/// just the state transitions. Requests serialize: the model is never read
/// while being swapped, and two inferences never race on whatever per-call
/// state the runtime holds internally.
pub struct ModelManager {
    slot: Mutex<ModelState>,
}

impl ModelManager {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(ModelState::Unloaded),
        }
    }

    /// Load (or reload) the model from an ONNX file.
    ///
    /// Any previously loaded model is retired before deserialization starts,
    /// so a failed reload leaves the manager unloaded rather than serving
    /// the old weights as if the reload had succeeded.
    pub fn load(&self, path: &Path, device: Device) -> Result<(), LoadError> {
        self.load_with(|| matting::load_model(path, device))
    }

    fn load_with<F>(&self, loader: F) -> Result<(), LoadError>
    where
        F: FnOnce() -> Result<Box<dyn MattingModel>, LoadError>,
    {
        let mut slot = self.lock_slot();

        // Retire the old handle before touching the new artifact
        *slot = ModelState::Loading;

        match loader() {
            Ok(model) => {
                tracing::info!("Model ready on {:?}", model.device());
                *slot = ModelState::Ready(model);
                Ok(())
            }
            Err(err) => {
                tracing::warn!("Model load failed: {}", err);
                *slot = ModelState::Unloaded;
                Err(err)
            }
        }
    }

    /// Run the full preprocess -> forward -> composite pipeline on one image.
    ///
    /// `box_size` is validated before the model lock is taken, so malformed
    /// requests never queue behind a load or another inference.
    pub fn run(&self, image: &DynamicImage, box_size: u32) -> Result<CutoutResult, RunError> {
        Self::validate_box_size(box_size)?;

        let start = Instant::now();
        let mut slot = self.lock_slot();
        let model = match &mut *slot {
            ModelState::Ready(model) => model,
            _ => return Err(RunError::NotLoaded),
        };

        let source = matting::flatten_to_rgb(image);
        let input = matting::to_model_input(&source, box_size);
        let saliency = model.forward(&input)?;
        let result = matting::composite(&source, &saliency);

        let (width, height) = result.image.dimensions();
        tracing::info!(
            "Matted {}x{} image at box {} in {:.1}ms",
            width,
            height,
            box_size,
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(result)
    }

    /// Bounds check shared by the manager and the service boundary.
    pub fn validate_box_size(box_size: u32) -> Result<(), RunError> {
        if box_size == 0 || box_size > MAX_BOX_SIZE {
            return Err(RunError::InvalidBoxSize(box_size));
        }
        Ok(())
    }

    fn lock_slot(&self) -> MutexGuard<'_, ModelState> {
        // A panicked holder cannot leave the slot half-written: every
        // transition stores a whole ModelState value.
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use ndarray::{Array2, Array4};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    /// Test double returning a uniform matte at the input's resolution.
    struct ConstantMatte(f32);

    impl MattingModel for ConstantMatte {
        fn forward(&mut self, input: &Array4<f32>) -> Result<Array2<f32>, RunError> {
            let edge = input.dim().2;
            Ok(Array2::from_elem((edge, edge), self.0))
        }

        fn device(&self) -> Device {
            Device::Cpu
        }
    }

    fn loaded_manager(alpha: f32) -> ModelManager {
        let manager = ModelManager::new();
        manager
            .load_with(|| Ok(Box::new(ConstantMatte(alpha))))
            .unwrap();
        manager
    }

    fn rgb_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 60, 30])))
    }

    #[test]
    fn run_before_load_is_rejected() {
        let manager = ModelManager::new();
        for _ in 0..3 {
            assert!(matches!(
                manager.run(&rgb_image(8, 8), 16),
                Err(RunError::NotLoaded)
            ));
        }
    }

    #[test]
    fn run_returns_source_resolution() {
        let manager = loaded_manager(1.0);
        let result = manager.run(&rgb_image(512, 384), 1024).unwrap();
        assert_eq!(result.image.dimensions(), (512, 384));
        assert_eq!(result.matte.dimensions(), (512, 384));
    }

    #[test]
    fn output_alpha_is_the_computed_matte() {
        // Source alpha is zero everywhere; a blend would keep it at zero
        let manager = loaded_manager(1.0);
        let source = RgbaImage::from_pixel(10, 10, Rgba([1, 2, 3, 0]));
        let result = manager
            .run(&DynamicImage::ImageRgba8(source), 8)
            .unwrap();
        assert!(result.image.pixels().all(|p| p[3] == 255));
        assert_eq!(result.image.get_pixel(0, 0)[0], 1);
    }

    #[test]
    fn repeated_runs_are_bit_identical() {
        let manager = loaded_manager(0.6);
        let image = rgb_image(33, 21);
        let first = manager.run(&image, 17).unwrap();
        let second = manager.run(&image, 17).unwrap();
        assert_eq!(first.image.as_raw(), second.image.as_raw());
        assert_eq!(first.matte.as_raw(), second.matte.as_raw());
    }

    #[test]
    fn zero_box_size_fails_without_taking_the_lock() {
        let manager = std::sync::Arc::new(ModelManager::new());
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let background = {
            let manager = manager.clone();
            thread::spawn(move || {
                manager.load_with(move || {
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok(Box::new(ConstantMatte(1.0)) as Box<dyn MattingModel>)
                })
            })
        };

        // Lock is held by the in-flight load; validation must still answer
        entered_rx.recv().unwrap();
        assert!(matches!(
            manager.run(&rgb_image(4, 4), 0),
            Err(RunError::InvalidBoxSize(0))
        ));
        assert!(matches!(
            manager.run(&rgb_image(4, 4), MAX_BOX_SIZE + 1),
            Err(RunError::InvalidBoxSize(_))
        ));

        release_tx.send(()).unwrap();
        background.join().unwrap().unwrap();
    }

    #[test]
    fn run_waits_for_in_flight_load() {
        let manager = std::sync::Arc::new(ModelManager::new());
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let load_thread = {
            let manager = manager.clone();
            thread::spawn(move || {
                manager.load_with(move || {
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok(Box::new(ConstantMatte(1.0)) as Box<dyn MattingModel>)
                })
            })
        };
        entered_rx.recv().unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let run_thread = {
            let manager = manager.clone();
            thread::spawn(move || {
                let result = manager.run(&rgb_image(4, 4), 8);
                done_tx.send(()).unwrap();
                result
            })
        };

        // The run must not finish while the load still owns the slot
        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());

        release_tx.send(()).unwrap();
        load_thread.join().unwrap().unwrap();

        // Once the load commits, the queued run sees a whole, ready model
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(run_thread.join().unwrap().is_ok());
    }

    #[test]
    fn failed_reload_reverts_to_unloaded() {
        let manager = loaded_manager(1.0);
        assert!(manager.run(&rgb_image(4, 4), 8).is_ok());

        let err = manager
            .load_with(|| Err(LoadError::CorruptWeights("bad artifact".into())))
            .unwrap_err();
        assert!(matches!(err, LoadError::CorruptWeights(_)));

        // The earlier model must not have survived the failed swap
        assert!(matches!(
            manager.run(&rgb_image(4, 4), 8),
            Err(RunError::NotLoaded)
        ));
    }

    #[test]
    fn missing_model_file_reports_not_found() {
        let manager = ModelManager::new();
        let err = manager
            .load(Path::new("/nonexistent/weights.onnx"), Device::Cpu)
            .unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
        assert!(matches!(
            manager.run(&rgb_image(4, 4), 8),
            Err(RunError::NotLoaded)
        ));
    }
}
