//! Progressive anti-aliasing: a running mean of jittered frames.

use crate::backend::Backend;
use crate::config::ResizePolicy;
use crate::error::{TracerError, TracerResult};
use crate::target::RenderTargetManager;
use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Weight of the newest frame when it is sample number `sample_index` (0-based).
pub fn blend_weight(sample_index: u32) -> f32 {
    1.0 / (sample_index as f32 + 1.0)
}

/// `history = history * (1 - weight) + current * weight`. Matches `mix()` in the blend shader.
/// A weight of 1 copies `current` outright.
pub fn blend_pixels(history: &mut [[f32; 4]], current: &[[f32; 4]], weight: f32) {
    if weight >= 1.0 {
        history
            .par_iter_mut()
            .zip(current.par_iter())
            .for_each(|(h, c)| *h = *c);
        return;
    }
    history
        .par_iter_mut()
        .zip(current.par_iter())
        .for_each(|(h, c)| {
            for i in 0..4 {
                h[i] = h[i] * (1.0 - weight) + c[i] * weight;
            }
        });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulationState {
    AwaitingFirstSample,
    /// Number of samples blended since the last reset.
    Accumulating(u32),
}

pub struct AccumulationController<B: Backend> {
    sample_index: u32,
    rng: StdRng,
    history: RenderTargetManager<B>,
    resize_policy: ResizePolicy,
    dirty: bool,
}

impl<B: Backend> AccumulationController<B> {
    pub fn new(seed: u64, resize_policy: ResizePolicy) -> Self {
        Self {
            sample_index: 0,
            rng: StdRng::seed_from_u64(seed),
            history: RenderTargetManager::new("Accumulation Image"),
            resize_policy,
            dirty: false,
        }
    }

    /// Flags that something affecting the rendered output changed. Consumed by the next
    /// `begin_frame`.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Consumes the dirty flag (and the camera's own change signal) and returns the sample
    /// index this frame will be blended as.
    pub fn begin_frame(&mut self, camera_changed: bool) -> u32 {
        if camera_changed || self.dirty {
            if self.sample_index > 0 {
                log::trace!("accumulation reset after {} samples", self.sample_index);
            }
            self.sample_index = 0;
        }
        self.dirty = false;
        self.sample_index
    }

    /// Sub-pixel offset in `[0, 1)` on each axis.
    pub fn next_jitter(&mut self) -> Vec2 {
        Vec2::new(self.rng.gen::<f32>(), self.rng.gen::<f32>())
    }

    /// Blends `current` into the history image and advances the sample counter. Returns the
    /// composited image.
    pub fn blend(&mut self, backend: &mut B, current: &B::Image) -> TracerResult<&B::Image> {
        let (width, height) = backend.image_extent(current);
        let previous = self.history.generation();
        self.history.ensure_target(backend, width, height)?;
        let recreated = previous != 0 && self.history.generation() != previous;
        if recreated && self.resize_policy == ResizePolicy::ResetAccumulation {
            log::debug!("accumulation reset by resize to {}x{}", width, height);
            self.sample_index = 0;
        }
        // A recreated history holds no samples yet.
        let weight = if recreated {
            1.0
        } else {
            blend_weight(self.sample_index)
        };

        let history = self
            .history
            .image()
            .ok_or_else(|| TracerError::not_ready("accumulation image missing"))?;
        backend.accumulate(current, history, weight)?;
        self.sample_index = self.sample_index.saturating_add(1);
        Ok(history)
    }

    pub fn sample_index(&self) -> u32 {
        self.sample_index
    }

    pub fn state(&self) -> AccumulationState {
        match self.sample_index {
            0 => AccumulationState::AwaitingFirstSample,
            n => AccumulationState::Accumulating(n),
        }
    }

    pub fn history(&self) -> Option<&B::Image> {
        self.history.image()
    }

    pub fn release(&mut self, backend: &mut B) {
        self.history.release(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::host::{HostBackend, HostImage, ResourceEvent};

    fn frame(backend: &mut HostBackend, width: u32, height: u32, color: [f32; 4]) -> HostImage {
        let pixels = vec![color; (width * height) as usize];
        backend.upload_image("frame", width, height, &pixels).unwrap()
    }

    #[test]
    fn test_blend_weight_is_running_mean() {
        assert_eq!(blend_weight(0), 1.0);
        assert_eq!(blend_weight(1), 0.5);
        assert_eq!(blend_weight(3), 0.25);
    }

    #[test]
    fn test_running_mean_of_distinct_values() {
        let mut history = vec![[0.0; 4]];
        for (n, value) in [2.0f32, 4.0, 6.0, 8.0].iter().enumerate() {
            blend_pixels(&mut history, &[[*value; 4]], blend_weight(n as u32));
        }
        assert!((history[0][0] - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_constant_input_is_invariant() {
        let mut backend = HostBackend::solid([0.0; 4]);
        let mut acc = AccumulationController::new(7, ResizePolicy::ResetAccumulation);
        let color = [0.3, 0.6, 0.9, 1.0];
        let current = frame(&mut backend, 4, 3, color);

        for _ in 0..50 {
            acc.begin_frame(false);
            acc.blend(&mut backend, &current).unwrap();
        }
        let history = *acc.history().unwrap();
        for pixel in backend.read_image(&history).unwrap() {
            for i in 0..4 {
                assert!((pixel[i] - color[i]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_sample_index_counts_up_and_resets_on_change() {
        let mut backend = HostBackend::solid([0.0; 4]);
        let mut acc = AccumulationController::new(7, ResizePolicy::ResetAccumulation);
        let current = frame(&mut backend, 2, 2, [1.0; 4]);
        assert_eq!(acc.state(), AccumulationState::AwaitingFirstSample);

        let mut used = Vec::new();
        for k in 0..8 {
            used.push(acc.begin_frame(k == 5));
            acc.blend(&mut backend, &current).unwrap();
        }
        assert_eq!(used, vec![0, 1, 2, 3, 4, 0, 1, 2]);
        assert_eq!(acc.state(), AccumulationState::Accumulating(3));

        let weights: Vec<f32> = backend
            .events()
            .iter()
            .filter_map(|e| match e {
                ResourceEvent::Accumulated { weight } => Some(*weight),
                _ => None,
            })
            .collect();
        assert_eq!(weights[5], 1.0);
        assert_eq!(weights[7], 1.0 / 3.0);
    }

    #[test]
    fn test_dirty_flag_is_consumed_once() {
        let mut acc = AccumulationController::<HostBackend>::new(1, ResizePolicy::ResetAccumulation);
        let mut backend = HostBackend::solid([0.0; 4]);
        let current = frame(&mut backend, 1, 1, [1.0; 4]);
        acc.begin_frame(false);
        acc.blend(&mut backend, &current).unwrap();

        acc.mark_dirty();
        assert_eq!(acc.begin_frame(false), 0);
        assert!(!acc.is_dirty());
        acc.blend(&mut backend, &current).unwrap();
        assert_eq!(acc.begin_frame(false), 1);
    }

    #[test]
    fn test_reset_discards_non_finite_history() {
        let mut backend = HostBackend::solid([0.0; 4]);
        let mut acc = AccumulationController::new(5, ResizePolicy::ResetAccumulation);
        let hot = frame(&mut backend, 2, 1, [f32::INFINITY, 0.0, 0.0, 1.0]);
        acc.begin_frame(false);
        acc.blend(&mut backend, &hot).unwrap();

        let calm = frame(&mut backend, 2, 1, [0.5, 0.5, 0.5, 1.0]);
        assert_eq!(acc.begin_frame(true), 0);
        let history = *acc.blend(&mut backend, &calm).unwrap();
        for pixel in backend.read_image(&history).unwrap() {
            assert_eq!(*pixel, [0.5, 0.5, 0.5, 1.0]);
        }
        assert_eq!(acc.sample_index(), 1);
    }

    #[test]
    fn test_full_weight_blend_overwrites_nan() {
        let mut history = vec![[f32::NAN, f32::INFINITY, 0.0, 1.0]];
        blend_pixels(&mut history, &[[0.25, 0.5, 0.75, 1.0]], 1.0);
        assert_eq!(history[0], [0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_jitter_is_seeded_and_in_unit_square() {
        let mut a = AccumulationController::<HostBackend>::new(42, ResizePolicy::ResetAccumulation);
        let mut b = AccumulationController::<HostBackend>::new(42, ResizePolicy::ResetAccumulation);
        for _ in 0..100 {
            let ja = a.next_jitter();
            assert_eq!(ja, b.next_jitter());
            assert!((0.0..1.0).contains(&ja.x) && (0.0..1.0).contains(&ja.y));
        }
    }

    #[test]
    fn test_resize_policy_controls_counter() {
        for (policy, expected) in [
            (ResizePolicy::ResetAccumulation, 1),
            (ResizePolicy::KeepSampleCount, 4),
        ] {
            let mut backend = HostBackend::solid([0.0; 4]);
            let mut acc = AccumulationController::new(3, policy);
            let small = frame(&mut backend, 8, 6, [1.0; 4]);
            for _ in 0..3 {
                acc.begin_frame(false);
                acc.blend(&mut backend, &small).unwrap();
            }
            let large = frame(&mut backend, 16, 12, [1.0; 4]);
            acc.begin_frame(false);
            acc.blend(&mut backend, &large).unwrap();
            assert_eq!(acc.sample_index(), expected, "{:?}", policy);
            assert_eq!(backend.image_extent(acc.history().unwrap()), (16, 12));
        }
    }

    #[test]
    fn test_kept_count_stays_constant_across_resize() {
        let mut backend = HostBackend::solid([0.0; 4]);
        let mut acc = AccumulationController::new(9, ResizePolicy::KeepSampleCount);
        let small = frame(&mut backend, 8, 8, [1.0; 4]);
        for _ in 0..100 {
            acc.begin_frame(false);
            acc.blend(&mut backend, &small).unwrap();
        }

        let large = frame(&mut backend, 16, 16, [1.0; 4]);
        for _ in 0..2 {
            acc.begin_frame(false);
            let history = *acc.blend(&mut backend, &large).unwrap();
            for pixel in backend.read_image(&history).unwrap() {
                for channel in pixel {
                    assert!((channel - 1.0).abs() < 1e-5);
                }
            }
        }
        assert_eq!(acc.sample_index(), 102);
    }
}
