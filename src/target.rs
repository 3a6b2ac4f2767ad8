use crate::backend::Backend;
use crate::error::{TracerError, TracerResult};

/// Owns one full-surface image. A size change releases the old image before the new one is
/// allocated; the image is never resized in place.
pub struct RenderTargetManager<B: Backend> {
    label: &'static str,
    image: Option<B::Image>,
    generation: u64,
}

impl<B: Backend> RenderTargetManager<B> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            image: None,
            generation: 0,
        }
    }

    /// Returns an image of exactly `width x height`, allocating or replacing as needed.
    pub fn ensure_target(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> TracerResult<&B::Image> {
        if width == 0 || height == 0 {
            return Err(TracerError::allocation(format!(
                "{} needs non-zero dimensions, got {}x{}",
                self.label, width, height
            )));
        }

        let stale = self
            .image
            .as_ref()
            .is_some_and(|image| backend.image_extent(image) != (width, height));
        if stale {
            self.release(backend);
        }

        if self.image.is_none() {
            let image = backend.create_image(self.label, width, height)?;
            log::debug!("allocated {} at {}x{}", self.label, width, height);
            self.generation += 1;
            self.image = Some(image);
        }

        self.image
            .as_ref()
            .ok_or_else(|| TracerError::allocation(format!("{} is unavailable", self.label)))
    }

    /// Frees the image. Does nothing when none is held.
    pub fn release(&mut self, backend: &mut B) {
        if let Some(image) = self.image.take() {
            log::debug!("released {}", self.label);
            backend.release_image(image);
        }
    }

    pub fn image(&self) -> Option<&B::Image> {
        self.image.as_ref()
    }

    pub fn extent(&self, backend: &B) -> Option<(u32, u32)> {
        self.image.as_ref().map(|image| backend.image_extent(image))
    }

    /// Incremented on every allocation. Comparing generations tells callers whether the image
    /// they bound earlier is still the current one.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::host::{HostBackend, ResourceEvent};

    #[test]
    fn test_same_size_is_idempotent() {
        let mut backend = HostBackend::solid([0.0; 4]);
        let mut target = RenderTargetManager::new("target");

        let first = *target.ensure_target(&mut backend, 800, 600).unwrap();
        let second = *target.ensure_target(&mut backend, 800, 600).unwrap();
        assert_eq!(first, second);
        assert_eq!(target.generation(), 1);
        assert_eq!(backend.events().len(), 1);
    }

    #[test]
    fn test_resize_releases_before_allocating() {
        let mut backend = HostBackend::solid([0.0; 4]);
        let mut target = RenderTargetManager::new("target");

        let old = *target.ensure_target(&mut backend, 800, 600).unwrap();
        backend.clear_events();
        let new = *target.ensure_target(&mut backend, 1920, 1080).unwrap();

        assert_eq!(
            backend.events(),
            &[
                ResourceEvent::ImageReleased { id: old.id() },
                ResourceEvent::ImageCreated {
                    id: new.id(),
                    width: 1920,
                    height: 1080
                },
            ]
        );
        assert_eq!(target.extent(&backend), Some((1920, 1080)));
        assert_eq!(backend.live_images(), 1);
    }

    #[test]
    fn test_release_without_image_is_noop() {
        let mut backend = HostBackend::solid([0.0; 4]);
        let mut target = RenderTargetManager::new("target");
        target.release(&mut backend);
        target.ensure_target(&mut backend, 4, 4).unwrap();
        target.release(&mut backend);
        target.release(&mut backend);
        assert!(target.image().is_none());
        assert_eq!(backend.live_images(), 0);
    }

    #[test]
    fn test_zero_dimensions_are_an_allocation_error() {
        let mut backend = HostBackend::solid([0.0; 4]);
        let mut target = RenderTargetManager::new("target");
        let err = target.ensure_target(&mut backend, 0, 600).unwrap_err();
        assert!(matches!(err, TracerError::ResourceAllocation(_)));
    }

    #[test]
    fn test_failed_reallocation_leaves_no_stale_image() {
        let mut backend = HostBackend::solid([0.0; 4]).with_max_image_pixels(1000);
        let mut target = RenderTargetManager::new("target");
        target.ensure_target(&mut backend, 10, 10).unwrap();
        assert!(target.ensure_target(&mut backend, 100, 100).is_err());
        assert!(target.image().is_none());
        assert_eq!(backend.live_images(), 0);
    }
}
