//! Scoped handle to the process-wide camera driver library.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::config::CameraDefaults;
use crate::sdk::Backend;
use crate::{Camera, CameraError};

/// Initialised driver library.
///
/// `Library::init` calls [`Backend::init`] once; the backend is released with
/// [`Backend::uninit`] when the last clone is dropped. Every open [`Camera`]
/// holds a clone, so the library cannot be released underneath a camera.
/// The library also refuses to open the same camera twice.
///
/// The vendor library itself is process-global: create one `Library` per
/// process for a real driver backend.
pub struct Library<B: Backend> {
    shared: Arc<Shared<B>>,
}

struct Shared<B: Backend> {
    backend: Mutex<B>,
    open: Mutex<HashSet<String>>,
}

impl<B: Backend> Library<B> {
    /// Initialise the driver library.
    pub fn init(mut backend: B) -> Result<Self, CameraError> {
        backend.init()?;
        info!("camera library initialised");
        Ok(Self {
            shared: Arc::new(Shared {
                backend: Mutex::new(backend),
                open: Mutex::new(HashSet::new()),
            }),
        })
    }

    /// Names of the attached cameras.
    pub fn camera_names(&self) -> Result<Vec<String>, CameraError> {
        Ok(self.backend()?.camera_names()?)
    }

    /// Open the first attached camera.
    pub fn open_first(&self, defaults: &CameraDefaults) -> Result<Camera<B>, CameraError> {
        let name = self
            .camera_names()?
            .into_iter()
            .next()
            .ok_or(CameraError::NoCamera)?;
        self.open(&name, defaults)
    }

    /// Open a camera by name and apply `defaults` to it.
    pub fn open(&self, name: &str, defaults: &CameraDefaults) -> Result<Camera<B>, CameraError> {
        let mut open = lock(&self.shared.open)?;
        if open.contains(name) {
            return Err(CameraError::DeviceBusy(name.to_string()));
        }
        let sdk = self.backend()?.open(name)?;
        open.insert(name.to_string());
        drop(open);
        info!(camera = name, "camera opened");
        Camera::attach(self.clone(), name.to_string(), sdk, defaults)
    }

    /// Whether `name` is currently held by a [`Camera`].
    pub fn is_open(&self, name: &str) -> bool {
        lock(&self.shared.open)
            .map(|open| open.contains(name))
            .unwrap_or(false)
    }

    pub(crate) fn release(&self, name: &str) {
        match lock(&self.shared.open) {
            Ok(mut open) => {
                open.remove(name);
            }
            Err(err) => warn!(camera = name, error = %err, "failed to release camera slot"),
        }
    }

    fn backend(&self) -> Result<MutexGuard<'_, B>, CameraError> {
        lock(&self.shared.backend)
    }
}

impl<B: Backend> Clone for Library<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: Backend> Drop for Shared<B> {
    fn drop(&mut self) {
        let backend = match self.backend.get_mut() {
            Ok(backend) => backend,
            Err(poisoned) => poisoned.into_inner(),
        };
        match backend.uninit() {
            Ok(()) => info!("camera library released"),
            Err(err) => warn!(error = %err, "failed to release camera library"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, CameraError> {
    mutex.lock().map_err(|_| CameraError::Poisoned)
}
