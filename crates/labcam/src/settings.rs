//! Host-facing settings list bound to a shared camera.
//!
//! Hosts (GUIs, scripts, the CLI) address settings by name and expect every
//! value to be readable before a camera exists. [`CameraSettings`] keeps the
//! cached values, and while connected routes reads and writes for hardware
//! settings through per-setting accessors that lock the shared [`Camera`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use camparam::{AcquisitionMode, ParamError, ParamId, ParameterStore, SettingDescriptor, Value};
use tracing::{debug, info};

use crate::config::CameraDefaults;
use crate::library::Library;
use crate::sdk::Backend;
use crate::{Camera, CameraError};

/// Camera shared between the settings binding and an acquisition loop.
pub type SharedCamera<B> = Arc<Mutex<Camera<B>>>;

type ReadFn = Box<dyn FnMut() -> Result<Value, CameraError> + Send>;
type WriteFn = Box<dyn FnMut(Value) -> Result<(), CameraError> + Send>;

#[derive(Default)]
struct Binding {
    read: Option<ReadFn>,
    write: Option<WriteFn>,
}

impl Binding {
    fn clear(&mut self) {
        self.read = None;
        self.write = None;
    }
}

/// One entry of the settings list.
#[derive(Debug, Clone, Copy)]
pub struct Setting<'a> {
    pub descriptor: &'a SettingDescriptor,
    pub value: &'a Value,
    /// Whether reads and writes currently reach hardware.
    pub bound: bool,
}

impl Setting<'_> {
    pub fn id(&self) -> ParamId {
        self.descriptor.id
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.id.name()
    }
}

/// Every camera setting with its cached value and optional hardware binding.
pub struct CameraSettings<B: Backend> {
    store: ParameterStore,
    bindings: Vec<Binding>,
    defaults: CameraDefaults,
    device: Option<SharedCamera<B>>,
}

impl<B: Backend> CameraSettings<B> {
    /// Unbound settings holding their initial values.
    pub fn new(limits: camparam::Limits) -> Self {
        Self::with_defaults(limits, CameraDefaults::default())
    }

    /// Like [`new`](Self::new) with the defaults applied on connect.
    pub fn with_defaults(limits: camparam::Limits, defaults: CameraDefaults) -> Self {
        Self {
            store: ParameterStore::new(limits),
            bindings: ParamId::ALL.iter().map(|_| Binding::default()).collect(),
            defaults,
            device: None,
        }
    }

    /// Open the first camera of `library`, bind every hardware setting and
    /// read all of them back.
    pub fn connect(&mut self, library: &Library<B>) -> Result<(), CameraError> {
        if let Some(device) = &self.device {
            let name = lock(device)?.name().to_string();
            return Err(CameraError::DeviceBusy(name));
        }
        let camera = library.open_first(&self.defaults)?;
        let mut store = ParameterStore::new(*camera.limits());
        for id in ParamId::ALL.into_iter().filter(|id| !id.is_hardware()) {
            store.record(id, self.store.get(id).clone());
        }
        self.store = store;
        let name = camera.name().to_string();
        let device = Arc::new(Mutex::new(camera));
        for id in ParamId::ALL.into_iter().filter(|id| id.is_hardware()) {
            let binding = &mut self.bindings[id.index()];
            let reader = Arc::clone(&device);
            binding.read = Some(Box::new(move || lock(&reader)?.get_parameter(id)));
            if !id.is_read_only() {
                let writer = Arc::clone(&device);
                binding.write = Some(Box::new(move |value| {
                    lock(&writer)?.set_parameter(id, value).map(drop)
                }));
            }
        }
        self.device = Some(device);
        info!(camera = %name, "settings bound to camera");
        self.read_from_hardware()
    }

    /// Drop every hardware binding, then release the camera.
    ///
    /// The settings keep their last values and stay usable unbound.
    pub fn disconnect(&mut self) -> Result<(), CameraError> {
        for binding in &mut self.bindings {
            binding.clear();
        }
        let Some(device) = self.device.take() else {
            return Ok(());
        };
        info!("settings unbound from camera");
        match Arc::try_unwrap(device) {
            Ok(camera) => camera
                .into_inner()
                .map_err(|_| CameraError::Poisoned)?
                .disconnect(),
            // An acquisition loop still holds the camera: close it in place.
            Err(shared) => lock(&shared)?.close(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.device.is_some()
    }

    /// Shared handle to the bound camera.
    pub fn device(&self) -> Option<SharedCamera<B>> {
        self.device.clone()
    }

    /// Refresh every bound setting from hardware.
    pub fn read_from_hardware(&mut self) -> Result<(), CameraError> {
        for id in ParamId::ALL {
            if let Some(read) = self.bindings[id.index()].read.as_mut() {
                let value = read()?;
                self.store.record(id, value);
            }
        }
        Ok(())
    }

    /// Cached value of a setting.
    pub fn get(&self, id: ParamId) -> &Value {
        self.store.get(id)
    }

    /// Read a setting, from hardware when bound.
    pub fn read(&mut self, id: ParamId) -> Result<Value, CameraError> {
        if let Some(read) = self.bindings[id.index()].read.as_mut() {
            let value = read()?;
            self.store.record(id, value);
        }
        Ok(self.store.get(id).clone())
    }

    /// Write a setting and return its resulting value.
    ///
    /// Bound settings are written to hardware and read back; unbound ones
    /// are validated and stored locally.
    pub fn set(&mut self, id: ParamId, value: impl Into<Value>) -> Result<Value, CameraError> {
        let value = value.into();
        let binding = &mut self.bindings[id.index()];
        let Some(write) = binding.write.as_mut() else {
            return Ok(self.store.set(id, value)?);
        };
        debug!(setting = %id, %value, "write bound setting");
        write(value)?;
        if let Some(read) = binding.read.as_mut() {
            let fresh = read()?;
            self.store.record(id, fresh);
        }
        Ok(self.store.get(id).clone())
    }

    /// Parse a host string for the named setting and write it.
    pub fn set_from_str(&mut self, name: &str, text: &str) -> Result<Value, CameraError> {
        let id: ParamId = name.parse()?;
        let value = Value::parse(id.kind(), text).ok_or_else(|| ParamError::Parse {
            param: id,
            value: text.to_string(),
        })?;
        self.set(id, value)
    }

    pub fn setting(&self, id: ParamId) -> Setting<'_> {
        Setting {
            descriptor: self.store.descriptor(id),
            value: self.store.get(id),
            bound: self.bindings[id.index()].read.is_some(),
        }
    }

    /// All settings in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Setting<'_>> + '_ {
        ParamId::ALL.into_iter().map(|id| self.setting(id))
    }

    /// Acquisition mode and frame budget chosen by the host.
    pub fn acquisition_plan(&self) -> (AcquisitionMode, u32) {
        (self.store.acquisition_mode(), self.store.number_frames())
    }
}

impl<B: Backend> fmt::Debug for CameraSettings<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = self.bindings.iter().filter(|b| b.read.is_some()).count();
        f.debug_struct("CameraSettings")
            .field("connected", &self.device.is_some())
            .field("bound", &bound)
            .field("defaults", &self.defaults)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, CameraError> {
    mutex.lock().map_err(|_| CameraError::Poisoned)
}
