//! Current setting values plus the validation applied before hardware writes.

use tracing::debug;

use crate::descriptor::SettingDescriptor;
use crate::limits::{gain_choices, is_long_exposure_port, Limits};
use crate::value::{AcquisitionMode, TriggerMode, Value};
use crate::{ParamError, ParamId};

/// Cached values of every setting, validated against the camera limits.
///
/// The store never talks to hardware. Callers validate a write, perform the
/// hardware call, then [`record`](ParameterStore::record) what the hardware
/// reports back.
#[derive(Debug, Clone)]
pub struct ParameterStore {
    limits: Limits,
    descriptors: Vec<SettingDescriptor>,
    values: Vec<Value>,
}

impl ParameterStore {
    /// Create a store holding every setting's initial value.
    pub fn new(limits: Limits) -> Self {
        let descriptors: Vec<_> = ParamId::ALL
            .iter()
            .map(|&id| SettingDescriptor::for_param(id, &limits))
            .collect();
        let values = descriptors.iter().map(|d| d.initial.clone()).collect();
        Self {
            limits,
            descriptors,
            values,
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn descriptor(&self, id: ParamId) -> &SettingDescriptor {
        &self.descriptors[id.index()]
    }

    pub fn descriptors(&self) -> &[SettingDescriptor] {
        &self.descriptors
    }

    /// Current cached value.
    pub fn get(&self, id: ParamId) -> &Value {
        &self.values[id.index()]
    }

    /// Validate and store a host write. On error nothing changes.
    pub fn set(&mut self, id: ParamId, value: impl Into<Value>) -> Result<Value, ParamError> {
        let value = self.validate(id, value.into())?;
        self.record(id, value.clone());
        Ok(value)
    }

    /// Parse a host string for `id` and validate it.
    pub fn parse(&self, id: ParamId, text: &str) -> Result<Value, ParamError> {
        let parsed = Value::parse(id.kind(), text).ok_or_else(|| ParamError::Parse {
            param: id,
            value: text.to_string(),
        })?;
        self.validate(id, parsed)
    }

    /// Check a write without storing it, returning the normalised value.
    pub fn validate(&self, id: ParamId, value: Value) -> Result<Value, ParamError> {
        let desc = self.descriptor(id);
        if desc.is_read_only() {
            return Err(ParamError::ReadOnly(id));
        }
        let value = desc.check(value)?;
        match id {
            ParamId::Gain => {
                let gain = int_of(&value);
                let port = self.readout_port();
                check_gain(port, gain)?;
            }
            ParamId::ReadoutPort => {
                let port = int_of(&value);
                check_gain(port, self.gain()).map_err(|_| {
                    ParamError::range(
                        ParamId::ReadoutPort,
                        format!(
                            "gain {} is unavailable on readout port {port}; set gain to 1 first",
                            self.gain()
                        ),
                    )
                })?;
                let max = self.limits.max_exposure_ms(port);
                if self.exposure_ms() > max {
                    return Err(ParamError::range(
                        ParamId::ReadoutPort,
                        format!(
                            "exposure {} ms exceeds the {max} ms limit of readout port {port}",
                            self.exposure_ms()
                        ),
                    ));
                }
            }
            ParamId::ExposureTime => {
                let exposure = int_of(&value);
                let port = self.readout_port();
                let max = self.limits.max_exposure_ms(port);
                if exposure > max {
                    let hint = if is_long_exposure_port(port) {
                        String::new()
                    } else {
                        "; select long-exposure readout port 1 or 2".to_string()
                    };
                    return Err(ParamError::range(
                        ParamId::ExposureTime,
                        format!("{exposure} ms exceeds {max} ms on readout port {port}{hint}"),
                    ));
                }
            }
            _ => {}
        }
        Ok(value)
    }

    /// Store a value reported by the hardware without write validation.
    pub fn record(&mut self, id: ParamId, value: Value) {
        debug!(setting = %id, %value, "record setting");
        self.values[id.index()] = value;
    }

    pub fn exposure_ms(&self) -> u32 {
        int_of(self.get(ParamId::ExposureTime))
    }

    pub fn binning(&self) -> u32 {
        int_of(self.get(ParamId::Binning))
    }

    pub fn gain(&self) -> u32 {
        int_of(self.get(ParamId::Gain))
    }

    pub fn readout_port(&self) -> u32 {
        int_of(self.get(ParamId::ReadoutPort))
    }

    pub fn number_frames(&self) -> u32 {
        int_of(self.get(ParamId::NumberFrames))
    }

    pub fn trigger_mode(&self) -> TriggerMode {
        self.get(ParamId::TriggerMode)
            .as_trigger()
            .unwrap_or_default()
    }

    pub fn acquisition_mode(&self) -> AcquisitionMode {
        self.get(ParamId::AcquisitionMode)
            .as_mode()
            .unwrap_or_default()
    }
}

fn check_gain(port: u32, gain: u32) -> Result<(), ParamError> {
    let allowed = gain_choices(port);
    if allowed.contains(&gain) {
        Ok(())
    } else {
        Err(ParamError::range(
            ParamId::Gain,
            format!("gain {gain} is unavailable on readout port {port} (allowed {allowed:?})"),
        ))
    }
}

/// Integer settings are range-checked on entry, so the cast cannot truncate
/// anything the store accepted.
fn int_of(value: &Value) -> u32 {
    value
        .as_int()
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::MAX_EXPOSURE_MS;

    fn store() -> ParameterStore {
        ParameterStore::new(Limits::default())
    }

    #[test]
    fn invalid_binning_leaves_value_unchanged() {
        let mut store = store();
        for candidate in [0, 3, 5, 8, -1] {
            let err = store.set(ParamId::Binning, Value::Int(candidate)).unwrap_err();
            assert!(matches!(err, ParamError::Validation { .. }), "{candidate}");
            assert_eq!(store.binning(), 1);
        }
        store.set(ParamId::Binning, 4u32).expect("binning 4");
        assert_eq!(store.binning(), 4);
    }

    #[test]
    fn gain_two_requires_port_one_or_two() {
        let mut store = store();
        let err = store.set(ParamId::Gain, 2u32).unwrap_err();
        assert!(matches!(err, ParamError::Range { param: ParamId::Gain, .. }));
        assert_eq!(store.gain(), 1);

        store.set(ParamId::ReadoutPort, 1u32).expect("port 1");
        store.set(ParamId::Gain, 2u32).expect("gain 2 on port 1");
        store.set(ParamId::ReadoutPort, 2u32).expect("port 2 keeps gain 2");

        let err = store.set(ParamId::ReadoutPort, 0u32).unwrap_err();
        assert!(matches!(err, ParamError::Range { param: ParamId::ReadoutPort, .. }));
        assert_eq!(store.readout_port(), 2);
    }

    #[test]
    fn exposure_bounds_depend_on_port() {
        let mut store = store();
        store.set(ParamId::ExposureTime, 0u32).expect("zero exposure");
        store.set(ParamId::ExposureTime, 60_000u32).expect("standard max");
        let err = store.set(ParamId::ExposureTime, 60_001u32).unwrap_err();
        assert!(matches!(err, ParamError::Range { .. }));
        assert_eq!(store.exposure_ms(), 60_000);

        store.set(ParamId::ReadoutPort, 1u32).expect("long exposure port");
        store
            .set(ParamId::ExposureTime, MAX_EXPOSURE_MS)
            .expect("long exposure");
        assert_eq!(store.exposure_ms(), MAX_EXPOSURE_MS);
        let err = store
            .set(ParamId::ExposureTime, i64::from(MAX_EXPOSURE_MS) + 1)
            .unwrap_err();
        assert!(matches!(err, ParamError::Validation { .. }));

        let err = store.set(ParamId::ReadoutPort, 0u32).unwrap_err();
        assert!(matches!(err, ParamError::Range { .. }));
    }

    #[test]
    fn read_only_settings_reject_writes() {
        let mut store = store();
        let err = store.set(ParamId::Temperature, 10.0).unwrap_err();
        assert!(matches!(err, ParamError::ReadOnly(ParamId::Temperature)));
        store.record(ParamId::Temperature, Value::Float(-19.5));
        assert_eq!(store.get(ParamId::Temperature), &Value::Float(-19.5));
    }

    #[test]
    fn subarray_position_is_bounded_by_sensor() {
        let mut store = store();
        store.set(ParamId::SubarrayHPos, 3196u32).expect("max hpos");
        assert!(store.set(ParamId::SubarrayHPos, 3200u32).is_err());
        assert!(store.set(ParamId::SubarrayVPos, 2198u32).is_err());
        assert!(store.set(ParamId::SubarrayVPos, 2196u32).is_ok());
    }

    #[test]
    fn parse_goes_through_validation() {
        let store = store();
        assert_eq!(
            store.parse(ParamId::TriggerMode, "Edge Trigger").unwrap(),
            Value::Trigger(TriggerMode::EdgeTrigger)
        );
        assert!(matches!(
            store.parse(ParamId::Binning, "two"),
            Err(ParamError::Parse { .. })
        ));
        assert!(store.parse(ParamId::NumberFrames, "0").is_err());
    }
}
