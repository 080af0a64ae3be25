//! Layered YAML configuration
//!
//! Layers are searched in priority order and the first layer that sets a key
//! wins. The baked install-time file is always the first layer.

use serde_yaml::{Mapping, Value};
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

use super::{ConfigLocation, ConfigSource, ConfigValue, ParameterSpec};

#[derive(Debug, Clone)]
struct Layer {
    location: ConfigLocation,
    data: Mapping,
}

/// Host configuration assembled from YAML files
#[derive(Debug, Clone, Default)]
pub struct LayeredConfig {
    layers: Vec<Layer>,
    parameters: Vec<ParameterSpec>,
}

impl LayeredConfig {
    /// Create configuration with no layers
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the baked file ahead of every other layer
    ///
    /// Missing or unparseable files add nothing.
    pub fn with_baked_file(mut self, path: &Path) -> Self {
        if let Some(data) = load_layer(path) {
            let layer = Layer {
                location: ConfigLocation::Baked(path.to_path_buf()),
                data,
            };
            self.layers.insert(0, layer);
        }
        self
    }

    /// Append a file at the lowest priority so far
    pub fn with_file(mut self, path: &Path) -> Self {
        if let Some(data) = load_layer(path) {
            self.layers.push(Layer {
                location: ConfigLocation::File(path.to_path_buf()),
                data,
            });
        }
        self
    }

    /// Append an in-memory layer
    pub fn with_layer(mut self, location: ConfigLocation, data: Mapping) -> Self {
        if location.is_baked() {
            self.layers.insert(0, Layer { location, data });
        } else {
            self.layers.push(Layer { location, data });
        }
        self
    }

    /// Locations of the loaded layers, highest priority first
    pub fn locations(&self) -> impl Iterator<Item = &ConfigLocation> {
        self.layers.iter().map(|l| &l.location)
    }

    fn parameter(&self, key: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == key)
    }
}

impl ConfigSource for LayeredConfig {
    fn get_config_value(&self, key: &str) -> Option<(ConfigValue, ConfigLocation)> {
        let spec = self.parameter(key);
        for layer in &self.layers {
            let Some(value) = layer.data.get(key).and_then(ConfigValue::from_yaml) else {
                continue;
            };
            if let Some(spec) = spec {
                if !spec.kind.accepts(&value) {
                    debug!(
                        "Ignoring {} in {}: expected {:?}, found {:?}",
                        key, layer.location, spec.kind, value
                    );
                    continue;
                }
            }
            return Some((value, layer.location.clone()));
        }
        spec.and_then(|s| s.default.clone())
            .map(|value| (value, ConfigLocation::Default))
    }

    fn register_parameter(&mut self, spec: ParameterSpec) {
        debug!("Adding the {} config parameter", spec.name);
        self.parameters.retain(|p| p.name != spec.name);
        self.parameters.push(spec);
    }
}

fn load_layer(path: &Path) -> Option<Mapping> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            debug!("Unable to read config {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_yaml::from_str::<Value>(&text) {
        Ok(Value::Mapping(data)) => Some(data),
        Ok(Value::Null) => Some(Mapping::new()),
        Ok(_) => {
            debug!("Config {} is not a mapping; skipping", path.display());
            None
        }
        Err(e) => {
            debug!("Unable to parse config {}: {}", path.display(), e);
            None
        }
    }
}
