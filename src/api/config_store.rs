use std::io::Write;
use std::path::Path;

use crate::api::dto::DeviceConfig;
use crate::error::DeviceError;

pub fn load_device_config(path: &Path) -> Result<Option<DeviceConfig>, DeviceError> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| DeviceError::Config(format!("Failed to read device config '{path:?}': {e}")))?;

    let parsed = serde_json::from_str::<DeviceConfig>(&raw)
        .map_err(|e| DeviceError::Config(format!("Failed to parse device config '{path:?}': {e}")))?;
    parsed.validate()?;

    Ok(Some(parsed))
}

pub fn save_device_config(path: &Path, config: &DeviceConfig) -> Result<(), DeviceError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .map_err(|e| DeviceError::Config(format!("Failed to create config dir '{dir:?}': {e}")))?;
    }

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| DeviceError::Config(format!("Failed to serialize device config: {e}")))?;

    // Atomic-ish write: write to temp then rename.
    let tmp = path.with_extension("json.tmp");
    {
        let mut f = std::fs::File::create(&tmp)
            .map_err(|e| DeviceError::Config(format!("Failed to create device config '{tmp:?}': {e}")))?;
        f.write_all(json.as_bytes())
            .map_err(|e| DeviceError::Config(format!("Failed to write device config '{tmp:?}': {e}")))?;
        f.flush()
            .map_err(|e| DeviceError::Config(format!("Failed to flush device config '{tmp:?}': {e}")))?;
    }
    std::fs::rename(&tmp, path).map_err(|e| {
        DeviceError::Config(format!("Failed to move device config '{tmp:?}' -> '{path:?}': {e}"))
    })?;

    Ok(())
}
