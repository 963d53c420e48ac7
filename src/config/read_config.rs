use crate::{config::FoxConfig, error::FoxResult};
use std::{
    fs::{self, File},
    io::BufReader,
    path::Path,
};
use tracing::{debug, info};

impl FoxConfig {
    /// Reads the config file, or returns the defaults when it does not exist.
    pub fn load(path: &Path) -> FoxResult<Self> {
        if !path.exists() {
            debug!("no config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let reader = BufReader::new(File::open(path)?);
        let cfg: Self = serde_json::from_reader(reader)?;
        cfg.validate()?;
        info!("loaded config from {:?}", path);
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> FoxResult<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        info!("saved config to {:?}", path);
        Ok(())
    }

    pub fn to_pretty_json(&self) -> FoxResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FoxError;
    use std::env;

    #[test]
    fn missing_file_gives_defaults() {
        let path = env::temp_dir().join("foxconsole-missing-config-does-not-exist.json");
        let cfg = FoxConfig::load(&path).unwrap();
        assert_eq!(cfg.target.username, "root");
    }

    #[test]
    fn save_then_load_keeps_edits() {
        let dir = env::temp_dir().join(format!("foxconsole-cfg-{}", std::process::id()));
        let path = dir.join("nested").join("fox.json");
        let mut cfg = FoxConfig::default();
        cfg.serial.port_name = "/dev/ttyUSB7".to_string();
        cfg.camera.width = 640;
        cfg.save(&path).unwrap();

        let loaded = FoxConfig::load(&path).unwrap();
        assert_eq!(loaded.serial.port_name, "/dev/ttyUSB7");
        assert_eq!(loaded.camera.width, 640);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = env::temp_dir().join(format!("foxconsole-bad-{}.json", std::process::id()));
        fs::write(&path, "{ not json").unwrap();
        assert!(FoxConfig::load(&path).is_err());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let path = env::temp_dir().join(format!("foxconsole-neg-{}.json", std::process::id()));
        fs::write(&path, r#"{"serial": {"command_timeout_s": -1}}"#).unwrap();
        let err = FoxConfig::load(&path).unwrap_err();
        assert!(matches!(err, FoxError::Invalid(ref msg) if msg.contains("serial.command_timeout_s")), "{}", err);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn bad_timeout_built_in_code_does_not_panic() {
        let mut cfg = FoxConfig::default();
        cfg.camera.capture_timeout_s = f64::NAN;
        assert!(cfg.validate().is_err());
        assert_eq!(cfg.camera.capture_timeout(), std::time::Duration::ZERO);
        assert_eq!(cfg.serial.cleanup_timeout(), std::time::Duration::from_secs(5));
    }
}
