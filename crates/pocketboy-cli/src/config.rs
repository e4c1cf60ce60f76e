use log::warn;
use pocketboy_core::ppu::Palette;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub boot_rom_path: Option<PathBuf>,
    /// Emulated milliseconds per burst.
    pub budget_ms: Option<u64>,
    /// `ADDR` or `BANK:ADDR`, hex.
    pub breakpoint: Option<String>,
    /// Four `[r, g, b, a]` shades, lightest first.
    pub palette: Option<[[u8; 4]; 4]>,
    pub trace_pc: bool,
}

impl Config {
    pub fn palette(&self) -> Palette {
        let mut palette = Palette::default();
        if let Some(shades) = self.palette {
            palette.shades = shades;
        }
        palette
    }
}

pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("pocketboy").join("config.toml");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("pocketboy").join("config.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("pocketboy")
            .join("config.toml");
    }

    PathBuf::from("config.toml")
}

/// Missing files give the defaults silently; unparsable ones with a warning.
pub fn load_from_file(path: &Path) -> Config {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return Config::default(),
    };

    match toml::from_str::<Config>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse config {}: {e}; using defaults",
                path.display()
            );
            Config::default()
        }
    }
}
