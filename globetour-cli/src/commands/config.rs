//! Config command - print the effective configuration.

use std::path::{Path, PathBuf};

use globetour::SlideshowConfig;

use crate::error::CliError;

/// Load the config at `path`, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<SlideshowConfig, CliError> {
    match path {
        Some(path) => Ok(SlideshowConfig::load(path)?),
        None => Ok(SlideshowConfig::default()),
    }
}

/// Run the config command.
pub fn run(path: Option<PathBuf>) -> Result<(), CliError> {
    let config = load_config(path.as_deref())?;

    match &path {
        Some(path) => println!("; Effective configuration from {}", path.display()),
        None => println!("; Default configuration"),
    }
    print!("{}", config.to_ini_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_path() {
        let config = load_config(None).unwrap();
        assert_eq!(config, SlideshowConfig::default());
    }

    #[test]
    fn test_loads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[slideshow]\nslide_delay_secs = 3").unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.slide_delay.as_secs(), 3);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[popups]\ntrailing_capacity = many").unwrap();
        assert!(matches!(
            load_config(Some(file.path())),
            Err(CliError::Config(_))
        ));
    }
}
