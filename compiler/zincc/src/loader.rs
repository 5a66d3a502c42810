//! File-system source loader.
//!
//! Packages are directory roots with a designated root source file.
//! `@import` names resolve against the importing file's directory, then
//! against the implicit `std` package; `-` as a root path reads standard
//! input.

use std::io::Read;
use std::path::{Path, PathBuf};

use zinc_sem::SourceLoader;

pub struct FsLoader {
    /// Root directory of the implicit `std` package.
    pub std_dir: Option<PathBuf>,
}

impl FsLoader {
    pub fn new(std_dir: Option<PathBuf>) -> FsLoader {
        FsLoader { std_dir }
    }

    fn resolve(&self, importing_path: &str, name: &str) -> Result<PathBuf, String> {
        // Package name: `@import("std")` maps to `<std>/index.zn`.
        if !name.contains('/') && !name.ends_with(".zn") {
            if name == "std" {
                if let Some(std_dir) = &self.std_dir {
                    return Ok(std_dir.join("index.zn"));
                }
                return Err("no std package directory configured".to_string());
            }
            return Err(format!("unknown package '{name}'"));
        }
        let base = Path::new(importing_path)
            .parent()
            .unwrap_or_else(|| Path::new("."));
        Ok(base.join(name))
    }
}

impl SourceLoader for FsLoader {
    fn load(&mut self, importing_path: &str, name: &str) -> Result<(String, String), String> {
        let path = self.resolve(importing_path, name)?;
        let source = std::fs::read_to_string(&path)
            .map_err(|io_error| format!("unable to read '{}': {io_error}", path.display()))?;
        Ok((path.display().to_string(), source))
    }

    fn load_raw(&mut self, importing_path: &str, name: &str) -> Result<String, String> {
        let base = Path::new(importing_path)
            .parent()
            .unwrap_or_else(|| Path::new("."));
        let path = base.join(name);
        std::fs::read_to_string(&path)
            .map_err(|io_error| format!("unable to read '{}': {io_error}", path.display()))
    }
}

/// Read a root source file; `-` means standard input.
pub fn read_root(path: &str) -> Result<(String, String), String> {
    if path == "-" {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .map_err(|io_error| format!("unable to read stdin: {io_error}"))?;
        Ok(("(stdin)".to_string(), source))
    } else {
        let source = std::fs::read_to_string(path)
            .map_err(|io_error| format!("unable to read '{path}': {io_error}"))?;
        Ok((path.to_string(), source))
    }
}
