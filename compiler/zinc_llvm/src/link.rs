//! Linker driver.
//!
//! Collects the object file plus the compilation's libraries, search
//! paths, frameworks, rpaths, and linker script into one system-linker
//! invocation (through the C compiler driver). A clean child exit code
//! propagates to the caller.

use std::path::Path;
use std::process::Command;

use tracing::info;

use zinc_sem::{CompileOptions, OutType};

/// Link an object into the final image. Returns the child's exit code on
/// failure so the driver can propagate it.
pub fn link(object: &Path, output: &Path, options: &CompileOptions) -> Result<(), (i32, String)> {
    let mut cmd = Command::new("cc");
    cmd.arg(object);
    cmd.arg("-o").arg(output);

    match options.out_type {
        OutType::Exe => {}
        OutType::Lib => {
            cmd.arg("-shared");
        }
        OutType::Obj => {
            // Nothing to do: the object is the artifact.
            return Ok(());
        }
    }

    if options.is_static {
        cmd.arg("-static");
    }
    if options.strip {
        cmd.arg("-s");
    }
    if options.rdynamic {
        cmd.arg("-rdynamic");
    }
    for dir in &options.lib_paths {
        cmd.arg("-L").arg(dir);
    }
    for lib in &options.link_libs {
        cmd.arg(format!("-l{lib}"));
    }
    for framework in &options.frameworks {
        cmd.arg("-framework").arg(framework);
    }
    for rpath in &options.rpaths {
        cmd.arg(format!("-Wl,-rpath,{}", rpath.display()));
    }
    if options.each_lib_rpath {
        for dir in &options.lib_paths {
            cmd.arg(format!("-Wl,-rpath,{}", dir.display()));
        }
    }
    if let Some(script) = &options.linker_script {
        cmd.arg("-T").arg(script);
    }
    if let Some(dynamic_linker) = &options.dynamic_linker {
        cmd.arg(format!("-Wl,-dynamic-linker,{}", dynamic_linker.display()));
    }
    if let Some(dir) = &options.libc_lib_dir {
        cmd.arg("-L").arg(dir);
    }
    if let Some(dir) = &options.libc_static_lib_dir {
        cmd.arg("-L").arg(dir);
    }
    if let Some(version) = &options.macosx_version_min {
        cmd.arg(format!("-mmacosx-version-min={version}"));
    }
    if let Some(version) = &options.ios_version_min {
        cmd.arg(format!("-mios-version-min={version}"));
    }
    if options.windows_subsystem_windows {
        cmd.arg("-mwindows");
    }
    if options.windows_subsystem_console {
        cmd.arg("-mconsole");
    }
    if options.windows_unicode {
        cmd.arg("-municode");
    }

    if options.verbose {
        info!(?cmd, "invoking linker");
    }
    let status = cmd
        .status()
        .map_err(|io_error| (1, format!("unable to spawn linker: {io_error}")))?;
    if status.success() {
        Ok(())
    } else {
        let code = status.code().unwrap_or(1);
        Err((code, format!("linker exited with code {code}")))
    }
}
