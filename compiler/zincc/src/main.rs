//! zinc compiler CLI.
//!
//! Subcommands: `build_exe`, `build_lib`, `build_obj`, `link_exe`,
//! `link_lib`, `asm`, `parseh`, `test`, `version`, `targets`, `build`.
//! Exit codes: 0 on success, 1 on compile failure or I/O error; a child
//! process's clean exit code propagates.

mod loader;
mod tracing_setup;

use std::path::PathBuf;
use std::process::ExitCode;

use zinc_diagnostic::{ColorMode, Emitter, SourceFile};
use zinc_sem::{CompileOptions, Compilation, OutType};

fn main() -> ExitCode {
    tracing_setup::init();
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() {
        print_usage();
        return ExitCode::from(1);
    }

    match args[0].as_str() {
        "version" => {
            println!("zinc {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        "targets" => {
            println!("{}", native_triple());
            ExitCode::SUCCESS
        }
        "build_exe" => run_build(&args[1..], OutType::Exe, false),
        "build_lib" => run_build(&args[1..], OutType::Lib, false),
        "build_obj" => run_build(&args[1..], OutType::Obj, false),
        // link_* accept prebuilt objects; the pipeline is the same with
        // codegen skipped, so they reuse run_build's option parsing.
        "link_exe" => run_link(&args[1..], OutType::Exe),
        "link_lib" => run_link(&args[1..], OutType::Lib),
        "asm" => run_asm(&args[1..]),
        "test" => run_build(&args[1..], OutType::Exe, true),
        "build" => {
            let mut forwarded = vec!["build.zn".to_string()];
            forwarded.extend(args[1..].iter().cloned());
            run_build(&forwarded, OutType::Exe, false)
        }
        "parseh" => {
            eprintln!("error: C header import is not available in this build");
            ExitCode::from(1)
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        other => {
            eprintln!("error: unknown command: {other}");
            print_usage();
            ExitCode::from(1)
        }
    }
}

fn native_triple() -> String {
    inkwell::targets::TargetMachine::get_default_triple()
        .as_str()
        .to_string_lossy()
        .into_owned()
}

struct ParsedArgs {
    root: Option<String>,
    options: CompileOptions,
}

fn parse_options(args: &[String], out_type: OutType, is_test: bool) -> Result<ParsedArgs, String> {
    let mut options = CompileOptions {
        out_type,
        is_test,
        ..CompileOptions::default()
    };
    let mut root = None;

    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        let mut next_value = |flag: &str| -> Result<String, String> {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("expected argument after {flag}"))
        };
        match arg.as_str() {
            "--output" => options.out_path = Some(PathBuf::from(next_value("--output")?)),
            "--name" => options.out_name = Some(next_value("--name")?),
            "--release" => options.is_release = true,
            "--static" => options.is_static = true,
            "--strip" => options.strip = true,
            "--verbose" => options.verbose = true,
            "--color" => {
                options.color = match next_value("--color")?.as_str() {
                    "auto" => ColorMode::Auto,
                    "on" => ColorMode::On,
                    "off" => ColorMode::Off,
                    other => return Err(format!("invalid --color value: {other}")),
                };
            }
            "--target-arch" => options.target_arch = Some(next_value("--target-arch")?),
            "--target-os" => options.target_os = Some(next_value("--target-os")?),
            "--target-environ" => options.target_environ = Some(next_value("--target-environ")?),
            "--library" => options.link_libs.push(next_value("--library")?),
            "--library-path" => options.lib_paths.push(PathBuf::from(next_value("--library-path")?)),
            "-isystem" => options.isystem_dirs.push(PathBuf::from(next_value("-isystem")?)),
            "-dirafter" => options.dirafter_dirs.push(PathBuf::from(next_value("-dirafter")?)),
            "-framework" => options.frameworks.push(next_value("-framework")?),
            "--linker-script" => {
                options.linker_script = Some(PathBuf::from(next_value("--linker-script")?));
            }
            "-rpath" => options.rpaths.push(PathBuf::from(next_value("-rpath")?)),
            "--each-lib-rpath" => options.each_lib_rpath = true,
            "-rdynamic" => options.rdynamic = true,
            "-mwindows" => options.windows_subsystem_windows = true,
            "-mconsole" => options.windows_subsystem_console = true,
            "-municode" => options.windows_unicode = true,
            "-mmacosx-version-min" => {
                options.macosx_version_min = Some(next_value("-mmacosx-version-min")?);
            }
            "-mios-version-min" => {
                options.ios_version_min = Some(next_value("-mios-version-min")?);
            }
            "--libc-lib-dir" => {
                options.libc_lib_dir = Some(PathBuf::from(next_value("--libc-lib-dir")?));
            }
            "--libc-static-lib-dir" => {
                options.libc_static_lib_dir =
                    Some(PathBuf::from(next_value("--libc-static-lib-dir")?));
            }
            "--libc-include-dir" => {
                options.libc_include_dir = Some(PathBuf::from(next_value("--libc-include-dir")?));
            }
            "--zinc-std-dir" => options.std_dir = Some(PathBuf::from(next_value("--zinc-std-dir")?)),
            "--dynamic-linker" => {
                options.dynamic_linker = Some(PathBuf::from(next_value("--dynamic-linker")?));
            }
            "--test-filter" => options.test_filter = Some(next_value("--test-filter")?),
            "--test-name-prefix" => options.test_name_prefix = Some(next_value("--test-name-prefix")?),
            other if other.starts_with("-L") && other.len() > 2 => {
                options.lib_paths.push(PathBuf::from(&other[2..]));
            }
            other if other.starts_with('-') && other != "-" => {
                return Err(format!("unrecognized option: {other}"));
            }
            _ => {
                if root.is_some() {
                    return Err(format!("unexpected extra argument: {arg}"));
                }
                root = Some(arg.clone());
            }
        }
    }
    Ok(ParsedArgs { root, options })
}

fn run_build(args: &[String], out_type: OutType, is_test: bool) -> ExitCode {
    let parsed = match parse_options(args, out_type, is_test) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::from(1);
        }
    };
    let Some(root) = parsed.root else {
        eprintln!("error: expected source file");
        return ExitCode::from(1);
    };
    match compile(&root, parsed.options, false) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run_asm(args: &[String]) -> ExitCode {
    let parsed = match parse_options(args, OutType::Obj, false) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::from(1);
        }
    };
    let Some(root) = parsed.root else {
        eprintln!("error: expected source file");
        return ExitCode::from(1);
    };
    match compile(&root, parsed.options, true) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run_link(args: &[String], out_type: OutType) -> ExitCode {
    let parsed = match parse_options(args, out_type, false) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::from(1);
        }
    };
    let Some(object) = parsed.root else {
        eprintln!("error: expected object file");
        return ExitCode::from(1);
    };
    let output = output_path(&parsed.options, &object);
    match zinc_llvm::link::link(std::path::Path::new(&object), &output, &parsed.options) {
        Ok(()) => ExitCode::SUCCESS,
        Err((code, message)) => {
            eprintln!("error: {message}");
            ExitCode::from(code.clamp(1, 255) as u8)
        }
    }
}

fn output_path(options: &CompileOptions, root: &str) -> PathBuf {
    if let Some(out_path) = &options.out_path {
        return out_path.clone();
    }
    let stem = options.out_name.clone().unwrap_or_else(|| {
        std::path::Path::new(root)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "out".to_string())
    });
    match options.out_type {
        OutType::Exe => PathBuf::from(stem),
        OutType::Lib => PathBuf::from(format!("lib{stem}.so")),
        OutType::Obj => PathBuf::from(format!("{stem}.o")),
    }
}

/// Full pipeline for one root file. Returns the process exit code on
/// failure.
fn compile(root: &str, options: CompileOptions, print_ir_only: bool) -> Result<(), u8> {
    let (path, source) = loader::read_root(root).map_err(|message| {
        eprintln!("error: {message}");
        1u8
    })?;

    let color = options.color;
    let std_dir = options.std_dir.clone();
    let fs_loader = loader::FsLoader::new(std_dir);
    let mut comp = Compilation::new(options, Box::new(fs_loader));

    let added = comp.add_source(path, source);
    if added.is_ok() {
        comp.run();
    }

    // Flush accumulated diagnostics in source order.
    if comp.error_count() > 0 || !comp.diagnostics.is_empty() {
        let files: Vec<SourceFile> = comp
            .imports
            .iter()
            .map(|import| SourceFile::new(import.path.clone(), import.source.clone()))
            .collect();
        let had_errors = comp.error_count() > 0;
        let diagnostics = comp.diagnostics.drain_sorted();
        Emitter::new(color).emit_all(&diagnostics, &files);
        if had_errors {
            return Err(1);
        }
    }

    let context = inkwell::context::Context::create();
    let module_name = comp
        .options
        .out_name
        .clone()
        .unwrap_or_else(|| "zinc_module".to_string());
    let mut codegen = zinc_llvm::Codegen::new(&context, &mut comp, &module_name).map_err(|message| {
        eprintln!("error: {message}");
        1u8
    })?;
    codegen.emit_module().map_err(|message| {
        eprintln!("error: {message}");
        1u8
    })?;

    if print_ir_only {
        println!("{}", codegen.print_ir());
        return Ok(());
    }

    let output = output_path(&codegen.comp.options, root);
    let object_path = if codegen.comp.options.out_type == OutType::Obj {
        output.clone()
    } else {
        output.with_extension("o")
    };
    codegen.write_object(&object_path).map_err(|message| {
        eprintln!("error: {message}");
        1u8
    })?;

    if codegen.comp.options.out_type != OutType::Obj {
        zinc_llvm::link::link(&object_path, &output, &codegen.comp.options).map_err(
            |(code, message)| {
                eprintln!("error: {message}");
                code.clamp(1, 255) as u8
            },
        )?;
    }

    // Test builds run immediately; the child's exit code propagates.
    if codegen.comp.options.is_test {
        let status = std::process::Command::new(
            std::path::Path::new(".").join(&output),
        )
        .status()
        .map_err(|io_error| {
            eprintln!("error: unable to run tests: {io_error}");
            1u8
        })?;
        if !status.success() {
            return Err(status.code().unwrap_or(1).clamp(1, 255) as u8);
        }
    }
    Ok(())
}

fn print_usage() {
    println!("Usage: zincc <command> [options] <file>");
    println!();
    println!("Commands:");
    println!("  build_exe <file.zn>   Build an executable");
    println!("  build_lib <file.zn>   Build a shared library");
    println!("  build_obj <file.zn>   Build an object file");
    println!("  link_exe <file.o>     Link an object into an executable");
    println!("  link_lib <file.o>     Link an object into a library");
    println!("  asm <file.zn>         Print generated IR");
    println!("  test <file.zn>        Build and run tests");
    println!("  build                 Build using build.zn");
    println!("  parseh <file.h>       Import a C header (unavailable)");
    println!("  targets               Print supported targets");
    println!("  version               Print version");
    println!();
    println!("Options:");
    println!("  --output <path>       Output file path");
    println!("  --name <name>         Artifact name");
    println!("  --release             Optimized build, safety checks off");
    println!("  --static              Static link");
    println!("  --strip               Omit debug info");
    println!("  --color auto|on|off   Diagnostic color mode");
    println!("  --target-arch <arch>  Target architecture");
    println!("  --target-os <os>      Target operating system");
    println!("  --target-environ <e>  Target environment");
    println!("  --library <name>      Link against a library");
    println!("  --library-path <dir>  Library search path (alias -L<dir>)");
    println!("  -isystem <dir>        C system include path");
    println!("  -dirafter <dir>       C include path, searched last");
    println!("  -framework <name>     macOS framework");
    println!("  --linker-script <p>   Linker script");
    println!("  -rpath <path>         Runtime search path");
    println!("  --each-lib-rpath      Add an rpath per library path");
    println!("  -rdynamic             Export all symbols");
    println!("  --zinc-std-dir <dir>  Standard library directory");
    println!("  --dynamic-linker <p>  Dynamic linker path");
    println!("  --test-filter <text>  Only run matching tests");
    println!("  --test-name-prefix <text>  Prefix test names");
    println!("  --verbose             Verbose output");
}
