//! Semantic core of the zinc compiler.
//!
//! Everything hangs off an explicit [`Compilation`] value: interners,
//! arenas, the import/declaration/function tables, the work queues, and
//! the accumulated diagnostics. There is no global state; the value is
//! threaded through every operation.
//!
//! The pipeline is single-threaded and cooperative. [`Compilation::run`]
//! drains the work queues in order — imports, declaration resolution,
//! function definitions — and each drained item may append new work.
//! Suspension is expressed with marker states (`Resolving`, `Probing`),
//! never with a scheduler.

pub mod builtins;
pub mod fns;
pub mod ir;
pub mod resolve;
pub mod scope;
pub mod tld;

#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::path::PathBuf;

use rustc_hash::FxHashMap;
use tracing::debug;

use zinc_diagnostic::{ColorMode, Diagnostic, Sink};
use zinc_ir::ast::{NodeArena, NodeId};
use zinc_ir::{LineIndex, Name, Span, StringInterner};
use zinc_types::{
    ConstValue, ErrorId, FnId, GenericInstances, ImportId, TypeId, TypeTable, ValueArena, ValueId,
};

use builtins::Builtins;
use fns::{FnAnalState, FnEntry};
use scope::{Scope, ScopeArena, ScopeId, ScopeKind};
use tld::{GlobalVar, Tld, TldId};

/// Kind of artifact being produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutType {
    Exe,
    Lib,
    Obj,
}

/// Driver-facing configuration, threaded through the compilation.
#[derive(Debug)]
pub struct CompileOptions {
    pub out_type: OutType,
    pub out_name: Option<String>,
    pub out_path: Option<PathBuf>,
    pub is_release: bool,
    pub is_static: bool,
    pub strip: bool,
    pub color: ColorMode,
    pub verbose: bool,
    pub target_arch: Option<String>,
    pub target_os: Option<String>,
    pub target_environ: Option<String>,
    pub link_libs: Vec<String>,
    pub lib_paths: Vec<PathBuf>,
    pub isystem_dirs: Vec<PathBuf>,
    pub dirafter_dirs: Vec<PathBuf>,
    pub frameworks: Vec<String>,
    pub linker_script: Option<PathBuf>,
    pub rpaths: Vec<PathBuf>,
    pub each_lib_rpath: bool,
    pub rdynamic: bool,
    pub windows_subsystem_windows: bool,
    pub windows_subsystem_console: bool,
    pub windows_unicode: bool,
    pub macosx_version_min: Option<String>,
    pub ios_version_min: Option<String>,
    pub libc_lib_dir: Option<PathBuf>,
    pub libc_static_lib_dir: Option<PathBuf>,
    pub libc_include_dir: Option<PathBuf>,
    pub std_dir: Option<PathBuf>,
    pub dynamic_linker: Option<PathBuf>,
    pub test_filter: Option<String>,
    pub test_name_prefix: Option<String>,
    pub is_test: bool,
}

impl Default for CompileOptions {
    fn default() -> CompileOptions {
        CompileOptions {
            out_type: OutType::Exe,
            out_name: None,
            out_path: None,
            is_release: false,
            is_static: false,
            strip: false,
            color: ColorMode::Auto,
            verbose: false,
            target_arch: None,
            target_os: None,
            target_environ: None,
            link_libs: Vec::new(),
            lib_paths: Vec::new(),
            isystem_dirs: Vec::new(),
            dirafter_dirs: Vec::new(),
            frameworks: Vec::new(),
            linker_script: None,
            rpaths: Vec::new(),
            each_lib_rpath: false,
            rdynamic: false,
            windows_subsystem_windows: false,
            windows_subsystem_console: false,
            windows_unicode: false,
            macosx_version_min: None,
            ios_version_min: None,
            libc_lib_dir: None,
            libc_static_lib_dir: None,
            libc_include_dir: None,
            std_dir: None,
            dynamic_linker: None,
            test_filter: None,
            test_name_prefix: None,
            is_test: false,
        }
    }
}

/// Loads package sources for `@import`. The file system lives behind
/// this seam; tests substitute an in-memory map.
pub trait SourceLoader {
    /// Resolve an import name relative to the importing file; returns
    /// `(display path, source text)`.
    fn load(&mut self, importing_path: &str, name: &str) -> Result<(String, String), String>;

    /// Raw file contents for `@embedFile`.
    fn load_raw(&mut self, importing_path: &str, name: &str) -> Result<String, String> {
        self.load(importing_path, name).map(|(_, source)| source)
    }
}

/// Translates C headers for `@cImport`. The real importer is an external
/// collaborator; the default reports that the capability is absent.
pub trait CImporter {
    fn import(&mut self, source_fragment: &str) -> Result<(String, String), String> {
        let _ = source_fragment;
        Err("C import is not available in this build".to_string())
    }
}

struct DisabledCImporter;
impl CImporter for DisabledCImporter {}

/// One loaded source file.
pub struct Import {
    pub path: String,
    pub source: String,
    pub line_index: LineIndex,
    pub arena: NodeArena,
    pub root_node: NodeId,
    pub decls_scope: ScopeId,
    /// The namespace type representing this file.
    pub namespace_ty: TypeId,
}

/// A declared local or global variable.
#[derive(Debug)]
pub struct Variable {
    pub name: Name,
    pub is_const: bool,
    pub is_comptime: bool,
    pub decl_node: NodeId,
    pub import: ImportId,
    pub ty: TypeId,
    /// Arena slot holding the variable's compile-time contents (or a
    /// runtime marker for runtime variables).
    pub mem: ValueId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

impl VarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One declared error value; `value` is its runtime integer code.
#[derive(Debug)]
pub struct ErrorValue {
    pub name: Name,
    pub value: u32,
    pub decl_node: NodeId,
    pub import: ImportId,
}

/// Default backward-branch quota for comptime execution.
pub const DEFAULT_BACKWARD_BRANCH_QUOTA: u32 = 1000;

pub struct Compilation {
    pub interner: StringInterner,
    pub types: TypeTable,
    pub values: ValueArena,
    pub generics: GenericInstances,
    pub diagnostics: Sink,
    pub scopes: ScopeArena,
    pub imports: Vec<Import>,
    pub import_table: FxHashMap<String, ImportId>,
    pub tlds: Vec<Tld>,
    pub fns: Vec<FnEntry>,
    pub vars: Vec<Variable>,
    pub globals: Vec<GlobalVar>,
    pub error_values: Vec<ErrorValue>,
    pub error_table: FxHashMap<Name, ErrorId>,
    /// Set once any reachable `@errName` forces the name table out.
    pub err_name_table_needed: bool,
    /// Decls scope of each container type, for member lookup and field
    /// resolution.
    pub container_scopes: FxHashMap<TypeId, ScopeId>,
    pub builtins: Builtins,
    pub options: CompileOptions,
    pub backward_branch_quota: u32,
    /// Backward branches consumed by the current comptime evaluation
    /// (shared across nested frames, reset at the outermost entry).
    pub backward_branch_count: u32,
    /// Nesting depth of comptime evaluation.
    pub eval_depth: u32,
    /// Pure comptime function evaluations, memoized by the call site's
    /// scope identity. Dynamic calls inside a running evaluation stay
    /// unmemoized so recursion is bounded by the branch quota.
    pub memoized_evals: FxHashMap<(ScopeId, NodeId), ConstValue>,
    pub root_import: Option<ImportId>,
    pub main_fn: Option<FnId>,
    pub panic_fn: Option<FnId>,
    pub test_fns: Vec<FnId>,

    resolve_queue: VecDeque<TldId>,
    fn_defs_queue: VecDeque<FnId>,
    use_queue: VecDeque<(ScopeId, NodeId)>,

    loader: Box<dyn SourceLoader>,
    pub c_importer: Box<dyn CImporter>,
}

impl Compilation {
    pub fn new(options: CompileOptions, loader: Box<dyn SourceLoader>) -> Compilation {
        let interner = StringInterner::new();
        let types = TypeTable::new(&interner, 64);
        let builtins = Builtins::new(&interner);
        Compilation {
            interner,
            types,
            values: ValueArena::new(),
            generics: GenericInstances::new(),
            diagnostics: Sink::new(),
            scopes: ScopeArena::new(),
            imports: Vec::new(),
            import_table: FxHashMap::default(),
            tlds: Vec::new(),
            fns: Vec::new(),
            vars: Vec::new(),
            globals: Vec::new(),
            error_values: Vec::new(),
            error_table: FxHashMap::default(),
            err_name_table_needed: false,
            container_scopes: FxHashMap::default(),
            builtins,
            options,
            backward_branch_quota: DEFAULT_BACKWARD_BRANCH_QUOTA,
            backward_branch_count: 0,
            eval_depth: 0,
            memoized_evals: FxHashMap::default(),
            root_import: None,
            main_fn: None,
            panic_fn: None,
            test_fns: Vec::new(),
            resolve_queue: VecDeque::new(),
            fn_defs_queue: VecDeque::new(),
            use_queue: VecDeque::new(),
            loader,
            c_importer: Box::new(DisabledCImporter),
        }
    }

    /// Lex, parse, and scan one source file; returns its import handle.
    pub fn add_source(&mut self, path: String, source: String) -> Result<ImportId, ()> {
        if let Some(&existing) = self.import_table.get(&path) {
            return Ok(existing);
        }
        let import_id = ImportId(self.imports.len() as u32);

        let line_index = LineIndex::new(&source);
        let tokens = match zinc_lexer::lex(&source, &self.interner) {
            Ok(tokens) => tokens,
            Err(lex_error) => {
                // The emitter needs the file registered even on failure.
                self.register_failed_import(path, source, line_index, import_id);
                self.diagnostics.push(Diagnostic::error(
                    import_id.0,
                    lex_error.span,
                    lex_error.message,
                ));
                return Err(());
            }
        };

        let parsed = match zinc_parse::parse(&tokens, &self.interner) {
            Ok(parsed) => parsed,
            Err(parse_error) => {
                self.register_failed_import(path, source, line_index, import_id);
                self.diagnostics.push(Diagnostic::error(
                    import_id.0,
                    parse_error.span,
                    parse_error.message,
                ));
                return Err(());
            }
        };

        let namespace_ty = self
            .types
            .namespace_type(import_id, format!("(namespace '{path}')"));
        let decls_scope = self.scopes.alloc(Scope {
            parent: None,
            node: parsed.root,
            import: import_id,
            kind: ScopeKind::Decls {
                decls: FxHashMap::default(),
                decl_order: Vec::new(),
                safety_off: false,
                container_ty: None,
            },
        });

        self.import_table.insert(path.clone(), import_id);
        self.imports.push(Import {
            path,
            source,
            line_index,
            arena: parsed.arena,
            root_node: parsed.root,
            decls_scope,
            namespace_ty,
        });
        if self.root_import.is_none() {
            self.root_import = Some(import_id);
        }

        self.scan_import_decls(import_id);
        Ok(import_id)
    }

    fn register_failed_import(
        &mut self,
        path: String,
        source: String,
        line_index: LineIndex,
        import_id: ImportId,
    ) {
        let namespace_ty = self
            .types
            .namespace_type(import_id, format!("(namespace '{path}')"));
        let decls_scope = self.scopes.alloc(Scope {
            parent: None,
            node: NodeId::new(0),
            import: import_id,
            kind: ScopeKind::Decls {
                decls: FxHashMap::default(),
                decl_order: Vec::new(),
                safety_off: false,
                container_ty: None,
            },
        });
        self.import_table.insert(path.clone(), import_id);
        self.imports.push(Import {
            path,
            source,
            line_index,
            arena: NodeArena::new(),
            root_node: NodeId::new(0),
            decls_scope,
            namespace_ty,
        });
    }

    /// Raw file contents for `@embedFile`.
    pub fn load_raw(&mut self, importing: ImportId, name: &str) -> Result<String, String> {
        let importing_path = self.imports[importing.index()].path.clone();
        self.loader.load_raw(&importing_path, name)
    }

    /// Load and register an imported package/file by name.
    pub fn load_import(&mut self, importing: ImportId, name: &str) -> Result<ImportId, String> {
        let importing_path = self.imports[importing.index()].path.clone();
        let (path, source) = self.loader.load(&importing_path, name)?;
        if let Some(&existing) = self.import_table.get(&path) {
            return Ok(existing);
        }
        self.add_source(path, source)
            .map_err(|()| "import failed to parse".to_string())
    }

    /// Main loop: drain all work queues until quiescent.
    pub fn run(&mut self) {
        loop {
            if let Some((scope, node)) = self.use_queue.pop_front() {
                self.resolve_use_decl(scope, node);
                continue;
            }
            if let Some(tld_id) = self.resolve_queue.pop_front() {
                self.resolve_tld(tld_id);
                continue;
            }
            if let Some(fn_id) = self.fn_defs_queue.pop_front() {
                self.analyze_fn_body(fn_id);
                continue;
            }
            break;
        }
        debug!(
            fns = self.fns.len(),
            types = self.types.entry_count(),
            errors = self.diagnostics.error_count(),
            "compilation quiesced"
        );
    }

    pub(crate) fn queue_resolve(&mut self, tld_id: TldId) {
        self.resolve_queue.push_back(tld_id);
    }

    pub(crate) fn queue_fn_def(&mut self, fn_id: FnId) {
        self.fn_defs_queue.push_back(fn_id);
    }

    pub(crate) fn queue_use(&mut self, scope: ScopeId, node: NodeId) {
        self.use_queue.push_back((scope, node));
    }

    pub fn tld(&self, id: TldId) -> &Tld {
        &self.tlds[id.index()]
    }

    pub fn tld_mut(&mut self, id: TldId) -> &mut Tld {
        &mut self.tlds[id.index()]
    }

    pub fn fn_entry(&self, id: FnId) -> &FnEntry {
        &self.fns[id.index()]
    }

    pub fn fn_entry_mut(&mut self, id: FnId) -> &mut FnEntry {
        &mut self.fns[id.index()]
    }

    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id.index()]
    }

    pub fn import(&self, id: ImportId) -> &Import {
        &self.imports[id.index()]
    }

    pub fn node_span(&self, import: ImportId, node: NodeId) -> Span {
        self.imports[import.index()].arena.span(node)
    }

    /// Record an error diagnostic against a node.
    pub fn add_node_error(
        &mut self,
        import: ImportId,
        node: NodeId,
        message: impl Into<String>,
    ) -> ConstValue {
        let span = self.node_span(import, node);
        self.diagnostics
            .push(Diagnostic::error(import.0, span, message));
        ConstValue::invalid()
    }

    /// Register an error value declaration, assigning the next code.
    /// Error code 0 is reserved so a zero error is always invalid.
    pub fn add_error_value(&mut self, name: Name, decl_node: NodeId, import: ImportId) -> ErrorId {
        if let Some(&existing) = self.error_table.get(&name) {
            return existing;
        }
        let id = ErrorId(self.error_values.len() as u32);
        self.error_values.push(ErrorValue {
            name,
            value: id.0 + 1,
            decl_node,
            import,
        });
        self.error_table.insert(name, id);
        id
    }

    pub fn analyze_fn_body(&mut self, fn_id: FnId) {
        let state = self.fn_entry(fn_id).anal_state;
        match state {
            FnAnalState::Ready => {}
            FnAnalState::Complete | FnAnalState::Invalid => return,
            FnAnalState::Probing => {
                let (import, node) = {
                    let entry = self.fn_entry(fn_id);
                    (entry.import, entry.proto_node)
                };
                let name = self.fn_entry(fn_id).symbol_name.clone();
                self.add_node_error(
                    import,
                    node,
                    format!("function '{name}' depends on itself"),
                );
                self.fn_entry_mut(fn_id).anal_state = FnAnalState::Invalid;
                return;
            }
        }
        ir::analyze::analyze_fn(self, fn_id);
    }

    /// Total error count across all phases.
    pub fn error_count(&self) -> usize {
        self.diagnostics.error_count()
    }

    /// Test-only pseudo-file so diagnostics have something to anchor to.
    #[cfg(test)]
    pub(crate) fn test_import(&mut self) -> ImportId {
        let import_id = ImportId(self.imports.len() as u32);
        let mut arena = NodeArena::new();
        let root = arena.alloc(zinc_ir::ast::NodeKind::NullLiteral, Span::DUMMY);
        let namespace_ty = self
            .types
            .namespace_type(import_id, "(namespace '(test)')".to_string());
        let decls_scope = self.scopes.alloc(Scope {
            parent: None,
            node: root,
            import: import_id,
            kind: ScopeKind::Decls {
                decls: FxHashMap::default(),
                decl_order: Vec::new(),
                safety_off: false,
                container_ty: None,
            },
        });
        self.imports.push(Import {
            path: "(test)".to_string(),
            source: String::new(),
            line_index: LineIndex::new(""),
            arena,
            root_node: root,
            decls_scope,
            namespace_ty,
        });
        import_id
    }
}
