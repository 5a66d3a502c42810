//! Lazy top-level declaration resolution.
//!
//! Scanning walks a file's (or container's) declarations into a `Decls`
//! scope and queues each for resolution. Resolution is idempotent and
//! cycle-aware: `Unresolved → Resolving → {Ok, Invalid}`, where hitting
//! `Resolving` again means the declaration depends on itself.

use tracing::trace;

use zinc_ir::ast::{CallingConv, NodeId, NodeKind, VisibMod};
use zinc_ir::Name;
use zinc_types::{ConstData, ConstValue, FnId, FnParam, FnTypeKey, ImportId, TypeId};

use crate::fns::{FnAnalState, FnEntry, FnInline, Linkage, ParamInfo};
use crate::ir::eval::{analyze_const_expr, analyze_const_expr_named, resolve_type_expr};
use crate::scope::{Scope, ScopeId, ScopeKind};
use crate::tld::{GlobalId, GlobalVar, Tld, TldId, TldKind, TldResolution};
use crate::Compilation;

impl Compilation {
    /// Scan a file's top-level declarations into its decls scope.
    pub(crate) fn scan_import_decls(&mut self, import: ImportId) {
        let (root_node, scope) = {
            let entry = self.import(import);
            (entry.root_node, entry.decls_scope)
        };
        let decls: Vec<NodeId> = match self.import(import).arena.kind(root_node) {
            NodeKind::Root { decls } => self.import(import).arena.list(*decls).to_vec(),
            _ => return,
        };
        self.scan_decls(scope, import, &decls);
    }

    /// Scan a declaration list into a `Decls` scope, queueing resolution
    /// in source order.
    pub(crate) fn scan_decls(&mut self, scope: ScopeId, import: ImportId, nodes: &[NodeId]) {
        for &node in nodes {
            let kind = self.import(import).arena.kind(node).clone();
            match kind {
                NodeKind::VarDecl(decl) => {
                    let tld = self.add_tld(
                        scope,
                        import,
                        node,
                        decl.name,
                        decl.visib,
                        TldKind::Var {
                            value: None,
                            var_ty: TypeId::INVALID,
                            is_const: decl.is_const,
                            global: None,
                        },
                    );
                    self.queue_resolve(tld);
                }
                NodeKind::FnDef { proto, .. } | NodeKind::FnDecl { proto } => {
                    let (name, visib) = match self.import(import).arena.kind(proto) {
                        NodeKind::FnProto(p) => (p.name, p.visib),
                        _ => continue,
                    };
                    let tld = self.add_tld(
                        scope,
                        import,
                        node,
                        name,
                        visib,
                        TldKind::Fn { fn_id: None },
                    );
                    self.queue_resolve(tld);
                }
                NodeKind::ErrorValueDecl { name, .. } => {
                    self.add_error_value(name, node, import);
                }
                NodeKind::Use { .. } => {
                    self.queue_use(scope, node);
                }
                NodeKind::TestDecl { name, body } => {
                    if self.options.is_test {
                        self.create_test_fn(scope, import, node, name, body);
                    }
                }
                NodeKind::Comptime { .. } => {
                    let tld = self.add_tld(
                        scope,
                        import,
                        node,
                        Name::EMPTY,
                        VisibMod::Private,
                        TldKind::Comptime { block_node: node },
                    );
                    self.queue_resolve(tld);
                }
                _ => {
                    self.add_node_error(import, node, "invalid top-level declaration");
                }
            }
        }
    }

    fn add_tld(
        &mut self,
        scope: ScopeId,
        import: ImportId,
        node: NodeId,
        name: Name,
        visib: VisibMod,
        kind: TldKind,
    ) -> TldId {
        let tld_id = TldId(self.tlds.len() as u32);
        self.tlds.push(Tld {
            kind,
            name,
            visib,
            source_node: node,
            import,
            parent_scope: scope,
            resolution: TldResolution::Unresolved,
            dep_loop_flag: false,
        });
        if name != Name::EMPTY {
            let duplicate = matches!(
                &self.scopes.get(scope).kind,
                ScopeKind::Decls { decls, .. } if decls.contains_key(&name)
            );
            if duplicate {
                let text = self.interner.lookup(name);
                let message = format!("redefinition of '{text}'");
                self.add_node_error(import, node, message);
            } else if let ScopeKind::Decls {
                decls, decl_order, ..
            } = &mut self.scopes.get_mut(scope).kind
            {
                decls.insert(name, tld_id);
                decl_order.push(tld_id);
            }
        }
        tld_id
    }

    /// Resolve one declaration, diagnosing dependency cycles.
    pub(crate) fn resolve_tld(&mut self, tld_id: TldId) {
        match self.tld(tld_id).resolution {
            TldResolution::Ok | TldResolution::Invalid => return,
            TldResolution::Resolving => {
                let (import, node, name) = {
                    let tld = self.tld(tld_id);
                    (tld.import, tld.source_node, tld.name)
                };
                let text = self.interner.lookup(name);
                let message = format!("'{text}' depends on itself");
                self.add_node_error(import, node, message);
                self.tld_mut(tld_id).resolution = TldResolution::Invalid;
                return;
            }
            TldResolution::Unresolved => {}
        }
        self.tld_mut(tld_id).resolution = TldResolution::Resolving;

        let (import, node) = {
            let tld = self.tld(tld_id);
            (tld.import, tld.source_node)
        };
        let ok = match &self.tld(tld_id).kind {
            TldKind::Var { .. } => self.resolve_var_tld(tld_id, import, node),
            TldKind::Fn { .. } => self.resolve_fn_tld(tld_id, import, node),
            TldKind::Comptime { block_node } => {
                let block = *block_node;
                self.resolve_comptime_tld(tld_id, import, block)
            }
        };

        // A cycle error may have already demoted us.
        if self.tld(tld_id).resolution == TldResolution::Resolving {
            self.tld_mut(tld_id).resolution = if ok {
                TldResolution::Ok
            } else {
                TldResolution::Invalid
            };
        }
    }

    fn resolve_var_tld(&mut self, tld_id: TldId, import: ImportId, node: NodeId) -> bool {
        let decl = match self.import(import).arena.kind(node) {
            NodeKind::VarDecl(decl) => (**decl).clone(),
            _ => return false,
        };
        let scope = self.tld(tld_id).parent_scope;

        let explicit_ty = decl.ty.map(|ty_node| resolve_type_expr(self, scope, ty_node));
        if explicit_ty == Some(TypeId::INVALID) {
            return false;
        }

        let value = match decl.init {
            Some(init) => {
                analyze_const_expr_named(self, scope, init, explicit_ty, Some(decl.name))
            }
            None if decl.is_extern => {
                let ty = match explicit_ty {
                    Some(ty) => ty,
                    None => {
                        self.add_node_error(
                            import,
                            node,
                            "extern variable must have a type annotation",
                        );
                        return false;
                    }
                };
                ConstValue::runtime(ty)
            }
            None => {
                self.add_node_error(import, node, "variables must be initialized");
                return false;
            }
        };
        if value.is_invalid() {
            return false;
        }
        let var_ty = explicit_ty.unwrap_or(value.ty);

        // Untyped literals must land in a concrete type to get storage.
        let needs_storage = !decl.is_const || decl.is_extern;
        if needs_storage
            && matches!(var_ty, TypeId::NUM_LIT_INT | TypeId::NUM_LIT_FLOAT)
        {
            let name = self.types.name(var_ty).to_string();
            self.add_node_error(
                import,
                node,
                format!("global variable of type '{name}' must be const"),
            );
            return false;
        }

        let global = if needs_storage && !self.types.get(var_ty).zero_bits {
            let global_id = GlobalId(self.globals.len() as u32);
            let name_text = self.interner.lookup(decl.name).to_string();
            self.globals.push(GlobalVar {
                name: name_text,
                ty: var_ty,
                init: value.clone(),
                is_const: decl.is_const,
                is_extern: decl.is_extern,
                is_export: decl.is_export,
                alignment: None,
                section: None,
            });
            Some(global_id)
        } else {
            None
        };

        let container_ty = value.as_type().filter(|&ty| self.types.get(ty).is_container());

        if let TldKind::Var {
            value: slot,
            var_ty: ty_slot,
            global: global_slot,
            ..
        } = &mut self.tld_mut(tld_id).kind
        {
            *slot = Some(value);
            *ty_slot = var_ty;
            *global_slot = global;
        }

        // A container declaration resolves its fields eagerly so layout
        // cycles surface at the declaration site. The declaration itself
        // goes visible first, since the fields may name it.
        if let Some(container_ty) = container_ty {
            self.tld_mut(tld_id).resolution = TldResolution::Ok;
            crate::ir::container::ensure_fields_resolved(self, container_ty, import, node);
        }
        true
    }

    fn resolve_fn_tld(&mut self, tld_id: TldId, import: ImportId, node: NodeId) -> bool {
        let (proto_node, body_node) = match self.import(import).arena.kind(node) {
            NodeKind::FnDef { proto, body } => (*proto, Some(*body)),
            NodeKind::FnDecl { proto } => (*proto, None),
            _ => return false,
        };
        let scope = self.tld(tld_id).parent_scope;
        let Some(fn_id) = self.resolve_fn_proto(scope, import, proto_node, body_node, None) else {
            return false;
        };

        if let TldKind::Fn { fn_id: slot } = &mut self.tld_mut(tld_id).kind {
            *slot = Some(fn_id);
        }

        let name = self.tld(tld_id).name;
        if Some(import) == self.root_import {
            let text = self.interner.lookup(name);
            if text == "main" {
                self.main_fn = Some(fn_id);
            } else if text == "panic" {
                self.panic_fn = Some(fn_id);
            }
        }
        true
    }

    /// Resolve a prototype into a function entry.
    ///
    /// For generic functions, parameter resolution stops at the first
    /// comptime/`type`/`var` parameter; everything after is deferred to
    /// instantiation, when `bound_args` supplies the comptime values.
    pub(crate) fn resolve_fn_proto(
        &mut self,
        scope: ScopeId,
        import: ImportId,
        proto_node: NodeId,
        body_node: Option<NodeId>,
        bound_args: Option<&[Option<ConstValue>]>,
    ) -> Option<FnId> {
        let proto = match self.import(import).arena.kind(proto_node) {
            NodeKind::FnProto(proto) => (**proto).clone(),
            _ => return None,
        };
        let param_nodes = self.import(import).arena.list(proto.params).to_vec();

        let fn_id = FnId(self.fns.len() as u32);
        let fndef_scope = self.scopes.alloc(Scope {
            parent: Some(scope),
            node: proto_node,
            import,
            kind: ScopeKind::FnDef { fn_id },
        });

        // Parameters chain VarDecl scopes so later parameter types (and
        // the return type) can refer to earlier comptime parameters.
        let mut param_scope = fndef_scope;
        let mut params = Vec::with_capacity(param_nodes.len());
        let mut param_vars = Vec::with_capacity(param_nodes.len());
        let mut seen_generic = false;
        let mut generic = false;

        for (i, &param_node) in param_nodes.iter().enumerate() {
            let (name, ty_node, is_noalias, is_comptime) =
                match self.import(import).arena.kind(param_node) {
                    NodeKind::ParamDecl {
                        name,
                        ty,
                        is_noalias,
                        is_comptime,
                    } => (*name, *ty, *is_noalias, *is_comptime),
                    _ => return None,
                };

            let bound = bound_args.and_then(|args| args.get(i).cloned().flatten());
            let is_var_type = matches!(
                self.import(import).arena.kind(ty_node),
                NodeKind::VarLiteral
            );

            let ty = if seen_generic && bound_args.is_none() {
                TypeId::VAR
            } else if is_var_type && bound_args.is_none() {
                TypeId::VAR
            } else if is_var_type {
                // Inferred from the bound argument at instantiation.
                bound.as_ref().map_or(TypeId::VAR, |value| value.ty)
            } else {
                resolve_type_expr(self, param_scope, ty_node)
            };

            // A parameter forces its argument to compile time when it is
            // marked `comptime`, typed `type`, or typed `var`. Parameters
            // merely deferred past the first generic one stay runtime.
            let requires_comptime =
                is_comptime || ty == TypeId::META_TYPE || is_var_type;
            if requires_comptime {
                generic = true;
                if bound_args.is_none() {
                    seen_generic = true;
                }
            } else if ty == TypeId::VAR {
                generic = true;
            }

            params.push(ParamInfo {
                name,
                ty,
                is_noalias,
                is_comptime: requires_comptime,
            });

            // Bind the parameter into the scope chain: a comptime value
            // when instantiating, otherwise a typed runtime variable.
            let value = match &bound {
                Some(value) => value.clone(),
                None => ConstValue::runtime(ty),
            };
            let var = self.add_variable(name, param_node, import, ty, true, bound.is_some(), value);
            param_vars.push(var);
            param_scope = self.scopes.alloc(Scope {
                parent: Some(param_scope),
                node: param_node,
                import,
                kind: ScopeKind::VarDecl { var },
            });
        }

        let is_instantiation = bound_args.is_some();
        let return_type = match proto.return_ty {
            Some(ret_node) if !(generic && !is_instantiation) => {
                resolve_type_expr(self, param_scope, ret_node)
            }
            Some(_) => TypeId::VAR,
            None => TypeId::VOID,
        };

        let fn_type = self.types.fn_type(FnTypeKey {
            params: params
                .iter()
                .map(|param| FnParam {
                    is_noalias: param.is_noalias,
                    ty: param.ty,
                })
                .collect(),
            return_ty: return_type,
            cc: proto.cc,
            is_var_args: proto.is_var_args,
            is_generic: generic && !is_instantiation,
        });

        let symbol_name = if proto.name == Name::EMPTY {
            format!("(anonymous fn {})", fn_id.0)
        } else {
            self.interner.lookup(proto.name).to_string()
        };

        self.fns.push(FnEntry {
            proto_node,
            body_node,
            import,
            symbol_name,
            fn_type,
            return_type,
            params,
            param_vars,
            fndef_scope: param_scope,
            anal_state: FnAnalState::Ready,
            ir: None,
            analyzed: None,
            fn_inline: if proto.is_inline {
                FnInline::Always
            } else {
                FnInline::Auto
            },
            linkage: if proto.visib == VisibMod::Export || proto.is_extern {
                Linkage::Strong
            } else {
                Linkage::Internal
            },
            alignment: None,
            section: None,
            is_extern: proto.is_extern,
            is_test: false,
            comptime_args: bound_args.map(|args| args.to_vec()),
        });

        if proto.is_extern && body_node.is_some() {
            self.add_node_error(import, proto_node, "extern functions have no body");
            return None;
        }
        if proto.cc == CallingConv::Naked && body_node.is_some() {
            // Naked functions may only contain asm; checked at analysis.
        }

        if body_node.is_some() && !(generic && !is_instantiation) {
            self.queue_fn_def(fn_id);
        }
        trace!(name = %self.fn_entry(fn_id).symbol_name, generic, "resolved fn proto");
        Some(fn_id)
    }

    fn resolve_comptime_tld(&mut self, tld_id: TldId, _import: ImportId, node: NodeId) -> bool {
        let scope = self.tld(tld_id).parent_scope;
        let import = self.tld(tld_id).import;
        let comptime_scope = self.scopes.alloc(Scope {
            parent: Some(scope),
            node,
            import,
            kind: ScopeKind::Comptime,
        });
        let block = match self.import(import).arena.kind(node) {
            NodeKind::Comptime { expr } => *expr,
            _ => return false,
        };
        let value = analyze_const_expr(self, comptime_scope, block, None);
        !value.is_invalid()
    }

    fn create_test_fn(
        &mut self,
        scope: ScopeId,
        import: ImportId,
        node: NodeId,
        name: Name,
        body: NodeId,
    ) {
        let text = self.interner.lookup(name).to_string();
        if let Some(filter) = &self.options.test_filter {
            if !text.contains(filter.as_str()) {
                return;
            }
        }
        let fn_id = FnId(self.fns.len() as u32);
        let fndef_scope = self.scopes.alloc(Scope {
            parent: Some(scope),
            node,
            import,
            kind: ScopeKind::FnDef { fn_id },
        });
        let err_void = self.types.error_union_type(TypeId::VOID);
        let fn_type = self.types.fn_type(FnTypeKey {
            params: Vec::new(),
            return_ty: err_void,
            cc: CallingConv::Unspecified,
            is_var_args: false,
            is_generic: false,
        });
        let prefix = self
            .options
            .test_name_prefix
            .clone()
            .unwrap_or_default();
        self.fns.push(FnEntry {
            proto_node: node,
            body_node: Some(body),
            import,
            symbol_name: format!("{prefix}{text}"),
            fn_type,
            return_type: err_void,
            params: Vec::new(),
            param_vars: Vec::new(),
            fndef_scope,
            anal_state: FnAnalState::Ready,
            ir: None,
            analyzed: None,
            fn_inline: FnInline::Auto,
            linkage: Linkage::Internal,
            alignment: None,
            section: None,
            is_extern: false,
            is_test: true,
            comptime_args: None,
        });
        self.test_fns.push(fn_id);
        self.queue_fn_def(fn_id);
    }

    pub(crate) fn add_variable(
        &mut self,
        name: Name,
        decl_node: NodeId,
        import: ImportId,
        ty: TypeId,
        is_const: bool,
        is_comptime: bool,
        value: ConstValue,
    ) -> crate::VarId {
        let mem = self.values.alloc(value);
        let id = crate::VarId(self.vars.len() as u32);
        self.vars.push(crate::Variable {
            name,
            is_const,
            is_comptime,
            decl_node,
            import,
            ty,
            mem,
        });
        id
    }

    /// `use` hoisting: splice the source namespace's members into the
    /// target scope in declaration order. Private members hoist too;
    /// visibility is enforced at the lookup site.
    pub(crate) fn resolve_use_decl(&mut self, scope: ScopeId, node: NodeId) {
        let import = self.scopes.get(scope).import;
        let expr = match self.import(import).arena.kind(node) {
            NodeKind::Use { expr, .. } => *expr,
            _ => return,
        };
        let value = analyze_const_expr(self, scope, expr, None);
        let Some(ConstData::Namespace(source_import)) = value.as_static().cloned() else {
            if !value.is_invalid() {
                self.add_node_error(import, node, "expected namespace in use declaration");
            }
            return;
        };

        let source_scope = self.import(source_import).decls_scope;
        let order: Vec<TldId> = match &self.scopes.get(source_scope).kind {
            ScopeKind::Decls { decl_order, .. } => decl_order.clone(),
            _ => return,
        };
        for tld_id in order {
            let name = self.tld(tld_id).name;
            if name == Name::EMPTY {
                continue;
            }
            if let ScopeKind::Decls {
                decls, decl_order, ..
            } = &mut self.scopes.get_mut(scope).kind
            {
                if let std::collections::hash_map::Entry::Vacant(entry) = decls.entry(name) {
                    entry.insert(tld_id);
                    decl_order.push(tld_id);
                }
            }
        }
    }

    /// Walk the scope chain for a named declaration.
    pub fn find_decl(&self, mut scope: ScopeId, name: Name) -> Option<TldId> {
        loop {
            if let ScopeKind::Decls { decls, .. } = &self.scopes.get(scope).kind {
                if let Some(&tld) = decls.get(&name) {
                    return Some(tld);
                }
            }
            scope = self.scopes.get(scope).parent?;
        }
    }

    /// Walk the scope chain for a local variable.
    pub fn find_var(&self, mut scope: ScopeId, name: Name) -> Option<crate::VarId> {
        loop {
            if let ScopeKind::VarDecl { var } = &self.scopes.get(scope).kind {
                if self.var(*var).name == name {
                    return Some(*var);
                }
            }
            scope = self.scopes.get(scope).parent?;
        }
    }

    /// Look up a declaration for access from `accessing_scope`, checking
    /// visibility across file boundaries.
    pub fn find_visible_decl(
        &mut self,
        scope: ScopeId,
        name: Name,
        access_node: NodeId,
    ) -> Option<TldId> {
        let tld_id = self.find_decl(scope, name)?;
        let accessing_import = self.scopes.get(scope).import;
        let tld = self.tld(tld_id);
        if tld.import != accessing_import && tld.visib == VisibMod::Private {
            let text = self.interner.lookup(name).to_string();
            self.add_node_error(
                accessing_import,
                access_node,
                format!("'{text}' is private"),
            );
            return None;
        }
        Some(tld_id)
    }
}
