//! Debug info wiring.
//!
//! Every instruction carries a source node; its span resolves to a
//! line/column which is attached to the builder before emission. Stripped
//! builds skip all of this.

use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::debug_info::{
    AsDIScope, DICompileUnit, DWARFEmissionKind, DWARFSourceLanguage, DebugInfoBuilder,
};
use inkwell::module::Module;

use zinc_ir::ast::NodeId;
use zinc_sem::Compilation;
use zinc_types::ImportId;

pub(crate) struct DebugInfo<'ctx> {
    builder: DebugInfoBuilder<'ctx>,
    compile_unit: DICompileUnit<'ctx>,
    context: &'ctx Context,
}

impl<'ctx> DebugInfo<'ctx> {
    pub(crate) fn new(
        context: &'ctx Context,
        module: &Module<'ctx>,
        comp: &Compilation,
    ) -> DebugInfo<'ctx> {
        let root = comp
            .root_import
            .map(|import| comp.import(import).path.clone())
            .unwrap_or_else(|| "(unknown)".to_string());
        let (builder, compile_unit) = module.create_debug_info_builder(
            true,
            DWARFSourceLanguage::C,
            &root,
            ".",
            "zinc",
            comp.options.is_release,
            "",
            0,
            "",
            DWARFEmissionKind::Full,
            0,
            false,
            false,
            "",
            "",
        );
        DebugInfo {
            builder,
            compile_unit,
            context,
        }
    }

    /// Attach the location of `node` to subsequent instructions.
    pub(crate) fn set_location(
        &self,
        builder: &Builder<'ctx>,
        comp: &Compilation,
        import: ImportId,
        node: NodeId,
    ) {
        let file = comp.import(import);
        if node.index() >= file.arena.node_count() {
            return;
        }
        let span = file.arena.span(node);
        let loc = file.line_index.locate(span.start);
        let location = self.builder.create_debug_location(
            self.context,
            loc.line,
            loc.column + 1,
            self.compile_unit.as_debug_info_scope(),
            None,
        );
        builder.set_current_debug_location(location);
    }

    pub(crate) fn finalize(&self) {
        self.builder.finalize();
    }
}
