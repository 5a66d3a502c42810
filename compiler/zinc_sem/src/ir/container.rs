//! Two-phase container resolution.
//!
//! Phase one ("zero bits known") resolves field types and decides
//! whether the container occupies storage, using the `ZeroBitsProbing`
//! marker to catch a container embedded in itself by value. Phase two
//! computes field layout (generation indices, size, alignment). Both
//! phases re-enter through field types; hitting a probing marker is the
//! `struct 'X' contains itself` diagnostic.

use zinc_ir::ast::{ContainerKind, NodeId, NodeKind};
use zinc_types::{ContainerResolution, EnumField, ImportId, StructField, TypeData, TypeId};

use crate::ir::eval::resolve_type_expr;
use crate::Compilation;

fn container_kind(comp: &Compilation, ty: TypeId) -> Option<ContainerKind> {
    match &comp.types.get(ty).data {
        TypeData::Struct(_) => Some(ContainerKind::Struct),
        TypeData::Enum(_) => Some(ContainerKind::Enum),
        TypeData::Union(_) => Some(ContainerKind::Union),
        _ => None,
    }
}

fn resolution_of(comp: &Compilation, ty: TypeId) -> Option<ContainerResolution> {
    match &comp.types.get(ty).data {
        TypeData::Struct(data) => Some(data.resolution),
        TypeData::Enum(data) => Some(data.resolution),
        TypeData::Union(data) => Some(data.resolution),
        _ => None,
    }
}

fn set_resolution(comp: &mut Compilation, ty: TypeId, resolution: ContainerResolution) {
    match &mut comp.types.get_mut(ty).data {
        TypeData::Struct(data) => data.resolution = resolution,
        TypeData::Enum(data) => data.resolution = resolution,
        TypeData::Union(data) => data.resolution = resolution,
        _ => {}
    }
}

fn self_containment_error(comp: &mut Compilation, ty: TypeId, import: ImportId, node: NodeId) {
    let kind = container_kind(comp, ty).unwrap_or(ContainerKind::Struct);
    let name = comp.types.name(ty).to_string();
    comp.add_node_error(
        import,
        node,
        format!("{} '{name}' contains itself", kind.keyword()),
    );
    set_resolution(comp, ty, ContainerResolution::Invalid);
}

/// Phase one: resolve field types and the zero-bits property.
pub fn ensure_zero_bits_known(comp: &mut Compilation, ty: TypeId, import: ImportId, node: NodeId) {
    match resolution_of(comp, ty) {
        None => return,
        Some(ContainerResolution::Unresolved) => {}
        Some(ContainerResolution::ZeroBitsProbing | ContainerResolution::LayoutProbing) => {
            self_containment_error(comp, ty, import, node);
            return;
        }
        Some(_) => return,
    }
    set_resolution(comp, ty, ContainerResolution::ZeroBitsProbing);

    let decl_node = match &comp.types.get(ty).data {
        TypeData::Struct(data) => data.decl_node,
        TypeData::Enum(data) => data.decl_node,
        TypeData::Union(data) => data.decl_node,
        _ => None,
    };
    let Some(decl_node) = decl_node else {
        set_resolution(comp, ty, ContainerResolution::ZeroBitsKnown);
        return;
    };
    let container_import = match &comp.types.get(ty).data {
        TypeData::Struct(data) => data.import,
        TypeData::Enum(data) => data.import,
        TypeData::Union(data) => data.import,
        _ => import,
    };
    let scope = comp
        .container_scopes
        .get(&ty)
        .copied()
        .unwrap_or_else(|| comp.import(container_import).decls_scope);

    let field_nodes: Vec<NodeId> = match comp.import(container_import).arena.kind(decl_node) {
        NodeKind::ContainerDecl(decl) => comp
            .import(container_import)
            .arena
            .list(decl.fields)
            .to_vec(),
        _ => Vec::new(),
    };

    let kind = container_kind(comp, ty).unwrap_or(ContainerKind::Struct);
    let mut struct_fields = Vec::new();
    let mut enum_fields = Vec::new();
    let mut zero_bits = true;
    let mut poisoned = false;

    for &field_node in &field_nodes {
        let (name, ty_node) = match comp.import(container_import).arena.kind(field_node) {
            NodeKind::StructField { name, ty } => (*name, *ty),
            _ => continue,
        };
        let field_ty = match ty_node {
            Some(ty_node) => resolve_type_expr(comp, scope, ty_node),
            None if kind == ContainerKind::Enum => TypeId::VOID,
            None => {
                comp.add_node_error(container_import, field_node, "container field needs a type");
                TypeId::INVALID
            }
        };
        if field_ty.is_invalid() {
            poisoned = true;
        }
        // Fields containing containers by value recurse; a probing marker
        // down there is self-containment.
        if container_kind(comp, field_ty).is_some() {
            ensure_zero_bits_known(comp, field_ty, container_import, field_node);
            if resolution_of(comp, field_ty) == Some(ContainerResolution::Invalid) {
                poisoned = true;
            }
        }
        if resolution_of(comp, ty) == Some(ContainerResolution::Invalid) {
            // Self-containment was reported below us.
            return;
        }
        if !comp.types.get(field_ty).zero_bits {
            zero_bits = false;
        }
        match kind {
            ContainerKind::Enum => enum_fields.push(EnumField {
                name,
                payload_ty: field_ty,
            }),
            _ => struct_fields.push(StructField {
                name,
                ty: field_ty,
                gen_index: None,
            }),
        }
    }

    if kind == ContainerKind::Enum {
        // A multi-tag enum always carries its tag bits.
        zero_bits = enum_fields.len() <= 1
            && enum_fields
                .iter()
                .all(|field| comp.types.get(field.payload_ty).zero_bits);
    }

    match &mut comp.types.get_mut(ty).data {
        TypeData::Struct(data) => data.fields = struct_fields,
        TypeData::Union(data) => data.fields = struct_fields,
        TypeData::Enum(data) => {
            data.tag_bits = if enum_fields.len() <= 1 {
                0
            } else {
                32 - (enum_fields.len() as u32 - 1).leading_zeros()
            };
            data.fields = enum_fields;
        }
        _ => {}
    }
    comp.types.get_mut(ty).zero_bits = zero_bits;
    set_resolution(
        comp,
        ty,
        if poisoned {
            ContainerResolution::Invalid
        } else {
            ContainerResolution::ZeroBitsKnown
        },
    );
}

/// Phase two: full field layout.
pub fn ensure_fields_resolved(comp: &mut Compilation, ty: TypeId, import: ImportId, node: NodeId) {
    ensure_zero_bits_known(comp, ty, import, node);
    match resolution_of(comp, ty) {
        Some(ContainerResolution::ZeroBitsKnown) => {}
        Some(ContainerResolution::LayoutProbing) => {
            self_containment_error(comp, ty, import, node);
            return;
        }
        _ => return,
    }
    set_resolution(comp, ty, ContainerResolution::LayoutProbing);

    // Assign generation indices to fields that occupy storage and settle
    // the container's size and alignment.
    let mut size: u64 = 0;
    let mut align: u32 = 1;
    match comp.types.get(ty).data.clone() {
        TypeData::Struct(data) => {
            let mut gen_index = 0;
            let mut fields = data.fields.clone();
            for field in &mut fields {
                if comp.types.get(field.ty).zero_bits {
                    field.gen_index = None;
                    continue;
                }
                field.gen_index = Some(gen_index);
                gen_index += 1;
                let field_align = type_align(comp, field.ty, import, node).unwrap_or(1);
                let field_size = type_size(comp, field.ty, import, node).unwrap_or(0);
                align = align.max(field_align);
                size = round_up(size, u64::from(field_align)) + field_size;
            }
            size = round_up(size, u64::from(align));
            if let TypeData::Struct(data) = &mut comp.types.get_mut(ty).data {
                data.fields = fields;
            }
        }
        TypeData::Union(data) => {
            for field in &data.fields {
                let field_align = type_align(comp, field.ty, import, node).unwrap_or(1);
                let field_size = type_size(comp, field.ty, import, node).unwrap_or(0);
                align = align.max(field_align);
                size = size.max(field_size);
            }
            size = round_up(size, u64::from(align));
        }
        TypeData::Enum(data) => {
            let tag_size = u64::from(data.tag_bits.div_ceil(8).max(1));
            let mut payload_size = 0;
            let mut payload_align = 1;
            for field in &data.fields {
                if comp.types.get(field.payload_ty).zero_bits {
                    continue;
                }
                payload_size =
                    payload_size.max(type_size(comp, field.payload_ty, import, node).unwrap_or(0));
                payload_align = payload_align
                    .max(type_align(comp, field.payload_ty, import, node).unwrap_or(1));
            }
            align = payload_align.max(tag_size as u32);
            size = round_up(tag_size, u64::from(payload_align)) + payload_size;
            size = round_up(size, u64::from(align));
        }
        _ => return,
    }

    if resolution_of(comp, ty) == Some(ContainerResolution::Invalid) {
        return;
    }
    comp.types.get_mut(ty).abi_size = size;
    comp.types.get_mut(ty).abi_align = align;
    set_resolution(comp, ty, ContainerResolution::Complete);
}

fn round_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

/// ABI size of a type in bytes, resolving containers on demand.
pub fn type_size(
    comp: &mut Compilation,
    ty: TypeId,
    import: ImportId,
    node: NodeId,
) -> Option<u64> {
    let entry = comp.types.get(ty);
    if entry.zero_bits {
        return Some(0);
    }
    match entry.data.clone() {
        TypeData::Invalid => None,
        TypeData::Bool => Some(1),
        TypeData::Int(info) => Some(byte_size_for_bits(info.bits)),
        TypeData::Float { bits } => Some(u64::from(bits) / 8),
        TypeData::Pointer { .. } | TypeData::Fn(_) => Some(u64::from(comp.types.ptr_bits()) / 8),
        TypeData::PureError => Some(u64::from(comp.types.ptr_bits()) / 8),
        TypeData::Array { child, len } => {
            let child_size = type_size(comp, child, import, node)?;
            Some(child_size * len)
        }
        TypeData::Maybe { child } => {
            // Payload plus a bool flag, padded to the payload alignment.
            let child_size = type_size(comp, child, import, node)?;
            let child_align = type_align(comp, child, import, node)?;
            Some(round_up(child_size + 1, u64::from(child_align)))
        }
        TypeData::ErrorUnion { payload } => {
            let err_size = u64::from(comp.types.ptr_bits()) / 8;
            let payload_size = type_size(comp, payload, import, node)?;
            let payload_align = type_align(comp, payload, import, node)?;
            Some(round_up(err_size, u64::from(payload_align)) + payload_size)
        }
        TypeData::Struct(_) | TypeData::Enum(_) | TypeData::Union(_) => {
            ensure_fields_resolved(comp, ty, import, node);
            if resolution_of(comp, ty) == Some(ContainerResolution::Complete) {
                Some(comp.types.get(ty).abi_size)
            } else {
                None
            }
        }
        _ => {
            let name = comp.types.name(ty).to_string();
            comp.add_node_error(import, node, format!("no size available for type '{name}'"));
            None
        }
    }
}

/// ABI alignment of a type in bytes.
pub fn type_align(
    comp: &mut Compilation,
    ty: TypeId,
    import: ImportId,
    node: NodeId,
) -> Option<u32> {
    let entry = comp.types.get(ty);
    if entry.zero_bits {
        return Some(1);
    }
    match entry.data.clone() {
        TypeData::Invalid => None,
        TypeData::Bool => Some(1),
        TypeData::Int(info) => Some(byte_size_for_bits(info.bits).min(8) as u32),
        TypeData::Float { bits } => Some((bits / 8).min(8)),
        TypeData::Pointer { .. } | TypeData::Fn(_) | TypeData::PureError => {
            Some(comp.types.ptr_bits() / 8)
        }
        TypeData::Array { child, .. } => type_align(comp, child, import, node),
        TypeData::Maybe { child } => type_align(comp, child, import, node),
        TypeData::ErrorUnion { payload } => {
            let payload_align = type_align(comp, payload, import, node)?;
            Some(payload_align.max(comp.types.ptr_bits() / 8))
        }
        TypeData::Struct(_) | TypeData::Enum(_) | TypeData::Union(_) => {
            ensure_fields_resolved(comp, ty, import, node);
            if resolution_of(comp, ty) == Some(ContainerResolution::Complete) {
                Some(comp.types.get(ty).abi_align)
            } else {
                None
            }
        }
        _ => Some(1),
    }
}

/// Byte offset of a named field in a struct.
pub fn field_offset(
    comp: &mut Compilation,
    ty: TypeId,
    field_name: &str,
    import: ImportId,
    node: NodeId,
) -> Option<u64> {
    ensure_fields_resolved(comp, ty, import, node);
    let TypeData::Struct(data) = comp.types.get(ty).data.clone() else {
        let name = comp.types.name(ty).to_string();
        comp.add_node_error(import, node, format!("type '{name}' has no fields"));
        return None;
    };
    let mut offset: u64 = 0;
    for field in &data.fields {
        let text = comp.interner.lookup(field.name);
        if comp.types.get(field.ty).zero_bits {
            if text == field_name {
                return Some(0);
            }
            continue;
        }
        let field_align = type_align(comp, field.ty, import, node)?;
        offset = round_up(offset, u64::from(field_align));
        if text == field_name {
            return Some(offset);
        }
        offset += type_size(comp, field.ty, import, node)?;
    }
    comp.add_node_error(
        import,
        node,
        format!("no field named '{field_name}' in '{}'", {
            comp.types.name(ty)
        }),
    );
    None
}

fn byte_size_for_bits(bits: u32) -> u64 {
    let bytes = u64::from(bits.div_ceil(8));
    bytes.next_power_of_two()
}
