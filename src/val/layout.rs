//! Vulkan explicit layout rules for `Block`/`BufferBlock` structs.
//!
//! Every interface struct reachable from a `Uniform`, `StorageBuffer`,
//! `PushConstant` or `PhysicalStorageBuffer` pointer must have `Offset`s
//! (and `ArrayStride`s/`MatrixStride`s) consistent with one of the layouts:
//! * "extended" (std140): `Uniform` + `Block`, aggregates aligned to 16
//! * "base" (std430): everything else
//! * "scalar": with `scalar_block_layout`, everything is aligned to its scalars

use super::RuleCx;
use crate::diag::Diag;
use crate::module::{IdKind, TypeDef};
use crate::spv::Id;
use rustc_hash::FxHashMap;
use std::cell::RefCell;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum LayoutRules {
    Extended,
    Base,
    Scalar,
}

impl LayoutRules {
    fn description(self) -> &'static str {
        match self {
            Self::Extended => "standard uniform buffer layout rules",
            Self::Base => "standard storage buffer layout rules",
            Self::Scalar => "scalar block layout rules",
        }
    }
}

// FIXME: sizes/alignments should be newtypes (and `align` kept as log2).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct MemLayout {
    align: u32,

    /// Size of the fixed part (`0` for runtime arrays).
    size: u32,
}

/// Matrix decorations of the struct member a matrix (or array of them) is in.
#[derive(Copy, Clone, Default)]
struct MatrixMember {
    stride: Option<u32>,
    row_major: bool,
}

struct LayoutError(String);

fn align_to(size: u32, align: u32) -> u32 {
    match align {
        0 => size,
        _ => size.div_ceil(align).saturating_mul(align),
    }
}

/// Context for computing (and checking) `MemLayout`s, with caching.
struct LayoutCache<'a> {
    cx: &'a RuleCx<'a>,
    rules: LayoutRules,
    relaxed: bool,
    cache: RefCell<FxHashMap<Id, MemLayout>>,
}

impl<'a> LayoutCache<'a> {
    fn new(cx: &'a RuleCx<'a>, rules: LayoutRules) -> Self {
        Self {
            cx,
            rules,
            relaxed: cx.options.relax_block_layout,
            cache: RefCell::default(),
        }
    }

    fn layout_of(&self, ty: Id, matrix: MatrixMember, depth: u32) -> Result<MemLayout, LayoutError> {
        let cx = self.cx;
        let m = cx.module;
        if depth > cx.options.universal_limits.max_struct_depth {
            return Err(LayoutError(format!("type {} is nested too deeply", cx.name(ty))));
        }

        let Some(def) = m.type_def(ty) else {
            return Err(LayoutError(format!("{} is not a type", cx.name(ty))));
        };
        let extended_align = |align: u32| match self.rules {
            LayoutRules::Extended => align_to(align, 16),
            _ => align,
        };

        Ok(match *def {
            TypeDef::Bool => MemLayout { align: 4, size: 4 },
            TypeDef::Int { width, .. } | TypeDef::Float { width } => {
                let size = (width / 8).max(1);
                MemLayout { align: size, size }
            }
            // Physical pointers.
            TypeDef::Pointer { .. } => MemLayout { align: 8, size: 8 },
            TypeDef::Vector { component, count } => {
                let scalar = self.layout_of(component, MatrixMember::default(), depth + 1)?;
                let size = scalar.size.saturating_mul(count);
                let align = match self.rules {
                    LayoutRules::Scalar => scalar.align,
                    _ if self.relaxed => scalar.align,
                    _ => scalar.align * if count == 2 { 2 } else { 4 },
                };
                MemLayout { align, size }
            }
            TypeDef::Matrix { column, count } => {
                let Some(&TypeDef::Vector { component, count: rows }) = m.type_def(column) else {
                    return Err(LayoutError(format!("{} is not a vector type", cx.name(column))));
                };
                // Row-major matrices are laid out as arrays of rows.
                let (vector_len, vector_count) =
                    if matrix.row_major { (count, rows) } else { (rows, count) };
                let scalar = self.layout_of(component, MatrixMember::default(), depth + 1)?;
                let vector_align = match self.rules {
                    LayoutRules::Scalar => scalar.align,
                    _ => scalar.align * if vector_len == 2 { 2 } else { 4 },
                };
                let align = extended_align(vector_align);
                let stride = matrix.stride.ok_or_else(|| {
                    LayoutError(format!("is a matrix of type {} without a MatrixStride", cx.name(ty)))
                })?;
                if stride % align != 0 {
                    return Err(LayoutError(format!(
                        "is a matrix with stride {stride} not satisfying alignment to {align}"
                    )));
                }
                MemLayout { align, size: stride.saturating_mul(vector_count) }
            }
            TypeDef::Array { element, .. } | TypeDef::RuntimeArray { element } => {
                let element_layout = self.layout_of(element, matrix, depth + 1)?;
                let align = extended_align(element_layout.align);
                let len = match *def {
                    TypeDef::Array { length, .. } => m.const_u32(length),
                    _ => Some(0),
                };
                let stride = m
                    .decoration(ty, cx.wk.deco.ArrayStride)
                    .and_then(|d| d.literal(0))
                    .ok_or_else(|| {
                        LayoutError(format!(
                            "is an array of type {} without an ArrayStride",
                            cx.name(ty)
                        ))
                    })?;
                if stride % align != 0 {
                    return Err(LayoutError(format!(
                        "is an array with stride {stride} not satisfying alignment to {align}"
                    )));
                }
                if stride < element_layout.size {
                    return Err(LayoutError(format!(
                        "is an array with stride {stride} smaller than its element size ({})",
                        element_layout.size
                    )));
                }
                // Spec-constant lengths are left at a single element.
                MemLayout { align, size: stride.saturating_mul(len.unwrap_or(1)) }
            }
            TypeDef::Struct { .. } => {
                if let Some(&cached) = self.cache.borrow().get(&ty) {
                    return Ok(cached);
                }
                let layout = self.struct_layout(ty, depth)?;
                self.cache.borrow_mut().insert(ty, layout);
                layout
            }
            _ => {
                return Err(LayoutError(format!(
                    "has type {} which cannot be laid out in memory",
                    cx.name(ty)
                )));
            }
        })
    }

    /// Check the `Offset`s of a struct's members, and compute its layout.
    fn struct_layout(&self, ty: Id, depth: u32) -> Result<MemLayout, LayoutError> {
        let cx = self.cx;
        let m = cx.module;
        let wk = cx.wk;
        let Some(TypeDef::Struct { members }) = m.type_def(ty) else {
            return Err(LayoutError(format!("{} is not a struct type", cx.name(ty))));
        };

        let mut fields = Vec::with_capacity(members.len());
        for (i, &member_ty) in (0u32..).zip(members) {
            let offset = m.member_decoration(ty, i, wk.deco.Offset).and_then(|d| d.literal(0));
            let Some(offset) = offset else {
                return Err(LayoutError(format!(
                    "member {i} of structure {} is missing an Offset decoration",
                    cx.name(ty)
                )));
            };
            let matrix = MatrixMember {
                stride: m.member_decoration(ty, i, wk.deco.MatrixStride).and_then(|d| d.literal(0)),
                row_major: m.member_decoration(ty, i, wk.deco.RowMajor).is_some(),
            };
            let layout = self
                .layout_of(member_ty, matrix, depth + 1)
                .map_err(|LayoutError(msg)| LayoutError(format!("member {i} {msg}")))?;
            fields.push((i, member_ty, offset, layout));
        }

        // Members may be declared in any order, their offsets may not overlap.
        fields.sort_by_key(|&(_, _, offset, _)| offset);

        let mut struct_layout = MemLayout { align: 1, size: 0 };
        let mut prev_end = 0;
        let mut prev_is_aggregate = false;
        for &(i, member_ty, offset, layout) in &fields {
            let mut align = layout.align;
            if self.relaxed && self.rules != LayoutRules::Scalar {
                if let Some(&TypeDef::Vector { .. }) = m.type_def(member_ty) {
                    // Relaxed vectors only need to avoid straddling 16-byte boundaries.
                    let straddles = if layout.size <= 16 {
                        offset / 16 != (offset + layout.size.max(1) - 1) / 16
                    } else {
                        offset % 16 != 0
                    };
                    if straddles {
                        return Err(LayoutError(format!(
                            "member {i} at offset {offset} is a vector which improperly \
                             straddles a 16-byte boundary"
                        )));
                    }
                }
            }
            if let Some(TypeDef::Struct { .. }) = m.type_def(member_ty) {
                align = match self.rules {
                    LayoutRules::Extended => align_to(align, 16),
                    _ => align,
                };
            }
            if offset % align != 0 {
                return Err(LayoutError(format!(
                    "member {i} at offset {offset} is not aligned to {align}"
                )));
            }
            if offset < prev_end {
                return Err(LayoutError(format!(
                    "member {i} at offset {offset} overlaps previous member ending at offset {}",
                    prev_end - 1
                )));
            }
            if self.rules == LayoutRules::Extended && prev_is_aggregate && offset < align_to(prev_end, 16) {
                return Err(LayoutError(format!(
                    "member {i} at offset {offset} must be at least at offset {} (following \
                     a struct or array)",
                    align_to(prev_end, 16)
                )));
            }

            prev_end = offset.saturating_add(layout.size);
            prev_is_aggregate = matches!(
                m.type_def(member_ty),
                Some(TypeDef::Struct { .. } | TypeDef::Array { .. } | TypeDef::RuntimeArray { .. })
            );
            struct_layout.align = struct_layout.align.max(align);
            struct_layout.size = struct_layout.size.max(prev_end);
        }
        if self.rules == LayoutRules::Extended {
            struct_layout.align = align_to(struct_layout.align, 16);
        }
        Ok(struct_layout)
    }
}

/// Which rules apply to a `Block`/`BufferBlock` struct in storage class `sc`.
fn rules_for(cx: &RuleCx<'_>, sc: u32, block: Id) -> Option<LayoutRules> {
    let wk = cx.wk;
    let m = cx.module;
    let is_block = m.has_decoration(block, wk.deco.Block);
    let is_buffer_block = m.has_decoration(block, wk.deco.BufferBlock);
    if !is_block && !is_buffer_block {
        return None;
    }

    let rules = if sc == wk.sc.Uniform && is_block {
        LayoutRules::Extended
    } else if [wk.sc.Uniform, wk.sc.StorageBuffer, wk.sc.PushConstant, wk.sc.PhysicalStorageBuffer]
        .contains(&sc)
    {
        LayoutRules::Base
    } else {
        return None;
    };
    Some(if cx.options.scalar_block_layout { LayoutRules::Scalar } else { rules })
}

pub(super) fn check_module(cx: &RuleCx<'_>) -> Result<(), Diag> {
    if !cx.is_vulkan() || cx.options.skip_block_layout {
        return Ok(());
    }
    let wk = cx.wk;
    let m = cx.module;

    // Interface variables, and `PhysicalStorageBuffer` pointer types.
    let pointer_types = m.global_variables.iter().filter_map(|&var| Some((Some(var), m.type_of(var)?)));
    let psb_pointer_types = m.ids.iter().filter_map(|(&id, info)| match info.kind {
        IdKind::Type(TypeDef::Pointer { storage_class, .. })
            if storage_class == wk.sc.PhysicalStorageBuffer =>
        {
            Some((None, id))
        }
        _ => None,
    });
    let mut pointer_types: Vec<(Option<Id>, Id)> = pointer_types.chain(psb_pointer_types).collect();
    // `ids` is a hash map, keep the reported error deterministic.
    pointer_types.sort_by_key(|&(var, ty)| (var.is_none(), m.ids.get(&ty).map(|info| info.def_inst)));

    for (var, ptr_ty) in pointer_types {
        let Some((sc, pointee)) = m.pointer_type(ptr_ty) else { continue };
        let block = m.strip_arrays(pointee);
        let Some(rules) = rules_for(cx, sc, block) else { continue };

        let cache = LayoutCache::new(cx, rules);
        if let Err(LayoutError(msg)) = cache.struct_layout(block, 0) {
            let deco_name = if m.has_decoration(block, wk.deco.Block) { "Block" } else { "BufferBlock" };
            let sc_name = wk.kind.StorageClass.enumerant_name(sc).unwrap_or("unknown");
            let diag = Diag::invalid_id(format!(
                "Structure id {} decorated as {deco_name} for variable in {sc_name} storage \
                 class must follow {}: {msg}",
                cx.name(block),
                rules.description()
            ))
            .with_id(block);
            return Err(match var {
                Some(var) => diag.with_id(var),
                None => diag,
            });
        }
    }
    Ok(())
}
