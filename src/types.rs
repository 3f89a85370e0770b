use crate::ast::TextureDim;
use lasso::{RodeoReader, Spur};
use std::collections::HashMap;

/// Index into the `TypeTable`. Types are interned: structural types compare
/// by content, named structs by the identity of their single registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(usize);

impl From<TypeId> for usize {
    fn from(id: TypeId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int,
    UInt,
    Float,
}

/// A stage IO tag on a struct field or entry-point parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Semantic {
    /// SV_Position
    Position,
    /// SV_Target / SV_TargetN
    Target(u8),
    /// SV_VertexID
    VertexId,
    /// SV_InstanceID
    InstanceId,
    /// SV_DispatchThreadID
    DispatchThreadId,
    /// POSITION
    VertexPosition,
    /// NORMAL
    Normal,
    /// TANGENT
    Tangent,
    /// COLORn
    Color(u8),
    /// TEXCOORDn
    TexCoord(u8),
}

impl Semantic {
    pub fn parse(text: &str) -> Option<Semantic> {
        fn indexed(text: &str, prefix: &str) -> Option<u8> {
            let rest = text.strip_prefix(prefix)?;
            if rest.is_empty() {
                Some(0)
            } else {
                rest.parse().ok()
            }
        }

        match text {
            "SV_Position" => Some(Semantic::Position),
            "SV_VertexID" => Some(Semantic::VertexId),
            "SV_InstanceID" => Some(Semantic::InstanceId),
            "SV_DispatchThreadID" => Some(Semantic::DispatchThreadId),
            "POSITION" => Some(Semantic::VertexPosition),
            "NORMAL" => Some(Semantic::Normal),
            "TANGENT" => Some(Semantic::Tangent),
            _ => {
                if let Some(n) = indexed(text, "SV_Target") {
                    Some(Semantic::Target(n))
                } else if let Some(n) = indexed(text, "COLOR") {
                    Some(Semantic::Color(n))
                } else {
                    indexed(text, "TEXCOORD").map(Semantic::TexCoord)
                }
            }
        }
    }

    /// Semantics a fragment-stage input struct may not declare.
    pub fn is_vertex_only(&self) -> bool {
        matches!(
            self,
            Semantic::VertexPosition
                | Semantic::Normal
                | Semantic::Tangent
                | Semantic::VertexId
                | Semantic::InstanceId
        )
    }

    pub fn is_system(&self) -> bool {
        matches!(
            self,
            Semantic::Position
                | Semantic::Target(_)
                | Semantic::VertexId
                | Semantic::InstanceId
                | Semantic::DispatchThreadId
        )
    }

    pub fn hlsl_name(&self) -> String {
        match self {
            Semantic::Position => "SV_Position".to_string(),
            Semantic::Target(n) => format!("SV_Target{}", n),
            Semantic::VertexId => "SV_VertexID".to_string(),
            Semantic::InstanceId => "SV_InstanceID".to_string(),
            Semantic::DispatchThreadId => "SV_DispatchThreadID".to_string(),
            Semantic::VertexPosition => "POSITION".to_string(),
            Semantic::Normal => "NORMAL".to_string(),
            Semantic::Tangent => "TANGENT".to_string(),
            Semantic::Color(n) => format!("COLOR{}", n),
            Semantic::TexCoord(n) => format!("TEXCOORD{}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructMember {
    pub name: Spur,
    pub ty: TypeId,
    pub semantic: Option<Semantic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructType {
    pub name: Spur,
    pub members: Vec<StructMember>,
}

impl StructType {
    pub fn member_index(&self, name: Spur) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Error,
    Void,
    Scalar(ScalarKind),
    Vector(ScalarKind, u8),
    Matrix { cols: u8, rows: u8 },
    Struct(StructType),
    Array(TypeId, u32),
    Texture(TextureDim),
    Sampler,
}

pub mod builtin {
    use super::TypeId;

    pub const ERROR_ID: TypeId = TypeId(0);
    pub const VOID_ID: TypeId = TypeId(1);
    pub const BOOL_ID: TypeId = TypeId(2);
    pub const INT_ID: TypeId = TypeId(3);
    pub const UINT_ID: TypeId = TypeId(4);
    pub const FLOAT_ID: TypeId = TypeId(5);

    /// Indexed by component count; index 0 and 1 are placeholders.
    pub const BVEC_ID: [TypeId; 5] = [TypeId(0), TypeId(0), TypeId(6), TypeId(7), TypeId(8)];
    pub const IVEC_ID: [TypeId; 5] = [TypeId(0), TypeId(0), TypeId(9), TypeId(10), TypeId(11)];
    pub const UVEC_ID: [TypeId; 5] = [TypeId(0), TypeId(0), TypeId(12), TypeId(13), TypeId(14)];
    pub const FVEC_ID: [TypeId; 5] = [TypeId(0), TypeId(0), TypeId(15), TypeId(16), TypeId(17)];

    pub const MAT2_ID: TypeId = TypeId(18);
    pub const MAT3_ID: TypeId = TypeId(19);
    pub const MAT4_ID: TypeId = TypeId(20);

    pub const TEX2D_ID: TypeId = TypeId(21);
    pub const TEX3D_ID: TypeId = TypeId(22);
    pub const TEXCUBE_ID: TypeId = TypeId(23);
    pub const SAMPLER_ID: TypeId = TypeId(24);
}

/// Interning table for all types in a compile unit.
#[derive(Debug)]
pub struct TypeTable {
    types: Vec<Type>,
    lookup: HashMap<Type, TypeId>,
}

impl TypeTable {
    pub fn new() -> Self {
        use crate::ast::TextureDim::*;
        use ScalarKind::*;

        let mut table = TypeTable {
            types: vec![],
            lookup: HashMap::new(),
        };

        // Registration order must match the ids in `builtin`.
        table.intern(Type::Error);
        table.intern(Type::Void);
        for kind in [Bool, Int, UInt, Float].iter() {
            table.intern(Type::Scalar(*kind));
        }
        for kind in [Bool, Int, UInt, Float].iter() {
            for n in 2..=4u8 {
                table.intern(Type::Vector(*kind, n));
            }
        }
        for n in 2..=4u8 {
            table.intern(Type::Matrix { cols: n, rows: n });
        }
        table.intern(Type::Texture(Two));
        table.intern(Type::Texture(Three));
        table.intern(Type::Texture(Cube));
        table.intern(Type::Sampler);

        table
    }

    pub fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(id) = self.lookup.get(&ty) {
            return *id;
        }
        let id = TypeId(self.types.len());
        self.types.push(ty.clone());
        self.lookup.insert(ty, id);
        id
    }

    /// Registers a named struct. Unlike `intern` this always creates a new
    /// entry so structs compare by declared identity, never structurally.
    pub fn register_struct(&mut self, strukt: StructType) -> TypeId {
        let id = TypeId(self.types.len());
        self.types.push(Type::Struct(strukt));
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0]
    }

    /// Fills in the members of a struct registered earlier; struct names are
    /// all registered before any field type is resolved so that fields can
    /// reference structs declared later in the file.
    pub fn set_struct_members(&mut self, id: TypeId, members: Vec<StructMember>) {
        match &mut self.types[id.0] {
            Type::Struct(strukt) => strukt.members = members,
            _ => unreachable!("set_struct_members on a non-struct type"),
        }
    }

    pub fn scalar(kind: ScalarKind) -> TypeId {
        match kind {
            ScalarKind::Bool => builtin::BOOL_ID,
            ScalarKind::Int => builtin::INT_ID,
            ScalarKind::UInt => builtin::UINT_ID,
            ScalarKind::Float => builtin::FLOAT_ID,
        }
    }

    pub fn vector(kind: ScalarKind, n: u8) -> TypeId {
        debug_assert!((2..=4).contains(&n));
        match kind {
            ScalarKind::Bool => builtin::BVEC_ID[n as usize],
            ScalarKind::Int => builtin::IVEC_ID[n as usize],
            ScalarKind::UInt => builtin::UVEC_ID[n as usize],
            ScalarKind::Float => builtin::FVEC_ID[n as usize],
        }
    }

    /// The scalar kind of a scalar or vector type.
    pub fn scalar_kind(&self, id: TypeId) -> Option<ScalarKind> {
        match self.get(id) {
            Type::Scalar(kind) | Type::Vector(kind, _) => Some(*kind),
            _ => None,
        }
    }

    /// Component count: 1 for scalars, N for vectors.
    pub fn arity(&self, id: TypeId) -> Option<u8> {
        match self.get(id) {
            Type::Scalar(_) => Some(1),
            Type::Vector(_, n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_numeric(&self, id: TypeId) -> bool {
        matches!(
            self.scalar_kind(id),
            Some(ScalarKind::Int) | Some(ScalarKind::UInt) | Some(ScalarKind::Float)
        )
    }

    pub fn display(&self, id: TypeId, rodeo: &RodeoReader) -> String {
        fn scalar_name(kind: ScalarKind) -> &'static str {
            match kind {
                ScalarKind::Bool => "bool",
                ScalarKind::Int => "int",
                ScalarKind::UInt => "uint",
                ScalarKind::Float => "float",
            }
        }

        match self.get(id) {
            Type::Error => "{error}".to_string(),
            Type::Void => "void".to_string(),
            Type::Scalar(kind) => scalar_name(*kind).to_string(),
            Type::Vector(kind, n) => format!("{}{}", scalar_name(*kind), n),
            Type::Matrix { cols, rows } => format!("float{}x{}", cols, rows),
            Type::Struct(strukt) => rodeo.resolve(&strukt.name).to_string(),
            Type::Array(elem, len) => format!("{}[{}]", self.display(*elem, rodeo), len),
            Type::Texture(TextureDim::Two) => "Texture2D".to_string(),
            Type::Texture(TextureDim::Three) => "Texture3D".to_string(),
            Type::Texture(TextureDim::Cube) => "TextureCube".to_string(),
            Type::Sampler => "SamplerState".to_string(),
        }
    }

    /// std140 size and alignment, used for uniform-block layout. Matrices
    /// are column-major with a 16-byte column stride.
    pub fn layout(&self, id: TypeId) -> (u32, u32) {
        match self.get(id) {
            Type::Scalar(_) => (4, 4),
            Type::Vector(_, 2) => (8, 8),
            Type::Vector(_, 3) => (12, 16),
            Type::Vector(_, _) => (16, 16),
            Type::Matrix { cols, .. } => (*cols as u32 * 16, 16),
            Type::Array(elem, len) => {
                let (size, _) = self.layout(*elem);
                let stride = round_up(size, 16);
                (stride * len, 16)
            }
            Type::Struct(strukt) => {
                let (offsets, size) = self.member_offsets(strukt);
                let _ = offsets;
                (size, 16)
            }
            _ => (0, 4),
        }
    }

    /// std140 offsets of every member plus the padded total size.
    pub fn member_offsets(&self, strukt: &StructType) -> (Vec<u32>, u32) {
        let mut offsets = Vec::with_capacity(strukt.members.len());
        let mut cursor = 0u32;
        for member in &strukt.members {
            let (size, align) = self.layout(member.ty);
            cursor = round_up(cursor, align);
            offsets.push(cursor);
            cursor += size;
        }
        (offsets, round_up(cursor, 16))
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

fn round_up(value: u32, align: u32) -> u32 {
    (value + align - 1) / align * align
}

/// Per-AST-node resolved types, indexed by `Id`. Filled by type resolution;
/// after a successful run every expression node has a non-error entry.
#[derive(Debug)]
pub struct NodeTypes(Vec<TypeId>);

impl NodeTypes {
    pub fn new(max_id: usize) -> Self {
        Self(vec![builtin::ERROR_ID; max_id])
    }
}

impl std::ops::Index<crate::ast::Id> for NodeTypes {
    type Output = TypeId;

    fn index(&self, index: crate::ast::Id) -> &Self::Output {
        &self.0[usize::from(index)]
    }
}

impl std::ops::IndexMut<crate::ast::Id> for NodeTypes {
    fn index_mut(&mut self, index: crate::ast::Id) -> &mut Self::Output {
        &mut self.0[usize::from(index)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ids_are_stable() {
        let table = TypeTable::new();
        assert_eq!(table.get(builtin::FLOAT_ID), &Type::Scalar(ScalarKind::Float));
        assert_eq!(
            table.get(builtin::FVEC_ID[4]),
            &Type::Vector(ScalarKind::Float, 4)
        );
        assert_eq!(table.get(builtin::MAT4_ID), &Type::Matrix { cols: 4, rows: 4 });
        assert_eq!(table.get(builtin::SAMPLER_ID), &Type::Sampler);
    }

    #[test]
    fn interning_is_idempotent() {
        let mut table = TypeTable::new();
        let a = table.intern(Type::Array(builtin::FLOAT_ID, 4));
        let b = table.intern(Type::Array(builtin::FLOAT_ID, 4));
        assert_eq!(a, b);
    }

    #[test]
    fn structs_compare_by_identity() {
        let mut table = TypeTable::new();
        let strukt = StructType {
            name: Spur::default(),
            members: vec![],
        };
        let a = table.register_struct(strukt.clone());
        let b = table.register_struct(strukt);
        assert_ne!(a, b);
    }

    #[test]
    fn std140_offsets() {
        let table = TypeTable::new();
        let strukt = StructType {
            name: Spur::default(),
            members: vec![
                StructMember {
                    name: Spur::default(),
                    ty: builtin::FLOAT_ID,
                    semantic: None,
                },
                StructMember {
                    name: Spur::default(),
                    ty: builtin::FVEC_ID[3],
                    semantic: None,
                },
                StructMember {
                    name: Spur::default(),
                    ty: builtin::MAT4_ID,
                    semantic: None,
                },
            ],
        };
        let (offsets, size) = table.member_offsets(&strukt);
        assert_eq!(offsets, vec![0, 16, 32]);
        assert_eq!(size, 96);
    }

    #[test]
    fn semantic_parsing() {
        assert_eq!(Semantic::parse("SV_Position"), Some(Semantic::Position));
        assert_eq!(Semantic::parse("TEXCOORD3"), Some(Semantic::TexCoord(3)));
        assert_eq!(Semantic::parse("COLOR"), Some(Semantic::Color(0)));
        assert_eq!(Semantic::parse("SV_Target1"), Some(Semantic::Target(1)));
        assert_eq!(Semantic::parse("BANANA"), None);
        assert!(Semantic::parse("NORMAL").unwrap().is_vertex_only());
        assert!(!Semantic::parse("TEXCOORD0").unwrap().is_vertex_only());
    }
}
