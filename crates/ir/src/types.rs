//! This module contains the type definitions of the analyzed program.
use cranelift_entity::PrimaryMap;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

#[derive(Debug, Default)]
pub struct TypeStore {
    compounds: PrimaryMap<CompoundTypeRef, CompoundType>,
    rev_types: FxHashMap<CompoundType, CompoundTypeRef>,
    struct_types: IndexMap<String, CompoundTypeRef>,
}

impl TypeStore {
    pub fn make_ptr(&mut self, ty: Type) -> Type {
        let ty = self.make_compound(CompoundType::Ptr(ty));
        Type::Compound(ty)
    }

    pub fn make_slice(&mut self, elem: Type) -> Type {
        let ty = self.make_compound(CompoundType::Slice(elem));
        Type::Compound(ty)
    }

    pub fn make_array(&mut self, elem: Type, len: usize) -> Type {
        let ty = self.make_compound(CompoundType::Array { elem, len });
        Type::Compound(ty)
    }

    pub fn make_map(&mut self, key: Type, value: Type) -> Type {
        let ty = self.make_compound(CompoundType::Map { key, value });
        Type::Compound(ty)
    }

    pub fn make_chan(&mut self, elem: Type) -> Type {
        let ty = self.make_compound(CompoundType::Chan(elem));
        Type::Compound(ty)
    }

    pub fn make_interface(&mut self, name: &str) -> Type {
        let ty = self.make_compound(CompoundType::Interface(name.to_string()));
        Type::Compound(ty)
    }

    pub fn make_struct(&mut self, name: &str, fields: &[(&str, Type)]) -> Type {
        let compound_data = CompoundType::Struct(StructData {
            name: name.to_string(),
            fields: fields
                .iter()
                .map(|(name, ty)| StructField {
                    name: name.to_string(),
                    ty: *ty,
                })
                .collect(),
        });

        let cmpd_ref = self.make_compound(compound_data);
        Type::Compound(cmpd_ref)
    }

    pub fn make_func(&mut self, args: &[Type], rets: &[Type], variadic: bool) -> Type {
        let cmpd_ref = self.make_compound(CompoundType::Func {
            args: args.into(),
            rets: rets.into(),
            variadic,
        });
        Type::Compound(cmpd_ref)
    }

    /// Update struct fields.
    /// The corresponding `CompoundTypeRef` is still valid after the update,
    /// which is how self-referential structs are declared.
    ///
    /// # Panic
    /// This function panics if the struct type with the given name is not
    /// found.
    pub fn update_struct_fields(&mut self, name: &str, fields: &[(&str, Type)]) {
        let Some(cmpd_ref) = self.struct_types.get(name).cloned() else {
            panic!("struct {name} is not found");
        };

        let cmpd = &mut self.compounds[cmpd_ref];
        // Remove old struct data from reverse lookup table.
        self.rev_types.remove(cmpd);

        let CompoundType::Struct(s_data) = cmpd else {
            return;
        };

        s_data.fields = fields
            .iter()
            .map(|(name, ty)| StructField {
                name: name.to_string(),
                ty: *ty,
            })
            .collect();
        self.rev_types.insert(cmpd.clone(), cmpd_ref);
    }

    /// Returns `[StructData]` if the given type is a struct type.
    pub fn struct_def(&self, ty: Type) -> Option<&StructData> {
        match ty {
            Type::Compound(cmpd_ref) => match self.compounds[cmpd_ref] {
                CompoundType::Struct(ref def) => Some(def),
                _ => None,
            },
            _ => None,
        }
    }

    /// Lookup the struct type by name.
    pub fn lookup_struct(&self, name: &str) -> Option<Type> {
        self.struct_types.get(name).copied().map(Type::Compound)
    }

    /// Returns the type of the field `name` of the struct `ty`.
    pub fn field_ty(&self, ty: Type, name: &str) -> Option<Type> {
        self.struct_def(ty)?
            .fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.ty)
    }

    pub fn array_def(&self, ty: Type) -> Option<(Type, usize)> {
        match ty {
            Type::Compound(cmpd_ref) => match self.compounds[cmpd_ref] {
                CompoundType::Array { elem, len } => Some((elem, len)),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn func_def(&self, ty: Type) -> Option<(&[Type], &[Type], bool)> {
        match ty {
            Type::Compound(cmpd_ref) => match &self.compounds[cmpd_ref] {
                CompoundType::Func {
                    args,
                    rets,
                    variadic,
                } => Some((args.as_slice(), rets.as_slice(), *variadic)),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn deref(&self, ptr: Type) -> Option<Type> {
        match ptr {
            Type::Compound(ty) => match &self.compounds[ty] {
                CompoundType::Ptr(ty) => Some(*ty),
                _ => None,
            },
            _ => None,
        }
    }

    /// Returns the element type of slices, arrays, pointers, chans and the
    /// value type of maps.
    pub fn elem(&self, ty: Type) -> Option<Type> {
        match ty {
            Type::Compound(ty) => match &self.compounds[ty] {
                CompoundType::Ptr(elem)
                | CompoundType::Slice(elem)
                | CompoundType::Chan(elem)
                | CompoundType::Array { elem, .. } => Some(*elem),
                CompoundType::Map { value, .. } => Some(*value),
                _ => None,
            },
            Type::String => Some(Type::I8),
            _ => None,
        }
    }

    pub fn is_ptr(&self, ty: Type) -> bool {
        self.compound(ty).is_some_and(CompoundType::is_ptr)
    }

    pub fn is_slice(&self, ty: Type) -> bool {
        self.compound(ty).is_some_and(CompoundType::is_slice)
    }

    pub fn is_fixed_array(&self, ty: Type) -> bool {
        self.compound(ty).is_some_and(CompoundType::is_array)
    }

    pub fn is_map(&self, ty: Type) -> bool {
        self.compound(ty)
            .is_some_and(|cmpd| matches!(cmpd, CompoundType::Map { .. }))
    }

    pub fn is_struct(&self, ty: Type) -> bool {
        self.compound(ty).is_some_and(CompoundType::is_struct)
    }

    pub fn is_func(&self, ty: Type) -> bool {
        self.compound(ty).is_some_and(CompoundType::is_func)
    }

    pub fn is_interface(&self, ty: Type) -> bool {
        self.compound(ty)
            .is_some_and(|cmpd| matches!(cmpd, CompoundType::Interface(_)))
    }

    /// Returns `true` if a value of `ty` may hold a pointer the garbage
    /// collector has to trace.
    pub fn has_pointers(&self, ty: Type) -> bool {
        let mut visiting = FxHashSet::default();
        self.has_pointers_impl(ty, &mut visiting)
    }

    fn has_pointers_impl(&self, ty: Type, visiting: &mut FxHashSet<CompoundTypeRef>) -> bool {
        let cmpd_ref = match ty {
            Type::String | Type::UnsafePtr => return true,
            Type::Compound(cmpd_ref) => cmpd_ref,
            _ => return false,
        };

        if !visiting.insert(cmpd_ref) {
            return false;
        }

        match &self.compounds[cmpd_ref] {
            CompoundType::Array { elem, len } => {
                *len > 0 && self.has_pointers_impl(*elem, visiting)
            }
            CompoundType::Struct(data) => data
                .fields
                .iter()
                .any(|field| self.has_pointers_impl(field.ty, visiting)),
            CompoundType::Ptr(_)
            | CompoundType::Slice(_)
            | CompoundType::Map { .. }
            | CompoundType::Chan(_)
            | CompoundType::Func { .. }
            | CompoundType::Interface(_) => true,
        }
    }

    pub fn make_compound(&mut self, data: CompoundType) -> CompoundTypeRef {
        match self.rev_types.get(&data) {
            Some(cmpd_ref) => *cmpd_ref,
            None => {
                let cmpd_ref = self.compounds.push(data.clone());
                if let CompoundType::Struct(s) = &data {
                    let name = &s.name;
                    assert!(
                        !self.struct_types.contains_key(name),
                        "struct {name} is already defined"
                    );
                    self.struct_types.insert(name.to_string(), cmpd_ref);
                }

                self.rev_types.insert(data, cmpd_ref);
                cmpd_ref
            }
        }
    }

    pub fn resolve_compound(&self, cmpd_ref: CompoundTypeRef) -> &CompoundType {
        &self.compounds[cmpd_ref]
    }

    fn compound(&self, ty: Type) -> Option<&CompoundType> {
        match ty {
            Type::Compound(cmpd_ref) => Some(&self.compounds[cmpd_ref]),
            _ => None,
        }
    }
}

/// Types of the analyzed program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Type {
    Bool,
    I8,
    I16,
    I32,
    I64,
    Float,
    String,
    UnsafePtr,
    Compound(CompoundTypeRef),
    #[default]
    Unit,
}

impl Type {
    pub fn is_integral(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    pub fn is_compound(self) -> bool {
        matches!(self, Type::Compound(_))
    }

    pub fn is_unit(self) -> bool {
        matches!(self, Self::Unit)
    }
}

/// An opaque reference to [`CompoundType`].
#[derive(Debug, Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct CompoundTypeRef(u32);
cranelift_entity::entity_impl!(CompoundTypeRef);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CompoundType {
    Ptr(Type),
    Slice(Type),
    Array {
        elem: Type,
        len: usize,
    },
    Map {
        key: Type,
        value: Type,
    },
    Chan(Type),
    Struct(StructData),
    Func {
        args: SmallVec<[Type; 8]>,
        rets: SmallVec<[Type; 2]>,
        variadic: bool,
    },
    Interface(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructData {
    pub name: String,
    pub fields: Vec<StructField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
}

impl CompoundType {
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array { .. })
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Self::Ptr(_))
    }

    pub fn is_slice(&self) -> bool {
        matches!(self, Self::Slice(_))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Self::Struct(..))
    }

    pub fn is_func(&self) -> bool {
        matches!(self, Self::Func { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_have_no_pointers() {
        let store = TypeStore::default();
        assert!(!store.has_pointers(Type::I64));
        assert!(!store.has_pointers(Type::Bool));
        assert!(!store.has_pointers(Type::Unit));
        assert!(store.has_pointers(Type::String));
    }

    #[test]
    fn aggregates_have_pointers_through_fields() {
        let mut store = TypeStore::default();
        let ptr = store.make_ptr(Type::I64);
        let plain = store.make_struct("Plain", &[("a", Type::I64), ("b", Type::Bool)]);
        let boxed = store.make_struct("Boxed", &[("a", Type::I64), ("p", ptr)]);

        assert!(!store.has_pointers(plain));
        assert!(store.has_pointers(boxed));

        let empty = store.make_array(ptr, 0);
        let full = store.make_array(ptr, 4);
        let ints = store.make_array(Type::I64, 4);
        assert!(!store.has_pointers(empty));
        assert!(store.has_pointers(full));
        assert!(!store.has_pointers(ints));
    }

    #[test]
    fn self_referential_struct() {
        let mut store = TypeStore::default();
        let node = store.make_struct("Node", &[]);
        let ptr = store.make_ptr(node);
        store.update_struct_fields("Node", &[("val", Type::I64), ("next", ptr)]);

        assert!(store.has_pointers(node));
        assert_eq!(store.field_ty(node, "next"), Some(ptr));
        assert_eq!(store.deref(ptr), Some(node));
        assert_eq!(store.lookup_struct("Node"), Some(node));
    }

    #[test]
    fn interning() {
        let mut store = TypeStore::default();
        let a = store.make_slice(Type::I8);
        let b = store.make_slice(Type::I8);
        assert_eq!(a, b);
        assert!(store.is_slice(a));
        assert!(!store.is_fixed_array(a));
    }
}
