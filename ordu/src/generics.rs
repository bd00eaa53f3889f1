//! Substitution of type variables along an inheritance chain.
//!
//! Modeling `Leaf` where `Leaf extends Mid` and `Mid extends Base<String>`
//! produces one binding set per class in the lineage: `Leaf: {}`,
//! `Mid: {}`, `Base: { T -> String }`. A member declared on `Base` is
//! resolved with `Base`'s bindings.

use std::collections::HashMap;

use crate::class::{ClassDef, TypeParam, TypeRef};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bindings(HashMap<String, TypeRef>);

impl Bindings {
    /// Bindings of a class modeled directly: every parameter falls back to
    /// its bound.
    pub fn unbound(params: &[TypeParam]) -> Self {
        let mut bindings = Self::default();
        for param in params {
            let fallback = param
                .bound
                .as_ref()
                .map_or(TypeRef::Any, |bound| bindings.resolve(bound));
            bindings.0.insert(param.name.clone(), fallback);
        }
        bindings
    }

    /// Bindings of `superclass` as seen from a class whose bindings are
    /// `self`. Missing type arguments (raw use) fall back to bounds.
    pub fn for_superclass(&self, superclass: &ClassDef, args: &[TypeRef]) -> Self {
        let mut bindings = Self::unbound(&superclass.type_params);
        for (param, arg) in superclass.type_params.iter().zip(args) {
            bindings.0.insert(param.name.clone(), self.resolve(arg));
        }
        bindings
    }

    pub fn get(&self, var: &str) -> Option<&TypeRef> {
        self.0.get(var)
    }

    /// Substitutes every variable. Wildcards become their upper bound and
    /// variables without a binding become `Any`.
    pub fn resolve(&self, ty: &TypeRef) -> TypeRef {
        match ty {
            TypeRef::Var(name) => self.0.get(name).cloned().unwrap_or(TypeRef::Any),
            TypeRef::Wildcard(upper) => upper
                .as_deref()
                .map_or(TypeRef::Any, |upper| self.resolve(upper)),
            TypeRef::Class { name, args } => TypeRef::Class {
                name: name.clone(),
                args: args.iter().map(|arg| self.resolve(arg)).collect(),
            },
            TypeRef::List(inner) => TypeRef::list(self.resolve(inner)),
            TypeRef::Map(inner) => TypeRef::map(self.resolve(inner)),
            TypeRef::Scalar(_) | TypeRef::Any => ty.clone(),
        }
    }
}
