use std::rc::Rc;

use itertools::Itertools;

use crate::frontend::{ast::NodeId, intern::Symbol};

/// A checked type, cheaply clonable. Rill's value universe is small: every
/// value is an `int` or a function, plus the error type produced while
/// recovering from check failures.
#[derive(Debug, Clone, PartialEq)]
pub struct Ty(Rc<TyKind>);

#[derive(Debug, PartialEq)]
pub enum TyKind {
    Error,
    Int,
    Fn(FnTy),
}

#[derive(Debug, PartialEq)]
pub struct FnTy {
    /// The `fn` statement this type belongs to
    pub node: NodeId,
    pub ident: Symbol,
    pub params: Vec<(Symbol, Ty)>,
    pub return_ty: Ty,
}

impl Ty {
    pub fn error() -> Self {
        Self(Rc::new(TyKind::Error))
    }

    pub fn int() -> Self {
        Self(Rc::new(TyKind::Int))
    }

    pub fn function(node: NodeId, ident: Symbol, params: Vec<(Symbol, Ty)>, return_ty: Ty) -> Self {
        Self(Rc::new(TyKind::Fn(FnTy {
            node,
            ident,
            params,
            return_ty,
        })))
    }

    pub fn kind(&self) -> &TyKind {
        &self.0
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind(), TyKind::Error)
    }

    pub fn is_int(&self) -> bool {
        matches!(self.kind(), TyKind::Int)
    }

    pub fn as_fn(&self) -> Option<&FnTy> {
        match self.kind() {
            TyKind::Fn(fn_ty) => Some(fn_ty),
            _ => None,
        }
    }

    /// Whether a value of this type can be used where `other` is expected.
    /// Function types are nominal: each `fn` statement is its own type.
    pub fn assignable_to(&self, other: &Ty) -> bool {
        match (self.kind(), other.kind()) {
            (TyKind::Error, TyKind::Error) => true,
            (TyKind::Int, TyKind::Int) => true,
            (TyKind::Fn(a), TyKind::Fn(b)) => a.node == b.node,
            _ => false,
        }
    }
}

impl core::fmt::Display for Ty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            TyKind::Error => write!(f, "<error>"),
            TyKind::Int => write!(f, "int"),
            TyKind::Fn(fn_ty) => {
                let params = fn_ty
                    .params
                    .iter()
                    .map(|(ident, ty)| format!("{ident}: {ty}"))
                    .join(", ");

                write!(f, "fn {}({}) -> {}", fn_ty.ident, params, fn_ty.return_ty)
            }
        }
    }
}
