//! Storage layer - table descriptors, relations, codecs and SQL translation

pub mod collection;
pub mod converters;
mod crud;
pub(crate) mod expression;
pub mod factories;
pub mod fields;
pub(crate) mod history;
pub mod hooks;
pub mod migrations;
pub(crate) mod read;
pub mod registry;
pub mod relation;
pub mod result_codec;
pub mod security;
pub mod sql;
pub(crate) mod state;
pub mod table;
pub mod tables;

pub use collection::{TableCollection, TableModifier};
pub use factories::EntityFactories;
pub use hooks::{
    HookPostDelete, HookPostInsert, HookPostUpdate, HookPreDelete, HookPreInsert, HookPreUpdate,
    InsertPhase,
};
pub use registry::TableRegistry;
pub use security::SecurityWrapper;
pub use table::{ExtraColumn, ExtraColumnKind, TableDescriptor, TableKind, TableRef};
