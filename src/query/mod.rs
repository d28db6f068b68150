//! Query Translator
//!
//! Turns structured where/sort/paging/patch descriptions into SQL text plus
//! positional arguments. Nothing here touches the engine.

mod builder;
mod statement;

pub use builder::{
    build_count, build_delete, build_insert, build_select, build_update, build_where, escape_like,
};
pub use statement::{SqlStatement, WhereClause};
