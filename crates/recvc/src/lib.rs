pub mod ast;
pub mod cell;
pub mod compile;
pub mod diagnostics;
pub mod dispatch;
pub mod func_emit;
pub mod ident;
pub mod language;
pub mod layout;
pub mod ops;
pub mod program;
pub mod receiver;
pub mod router;
pub mod stmt;
pub mod types;
pub mod unit_json;
pub mod validate;
pub mod value;
pub mod writer;
