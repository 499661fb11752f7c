//! Everything between the AST and the final instruction listing. Names are
//! resolved and types checked in semantic analysis, then the AST is lowered
//! to three-address IR and optimized.

pub mod diagnostic;
pub mod ir;
pub mod optimization;
pub mod primitive;
pub mod semantic;
pub mod symbol_table;
pub mod ty;
