//! minicc — a compiler front-end for a small C subset.
//!
//! Three chained stages: [`lexer::Lexer`] scans source text into tokens,
//! [`parser::Parser`] builds an owned AST with panic-mode error recovery, and
//! [`codegen::Codegen`] lowers the AST to LLVM IR through Inkwell. Every
//! stage accumulates diagnostics instead of failing fast; the driver decides
//! what to do with them.

pub mod ast;
pub mod codegen;
pub mod diag;
pub mod lexer;
pub mod link;
pub mod parser;
pub mod symtab;
pub mod token;

pub use codegen::Codegen;
pub use diag::{CompileError, Diagnostic};
pub use lexer::Lexer;
pub use parser::Parser;
