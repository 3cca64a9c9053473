//! Front-end and compile time evaluator for the NL language.
//!
//! The pipeline is strictly one way: source text is lexed into tokens,
//! parsed into an abstract syntax tree, every identifier is bound to an
//! entry in a global identifier storage, and an iterative type resolver
//! annotates every expression with a type, a constantness and, for
//! constants, a concrete value computed by a small stack based bytecode
//! interpreter.
//!
//! [`compiler::compile`] runs the whole pipeline for one file.

pub mod compiler;
pub mod runtime;
