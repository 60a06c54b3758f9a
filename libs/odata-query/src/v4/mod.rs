//! `OData` v4 translation: chain visitor, literal rendering and URL assembly.

pub mod literal;
mod provider;
mod segments;
mod visitor;

pub use provider::{ODataV4Options, ODataV4QueryProvider};
pub use segments::{ODataV4QuerySegments, OrderKey, SortDir};
pub use visitor::ODataV4ExpressionVisitor;
