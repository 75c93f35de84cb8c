pub mod api;
pub mod condition;
pub mod constraints;
pub mod context;
pub mod identity;
pub mod literalize;
pub mod merge;
pub mod symbol;
pub mod trace;
pub mod variablize;
pub mod wme;
