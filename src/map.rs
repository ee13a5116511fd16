pub mod builder;
pub mod classify;
pub mod document;
pub mod html;
