//! HTTP handlers for entity CRUD and catalog maintenance.

pub mod catalog;
pub mod entity;
