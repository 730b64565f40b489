// src/report/mod.rs — Run reporting

pub mod aggregate;
