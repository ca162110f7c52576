//! Operations backend for a mobile training company: clients, operators,
//! session planning and staffing, quotes, invoices and costs.

pub mod bootstrap;
pub mod config;
pub mod contact;
pub mod db;
pub mod finance;
pub mod model;
pub mod planning;
pub mod staffing;
