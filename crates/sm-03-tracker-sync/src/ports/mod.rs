//! Ports for sm-03.

pub mod outbound;
