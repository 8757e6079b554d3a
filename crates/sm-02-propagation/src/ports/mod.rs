//! Ports for sm-02.

pub mod outbound;
