#![allow(dead_code)]
#![allow(unused_imports)]

mod helpers;

pub use helpers::{TestApp, init_test_tracing};
