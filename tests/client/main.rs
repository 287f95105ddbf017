// Client integration tests

#[path = "../common/mod.rs"]
mod common;

mod lifecycle_test;
mod messaging_test;
