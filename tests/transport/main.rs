// Transport integration tests

mod envelope_test;
mod link_test;
